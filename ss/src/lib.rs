//! SessionStore - durable key-value records for plansmith sessions
//!
//! Stores opaque string values under slash-separated keys. Each session keeps
//! its records under its own key prefix.
//!
//! # Architecture
//!
//! ```text
//! ~/.local/share/plansmith/
//! ├── .lock                    # advisory write lock
//! └── {session_id}/
//!     ├── chat_history.json
//!     └── project_plan.json
//! ```
//!
//! # Example
//!
//! ```ignore
//! use sessionstore::{FileStore, KeyValueStore};
//!
//! let store = FileStore::open("~/.local/share/plansmith")?;
//! store.put("default/project_plan", "{}").await?;
//! let value = store.get("default/project_plan").await?;
//! ```

pub mod cli;
pub mod config;
mod file;
mod memory;
mod store;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use store::{KeyValueStore, StoreError, StoreResult, validate_key};

/// File extension used for values written by [`FileStore`]
pub const RECORD_EXTENSION: &str = "json";
