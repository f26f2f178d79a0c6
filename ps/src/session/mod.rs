//! Plan session core: conversation log, orchestration and edit transactions

mod core;
mod edit;
mod error;
mod events;
mod log;
mod persistence;
mod transaction;
mod writer;

pub use core::PlanSession;
pub use edit::{EditError, ListField, PlanEdit, Section};
pub use error::{SessionError, SessionResult};
pub use events::{PlanSource, SessionEvent, SessionStatus, SkipReason, SynthesisOutcome};
pub use log::ConversationLog;
pub use persistence::SessionPersistence;
pub use transaction::EditTransaction;
pub use writer::{PendingWrite, SessionWriter, WriteOp};
