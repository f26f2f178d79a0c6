//! Session error types

use sessionstore::StoreError;
use thiserror::Error;

use super::edit::EditError;

/// Errors surfaced by the session's edit and persistence surface
///
/// Gateway failures never appear here; they degrade to a fallback reply or
/// to "no plan update".
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("No plan to edit")]
    NoPlanToEdit,

    #[error("An edit transaction is already open")]
    TransactionAlreadyOpen,

    #[error("No edit transaction is open")]
    NoOpenTransaction,

    #[error("Edit failed: {0}")]
    Edit(#[from] EditError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Session writer stopped")]
    WriterClosed,

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type SessionResult<T> = Result<T, SessionError>;
