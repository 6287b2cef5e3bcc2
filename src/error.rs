use thiserror::Error;

use crate::storage::models::ClaimStatus;

#[derive(Error, Debug)]
pub enum HandoffError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflicting write on {0}")]
    Conflict(String),

    #[error("stale claim state: expected {expected}, found {actual}")]
    StaleState {
        expected: ClaimStatus,
        actual: ClaimStatus,
    },

    #[error("listing already claimed")]
    AlreadyClaimed,

    #[error("expired: {0}")]
    Expired(String),

    #[error("invalid pickup token")]
    InvalidToken,

    #[error("already in a terminal state: {0}")]
    AlreadyTerminal(String),

    #[error("storage timed out: {0}")]
    Timeout(String),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("verification could not be committed: {0}")]
    VerificationFailed(String),

    #[error("database error: {0}")]
    Database(rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// SQLITE_BUSY means the bounded busy_timeout elapsed; callers see that as a
// retryable Timeout, everything else as a database fault.
impl From<rusqlite::Error> for HandoffError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(inner, _)
                if inner.code == rusqlite::ErrorCode::DatabaseBusy
                    || inner.code == rusqlite::ErrorCode::DatabaseLocked =>
            {
                HandoffError::Timeout(e.to_string())
            }
            _ => HandoffError::Database(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, HandoffError>;
