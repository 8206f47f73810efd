// # Error Types
//
// Central error enum for the sync engine. Every component surfaces one of
// these semantic kinds; the API layer maps them onto HTTP status codes.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("tenant store unavailable: {0}")]
    Store(String),

    #[error("version oracle unavailable: {0}")]
    Oracle(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;

impl From<std::io::Error> for SyncError {
    fn from(e: std::io::Error) -> Self {
        SyncError::Store(e.to_string())
    }
}

impl From<rusqlite::Error> for SyncError {
    fn from(e: rusqlite::Error) -> Self {
        // Uniqueness and foreign-key failures are caller errors, not store
        // outages; everything else means the store could not serve us.
        match &e {
            rusqlite::Error::SqliteFailure(code, _)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                SyncError::Conflict(e.to_string())
            }
            _ => SyncError::Store(e.to_string()),
        }
    }
}

impl From<redis::RedisError> for SyncError {
    fn from(e: redis::RedisError) -> Self {
        SyncError::Oracle(e.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Internal(format!("payload serialization: {e}"))
    }
}
