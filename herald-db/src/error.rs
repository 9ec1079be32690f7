//! Error types for database operations

use thiserror::Error;

/// Database error types
#[derive(Error, Debug)]
pub enum Error {
    /// SQLx database error
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(String),

    /// A stored value could not be decoded
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Not found error
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Result type alias for database operations
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for herald_core::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::NotFound(what) => herald_core::Error::NotFound(what),
            other => herald_core::Error::Store(other.to_string()),
        }
    }
}
