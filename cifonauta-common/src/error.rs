//! Common error types for Cifonauta

use thiserror::Error;

/// Common result type for Cifonauta operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the Cifonauta crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid caller input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A cached counter or tour position could not be written.
    ///
    /// Raised by maintenance only. The mutation that triggered the
    /// maintenance has already been committed when this is returned.
    #[error("Persistence failure during {operation}: {source}")]
    PersistenceFailure {
        operation: String,
        #[source]
        source: sqlx::Error,
    },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap a database error raised while persisting derived data
    pub fn persistence(operation: impl Into<String>, source: sqlx::Error) -> Self {
        Error::PersistenceFailure {
            operation: operation.into(),
            source,
        }
    }

    /// True for SQLite "database is locked" errors, which are worth retrying
    pub fn is_lock_error(&self) -> bool {
        match self {
            Error::Database(e) | Error::PersistenceFailure { source: e, .. } => {
                e.to_string().contains("database is locked")
            }
            _ => false,
        }
    }
}
