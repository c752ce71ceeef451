//! Error types for connection management and locking.

use thiserror::Error;

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Errors that can occur while connecting to or locking a database.
#[derive(Error, Debug)]
pub enum DbError {
    /// SQLx database error
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// No connection string was supplied.
    #[error("DSN not provided")]
    EmptyDsn,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The dialect name is not one of mysql, postgres or sqlite.
    #[error("Unknown dialect: {0}")]
    UnknownDialect(String),

    /// The dialect is known but its driver feature was not compiled in.
    #[error("Dialect {0} not enabled. Enable the corresponding feature.")]
    DialectDisabled(String),

    /// The overall connect deadline elapsed.
    #[error("db connect timed out after {0}ms")]
    ConnectTimedOut(u64),

    /// The caller cancelled the connect loop.
    #[error("db connection cancelled")]
    ConnectCancelled,

    /// Lock acquisition failed.
    #[error("Failed to acquire lock: {0}")]
    LockFailed(String),
}

impl DbError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a lock failed error.
    pub fn lock_failed(msg: impl Into<String>) -> Self {
        Self::LockFailed(msg.into())
    }

    /// Whether another connect attempt can succeed after this error.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::EmptyDsn
                | Self::Config(_)
                | Self::UnknownDialect(_)
                | Self::DialectDisabled(_)
                | Self::ConnectCancelled
        )
    }
}
