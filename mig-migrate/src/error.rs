//! Error types for the migration runner.

use mig_db::DbError;
use thiserror::Error;

/// Result type alias for migration operations.
pub type MigrateResult<T> = Result<T, MigrationError>;

/// Errors that can occur while loading or applying migrations.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// File system error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection, transaction or lock error.
    #[error(transparent)]
    Db(#[from] DbError),

    /// Query error outside of a migration statement.
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// No migrations are loaded for the requested project.
    #[error("Migrations for '{0}' don't exist")]
    UnknownProject(String),

    /// A migration file is not present in its project.
    #[error("Migration '{0}' not found")]
    NotFound(String),

    /// Invalid options or configuration file.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A migration statement failed; its checkpoint has been saved.
    #[error("{filename}: statement {index} failed: {message}")]
    Statement {
        /// Migration file name.
        filename: String,
        /// Zero-based statement index.
        index: usize,
        /// Driver error text, as recorded in the checkpoint.
        message: String,
    },
}

impl MigrationError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a statement failure.
    pub fn statement(filename: impl Into<String>, index: usize, message: impl Into<String>) -> Self {
        Self::Statement {
            filename: filename.into(),
            index,
            message: message.into(),
        }
    }

    /// Whether the error is a configuration problem rather than a runtime failure.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::UnknownProject(_)
                | Self::Db(DbError::EmptyDsn | DbError::UnknownDialect(_) | DbError::Config(_))
        )
    }
}
