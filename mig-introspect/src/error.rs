//! Error types for schema introspection.

use mig_db::DbError;
use thiserror::Error;

/// Result type alias for introspection operations.
pub type IntrospectResult<T> = Result<T, IntrospectError>;

/// Errors that can occur while reading a database catalog.
#[derive(Error, Debug)]
pub enum IntrospectError {
    /// A catalog query failed.
    #[error("failed to {context}: {source}")]
    Query {
        /// What was being read, e.g. `get columns for table users`.
        context: String,
        /// Driver error.
        #[source]
        source: sqlx::Error,
    },

    /// No describer exists for this dialect name.
    #[error("unknown dialect: {0}")]
    UnknownDialect(String),

    /// The describer and the pool belong to different dialects.
    #[error("{describer} describer cannot use a {pool} connection")]
    DialectMismatch {
        /// Dialect of the describer.
        describer: &'static str,
        /// Dialect of the pool.
        pool: &'static str,
    },

    /// The table does not exist in the current schema.
    #[error("table not found: {0}")]
    TableNotFound(String),

    /// `describe` was called with a blank query.
    #[error("query cannot be empty")]
    EmptyQuery,

    /// Connection-level failure.
    #[error(transparent)]
    Db(#[from] DbError),
}

impl IntrospectError {
    /// Wrap a driver error with the operation that produced it.
    pub fn query(context: impl Into<String>, source: sqlx::Error) -> Self {
        Self::Query {
            context: context.into(),
            source,
        }
    }

    /// Adapter for `map_err` that attaches `context` to a driver error.
    pub fn with_context(context: impl Into<String>) -> impl FnOnce(sqlx::Error) -> Self {
        let context = context.into();
        move |source| Self::query(context, source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_error_display() {
        let err = IntrospectError::query("list tables", sqlx::Error::RowNotFound);
        let text = err.to_string();
        assert!(text.starts_with("failed to list tables: "));
    }

    #[test]
    fn test_with_context() {
        let err = IntrospectError::with_context("get indexes for table users")(
            sqlx::Error::PoolClosed,
        );
        assert!(matches!(err, IntrospectError::Query { ref context, .. } if context == "get indexes for table users"));
    }

    #[test]
    fn test_table_not_found_display() {
        let err = IntrospectError::TableNotFound("users".into());
        assert_eq!(err.to_string(), "table not found: users");
    }

    #[test]
    fn test_db_error_is_transparent() {
        let err: IntrospectError = DbError::EmptyDsn.into();
        assert_eq!(err.to_string(), "DSN not provided");
    }
}
