//! Transaction support.

use tracing::debug;

use crate::dialect::Dialect;
use crate::error::DbResult;

/// An open transaction on one of the supported dialects.
///
/// Transactions from [`crate::DbPool::begin`] own their connection and are
/// `'static`; those from [`crate::DbConnection::begin`] borrow it. Dropping the value without calling [`DbTransaction::commit`] rolls the
/// transaction back.
#[derive(Debug)]
pub enum DbTransaction<'c> {
    /// PostgreSQL transaction
    #[cfg(feature = "postgres")]
    Postgres(sqlx::Transaction<'c, sqlx::Postgres>),
    /// MySQL transaction
    #[cfg(feature = "mysql")]
    MySql(sqlx::Transaction<'c, sqlx::MySql>),
    /// SQLite transaction
    #[cfg(feature = "sqlite")]
    Sqlite(sqlx::Transaction<'c, sqlx::Sqlite>),
}

impl DbTransaction<'_> {
    /// Get the dialect of this transaction.
    pub fn dialect(&self) -> Dialect {
        match self {
            #[cfg(feature = "postgres")]
            Self::Postgres(_) => Dialect::Postgres,
            #[cfg(feature = "mysql")]
            Self::MySql(_) => Dialect::MySql,
            #[cfg(feature = "sqlite")]
            Self::Sqlite(_) => Dialect::Sqlite,
        }
    }

    /// Execute one SQL statement inside the transaction.
    pub async fn execute(&mut self, sql: &str) -> DbResult<u64> {
        debug!(sql = %sql, "Executing statement in transaction");

        let affected = match self {
            #[cfg(feature = "postgres")]
            Self::Postgres(tx) => sqlx::raw_sql(sql).execute(&mut **tx).await?.rows_affected(),
            #[cfg(feature = "mysql")]
            Self::MySql(tx) => sqlx::raw_sql(sql).execute(&mut **tx).await?.rows_affected(),
            #[cfg(feature = "sqlite")]
            Self::Sqlite(tx) => sqlx::raw_sql(sql).execute(&mut **tx).await?.rows_affected(),
        };
        Ok(affected)
    }

    /// Commit the transaction.
    pub async fn commit(self) -> DbResult<()> {
        match self {
            #[cfg(feature = "postgres")]
            Self::Postgres(tx) => tx.commit().await?,
            #[cfg(feature = "mysql")]
            Self::MySql(tx) => tx.commit().await?,
            #[cfg(feature = "sqlite")]
            Self::Sqlite(tx) => tx.commit().await?,
        }
        Ok(())
    }

    /// Roll the transaction back.
    pub async fn rollback(self) -> DbResult<()> {
        match self {
            #[cfg(feature = "postgres")]
            Self::Postgres(tx) => tx.rollback().await?,
            #[cfg(feature = "mysql")]
            Self::MySql(tx) => tx.rollback().await?,
            #[cfg(feature = "sqlite")]
            Self::Sqlite(tx) => tx.rollback().await?,
        }
        Ok(())
    }
}
