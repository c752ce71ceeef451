//! Single pooled connections.
//!
//! A [`DbConnection`] pins one session for the duration of a unit of work, so
//! that session-scoped state (MySQL named locks) outlives the transactions
//! opened on it.

use sqlx::pool::PoolConnection;
use tracing::debug;

use crate::dialect::Dialect;
use crate::error::DbResult;
use crate::transaction::DbTransaction;

/// SQLite statement used to open transactions.
///
/// `IMMEDIATE` takes the database write lock up front, so a second writer
/// waits on the busy handler instead of failing on its first write.
pub const SQLITE_BEGIN: &str = "BEGIN IMMEDIATE";

/// A connection checked out of a [`crate::DbPool`].
///
/// The connection returns to the pool when dropped.
#[derive(Debug)]
pub enum DbConnection {
    /// PostgreSQL connection
    #[cfg(feature = "postgres")]
    Postgres(PoolConnection<sqlx::Postgres>),
    /// MySQL connection
    #[cfg(feature = "mysql")]
    MySql(PoolConnection<sqlx::MySql>),
    /// SQLite connection
    #[cfg(feature = "sqlite")]
    Sqlite(PoolConnection<sqlx::Sqlite>),
}

impl DbConnection {
    /// Get the dialect of this connection.
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

    /// Execute one SQL statement outside of any transaction.
    pub async fn execute(&mut self, sql: &str) -> DbResult<u64> {
        use sqlx::Executor;

        debug!(sql = %sql, "Executing statement on connection");

        let affected = match self {
            #[cfg(feature = "postgres")]
            Self::Postgres(conn) => (&mut **conn).execute(sql).await?.rows_affected(),
            #[cfg(feature = "mysql")]
            Self::MySql(conn) => (&mut **conn).execute(sql).await?.rows_affected(),
            #[cfg(feature = "sqlite")]
            Self::Sqlite(conn) => (&mut **conn).execute(sql).await?.rows_affected(),
        };
        Ok(affected)
    }

    /// Start a transaction on this connection.
    ///
    /// SQLite transactions open with [`SQLITE_BEGIN`].
    pub async fn begin(&mut self) -> DbResult<DbTransaction<'_>> {
        use sqlx::Connection;

        let tx = match self {
            #[cfg(feature = "postgres")]
            Self::Postgres(conn) => DbTransaction::Postgres(Connection::begin(&mut **conn).await?),
            #[cfg(feature = "mysql")]
            Self::MySql(conn) => DbTransaction::MySql(Connection::begin(&mut **conn).await?),
            #[cfg(feature = "sqlite")]
            Self::Sqlite(conn) => {
                DbTransaction::Sqlite(Connection::begin_with(&mut **conn, SQLITE_BEGIN).await?)
            }
        };
        Ok(tx)
    }

    /// Close the underlying session instead of returning it to the pool.
    pub async fn close(self) {
        let result = match self {
            #[cfg(feature = "postgres")]
            Self::Postgres(conn) => conn.close().await,
            #[cfg(feature = "mysql")]
            Self::MySql(conn) => conn.close().await,
            #[cfg(feature = "sqlite")]
            Self::Sqlite(conn) => conn.close().await,
        };
        if let Err(err) = result {
            debug!(error = %err, "Error closing connection");
        }
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::config::DbOptions;
    use crate::pool::DbPool;

    #[tokio::test]
    async fn test_connection_transaction_commits() {
        let pool = DbPool::connect(&DbOptions::from_dsn(":memory:")).await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        assert_eq!(conn.dialect(), Dialect::Sqlite);

        conn.execute("CREATE TABLE notes (id INTEGER PRIMARY KEY)").await.unwrap();
        let mut tx = conn.begin().await.unwrap();
        tx.execute("INSERT INTO notes (id) VALUES (1)").await.unwrap();
        tx.commit().await.unwrap();

        // The connection stays usable after the transaction ends.
        let count = conn.execute("DELETE FROM notes").await.unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_sqlite_begin_takes_write_lock() {
        let dir = tempfile::tempdir().unwrap();
        let dsn = format!("file:{}", dir.path().join("lock.db").display());
        let options = DbOptions::from_dsn(dsn);

        let first = DbPool::connect(&options).await.unwrap();
        let second = DbPool::connect(&options).await.unwrap();
        first.execute("CREATE TABLE notes (id INTEGER PRIMARY KEY)").await.unwrap();

        let mut holder = first.acquire().await.unwrap();
        let tx = holder.begin().await.unwrap();

        // A reserved lock is held before any write, so a competing immediate
        // transaction cannot start until the holder finishes.
        let sqlite = second.as_sqlite().unwrap().clone();
        let waiter = tokio::spawn(async move {
            let mut conn = sqlite.acquire().await.unwrap();
            sqlx::Connection::begin_with(&mut *conn, SQLITE_BEGIN)
                .await
                .map(|_| ())
        });
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        assert!(!waiter.is_finished());

        tx.commit().await.unwrap();
        waiter.await.unwrap().unwrap();
    }
}
