//! Connection pool management.

use tracing::debug;

use crate::config::DbOptions;
use crate::connection::DbConnection;
use crate::dialect::Dialect;
use crate::dsn::{self, mask_dsn};
use crate::error::{DbError, DbResult};
use crate::transaction::DbTransaction;

/// A wrapper around SQLx connection pools supporting multiple dialects.
#[derive(Clone, Debug)]
pub enum DbPool {
    /// PostgreSQL connection pool
    #[cfg(feature = "postgres")]
    Postgres(sqlx::PgPool),
    /// MySQL connection pool
    #[cfg(feature = "mysql")]
    MySql(sqlx::MySqlPool),
    /// SQLite connection pool
    #[cfg(feature = "sqlite")]
    Sqlite(sqlx::SqlitePool),
}

impl DbPool {
    /// Open a pool for `options.dsn` and verify it with a ping.
    ///
    /// This makes exactly one attempt; see [`crate::connect_with_retry`] for
    /// the retrying variant.
    pub async fn connect(options: &DbOptions) -> DbResult<Self> {
        let raw = options.dsn.trim();
        if raw.is_empty() {
            return Err(DbError::EmptyDsn);
        }

        let dialect = Dialect::from_dsn(raw);
        let cleaned = dsn::clean_dsn_for(raw, dialect);
        debug!(dialect = %dialect, dsn = %mask_dsn(&cleaned, dialect), "Opening connection pool");

        let pool = Self::open(dialect, &cleaned, options.max_connections).await?;
        pool.verified().await
    }

    /// Ping a freshly opened pool, closing it when the ping fails.
    async fn verified(self) -> DbResult<Self> {
        if let Err(err) = self.ping().await {
            self.close().await;
            return Err(err);
        }
        Ok(self)
    }

    #[allow(unused_variables)]
    async fn open(dialect: Dialect, dsn: &str, max_connections: u32) -> DbResult<Self> {
        match dialect {
            #[cfg(feature = "postgres")]
            Dialect::Postgres => {
                use std::str::FromStr;

                let options = sqlx::postgres::PgConnectOptions::from_str(dsn)?;
                let pool = sqlx::postgres::PgPoolOptions::new()
                    .max_connections(max_connections)
                    .connect_with(options)
                    .await?;
                Ok(Self::Postgres(pool))
            }
            #[cfg(feature = "mysql")]
            Dialect::MySql => {
                let options = mysql_connect_options(&dsn::MySqlDsn::parse(dsn)?);
                let pool = sqlx::mysql::MySqlPoolOptions::new()
                    .max_connections(max_connections)
                    .connect_with(options)
                    .await?;
                Ok(Self::MySql(pool))
            }
            #[cfg(feature = "sqlite")]
            Dialect::Sqlite => {
                let target = dsn::SqliteTarget::parse(dsn);
                let options = sqlite_connect_options(&target)?;
                let pool_options = sqlx::sqlite::SqlitePoolOptions::new();
                // Every new connection to :memory: is a fresh, empty database,
                // so keep exactly one connection alive for the pool's lifetime.
                let pool_options = if target.is_memory() {
                    pool_options
                        .max_connections(1)
                        .idle_timeout(None)
                        .max_lifetime(None)
                } else {
                    pool_options.max_connections(max_connections)
                };
                let pool = pool_options.connect_with(options).await?;
                Ok(Self::Sqlite(pool))
            }
            #[allow(unreachable_patterns)]
            _ => Err(DbError::DialectDisabled(dialect.name().to_string())),
        }
    }

    /// Get the dialect of this pool.
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

    /// Check that a connection can be acquired and answers.
    pub async fn ping(&self) -> DbResult<()> {
        use sqlx::Connection;

        match self {
            #[cfg(feature = "postgres")]
            Self::Postgres(pool) => pool.acquire().await?.ping().await?,
            #[cfg(feature = "mysql")]
            Self::MySql(pool) => pool.acquire().await?.ping().await?,
            #[cfg(feature = "sqlite")]
            Self::Sqlite(pool) => pool.acquire().await?.ping().await?,
        }
        Ok(())
    }

    /// Execute one SQL statement outside of any transaction.
    pub async fn execute(&self, sql: &str) -> DbResult<u64> {
        debug!(sql = %sql, "Executing statement");

        let affected = match self {
            #[cfg(feature = "postgres")]
            Self::Postgres(pool) => sqlx::raw_sql(sql).execute(pool).await?.rows_affected(),
            #[cfg(feature = "mysql")]
            Self::MySql(pool) => sqlx::raw_sql(sql).execute(pool).await?.rows_affected(),
            #[cfg(feature = "sqlite")]
            Self::Sqlite(pool) => sqlx::raw_sql(sql).execute(pool).await?.rows_affected(),
        };
        Ok(affected)
    }

    /// Check out a single connection.
    pub async fn acquire(&self) -> DbResult<DbConnection> {
        let conn = match self {
            #[cfg(feature = "postgres")]
            Self::Postgres(pool) => DbConnection::Postgres(pool.acquire().await?),
            #[cfg(feature = "mysql")]
            Self::MySql(pool) => DbConnection::MySql(pool.acquire().await?),
            #[cfg(feature = "sqlite")]
            Self::Sqlite(pool) => DbConnection::Sqlite(pool.acquire().await?),
        };
        Ok(conn)
    }

    /// Start a transaction on a pooled connection.
    ///
    /// SQLite transactions open with [`crate::connection::SQLITE_BEGIN`].
    pub async fn begin(&self) -> DbResult<DbTransaction<'static>> {
        let tx = match self {
            #[cfg(feature = "postgres")]
            Self::Postgres(pool) => DbTransaction::Postgres(pool.begin().await?),
            #[cfg(feature = "mysql")]
            Self::MySql(pool) => DbTransaction::MySql(pool.begin().await?),
            #[cfg(feature = "sqlite")]
            Self::Sqlite(pool) => {
                DbTransaction::Sqlite(pool.begin_with(crate::connection::SQLITE_BEGIN).await?)
            }
        };
        Ok(tx)
    }

    /// Close the pool.
    pub async fn close(&self) {
        match self {
            #[cfg(feature = "postgres")]
            Self::Postgres(pool) => pool.close().await,
            #[cfg(feature = "mysql")]
            Self::MySql(pool) => pool.close().await,
            #[cfg(feature = "sqlite")]
            Self::Sqlite(pool) => pool.close().await,
        }
    }

    /// Get the underlying PostgreSQL pool.
    #[cfg(feature = "postgres")]
    pub fn as_postgres(&self) -> Option<&sqlx::PgPool> {
        match self {
            Self::Postgres(pool) => Some(pool),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }

    /// Get the underlying MySQL pool.
    #[cfg(feature = "mysql")]
    pub fn as_mysql(&self) -> Option<&sqlx::MySqlPool> {
        match self {
            Self::MySql(pool) => Some(pool),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }

    /// Get the underlying SQLite pool.
    #[cfg(feature = "sqlite")]
    pub fn as_sqlite(&self) -> Option<&sqlx::SqlitePool> {
        match self {
            Self::Sqlite(pool) => Some(pool),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }
}

#[cfg(feature = "mysql")]
fn mysql_connect_options(dsn: &dsn::MySqlDsn) -> sqlx::mysql::MySqlConnectOptions {
    let mut options = sqlx::mysql::MySqlConnectOptions::new();

    options = match &dsn.addr {
        dsn::MySqlAddr::Tcp { host, port } => {
            let options = options.host(host);
            match port {
                Some(port) => options.port(*port),
                None => options,
            }
        }
        dsn::MySqlAddr::Unix(path) => options.socket(path),
    };
    if let Some(user) = &dsn.user {
        options = options.username(user);
    }
    if let Some(password) = &dsn.password {
        options = options.password(password);
    }
    if let Some(database) = &dsn.database {
        options = options.database(database);
    }
    if let Some(collation) = dsn.param("collation") {
        options = options.collation(collation);
    }
    // parseTime and loc only steer the go driver's row scanning; SQLx
    // decodes temporal types natively.
    options
}

#[cfg(feature = "sqlite")]
fn sqlite_connect_options(
    target: &dsn::SqliteTarget,
) -> DbResult<sqlx::sqlite::SqliteConnectOptions> {
    use std::str::FromStr;

    use sqlx::sqlite::SqliteConnectOptions;

    let options = match target {
        dsn::SqliteTarget::Memory => SqliteConnectOptions::from_str("sqlite::memory:")?,
        dsn::SqliteTarget::File(path) => SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true),
        dsn::SqliteTarget::Url(url) => SqliteConnectOptions::from_str(url)?,
    };
    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_dsn_is_rejected() {
        let err = DbPool::connect(&DbOptions::from_dsn("  ")).await.unwrap_err();
        assert!(matches!(err, DbError::EmptyDsn));
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_connect_sqlite_memory() {
        let pool = DbPool::connect(&DbOptions::from_dsn(":memory:")).await.unwrap();
        assert_eq!(pool.dialect(), Dialect::Sqlite);

        pool.execute("CREATE TABLE t (id INTEGER PRIMARY KEY)").await.unwrap();
        let inserted = pool.execute("INSERT INTO t (id) VALUES (1)").await.unwrap();
        assert_eq!(inserted, 1);

        // The table must still be visible: the pool keeps one live connection.
        let sqlite = pool.as_sqlite().unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM t")
            .fetch_one(sqlite)
            .await
            .unwrap();
        assert_eq!(count, 1);
        pool.close().await;
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_failed_ping_closes_pool() {
        let dir = tempfile::tempdir().unwrap();
        let dsn = dir.path().join("ping.db").display().to_string();
        let pool = DbPool::connect(&DbOptions::from_dsn(dsn)).await.unwrap();
        let sqlite = pool.as_sqlite().unwrap().clone();

        sqlite.close().await;
        let err = pool.verified().await.unwrap_err();
        assert!(matches!(err, DbError::Sqlx(sqlx::Error::PoolClosed)));
        assert!(sqlite.is_closed());
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_verified_keeps_live_pool_open() {
        let pool = DbPool::connect(&DbOptions::from_dsn(":memory:")).await.unwrap();
        let pool = pool.verified().await.unwrap();
        assert!(!pool.as_sqlite().unwrap().is_closed());
        pool.close().await;
    }

    #[cfg(feature = "mysql")]
    #[test]
    fn test_mysql_connect_options_from_dsn() {
        let parsed = dsn::MySqlDsn::parse(
            "root:pw@tcp(db:3307)/app?collation=utf8mb4_general_ci&parseTime=true",
        )
        .unwrap();
        let options = mysql_connect_options(&parsed);
        assert_eq!(options.get_host(), "db");
        assert_eq!(options.get_port(), 3307);
        assert_eq!(options.get_username(), "root");
        assert_eq!(options.get_database(), Some("app"));
        assert_eq!(options.get_collation(), Some("utf8mb4_general_ci"));
    }
}
