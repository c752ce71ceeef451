//! Cross-process advisory locking.
//!
//! A lock is taken inside a transaction and keyed by an arbitrary string,
//! `project:filename` for the migration runner. PostgreSQL locks end with the
//! transaction. SQLite transactions already hold the database write lock
//! from `BEGIN IMMEDIATE`. MySQL named locks belong to the session, so the
//! transaction must run on a [`DbConnection`] and [`release_lock`] is called
//! on that connection once the transaction has committed or rolled back.

use tracing::debug;

use crate::connection::DbConnection;
use crate::dialect::Dialect;
use crate::error::{DbError, DbResult};
use crate::transaction::DbTransaction;

/// Seconds MySQL waits for a contended lock.
pub const MYSQL_LOCK_TIMEOUT_SECS: i64 = 30;

/// djb2 hash of a lock key with wrapping 64-bit arithmetic.
///
/// ```rust
/// use mig_db::lock::hash_key;
///
/// assert_eq!(hash_key(""), 5381);
/// assert_eq!(hash_key("a"), 5381 * 33 + 97);
/// ```
pub fn hash_key(key: &str) -> i64 {
    key.chars()
        .fold(5381i64, |h, c| h.wrapping_mul(33).wrapping_add(i64::from(u32::from(c))))
}

/// MySQL lock name for a key: the signed hexadecimal form of [`hash_key`].
///
/// Lock names are capped at 64 characters, so the raw key is never used.
pub fn mysql_lock_name(key: &str) -> String {
    let hash = hash_key(key);
    if hash < 0 {
        format!("-{:x}", hash.unsigned_abs())
    } else {
        format!("{hash:x}")
    }
}

fn check_dialect(actual: Dialect, dialect_name: &str) -> DbResult<Dialect> {
    let dialect = Dialect::from_name(dialect_name)
        .map_err(|_| DbError::lock_failed(format!("locking not supported for driver: {dialect_name}")))?;
    if dialect != actual {
        return Err(DbError::lock_failed(format!(
            "driver {dialect} does not match {actual} connection"
        )));
    }
    Ok(dialect)
}

/// Acquire the advisory lock for `key` inside `tx`.
///
/// Blocks until the lock is granted. MySQL gives up after
/// [`MYSQL_LOCK_TIMEOUT_SECS`] and reports [`DbError::LockFailed`].
pub async fn acquire_lock(
    tx: &mut DbTransaction<'_>,
    dialect_name: &str,
    key: &str,
) -> DbResult<()> {
    let dialect = check_dialect(tx.dialect(), dialect_name)?;
    debug!(dialect = %dialect, key = %key, "Acquiring lock");

    match tx {
        #[cfg(feature = "postgres")]
        DbTransaction::Postgres(tx) => {
            sqlx::query("SELECT pg_advisory_xact_lock($1)")
                .bind(hash_key(key))
                .execute(&mut **tx)
                .await
                .map_err(|e| DbError::lock_failed(format!("advisory lock: {e}")))?;
        }
        #[cfg(feature = "mysql")]
        DbTransaction::MySql(tx) => {
            let granted: Option<i64> = sqlx::query_scalar("SELECT GET_LOCK(?, ?)")
                .bind(mysql_lock_name(key))
                .bind(MYSQL_LOCK_TIMEOUT_SECS)
                .fetch_one(&mut **tx)
                .await
                .map_err(|e| DbError::lock_failed(e.to_string()))?;
            if granted != Some(1) {
                return Err(DbError::lock_failed("timeout or error"));
            }
        }
        #[cfg(feature = "sqlite")]
        DbTransaction::Sqlite(_) => {}
    }
    Ok(())
}

/// Release a lock taken with [`acquire_lock`] on a transaction of `conn`.
///
/// Call it after the transaction has ended. Only MySQL needs this; other
/// dialects release on commit or rollback.
pub async fn release_lock(conn: &mut DbConnection, dialect_name: &str, key: &str) -> DbResult<()> {
    check_dialect(conn.dialect(), dialect_name)?;

    #[cfg(feature = "mysql")]
    if let DbConnection::MySql(conn) = conn {
        debug!(key = %key, "Releasing lock");
        sqlx::query("SELECT RELEASE_LOCK(?)")
            .bind(mysql_lock_name(key))
            .execute(&mut **conn)
            .await?;
    }
    #[cfg(not(feature = "mysql"))]
    let _ = key;

    Ok(())
}
