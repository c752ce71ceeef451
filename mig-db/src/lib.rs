//! # mig-db
//!
//! Connection management for mig: dialect detection, DSN normalization,
//! connecting with retries, transactions and cross-process advisory locks.
//!
//! ## Connecting
//!
//! ```rust,no_run
//! use mig_db::{DbOptions, connect_with_retry};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> mig_db::DbResult<()> {
//! let cancel = CancellationToken::new();
//! let options = DbOptions::from_dsn("root:secret@tcp(localhost:3306)/app").with_retries(10);
//! let pool = connect_with_retry(&options, &cancel).await?;
//! println!("connected to {}", pool.dialect());
//! # Ok(())
//! # }
//! ```
//!
//! ## Locking
//!
//! ```rust,no_run
//! use mig_db::{DbPool, acquire_lock, release_lock};
//!
//! # async fn example(pool: DbPool) -> mig_db::DbResult<()> {
//! let dialect = pool.dialect().name();
//! let mut conn = pool.acquire().await?;
//! let mut tx = conn.begin().await?;
//! acquire_lock(&mut tx, dialect, "app:0001_init.up.sql").await?;
//! // ... guarded work ...
//! tx.commit().await?;
//! release_lock(&mut conn, dialect, "app:0001_init.up.sql").await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod connect;
pub mod connection;
pub mod dialect;
pub mod dsn;
pub mod error;
pub mod lock;
pub mod logging;
pub mod pool;
pub mod transaction;

pub use config::{DSN_ENV_VAR, DbOptions, EnvSource, MapEnvSource, RetryPolicy, StdEnvSource};
pub use connect::{connect, connect_with_retry};
pub use connection::DbConnection;
pub use dialect::Dialect;
pub use dsn::{clean_dsn, mask_dsn};
pub use error::{DbError, DbResult};
pub use lock::{acquire_lock, hash_key, release_lock};
pub use pool::DbPool;
pub use transaction::DbTransaction;

/// Re-export SQLx for callers that need driver-level access.
pub use sqlx;
