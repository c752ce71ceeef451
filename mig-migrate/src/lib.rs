//! # mig-migrate
//!
//! Resumable SQL migrations. Migration files live in
//! `<path>/<project>/<name>.up.sql`, are applied in name order, and every
//! file's progress is checkpointed per statement in a `migrations` table so
//! an interrupted or failed run picks up where it stopped.
//!
//! ```rust,no_run
//! use mig_db::{DbOptions, connect_with_retry};
//! use mig_migrate::{MigrateOptions, MigrationStore, Runner};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> mig_migrate::MigrateResult<()> {
//! let options = MigrateOptions::new().with_project("stats");
//!
//! let mut store = MigrationStore::new();
//! store.load(&options).await?;
//!
//! let pool = connect_with_retry(&DbOptions::from_env(), &CancellationToken::new()).await?;
//! let report = Runner::new(&store).run(&pool, &options.project).await?;
//! println!("applied {} statements", report.applied());
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod runner;
pub mod statements;
pub mod store;

pub use checkpoint::{MigrationState, STATUS_OK, bootstrap_sql};
pub use config::{
    CONFIG_FILE, DEFAULT_PATH, DatabaseConfig, MigConfig, MigrateOptions, MigrationsConfig,
    parse_duration,
};
pub use error::{MigrateResult, MigrationError};
pub use runner::{FileOutcome, RunReport, Runner};
pub use statements::split_statements;
pub use store::{MigrationFs, MigrationStore, UP_SUFFIX};

use mig_db::{DbOptions, connect_with_retry};
use tokio_util::sync::CancellationToken;

/// Load, then print or apply, the migrations described by `options`.
///
/// With `options.apply` unset nothing connects to the database and `None` is
/// returned; otherwise the connection is retried per `db_options` until it
/// succeeds, times out or `cancel` fires.
pub async fn migrate(
    options: &MigrateOptions,
    db_options: &DbOptions,
    cancel: &CancellationToken,
) -> MigrateResult<Option<RunReport>> {
    let mut store = MigrationStore::new();
    store.load(options).await?;

    let runner = Runner::new(&store).with_verbose(options.verbose);
    if !options.apply {
        runner.print(&options.project)?;
        return Ok(None);
    }

    let pool = connect_with_retry(db_options, cancel).await?;
    let report = runner.run(&pool, &options.project).await;
    pool.close().await;
    report.map(Some)
}
