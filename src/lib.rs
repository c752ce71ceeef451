//! # mig
//!
//! Database schema introspection and resumable SQL migrations for MySQL,
//! PostgreSQL and SQLite.
//!
//! mig provides:
//! - A dialect-neutral model of tables, columns and indexes read from the
//!   live catalog
//! - Normalization of native column types onto a small canonical type set
//! - Per-statement checkpointed migrations guarded by an advisory lock
//! - Connection retry with a deadline and cancellation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mig::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     mig::logging::init();
//!
//!     let cancel = CancellationToken::new();
//!     let pool = connect(&cancel).await?;
//!
//!     let mut store = MigrationStore::new();
//!     store.load(&MigrateOptions::new()).await?;
//!     Runner::new(&store).run(&pool, "stats").await?;
//!
//!     let describer = new_describer(pool.dialect().name())?;
//!     for table in list_tables_with_columns(&pool, describer.as_ref()).await? {
//!         println!("{}: {}", table.name, table.comment);
//!     }
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// Connections, transactions, locks and logging.
pub mod db {
    pub use mig_db::*;
}

/// Schema introspection and type normalization.
pub mod introspect {
    pub use mig_introspect::*;
}

/// Migration loading and execution.
pub mod migrate {
    pub use mig_migrate::*;
}

pub use mig_db::logging;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::db::{DbOptions, DbPool, Dialect, connect, connect_with_retry};
    pub use crate::introspect::{
        CanonicalType, Column, Describer, Index, Table, list_tables_with_columns, new_describer,
    };
    pub use crate::migrate::{MigConfig, MigrateOptions, MigrationStore, Runner};
    pub use tokio_util::sync::CancellationToken;
}

// Re-export key types at the crate root
pub use mig_db::{DbError, DbResult};
pub use mig_introspect::{IntrospectError, IntrospectResult};
pub use mig_migrate::{MigrateResult, MigrationError};
