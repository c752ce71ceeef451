//! # mig-introspect
//!
//! Reads table, column and index structure from MySQL, PostgreSQL and SQLite
//! catalogs and normalizes it into one dialect-neutral model.
//!
//! ```rust,no_run
//! use mig_db::{DbOptions, DbPool};
//! use mig_introspect::{list_tables_with_columns, new_describer};
//!
//! # async fn example() -> mig_introspect::IntrospectResult<()> {
//! let pool = DbPool::connect(&DbOptions::from_dsn("./app.db")).await?;
//! let describer = new_describer(pool.dialect().name())?;
//!
//! for table in list_tables_with_columns(&pool, describer.as_ref()).await? {
//!     if table.ignore() {
//!         continue;
//!     }
//!     println!("{} ({} columns)", table.name, table.columns.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Type normalization is exposed separately in [`normalize`] so callers can
//! classify type strings without a database.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod describer;
pub mod error;
pub mod model;
pub mod normalize;
pub mod title;

#[cfg(feature = "mysql")]
pub mod mysql;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use describer::{Describer, describer_for, list_tables_with_columns, new_describer};
pub use error::{IntrospectError, IntrospectResult};
pub use model::{CanonicalType, Column, ColumnKey, Index, Table};
pub use normalize::{
    enrich_key_metadata, extract_enum_values, normalize, parse_postgres_int_type,
    parse_sized_type, sort_indexes,
};
pub use title::title;

#[cfg(feature = "mysql")]
pub use mysql::MysqlDescriber;
#[cfg(feature = "postgres")]
pub use postgres::PostgresDescriber;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDescriber;
