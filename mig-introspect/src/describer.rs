//! The per-dialect describer interface and the orchestration built on it.

use async_trait::async_trait;
use chrono::Utc;
use mig_db::{DbError, DbPool, Dialect};
use tracing::debug;

use crate::error::{IntrospectError, IntrospectResult};
use crate::model::{Column, Index, Table};
use crate::normalize::sort_indexes;
use crate::title::title;

/// Schema introspection for one SQL dialect.
///
/// Every call reads the catalog afresh; nothing is cached between calls.
#[async_trait]
pub trait Describer: Send + Sync {
    /// Dialect this describer reads.
    fn dialect(&self) -> Dialect;

    /// Columns produced by an arbitrary query.
    ///
    /// The query is materialized as a temporary object on a dedicated
    /// connection, inspected, and dropped again whether or not inspection
    /// succeeded.
    async fn describe(&self, pool: &DbPool, query: &str) -> IntrospectResult<Vec<Column>>;

    /// Full structure of one table: comment, normalized columns and indexes.
    async fn describe_table(&self, pool: &DbPool, table: &str) -> IntrospectResult<Table>;

    /// Base tables ordered by name, without columns.
    async fn list_tables(&self, pool: &DbPool) -> IntrospectResult<Vec<Table>>;

    /// Indexes of one table, including the primary key.
    async fn table_indexes(&self, pool: &DbPool, table: &str) -> IntrospectResult<Vec<Index>>;
}

/// Select a describer by driver name.
///
/// Accepts `mysql`, `postgres`, `postgresql`, `pgx`, `sqlite` and `sqlite3`.
pub fn new_describer(dialect_name: &str) -> IntrospectResult<Box<dyn Describer>> {
    let dialect = Dialect::from_name(dialect_name)
        .map_err(|_| IntrospectError::UnknownDialect(dialect_name.to_string()))?;
    describer_for(dialect)
}

/// The describer for a known dialect.
pub fn describer_for(dialect: Dialect) -> IntrospectResult<Box<dyn Describer>> {
    match dialect {
        #[cfg(feature = "mysql")]
        Dialect::MySql => Ok(Box::new(crate::mysql::MysqlDescriber)),
        #[cfg(feature = "postgres")]
        Dialect::Postgres => Ok(Box::new(crate::postgres::PostgresDescriber)),
        #[cfg(feature = "sqlite")]
        Dialect::Sqlite => Ok(Box::new(crate::sqlite::SqliteDescriber)),
        #[allow(unreachable_patterns)]
        _ => Err(DbError::DialectDisabled(dialect.name().to_string()).into()),
    }
}

/// Every base table with columns and indexes filled in.
///
/// Tables without a catalog comment get a title derived from their name, and
/// indexes are sorted primary first.
pub async fn list_tables_with_columns(
    pool: &DbPool,
    describer: &dyn Describer,
) -> IntrospectResult<Vec<Table>> {
    let mut tables = describer.list_tables(pool).await?;
    debug!(dialect = %describer.dialect(), count = tables.len(), "Listed tables");

    for table in &mut tables {
        let full = describer.describe_table(pool, &table.name).await?;
        table.columns = full.columns;
        table.indexes = full.indexes;

        if table.comment.is_empty() {
            table.comment = title(&table.name);
        }
        sort_indexes(&mut table.indexes);
    }

    Ok(tables)
}

/// Unique name for a temporary catalog object.
pub(crate) fn temp_object_name(prefix: &str) -> String {
    format!("{prefix}_{}", Utc::now().timestamp_nanos_opt().unwrap_or_default())
}

pub(crate) fn mismatch(describer: Dialect, pool: &DbPool) -> IntrospectError {
    IntrospectError::DialectMismatch {
        describer: describer.name(),
        pool: pool.dialect().name(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(all(feature = "mysql", feature = "postgres", feature = "sqlite"))]
    #[test]
    fn test_new_describer_names() {
        for name in ["mysql", "postgres", "postgresql", "pgx", "sqlite", "sqlite3"] {
            let describer = new_describer(name).unwrap();
            assert_eq!(describer.dialect(), Dialect::from_name(name).unwrap());
        }
    }

    #[test]
    fn test_new_describer_unknown() {
        let err = new_describer("oracle").err().unwrap();
        assert!(matches!(err, IntrospectError::UnknownDialect(ref name) if name == "oracle"));
        assert_eq!(err.to_string(), "unknown dialect: oracle");
    }

    #[test]
    fn test_temp_object_name() {
        let name = temp_object_name("mig_temp_view");
        assert!(name.starts_with("mig_temp_view_"));
        assert!(name["mig_temp_view_".len()..].chars().all(|c| c.is_ascii_digit()));
    }
}
