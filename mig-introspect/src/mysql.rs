//! MySQL describer.
//!
//! Catalog text columns are cast to `CHAR` because MySQL 8 reports several
//! `information_schema` columns as binary strings.

use std::collections::HashMap;

use async_trait::async_trait;
use mig_db::{DbPool, Dialect};
use sqlx::mysql::MySqlRow;
use sqlx::{Executor, FromRow, MySqlConnection, MySqlPool, Row};
use tracing::{debug, warn};

use crate::describer::{Describer, mismatch, temp_object_name};
use crate::error::{IntrospectError, IntrospectResult};
use crate::model::{Column, ColumnKey, Index, Table};
use crate::normalize::{
    enrich_key_metadata, extract_enum_values, normalize_column, parse_sized_type,
};

const LIST_TABLES_SQL: &str = "SELECT CAST(TABLE_NAME AS CHAR), CAST(COALESCE(TABLE_COMMENT, '') AS CHAR) \
     FROM information_schema.tables \
     WHERE table_schema=DATABASE() AND table_type='BASE TABLE' \
     ORDER BY table_name ASC";

const TABLE_COMMENT_SQL: &str = "SELECT CAST(COALESCE(TABLE_COMMENT, '') AS CHAR) \
     FROM information_schema.tables \
     WHERE table_schema=DATABASE() AND table_name=?";

const TABLE_COLUMNS_SQL: &str = "SELECT CAST(COLUMN_NAME AS CHAR), CAST(COLUMN_TYPE AS CHAR), \
     CAST(COLUMN_KEY AS CHAR), CAST(COALESCE(COLUMN_COMMENT, '') AS CHAR), CAST(DATA_TYPE AS CHAR) \
     FROM information_schema.columns \
     WHERE table_schema=DATABASE() AND table_name=? \
     ORDER BY ordinal_position ASC";

const TABLE_INDEXES_SQL: &str = "SELECT CAST(INDEX_NAME AS CHAR), \
     CAST(GROUP_CONCAT(COLUMN_NAME ORDER BY SEQ_IN_INDEX) AS CHAR), \
     CAST(MAX(NON_UNIQUE) AS SIGNED) \
     FROM information_schema.STATISTICS \
     WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? \
     GROUP BY INDEX_NAME \
     ORDER BY INDEX_NAME";

/// name, type, key, comment, data type
type ColumnRow = (String, String, String, String, String);

/// Describer for MySQL databases, scoped to `DATABASE()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlDescriber;

impl MysqlDescriber {
    fn pool<'a>(&self, pool: &'a DbPool) -> IntrospectResult<&'a MySqlPool> {
        pool.as_mysql().ok_or_else(|| mismatch(Dialect::MySql, pool))
    }
}

#[async_trait]
impl Describer for MysqlDescriber {
    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    async fn describe(&self, pool: &DbPool, query: &str) -> IntrospectResult<Vec<Column>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(IntrospectError::EmptyQuery);
        }

        let mysql = self.pool(pool)?;
        let table = temp_object_name("mig_temp_tbl");
        let mut conn = mysql
            .acquire()
            .await
            .map_err(IntrospectError::with_context("acquire connection"))?;

        // A temporary table is more reliable than a view here, and LIMIT 0
        // keeps it empty.
        let create = format!("CREATE TEMPORARY TABLE `{table}` AS {query} LIMIT 0");
        debug!(sql = %create, "Creating temporary table");
        (&mut *conn)
            .execute(create.as_str())
            .await
            .map_err(IntrospectError::with_context("create temporary table for query"))?;

        let result = temp_table_columns(&mut conn, &table).await;

        let drop = format!("DROP TEMPORARY TABLE IF EXISTS `{table}`");
        if let Err(err) = (&mut *conn).execute(drop.as_str()).await {
            warn!(table = %table, error = %err, "Failed to drop temporary table");
        }

        result
    }

    async fn describe_table(&self, pool: &DbPool, table: &str) -> IntrospectResult<Table> {
        let mysql = self.pool(pool)?;

        let comment: String = sqlx::query_scalar(TABLE_COMMENT_SQL)
            .bind(table)
            .fetch_optional(mysql)
            .await
            .map_err(IntrospectError::with_context(format!(
                "get table comment for {table}"
            )))?
            .ok_or_else(|| IntrospectError::TableNotFound(table.to_string()))?;

        let rows: Vec<ColumnRow> = sqlx::query_as(TABLE_COLUMNS_SQL)
            .bind(table)
            .fetch_all(mysql)
            .await
            .map_err(IntrospectError::with_context(format!("get columns for table {table}")))?;

        let mut columns: Vec<Column> = rows
            .into_iter()
            .map(|(name, raw_type, key, column_comment, data_type)| {
                let mut column = Column {
                    name,
                    data_type,
                    key: ColumnKey::parse(&key),
                    comment: column_comment,
                    ..Default::default()
                };
                if raw_type.to_lowercase().contains("enum") {
                    column.values = extract_enum_values(&raw_type);
                    column.column_type = "enum".to_string();
                } else {
                    let (base, size) = parse_sized_type(&raw_type);
                    column.column_type = base;
                    column.size = size;
                }
                normalize_column(&mut column);
                column
            })
            .collect();

        let indexes = self.table_indexes(pool, table).await?;
        enrich_key_metadata(&mut columns, &indexes);

        Ok(Table {
            name: table.to_string(),
            comment,
            columns,
            indexes,
        })
    }

    async fn list_tables(&self, pool: &DbPool) -> IntrospectResult<Vec<Table>> {
        let mysql = self.pool(pool)?;

        let rows: Vec<(String, String)> = sqlx::query_as(LIST_TABLES_SQL)
            .fetch_all(mysql)
            .await
            .map_err(IntrospectError::with_context("list tables"))?;

        Ok(rows
            .into_iter()
            .map(|(name, comment)| Table::new(name).with_comment(comment))
            .collect())
    }

    async fn table_indexes(&self, pool: &DbPool, table: &str) -> IntrospectResult<Vec<Index>> {
        let mysql = self.pool(pool)?;

        let rows: Vec<(String, String, i64)> = sqlx::query_as(TABLE_INDEXES_SQL)
            .bind(table)
            .fetch_all(mysql)
            .await
            .map_err(IntrospectError::with_context(format!("get indexes for table {table}")))?;

        Ok(rows.into_iter().map(index_from_statistics).collect())
    }
}

fn index_from_statistics((name, column_list, non_unique): (String, String, i64)) -> Index {
    Index {
        primary: name == "PRIMARY",
        unique: non_unique == 0,
        columns: column_list.split(',').map(str::to_string).collect(),
        name,
    }
}

/// Read a text column that MySQL may report as either a string or a blob.
fn row_text(row: &MySqlRow, column: &str) -> String {
    row.try_get::<String, _>(column)
        .or_else(|_| {
            row.try_get::<Vec<u8>, _>(column)
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        })
        .unwrap_or_default()
}

async fn temp_table_columns(conn: &mut MySqlConnection, table: &str) -> IntrospectResult<Vec<Column>> {
    let describe = format!("DESCRIBE `{table}`");
    let rows = (&mut *conn)
        .fetch_all(describe.as_str())
        .await
        .map_err(IntrospectError::with_context("describe temporary table"))?;

    let mut columns: Vec<Column> = rows
        .iter()
        .map(|row| {
            let mut column = Column::new(row_text(row, "Field"), row_text(row, "Type"));
            column.key = ColumnKey::parse(&row_text(row, "Key"));
            column
        })
        .collect();

    enrich_from_information_schema(conn, table, &mut columns).await;
    for column in &mut columns {
        normalize_column(column);
    }

    Ok(columns)
}

/// Fill keys, comments and data types that `DESCRIBE` leaves out.
///
/// Best effort: any failure leaves the columns as they are.
async fn enrich_from_information_schema(
    conn: &mut MySqlConnection,
    table: &str,
    columns: &mut [Column],
) {
    let query = sqlx::query(
        "SELECT CAST(COLUMN_NAME AS CHAR), CAST(COLUMN_TYPE AS CHAR), CAST(COLUMN_KEY AS CHAR), \
         CAST(COALESCE(COLUMN_COMMENT, '') AS CHAR), CAST(DATA_TYPE AS CHAR) \
         FROM information_schema.columns \
         WHERE table_schema = DATABASE() AND table_name = ? \
         ORDER BY ordinal_position",
    )
    .bind(table);
    let rows = (&mut *conn)
        .fetch_all(query)
        .await
        .and_then(|rows| rows.iter().map(ColumnRow::from_row).collect::<Result<Vec<_>, _>>());
    let rows = match rows {
        Ok(rows) => rows,
        Err(err) => {
            debug!(table = %table, error = %err, "Skipping information_schema enrichment");
            return;
        }
    };

    let schema: HashMap<String, ColumnRow> =
        rows.into_iter().map(|row| (row.0.clone(), row)).collect();

    for column in columns.iter_mut() {
        let Some((_, _, key, comment, data_type)) = schema.get(&column.name) else {
            continue;
        };
        if column.key.is_none() {
            column.key = ColumnKey::parse(key);
        }
        if column.comment.is_empty() && !comment.is_empty() {
            column.comment = comment.clone();
        }
        if !data_type.is_empty() {
            column.data_type = data_type.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_index_from_statistics() {
        let primary = index_from_statistics(("PRIMARY".into(), "id".into(), 0));
        assert!(primary.primary);
        assert!(primary.unique);

        let composite = index_from_statistics(("idx_owner".into(), "owner_id,created_at".into(), 1));
        assert!(!composite.primary);
        assert!(!composite.unique);
        assert_eq!(composite.columns, vec!["owner_id", "created_at"]);
    }

    #[test]
    fn test_catalog_queries_cast_to_text() {
        assert!(TABLE_COLUMNS_SQL.contains("CAST(COLUMN_TYPE AS CHAR)"));
        assert!(TABLE_INDEXES_SQL.contains("CAST(MAX(NON_UNIQUE) AS SIGNED)"));
        assert!(LIST_TABLES_SQL.contains("table_type='BASE TABLE'"));
    }
}
