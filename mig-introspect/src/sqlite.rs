//! SQLite describer.
//!
//! SQLite has no catalog comments and no enum type. Columns get a comment
//! derived from their name, and enum values are recovered from
//! `CHECK (col IN (...))` clauses in the stored `CREATE TABLE` text.

use std::collections::HashMap;
use std::sync::LazyLock;

use async_trait::async_trait;
use mig_db::{DbPool, Dialect};
use regex_lite::Regex;
use sqlx::{Executor, FromRow, SqliteConnection, SqlitePool};
use tracing::{debug, warn};

use crate::describer::{Describer, mismatch, temp_object_name};
use crate::error::{IntrospectError, IntrospectResult};
use crate::model::{Column, ColumnKey, Index, Table};
use crate::normalize::{enrich_key_metadata, normalize_column, parse_sized_type};
use crate::title::title;

static IN_CLAUSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bIN\s*\(").expect("valid IN clause pattern"));

/// `PRAGMA table_info`: cid, name, type, notnull, dflt_value, pk.
type TableInfoRow = (i64, String, String, i64, Option<String>, i64);

/// `PRAGMA index_list`: seq, name, unique, origin, partial.
type IndexListRow = (i64, String, i64, String, i64);

/// `PRAGMA index_info`: seqno, cid, name.
type IndexInfoRow = (i64, i64, Option<String>);

/// Describer for SQLite databases.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDescriber;

impl SqliteDescriber {
    fn pool<'a>(&self, pool: &'a DbPool) -> IntrospectResult<&'a SqlitePool> {
        pool.as_sqlite().ok_or_else(|| mismatch(Dialect::Sqlite, pool))
    }
}

#[async_trait]
impl Describer for SqliteDescriber {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn describe(&self, pool: &DbPool, query: &str) -> IntrospectResult<Vec<Column>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(IntrospectError::EmptyQuery);
        }

        let sqlite = self.pool(pool)?;
        let view = temp_object_name("mig_temp_view");
        let mut conn = sqlite
            .acquire()
            .await
            .map_err(IntrospectError::with_context("acquire connection"))?;

        let create = format!("CREATE TEMPORARY VIEW {view} AS {query}");
        debug!(sql = %create, "Creating temporary view");
        (&mut *conn)
            .execute(create.as_str())
            .await
            .map_err(IntrospectError::with_context("create temporary view for query"))?;

        let result = view_columns(&mut conn, &view).await;

        let drop = format!("DROP VIEW IF EXISTS {view}");
        if let Err(err) = (&mut *conn).execute(drop.as_str()).await {
            warn!(view = %view, error = %err, "Failed to drop temporary view");
        }

        result
    }

    async fn describe_table(&self, pool: &DbPool, table: &str) -> IntrospectResult<Table> {
        let sqlite = self.pool(pool)?;

        let rows: Vec<TableInfoRow> = sqlx::query_as(&pragma("table_info", table))
            .fetch_all(sqlite)
            .await
            .map_err(IntrospectError::with_context(format!("query table info for {table}")))?;

        if rows.is_empty() {
            return Err(IntrospectError::TableNotFound(table.to_string()));
        }
        let mut columns: Vec<Column> = rows.into_iter().map(pragma_column).collect();

        let checks = check_constraints(sqlite, table).await;
        for column in &mut columns {
            if let Some(constraint) = checks.get(&column.name).and_then(|c| c.first()) {
                column.values = enum_values_from_check(constraint);
            }
            normalize_column(column);
        }

        let indexes = self.table_indexes(pool, table).await?;
        enrich_key_metadata(&mut columns, &indexes);

        Ok(Table {
            name: table.to_string(),
            comment: String::new(),
            columns,
            indexes,
        })
    }

    async fn list_tables(&self, pool: &DbPool) -> IntrospectResult<Vec<Table>> {
        let sqlite = self.pool(pool)?;

        let names: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_schema WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name ASC",
        )
        .fetch_all(sqlite)
        .await
        .map_err(IntrospectError::with_context("list tables"))?;

        Ok(names.into_iter().map(|(name,)| Table::new(name)).collect())
    }

    async fn table_indexes(&self, pool: &DbPool, table: &str) -> IntrospectResult<Vec<Index>> {
        let sqlite = self.pool(pool)?;

        let list: Vec<IndexListRow> = sqlx::query_as(&pragma("index_list", table))
            .fetch_all(sqlite)
            .await
            .map_err(IntrospectError::with_context(format!("get indexes for table {table}")))?;

        let mut indexes = Vec::with_capacity(list.len() + 1);
        for (_, name, unique, origin, _) in list {
            let info: Vec<IndexInfoRow> = match sqlx::query_as(&pragma("index_info", &name))
                .fetch_all(sqlite)
                .await
            {
                Ok(info) => info,
                Err(err) => {
                    debug!(index = %name, error = %err, "Skipping unreadable index");
                    continue;
                }
            };

            indexes.push(Index {
                name,
                columns: info.into_iter().filter_map(|(_, _, col)| col).collect(),
                primary: origin == "pk",
                unique: unique == 1,
            });
        }

        // A rowid primary key has no entry in index_list, so build one from
        // table_info to match what MySQL and PostgreSQL report.
        if indexes.iter().any(|idx| idx.primary) {
            return Ok(indexes);
        }
        let rows: Vec<TableInfoRow> = match sqlx::query_as(&pragma("table_info", table))
            .fetch_all(sqlite)
            .await
        {
            Ok(rows) => rows,
            Err(_) => return Ok(indexes),
        };

        let mut pk: Vec<(i64, String)> = rows
            .into_iter()
            .filter(|row| row.5 > 0)
            .map(|row| (row.5, row.1))
            .collect();
        pk.sort();
        if !pk.is_empty() {
            indexes.push(Index {
                name: String::new(),
                columns: pk.into_iter().map(|(_, name)| name).collect(),
                primary: true,
                unique: true,
            });
        }

        Ok(indexes)
    }
}

async fn view_columns(conn: &mut SqliteConnection, view: &str) -> IntrospectResult<Vec<Column>> {
    let context = "query column metadata with PRAGMA table_info";
    let sql = pragma("table_info", view);
    let rows = (&mut *conn)
        .fetch_all(sql.as_str())
        .await
        .map_err(IntrospectError::with_context(context))?;
    let rows = rows
        .iter()
        .map(TableInfoRow::from_row)
        .collect::<Result<Vec<_>, _>>()
        .map_err(IntrospectError::with_context(context))?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let mut column = pragma_column(row);
            normalize_column(&mut column);
            column
        })
        .collect())
}

fn pragma(name: &str, target: &str) -> String {
    format!("PRAGMA {name}(\"{}\")", target.replace('"', "\"\""))
}

fn pragma_column((_, name, raw_type, _, _, pk): TableInfoRow) -> Column {
    let (_, size) = parse_sized_type(&raw_type);
    Column {
        comment: title(&name),
        data_type: sqlite_data_type(&raw_type),
        key: if pk > 0 { ColumnKey::Primary } else { ColumnKey::None },
        size,
        column_type: raw_type,
        name,
        ..Default::default()
    }
}

/// Map SQLite storage classes to the names MySQL would report.
fn sqlite_data_type(raw_type: &str) -> String {
    let lower = raw_type.to_lowercase();
    match lower.as_str() {
        "integer" => "bigint".to_string(),
        "real" => "double".to_string(),
        _ => lower,
    }
}

/// CHECK expressions of a table keyed by column name.
///
/// Best effort: a missing table or unreadable schema yields an empty map.
async fn check_constraints(pool: &SqlitePool, table: &str) -> HashMap<String, Vec<String>> {
    let sql: Option<(Option<String>,)> =
        sqlx::query_as("SELECT sql FROM sqlite_schema WHERE type='table' AND name=?")
            .bind(table)
            .fetch_optional(pool)
            .await
            .unwrap_or_default();

    match sql.and_then(|(sql,)| sql) {
        Some(sql) => parse_check_constraints(&sql),
        None => HashMap::new(),
    }
}

/// Scan `CREATE TABLE` text line by line for column-level CHECK clauses.
///
/// The first token on a line containing exactly one `CHECK` is taken as the
/// column name.
pub fn parse_check_constraints(create_sql: &str) -> HashMap<String, Vec<String>> {
    let mut constraints: HashMap<String, Vec<String>> = HashMap::new();

    for line in create_sql.lines() {
        let line = line.trim();
        let upper = line.to_ascii_uppercase();
        let mut hits = upper.match_indices("CHECK");
        let (Some((at, _)), None) = (hits.next(), hits.next()) else {
            continue;
        };

        let column = line[..at]
            .split_whitespace()
            .next()
            .map(|c| c.trim_matches(|ch| matches!(ch, '"' | '`' | '[' | ']')));
        let Some(column) = column.filter(|c| !c.is_empty()) else {
            continue;
        };

        let rest = line[at + "CHECK".len()..].trim();
        let constraint = rest.strip_suffix(',').unwrap_or(rest);
        constraints
            .entry(column.to_string())
            .or_default()
            .push(constraint.to_string());
    }

    constraints
}

/// Quoted values of an `IN ('a', 'b')` clause.
///
/// ```rust
/// use mig_introspect::sqlite::enum_values_from_check;
///
/// assert_eq!(
///     enum_values_from_check("(status IN ('active', 'disabled'))"),
///     vec!["active", "disabled"],
/// );
/// ```
pub fn enum_values_from_check(constraint: &str) -> Vec<String> {
    let Some(open) = IN_CLAUSE.find(constraint) else {
        return Vec::new();
    };
    let start = open.end();

    let mut depth = 1usize;
    let mut end = None;
    for (offset, ch) in constraint[start..].char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    end = Some(start + offset);
                    break;
                }
            }
            _ => {}
        }
    }
    let Some(end) = end else {
        return Vec::new();
    };

    constraint[start..end]
        .split(',')
        .map(str::trim)
        .filter_map(|part| {
            part.strip_prefix('\'')
                .and_then(|p| p.strip_suffix('\''))
                .map(str::to_string)
        })
        .collect()
}
