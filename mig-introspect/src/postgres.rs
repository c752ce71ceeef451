//! PostgreSQL describer.

use async_trait::async_trait;
use mig_db::{DbPool, Dialect};
use sqlx::{Executor, FromRow, PgConnection, PgPool};
use tracing::{debug, warn};

use crate::describer::{Describer, mismatch, temp_object_name};
use crate::error::{IntrospectError, IntrospectResult};
use crate::model::{Column, ColumnKey, Index, Table};
use crate::normalize::{enrich_key_metadata, normalize_column, parse_postgres_int_type};
use crate::title::title;

const LIST_TABLES_SQL: &str = r#"
SELECT c.relname::text, COALESCE(d.description, '')
FROM pg_class c
LEFT JOIN pg_description d ON c.oid = d.objoid AND d.objsubid = 0
WHERE c.relkind = 'r'
  AND c.relnamespace = (SELECT oid FROM pg_namespace WHERE nspname = current_schema())
ORDER BY c.relname
"#;

const TABLE_COMMENT_SQL: &str = r#"
SELECT description FROM pg_description
WHERE objoid = (
    SELECT oid FROM pg_class
    WHERE relname = $1
      AND relnamespace = (SELECT oid FROM pg_namespace WHERE nspname = current_schema())
)
AND objsubid = 0
"#;

const TABLE_COLUMNS_SQL: &str = r#"
SELECT
    c.column_name::text,
    c.udt_name::text,
    COALESCE(col_description(cl.oid, a.attnum), ''),
    CASE WHEN pk.conname IS NOT NULL AND a.attnum = ANY(pk.conkey) THEN 'PRI' ELSE '' END
FROM information_schema.columns c
LEFT JOIN pg_class cl ON c.table_name = cl.relname AND c.table_schema = cl.relnamespace::regnamespace::name
LEFT JOIN pg_attribute a ON cl.oid = a.attrelid AND c.column_name = a.attname
LEFT JOIN pg_constraint pk ON cl.oid = pk.conrelid AND pk.contype = 'p'
WHERE c.table_name = $1 AND c.table_schema = current_schema()
ORDER BY c.ordinal_position
"#;

const TABLE_INDEXES_SQL: &str = r#"
SELECT
    i.relname::text,
    ARRAY_AGG(a.attname::text ORDER BY a.attnum),
    ix.indisprimary,
    ix.indisunique
FROM pg_class t
JOIN pg_index ix ON t.oid = ix.indrelid
JOIN pg_class i ON i.oid = ix.indexrelid
JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(ix.indkey)
WHERE t.relname = $1
  AND t.relnamespace = (SELECT oid FROM pg_namespace WHERE nspname = current_schema())
GROUP BY i.relname, ix.indisprimary, ix.indisunique
ORDER BY i.relname
"#;

const ENUM_VALUES_SQL: &str = r#"
SELECT enumlabel::text FROM pg_enum
WHERE enumtypid = (SELECT oid FROM pg_type WHERE typname = $1)
ORDER BY enumsortorder
"#;

const VIEW_COLUMNS_SQL: &str = r#"
SELECT c.column_name::text, c.udt_name::text
FROM information_schema.columns c
WHERE c.table_name = $1
  AND c.table_schema = (SELECT nspname FROM pg_namespace WHERE oid = pg_my_temp_schema())
ORDER BY c.ordinal_position ASC
"#;

/// Describer for PostgreSQL databases, scoped to `current_schema()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDescriber;

impl PostgresDescriber {
    fn pool<'a>(&self, pool: &'a DbPool) -> IntrospectResult<&'a PgPool> {
        pool.as_postgres().ok_or_else(|| mismatch(Dialect::Postgres, pool))
    }
}

#[async_trait]
impl Describer for PostgresDescriber {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn describe(&self, pool: &DbPool, query: &str) -> IntrospectResult<Vec<Column>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(IntrospectError::EmptyQuery);
        }

        let pg = self.pool(pool)?;
        let view = temp_object_name("mig_temp_view");
        let mut conn = pg
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
        let pg = self.pool(pool)?;

        let comment: Option<String> = match sqlx::query_scalar::<_, Option<String>>(TABLE_COMMENT_SQL)
            .bind(table)
            .fetch_optional(pg)
            .await
        {
            Ok(comment) => comment.flatten(),
            Err(err) => {
                debug!(table = %table, error = %err, "No table comment");
                None
            }
        };

        let rows: Vec<(String, String, String, String)> = sqlx::query_as(TABLE_COLUMNS_SQL)
            .bind(table)
            .fetch_all(pg)
            .await
            .map_err(IntrospectError::with_context(format!("get columns for table {table}")))?;
        if rows.is_empty() {
            return Err(IntrospectError::TableNotFound(table.to_string()));
        }

        let mut columns = Vec::with_capacity(rows.len());
        for (name, udt, column_comment, key) in rows {
            let (_, size) = parse_postgres_int_type(&udt);
            let mut column = Column {
                name,
                data_type: udt.clone(),
                values: enum_values(pg, &udt).await,
                column_type: udt,
                key: ColumnKey::parse(&key),
                comment: column_comment,
                size,
                ..Default::default()
            };
            normalize_column(&mut column);
            columns.push(column);
        }

        let indexes = self.table_indexes(pool, table).await?;
        enrich_key_metadata(&mut columns, &indexes);

        Ok(Table {
            name: table.to_string(),
            comment: comment.unwrap_or_default(),
            columns,
            indexes,
        })
    }

    async fn list_tables(&self, pool: &DbPool) -> IntrospectResult<Vec<Table>> {
        let pg = self.pool(pool)?;

        let rows: Vec<(String, String)> = sqlx::query_as(LIST_TABLES_SQL)
            .fetch_all(pg)
            .await
            .map_err(IntrospectError::with_context("list tables"))?;

        Ok(rows
            .into_iter()
            .map(|(name, comment)| Table::new(name).with_comment(comment))
            .collect())
    }

    async fn table_indexes(&self, pool: &DbPool, table: &str) -> IntrospectResult<Vec<Index>> {
        let pg = self.pool(pool)?;

        let rows: Vec<(String, Vec<String>, bool, bool)> = sqlx::query_as(TABLE_INDEXES_SQL)
            .bind(table)
            .fetch_all(pg)
            .await
            .map_err(IntrospectError::with_context(format!("get indexes for table {table}")))?;

        Ok(rows
            .into_iter()
            .map(|(name, columns, primary, unique)| Index {
                name,
                columns,
                primary,
                unique,
            })
            .collect())
    }
}

async fn view_columns(conn: &mut PgConnection, view: &str) -> IntrospectResult<Vec<Column>> {
    let context = "query column metadata from information_schema";
    let rows = (&mut *conn)
        .fetch_all(sqlx::query(VIEW_COLUMNS_SQL).bind(view))
        .await
        .map_err(IntrospectError::with_context(context))?;
    let rows = rows
        .iter()
        .map(<(String, String)>::from_row)
        .collect::<Result<Vec<_>, _>>()
        .map_err(IntrospectError::with_context(context))?;

    Ok(rows
        .into_iter()
        .map(|(name, udt)| {
            let mut column = Column::new(name, udt);
            column.comment = title(&column.name);
            normalize_column(&mut column);
            column
        })
        .collect())
}

/// Labels of a user-defined enum type, empty for any other type.
async fn enum_values(pg: &PgPool, type_name: &str) -> Vec<String> {
    match sqlx::query_scalar::<_, String>(ENUM_VALUES_SQL)
        .bind(type_name)
        .fetch_all(pg)
        .await
    {
        Ok(values) => values,
        Err(err) => {
            debug!(type_name = %type_name, error = %err, "Enum lookup failed");
            Vec::new()
        }
    }
}
