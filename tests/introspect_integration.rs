//! Introspection of a migrated SQLite schema.
#![cfg(feature = "sqlite")]

use mig::db::{DbOptions, DbPool};
use mig::introspect::{
    CanonicalType, ColumnKey, Describer, IntrospectError, list_tables_with_columns, new_describer,
};
use mig::migrate::{MigrationFs, MigrationStore, Runner};
use pretty_assertions::assert_eq;

const SCHEMA: &str = "\
CREATE TABLE accounts (
    id INTEGER PRIMARY KEY,
    api_key VARCHAR(64) NOT NULL,
    plan TEXT NOT NULL CHECK (plan IN ('pro', 'free', 'team')),
    balance DECIMAL(10,2),
    active BOOLEAN NOT NULL DEFAULT 1,
    created_at DATETIME
);
CREATE UNIQUE INDEX idx_accounts_api_key ON accounts (api_key);
CREATE TABLE sessions (
    id INTEGER PRIMARY KEY,
    account_id INTEGER NOT NULL,
    token BLOB
);
CREATE INDEX idx_sessions_account ON sessions (account_id);
";

async fn migrated_pool() -> DbPool {
    let pool = DbPool::connect(&DbOptions::from_dsn(":memory:")).await.unwrap();
    let mut store = MigrationStore::new();
    store.insert("app", MigrationFs::new().with_file("0001_init.up.sql", SCHEMA));
    Runner::new(&store).run(&pool, "app").await.unwrap();
    pool
}

#[tokio::test]
async fn test_list_tables_with_columns() {
    let pool = migrated_pool().await;
    let describer = new_describer("sqlite3").unwrap();
    let tables = list_tables_with_columns(&pool, describer.as_ref()).await.unwrap();

    let names: Vec<_> = tables.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["accounts", "migrations", "sessions"]);

    let accounts = &tables[0];
    assert_eq!(accounts.comment, "Accounts");
    assert!(!accounts.ignore());

    let api_key = accounts.column("api_key").unwrap();
    assert_eq!(api_key.comment, "API Key");
    assert_eq!(api_key.size, 64);
    assert_eq!(api_key.normalized_type, CanonicalType::Text);

    let plan = accounts.column("plan").unwrap();
    assert_eq!(plan.normalized_type, CanonicalType::Enum);
    assert_eq!(plan.values, vec!["free", "pro", "team"]);

    assert_eq!(
        accounts.column("balance").unwrap().normalized_type,
        CanonicalType::Decimal
    );
    assert_eq!(
        accounts.column("active").unwrap().normalized_type,
        CanonicalType::Boolean
    );
    assert_eq!(
        accounts.column("created_at").unwrap().normalized_type,
        CanonicalType::Timestamp
    );

    let index_names: Vec<_> = accounts.indexes.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(index_names, vec!["", "idx_accounts_api_key"]);
    assert!(accounts.indexes[0].primary);

    let sessions = &tables[2];
    let account_id = sessions.column("account_id").unwrap();
    assert_eq!(account_id.key, ColumnKey::Multiple);
    assert_eq!(account_id.normalized_type, CanonicalType::Integer);
    assert_eq!(sessions.column("token").unwrap().normalized_type, CanonicalType::Blob);
}

#[tokio::test]
async fn test_describe_query() {
    let pool = migrated_pool().await;
    let describer = new_describer("sqlite").unwrap();

    let columns = describer
        .describe(
            &pool,
            "SELECT a.id, s.token FROM accounts a JOIN sessions s ON s.account_id = a.id",
        )
        .await
        .unwrap();

    let names: Vec<_> = columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["id", "token"]);
    assert_eq!(columns[0].normalized_type, CanonicalType::Integer);
    assert_eq!(columns[1].normalized_type, CanonicalType::Blob);
}

#[tokio::test]
async fn test_model_serializes_for_consumers() {
    let pool = migrated_pool().await;
    let describer = new_describer("sqlite").unwrap();
    let table = describer.describe_table(&pool, "sessions").await.unwrap();

    let json = serde_json::to_value(&table).unwrap();
    assert_eq!(json["name"], "sessions");
    assert_eq!(json["columns"][0]["name"], "id");
    assert_eq!(json["columns"][0]["key"], "PRI");
    assert_eq!(json["columns"][2]["normalized_type"], "blob");
}

#[test]
fn test_unknown_dialect() {
    let err = new_describer("oracle").err().unwrap();
    assert!(matches!(err, IntrospectError::UnknownDialect(_)));
}
