//! The `migrations` checkpoint table.

use mig_db::{DbTransaction, Dialect};
use tracing::debug;

use crate::error::{MigrateResult, MigrationError};

/// Status recorded once every statement of a file has been applied.
pub const STATUS_OK: &str = "ok";

const POSTGRES_BOOTSTRAP: &str = "\
CREATE TABLE IF NOT EXISTS migrations (
    project VARCHAR(128) NOT NULL,
    filename VARCHAR(255) NOT NULL,
    statement_index BIGINT NOT NULL,
    status TEXT NOT NULL,
    PRIMARY KEY (project, filename)
);
";

const MYSQL_BOOTSTRAP: &str = "\
CREATE TABLE IF NOT EXISTS migrations (
    project VARCHAR(128) NOT NULL,
    filename VARCHAR(255) NOT NULL,
    statement_index BIGINT NOT NULL,
    status TEXT NOT NULL,
    PRIMARY KEY (project, filename)
) DEFAULT CHARSET=utf8mb4;
";

const SQLITE_BOOTSTRAP: &str = "\
CREATE TABLE IF NOT EXISTS migrations (
    project TEXT NOT NULL,
    filename TEXT NOT NULL,
    statement_index INTEGER NOT NULL,
    status TEXT NOT NULL,
    PRIMARY KEY (project, filename)
);
";

/// SQL creating the checkpoint table for `dialect`.
pub fn bootstrap_sql(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::Postgres => POSTGRES_BOOTSTRAP,
        Dialect::MySql => MYSQL_BOOTSTRAP,
        Dialect::Sqlite => SQLITE_BOOTSTRAP,
    }
}

/// Progress of one migration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationState {
    /// Project the file belongs to.
    pub project: String,
    /// Base name of the file.
    pub filename: String,
    /// Index of the last applied statement, -1 when none.
    pub statement_index: i64,
    /// `ok`, or the error text of the last failure.
    pub status: String,
}

impl MigrationState {
    /// State of a file that has never run.
    pub fn new(project: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            filename: filename.into(),
            statement_index: -1,
            status: String::new(),
        }
    }

    /// Whether every statement has been applied.
    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }

    /// Whether the statement at `index` was applied by an earlier run.
    pub fn is_applied(&self, index: usize) -> bool {
        i64::try_from(index).is_ok_and(|index| index <= self.statement_index)
    }

    /// Read the checkpoint of one file inside `tx`, or a fresh state.
    pub async fn load(tx: &mut DbTransaction<'_>, project: &str, filename: &str) -> MigrateResult<Self> {
        let dialect = tx.dialect();
        let row: Option<(i64, String)> = match tx {
            #[cfg(feature = "postgres")]
            DbTransaction::Postgres(tx) => {
                sqlx::query_as(
                    "SELECT statement_index, status FROM migrations WHERE project = $1 AND filename = $2",
                )
                .bind(project)
                .bind(filename)
                .fetch_optional(&mut **tx)
                .await?
            }
            #[cfg(feature = "mysql")]
            DbTransaction::MySql(tx) => {
                sqlx::query_as(
                    "SELECT statement_index, status FROM migrations WHERE project = ? AND filename = ?",
                )
                .bind(project)
                .bind(filename)
                .fetch_optional(&mut **tx)
                .await?
            }
            #[cfg(feature = "sqlite")]
            DbTransaction::Sqlite(tx) => {
                sqlx::query_as(
                    "SELECT statement_index, status FROM migrations WHERE project = ? AND filename = ?",
                )
                .bind(project)
                .bind(filename)
                .fetch_optional(&mut **tx)
                .await?
            }
            #[allow(unreachable_patterns)]
            _ => return Err(disabled(dialect)),
        };

        let mut state = Self::new(project, filename);
        if let Some((statement_index, status)) = row {
            state.statement_index = statement_index;
            state.status = status;
        }
        debug!(
            project = %project,
            filename = %filename,
            statement_index = state.statement_index,
            status = %state.status,
            "Loaded checkpoint"
        );
        Ok(state)
    }

    /// Insert or update this checkpoint inside `tx`.
    pub async fn save(&self, tx: &mut DbTransaction<'_>) -> MigrateResult<()> {
        debug!(
            project = %self.project,
            filename = %self.filename,
            statement_index = self.statement_index,
            "Saving checkpoint"
        );

        let dialect = tx.dialect();
        match tx {
            #[cfg(feature = "postgres")]
            DbTransaction::Postgres(tx) => {
                sqlx::query(
                    "INSERT INTO migrations (project, filename, statement_index, status) \
                     VALUES ($1, $2, $3, $4) \
                     ON CONFLICT (project, filename) DO UPDATE \
                     SET statement_index = EXCLUDED.statement_index, status = EXCLUDED.status",
                )
                .bind(&self.project)
                .bind(&self.filename)
                .bind(self.statement_index)
                .bind(&self.status)
                .execute(&mut **tx)
                .await?;
            }
            #[cfg(feature = "mysql")]
            DbTransaction::MySql(tx) => {
                sqlx::query(
                    "REPLACE INTO migrations (project, filename, statement_index, status) \
                     VALUES (?, ?, ?, ?)",
                )
                .bind(&self.project)
                .bind(&self.filename)
                .bind(self.statement_index)
                .bind(&self.status)
                .execute(&mut **tx)
                .await?;
            }
            #[cfg(feature = "sqlite")]
            DbTransaction::Sqlite(tx) => {
                sqlx::query(
                    "INSERT INTO migrations (project, filename, statement_index, status) \
                     VALUES (?, ?, ?, ?) \
                     ON CONFLICT (project, filename) DO UPDATE \
                     SET statement_index = excluded.statement_index, status = excluded.status",
                )
                .bind(&self.project)
                .bind(&self.filename)
                .bind(self.statement_index)
                .bind(&self.status)
                .execute(&mut **tx)
                .await?;
            }
            #[allow(unreachable_patterns)]
            _ => return Err(disabled(dialect)),
        }
        Ok(())
    }
}

#[allow(dead_code)]
fn disabled(dialect: Dialect) -> MigrationError {
    mig_db::DbError::DialectDisabled(dialect.name().to_string()).into()
}
