//! Applying migrations with checkpoints and advisory locks.

use mig_db::{DbConnection, DbError, DbPool, DbTransaction, Dialect, acquire_lock, release_lock};
use tracing::{debug, info, warn};

use crate::checkpoint::{MigrationState, STATUS_OK, bootstrap_sql};
use crate::error::{MigrateResult, MigrationError};
use crate::statements::split_statements;
use crate::store::{MigrationFs, MigrationStore};

/// Savepoint wrapped around each PostgreSQL statement.
const STATEMENT_SAVEPOINT: &str = "mig_stmt";

/// Outcome of one migration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutcome {
    /// Base name of the file.
    pub filename: String,
    /// Statements executed by this run.
    pub applied: usize,
    /// The file was already complete and nothing ran.
    pub skipped: bool,
    /// Checkpoint index after this run.
    pub statement_index: i64,
    /// Checkpoint status after this run.
    pub status: String,
}

/// Summary of [`Runner::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Project that was migrated.
    pub project: String,
    /// Per-file outcomes in application order.
    pub files: Vec<FileOutcome>,
}

impl RunReport {
    /// Total statements executed by this run.
    pub fn applied(&self) -> usize {
        self.files.iter().map(|f| f.applied).sum()
    }

    /// Files that were already complete.
    pub fn skipped(&self) -> usize {
        self.files.iter().filter(|f| f.skipped).count()
    }
}

/// Applies the migrations of one project from a [`MigrationStore`].
///
/// Each file runs in its own transaction on a dedicated connection: the
/// advisory lock for `project:filename` is taken first, the checkpoint is read
/// under the lock, pending statements run in order, and the updated checkpoint
/// is written in the same transaction before commit. The lock is released
/// after the transaction ends, whether it committed or rolled back, so a
/// session-scoped lock never exposes uncommitted work. A failing statement stops its file;
/// the statements that succeeded and the checkpoint recording the failure are
/// still committed, and the error is returned.
#[derive(Debug, Clone)]
pub struct Runner<'a> {
    store: &'a MigrationStore,
    verbose: bool,
}

impl<'a> Runner<'a> {
    /// Create a runner over loaded migrations.
    pub fn new(store: &'a MigrationStore) -> Self {
        Self {
            store,
            verbose: false,
        }
    }

    /// Echo statements and their applied state to stdout.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Print the project's migrations without touching a database.
    ///
    /// Returns the names of the files that would be applied.
    pub fn print(&self, project: &str) -> MigrateResult<Vec<String>> {
        let fs = self.store.get(project)?;
        let files = fs.migrations();

        for filename in &files {
            println!("-- Migrations file: {filename}");
            for (idx, stmt) in split_statements(fs.read_file(filename)?).iter().enumerate() {
                self.echo(idx, stmt);
            }
        }
        Ok(files)
    }

    /// Apply every pending statement of `project`.
    ///
    /// Stops at the first file whose statement fails.
    pub async fn run(&self, pool: &DbPool, project: &str) -> MigrateResult<RunReport> {
        let fs = self.store.get(project)?;
        let dialect = pool.dialect();

        self.bootstrap(pool, dialect).await?;

        let mut report = RunReport {
            project: project.to_string(),
            files: Vec::new(),
        };
        for filename in fs.migrations() {
            let outcome = self.apply_file(pool, project, fs, &filename).await?;
            report.files.push(outcome);
        }

        debug!(
            project = %project,
            files = report.files.len(),
            applied = report.applied(),
            "Migrations complete"
        );
        Ok(report)
    }

    /// Create the checkpoint table. Runs without a lock or checkpoint.
    async fn bootstrap(&self, pool: &DbPool, dialect: Dialect) -> MigrateResult<()> {
        for (idx, stmt) in split_statements(bootstrap_sql(dialect)).iter().enumerate() {
            self.echo(idx, stmt);
            pool.execute(stmt).await?;
        }
        Ok(())
    }

    async fn apply_file(
        &self,
        pool: &DbPool,
        project: &str,
        fs: &MigrationFs,
        filename: &str,
    ) -> MigrateResult<FileOutcome> {
        let statements = split_statements(fs.read_file(filename)?);
        let dialect = pool.dialect();
        let key = format!("{project}:{filename}");

        let mut conn = pool.acquire().await?;
        let result = self
            .apply_locked(&mut conn, &key, project, filename, &statements)
            .await;

        if let Err(err) = release_lock(&mut conn, dialect.name(), &key).await {
            // Closing the session drops any lock it still holds.
            warn!(key = %key, error = %err, "Failed to release lock, closing connection");
            conn.close().await;
        }
        result
    }

    /// Run one file inside a transaction on `conn`, holding the lock for `key`.
    async fn apply_locked(
        &self,
        conn: &mut DbConnection,
        key: &str,
        project: &str,
        filename: &str,
        statements: &[String],
    ) -> MigrateResult<FileOutcome> {
        let dialect = conn.dialect();
        let mut tx = conn.begin().await?;
        acquire_lock(&mut tx, dialect.name(), key).await?;

        let mut state = MigrationState::load(&mut tx, project, filename).await?;
        if state.is_ok() {
            tx.commit().await?;
            info!(project = %project, "{} {}", filename, STATUS_OK.to_uppercase());
            return Ok(FileOutcome {
                filename: filename.to_string(),
                applied: 0,
                skipped: true,
                statement_index: state.statement_index,
                status: state.status,
            });
        }

        let mut applied = 0;
        let mut failure = None;
        for (idx, stmt) in statements.iter().enumerate() {
            let is_applied = state.is_applied(idx);
            if self.verbose {
                println!(
                    "-- statement {idx}/{} is applied? {is_applied}",
                    state.statement_index
                );
            }
            self.echo(idx, stmt);
            if is_applied {
                continue;
            }

            match execute_statement(&mut tx, dialect, stmt).await {
                Ok(()) => {
                    state.statement_index = idx as i64;
                    applied += 1;
                }
                Err(err) => {
                    state.status = error_message(&err);
                    failure = Some(MigrationError::statement(filename, idx, &state.status));
                    break;
                }
            }
        }
        if failure.is_none() {
            state.status = STATUS_OK.to_string();
        }

        state.save(&mut tx).await?;
        tx.commit().await?;
        info!(project = %project, applied, "{} {}", filename, state.status.to_uppercase());

        match failure {
            Some(err) => Err(err),
            None => Ok(FileOutcome {
                filename: filename.to_string(),
                applied,
                skipped: false,
                statement_index: state.statement_index,
                status: state.status,
            }),
        }
    }

    fn echo(&self, idx: usize, stmt: &str) {
        if self.verbose {
            println!();
            println!("-- Statement index: {idx}");
            println!("{stmt}");
            println!();
        }
    }
}

/// Run one statement, isolated in a savepoint on PostgreSQL so a failure
/// leaves the transaction usable for the checkpoint write.
async fn execute_statement(
    tx: &mut DbTransaction<'_>,
    dialect: Dialect,
    stmt: &str,
) -> Result<(), DbError> {
    if dialect != Dialect::Postgres {
        return tx.execute(stmt).await.map(|_| ());
    }

    tx.execute(&format!("SAVEPOINT {STATEMENT_SAVEPOINT}")).await?;
    match tx.execute(stmt).await {
        Ok(_) => {
            tx.execute(&format!("RELEASE SAVEPOINT {STATEMENT_SAVEPOINT}")).await?;
            Ok(())
        }
        Err(err) => {
            tx.execute(&format!("ROLLBACK TO SAVEPOINT {STATEMENT_SAVEPOINT}")).await?;
            Err(err)
        }
    }
}

/// The driver's message for a failed statement.
fn error_message(err: &DbError) -> String {
    match err {
        DbError::Sqlx(source) => source
            .as_database_error()
            .map(|db| db.message().to_string())
            .unwrap_or_else(|| source.to_string()),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_print_lists_eligible_files() {
        let mut store = MigrationStore::new();
        store.insert(
            "stats",
            MigrationFs::new()
                .with_file("0002_seed.up.sql", "INSERT INTO hits VALUES (1);")
                .with_file("0001_init.up.sql", "CREATE TABLE hits (id INT);")
                .with_file("0003_empty.up.sql", "-"),
        );

        let files = Runner::new(&store).with_verbose(true).print("stats").unwrap();
        assert_eq!(files, vec!["0001_init.up.sql", "0002_seed.up.sql"]);
    }

    #[test]
    fn test_print_unknown_project() {
        let store = MigrationStore::new();
        let err = Runner::new(&store).print("stats").unwrap_err();
        assert!(matches!(err, MigrationError::UnknownProject(_)));
    }

    #[test]
    fn test_report_totals() {
        let report = RunReport {
            project: "stats".into(),
            files: vec![
                FileOutcome {
                    filename: "a.up.sql".into(),
                    applied: 0,
                    skipped: true,
                    statement_index: 1,
                    status: "ok".into(),
                },
                FileOutcome {
                    filename: "b.up.sql".into(),
                    applied: 3,
                    skipped: false,
                    statement_index: 2,
                    status: "ok".into(),
                },
            ],
        };
        assert_eq!(report.applied(), 3);
        assert_eq!(report.skipped(), 1);
    }

    #[cfg(feature = "sqlite")]
    mod sqlite {
        use mig_db::DbOptions;
        use pretty_assertions::assert_eq;

        use super::*;

        async fn memory_pool() -> DbPool {
            DbPool::connect(&DbOptions::from_dsn(":memory:")).await.unwrap()
        }

        async fn checkpoint(pool: &DbPool, filename: &str) -> (i64, String) {
            sqlx::query_as(
                "SELECT statement_index, status FROM migrations WHERE project = 'test' AND filename = ?",
            )
            .bind(filename)
            .fetch_one(pool.as_sqlite().unwrap())
            .await
            .unwrap()
        }

        fn store_with(contents: &str) -> MigrationStore {
            let mut store = MigrationStore::new();
            store.insert("test", MigrationFs::new().with_file("pulse.up.sql", contents));
            store
        }

        #[tokio::test]
        async fn test_run_applies_and_checkpoints() {
            let pool = memory_pool().await;
            let store = store_with(
                "CREATE TABLE pulse (id INTEGER PRIMARY KEY, name TEXT);\n\
                 INSERT INTO pulse (name) VALUES ('a');\n\
                 INSERT INTO pulse (name) VALUES ('b');\n",
            );

            let report = Runner::new(&store).run(&pool, "test").await.unwrap();
            assert_eq!(report.applied(), 3);
            assert_eq!(checkpoint(&pool, "pulse.up.sql").await, (2, "ok".to_string()));
        }

        #[tokio::test]
        async fn test_second_run_is_noop() {
            let pool = memory_pool().await;
            let store = store_with("CREATE TABLE pulse (id INTEGER);\nINSERT INTO pulse VALUES (1);\n");
            let runner = Runner::new(&store);

            runner.run(&pool, "test").await.unwrap();
            let report = runner.run(&pool, "test").await.unwrap();

            assert_eq!(report.applied(), 0);
            assert_eq!(report.skipped(), 1);
            let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pulse")
                .fetch_one(pool.as_sqlite().unwrap())
                .await
                .unwrap();
            assert_eq!(rows, 1);
        }

        #[tokio::test]
        async fn test_failure_records_last_success_and_resumes() {
            let pool = memory_pool().await;
            let broken = store_with(
                "CREATE TABLE pulse (id INTEGER);\n\
                 INSERT INTO missing VALUES (1);\n\
                 INSERT INTO pulse VALUES (2);\n",
            );

            let err = Runner::new(&broken).run(&pool, "test").await.unwrap_err();
            assert!(matches!(
                err,
                MigrationError::Statement { index: 1, ref message, .. } if message.contains("missing")
            ));

            let (index, status) = checkpoint(&pool, "pulse.up.sql").await;
            assert_eq!(index, 0);
            assert!(status.contains("no such table"));

            // The corrected file must not re-run statement 0, which would fail
            // because the table already exists.
            let fixed = store_with(
                "CREATE TABLE pulse (id INTEGER);\n\
                 INSERT INTO pulse VALUES (1);\n\
                 INSERT INTO pulse VALUES (2);\n",
            );
            let report = Runner::new(&fixed).run(&pool, "test").await.unwrap();
            assert_eq!(report.applied(), 2);
            assert_eq!(checkpoint(&pool, "pulse.up.sql").await, (2, "ok".to_string()));
        }

        #[tokio::test]
        async fn test_comment_only_file_is_ok() {
            let pool = memory_pool().await;
            let store = store_with("-- x");

            let report = Runner::new(&store).run(&pool, "test").await.unwrap();
            assert_eq!(report.applied(), 0);
            assert_eq!(checkpoint(&pool, "pulse.up.sql").await, (-1, "ok".to_string()));
        }

        #[tokio::test]
        async fn test_checkpoint_failure_ends_transaction() {
            let pool = memory_pool().await;
            // The bootstrap keeps an existing table, so loading the checkpoint fails.
            pool.execute("CREATE TABLE migrations (project TEXT, filename TEXT)")
                .await
                .unwrap();
            let store = store_with("CREATE TABLE pulse (id INTEGER);\n");

            let err = Runner::new(&store).run(&pool, "test").await.unwrap_err();
            assert!(matches!(err, MigrationError::Sqlx(_)));

            // The single connection is back in the pool with no open transaction.
            let mut tx = pool.begin().await.unwrap();
            tx.execute("CREATE TABLE after_failure (id INTEGER)").await.unwrap();
            tx.commit().await.unwrap();
            let pulse: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE name = 'pulse'")
                    .fetch_one(pool.as_sqlite().unwrap())
                    .await
                    .unwrap();
            assert_eq!(pulse, 0);
        }

        #[tokio::test]
        async fn test_concurrent_runners_apply_once() {
            let dir = tempfile::tempdir().unwrap();
            let dsn = dir.path().join("shared.db").display().to_string();
            let first = DbPool::connect(&DbOptions::from_dsn(dsn.clone())).await.unwrap();
            let second = DbPool::connect(&DbOptions::from_dsn(dsn)).await.unwrap();
            let store = store_with(
                "CREATE TABLE pulse (id INTEGER PRIMARY KEY);\n\
                 INSERT INTO pulse (id) VALUES (1);\n",
            );

            let runner = Runner::new(&store);
            let (a, b) = tokio::join!(runner.run(&first, "test"), runner.run(&second, "test"));
            let (a, b) = (a.unwrap(), b.unwrap());

            assert_eq!(a.applied() + b.applied(), 2);
            assert_eq!(a.skipped() + b.skipped(), 1);
            let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pulse")
                .fetch_one(first.as_sqlite().unwrap())
                .await
                .unwrap();
            assert_eq!(rows, 1);
            assert_eq!(checkpoint(&first, "pulse.up.sql").await, (1, "ok".to_string()));
        }

        #[tokio::test]
        async fn test_unknown_project_is_config_error() {
            let pool = memory_pool().await;
            let err = Runner::new(&MigrationStore::new())
                .run(&pool, "nope")
                .await
                .unwrap_err();
            assert!(err.is_config());
        }
    }
}
