//! Migration options and the `mig.toml` configuration file.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use mig_db::{DbOptions, EnvSource, StdEnvSource};
use regex_lite::{Captures, Regex};
use serde::Deserialize;

use crate::error::{MigrateResult, MigrationError};

/// Default directory holding migration projects.
pub const DEFAULT_PATH: &str = "schema";

/// Default configuration file name.
pub const CONFIG_FILE: &str = "mig.toml";

static ENV_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("valid env reference pattern"));

/// What to migrate and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrateOptions {
    /// Directory of project subdirectories.
    pub path: PathBuf,
    /// Project to apply.
    pub project: String,
    /// Single migration file, preferred over `path` when set.
    pub filename: Option<PathBuf>,
    /// Apply to the database; otherwise only print.
    pub apply: bool,
    /// Echo every statement.
    pub verbose: bool,
}

impl Default for MigrateOptions {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_PATH),
            project: String::new(),
            filename: None,
            apply: false,
            verbose: false,
        }
    }
}

impl MigrateOptions {
    /// Options with the default `schema` path.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the migrations directory.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    /// Set the project.
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = project.into();
        self
    }

    /// Use a single migration file.
    pub fn with_filename(mut self, filename: impl Into<PathBuf>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Apply instead of printing.
    pub fn with_apply(mut self, apply: bool) -> Self {
        self.apply = apply;
        self
    }

    /// Echo statements.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// Contents of `mig.toml`.
///
/// ```toml
/// [database]
/// dsn = "${MIG_DB_DSN}"
/// retries = 10
/// retry_delay = "500ms"
/// connect_timeout = "1m"
///
/// [migrations]
/// path = "schema"
/// project = "stats"
/// apply = true
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MigConfig {
    /// Connection settings.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Migration settings.
    #[serde(default)]
    pub migrations: MigrationsConfig,
}

/// `[database]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Connection string.
    pub dsn: Option<String>,
    /// Connect attempt cap.
    pub retries: Option<u32>,
    /// Pause between attempts, such as `"2s"`.
    pub retry_delay: Option<String>,
    /// Overall connect deadline, such as `"2m"`.
    pub connect_timeout: Option<String>,
    /// Pool ceiling.
    pub max_connections: Option<u32>,
}

/// `[migrations]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MigrationsConfig {
    /// Directory of project subdirectories.
    pub path: Option<PathBuf>,
    /// Project to apply.
    pub project: Option<String>,
    /// Single migration file.
    pub filename: Option<PathBuf>,
    /// Apply instead of printing.
    pub apply: Option<bool>,
    /// Echo statements.
    pub verbose: Option<bool>,
}

impl MigConfig {
    /// Load configuration from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> MigrateResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|err| {
            MigrationError::config(format!("failed to read {}: {err}", path.display()))
        })?;
        Self::parse(&content)
    }

    /// Parse configuration, expanding `${VAR}` from the process environment.
    pub fn parse(content: &str) -> MigrateResult<Self> {
        Self::parse_with_env(content, &StdEnvSource)
    }

    /// Parse configuration, expanding `${VAR}` from `env`.
    pub fn parse_with_env(content: &str, env: &dyn EnvSource) -> MigrateResult<Self> {
        let expanded = expand_env_vars(content, env);
        toml::from_str(&expanded).map_err(|err| MigrationError::config(err.to_string()))
    }

    /// Connection options, with the DSN falling back to `MIG_DB_DSN`.
    pub fn db_options(&self) -> MigrateResult<DbOptions> {
        self.db_options_with_env(&StdEnvSource)
    }

    /// Connection options, with the DSN falling back to `env`.
    pub fn db_options_with_env(&self, env: &dyn EnvSource) -> MigrateResult<DbOptions> {
        let db = &self.database;
        let mut options = DbOptions::from_env_source(env);

        if let Some(dsn) = &db.dsn {
            options = options.with_dsn(dsn.clone());
        }
        if let Some(retries) = db.retries {
            options = options.with_retries(retries);
        }
        if let Some(delay) = &db.retry_delay {
            options = options.with_retry_delay(parse_duration(delay)?);
        }
        if let Some(timeout) = &db.connect_timeout {
            options = options.with_connect_timeout(parse_duration(timeout)?);
        }
        if let Some(max) = db.max_connections {
            options = options.with_max_connections(max);
        }
        Ok(options)
    }

    /// Migration options layered over the defaults.
    pub fn migrate_options(&self) -> MigrateOptions {
        let cfg = &self.migrations;
        let defaults = MigrateOptions::default();

        MigrateOptions {
            path: cfg.path.clone().unwrap_or(defaults.path),
            project: cfg.project.clone().unwrap_or(defaults.project),
            filename: cfg.filename.clone(),
            apply: cfg.apply.unwrap_or(defaults.apply),
            verbose: cfg.verbose.unwrap_or(defaults.verbose),
        }
    }
}

/// Replace `${VAR}` references with values from `env`.
///
/// Unset variables are left as written.
fn expand_env_vars(content: &str, env: &dyn EnvSource) -> String {
    ENV_REFERENCE
        .replace_all(content, |caps: &Captures<'_>| {
            env.get(&caps[1]).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Parse a duration such as `250ms`, `2s`, `5m` or `1h`.
///
/// A bare number is read as seconds.
pub fn parse_duration(value: &str) -> MigrateResult<Duration> {
    let value = value.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (number, unit) = value.split_at(split);

    let amount: u64 = number
        .parse()
        .map_err(|_| MigrationError::config(format!("invalid duration: '{value}'")))?;

    let seconds = |factor: u64| {
        amount
            .checked_mul(factor)
            .map(Duration::from_secs)
            .ok_or_else(|| MigrationError::config(format!("duration out of range: '{value}'")))
    };
    match unit.trim() {
        "ms" => Ok(Duration::from_millis(amount)),
        "" | "s" => Ok(Duration::from_secs(amount)),
        "m" => seconds(60),
        "h" => seconds(3600),
        other => Err(MigrationError::config(format!(
            "invalid duration unit '{other}' in '{value}'"
        ))),
    }
}
