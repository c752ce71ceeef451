//! Connection options.

use std::collections::HashMap;
use std::time::Duration;

/// Environment variable holding the default DSN.
pub const DSN_ENV_VAR: &str = "MIG_DB_DSN";

/// Pool ceiling applied to every successful connection.
pub const MAX_CONNECTIONS: u32 = 800;

/// Source for environment variables.
pub trait EnvSource: Send + Sync {
    /// Get an environment variable value.
    fn get(&self, name: &str) -> Option<String>;
}

/// Default environment source using std::env.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdEnvSource;

impl EnvSource for StdEnvSource {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Environment source backed by a HashMap.
#[derive(Debug, Clone, Default)]
pub struct MapEnvSource {
    vars: HashMap<String, String>,
}

impl MapEnvSource {
    /// Create a new map-based environment source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable.
    pub fn set(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }
}

impl EnvSource for MapEnvSource {
    fn get(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }
}

/// Connection and retry options.
///
/// `retries` caps the number of connect attempts (0 means no cap),
/// `retry_delay` is the fixed pause between attempts and `connect_timeout`
/// is the overall deadline for the whole retry loop (zero means none).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbOptions {
    /// Connection string
    pub dsn: String,
    /// Maximum number of connect attempts
    pub retries: u32,
    /// Pause between connect attempts
    pub retry_delay: Duration,
    /// Deadline for the whole connect loop
    pub connect_timeout: Duration,
    /// Pool ceiling
    pub max_connections: u32,
}

impl Default for DbOptions {
    fn default() -> Self {
        Self {
            dsn: String::new(),
            retries: 100,
            retry_delay: Duration::from_secs(2),
            connect_timeout: Duration::from_secs(120),
            max_connections: MAX_CONNECTIONS,
        }
    }
}

impl DbOptions {
    /// Default options with the DSN taken from `MIG_DB_DSN`.
    pub fn new() -> Self {
        Self::from_env_source(&StdEnvSource)
    }

    /// Default options with the DSN taken from `MIG_DB_DSN`.
    pub fn from_env() -> Self {
        Self::new()
    }

    /// Default options with the DSN read from a custom environment source.
    pub fn from_env_source(env: &dyn EnvSource) -> Self {
        Self {
            dsn: env.get(DSN_ENV_VAR).unwrap_or_default(),
            ..Default::default()
        }
    }

    /// Options for an explicit DSN.
    pub fn from_dsn(dsn: impl Into<String>) -> Self {
        Self {
            dsn: dsn.into(),
            ..Default::default()
        }
    }

    /// Set the DSN.
    pub fn with_dsn(mut self, dsn: impl Into<String>) -> Self {
        self.dsn = dsn.into();
        self
    }

    /// Set the attempt cap.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Set the delay between attempts.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set the overall connect deadline.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the pool ceiling.
    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// The retry policy actually used by the connect loop.
    ///
    /// With neither an attempt cap nor a deadline, the loop retries every five
    /// seconds for up to five minutes.
    pub fn retry_policy(&self) -> RetryPolicy {
        if self.retries == 0 && self.connect_timeout.is_zero() {
            return RetryPolicy {
                retries: 0,
                delay: Duration::from_secs(5),
                timeout: Some(Duration::from_secs(300)),
            };
        }

        RetryPolicy {
            retries: self.retries,
            delay: self.retry_delay,
            timeout: Some(self.connect_timeout).filter(|t| !t.is_zero()),
        }
    }
}

/// Resolved retry settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempt cap, 0 for unlimited.
    pub retries: u32,
    /// Fixed delay between attempts.
    pub delay: Duration,
    /// Overall deadline.
    pub timeout: Option<Duration>,
}
