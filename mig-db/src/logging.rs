//! Logging setup for mig.
//!
//! Output is structured and controlled by environment variables:
//!
//! - `MIG_DEBUG=true|1|yes` - enable debug logging
//! - `MIG_LOG_LEVEL=trace|debug|info|warn|error` - set a specific level
//! - `MIG_LOG_FORMAT=json|pretty|compact` - output format (default: json)
//!
//! Nothing is installed unless one of the first two variables is set, so
//! embedding applications keep control of their own subscriber.
//!
//! ```rust,no_run
//! mig_db::logging::init();
//! ```

use std::sync::Once;

use crate::config::{EnvSource, StdEnvSource};

static INIT: Once = Once::new();

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line
    Json,
    /// Multi-line human readable output
    Pretty,
    /// Single-line human readable output
    Compact,
}

/// Logging settings resolved from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    /// Whether anything was requested at all.
    pub enabled: bool,
    /// Level directive for the mig crates.
    pub level: &'static str,
    /// Output format.
    pub format: LogFormat,
}

impl LogSettings {
    /// Read `MIG_DEBUG`, `MIG_LOG_LEVEL` and `MIG_LOG_FORMAT`.
    pub fn from_env_source(env: &dyn EnvSource) -> Self {
        let debug = debug_flag(env);
        let requested = env.get("MIG_LOG_LEVEL");
        let fallback = if debug { "debug" } else { "warn" };

        let level = match requested.as_deref().map(str::to_lowercase).as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => fallback,
        };

        let format = match env.get("MIG_LOG_FORMAT").map(|f| f.to_lowercase()).as_deref() {
            Some("pretty") => LogFormat::Pretty,
            Some("compact") => LogFormat::Compact,
            _ => LogFormat::Json,
        };

        Self {
            enabled: debug || requested.is_some(),
            level,
            format,
        }
    }

    /// `EnvFilter` directive covering every mig crate.
    pub fn directive(&self) -> String {
        let level = self.level;
        format!("mig={level},mig_db={level},mig_introspect={level},mig_migrate={level}")
    }
}

fn debug_flag(env: &dyn EnvSource) -> bool {
    env.get("MIG_DEBUG")
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

/// Check if debug logging is enabled via `MIG_DEBUG`.
pub fn is_debug_enabled() -> bool {
    debug_flag(&StdEnvSource)
}

/// Initialize logging from the process environment.
///
/// Subsequent calls are no-ops.
pub fn init() {
    init_with(LogSettings::from_env_source(&StdEnvSource));
}

/// Initialize logging with explicit settings.
pub fn init_with(settings: LogSettings) {
    INIT.call_once(|| {
        if !settings.enabled {
            return;
        }

        use tracing_subscriber::{EnvFilter, fmt, prelude::*};

        let filter =
            EnvFilter::try_new(settings.directive()).unwrap_or_else(|_| EnvFilter::new("warn"));
        let registry = tracing_subscriber::registry().with(filter);

        // try_init: an embedding application may already own the global subscriber.
        let installed = match settings.format {
            LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
            LogFormat::Compact => registry.with(fmt::layer().compact()).try_init(),
            LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
        };

        if installed.is_ok() {
            tracing::info!(
                level = settings.level,
                format = ?settings.format,
                "mig logging initialized"
            );
        }
    });
}
