//! # Observability
//!
//! Structured logging for the offline-sync workspace.
//!
//! Library crates only emit `tracing` events. The binary calls
//! [`init_with_config`] once at startup, which installs:
//!
//! - a JSONL file layer writing one object per event to
//!   `~/.offline-sync/logs/dev.jsonl` (timestamp, level, service, pid,
//!   target, message, fields)
//! - an optional compact stderr layer
//!
//! `RUST_LOG` overrides the configured default level.
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "offline-sync".into(),
//!     default_level: "debug".into(),
//!     also_stderr: true,
//!     ..Default::default()
//! });
//! tracing::info!(pending = 3, "sync started");
//! ```

mod json_layer;
mod writer;

pub use json_layer::{JsonLayer, LogEntry};
pub use writer::{CentralLogWriter, WriterFactory};

use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Included in every log line for filtering.
    pub service_name: String,

    /// Default filter (e.g. "debug", "info,sync_manager=trace").
    /// `RUST_LOG` takes precedence.
    pub default_level: String,

    /// Defaults to `~/.offline-sync/logs/dev.jsonl`.
    pub log_path: Option<PathBuf>,

    /// Also emit compact logs to stderr.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
        }
    }
}

/// Central log file location.
pub fn default_log_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".offline-sync").join("logs").join("dev.jsonl"))
}

/// Initialize with default settings.
pub fn init(service_name: &str) {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    });
}

/// Install the global subscriber.
///
/// When the log file cannot be opened, logging continues on stderr only.
/// Calling this again after a subscriber is installed has no effect.
pub fn init_with_config(config: LogConfig) {
    let log_path = config.log_path.clone().or_else(default_log_path);

    let (file_layer, file_error) = match log_path.as_deref().map(CentralLogWriter::new) {
        Some(Ok(writer)) => {
            let layer = JsonLayer::new(config.service_name.clone(), WriterFactory::new(writer))
                .with_filter(env_filter(&config.default_level));
            (Some(layer), None)
        }
        Some(Err(e)) => (None, Some(e.to_string())),
        None => (None, Some("home directory not found".to_string())),
    };

    let want_stderr = config.also_stderr || file_layer.is_none();
    let stderr_layer = want_stderr.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .with_writer(std::io::stderr)
            .with_filter(env_filter(&config.default_level))
    });

    let installed = tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .is_ok();
    if !installed {
        return;
    }

    match (&log_path, file_error) {
        (_, Some(error)) => tracing::warn!(error = %error, "log file unavailable, logging to stderr"),
        (Some(path), None) => tracing::info!(log_path = %path.display(), "observability initialized"),
        (None, None) => {}
    }
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Re-export tracing macros for convenience.
pub use tracing::{debug, error, info, instrument, trace, warn};

/// Re-export Level for advanced filtering.
pub use tracing::Level;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.service_name, "unknown");
        assert_eq!(config.default_level, "info");
        assert!(config.log_path.is_none());
        assert!(!config.also_stderr);
    }

    #[test]
    fn test_default_log_path_shape() {
        if let Some(path) = default_log_path() {
            assert!(path.ends_with(".offline-sync/logs/dev.jsonl"));
        }
    }
}
