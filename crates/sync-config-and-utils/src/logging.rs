//! Logging bootstrap.
//!
//! Thin wrapper over the observability crate so binaries set logging up in
//! one call. Structured JSONL goes to `~/.offline-sync/logs/dev.jsonl`.

pub use observability::{init_with_config, LogConfig};

use crate::Paths;

/// Service name written on every log line.
pub const SERVICE_NAME: &str = "offline-sync";

/// Initialize logging with the default log location.
///
/// `RUST_LOG` overrides `level`. Set `also_stderr` for foreground use.
pub fn init_logging(level: &str, also_stderr: bool) {
    init_with_config(log_config(level, also_stderr, None));
}

/// Initialize logging under a custom base directory.
pub fn init_logging_in(paths: &Paths, level: &str, also_stderr: bool) {
    init_with_config(log_config(level, also_stderr, Some(paths)));
}

fn log_config(level: &str, also_stderr: bool, paths: Option<&Paths>) -> LogConfig {
    LogConfig {
        service_name: SERVICE_NAME.into(),
        default_level: normalize_level(level).into(),
        log_path: paths.map(|p| p.logs_dir().join("dev.jsonl")),
        also_stderr,
    }
}

/// Map a user-supplied level to a filter directive, defaulting to info.
pub fn normalize_level(level: &str) -> &'static str {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "info" => "info",
        "warn" | "warning" => "warn",
        "error" => "error",
        _ => "info",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn normalize_level_all_variants() {
        assert_eq!(normalize_level("trace"), "trace");
        assert_eq!(normalize_level("Debug"), "debug");
        assert_eq!(normalize_level(" INFO "), "info");
        assert_eq!(normalize_level("warning"), "warn");
        assert_eq!(normalize_level("ERROR"), "error");
    }

    #[test]
    fn normalize_level_unknown_defaults_to_info() {
        assert_eq!(normalize_level(""), "info");
        assert_eq!(normalize_level("verbose"), "info");
    }

    #[test]
    fn log_config_uses_base_dir() {
        let paths = Paths::with_base_dir(PathBuf::from("/tmp/sync-logs"));
        let config = log_config("debug", true, Some(&paths));
        assert_eq!(config.service_name, SERVICE_NAME);
        assert_eq!(config.default_level, "debug");
        assert_eq!(
            config.log_path,
            Some(PathBuf::from("/tmp/sync-logs/logs/dev.jsonl"))
        );
        assert!(config.also_stderr);

        assert!(log_config("info", false, None).log_path.is_none());
    }
}
