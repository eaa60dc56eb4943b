//! Configuration management.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use sync_manager::{RetentionPolicy, SyncSettings};
use url::Url;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default remote API base URL.
pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:3000";

/// Prefix for environment overrides.
const ENV_PREFIX: &str = "OFFLINE_SYNC_";

/// Engine and tooling configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Base URL relative endpoints are replayed against.
    pub api_base_url: String,
    /// Attempts before a mutation is considered failed.
    pub max_retries: u32,
    pub base_backoff_delay_ms: u64,
    pub max_backoff_delay_ms: u64,
    /// What happens to queue records after they sync.
    pub retention: RetentionPolicy,
    pub request_timeout_secs: u64,
    /// How often the health probe checks connectivity.
    pub probe_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            max_retries: 3,
            base_backoff_delay_ms: 2000,
            max_backoff_delay_ms: 60_000,
            retention: RetentionPolicy::RetainForAudit,
            request_timeout_secs: 30,
            probe_interval_secs: 15,
        }
    }
}

impl Config {
    /// Defaults, then environment overrides.
    pub fn new() -> CoreResult<Self> {
        let mut config = Self::default();
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Load `config.json` when present, falling back to defaults, then
    /// apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Override fields from `OFFLINE_SYNC_*` variables.
    fn apply_env<F>(&mut self, lookup: F) -> CoreResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(level) = var("LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(url) = var("API_URL") {
            self.api_base_url = url;
        }
        if let Some(raw) = var("MAX_RETRIES") {
            self.max_retries = raw.parse().map_err(|_| {
                CoreError::Config(format!("{ENV_PREFIX}MAX_RETRIES is not a number: {raw}"))
            })?;
        }
        if let Some(raw) = var("RETENTION") {
            self.retention = match raw.to_ascii_lowercase().as_str() {
                "retain" | "retain_for_audit" => RetentionPolicy::RetainForAudit,
                "purge" | "purge_on_success" => RetentionPolicy::PurgeOnSuccess,
                other => {
                    return Err(CoreError::Config(format!(
                        "{ENV_PREFIX}RETENTION must be retain or purge, got {other}"
                    )))
                }
            };
        }
        Ok(())
    }

    /// Parsed API base URL.
    pub fn api_base_url(&self) -> CoreResult<Url> {
        Url::parse(&self.api_base_url).map_err(CoreError::from)
    }

    /// Health endpoint probed for connectivity.
    pub fn health_url(&self) -> CoreResult<Url> {
        let mut base = self.api_base_url()?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(base.join("health")?)
    }

    /// Engine settings derived from this configuration.
    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            max_retries: self.max_retries,
            base_backoff: Duration::from_millis(self.base_backoff_delay_ms),
            max_backoff: Duration::from_millis(self.max_backoff_delay_ms.max(self.base_backoff_delay_ms)),
            retention: self.retention,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retention, RetentionPolicy::RetainForAudit);
    }

    #[test]
    fn test_config_load_from_file_fills_missing_fields() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        std::fs::write(&config_path, r#"{ "log_level": "debug", "retention": "purge_on_success" }"#)
            .unwrap();

        let config = Config::load_from_file(&config_path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.retention, RetentionPolicy::PurgeOnSuccess);
        assert_eq!(config.base_backoff_delay_ms, 2000);
    }

    #[test]
    fn test_config_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let config = Config {
            max_retries: 7,
            api_base_url: "https://api.example.com/v1".to_string(),
            ..Config::default()
        };
        config.save(&paths).unwrap();

        let loaded = Config::load_from_file(&paths.config_file()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_config_load_nonexistent_uses_defaults() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let config = Config::load(&paths).unwrap();
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
    }

    #[test]
    fn test_config_invalid_file_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(Config::load_from_file(&path), Err(CoreError::Json(_))));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env(env(&[
                ("OFFLINE_SYNC_LOG_LEVEL", "trace"),
                ("OFFLINE_SYNC_API_URL", "http://10.0.0.2:8080"),
                ("OFFLINE_SYNC_MAX_RETRIES", "5"),
                ("OFFLINE_SYNC_RETENTION", "purge"),
            ]))
            .unwrap();

        assert_eq!(config.log_level, "trace");
        assert_eq!(config.api_base_url, "http://10.0.0.2:8080");
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.retention, RetentionPolicy::PurgeOnSuccess);
    }

    #[test]
    fn test_blank_env_values_are_ignored() {
        let mut config = Config::default();
        config.apply_env(env(&[("OFFLINE_SYNC_LOG_LEVEL", "  ")])).unwrap();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
    }

    #[test]
    fn test_bad_env_values_are_errors() {
        let mut config = Config::default();
        assert!(matches!(
            config.apply_env(env(&[("OFFLINE_SYNC_MAX_RETRIES", "many")])),
            Err(CoreError::Config(_))
        ));
        assert!(matches!(
            config.apply_env(env(&[("OFFLINE_SYNC_RETENTION", "forever")])),
            Err(CoreError::Config(_))
        ));
    }

    #[test]
    fn test_sync_settings_conversion() {
        let config = Config {
            max_retries: 4,
            base_backoff_delay_ms: 500,
            max_backoff_delay_ms: 100,
            retention: RetentionPolicy::PurgeOnSuccess,
            ..Config::default()
        };
        let settings = config.sync_settings();
        assert_eq!(settings.max_retries, 4);
        assert_eq!(settings.base_backoff, Duration::from_millis(500));
        // The cap never sits below the base delay.
        assert_eq!(settings.max_backoff, Duration::from_millis(500));
        assert_eq!(settings.retention, RetentionPolicy::PurgeOnSuccess);
    }

    #[test]
    fn test_health_url() {
        let config = Config {
            api_base_url: "https://api.example.com/v1".to_string(),
            ..Config::default()
        };
        assert_eq!(
            config.health_url().unwrap().as_str(),
            "https://api.example.com/v1/health"
        );
        assert_eq!(
            Config::default().health_url().unwrap().as_str(),
            "http://127.0.0.1:3000/health"
        );
    }

    #[test]
    fn test_config_invalid_url() {
        let config = Config {
            api_base_url: "not a valid url".to_string(),
            ..Config::default()
        };
        assert!(config.api_base_url().is_err());
    }
}
