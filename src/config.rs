//! Breakwater configuration.
//!
//! Loaded from `~/.breakwater/config.toml`. A missing file means
//! defaults; a present-but-invalid file is an error, so a typo never
//! silently reverts tuned thresholds to defaults.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::breaker::BreakerConfig;
use crate::retention::RetentionPolicy;

/// Host-tunable settings for the resilience layer.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    /// Defaults applied to breakers constructed through the registry.
    pub breaker: BreakerConfig,

    /// Retention policy set. Absent means the built-in defaults.
    pub retention: Option<Vec<RetentionPolicy>>,

    /// Assumed local-storage quota in bytes. Absent means 5 MiB.
    pub quota_bytes: Option<u64>,
}

impl Config {
    /// Load config from `~/.breakwater/config.toml`. Missing file (or an
    /// undeterminable home directory) yields the defaults.
    pub fn load() -> Result<Self, String> {
        match Self::path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load config from an explicit path. Missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, String> {
        let contents = match fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(format!("failed to read {}: {e}", path.display())),
        };

        toml::from_str(&contents).map_err(|e| format!("invalid config at {}: {e}", path.display()))
    }

    /// The config file path: `~/.breakwater/config.toml`.
    #[must_use]
    pub fn path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".breakwater").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    use crate::retention::Priority;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("config.toml")).unwrap();

        assert_eq!(config.breaker.failure_threshold, 5);
        assert!(config.retention.is_none());
        assert!(config.quota_bytes.is_none());
    }

    #[test]
    fn parses_full_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
quota-bytes = 1048576

[breaker]
failure-threshold = 3
open-timeout-ms = 10000

[[retention]]
module = "cache"
max-age-days = 7
priority = "low"
key-prefix = "cache_"
"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.breaker.failure_threshold, 3);
        assert_eq!(config.breaker.open_timeout_ms, 10_000);
        // Omitted breaker fields fall back to defaults.
        assert_eq!(config.breaker.success_threshold, 2);
        assert_eq!(config.quota_bytes, Some(1_048_576));

        let retention = config.retention.unwrap();
        assert_eq!(retention.len(), 1);
        assert_eq!(retention[0].module, "cache");
        assert_eq!(retention[0].priority, Priority::Low);
    }

    #[test]
    fn invalid_config_is_an_error_not_a_silent_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "breaker = \"not a table\"").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.contains("invalid config"));
    }
}
