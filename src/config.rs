// ⚙️ YAML configuration
// Every field has a default, so an empty file (or no file) is a valid config.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::db::StoreConfig;
use crate::error::{Result, TrackerError};
use crate::parser::ParseOptions;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreSection,
    pub report: ReportConfig,
    pub parse: ParseOptions,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    pub path: PathBuf,
    #[serde(flatten)]
    pub retry: StoreConfig,
}

impl Default for StoreSection {
    fn default() -> Self {
        StoreSection {
            path: PathBuf::from("rank-tracker.db"),
            retry: StoreConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub top_n: usize,
    /// Threshold date for the prior snapshot set = batch date - lookback_days
    pub lookback_days: u32,
}

impl Default for ReportConfig {
    fn default() -> Self {
        ReportConfig {
            top_n: 5,
            lookback_days: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive; RUST_LOG takes precedence
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Defaults when `path` is None; otherwise the file must exist and parse.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Config::default());
        };

        let text = std::fs::read_to_string(path)
            .map_err(|e| TrackerError::Config(format!("reading {}: {e}", path.display())))?;
        Self::from_yaml(&text)
            .map_err(|e| TrackerError::Config(format!("parsing {}: {e}", path.display())))
    }

    pub fn from_yaml(text: &str) -> std::result::Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Config::default());
        }
        serde_yaml::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.store.path, PathBuf::from("rank-tracker.db"));
        assert_eq!(config.store.retry.max_retries, 3);
        assert_eq!(config.report.top_n, 5);
        assert_eq!(config.report.lookback_days, 1);
        assert!(!config.parse.lenient);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = Config::from_yaml(
            "store:\n  path: data/models.db\n  max_retries: 5\nreport:\n  top_n: 10\nparse:\n  lenient: true\n",
        )
        .unwrap();
        assert_eq!(config.store.path, PathBuf::from("data/models.db"));
        assert_eq!(config.store.retry.max_retries, 5);
        assert_eq!(config.store.retry.busy_timeout_ms, 30_000);
        assert_eq!(config.report.top_n, 10);
        assert_eq!(config.report.lookback_days, 1);
        assert!(config.parse.lenient);
    }

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(Config::from_yaml("").unwrap(), Config::default());
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = Config::load(Some(Path::new("/no/such/config.yaml"))).unwrap_err();
        assert!(matches!(err, TrackerError::Config(_)));
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "logging:\n  level: debug\n").unwrap();
        assert_eq!(Config::load(Some(&path)).unwrap().logging.level, "debug");
    }
}
