//! Configuration loaded from `transform-status.toml`.
//!
//! Missing fields fall back to defaults. The `TRANSFORM_STATUS_LOG`
//! environment variable takes precedence over the file for the log level.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::telemetry::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig};

/// Default config file looked up in the working directory.
pub const CONFIG_FILE: &str = "transform-status.toml";

/// Environment variable overriding `log_level`.
pub const LOG_LEVEL_ENV: &str = "TRANSFORM_STATUS_LOG";

#[derive(Debug, Clone, Deserialize)]
pub struct StatusConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Metadata types the demo fans a transformation out into.
    #[serde(default = "default_metadata_types")]
    pub metadata_types: Vec<String>,

    /// Simulated work per metadata type in the demo, in milliseconds.
    #[serde(default = "default_worker_delay_ms")]
    pub worker_delay_ms: u64,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_metadata_types() -> Vec<String> {
    vec!["irm".to_string(), "metacard".to_string()]
}

fn default_worker_delay_ms() -> u64 {
    200
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            metadata_types: default_metadata_types(),
            worker_delay_ms: default_worker_delay_ms(),
        }
    }
}

impl StatusConfig {
    /// Load `transform-status.toml` from the working directory.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    /// Load from `path`, using defaults if the file does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            toml::from_str::<StatusConfig>(&contents)
                .with_context(|| format!("parsing {}", path.display()))?
        } else {
            Self::default()
        };

        if let Ok(level) = std::env::var(LOG_LEVEL_ENV)
            && !level.is_empty()
        {
            config.log_level = level;
        }

        Ok(config)
    }

    pub fn logging(&self) -> LoggingConfig<'_> {
        LoggingConfig {
            level: &self.log_level,
            format: self.log_format,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_values() {
        let config = StatusConfig::default();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.metadata_types, vec!["irm", "metacard"]);
        assert_eq!(config.worker_delay_ms, 200);
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            log_format = "json"
            metadata_types = ["irm", "metacard", "thumbnail"]
        "#;
        let config: StatusConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.metadata_types.len(), 3);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.worker_delay_ms, 200);
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "worker_delay_ms = 5").unwrap();
        let config = StatusConfig::load_from(file.path()).unwrap();
        assert_eq!(config.worker_delay_ms, 5);
    }

    #[test]
    fn load_rejects_invalid_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "log_format = \"xml\"").unwrap();
        assert!(StatusConfig::load_from(file.path()).is_err());
    }

    #[test]
    fn load_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = StatusConfig::load_from(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config.worker_delay_ms, 200);
        assert_eq!(config.metadata_types, vec!["irm", "metacard"]);
    }
}
