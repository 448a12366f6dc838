//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use crate::storage::{StoreConfig, SyncMode};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Event store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub sync_mode: SyncMode,

    #[serde(default = "default_sync_threshold")]
    pub sync_threshold_bytes: usize,
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|p| p.join("colstore"))
        .unwrap_or_else(|| PathBuf::from("./colstore_data"))
}

fn default_sync_threshold() -> usize {
    64 * 1024 // 64 KB
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            sync_mode: SyncMode::default(),
            sync_threshold_bytes: default_sync_threshold(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|error| ConfigError::Parse {
            path: path.to_path_buf(),
            error,
        })
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("colstore").join("config.toml")),
            Some(PathBuf::from("/etc/colstore/config.toml")),
            Some(PathBuf::from("./colstore.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Store settings for `EventStore::open`
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            data_dir: self.storage.data_dir.clone(),
            sync_mode: self.storage.sync_mode,
            sync_threshold: self.storage.sync_threshold_bytes,
        }
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply `COLSTORE_*` overrides from `lookup`
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        // Storage overrides
        if let Some(data_dir) = lookup("COLSTORE_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(data_dir);
        }
        if let Some(mode) = lookup("COLSTORE_SYNC_MODE") {
            match parse_sync_mode(&mode) {
                Some(mode) => self.storage.sync_mode = mode,
                None => tracing::warn!("Ignoring unknown COLSTORE_SYNC_MODE '{}'", mode),
            }
        }

        // Logging overrides
        if let Some(level) = lookup("COLSTORE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("COLSTORE_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

fn parse_sync_mode(name: &str) -> Option<SyncMode> {
    match name.trim().to_ascii_lowercase().as_str() {
        "every_write" => Some(SyncMode::EveryWrite),
        "batched" => Some(SyncMode::Batched),
        "none" => Some(SyncMode::None),
        _ => None,
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# colstore Configuration
#
# Environment variables override these settings:
# - COLSTORE_DATA_DIR
# - COLSTORE_SYNC_MODE
# - COLSTORE_LOG_LEVEL
# - COLSTORE_LOG_FORMAT

[storage]
# Directory holding index.int and the column files
data_dir = "./colstore_data"

# When to fsync: every_write, batched, or none
sync_mode = "batched"

# Bytes written between syncs in batched mode
sync_threshold_bytes = 65536

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.storage.sync_mode, SyncMode::Batched);
        assert_eq!(config.storage.sync_threshold_bytes, 64 * 1024);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_generated_config_parses() {
        let config = Config::parse(&generate_default_config()).unwrap();
        assert_eq!(config.storage.data_dir, PathBuf::from("./colstore_data"));
        assert_eq!(config.storage.sync_mode, SyncMode::Batched);
        assert_eq!(config.storage.sync_threshold_bytes, 65536);
    }

    #[test]
    fn test_partial_config() {
        let config = Config::parse(
            r#"
            [storage]
            sync_mode = "every_write"
            "#,
        )
        .unwrap();

        assert_eq!(config.storage.sync_mode, SyncMode::EveryWrite);
        assert_eq!(config.storage.sync_threshold_bytes, 64 * 1024);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_invalid_sync_mode() {
        let result = Config::parse("[storage]\nsync_mode = \"sometimes\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("colstore.toml");
        std::fs::write(&path, "[storage]\ndata_dir = \"/tmp/events\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.storage.data_dir, PathBuf::from("/tmp/events"));

        let missing = Config::load(&dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("COLSTORE_DATA_DIR", "/var/lib/colstore"),
            ("COLSTORE_SYNC_MODE", "NONE"),
            ("COLSTORE_LOG_FORMAT", "json"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.storage.data_dir, PathBuf::from("/var/lib/colstore"));
        assert_eq!(config.storage.sync_mode, SyncMode::None);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.logging.level, "info");

        let store = config.store_config();
        assert_eq!(store.data_dir, PathBuf::from("/var/lib/colstore"));
        assert_eq!(store.sync_mode, SyncMode::None);
    }
}
