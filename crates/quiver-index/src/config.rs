//! Unified configuration for the quiver index.
//!
//! Supports defaults embedded in the binary, TOML configuration files, and
//! environment variable overrides with the `QUIVER__` prefix:
//!
//! - `QUIVER__HYDRATION__COMPACT_AFTER_LOAD=false`
//! - `QUIVER__MEMORY__LIMIT_MB=8192`
//! - `QUIVER__MEMORY__WARN_PERCENT=75`
//! - `QUIVER__LOGGING__LEVEL=debug`
//! - `QUIVER__LOGGING__JSON=1`
//!
//! # Example
//!
//! ```ignore
//! use quiver_index::config::QuiverConfig;
//!
//! let config = QuiverConfig::load(Some("quiver.toml")).unwrap();
//! if config.hydration.compact_after_load {
//!     // ...
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Root configuration for the quiver index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QuiverConfig {
    /// Bulk hydration behavior
    pub hydration: HydrationConfig,
    /// Memory limits and warnings
    pub memory: MemoryConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl QuiverConfig {
    /// Loads configuration from an optional file path with environment
    /// variable overrides.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (`QUIVER__*`)
    /// 2. Configuration file (if provided)
    /// 3. Built-in defaults
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(file_path) = path {
            if Path::new(file_path).exists() {
                let contents = std::fs::read_to_string(file_path)?;
                config = toml::from_str(&contents)?;
            }
        }

        config.apply_env_overrides();
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("QUIVER__HYDRATION__COMPACT_AFTER_LOAD") {
            self.hydration.compact_after_load = parse_bool(&val);
        }

        if let Ok(val) = std::env::var("QUIVER__MEMORY__LIMIT_MB") {
            if let Ok(v) = val.parse() {
                self.memory.limit_mb = Some(v);
            }
        }
        if let Ok(val) = std::env::var("QUIVER__MEMORY__WARN_PERCENT") {
            if let Ok(v) = val.parse() {
                self.memory.warn_percent = v;
            }
        }

        if let Ok(val) = std::env::var("QUIVER__LOGGING__LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("QUIVER__LOGGING__JSON") {
            self.logging.json = parse_bool(&val);
        }
    }

    /// Serializes the configuration to TOML.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

fn parse_bool(val: &str) -> bool {
    val.eq_ignore_ascii_case("true") || val == "1"
}

/// Bulk hydration configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HydrationConfig {
    /// Compact the topology after a successful bulk load.
    pub compact_after_load: bool,
}

impl Default for HydrationConfig {
    fn default() -> Self {
        Self {
            compact_after_load: true,
        }
    }
}

/// Memory configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Memory limit in MB (None = unlimited)
    pub limit_mb: Option<usize>,
    /// Warning threshold as percentage of limit
    pub warn_percent: f64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            limit_mb: None,
            warn_percent: 80.0,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Use JSON format for log output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
