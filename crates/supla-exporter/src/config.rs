//! Configuration loading, validation and path resolution.
//!
//! ```yaml
//! global:
//!   interval: 60      # seconds between cycles
//!   port: 2112        # /metrics listen port
//!   log_level: info   # debug | info | warn | error
//!   timeout: 5        # per-request timeout in seconds
//!   workers: 5        # concurrent fetch workers
//! devices:
//!   - url: http://192.168.1.20
//!     username: admin
//!     password: secret
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use supla_core::{DeviceTarget, MarkerLayout};
use tracing::debug;

use crate::error::ConfigError;

/// Environment variable consulted when no `--config` is given.
pub const CONFIG_ENV: &str = "SUPLA_EXPORTER_CONFIG";

const LOG_LEVELS: [&str; 4] = ["debug", "info", "warn", "error"];

/// Process-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Seconds between polling cycles.
    pub interval: u64,
    pub port: u16,
    pub log_level: String,
    /// Per-request timeout in seconds.
    pub timeout: u64,
    pub workers: usize,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            interval: 60,
            port: 2112,
            log_level: "info".to_string(),
            timeout: 5,
            workers: 5,
        }
    }
}

impl GlobalConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub devices: Vec<DeviceTarget>,
    /// Overrides the page layout the extractor scans for.
    #[serde(default)]
    pub extraction: MarkerLayout,
}

impl Config {
    /// Parse and validate a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&yaml)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let g = &self.global;
        if g.interval < 1 {
            return Err(invalid("global.interval must be greater than 0"));
        }
        if g.port < 1 {
            return Err(invalid("global.port must be between 1 and 65535"));
        }
        if !LOG_LEVELS.contains(&g.log_level.as_str()) {
            return Err(invalid(
                "global.log_level must be one of: debug, info, warn, error",
            ));
        }
        if !(1..=30).contains(&g.timeout) {
            return Err(invalid(format!(
                "global.timeout must be between 1 and 30 seconds, got {}",
                g.timeout
            )));
        }
        if !(1..=100).contains(&g.workers) {
            return Err(invalid("global.workers must be between 1 and 100"));
        }

        if self.devices.is_empty() {
            return Err(invalid("no devices configured"));
        }

        let mut seen = HashSet::new();
        for (i, dev) in self.devices.iter().enumerate() {
            if dev.url.is_empty() {
                return Err(invalid(format!("device {i}: URL is required")));
            }
            if let Err(e) = url::Url::parse(&dev.url) {
                return Err(invalid(format!("device {i}: invalid URL: {e}")));
            }
            if dev.username.is_empty() {
                return Err(invalid(format!("device {i}: username is required")));
            }
            if dev.password.is_empty() {
                return Err(invalid(format!("device {i}: password is required")));
            }
            if !seen.insert(dev.url.as_str()) {
                return Err(invalid(format!(
                    "device {i}: duplicate URL {} (each device URL must be unique)",
                    dev.url
                )));
            }
        }

        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}

/// Resolve the config file path.
///
/// Tried in order: explicit path, `SUPLA_EXPORTER_CONFIG`,
/// `config/config.yaml`, `./config.yaml`, `../config.yaml`.
pub fn resolve_config_path(explicit: Option<&str>) -> Result<PathBuf, ConfigError> {
    let mut candidates: Vec<String> = Vec::new();
    if let Some(path) = explicit {
        candidates.push(path.to_string());
    }
    if let Ok(env_path) = std::env::var(CONFIG_ENV) {
        candidates.push(env_path);
    }
    candidates.extend(
        ["config/config.yaml", "./config.yaml", "../config.yaml"]
            .iter()
            .map(|p| p.to_string()),
    );

    for candidate in &candidates {
        let path = PathBuf::from(candidate);
        if path.is_file() {
            return Ok(path);
        }
        debug!(path = %candidate, "config file not accessible");
    }

    Err(ConfigError::NotFound(candidates))
}
