//! Application configuration
//!
//! Loaded from TOML. Missing sections and fields fall back to defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::connection::ConnectionParameters;
use crate::constants::{DEFAULT_CYCLE_RATE_HZ, DEFAULT_POLL_TIMEOUT_MS, MAX_BUFFER_LENGTH_S};
use crate::error::{ConfigError, Result};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub receiver: ConnectionParameters,
    pub host: HostConfig,
}

/// Host cadence and capture timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Cycles per second driven by the host
    pub cycle_rate_hz: f64,
    /// Bounded wait of each receiver poll
    pub poll_timeout_ms: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            cycle_rate_hz: DEFAULT_CYCLE_RATE_HZ,
            poll_timeout_ms: DEFAULT_POLL_TIMEOUT_MS,
        }
    }
}

impl HostConfig {
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.cycle_rate_hz)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    /// Samples per channel consumed each cycle at `sample_rate`
    pub fn samples_per_cycle(&self, sample_rate: u32) -> usize {
        (sample_rate as f64 / self.cycle_rate_hz).round() as usize
    }
}

impl AppConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let mut config: AppConfig = toml::from_str(text).map_err(ConfigError::from)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Load from the explicit path, else the per-user config file, else defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }

        match Self::default_path() {
            Some(path) if path.exists() => {
                tracing::info!("Loading config from {}", path.display());
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// `receiver.toml` in the platform config directory
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "live-source-receiver")
            .map(|dirs| dirs.config_dir().join("receiver.toml"))
    }

    /// Reject unusable values and clamp the buffer length
    pub fn validate(&mut self) -> std::result::Result<(), ConfigError> {
        let length = self.receiver.buffer_length_seconds;
        if !length.is_finite() || length < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "receiver.buffer_length_seconds",
                reason: format!("{} is not a non-negative number of seconds", length),
            });
        }
        if length > MAX_BUFFER_LENGTH_S {
            tracing::warn!("Buffer length {}s clamped to {}s", length, MAX_BUFFER_LENGTH_S);
            self.receiver.buffer_length_seconds = MAX_BUFFER_LENGTH_S;
        }

        if !self.host.cycle_rate_hz.is_finite() || self.host.cycle_rate_hz <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "host.cycle_rate_hz",
                reason: "must be positive".into(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::source::Bandwidth;

    #[test]
    fn test_empty_document_is_default() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.host.poll_timeout(), Duration::from_millis(10));
    }

    #[test]
    fn test_parse() {
        let config = AppConfig::from_toml_str(
            r#"
            [receiver]
            source_name = "STUDIO (Camera 1)"
            bandwidth = "Low"
            extra_search_addresses = "10.0.0.5,10.0.0.6"
            buffer_length_seconds = 0.5

            [host]
            cycle_rate_hz = 30.0
            "#,
        )
        .unwrap();

        assert!(config.receiver.active);
        assert_eq!(config.receiver.source_name, "STUDIO (Camera 1)");
        assert_eq!(config.receiver.bandwidth, Bandwidth::Low);
        assert_eq!(config.receiver.buffer_length_seconds, 0.5);
        assert_eq!(config.host.samples_per_cycle(48000), 1600);
    }

    #[test]
    fn test_validation() {
        let err = AppConfig::from_toml_str("[receiver]\nbuffer_length_seconds = -1.0").unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::InvalidValue { .. })));

        let err = AppConfig::from_toml_str("[host]\ncycle_rate_hz = 0.0").unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::InvalidValue { .. })));

        let config = AppConfig::from_toml_str("[receiver]\nbuffer_length_seconds = 60.0").unwrap();
        assert_eq!(config.receiver.buffer_length_seconds, 10.0);
    }

    #[test]
    fn test_parse_error() {
        let err = AppConfig::from_toml_str("[receiver]\nactive = \"yes\"").unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::Parse(_))));
    }
}
