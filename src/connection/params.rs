//! Per-cycle connection parameters

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_BUFFER_LENGTH_S, MAX_BUFFER_LENGTH_S};
use crate::source::Bandwidth;

/// Parameters the host hands to the node on every cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionParameters {
    pub active: bool,
    pub source_name: String,
    pub bandwidth: Bandwidth,
    /// Comma-separated addresses probed in addition to local discovery
    pub extra_search_addresses: String,
    pub buffer_length_seconds: f64,
}

impl Default for ConnectionParameters {
    fn default() -> Self {
        Self {
            active: true,
            source_name: String::new(),
            bandwidth: Bandwidth::High,
            extra_search_addresses: String::new(),
            buffer_length_seconds: DEFAULT_BUFFER_LENGTH_S,
        }
    }
}

impl ConnectionParameters {
    /// Parameters requesting `source_name` with everything else default
    pub fn for_source(source_name: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            ..Default::default()
        }
    }

    /// Buffer length clamped into the accepted range
    pub fn clamped_buffer_length(&self) -> f64 {
        if self.buffer_length_seconds.is_nan() {
            return DEFAULT_BUFFER_LENGTH_S;
        }
        self.buffer_length_seconds.clamp(0.0, MAX_BUFFER_LENGTH_S)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let params = ConnectionParameters::default();
        assert!(params.active);
        assert_eq!(params.bandwidth, Bandwidth::High);
        assert_eq!(params.buffer_length_seconds, 0.25);
    }

    #[test]
    fn test_clamp() {
        let mut params = ConnectionParameters::for_source("CamA");
        params.buffer_length_seconds = 42.0;
        assert_eq!(params.clamped_buffer_length(), 10.0);
        params.buffer_length_seconds = -1.0;
        assert_eq!(params.clamped_buffer_length(), 0.0);
        params.buffer_length_seconds = f64::NAN;
        assert_eq!(params.clamped_buffer_length(), 0.25);
    }
}
