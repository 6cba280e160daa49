//! Engine configuration.
//!
//! Every option has a default, so an empty document is a valid configuration:
//!
//! ```rust
//! use wxlink::StationConfig;
//!
//! let config = StationConfig::from_yaml_str(
//!     "history_limit: 40\nsensor_map:\n  temperature_1: outTemp\n",
//! )?;
//! assert_eq!(config.history_limit, 40);
//! assert_eq!(config.heartbeat_interval, 20);
//! # Ok::<(), wxlink::StationError>(())
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use crate::decoder::SensorMap;
use crate::{Result, StationError};

/// Lowest accepted ring-occupancy watermark, in percent.
pub const HISTORY_LIMIT_MIN: u8 = 5;
/// Highest accepted ring-occupancy watermark, in percent.
pub const HISTORY_LIMIT_MAX: u8 = 95;

/// USB identity of the logger to open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSelector {
    pub vendor_id: u16,
    pub product_id: u16,
    /// Pick a specific unit when several are attached.
    pub serial: Option<String>,
}

impl Default for DeviceSelector {
    fn default() -> Self {
        Self { vendor_id: 0x0FDE, product_id: 0xCA01, serial: None }
    }
}

/// Diagnostic logging switches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugOptions {
    /// Log every raw report read or written at trace level.
    pub log_frames: bool,
    /// Log each history record as it is replayed.
    pub log_history: bool,
}

/// Options recognised by the station engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    /// Internal field name to canonical name. Empty means identity.
    pub sensor_map: SensorMap,
    /// Ring occupancy percentage that triggers an automatic erase-mode sync.
    pub history_limit: u8,
    /// Seconds between heartbeats.
    pub heartbeat_interval: u64,
    /// Ask the station to erase history once delivered during the initial sync.
    pub history_erase_on_read: bool,
    /// Upper bound on a single transport read, in milliseconds.
    pub read_timeout_ms: u64,
    /// Attempts at the full handshake sequence before giving up.
    pub handshake_attempts: u32,
    pub device: DeviceSelector,
    pub debug: DebugOptions,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            sensor_map: SensorMap::identity(),
            history_limit: 20,
            heartbeat_interval: 20,
            history_erase_on_read: false,
            read_timeout_ms: 250,
            handshake_attempts: 3,
            device: DeviceSelector::default(),
            debug: DebugOptions::default(),
        }
    }
}

impl StationConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: StationConfig = serde_yaml_ng::from_str(yaml)?;
        config.validated()
    }

    /// Check ranges, clamping the history watermark into its accepted band.
    pub fn validated(mut self) -> Result<Self> {
        let clamped = self.history_limit.clamp(HISTORY_LIMIT_MIN, HISTORY_LIMIT_MAX);
        if clamped != self.history_limit {
            warn!(
                requested = self.history_limit,
                used = clamped,
                "history_limit outside {}-{}%, clamping",
                HISTORY_LIMIT_MIN,
                HISTORY_LIMIT_MAX
            );
            self.history_limit = clamped;
        }

        if self.heartbeat_interval == 0 {
            return Err(StationError::config("heartbeat_interval", "must be at least 1 second"));
        }
        if self.read_timeout_ms == 0 {
            return Err(StationError::config("read_timeout_ms", "must be positive"));
        }
        if self.read_timeout_ms >= self.heartbeat_interval.saturating_mul(1000) {
            return Err(StationError::config(
                "read_timeout_ms",
                "must be shorter than heartbeat_interval",
            ));
        }
        if self.handshake_attempts == 0 {
            return Err(StationError::config("handshake_attempts", "must be at least 1"));
        }
        Ok(self)
    }

    pub fn heartbeat_period(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = StationConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, StationConfig::default());
        assert!(config.sensor_map.is_identity());
        assert_eq!(config.heartbeat_period(), Duration::from_secs(20));
    }

    #[test]
    fn history_limit_is_clamped() {
        let low = StationConfig::from_yaml_str("history_limit: 1").unwrap();
        assert_eq!(low.history_limit, HISTORY_LIMIT_MIN);

        let high = StationConfig::from_yaml_str("history_limit: 99").unwrap();
        assert_eq!(high.history_limit, HISTORY_LIMIT_MAX);
    }

    #[test]
    fn full_document_parses() {
        let yaml = r#"
sensor_map:
  temperature_1: outTemp
  humidity_1: outHumidity
history_limit: 60
heartbeat_interval: 30
history_erase_on_read: true
read_timeout_ms: 100
device:
  vendor_id: 4660
  product_id: 22136
debug:
  log_frames: true
"#;
        let config = StationConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.sensor_map.canonical("temperature_1"), Some("outTemp"));
        assert_eq!(config.sensor_map.canonical("temperature_2"), None);
        assert!(config.history_erase_on_read);
        assert_eq!(config.device.vendor_id, 0x1234);
        assert!(config.device.serial.is_none());
        assert!(config.debug.log_frames);
        assert!(!config.debug.log_history);
        assert_eq!(config.read_timeout(), Duration::from_millis(100));
    }

    #[test]
    fn invalid_values_are_config_errors() {
        for yaml in [
            "heartbeat_interval: 0",
            "read_timeout_ms: 0",
            "handshake_attempts: 0",
            "heartbeat_interval: 1\nread_timeout_ms: 2000",
        ] {
            let err = StationConfig::from_yaml_str(yaml).unwrap_err();
            assert!(matches!(err, StationError::Config { .. }), "{yaml}: {err}");
        }
    }

    #[test]
    fn malformed_yaml_is_a_config_error() {
        let err = StationConfig::from_yaml_str("history_limit: [").unwrap_err();
        assert!(matches!(err, StationError::Config { .. }));
    }
}
