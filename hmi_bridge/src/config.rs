/*!
Configuration management for the bridge application.
*/

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use shared::state::{DEFAULT_DISTANCE, DEFAULT_SIDE_LENGTH};
use shared::{DispatcherTimeouts, PusherConfig};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub telemetry: TelemetryPortConfig,
    pub hmi: HmiPortConfig,
    pub output: OutputConfig,
}

impl BridgeConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: BridgeConfig =
            toml::from_str(&content).with_context(|| "Failed to parse config file as TOML")?;

        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            let config = Self::load_from_file(path.as_ref())?;
            info!("Configuration loaded from {}", path.as_ref().display());
            Ok(config)
        } else {
            info!("No config at {}, using defaults", path.as_ref().display());
            Ok(Self::new())
        }
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content =
            toml::to_string_pretty(self).with_context(|| "Failed to serialize config to TOML")?;

        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Reject values the workers cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.telemetry.port.is_empty() {
            bail!("telemetry.port must not be empty");
        }
        if self.telemetry.baud_rate == 0 {
            bail!("telemetry.baud_rate must be greater than zero");
        }
        if self.telemetry.sentinel_timeout_ms == 0 {
            bail!("telemetry.sentinel_timeout_ms must be greater than zero");
        }
        if self.hmi.port.as_deref() == Some("") {
            bail!("hmi.port must not be empty when set");
        }
        if self.hmi.baud_rate == 0 {
            bail!("hmi.baud_rate must be greater than zero");
        }
        self.pusher_config().validate()?;
        Ok(())
    }

    /// Dispatcher timeouts for the telemetry link
    pub fn dispatcher_timeouts(&self) -> DispatcherTimeouts {
        DispatcherTimeouts {
            sentinel: Duration::from_millis(self.telemetry.sentinel_timeout_ms),
            telemetry_body: Duration::from_millis(self.telemetry.telemetry_body_timeout_ms),
            screen_body: Duration::from_millis(self.telemetry.screen_body_timeout_ms),
        }
    }

    /// Pusher timing for the HMI link
    pub fn pusher_config(&self) -> PusherConfig {
        PusherConfig {
            interval: Duration::from_millis(self.hmi.push_interval_ms),
            inbound_timeout: Duration::from_millis(self.hmi.inbound_timeout_ms),
        }
    }
}

/// Instrument link (also carries panel button frames)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryPortConfig {
    /// Serial device, e.g. /dev/ttyUSB0
    pub port: String,

    pub baud_rate: u32,

    /// Wait for each header byte
    pub sentinel_timeout_ms: u64,

    /// Wait for the rest of a telemetry frame
    pub telemetry_body_timeout_ms: u64,

    /// Wait for the rest of a panel frame
    pub screen_body_timeout_ms: u64,
}

impl Default for TelemetryPortConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 9600,
            sentinel_timeout_ms: 50,
            telemetry_body_timeout_ms: 100,
            screen_body_timeout_ms: 200,
        }
    }
}

/// Touch panel link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HmiPortConfig {
    /// Serial device; the bridge runs without a panel when the key is absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,

    pub baud_rate: u32,

    /// Sleep between push cycles
    pub push_interval_ms: u64,

    /// Wait for the rest of an inbound panel frame
    pub inbound_timeout_ms: u64,

    /// Distance shown after a start press
    pub distance: f32,

    /// Side length shown after a start press
    pub side_length: f32,
}

impl Default for HmiPortConfig {
    fn default() -> Self {
        Self {
            port: Some("/dev/ttyUSB1".to_string()),
            baud_rate: 9600,
            push_interval_ms: 50,
            inbound_timeout_ms: 100,
            distance: DEFAULT_DISTANCE,
            side_length: DEFAULT_SIDE_LENGTH,
        }
    }
}

/// Output options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Print every decoded frame as a JSON line on stdout
    pub live: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_roundtrip() {
        let mut original_config = BridgeConfig::new();
        original_config.hmi.port = None;
        original_config.output.live = true;

        let temp_file = NamedTempFile::new().unwrap();
        let temp_path = temp_file.path();

        original_config.save_to_file(temp_path).unwrap();
        let loaded_config = BridgeConfig::load_from_file(temp_path).unwrap();

        assert_eq!(original_config, loaded_config);
    }

    #[test]
    fn test_default_values() {
        let config = BridgeConfig::new();

        assert_eq!(config.telemetry.port, "/dev/ttyUSB0");
        assert_eq!(config.telemetry.baud_rate, 9600);
        assert_eq!(config.hmi.port.as_deref(), Some("/dev/ttyUSB1"));
        assert_eq!(config.hmi.push_interval_ms, 50);
        assert_eq!(config.hmi.distance, 5.0);
        assert!(!config.output.live);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let partial = r#"
[telemetry]
port = "/dev/ttyS3"
baud_rate = 115200
"#;
        let config: BridgeConfig = toml::from_str(partial).unwrap();
        assert_eq!(config.telemetry.port, "/dev/ttyS3");
        assert_eq!(config.telemetry.baud_rate, 115200);
        assert_eq!(config.telemetry.telemetry_body_timeout_ms, 100);
        assert_eq!(config.hmi, HmiPortConfig::default());
    }

    #[test]
    fn test_hmi_section_without_port_runs_blind() {
        let partial = r#"
[hmi]
baud_rate = 115200
"#;
        let config: BridgeConfig = toml::from_str(partial).unwrap();
        assert_eq!(config.hmi.port, None);
        assert_eq!(config.hmi.baud_rate, 115200);
        assert!(config.validate().is_ok());

        let saved = toml::to_string_pretty(&config).unwrap();
        let reloaded: BridgeConfig = toml::from_str(&saved).unwrap();
        assert_eq!(reloaded.hmi.port, None);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = BridgeConfig::load_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, BridgeConfig::new());
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = BridgeConfig::new();
        config.hmi.push_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = BridgeConfig::new();
        config.hmi.port = Some(String::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_timeouts_mapping() {
        let config = BridgeConfig::new();
        let timeouts = config.dispatcher_timeouts();
        assert_eq!(timeouts.sentinel, Duration::from_millis(50));
        assert_eq!(timeouts.screen_body, Duration::from_millis(200));
        assert_eq!(
            config.pusher_config().inbound_timeout,
            Duration::from_millis(100)
        );
    }
}
