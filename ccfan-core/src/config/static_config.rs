//! Static configuration loaded once at startup
//!
//! This configuration is read-only after the daemon starts.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::device::{DefaultDevice, DeviceProfile};
use crate::error::{CcFanError, Result};
use crate::types::ThresholdPair;

/// Serial link configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Explicit serial port; auto-detected when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    /// Baud rate agreed with the firmware
    pub baud_rate: u32,
    /// Read/write timeout in milliseconds
    pub read_timeout_ms: u64,
    /// Wait after opening the port before talking to the device
    pub settle_ms: u64,
    /// How long to collect the identity response
    pub identity_timeout_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: DefaultDevice::BAUD_RATE,
            read_timeout_ms: DefaultDevice::DEFAULT_TIMEOUT_MS,
            settle_ms: DefaultDevice::SETTLE_MS,
            identity_timeout_ms: DefaultDevice::IDENTITY_TIMEOUT_MS,
        }
    }
}

impl DeviceConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn settle_interval(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn identity_timeout(&self) -> Duration {
        Duration::from_millis(self.identity_timeout_ms)
    }
}

/// Control loop timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Sampling period in milliseconds
    pub tick_ms: u64,
    /// Minimum duty change, in percentage points, before a new command is sent
    pub deadband: u8,
}

impl ControlConfig {
    /// Default sampling period
    pub const DEFAULT_TICK_MS: u64 = 1000;

    /// Default deadband; absorbs ±1 °C sensor jitter
    pub const DEFAULT_DEADBAND: u8 = 2;

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            tick_ms: Self::DEFAULT_TICK_MS,
            deadband: Self::DEFAULT_DEADBAND,
        }
    }
}

/// Temperature source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SensorConfig {
    /// NVIDIA GPU core temperature via NVML
    Nvml {
        /// GPU index as enumerated by the driver
        #[serde(default)]
        index: u32,
    },
    /// Linux thermal zone file reporting millidegrees Celsius
    ThermalZone { path: PathBuf },
}

impl Default for SensorConfig {
    fn default() -> Self {
        SensorConfig::Nvml { index: 0 }
    }
}

/// Static configuration for the ccfan daemon.
///
/// Located at `~/.config/ccfan/config.toml` by default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticConfig {
    /// Fan off / full speed temperatures
    #[serde(default)]
    pub thresholds: ThresholdPair,

    /// Serial link settings
    #[serde(default)]
    pub device: DeviceConfig,

    /// Control loop timing
    #[serde(default)]
    pub control: ControlConfig,

    /// Temperature source
    #[serde(default)]
    pub sensor: SensorConfig,
}

impl StaticConfig {
    /// Parse StaticConfig from TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize StaticConfig to TOML string.
    pub fn to_toml(&self) -> std::result::Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Load from a file, falling back to defaults when the file is absent.
    ///
    /// Returns the configuration and whether the file existed.
    pub fn load_or_default(path: &Path) -> Result<(Self, bool)> {
        if !path.exists() {
            return Ok((Self::default(), false));
        }
        let content = std::fs::read_to_string(path)?;
        Ok((Self::from_toml(&content)?, true))
    }

    /// Check values that serde cannot check on its own.
    pub fn validate(&self) -> Result<()> {
        if self.control.tick_ms == 0 {
            return Err(CcFanError::Config("control.tick_ms must be positive".into()));
        }
        if self.control.deadband > 100 {
            return Err(CcFanError::Config(format!(
                "control.deadband must be 0-100, got {}",
                self.control.deadband
            )));
        }
        if self.device.baud_rate == 0 {
            return Err(CcFanError::Config("device.baud_rate must be positive".into()));
        }
        Ok(())
    }
}
