//! Configuration management module
//!
//! Loads the TOML configuration file and layers command-line overrides on
//! top of it.

use ccfan_core::{CcFanError, Result, SensorConfig, StaticConfig, ThresholdPair};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Values given on the command line; `None` keeps the file's value
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub high: Option<i32>,
    pub low: Option<i32>,
    pub port: Option<String>,
    pub gpu_index: Option<u32>,
    pub thermal_zone: Option<PathBuf>,
}

/// Load configuration from file
///
/// A missing file is not an error; defaults are used instead.
pub fn load(path: &Path) -> Result<StaticConfig> {
    debug!("Loading configuration from: {}", path.display());

    let (config, found) = StaticConfig::load_or_default(path)?;
    if found {
        info!("Configuration loaded from {}", path.display());
    } else {
        info!(
            "Configuration file not found: {}. Using defaults.",
            path.display()
        );
    }
    Ok(config)
}

/// Apply command-line overrides
///
/// # Errors
///
/// Returns a configuration error when the resulting thresholds are not
/// `low < high`.
pub fn apply_overrides(mut config: StaticConfig, overrides: &CliOverrides) -> Result<StaticConfig> {
    let low = overrides.low.unwrap_or(config.thresholds.low());
    let high = overrides.high.unwrap_or(config.thresholds.high());
    config.thresholds = ThresholdPair::new(low, high)
        .map_err(|_| CcFanError::Config("--low must be lower than --high".to_string()))?;

    if let Some(port) = &overrides.port {
        config.device.port = Some(port.clone());
    }

    // An explicit thermal zone wins over a GPU index
    if let Some(path) = &overrides.thermal_zone {
        config.sensor = SensorConfig::ThermalZone { path: path.clone() };
    } else if let Some(index) = overrides.gpu_index {
        config.sensor = SensorConfig::Nvml { index };
    }

    Ok(config)
}
