//! Linux sysfs thermal zone sensor

use super::SensorProvider;
use ccfan_core::{CcFanError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Reads a `thermal_zone*/temp` style file (millidegrees Celsius)
pub struct ThermalZoneSensor {
    path: PathBuf,
    name: String,
    open: bool,
}

impl ThermalZoneSensor {
    /// Bind to a thermal zone file, checking it can be read now
    pub fn new(path: PathBuf) -> Result<Self> {
        let initial = read_celsius(&path)?;
        info!("Monitoring {} (currently {} °C)", path.display(), initial);

        Ok(Self {
            name: path.display().to_string(),
            path,
            open: true,
        })
    }
}

impl SensorProvider for ThermalZoneSensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn temperature(&mut self) -> Result<i32> {
        if !self.open {
            return Err(CcFanError::Sensor(format!("{} has been shut down", self.name)));
        }
        read_celsius(&self.path)
    }

    fn shutdown(&mut self) {
        self.open = false;
    }
}

fn read_celsius(path: &Path) -> Result<i32> {
    let content = fs::read_to_string(path)
        .map_err(|e| CcFanError::Sensor(format!("Failed to read {}: {}", path.display(), e)))?;
    parse_millidegrees(&content)
}

/// Parse millidegrees into whole degrees, rounding half away from zero
pub fn parse_millidegrees(content: &str) -> Result<i32> {
    let milli: i64 = content
        .trim()
        .parse()
        .map_err(|e| CcFanError::Sensor(format!("Invalid temperature '{}': {}", content.trim(), e)))?;

    let rounded = if milli >= 0 {
        (milli + 500) / 1000
    } else {
        (milli - 500) / 1000
    };
    i32::try_from(rounded)
        .map_err(|_| CcFanError::Sensor(format!("Implausible temperature: {}", milli)))
}
