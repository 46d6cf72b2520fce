//! Temperature sources
//!
//! The control loop reads the heat source through [`SensorProvider`] and
//! releases it through the same trait, whatever backs it.

mod nvml;
mod thermal_zone;

pub use nvml::NvmlSensor;
pub use thermal_zone::ThermalZoneSensor;

use ccfan_core::{Result, SensorConfig};

/// Temperature source driving the fan
pub trait SensorProvider: Send {
    /// Human-readable sensor name for logs
    fn name(&self) -> &str;

    /// Current temperature in °C
    fn temperature(&mut self) -> Result<i32>;

    /// Release the underlying handle; later reads fail
    fn shutdown(&mut self);
}

/// Build the sensor described by the configuration
pub fn open(config: &SensorConfig) -> Result<Box<dyn SensorProvider>> {
    match config {
        SensorConfig::Nvml { index } => Ok(Box::new(NvmlSensor::new(*index)?)),
        SensorConfig::ThermalZone { path } => Ok(Box::new(ThermalZoneSensor::new(path.clone())?)),
    }
}
