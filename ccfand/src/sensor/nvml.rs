//! NVIDIA GPU temperature via NVML

use super::SensorProvider;
use ccfan_core::{CcFanError, Result};
use nvml_wrapper::enum_wrappers::device::TemperatureSensor;
use nvml_wrapper::error::NvmlError;
use nvml_wrapper::Nvml;
use tracing::{info, warn};

/// GPU core temperature sensor
pub struct NvmlSensor {
    nvml: Option<Nvml>,
    index: u32,
    name: String,
}

impl NvmlSensor {
    /// Initialize NVML and bind to the GPU at `index`
    pub fn new(index: u32) -> Result<Self> {
        let nvml = Nvml::init().map_err(convert_error)?;

        let gpu_name = nvml
            .device_by_index(index)
            .and_then(|device| device.name())
            .map_err(convert_error)?;
        info!("Monitoring GPU {:02}: {}", index, gpu_name);

        Ok(Self {
            nvml: Some(nvml),
            index,
            name: format!("GPU {:02} ({})", index, gpu_name),
        })
    }
}

impl SensorProvider for NvmlSensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn temperature(&mut self) -> Result<i32> {
        let nvml = self
            .nvml
            .as_ref()
            .ok_or_else(|| CcFanError::Sensor("NVML has been shut down".to_string()))?;

        let celsius = nvml
            .device_by_index(self.index)
            .and_then(|device| device.temperature(TemperatureSensor::Gpu))
            .map_err(convert_error)?;

        i32::try_from(celsius)
            .map_err(|_| CcFanError::Sensor(format!("Implausible GPU temperature: {}", celsius)))
    }

    fn shutdown(&mut self) {
        if let Some(nvml) = self.nvml.take() {
            if let Err(e) = nvml.shutdown() {
                warn!("NVML shutdown failed: {}", e);
            }
        }
    }
}

impl Drop for NvmlSensor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Convert NVML error to our error type
fn convert_error(err: NvmlError) -> CcFanError {
    match err {
        NvmlError::LibloadingError(_) => CcFanError::Sensor(
            "NVML library not found. Is the NVIDIA driver installed?".to_string(),
        ),
        NvmlError::DriverNotLoaded => CcFanError::Sensor("NVIDIA driver not loaded".to_string()),
        NvmlError::NotFound => CcFanError::Sensor("GPU not found".to_string()),
        NvmlError::GpuLost => CcFanError::Sensor("GPU has fallen off the bus".to_string()),
        other => CcFanError::Sensor(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_error_is_sensor_error() {
        assert!(matches!(
            convert_error(NvmlError::DriverNotLoaded),
            CcFanError::Sensor(_)
        ));
        assert!(matches!(
            convert_error(NvmlError::GpuLost),
            CcFanError::Sensor(msg) if msg.contains("fallen off")
        ));
    }

    #[test]
    fn test_new_without_gpu_does_not_panic() {
        // Succeeds only on machines with an NVIDIA driver
        if let Ok(mut sensor) = NvmlSensor::new(0) {
            let _ = sensor.temperature();
            sensor.shutdown();
            assert!(sensor.temperature().is_err());
        }
    }
}
