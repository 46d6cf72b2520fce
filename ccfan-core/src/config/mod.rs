//! Configuration types for ccfan
//!
//! A single [`StaticConfig`] TOML file, loaded once at startup. Every section
//! is optional; missing values fall back to the device profile defaults.
//! Command-line flags override what the file says.

mod paths;
mod static_config;

pub use paths::default_config_path;
pub use static_config::{ControlConfig, DeviceConfig, SensorConfig, StaticConfig};
