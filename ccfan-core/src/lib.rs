//! ccfan Core Library
//!
//! Shared types, the speed policy, the wire protocol, and configuration for
//! the ComputerController GPU fan daemon. Used by both the hardware crate and
//! the daemon.

pub mod config;
pub mod device;
pub mod error;
pub mod policy;
pub mod protocol;
pub mod types;

// Re-export commonly used types
pub use config::{default_config_path, ControlConfig, DeviceConfig, SensorConfig, StaticConfig};
pub use device::*;
pub use error::*;
pub use policy::speed_for;
pub use types::*;
