//! ccfan-hardware
//!
//! Hardware crate that contains the serial driver, endpoint discovery, and
//! the device link speaking the ComputerController line protocol. Used by
//! the daemon to drive the board.
//
//! Public API:
//! - `device_link::DeviceLink`: settle, identity handshake and duty dispatch
//! - `serial_driver::SerialDriver`: low-level serial line I/O
//! - `locator::find_device`: helper to locate the board by VID/PID or port name

pub mod device_link;
pub mod locator;
pub mod serial_driver;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use device_link::DeviceLink;
pub use locator::{find_device, select_endpoint, DeviceLocator, PortCandidate, UsbSerialLocator};
pub use serial_driver::{
    is_disconnect_error, Connector, LineTransport, SerialConnector, SerialDriver,
};
