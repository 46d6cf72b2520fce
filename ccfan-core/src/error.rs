//! Error types for the ccfan system

use thiserror::Error;

/// Core error type for ccfan operations
#[derive(Error, Debug)]
pub enum CcFanError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serial port errors
    #[error("Serial port error: {0}")]
    Serial(String),

    /// Timeout errors
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// No serial endpoint could be discovered
    #[error("Device not found (specify the serial port explicitly)")]
    DeviceNotFound,

    /// The endpoint exists but a session could not be opened or kept alive
    #[error("Connection to {endpoint} failed: {reason}")]
    Connection { endpoint: String, reason: String },

    /// A session is open but the peer did not identify as the expected device
    #[error("Device at {endpoint} did not identify as {expected}")]
    IdentityMismatch { endpoint: String, expected: String },

    /// Sensor read failed
    #[error("Sensor error: {0}")]
    Sensor(String),

    /// Device disconnected (USB unplugged, power cycle)
    #[error("Device disconnected: {0}")]
    DeviceDisconnected(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for ccfan operations
pub type Result<T> = std::result::Result<T, CcFanError>;

impl From<toml::de::Error> for CcFanError {
    fn from(err: toml::de::Error) -> Self {
        CcFanError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_error_conversion() {
        let toml_err = toml::from_str::<toml::Value>("not = = toml").unwrap_err();
        let err: CcFanError = toml_err.into();

        match err {
            CcFanError::Config(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected Config error"),
        }
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: CcFanError = io_err.into();

        match err {
            CcFanError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_error_display() {
        let err = CcFanError::DeviceNotFound;
        assert_eq!(
            format!("{}", err),
            "Device not found (specify the serial port explicitly)"
        );

        let err = CcFanError::Connection {
            endpoint: "/dev/ttyUSB0".to_string(),
            reason: "Permission denied".to_string(),
        };
        assert_eq!(
            format!("{}", err),
            "Connection to /dev/ttyUSB0 failed: Permission denied"
        );

        let err = CcFanError::IdentityMismatch {
            endpoint: "/dev/ttyACM0".to_string(),
            expected: "ComputerController".to_string(),
        };
        assert_eq!(
            format!("{}", err),
            "Device at /dev/ttyACM0 did not identify as ComputerController"
        );
    }
}
