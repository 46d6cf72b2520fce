//! Device profile definitions
//!
//! Each controller firmware the daemon can drive implements the
//! `DeviceProfile` trait with its identification and link parameters. All of
//! it is resolved at compile time; actual serial I/O lives in the
//! `ccfan-hardware` crate.

/// USB vendor/product pair used to recognise a serial bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UsbSignature {
    /// USB Vendor ID
    pub vid: u16,
    /// USB Product ID
    pub pid: u16,
}

impl UsbSignature {
    /// Create a new signature
    pub const fn new(vid: u16, pid: u16) -> Self {
        Self { vid, pid }
    }

    /// Check whether a discovered port's identifiers match this signature
    pub fn matches(&self, vid: u16, pid: u16) -> bool {
        self.vid == vid && self.pid == pid
    }
}

impl std::fmt::Display for UsbSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04X}:{:04X}", self.vid, self.pid)
    }
}

/// Controlled device profile trait
///
/// # Example
///
/// ```
/// use ccfan_core::device::{ComputerController, DeviceProfile};
///
/// const BAUD: u32 = ComputerController::BAUD_RATE;
/// const NAME: &str = ComputerController::NAME;
/// ```
pub trait DeviceProfile: Send + Sync + 'static {
    /// Human-readable device name
    const NAME: &'static str;

    /// Substring the device reports in its identity response
    const IDENTITY_MARKER: &'static str;

    /// USB bridges the device is known to sit behind
    const USB_SIGNATURES: &'static [UsbSignature];

    /// Serial port name fragments accepted when no signature matches
    const PORT_NAME_PATTERNS: &'static [&'static str];

    /// Serial communication baud rate (agreed with the firmware)
    const BAUD_RATE: u32;

    /// Default read/write timeout in milliseconds
    const DEFAULT_TIMEOUT_MS: u64;

    /// Time the device needs after the port is opened (reset-on-open)
    const SETTLE_MS: u64;

    /// How long to collect the identity response
    const IDENTITY_TIMEOUT_MS: u64;
}

/// ComputerController ESP32 firmware
///
/// - USB-UART bridges: CP210x (10C4:EA60), CH340 (1A86:7523),
///   ESP32-S3 native USB (303A:1001)
/// - 115200 baud, resets when DTR toggles on open
pub struct ComputerController;

impl DeviceProfile for ComputerController {
    const NAME: &'static str = "ComputerController";
    const IDENTITY_MARKER: &'static str = "ComputerController";
    const USB_SIGNATURES: &'static [UsbSignature] = &[
        UsbSignature::new(0x10C4, 0xEA60),
        UsbSignature::new(0x1A86, 0x7523),
        UsbSignature::new(0x303A, 0x1001),
    ];
    const PORT_NAME_PATTERNS: &'static [&'static str] = &["ttyUSB", "ttyACM"];
    const BAUD_RATE: u32 = 115200;
    const DEFAULT_TIMEOUT_MS: u64 = 1000;
    const SETTLE_MS: u64 = 2000;
    const IDENTITY_TIMEOUT_MS: u64 = 2000;
}

/// Default device profile used throughout the codebase
pub type DefaultDevice = ComputerController;
