//! Serial endpoint discovery
//!
//! Finds the port the controller board sits on. A USB VID/PID match wins;
//! failing that, the first port whose name looks like a USB serial adapter
//! is used.

use ccfan_core::{DefaultDevice, DeviceProfile, Endpoint, UsbSignature};
use std::marker::PhantomData;
use tokio_serial::{SerialPortInfo, SerialPortType};
use tracing::{debug, warn};

/// Source of the endpoint to connect to
pub trait DeviceLocator: Send + Sync {
    /// Return the endpoint to use, or `None` when nothing suitable exists
    fn locate(&self) -> Option<Endpoint>;
}

/// Port summary used for selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortCandidate {
    /// OS port name (e.g. `/dev/ttyUSB0`, `COM3`)
    pub name: String,
    /// USB VID/PID, when the port is a USB device
    pub usb: Option<(u16, u16)>,
}

impl PortCandidate {
    pub fn new(name: impl Into<String>, usb: Option<(u16, u16)>) -> Self {
        Self {
            name: name.into(),
            usb,
        }
    }
}

impl From<&SerialPortInfo> for PortCandidate {
    fn from(info: &SerialPortInfo) -> Self {
        let usb = match &info.port_type {
            SerialPortType::UsbPort(usb) => Some((usb.vid, usb.pid)),
            _ => None,
        };
        Self::new(info.port_name.clone(), usb)
    }
}

/// Pick an endpoint from the enumerated ports.
///
/// Signature matches take priority over name matches; within each pass the
/// enumeration order decides.
pub fn select_endpoint(
    ports: &[PortCandidate],
    signatures: &[UsbSignature],
    name_patterns: &[&str],
) -> Option<Endpoint> {
    let by_signature = ports.iter().find(|port| match port.usb {
        Some((vid, pid)) => signatures.iter().any(|sig| sig.matches(vid, pid)),
        None => false,
    });
    if let Some(port) = by_signature {
        debug!("Matched USB signature at: {}", port.name);
        return Some(Endpoint::new(port.name.clone()));
    }

    let by_name = ports
        .iter()
        .find(|port| name_patterns.iter().any(|p| port.name.contains(p)));
    if let Some(port) = by_name {
        debug!("Matched port name pattern at: {}", port.name);
        return Some(Endpoint::new(port.name.clone()));
    }

    None
}

/// Find the device for the given profile among the system's serial ports
pub fn find_device<P: DeviceProfile>() -> Option<Endpoint> {
    debug!("Searching for {} serial port", P::NAME);

    let ports = match tokio_serial::available_ports() {
        Ok(ports) => ports,
        Err(e) => {
            warn!("Failed to enumerate serial ports: {}", e);
            return None;
        }
    };

    let candidates: Vec<PortCandidate> = ports.iter().map(PortCandidate::from).collect();
    for candidate in &candidates {
        match candidate.usb {
            Some((vid, pid)) => debug!(
                "Checking port: {} (VID:{:04X} PID:{:04X})",
                candidate.name, vid, pid
            ),
            None => debug!("Checking port: {}", candidate.name),
        }
    }

    let found = select_endpoint(&candidates, P::USB_SIGNATURES, P::PORT_NAME_PATTERNS);
    if found.is_none() {
        debug!("{} not found", P::NAME);
    }
    found
}

/// Locator backed by the operating system's serial port list
pub struct UsbSerialLocator<P: DeviceProfile = DefaultDevice> {
    _profile: PhantomData<P>,
}

impl<P: DeviceProfile> UsbSerialLocator<P> {
    pub fn new() -> Self {
        Self {
            _profile: PhantomData,
        }
    }
}

impl<P: DeviceProfile> Default for UsbSerialLocator<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: DeviceProfile> DeviceLocator for UsbSerialLocator<P> {
    fn locate(&self) -> Option<Endpoint> {
        find_device::<P>()
    }
}
