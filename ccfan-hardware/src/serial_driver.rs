//! Serial driver for low-level hardware communication
//!
//! Provides async, line-oriented serial I/O with the controller board.

use async_trait::async_trait;
use ccfan_core::protocol::LINE_DELIMITER;
use ccfan_core::{CcFanError, Endpoint, Result};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::time::timeout;
use tokio_serial::{SerialPort, SerialPortBuilderExt, SerialStream};
use tracing::{debug, error, warn};

/// Trait for line transport abstraction
///
/// This trait enables testing of `DeviceLink` without real hardware
/// by allowing mock implementations.
#[async_trait]
pub trait LineTransport: Send {
    /// Write one line (delimiter appended) and flush
    async fn write_line(&mut self, line: &str) -> Result<()>;

    /// Read one trimmed line, waiting at most `wait`
    ///
    /// Returns `Ok(None)` when nothing complete arrived in time. Bytes of a
    /// partially received line are kept for the next call.
    async fn read_line(&mut self, wait: Duration) -> Result<Option<String>>;

    /// Discard everything received but not yet read
    fn clear_input_buffer(&mut self) -> Result<()>;

    /// Discard everything queued but not yet transmitted
    fn clear_output_buffer(&mut self) -> Result<()>;

    /// Flush and release the channel
    async fn close(&mut self) -> Result<()>;
}

/// Opens line transports to an endpoint
///
/// The control loop goes through this seam so tests can hand it an
/// in-memory transport.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, endpoint: &Endpoint) -> Result<Box<dyn LineTransport>>;
}

/// Serial driver for hardware communication
pub struct SerialDriver {
    reader: BufReader<SerialStream>,
    pending: Vec<u8>,
    timeout_duration: Duration,
}

impl SerialDriver {
    /// Open a serial session
    ///
    /// # Arguments
    /// * `endpoint` - Path to the serial device (e.g., "/dev/ttyUSB0")
    /// * `baud_rate` - Transfer rate agreed with the firmware
    /// * `read_timeout` - Timeout for read/write operations
    pub fn open(endpoint: &Endpoint, baud_rate: u32, read_timeout: Duration) -> Result<Self> {
        debug!("Opening serial port {} at {} baud", endpoint, baud_rate);

        let port = tokio_serial::new(endpoint.as_str(), baud_rate)
            .timeout(read_timeout)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| {
                error!("Failed to open serial port {}: {}", endpoint, e);
                CcFanError::Connection {
                    endpoint: endpoint.to_string(),
                    reason: e.to_string(),
                }
            })?;

        debug!("Serial port opened successfully");

        Ok(Self {
            reader: BufReader::new(port),
            pending: Vec::new(),
            timeout_duration: read_timeout,
        })
    }

    async fn flush(&mut self) -> Result<()> {
        timeout(self.timeout_duration, self.reader.get_mut().flush())
            .await
            .map_err(|_| CcFanError::Timeout("Flush operation timed out".to_string()))?
            .map_err(|e| CcFanError::Serial(format!("Flush failed: {}", e)))
    }
}

#[async_trait]
impl LineTransport for SerialDriver {
    async fn write_line(&mut self, line: &str) -> Result<()> {
        let full_line = format!("{}{}", line, LINE_DELIMITER);
        debug!("TX: {:?}", full_line);

        timeout(
            self.timeout_duration,
            self.reader.get_mut().write_all(full_line.as_bytes()),
        )
        .await
        .map_err(|_| {
            error!("Write timeout");
            CcFanError::Timeout("Write operation timed out".to_string())
        })?
        .map_err(|e| {
            error!("Write failed: {}", e);
            CcFanError::Serial(format!("Write failed: {}", e))
        })?;

        // Flush to ensure data is sent
        self.flush().await
    }

    async fn read_line(&mut self, wait: Duration) -> Result<Option<String>> {
        // read_until keeps partial bytes in `pending` if the timeout fires
        let result = timeout(wait, self.reader.read_until(b'\n', &mut self.pending)).await;
        match result {
            Err(_) => Ok(None),
            Ok(Ok(0)) => {
                // EOF indicates device disconnection (USB unplugged, power loss, etc.)
                warn!("Serial port returned EOF - device may have been disconnected");
                Err(CcFanError::DeviceDisconnected(
                    "Serial port returned EOF - device may have been unplugged".to_string(),
                ))
            }
            Ok(Ok(_)) => {
                let line = String::from_utf8_lossy(&self.pending).trim().to_string();
                self.pending.clear();
                debug!("RX: {:?}", line);
                Ok(Some(line))
            }
            Ok(Err(e)) => {
                error!("Read error: {}", e);
                Err(CcFanError::Serial(format!("Read error: {}", e)))
            }
        }
    }

    fn clear_input_buffer(&mut self) -> Result<()> {
        self.pending.clear();
        let buffered = self.reader.buffer().len();
        self.reader.consume(buffered);
        self.reader
            .get_mut()
            .clear(tokio_serial::ClearBuffer::Input)
            .map_err(|e| {
                warn!("Failed to clear input buffer: {}", e);
                CcFanError::Serial(format!("Failed to clear input buffer: {}", e))
            })
    }

    fn clear_output_buffer(&mut self) -> Result<()> {
        self.reader
            .get_mut()
            .clear(tokio_serial::ClearBuffer::Output)
            .map_err(|e| {
                warn!("Failed to clear output buffer: {}", e);
                CcFanError::Serial(format!("Failed to clear output buffer: {}", e))
            })
    }

    async fn close(&mut self) -> Result<()> {
        // The port itself is released when the driver is dropped
        self.flush().await
    }
}

/// Opens `SerialDriver` sessions with fixed link parameters
#[derive(Debug, Clone)]
pub struct SerialConnector {
    baud_rate: u32,
    read_timeout: Duration,
}

impl SerialConnector {
    pub fn new(baud_rate: u32, read_timeout: Duration) -> Self {
        Self {
            baud_rate,
            read_timeout,
        }
    }
}

#[async_trait]
impl Connector for SerialConnector {
    async fn open(&self, endpoint: &Endpoint) -> Result<Box<dyn LineTransport>> {
        let driver = SerialDriver::open(endpoint, self.baud_rate, self.read_timeout)?;
        Ok(Box::new(driver))
    }
}

/// Determine if an error indicates device disconnection
///
/// Returns `true` if the error suggests the device has been disconnected
/// (USB unplugged, power loss, etc.) rather than a transient error.
pub fn is_disconnect_error(err: &CcFanError) -> bool {
    match err {
        CcFanError::DeviceDisconnected(_) => true,
        CcFanError::Serial(msg) => {
            let msg_lower = msg.to_lowercase();
            msg_lower.contains("broken pipe")
                || msg_lower.contains("no such device")
                || msg_lower.contains("device disconnected")
                || msg_lower.contains("device not configured")
                || msg_lower.contains("input/output error")
        }
        CcFanError::Io(e) => matches!(
            e.kind(),
            std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::NotConnected
        ),
        // Timeouts are typically transient, not disconnection
        CcFanError::Timeout(_) => false,
        _ => false,
    }
}
