//! Device Link - session with the ComputerController board
//!
//! Implements the line protocol: reset settling, the identity handshake,
//! duty dispatch and the safe-state reset.

use crate::serial_driver::LineTransport;
use ccfan_core::protocol::{duty_command, identity_confirmed, IDENTITY_QUERY, TERMINAL_MARKER};
use ccfan_core::{DefaultDevice, DeviceProfile, Duty, Endpoint, Result};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// Open session with the controlled device
///
/// Generic over the transport type, allowing real hardware (`SerialDriver`)
/// or mock transports for testing. Closing consumes the link, so a closed
/// session cannot be used again.
pub struct DeviceLink<T: LineTransport + ?Sized = dyn LineTransport> {
    transport: Box<T>,
    endpoint: Endpoint,
    identity_marker: &'static str,
}

impl<T: LineTransport + ?Sized> DeviceLink<T> {
    /// Wrap an open transport for the default device profile
    pub fn new(endpoint: Endpoint, transport: Box<T>) -> Self {
        Self::for_profile::<DefaultDevice>(endpoint, transport)
    }

    /// Wrap an open transport for a specific device profile
    pub fn for_profile<P: DeviceProfile>(endpoint: Endpoint, transport: Box<T>) -> Self {
        Self {
            transport,
            endpoint,
            identity_marker: P::IDENTITY_MARKER,
        }
    }

    /// Endpoint this session is bound to
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Wait out the reset the board performs when the port is opened.
    ///
    /// Opening the port toggles DTR, which reboots the ESP32. Anything it
    /// prints while booting is discarded so it cannot be mistaken for a
    /// protocol response.
    pub async fn settle_after_reset(&mut self, interval: Duration) -> Result<()> {
        debug!(
            "Waiting {:?} for device at {} to settle after reset",
            interval, self.endpoint
        );
        sleep(interval).await;

        self.transport.clear_input_buffer()?;
        self.transport.clear_output_buffer()
    }

    /// Ask the device who it is.
    ///
    /// Collects response lines until `OK` or the timeout, skipping empty
    /// lines, and succeeds iff the expected name appears anywhere in them.
    /// Transport failures are returned as errors, not as a failed proof.
    pub async fn verify_identity(&mut self, timeout: Duration) -> Result<bool> {
        self.transport.clear_input_buffer()?;
        self.transport.write_line(IDENTITY_QUERY).await?;

        let deadline = Instant::now() + timeout;
        let mut response: Vec<String> = Vec::new();

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            match self.transport.read_line(remaining).await? {
                None => break,
                Some(line) if line.is_empty() => continue,
                Some(line) => {
                    let terminal = line == TERMINAL_MARKER;
                    response.push(line);
                    if terminal {
                        break;
                    }
                }
            }
        }

        debug!("Identity response: {:?}", response);
        Ok(identity_confirmed(&response, self.identity_marker))
    }

    /// Send a duty command.
    ///
    /// The value is clamped to 0-100 before encoding. No acknowledgment is
    /// awaited. Returns the duty actually written.
    pub async fn send_duty(&mut self, percent: i64) -> Result<Duty> {
        let duty = Duty::clamped(percent);
        if i64::from(duty.percent()) != percent {
            debug!("Requested duty {} clamped to {}", percent, duty);
        }

        let command = duty_command(duty);
        debug!("Sending command: {}", command);
        self.transport.write_line(&command).await?;

        Ok(duty)
    }

    /// Force the fan to 0%. Best-effort: failures are logged.
    ///
    /// Returns whether the command was written.
    pub async fn reset_to_safe_state(&mut self) -> bool {
        match self.send_duty(0).await {
            Ok(_) => {
                info!("Fan reset to 0% on {}", self.endpoint);
                true
            }
            Err(e) => {
                warn!("Failed to reset fan on {}: {}", self.endpoint, e);
                false
            }
        }
    }

    /// Release the session. Best-effort: failures are logged.
    pub async fn close(mut self) {
        if let Err(e) = self.transport.close().await {
            warn!("Error while closing {}: {}", self.endpoint, e);
        }
        debug!("Closed session on {}", self.endpoint);
    }
}
