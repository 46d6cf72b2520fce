//! Core types and data structures for ccfan

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CcFanError, Result};

/// Addressable identifier of the serial channel to the controlled device
///
/// Usually a device path such as `/dev/ttyUSB0` or `COM3`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Endpoint(String);

impl Endpoint {
    /// Create a new endpoint
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Get the endpoint as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Endpoint {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Endpoint {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Fan duty cycle percentage, always within 0-100
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Duty(u8);

impl Duty {
    /// Fan stopped
    pub const OFF: Duty = Duty(0);

    /// Fan at full speed
    pub const FULL: Duty = Duty(100);

    /// Build a duty from an arbitrary integer, clamping into 0-100
    pub fn clamped(percent: i64) -> Self {
        Self(percent.clamp(0, 100) as u8)
    }

    /// Get the percentage value
    #[inline]
    pub const fn percent(&self) -> u8 {
        self.0
    }

    /// Absolute difference in percentage points
    pub fn abs_diff(&self, other: Duty) -> u8 {
        self.0.abs_diff(other.0)
    }
}

impl fmt::Display for Duty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// Low/high temperature thresholds in °C
///
/// Invariant: `low < high`. Below `low` the fan is off, above `high` it runs
/// at full speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawThresholds", into = "RawThresholds")]
pub struct ThresholdPair {
    low: i32,
    high: i32,
}

impl ThresholdPair {
    /// Default threshold to turn the fan off
    pub const DEFAULT_LOW: i32 = 70;

    /// Default threshold for full speed
    pub const DEFAULT_HIGH: i32 = 80;

    /// Create a validated threshold pair
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `low >= high`.
    pub fn new(low: i32, high: i32) -> Result<Self> {
        if low >= high {
            return Err(CcFanError::Config(format!(
                "low threshold ({}) must be lower than high threshold ({})",
                low, high
            )));
        }
        Ok(Self { low, high })
    }

    /// Lower threshold
    pub fn low(&self) -> i32 {
        self.low
    }

    /// Upper threshold
    pub fn high(&self) -> i32 {
        self.high
    }
}

impl Default for ThresholdPair {
    fn default() -> Self {
        Self {
            low: Self::DEFAULT_LOW,
            high: Self::DEFAULT_HIGH,
        }
    }
}

impl fmt::Display for ThresholdPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}°C..{}°C", self.low, self.high)
    }
}

/// Either bound may be omitted and falls back to its default
#[derive(Serialize, Deserialize)]
struct RawThresholds {
    #[serde(default = "default_low")]
    low: i32,
    #[serde(default = "default_high")]
    high: i32,
}

fn default_low() -> i32 {
    ThresholdPair::DEFAULT_LOW
}

fn default_high() -> i32 {
    ThresholdPair::DEFAULT_HIGH
}

impl TryFrom<RawThresholds> for ThresholdPair {
    type Error = CcFanError;

    fn try_from(raw: RawThresholds) -> Result<Self> {
        ThresholdPair::new(raw.low, raw.high)
    }
}

impl From<ThresholdPair> for RawThresholds {
    fn from(pair: ThresholdPair) -> Self {
        Self {
            low: pair.low,
            high: pair.high,
        }
    }
}
