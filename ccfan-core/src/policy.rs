//! Temperature-to-duty speed policy
//!
//! Maps a sensor reading onto a duty cycle using the low/high thresholds.
//! Linear interpolation is used between them.

use crate::types::{Duty, ThresholdPair};

/// Compute the fan duty for a temperature reading.
///
/// - `reading <= low` → 0%
/// - `reading >= high` → 100%
/// - otherwise `100 * (reading - low) / (high - low)`, rounded half up
///
/// Integer arithmetic only, so the result is exact for every input.
pub fn speed_for(reading: i32, thresholds: &ThresholdPair) -> Duty {
    let (low, high) = (thresholds.low(), thresholds.high());

    if reading <= low {
        return Duty::OFF;
    }
    if reading >= high {
        return Duty::FULL;
    }

    let span = i64::from(high) - i64::from(low);
    let offset = i64::from(reading) - i64::from(low);
    // floor(x + 1/2) with x = 100 * offset / span
    let percent = (200 * offset + span) / (2 * span);

    Duty::clamped(percent)
}
