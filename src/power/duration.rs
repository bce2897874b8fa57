//! On-duration validation
//!
//! Tasmota's `PulseTime` accepts two disjoint bands: 0.1 s resolution from
//! 0.1 to 11.1 seconds and 1 s resolution from 12 to 64800 seconds. Anything
//! in between or outside is rejected here, before a single message is sent.

use std::fmt;
use std::str::FromStr;

use super::error::DurationError;

/// Shortest on-duration (first step of the tenths band)
pub const MIN_SECONDS: f64 = 0.1;
/// Last value of the 0.1 s resolution band
pub const TENTHS_BAND_END: f64 = 11.1;
/// First value of the 1 s resolution band
pub const SECONDS_BAND_START: f64 = 12.0;
/// Longest on-duration (18 hours)
pub const MAX_SECONDS: f64 = 64800.0;

/// A requested on-duration in seconds that lies inside one of the two legal bands
///
/// Constructed fresh for every call; the dispatcher never stores it.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct OnDuration(f64);

impl OnDuration {
    /// Validates `seconds` against the legal bands
    pub fn new(seconds: f64) -> Result<Self, DurationError> {
        if !seconds.is_finite() {
            return Err(DurationError::TypeKind {
                input: seconds.to_string(),
            });
        }

        let in_tenths_band = (MIN_SECONDS..=TENTHS_BAND_END).contains(&seconds);
        let in_seconds_band = (SECONDS_BAND_START..=MAX_SECONDS).contains(&seconds);

        if in_tenths_band || in_seconds_band {
            Ok(Self(seconds))
        } else {
            Err(DurationError::Range { value: seconds })
        }
    }

    pub fn seconds(self) -> f64 {
        self.0
    }
}

impl FromStr for OnDuration {
    type Err = DurationError;

    /// Parses text input (CLI, settings) and validates it
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let seconds: f64 = s.trim().parse().map_err(|_| DurationError::TypeKind {
            input: s.to_string(),
        })?;
        Self::new(seconds)
    }
}

impl TryFrom<f64> for OnDuration {
    type Error = DurationError;

    fn try_from(seconds: f64) -> Result<Self, Self::Error> {
        Self::new(seconds)
    }
}

impl fmt::Display for OnDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}
