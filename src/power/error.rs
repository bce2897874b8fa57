//! Error definitions for the power command core

use std::fmt;

use thiserror::Error;

use crate::mqtt::mqtt_handler::SessionError;

use super::duration::{MAX_SECONDS, MIN_SECONDS, SECONDS_BAND_START, TENTHS_BAND_END};

/// Rejections produced while validating a requested on-duration
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DurationError {
    /// The input was not a finite number (NaN, infinity or unparsable text)
    #[error("duration must be a finite number of seconds, got '{input}'")]
    TypeKind { input: String },

    /// The number falls outside both legal bands
    #[error(
        "duration {value}s is outside the legal bands {}..={}s (0.1 s steps) and {}..={}s (1 s steps)",
        MIN_SECONDS, TENTHS_BAND_END, SECONDS_BAND_START, MAX_SECONDS
    )]
    Range { value: f64 },
}

/// A configured topic that does not have the `<prefix>/.../POWER` shape
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed power command topic '{topic}': {reason}")]
pub struct MalformedTopicError {
    pub topic: String,
    pub reason: &'static str,
}

/// Which of the two publishes for a device topic failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStage {
    PowerOn,
    PulseTime,
}

impl fmt::Display for PublishStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishStage::PowerOn => write!(f, "power-on"),
            PublishStage::PulseTime => write!(f, "pulse-time"),
        }
    }
}

/// Failure of one device topic during a `power_on` pass
///
/// Carries the topic pair and duration captured at the point of failure so the
/// aggregate report never depends on loop state.
#[derive(Debug, Error)]
#[error("{stage} publish for '{power_topic}' (pulse topic '{pulse_topic}', {seconds_on}s) failed: {source}")]
pub struct TopicFailure {
    pub power_topic: String,
    pub pulse_topic: String,
    pub seconds_on: f64,
    pub stage: PublishStage,
    #[source]
    pub source: SessionError,
}

/// Aggregate of every device topic that failed in a single pass
#[derive(Debug)]
pub struct DispatchFailures {
    pub attempted: usize,
    pub failures: Vec<TopicFailure>,
}

impl DispatchFailures {
    pub fn failed_topics(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().map(|f| f.power_topic.as_str())
    }
}

impl fmt::Display for DispatchFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} device topics failed",
            self.failures.len(),
            self.attempted
        )?;
        for failure in &self.failures {
            write!(f, "; {}", failure)?;
        }
        Ok(())
    }
}

impl std::error::Error for DispatchFailures {}

/// Errors returned by [`PowerDispatcher::power_on`](super::dispatcher::PowerDispatcher::power_on)
#[derive(Debug, Error)]
pub enum PowerError {
    /// Rejected before anything was published
    #[error("invalid duration: {0}")]
    InvalidDuration(#[from] DurationError),

    /// `power_on` was called before `start` (or after `stop`)
    #[error("dispatcher for broker {broker} is not connected, call start() first")]
    NotConnected { broker: String },

    /// At least one device topic failed; the others were still attempted
    #[error(transparent)]
    Dispatch(#[from] DispatchFailures),
}
