//! Pulse-time encoding for Tasmota power switches
//!
//! Tasmota turns a relay off by itself after `PulseTime` has elapsed. The value
//! uses two bands:
//!
//! ```text
//! PulseTime 1..=111      -> value * 0.1 s    (0.1 .. 11.1 s)
//! PulseTime 112..=64900  -> value - 100 s    (12 .. 64800 s)
//! ```
//!
//! There is no encoding for 11.1 < t < 12, and the jump from 111 to 112 is
//! part of the firmware protocol. Both are kept as is.

use std::fmt;

use crate::mqtt::message_manager::format_number;

use super::duration::{OnDuration, SECONDS_BAND_START};
use super::error::MalformedTopicError;

pub const TOPIC_DELIMITER: char = '/';
/// Final segment of a power command topic, matched case-sensitively
pub const POWER_KEYWORD: &str = "POWER";
/// Final segment of the companion pulse-time topic
pub const PULSE_TIME_KEYWORD: &str = "PulseTime";

const SECONDS_BAND_OFFSET: f64 = 100.0;
const TENTHS_PER_SECOND: f64 = 10.0;

/// Device encoding of an on-duration; always derived, never stored
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct PulseTimeValue(f64);

impl PulseTimeValue {
    pub fn value(self) -> f64 {
        self.0
    }
}

impl fmt::Display for PulseTimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_number(self.0))
    }
}

/// Maps an on-duration onto the device's two-band pulse-time encoding
///
/// Exactly 12 s already belongs to the `+100` band.
pub fn encode(duration: OnDuration) -> PulseTimeValue {
    let seconds = duration.seconds();
    if seconds >= SECONDS_BAND_START {
        PulseTimeValue(seconds + SECONDS_BAND_OFFSET)
    } else {
        PulseTimeValue(seconds * TENTHS_PER_SECOND)
    }
}

/// Derives the pulse-time topic that belongs to a power command topic
///
/// `cmnd/tent1/POWER` becomes `cmnd/tent1/PulseTime`; every other segment is
/// kept verbatim and in order.
pub fn topic_for_pulsetime(power_topic: &str) -> Result<String, MalformedTopicError> {
    let topic = PowerCommandTopic::parse(power_topic)?;
    Ok(topic.pulse_time_topic().to_string())
}

/// A validated `<prefix>/.../POWER` topic together with its pulse-time companion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowerCommandTopic {
    power: String,
    pulse_time: String,
}

impl PowerCommandTopic {
    pub fn parse(topic: &str) -> Result<Self, MalformedTopicError> {
        let malformed = |reason| MalformedTopicError {
            topic: topic.to_string(),
            reason,
        };

        if topic.contains(['+', '#']) {
            return Err(malformed("wildcards are not allowed in a publish topic"));
        }

        let mut segments: Vec<&str> = topic.split(TOPIC_DELIMITER).collect();
        if segments.len() < 2 {
            return Err(malformed("expected at least two '/'-separated segments"));
        }
        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(malformed("empty topic segment"));
        }

        match segments.last_mut() {
            Some(last) if *last == POWER_KEYWORD => *last = PULSE_TIME_KEYWORD,
            _ => return Err(malformed("last segment must be 'POWER'")),
        }

        let delimiter = TOPIC_DELIMITER.to_string();
        Ok(Self {
            power: topic.to_string(),
            pulse_time: segments.join(&delimiter),
        })
    }

    pub fn power_topic(&self) -> &str {
        &self.power
    }

    pub fn pulse_time_topic(&self) -> &str {
        &self.pulse_time
    }
}

impl fmt::Display for PowerCommandTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.power)
    }
}

/// Ordered device topics; duplicates are kept and published twice
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceTopicSet(Vec<PowerCommandTopic>);

impl DeviceTopicSet {
    /// Parses every topic, failing on the first malformed one
    pub fn parse<I, T>(topics: I) -> Result<Self, MalformedTopicError>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        topics
            .into_iter()
            .map(|topic| PowerCommandTopic::parse(topic.as_ref()))
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PowerCommandTopic> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a DeviceTopicSet {
    type Item = &'a PowerCommandTopic;
    type IntoIter = std::slice::Iter<'a, PowerCommandTopic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(seconds: f64) -> f64 {
        encode(OnDuration::new(seconds).unwrap()).value()
    }

    #[test]
    fn tenths_band_multiplies_by_ten() {
        for seconds in [0.1, 0.5, 3.0, 5.0, 11.1] {
            assert_eq!(encoded(seconds), seconds * 10.0);
        }
        assert_eq!(encoded(5.0), 50.0);
    }

    #[test]
    fn seconds_band_adds_one_hundred() {
        for seconds in [12.0, 30.0, 600.0, 64800.0] {
            assert_eq!(encoded(seconds), seconds + 100.0);
        }
        assert_eq!(encoded(30.0), 130.0);
    }

    #[test]
    fn keeps_the_discontinuity_between_bands() {
        assert_eq!(encoded(11.1).round(), 111.0);
        assert_eq!(encoded(12.0), 112.0);
    }

    #[test]
    fn displays_like_the_published_payload() {
        let value = encode(OnDuration::new(11.1).unwrap());
        assert_eq!(value.to_string(), "111");
        assert_eq!(encode(OnDuration::new(0.5).unwrap()).to_string(), "5");
        assert_eq!(encode(OnDuration::new(30.0).unwrap()).to_string(), "130");
    }

    #[test]
    fn derives_pulse_time_topic() {
        assert_eq!(
            topic_for_pulsetime("cmnd/tent1/POWER").as_deref(),
            Ok("cmnd/tent1/PulseTime")
        );
        assert_eq!(
            topic_for_pulsetime("home/Grow Room/mist/POWER").as_deref(),
            Ok("home/Grow Room/mist/PulseTime")
        );
    }

    #[test]
    fn rejects_malformed_topics() {
        for topic in [
            "bad-topic-no-slash",
            "",
            "cmnd/tent1/power",
            "cmnd/tent1/POWER/",
            "cmnd//POWER",
            "cmnd/+/POWER",
            "cmnd/tent1/PulseTime",
        ] {
            let err = topic_for_pulsetime(topic).unwrap_err();
            assert_eq!(err.topic, topic);
        }
    }

    #[test]
    fn topic_set_preserves_order_and_duplicates() {
        let set = DeviceTopicSet::parse(["cmnd/b/POWER", "cmnd/a/POWER", "cmnd/b/POWER"]).unwrap();
        let topics: Vec<&str> = set.iter().map(PowerCommandTopic::power_topic).collect();
        assert_eq!(topics, ["cmnd/b/POWER", "cmnd/a/POWER", "cmnd/b/POWER"]);
    }

    #[test]
    fn topic_set_fails_on_first_malformed_topic() {
        let err = DeviceTopicSet::parse(vec!["cmnd/a/POWER".to_string(), "nope".to_string()])
            .unwrap_err();
        assert_eq!(err.topic, "nope");
    }
}
