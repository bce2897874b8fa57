//! # Power Command Core
//!
//! Publishes bounded "switch on" commands to Tasmota power switches.
//!
//! ```text
//! seconds_on ──► duration (validate) ──► pulse_time (encode, derive topic)
//!                                              │
//!                  retrigger ──► dispatcher ───┴──► MessagingSession
//! ```
//!
//! - `duration`   - the two legal on-duration bands
//! - `pulse_time` - PulseTime encoding and `POWER` -> `PulseTime` topics
//! - `dispatcher` - per-device power-on / pulse-time publish pairs
//! - `retrigger`  - repeats the dispatcher on an interval until cancelled
//! - `error`      - error taxonomy shared by the above

pub mod dispatcher;
pub mod duration;
pub mod error;
pub mod pulse_time;
pub mod retrigger;

pub use dispatcher::PowerDispatcher;
pub use duration::OnDuration;
pub use error::{DispatchFailures, DurationError, MalformedTopicError, PowerError, TopicFailure};
pub use pulse_time::{encode, topic_for_pulsetime, DeviceTopicSet, PowerCommandTopic, PulseTimeValue};
