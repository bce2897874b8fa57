pub mod config;
pub mod mqtt;
pub mod power;

pub use config::{ConfigError, DispatcherConfig, Settings};
pub use mqtt::mqtt_handler::{MessagingSession, MqttSession, SessionError};
pub use power::{OnDuration, PowerDispatcher, PowerError};
