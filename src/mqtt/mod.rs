//! # MQTT Session Module
//!
//! The messaging collaborator of the power command core. It owns the broker
//! connection for one dispatcher and exposes exactly what the core needs:
//! connect, publish, disconnect.
//!
//! ```text
//! mqtt/
//! ├── config.rs           - Broker address, client id, session options
//! ├── message_manager.rs  - Outbound payloads and session status
//! └── mqtt_handler.rs     - MessagingSession trait and the rumqttc session
//! ```
//!
//! ## Connection Behavior
//!
//! - Client ids are 10 random lowercase letters, one per process
//! - Sessions are persistent (`clean_session = false`)
//! - A last will of `offline` is registered on the configured topic so
//!   subscribers notice when the controller drops away
//! - After CONNACK the rumqttc event loop is polled in a background task that
//!   logs inbound messages and unexpected disconnects and lets rumqttc
//!   reconnect on its own
//!
//! Retry of failed publishes is not done here; a failed publish surfaces as
//! [`SessionError::Communication`](mqtt_handler::SessionError::Communication).

pub mod config;
pub mod message_manager;
pub mod mqtt_handler;
