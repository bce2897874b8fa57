#![allow(dead_code)]

use std::collections::HashSet;
use std::io;

use powerbuddy::config::DispatcherConfig;
use powerbuddy::mqtt::message_manager::Payload;
use powerbuddy::mqtt::mqtt_handler::{MessagingSession, SessionError};
use rumqttc::QoS;
use tokio_util::sync::CancellationToken;

/// In-memory session that records every publish attempt
#[derive(Default)]
pub struct RecordingSession {
    connected: bool,
    pub published: Vec<(String, String, QoS)>,
    pub attempts: usize,
    fail_topics: HashSet<String>,
    cancel_after: Option<(usize, CancellationToken)>,
}

impl RecordingSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every publish to `topic` fails with a communication error
    pub fn failing_on(mut self, topic: &str) -> Self {
        self.fail_topics.insert(topic.to_string());
        self
    }

    /// Cancels `token` once `attempts` publishes have been attempted
    pub fn cancel_after(mut self, attempts: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((attempts, token));
        self
    }

    pub fn topics(&self) -> Vec<&str> {
        self.published.iter().map(|(t, _, _)| t.as_str()).collect()
    }

    pub fn payload_for(&self, topic: &str) -> Option<&str> {
        self.published
            .iter()
            .find(|(t, _, _)| t == topic)
            .map(|(_, p, _)| p.as_str())
    }
}

impl MessagingSession for RecordingSession {
    async fn connect(&mut self) -> Result<(), SessionError> {
        self.connected = true;
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: Payload, qos: QoS) -> Result<(), SessionError> {
        if !self.connected {
            return Err(SessionError::NotConnected);
        }
        self.attempts += 1;
        if let Some((limit, token)) = &self.cancel_after {
            if self.attempts >= *limit {
                token.cancel();
            }
        }
        if self.fail_topics.contains(topic) {
            return Err(SessionError::communication(
                topic,
                io::Error::new(io::ErrorKind::BrokenPipe, "broker went away"),
            ));
        }
        self.published
            .push((topic.to_string(), payload.to_string(), qos));
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), SessionError> {
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

pub fn config(topics: &[&str]) -> DispatcherConfig {
    DispatcherConfig {
        broker_address: "127.0.0.1:1883".to_string(),
        device_topics: topics.iter().map(|t| t.to_string()).collect(),
        qos: 1,
    }
}
