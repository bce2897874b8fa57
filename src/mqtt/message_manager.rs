use chrono::{DateTime, Local};
use rumqttc::QoS;
use std::fmt;

/// Payload of an outbound command
///
/// Tasmota parses numbers as integer-like text, so numbers are rendered without
/// a trailing `.0` and float noise past six decimals is dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    Number(f64),
}

impl Payload {
    /// Payload of the power-on command
    pub fn power_on() -> Self {
        Payload::Number(1.0)
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Text(text) => f.write_str(text),
            Payload::Number(n) => f.write_str(&format_number(*n)),
        }
    }
}

/// Integer-like rendering shared by payloads and log lines
pub(crate) fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        format!("{}", n as i64)
    } else {
        let s = format!("{:.6}", n);
        let s = s.trim_end_matches('0');
        let s = s.trim_end_matches('.');
        s.to_string()
    }
}

/// A message handed to the broker, kept for status reporting and tests
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: Payload,
    pub qos: QoS,
    pub timestamp: DateTime<Local>,
}

impl OutboundMessage {
    pub fn new(topic: &str, payload: Payload, qos: QoS) -> Self {
        OutboundMessage {
            topic: topic.to_string(),
            payload,
            qos,
            timestamp: Local::now(),
        }
    }

    pub fn render(&self) -> String {
        format!(
            "{}: {} <- '{}' ({:?})",
            self.timestamp.format("%H:%M:%S%.3f"),
            self.topic,
            self.payload,
            self.qos
        )
    }
}

#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

#[derive(Clone, Debug, Default)]
pub struct SessionStatus {
    pub connection_state: ConnectionState,
    pub error_messages: Vec<String>,
    pub messages_sent: usize,
    pub last_activity: Option<DateTime<Local>>,
}

impl SessionStatus {
    pub fn record_sent(&mut self, message: &OutboundMessage) {
        self.messages_sent += 1;
        self.last_activity = Some(message.timestamp);
    }

    pub fn record_error(&mut self, error: impl fmt::Display) {
        self.error_messages.push(error.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_render_integer_like() {
        assert_eq!(Payload::power_on().to_string(), "1");
        assert_eq!(Payload::Number(130.0).to_string(), "130");
        assert_eq!(Payload::Number(1.1 * 10.0).to_string(), "11");
        assert_eq!(Payload::Number(2.5).to_string(), "2.5");
    }

    #[test]
    fn text_is_sent_verbatim() {
        assert_eq!(Payload::Text("offline".into()).into_bytes(), b"offline".to_vec());
    }

    #[test]
    fn render_shows_topic_payload_and_qos() {
        let payload = Payload::Number(11.1 * 10.0);
        let msg = OutboundMessage::new("cmnd/a/PulseTime", payload, QoS::AtLeastOnce);
        let line = msg.render();
        assert!(line.ends_with("cmnd/a/PulseTime <- '111' (AtLeastOnce)"), "{line}");
    }

    #[test]
    fn status_counts_sent_messages() {
        let mut status = SessionStatus::default();
        let msg = OutboundMessage::new("cmnd/a/POWER", Payload::power_on(), QoS::AtLeastOnce);
        status.record_sent(&msg);
        status.record_sent(&msg);
        assert_eq!(status.messages_sent, 2);
        assert_eq!(status.last_activity, Some(msg.timestamp));
    }
}
