use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use rand::Rng;
use rumqttc::QoS;

use crate::config::{BrokerSettings, ConfigError};

pub const DEFAULT_PORT: u16 = 1883;
pub const CLIENT_ID_LEN: usize = 10;

/// `host[:port]` of the broker, port defaulting to 1883
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
}

impl FromStr for BrokerAddress {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (host, port) = match s.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|e| format!("invalid port '{}': {}", port, e))?;
                (host, port)
            }
            None => (s, DEFAULT_PORT),
        };

        if host.is_empty() {
            return Err("broker host is empty".to_string());
        }

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for BrokerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Maps the numeric QoS level used in settings onto rumqttc's enum
pub fn qos_from_level(level: u8) -> Option<QoS> {
    match level {
        0 => Some(QoS::AtMostOnce),
        1 => Some(QoS::AtLeastOnce),
        2 => Some(QoS::ExactlyOnce),
        _ => None,
    }
}

/// Random 10 character lowercase client id, one per process
pub fn generate_client_id() -> String {
    let mut rng = rand::thread_rng();
    (0..CLIENT_ID_LEN)
        .map(|_| rng.gen_range(b'a'..=b'z') as char)
        .collect()
}

/// Everything the rumqttc session needs to open a connection
#[derive(Debug, Clone, PartialEq)]
pub struct MqttConfig {
    pub address: BrokerAddress,
    pub client_id: String,
    pub keep_alive: Duration,
    pub last_will_topic: String,
    pub connect_timeout: Duration,
}

impl MqttConfig {
    pub fn from_settings(settings: &BrokerSettings) -> Result<Self, ConfigError> {
        if settings.keep_alive_secs == 0 {
            return Err(ConfigError::KeepAlive);
        }
        let address = settings
            .address
            .parse::<BrokerAddress>()
            .map_err(|reason| ConfigError::BrokerAddress {
                address: settings.address.clone(),
                reason,
            })?;

        Ok(Self {
            address,
            client_id: generate_client_id(),
            keep_alive: Duration::from_secs(settings.keep_alive_secs),
            last_will_topic: settings.last_will_topic.clone(),
            connect_timeout: Duration::from_secs(10),
        })
    }
}
