//! Settings file handling
//!
//! Settings live in `~/.config/powerbuddy/settings.toml` by default; the
//! binary takes another path from `--config` or `POWERBUDDY_CONFIG`. Each tent
//! names the Tasmota power topics it drives.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

const CONFIG_DIR: &str = ".config/powerbuddy";
const SETTINGS_FILE: &str = "settings.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write settings file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("no tent named '{name}' in settings (known: {known})")]
    UnknownTent { name: String, known: String },

    #[error("invalid broker address '{address}': {reason}")]
    BrokerAddress { address: String, reason: String },

    #[error("invalid qos level {0}, expected 0, 1 or 2")]
    Qos(u8),

    #[error("keep alive must be at least one second")]
    KeepAlive,

    #[error("no device topics configured")]
    NoDeviceTopics,

    #[error(transparent)]
    MalformedTopic(#[from] crate::power::error::MalformedTopicError),
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct BrokerSettings {
    /// `host[:port]`
    pub address: String,
    #[serde(default = "default_qos")]
    pub qos: u8,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    #[serde(default = "default_last_will_topic")]
    pub last_will_topic: String,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:1883".to_string(),
            qos: default_qos(),
            keep_alive_secs: default_keep_alive_secs(),
            last_will_topic: default_last_will_topic(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct RetriggerSettings {
    pub interval_secs: u64,
    pub seconds_on: f64,
}

impl Default for RetriggerSettings {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            seconds_on: 5.0,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct TentSettings {
    pub device_topics: Vec<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct Settings {
    pub broker: BrokerSettings,
    #[serde(default)]
    pub retrigger: RetriggerSettings,
    #[serde(default)]
    pub tents: BTreeMap<String, TentSettings>,
}

/// What a dispatcher is built from; validated by the dispatcher's constructor
#[derive(Clone, Debug, PartialEq)]
pub struct DispatcherConfig {
    pub broker_address: String,
    pub device_topics: Vec<String>,
    pub qos: u8,
}

impl Settings {
    /// `~/.config/powerbuddy/settings.toml`
    pub fn default_path() -> PathBuf {
        let mut path = get_home_dir();
        path.push(CONFIG_DIR);
        path.push(SETTINGS_FILE);
        path
    }

    pub fn from_toml(path: &Path, content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!("Loading settings from {}", path.display());
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let settings = Self::from_toml(path, &content)?;
        info!(
            "Loaded settings with {} tent(s) from {}",
            settings.tents.len(),
            path.display()
        );
        Ok(settings)
    }

    pub async fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }
        let content = toml::to_string_pretty(self)?;
        tokio::fs::write(path, content).await.map_err(write_err)
    }

    /// Writes a default settings file when none exists yet
    ///
    /// Returns `true` when a file was created.
    pub async fn ensure_default(path: &Path) -> Result<bool, ConfigError> {
        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        if exists {
            return Ok(false);
        }

        info!("Creating default settings at {}", path.display());
        let mut settings = Settings::default();
        settings.tents.insert(
            "tent_one".to_string(),
            TentSettings {
                device_topics: vec!["cmnd/mistbuddy_mister/POWER".to_string()],
            },
        );
        settings.save(path).await?;
        Ok(true)
    }

    /// Resolves the dispatcher inputs for one tent
    pub fn dispatcher_config(&self, tent_name: &str) -> Result<DispatcherConfig, ConfigError> {
        let tent = self
            .tents
            .get(tent_name)
            .ok_or_else(|| ConfigError::UnknownTent {
                name: tent_name.to_string(),
                known: self.tents.keys().cloned().collect::<Vec<_>>().join(", "),
            })?;

        Ok(DispatcherConfig {
            broker_address: self.broker.address.clone(),
            device_topics: tent.device_topics.clone(),
            qos: self.broker.qos,
        })
    }
}

fn get_home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| {
        warn!("Could not determine home directory, using current directory");
        PathBuf::from(".")
    })
}

fn default_qos() -> u8 {
    1
}

fn default_keep_alive_secs() -> u64 {
    5
}

fn default_last_will_topic() -> String {
    "/lwt".to_string()
}
