//! Power command dispatcher
//!
//! Turns a tent's Tasmota switches on for a bounded time. For every configured
//! `.../POWER` topic, in order, two messages go out:
//!
//! ```text
//! cmnd/<device>/POWER      <- 1
//! cmnd/<device>/PulseTime  <- encode(seconds_on)
//! ```
//!
//! The device switches itself off once the pulse time elapses. A failure on one
//! device does not stop the others; all failures are returned together once
//! every device has been attempted. Nothing is rolled back, so a device whose
//! pulse-time publish failed stays on until told otherwise.

use rumqttc::QoS;
use tracing::{debug, error, info};

use crate::config::{ConfigError, DispatcherConfig};
use crate::mqtt::config::{qos_from_level, BrokerAddress};
use crate::mqtt::message_manager::Payload;
use crate::mqtt::mqtt_handler::{MessagingSession, SessionError};

use super::duration::OnDuration;
use super::error::{DispatchFailures, PowerError, PublishStage, TopicFailure};
use super::pulse_time::{encode, DeviceTopicSet, PowerCommandTopic, PulseTimeValue};

/// Publishes power-on/pulse-time pairs to a fixed set of devices
///
/// Owns its session exclusively. Calls must be serialized by the owner; the
/// [`retrigger`](super::retrigger) loop is the intended driver.
pub struct PowerDispatcher<S: MessagingSession> {
    broker: BrokerAddress,
    topics: DeviceTopicSet,
    qos: QoS,
    session: S,
}

impl<S: MessagingSession> PowerDispatcher<S> {
    /// Validates `config` eagerly and takes ownership of `session`
    ///
    /// # Errors
    ///
    /// * [`ConfigError::BrokerAddress`] - empty host or unparsable port
    /// * [`ConfigError::Qos`] - level other than 0, 1 or 2
    /// * [`ConfigError::NoDeviceTopics`] - empty topic list
    /// * [`ConfigError::MalformedTopic`] - a topic that is not `<prefix>/.../POWER`
    pub fn new(config: DispatcherConfig, session: S) -> Result<Self, ConfigError> {
        let broker = config
            .broker_address
            .parse::<BrokerAddress>()
            .map_err(|reason| ConfigError::BrokerAddress {
                address: config.broker_address.clone(),
                reason,
            })?;
        let qos = qos_from_level(config.qos).ok_or(ConfigError::Qos(config.qos))?;
        if config.device_topics.is_empty() {
            return Err(ConfigError::NoDeviceTopics);
        }
        let topics = DeviceTopicSet::parse(&config.device_topics)?;

        info!(
            "Power dispatcher for {} ready with {} device topic(s) at {:?}",
            broker,
            topics.len(),
            qos
        );

        Ok(Self {
            broker,
            topics,
            qos,
            session,
        })
    }

    pub async fn start(&mut self) -> Result<(), SessionError> {
        debug!("Starting the MQTT session for {}", self.broker);
        self.session.connect().await
    }

    pub async fn stop(&mut self) -> Result<(), SessionError> {
        self.session.disconnect().await?;
        debug!("Stopped the MQTT session for {}", self.broker);
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.session.is_connected()
    }

    pub fn topics(&self) -> &DeviceTopicSet {
        &self.topics
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    /// Validates `seconds_on` and turns every device on for that long
    ///
    /// An invalid duration fails before anything is published.
    pub async fn power_on(&mut self, seconds_on: f64) -> Result<(), PowerError> {
        let duration = OnDuration::new(seconds_on)?;
        self.power_on_for(duration).await
    }

    /// Turns every device on for an already validated duration
    pub async fn power_on_for(&mut self, duration: OnDuration) -> Result<(), PowerError> {
        if !self.session.is_connected() {
            return Err(PowerError::NotConnected {
                broker: self.broker.to_string(),
            });
        }

        let pulse_time = encode(duration);
        debug!(
            "=+= POWER ON -> {} seconds. Pulsetime value: {}.=+=",
            duration.seconds(),
            pulse_time
        );

        let mut failures = Vec::new();
        for topic in &self.topics {
            let result =
                Self::publish_pair(&mut self.session, self.qos, topic, duration, pulse_time).await;
            if let Err(failure) = result {
                error!("{}", failure);
                failures.push(failure);
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(DispatchFailures {
                attempted: self.topics.len(),
                failures,
            }
            .into())
        }
    }

    async fn publish_pair(
        session: &mut S,
        qos: QoS,
        topic: &PowerCommandTopic,
        duration: OnDuration,
        pulse_time: PulseTimeValue,
    ) -> Result<(), TopicFailure> {
        let fail = |stage, source| TopicFailure {
            power_topic: topic.power_topic().to_string(),
            pulse_topic: topic.pulse_time_topic().to_string(),
            seconds_on: duration.seconds(),
            stage,
            source,
        };

        session
            .publish(topic.power_topic(), Payload::power_on(), qos)
            .await
            .map_err(|e| fail(PublishStage::PowerOn, e))?;

        session
            .publish(
                topic.pulse_time_topic(),
                Payload::Number(pulse_time.value()),
                qos,
            )
            .await
            .map_err(|e| fail(PublishStage::PulseTime, e))
    }
}
