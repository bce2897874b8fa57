use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, LastWill, MqttOptions,
    Outgoing, Packet, QoS,
};
use statum::{machine, state};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::config::MqttConfig;
use super::message_manager::{ConnectionState, OutboundMessage, Payload, SessionStatus};

const REQUEST_CAPACITY: usize = 100;
const RECONNECT_DELAY: Duration = Duration::from_secs(1);
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);
const LAST_WILL_PAYLOAD: &str = "offline";

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failures reported by a messaging session
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to connect to broker {broker}: {source}")]
    Connect {
        broker: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to publish to '{topic}': {source}")]
    Communication {
        topic: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to disconnect from broker {broker}: {source}")]
    Disconnect {
        broker: String,
        #[source]
        source: BoxError,
    },

    #[error("session is not connected")]
    NotConnected,
}

impl SessionError {
    pub fn communication(topic: &str, source: impl Into<BoxError>) -> Self {
        SessionError::Communication {
            topic: topic.to_string(),
            source: source.into(),
        }
    }
}

/// Connection to a broker as seen by the power command dispatcher
///
/// Implementations are driven by a single owner; `publish` is never called
/// concurrently on the same session.
pub trait MessagingSession: Send {
    fn connect(&mut self) -> impl Future<Output = Result<(), SessionError>> + Send;

    fn publish(
        &mut self,
        topic: &str,
        payload: Payload,
        qos: QoS,
    ) -> impl Future<Output = Result<(), SessionError>> + Send;

    fn disconnect(&mut self) -> impl Future<Output = Result<(), SessionError>> + Send;

    fn is_connected(&self) -> bool;
}

#[state]
#[derive(Debug, Clone)]
pub enum LinkState {
    Offline, // Options built, no network yet
    Online,  // CONNACK received, event loop polled in background
}

/// rumqttc client plus the task that drives its event loop
///
/// Publishing only exists on `BrokerLink<Online>`. `link_up` is owned by the
/// poller: set on CONNACK, cleared when the event loop errors out.
#[machine]
pub struct BrokerLink<S: LinkState> {
    config: MqttConfig,
    client: Option<AsyncClient>,
    poller: Option<JoinHandle<()>>,
    shutdown: CancellationToken,
    link_up: Arc<AtomicBool>,
}

impl<S: LinkState> BrokerLink<S> {
    pub fn broker(&self) -> String {
        self.config.address.to_string()
    }

    pub fn is_link_up(&self) -> bool {
        self.link_up.load(Ordering::Acquire)
    }
}

impl BrokerLink<Offline> {
    pub fn create(config: MqttConfig) -> Self {
        Self::new(
            config,
            None,
            None,
            CancellationToken::new(),
            Arc::new(AtomicBool::new(false)),
        )
    }

    fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(
            self.config.client_id.clone(),
            self.config.address.host.clone(),
            self.config.address.port,
        );
        options
            .set_keep_alive(self.config.keep_alive)
            .set_clean_session(false)
            .set_last_will(LastWill::new(
                self.config.last_will_topic.clone(),
                Payload::Text(LAST_WILL_PAYLOAD.to_string()).into_bytes(),
                QoS::AtLeastOnce,
                false,
            ));
        options
    }

    /// Opens the connection and waits for the broker's CONNACK
    pub async fn connect(mut self) -> Result<BrokerLink<Online>, SessionError> {
        let broker = self.broker();
        let (client, mut eventloop) = AsyncClient::new(self.options(), REQUEST_CAPACITY);

        let handshake = async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        if ack.code == ConnectReturnCode::Success {
                            return Ok(ack.code);
                        }
                        return Err(BoxError::from(ConnectionError::ConnectionRefused(
                            ack.code,
                        )));
                    }
                    Ok(event) => debug!("Event before CONNACK: {:?}", event),
                    Err(e) => return Err(BoxError::from(e)),
                }
            }
        };

        let code = match tokio::time::timeout(self.config.connect_timeout, handshake).await {
            Ok(Ok(code)) => code,
            Ok(Err(source)) => return Err(SessionError::Connect { broker, source }),
            Err(elapsed) => {
                return Err(SessionError::Connect {
                    broker,
                    source: elapsed.into(),
                })
            }
        };

        info!(
            "Connected to broker {}. ClientID: {}. Result code: {:?}",
            broker, self.config.client_id, code
        );

        self.link_up.store(true, Ordering::Release);
        let poller = tokio::spawn(poll_events(
            eventloop,
            broker,
            self.shutdown.clone(),
            self.link_up.clone(),
        ));
        self.client = Some(client);
        self.poller = Some(poller);
        Ok(self.transition())
    }
}

impl BrokerLink<Online> {
    /// Hands the message to the event loop without waiting
    ///
    /// Fails right away while the broker link is down or when the request
    /// queue is full, so a dead broker never blocks the caller.
    pub fn publish(&self, message: &OutboundMessage) -> Result<(), SessionError> {
        let client = self.client.as_ref().ok_or(SessionError::NotConnected)?;
        if !self.is_link_up() {
            return Err(SessionError::communication(
                &message.topic,
                format!("link to broker {} is down", self.broker()),
            ));
        }
        client
            .try_publish(
                message.topic.clone(),
                message.qos,
                false,
                message.payload.clone().into_bytes(),
            )
            .map_err(|e| SessionError::communication(&message.topic, e))
    }

    /// Sends DISCONNECT, lets the event loop flush it and stops the poller
    pub async fn disconnect(mut self) -> Result<BrokerLink<Offline>, SessionError> {
        let broker = self.broker();
        self.link_up.store(false, Ordering::Release);
        let result = match self.client.take() {
            Some(client) => client.try_disconnect().map_err(|e| SessionError::Disconnect {
                broker: broker.clone(),
                source: e.into(),
            }),
            None => Ok(()),
        };

        if let Some(mut poller) = self.poller.take() {
            if tokio::time::timeout(DISCONNECT_GRACE, &mut poller)
                .await
                .is_err()
            {
                warn!("Event loop for {} did not stop in time, cancelling", broker);
                self.shutdown.cancel();
                let _ = poller.await;
            }
        }

        result?;
        Ok(self.transition())
    }
}

async fn poll_events(
    mut eventloop: EventLoop,
    broker: String,
    shutdown: CancellationToken,
    link_up: Arc<AtomicBool>,
) {
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = eventloop.poll() => event,
        };

        match event {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                debug!(
                    "Received MQTT message on '{}': {}",
                    publish.topic,
                    String::from_utf8_lossy(&publish.payload)
                );
            }
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                info!("Reconnected to broker {}. Result code: {:?}", broker, ack.code);
                link_up.store(ack.code == ConnectReturnCode::Success, Ordering::Release);
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("Disconnect sent to broker {}", broker);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                if link_up.swap(false, Ordering::AcqRel) {
                    error!("Received an unexpected disconnect from {}. Error: {}", broker, e);
                } else {
                    debug!("Reconnect to {} failed: {}", broker, e);
                }
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                }
            }
        }
    }
    link_up.store(false, Ordering::Release);
    debug!("Event loop for {} stopped", broker);
}

/// [`MessagingSession`] backed by rumqttc
pub struct MqttSession {
    config: MqttConfig,
    link: Option<BrokerLink<Online>>,
    status: SessionStatus,
}

impl MqttSession {
    pub fn new(config: MqttConfig) -> Self {
        MqttSession {
            config,
            link: None,
            status: SessionStatus::default(),
        }
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    pub fn client_id(&self) -> &str {
        &self.config.client_id
    }

    /// Whether the background event loop currently holds a broker connection
    pub fn is_link_up(&self) -> bool {
        self.link.as_ref().is_some_and(BrokerLink::is_link_up)
    }
}

impl MessagingSession for MqttSession {
    async fn connect(&mut self) -> Result<(), SessionError> {
        if self.link.is_some() {
            debug!("Already connected to {}", self.config.address);
            return Ok(());
        }

        self.status.connection_state = ConnectionState::Connecting;
        match BrokerLink::create(self.config.clone()).connect().await {
            Ok(link) => {
                self.link = Some(link);
                self.status.connection_state = ConnectionState::Connected;
                Ok(())
            }
            Err(e) => {
                error!("Connection error: {}", e);
                self.status.connection_state = ConnectionState::Failed;
                self.status.record_error(&e);
                Err(e)
            }
        }
    }

    async fn publish(&mut self, topic: &str, payload: Payload, qos: QoS) -> Result<(), SessionError> {
        let link = self.link.as_ref().ok_or(SessionError::NotConnected)?;
        let message = OutboundMessage::new(topic, payload, qos);
        debug!("Publishing {}", message.render());

        match link.publish(&message) {
            Ok(()) => {
                self.status.record_sent(&message);
                Ok(())
            }
            Err(e) => {
                self.status.record_error(&e);
                Err(e)
            }
        }
    }

    async fn disconnect(&mut self) -> Result<(), SessionError> {
        let Some(link) = self.link.take() else {
            return Ok(());
        };
        self.status.connection_state = ConnectionState::Disconnected;
        match link.disconnect().await {
            Ok(_) => Ok(()),
            Err(e) => {
                error!("Failed to stop the MQTT client: {}", e);
                self.status.record_error(&e);
                Err(e)
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.link.is_some()
    }
}
