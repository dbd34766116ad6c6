use crate::{BrokerAddr, Publisher, Result, TransportError};
use async_trait::async_trait;
use parking_lot::Mutex;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Pause before polling again after a connection error; rumqttc reconnects on the next poll.
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Connection parameters for [`MqttPublisher`].
#[derive(Clone, Debug)]
pub struct MqttSettings {
    pub broker: BrokerAddr,
    pub client_id: String,
    /// Gateway access token, sent as the MQTT username with an empty password.
    pub access_token: Option<String>,
    pub keep_alive: Duration,
    pub connect_timeout: Duration,
    /// Capacity of the client request channel.
    pub request_capacity: usize,
}

impl MqttSettings {
    pub fn new(broker: BrokerAddr, client_id: impl Into<String>) -> Self {
        Self {
            broker,
            client_id: client_id.into(),
            access_token: None,
            keep_alive: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            request_capacity: 100,
        }
    }

    fn to_options(&self) -> MqttOptions {
        let mut opts = MqttOptions::new(&self.client_id, self.broker.host(), self.broker.port());
        opts.set_keep_alive(self.keep_alive);
        opts.set_clean_session(true);
        if let Some(token) = &self.access_token {
            opts.set_credentials(token.as_str(), "");
        }
        opts
    }
}

/// QoS 0 publisher backed by an rumqttc client.
///
/// The event loop runs on a background task for the lifetime of the publisher.
pub struct MqttPublisher {
    client: AsyncClient,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl MqttPublisher {
    /// Connect and wait for the broker's CONNACK before returning.
    pub async fn connect(settings: &MqttSettings) -> Result<Self> {
        let (client, mut eventloop) =
            AsyncClient::new(settings.to_options(), settings.request_capacity);

        tokio::time::timeout(settings.connect_timeout, wait_for_connack(&mut eventloop))
            .await
            .map_err(|_| TransportError::Timeout)??;

        info!(
            broker = %settings.broker,
            client_id = %settings.client_id,
            "connected to MQTT broker"
        );

        let driver = tokio::spawn(drive_event_loop(eventloop, settings.broker.clone()));
        Ok(Self {
            client,
            driver: Mutex::new(Some(driver)),
        })
    }
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<()> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return match ack.code {
                    ConnectReturnCode::Success => Ok(()),
                    code => Err(TransportError::Connect(format!(
                        "broker refused connection: {code:?}"
                    ))),
                };
            }
            Ok(_) => continue,
            Err(e) => return Err(TransportError::Connect(e.to_string())),
        }
    }
}

async fn drive_event_loop(mut eventloop: EventLoop, broker: BrokerAddr) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!(broker = %broker, "reconnected to MQTT broker");
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!(broker = %broker, "MQTT disconnect sent");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(broker = %broker, error = %e, "MQTT connection error");
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

#[async_trait]
impl Publisher for MqttPublisher {
    fn name(&self) -> &str {
        "mqtt"
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        self.client
            .publish(topic, QoS::AtMostOnce, false, payload)
            .await
            .map_err(|e| TransportError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }

    async fn disconnect(&self) -> Result<()> {
        self.client
            .disconnect()
            .await
            .map_err(|_| TransportError::Disconnected)?;
        let driver = self.driver.lock().take();
        if let Some(handle) = driver {
            let _ = handle.await;
        }
        Ok(())
    }
}

impl Drop for MqttPublisher {
    fn drop(&mut self) {
        if let Some(handle) = self.driver.lock().take() {
            handle.abort();
        }
    }
}
