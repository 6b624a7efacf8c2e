//! `rumqttc` implementation of [`Transport`].
//!
//! `MqttTransport` owns the `AsyncClient` and, while no flush loop is
//! running, the `EventLoop`. Starting the loop moves the event loop into a
//! spawned task. Stopping it cancels the task and takes the event loop back,
//! so that `disconnect` can drive the final DISCONNECT itself.
//!
//! ```text
//!            connect()                start_loop()
//!   [idle] ───────────> [connected] ──────────────> [flushing]
//!                           ^                           │
//!                           └──── stop_loop() ──────────┘
//!                           │
//!                      disconnect()
//!                           v
//!                       [closed]
//! ```

use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, Outgoing, Packet, QoS};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::{
    client::ClientBuilder,
    config::BrokerConfig,
    status::{BrokerStatus, MqttStatus},
    transport::{PublishOutcome, Transport},
};

/// A running flush loop: the task polls the event loop until cancelled and
/// then hands it back together with the first connection error it saw.
struct FlushTask {
    cancel: CancellationToken,
    handle: JoinHandle<(EventLoop, Option<BrokerStatus>)>,
}

/// MQTT session for one publish run.
pub struct MqttTransport {
    /// Request side of the session
    client: AsyncClient,

    /// Network side, `None` while the flush loop owns it
    event_loop: Option<EventLoop>,

    /// Background loop, if started
    flush: Option<FlushTask>,

    /// Connection lost while the flush loop was running
    failure: Option<BrokerStatus>,

    /// Bound for CONNACK and for flushing DISCONNECT
    timeout: Duration,

    connected: bool,
}

impl MqttTransport {
    /// Builds the client from broker settings. No network activity happens
    /// until [`Transport::connect`].
    ///
    /// # Errors
    ///
    /// Returns `TransferError` when the settings are invalid.
    pub fn new(config: &BrokerConfig) -> crate::Result<Self> {
        let (client, event_loop) = ClientBuilder::from_config(config)?.build()?;

        debug!(
            host = %config.host,
            port = config.port,
            client_id = %config.client_id,
            "MQTT client created"
        );

        Ok(Self {
            client,
            event_loop: Some(event_loop),
            flush: None,
            failure: None,
            timeout: Duration::from_secs(config.connect_timeout),
            connected: false,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    fn is_valid_topic(topic: &str) -> bool {
        !topic.is_empty() && topic.len() <= usize::from(u16::MAX) && !topic.contains(['+', '#'])
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn connect(&mut self) -> Result<(), BrokerStatus> {
        if self.connected {
            return Ok(());
        }
        let Some(event_loop) = self.event_loop.as_mut() else {
            return Err(BrokerStatus::with_detail(
                MqttStatus::InvalidArgument,
                "event loop is owned by the flush loop",
            ));
        };

        let handshake = async {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        return if ack.code == ConnectReturnCode::Success {
                            Ok(())
                        } else {
                            Err(BrokerStatus::from_connect_code(ack.code))
                        };
                    }
                    Ok(event) => trace!(?event, "Event before CONNACK"),
                    Err(e) => return Err(BrokerStatus::from_connection_error(&e)),
                }
            }
        };

        match tokio::time::timeout(self.timeout, handshake).await {
            Ok(Ok(())) => {
                self.connected = true;
                info!("Connected to MQTT broker");
                Ok(())
            }
            Ok(Err(status)) => {
                warn!(code = status.code, reason = %status.message, "Broker connection failed");
                Err(status)
            }
            Err(_) => {
                let status = BrokerStatus::with_detail(
                    MqttStatus::NotConnected,
                    format!("no CONNACK within {}s", self.timeout.as_secs()),
                );
                warn!(code = status.code, reason = %status.message, "Broker connection timed out");
                Err(status)
            }
        }
    }

    fn start_loop(&mut self) {
        if self.flush.is_some() {
            return;
        }
        let Some(mut event_loop) = self.event_loop.take() else {
            warn!("No event loop available, flush loop not started");
            return;
        };

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut failure = None;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    event = event_loop.poll() => match event {
                        Ok(event) => trace!(?event, "Flush loop event"),
                        Err(e) => {
                            warn!(error = %e, "Connection error in flush loop");
                            failure = Some(BrokerStatus::with_detail(MqttStatus::ConnectionLost, e));
                            // Polling again would reconnect.
                            token.cancelled().await;
                            break;
                        }
                    }
                }
            }
            (event_loop, failure)
        });

        self.flush = Some(FlushTask { cancel, handle });
    }

    async fn stop_loop(&mut self) {
        let Some(task) = self.flush.take() else {
            return;
        };
        task.cancel.cancel();

        match task.handle.await {
            Ok((event_loop, failure)) => {
                self.event_loop = Some(event_loop);
                if failure.is_some() {
                    self.failure = failure;
                }
            }
            Err(e) => {
                error!(error = %e, "Flush loop task failed");
                self.failure = Some(BrokerStatus::with_detail(MqttStatus::Unknown, e));
            }
        }
    }

    fn abort_loop(&mut self) {
        if let Some(task) = self.flush.take() {
            task.cancel.cancel();
            task.handle.abort();
            debug!("Flush loop task aborted");
        }
    }

    async fn publish(&mut self, topic: &str, payload: &str) -> PublishOutcome {
        if !Self::is_valid_topic(topic) {
            return PublishOutcome::Rejected(BrokerStatus::with_detail(
                MqttStatus::InvalidArgument,
                format!("invalid topic {topic:?}"),
            ));
        }
        if !self.connected {
            return PublishOutcome::Rejected(MqttStatus::NotConnected.into());
        }

        match self
            .client
            .publish(topic, QoS::AtMostOnce, false, payload.as_bytes().to_vec())
            .await
        {
            Ok(()) => {
                debug!(topic, payload, "Publish queued");
                PublishOutcome::Accepted
            }
            Err(e) => PublishOutcome::Rejected(BrokerStatus::from_client_error(&e)),
        }
    }

    async fn disconnect(&mut self) -> BrokerStatus {
        self.stop_loop().await;

        if !self.connected {
            return MqttStatus::NotConnected.into();
        }
        self.connected = false;

        if let Some(status) = self.failure.take() {
            return status;
        }
        let Some(event_loop) = self.event_loop.as_mut() else {
            return BrokerStatus::with_detail(MqttStatus::ConnectionLost, "event loop unavailable");
        };

        if let Err(e) = self.client.disconnect().await {
            return BrokerStatus::from_client_error(&e);
        }

        // Queued publishes are written ahead of the DISCONNECT request.
        let drain = async {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => return BrokerStatus::success(),
                    Ok(event) => trace!(?event, "Event while disconnecting"),
                    Err(e) => return BrokerStatus::from_connection_error(&e),
                }
            }
        };

        match tokio::time::timeout(self.timeout, drain).await {
            Ok(status) => {
                if status.is_success() {
                    info!("Disconnected from MQTT broker");
                }
                status
            }
            Err(_) => BrokerStatus::with_detail(
                MqttStatus::ConnectionLost,
                format!("DISCONNECT not written within {}s", self.timeout.as_secs()),
            ),
        }
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        self.abort_loop();
    }
}
