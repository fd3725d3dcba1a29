//! MQTT Subscriber
//!
//! Owns the connection to the MQTT broker and the subscription to the
//! single feed topic. Inbound packets are turned into [`MqttEvent`]s on a
//! bounded channel consumed by the ingest event loop; payload decoding
//! happens downstream, so a malformed payload never affects the
//! connection.
//!
//! # Lifecycle
//!
//! `Disconnected → Connecting → Subscribed`, with automatic reconnection
//! (exponential backoff with jitter) on connection loss. Startup connect
//! failures are not fatal: the subscriber keeps retrying while the rest
//! of the service serves the cached history.

use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, ConnectReturnCode, Event, MqttOptions, Packet, QoS};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::infrastructure::config::{BrokerSettings, ReconnectSettings};
use crate::infrastructure::metrics;

// =============================================================================
// Error Type
// =============================================================================

/// Errors that can occur in the MQTT subscriber.
#[derive(Debug, thiserror::Error)]
pub enum MqttClientError {
    /// Transport-level connection error.
    #[error("MQTT connection error: {0}")]
    Connection(#[from] rumqttc::ConnectionError),

    /// Request to the client (subscribe/disconnect) failed.
    #[error("MQTT request error: {0}")]
    Request(#[from] rumqttc::ClientError),

    /// Broker rejected the connection.
    #[error("broker refused connection: {0:?}")]
    ConnectionRefused(ConnectReturnCode),

    /// The event channel consumer went away.
    #[error("event channel closed")]
    ChannelClosed,

    /// Maximum reconnection attempts exceeded.
    #[error("maximum reconnection attempts exceeded")]
    MaxReconnectAttemptsExceeded,
}

// =============================================================================
// Subscriber Events
// =============================================================================

/// Events emitted by the MQTT subscriber.
#[derive(Debug, Clone)]
pub enum MqttEvent {
    /// Connection attempt started.
    Connecting,
    /// Connected to the broker and subscribed to the feed topic.
    Connected,
    /// Disconnected from the broker.
    Disconnected,
    /// Reconnecting to the broker.
    Reconnecting {
        /// Reconnection attempt number.
        attempt: u32,
    },
    /// A raw message arrived on the feed topic.
    Message {
        /// Topic the payload was published on.
        topic: String,
        /// Raw payload bytes; decoded by the bridge.
        payload: Vec<u8>,
    },
}

// =============================================================================
// Subscriber Configuration
// =============================================================================

/// Configuration for the MQTT subscriber.
#[derive(Debug, Clone)]
pub struct MqttSubscriberConfig {
    /// Broker hostname.
    pub host: String,
    /// Broker port.
    pub port: u16,
    /// The single feed topic to subscribe to.
    pub topic: String,
    /// Client identifier presented to the broker.
    pub client_id: String,
    /// MQTT keepalive interval.
    pub keepalive: Duration,
    /// Reconnection configuration.
    pub reconnect: ReconnectConfig,
}

impl MqttSubscriberConfig {
    /// Create a configuration with default keepalive and reconnect
    /// behavior.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, topic: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            topic: topic.into(),
            client_id: format!("lidar-bridge-{}", std::process::id()),
            keepalive: Duration::from_secs(30),
            reconnect: ReconnectConfig::default(),
        }
    }

    /// Create a configuration from environment-derived settings.
    #[must_use]
    pub fn from_settings(broker: &BrokerSettings, reconnect: &ReconnectSettings) -> Self {
        let mut config = Self::new(broker.host.clone(), broker.port, broker.topic.clone());
        config.keepalive = broker.keepalive;
        config.reconnect = ReconnectConfig {
            initial_delay: reconnect.delay_initial,
            max_delay: reconnect.delay_max,
            multiplier: reconnect.delay_multiplier,
            jitter_factor: 0.1, // Default jitter
            max_attempts: reconnect.max_attempts,
        };
        config
    }
}

// =============================================================================
// MQTT Subscriber
// =============================================================================

/// MQTT subscriber for the sensor feed.
///
/// Manages the connection lifecycle including:
/// - Topic subscription on every (re)connect
/// - Automatic reconnection with exponential backoff
/// - Clean disconnect on cancellation
pub struct MqttSubscriber {
    config: MqttSubscriberConfig,
    event_tx: mpsc::Sender<MqttEvent>,
    cancel: CancellationToken,
}

impl MqttSubscriber {
    /// Create a new subscriber.
    #[must_use]
    pub const fn new(
        config: MqttSubscriberConfig,
        event_tx: mpsc::Sender<MqttEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            event_tx,
            cancel,
        }
    }

    /// Run the subscriber connection loop.
    ///
    /// Connects to the broker, subscribes, and forwards messages until
    /// cancelled or an unrecoverable error occurs.
    ///
    /// # Errors
    ///
    /// Returns an error only when reconnect attempts are exhausted or
    /// the event channel consumer has gone away; ordinary connection
    /// loss is retried internally.
    pub async fn run(self: Arc<Self>) -> Result<(), MqttClientError> {
        let mut reconnect_policy = ReconnectPolicy::new(self.config.reconnect.clone());

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!("MQTT subscriber cancelled");
                return Ok(());
            }

            match self.connect_and_run(&mut reconnect_policy).await {
                Ok(()) => {
                    tracing::info!("MQTT connection closed gracefully");
                    return Ok(());
                }
                Err(e @ MqttClientError::ChannelClosed) => return Err(e),
                Err(e) => {
                    tracing::warn!(error = %e, "MQTT connection error");

                    let _ = self.event_tx.send(MqttEvent::Disconnected).await;

                    if let Some(delay) = reconnect_policy.next_delay() {
                        let attempt = reconnect_policy.attempt_count();
                        metrics::record_reconnect();
                        tracing::info!(
                            attempt,
                            delay_ms = delay.as_millis(),
                            "Reconnecting to MQTT broker"
                        );

                        let _ = self
                            .event_tx
                            .send(MqttEvent::Reconnecting { attempt })
                            .await;

                        tokio::select! {
                            () = self.cancel.cancelled() => {
                                tracing::info!("MQTT subscriber cancelled during reconnect delay");
                                return Ok(());
                            }
                            () = tokio::time::sleep(delay) => {}
                        }
                    } else {
                        return Err(MqttClientError::MaxReconnectAttemptsExceeded);
                    }
                }
            }
        }
    }

    /// Connect to the broker and process packets until error or
    /// cancellation.
    async fn connect_and_run(
        &self,
        reconnect_policy: &mut ReconnectPolicy,
    ) -> Result<(), MqttClientError> {
        tracing::info!(
            host = %self.config.host,
            port = self.config.port,
            topic = %self.config.topic,
            "Connecting to MQTT broker"
        );
        let _ = self.event_tx.send(MqttEvent::Connecting).await;

        let mut options = MqttOptions::new(
            self.config.client_id.clone(),
            self.config.host.clone(),
            self.config.port,
        );
        options.set_keep_alive(self.config.keepalive);
        options.set_clean_session(true);

        let (client, mut event_loop) = AsyncClient::new(options, 16);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = client.disconnect().await;
                    return Ok(());
                }
                event = event_loop.poll() => match event? {
                    Event::Incoming(Packet::ConnAck(ack)) => {
                        if ack.code != ConnectReturnCode::Success {
                            return Err(MqttClientError::ConnectionRefused(ack.code));
                        }

                        tracing::info!("Connected to MQTT broker");
                        client
                            .subscribe(self.config.topic.clone(), QoS::AtMostOnce)
                            .await?;
                        reconnect_policy.reset();
                        let _ = self.event_tx.send(MqttEvent::Connected).await;
                    }
                    Event::Incoming(Packet::SubAck(_)) => {
                        tracing::debug!(topic = %self.config.topic, "Subscription acknowledged");
                    }
                    Event::Incoming(Packet::Publish(publish)) => {
                        tracing::debug!(
                            topic = %publish.topic,
                            len = publish.payload.len(),
                            "Message received"
                        );

                        if self
                            .event_tx
                            .send(MqttEvent::Message {
                                topic: publish.topic,
                                payload: publish.payload.to_vec(),
                            })
                            .await
                            .is_err()
                        {
                            let _ = client.disconnect().await;
                            return Err(MqttClientError::ChannelClosed);
                        }
                    }
                    Event::Incoming(_) | Event::Outgoing(_) => {}
                }
            }
        }
    }
}
