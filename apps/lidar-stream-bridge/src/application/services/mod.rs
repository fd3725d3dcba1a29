//! Ingest Event Loop
//!
//! The single dedicated task that consumes [`MqttEvent`]s from the
//! subscriber channel and drives the broadcast bridge. Connection
//! events update the shared broker state for the health endpoint;
//! message events are decoded and fanned out by the bridge.
//!
//! Decode failures are per-message: logged, counted, and dropped
//! without touching the history or the connection.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::infrastructure::bridge::BroadcastBridge;
use crate::infrastructure::metrics;
use crate::infrastructure::mqtt::{BrokerState, ConnectionState, MqttEvent};

/// Consume subscriber events until the channel closes.
pub async fn run_event_loop(
    mut rx: mpsc::Receiver<MqttEvent>,
    bridge: Arc<BroadcastBridge>,
    broker: Arc<BrokerState>,
) {
    while let Some(event) = rx.recv().await {
        match event {
            MqttEvent::Connecting => {
                broker.set_state(ConnectionState::Connecting);
                tracing::debug!("MQTT feed connecting");
            }
            MqttEvent::Connected => {
                broker.set_state(ConnectionState::Connected);
                tracing::info!("MQTT feed connected");
            }
            MqttEvent::Disconnected => {
                broker.set_state(ConnectionState::Disconnected);
                tracing::warn!("MQTT feed disconnected");
            }
            MqttEvent::Reconnecting { attempt } => {
                broker.set_state(ConnectionState::Reconnecting);
                broker.increment_reconnect_attempts();
                tracing::info!(attempt, "MQTT feed reconnecting");
            }
            MqttEvent::Message { topic, payload } => {
                broker.increment_messages();
                metrics::record_reading_received();

                if let Err(error) = bridge.ingest(&topic, &payload).await {
                    metrics::record_reading_rejected();
                    tracing::warn!(%error, %topic, "Dropping undecodable payload");
                }
            }
        }
    }

    tracing::debug!("Event channel closed, ingest loop exiting");
}
