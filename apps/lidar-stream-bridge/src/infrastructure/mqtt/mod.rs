//! MQTT Adapter
//!
//! The subscriber that owns the broker connection, the reconnection
//! policy, and the shared connection-state view used by the health
//! endpoint.

/// The MQTT subscriber and its event types.
pub mod client;

/// Exponential backoff reconnection policy.
pub mod reconnect;

/// Shared broker connection state.
pub mod state;

pub use client::{MqttClientError, MqttEvent, MqttSubscriber, MqttSubscriberConfig};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use state::{BrokerState, ConnectionState};
