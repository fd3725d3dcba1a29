//! Broker Connection State
//!
//! Shared view of the MQTT connection for the health endpoint. Updated by
//! the ingest event loop, read by HTTP handlers.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use chrono::{DateTime, Utc};

/// MQTT connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No connection to the broker.
    #[default]
    Disconnected,
    /// Connection attempt in progress.
    Connecting,
    /// Connected and subscribed to the feed topic.
    Connected,
    /// Connection lost, backoff in progress.
    Reconnecting,
}

impl ConnectionState {
    /// Name used in health responses.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        }
    }

    /// Whether this state counts as connected.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// Tracks the state of the upstream broker connection.
#[derive(Debug, Default)]
pub struct BrokerState {
    state: parking_lot::RwLock<ConnectionState>,
    last_connected_at: parking_lot::RwLock<Option<DateTime<Utc>>>,
    reconnect_attempts: AtomicU32,
    messages_received: AtomicU64,
}

impl BrokerState {
    /// Create state in the disconnected position.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connection state. Entering `Connected` stamps the
    /// connect time and clears the reconnect counter.
    pub fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
        if state == ConnectionState::Connected {
            *self.last_connected_at.write() = Some(Utc::now());
            self.reconnect_attempts.store(0, Ordering::Relaxed);
        }
    }

    /// Increment reconnect attempts.
    pub fn increment_reconnect_attempts(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the received-message counter.
    pub fn increment_messages(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current connection state.
    #[must_use]
    pub fn get_state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Whether the broker is currently connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.get_state().is_connected()
    }

    /// Messages received since startup.
    #[must_use]
    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    /// Reconnect attempts since the last successful connect.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::Relaxed)
    }

    /// Time of the last successful connect, if any.
    #[must_use]
    pub fn last_connected_at(&self) -> Option<DateTime<Utc>> {
        *self.last_connected_at.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_disconnected() {
        let state = BrokerState::new();
        assert_eq!(state.get_state(), ConnectionState::Disconnected);
        assert!(!state.is_connected());
        assert!(state.last_connected_at().is_none());
        assert_eq!(state.messages_received(), 0);
    }

    #[test]
    fn connecting_clears_reconnect_counter() {
        let state = BrokerState::new();
        state.set_state(ConnectionState::Reconnecting);
        state.increment_reconnect_attempts();
        state.increment_reconnect_attempts();
        assert_eq!(state.reconnect_attempts(), 2);

        state.set_state(ConnectionState::Connected);
        assert!(state.is_connected());
        assert_eq!(state.reconnect_attempts(), 0);
        assert!(state.last_connected_at().is_some());
    }

    #[test]
    fn message_counter_accumulates() {
        let state = BrokerState::new();
        for _ in 0..5 {
            state.increment_messages();
        }
        assert_eq!(state.messages_received(), 5);
    }

    #[test]
    fn state_names() {
        assert_eq!(ConnectionState::Disconnected.as_str(), "disconnected");
        assert_eq!(ConnectionState::Connecting.as_str(), "connecting");
        assert_eq!(ConnectionState::Connected.as_str(), "connected");
        assert_eq!(ConnectionState::Reconnecting.as_str(), "reconnecting");
    }
}
