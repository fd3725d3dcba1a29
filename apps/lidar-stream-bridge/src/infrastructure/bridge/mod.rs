//! Broadcast Bridge
//!
//! The component that owns the bounded reading history and the streaming
//! client registry. `ingest` is fed from the MQTT event loop: it decodes
//! a raw payload into a [`Reading`], appends it to the history, serializes
//! the wire frame once, and fans the shared frame out to every registered
//! client.
//!
//! # Failure Isolation
//!
//! One client's failure never aborts delivery to the rest and never
//! surfaces on the ingest path. Deliveries run concurrently, each bounded
//! by a per-client send timeout; a handle that times out or whose channel
//! has closed is pruned from the registry after the pass.

mod registry;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;

pub use registry::{ClientHandle, ClientId, ClientRegistry, DeliveryError};

use crate::domain::history::HistoryBuffer;
use crate::domain::reading::Reading;
use crate::infrastructure::config::BroadcastSettings;
use crate::infrastructure::metrics;

// =============================================================================
// Errors
// =============================================================================

/// Errors decoding a raw broker payload into a reading.
///
/// All variants are recoverable per-message failures: the message is
/// dropped and the subscription continues.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Payload bytes are not valid UTF-8.
    #[error("payload is not valid UTF-8")]
    PayloadNotUtf8(#[from] std::str::Utf8Error),

    /// Payload text does not parse as a decimal number.
    #[error("payload is not a decimal number: {0:?}")]
    PayloadNotNumeric(String),

    /// Payload parsed but cannot be represented on the JSON wire.
    #[error("non-finite reading value: {0}")]
    NonFiniteValue(f64),

    /// Reading could not be serialized to the wire frame.
    #[error("failed to serialize reading: {0}")]
    Serialize(#[from] serde_json::Error),
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the broadcast bridge.
#[derive(Debug, Clone, Copy)]
pub struct BroadcastConfig {
    /// Capacity of the reading history buffer.
    pub history_capacity: usize,
    /// Upper bound on one client delivery before it counts as failed.
    pub send_timeout: Duration,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            history_capacity: 100,
            send_timeout: Duration::from_secs(2),
        }
    }
}

impl From<BroadcastSettings> for BroadcastConfig {
    fn from(settings: BroadcastSettings) -> Self {
        Self {
            history_capacity: settings.history_capacity,
            send_timeout: settings.send_timeout,
        }
    }
}

// =============================================================================
// Broadcast Bridge
// =============================================================================

/// Owns the bounded history and the client registry; fans each ingested
/// reading out to all registered clients.
///
/// # Example
///
/// ```rust
/// use lidar_stream_bridge::{BroadcastBridge, BroadcastConfig};
///
/// let bridge = BroadcastBridge::new(BroadcastConfig::default());
/// assert!(bridge.latest().is_none());
/// ```
#[derive(Debug)]
pub struct BroadcastBridge {
    history: RwLock<HistoryBuffer>,
    registry: ClientRegistry,
    send_timeout: Duration,
    readings_ingested: AtomicU64,
}

/// Shared bridge reference.
pub type SharedBridge = Arc<BroadcastBridge>;

impl BroadcastBridge {
    /// Create a bridge with the given configuration.
    #[must_use]
    pub fn new(config: BroadcastConfig) -> Self {
        Self {
            history: RwLock::new(HistoryBuffer::new(config.history_capacity)),
            registry: ClientRegistry::new(),
            send_timeout: config.send_timeout,
            readings_ingested: AtomicU64::new(0),
        }
    }

    /// Create a bridge with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(BroadcastConfig::default())
    }

    /// Decode one raw broker payload, append it to the history, and fan
    /// it out to every registered client.
    ///
    /// The wire frame is serialized exactly once and shared across
    /// deliveries. Individual delivery failures are handled internally
    /// by pruning the failing client.
    ///
    /// # Errors
    ///
    /// Returns an [`IngestError`] when the payload does not decode to a
    /// finite decimal number; the history and the clients are untouched
    /// in that case.
    pub async fn ingest(&self, topic: &str, payload: &[u8]) -> Result<(), IngestError> {
        let text = std::str::from_utf8(payload)?;
        let value: f64 = text
            .trim()
            .parse()
            .map_err(|_| IngestError::PayloadNotNumeric(preview(text)))?;
        if !value.is_finite() {
            return Err(IngestError::NonFiniteValue(value));
        }

        let reading = Reading::now(value, topic);
        let frame: Arc<str> = serde_json::to_string(&reading)?.into();

        self.history.write().append(reading);
        self.readings_ingested.fetch_add(1, Ordering::Relaxed);

        self.broadcast(frame).await;
        Ok(())
    }

    /// Deliver one serialized frame to every registered client, pruning
    /// the ones that fail.
    async fn broadcast(&self, frame: Arc<str>) {
        let handles = self.registry.snapshot();
        if handles.is_empty() {
            return;
        }

        let deliveries = handles
            .iter()
            .map(|handle| handle.deliver(Arc::clone(&frame), self.send_timeout));
        let results = futures_util::future::join_all(deliveries).await;

        let mut delivered: u64 = 0;
        for (handle, result) in handles.iter().zip(results) {
            match result {
                Ok(()) => delivered += 1,
                Err(error) => {
                    tracing::debug!(client_id = handle.id(), %error, "Dropping streaming client");
                    if self.registry.remove(handle.id()) {
                        metrics::record_client_dropped();
                    }
                }
            }
        }
        metrics::record_frames_sent(delivered);
        metrics::set_connected_clients(self.registry.len());
    }

    /// Register a streaming client; the sender is the bounded channel
    /// drained by the client's connection task.
    pub fn register_client(&self, sender: tokio::sync::mpsc::Sender<Arc<str>>) -> ClientId {
        let id = self.registry.register(sender);
        metrics::set_connected_clients(self.registry.len());
        id
    }

    /// Remove a streaming client; no-op if already removed.
    pub fn remove_client(&self, id: ClientId) {
        self.registry.remove(id);
        metrics::set_connected_clients(self.registry.len());
    }

    /// The most recent reading, if any has arrived.
    #[must_use]
    pub fn latest(&self) -> Option<Reading> {
        self.history.read().latest().cloned()
    }

    /// An owned copy of the current history, oldest-first.
    #[must_use]
    pub fn history(&self) -> Vec<Reading> {
        self.history.read().snapshot()
    }

    /// Number of currently registered streaming clients.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.registry.len()
    }

    /// Total readings accepted since startup.
    #[must_use]
    pub fn readings_ingested(&self) -> u64 {
        self.readings_ingested.load(Ordering::Relaxed)
    }
}

/// Truncate payload text for error messages.
fn preview(text: &str) -> String {
    text.chars().take(64).collect()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use test_case::test_case;
    use tokio::sync::mpsc;

    use super::*;

    fn small_bridge() -> BroadcastBridge {
        BroadcastBridge::new(BroadcastConfig {
            history_capacity: 100,
            send_timeout: Duration::from_millis(50),
        })
    }

    #[tokio::test]
    async fn valid_payload_appends_one_reading() {
        let bridge = small_bridge();
        bridge.ingest("/esp32/lidar/distance", b"42.5").await.unwrap();

        let latest = bridge.latest().unwrap();
        assert_eq!(latest.value, 42.5);
        assert_eq!(latest.topic, "/esp32/lidar/distance");
        assert_eq!(bridge.history().len(), 1);
        assert_eq!(bridge.readings_ingested(), 1);
    }

    #[test_case(b"42.5", 42.5; "plain decimal")]
    #[test_case(b"  17 \n", 17.0; "surrounding whitespace")]
    #[test_case(b"-3.25", -3.25; "negative")]
    #[test_case(b"1e3", 1000.0; "exponent notation")]
    #[tokio::test]
    async fn accepted_payloads(payload: &[u8], expected: f64) {
        let bridge = small_bridge();
        bridge.ingest("t", payload).await.unwrap();
        assert_eq!(bridge.latest().unwrap().value, expected);
    }

    #[test_case(b"abc"; "non numeric")]
    #[test_case(b""; "empty")]
    #[test_case(b"12.5.1"; "double dot")]
    #[test_case(b"NaN"; "not a number")]
    #[test_case(b"inf"; "infinite")]
    #[test_case(&[0xff, 0xfe]; "invalid utf8")]
    #[tokio::test]
    async fn rejected_payloads_leave_state_untouched(payload: &[u8]) {
        let bridge = small_bridge();
        let (tx, mut rx) = mpsc::channel(8);
        bridge.register_client(tx);

        assert!(bridge.ingest("t", payload).await.is_err());
        assert!(bridge.latest().is_none());
        assert!(bridge.history().is_empty());
        assert_eq!(bridge.readings_ingested(), 0);
        assert!(rx.try_recv().is_err());
        // the client is still registered; a decode failure is not its fault
        assert_eq!(bridge.client_count(), 1);
    }

    #[tokio::test]
    async fn fan_out_delivers_to_every_client_exactly_once() {
        let bridge = small_bridge();
        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        bridge.register_client(tx1);
        bridge.register_client(tx2);

        bridge.ingest("t", b"42.5").await.unwrap();

        for rx in [&mut rx1, &mut rx2] {
            let frame = rx.try_recv().unwrap();
            let reading: Reading = serde_json::from_str(&frame).unwrap();
            assert_eq!(reading.value, 42.5);
            assert!(rx.try_recv().is_err(), "only one frame per reading");
        }
    }

    #[tokio::test]
    async fn closed_client_is_pruned_and_others_still_receive() {
        let bridge = small_bridge();
        let (dead_tx, dead_rx) = mpsc::channel(8);
        let (live_tx, mut live_rx) = mpsc::channel(8);
        let dead = bridge.register_client(dead_tx);
        bridge.register_client(live_tx);
        drop(dead_rx);

        bridge.ingest("t", b"1.0").await.unwrap();

        assert_eq!(bridge.client_count(), 1);
        assert!(live_rx.try_recv().is_ok());

        // removing the already-pruned client again is harmless
        bridge.remove_client(dead);
    }

    #[tokio::test]
    async fn stalled_client_is_pruned_after_timeout() {
        let bridge = BroadcastBridge::new(BroadcastConfig {
            history_capacity: 10,
            send_timeout: Duration::from_millis(20),
        });

        // capacity-1 channel that is never drained: the second ingest
        // cannot enqueue and must time out
        let (stalled_tx, _stalled_rx) = mpsc::channel(1);
        let (live_tx, mut live_rx) = mpsc::channel(8);
        bridge.register_client(stalled_tx);
        bridge.register_client(live_tx);

        bridge.ingest("t", b"1.0").await.unwrap();
        assert_eq!(bridge.client_count(), 2);

        bridge.ingest("t", b"2.0").await.unwrap();
        assert_eq!(bridge.client_count(), 1);

        assert!(live_rx.try_recv().is_ok());
        assert!(live_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn history_keeps_arrival_order_across_ingests() {
        let bridge = small_bridge();
        for i in 0..5 {
            bridge.ingest("t", format!("{i}").as_bytes()).await.unwrap();
        }

        let history = bridge.history();
        assert_eq!(history.len(), 5);
        for (i, r) in history.iter().enumerate() {
            assert_eq!(r.value, i as f64);
        }
    }

    #[tokio::test]
    async fn frame_is_the_bare_reading_object() {
        let bridge = small_bridge();
        let (tx, mut rx) = mpsc::channel(8);
        bridge.register_client(tx);

        bridge.ingest("/esp32/lidar/distance", b"7.5").await.unwrap();

        let frame = rx.try_recv().unwrap();
        let json: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert!(json.get("type").is_none(), "live frames carry no envelope");
        assert_eq!(json["value"], 7.5);
        assert_eq!(json["topic"], "/esp32/lidar/distance");
    }
}
