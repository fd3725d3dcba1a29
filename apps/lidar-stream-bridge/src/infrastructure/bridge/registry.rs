//! Streaming Client Registry
//!
//! Tracks the set of currently connected WebSocket clients. Each client is
//! represented by a handle wrapping the bounded channel that feeds its
//! connection task; delivery through a handle either succeeds, times out,
//! or observes a closed channel.
//!
//! Registration and removal race with in-progress broadcast passes, so the
//! map lives behind a lock and fan-out iterates an owned snapshot. The
//! lock is sync (`parking_lot`) and is never held across an await point.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;

/// Unique identifier for one streaming client connection.
pub type ClientId = u64;

/// Errors delivering a frame to one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// The client's channel was dropped (connection task exited).
    #[error("client channel closed")]
    Closed,

    /// The client's channel stayed full past the send deadline.
    #[error("send timed out")]
    TimedOut,
}

/// Handle to one streaming client: its identity plus the sending half of
/// the bounded channel drained by the client's connection task.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    id: ClientId,
    sender: mpsc::Sender<Arc<str>>,
}

impl ClientHandle {
    const fn new(id: ClientId, sender: mpsc::Sender<Arc<str>>) -> Self {
        Self { id, sender }
    }

    /// The client's identity.
    #[must_use]
    pub const fn id(&self) -> ClientId {
        self.id
    }

    /// Deliver one serialized frame, waiting at most `timeout` for
    /// channel capacity.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Closed` if the connection task has gone
    /// away, `DeliveryError::TimedOut` if the client could not drain its
    /// channel in time. Either way the caller should drop the client.
    pub async fn deliver(&self, frame: Arc<str>, timeout: Duration) -> Result<(), DeliveryError> {
        self.sender
            .send_timeout(frame, timeout)
            .await
            .map_err(|e| match e {
                SendTimeoutError::Closed(_) => DeliveryError::Closed,
                SendTimeoutError::Timeout(_) => DeliveryError::TimedOut,
            })
    }
}

/// Concurrent set of active streaming clients.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: RwLock<HashMap<ClientId, ClientHandle>>,
    next_id: AtomicU64,
}

impl ClientRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new client and return its allocated id.
    pub fn register(&self, sender: mpsc::Sender<Arc<str>>) -> ClientId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.clients.write().insert(id, ClientHandle::new(id, sender));
        id
    }

    /// Remove a client. Returns `true` if it was present; removing an
    /// already-removed client is a no-op.
    pub fn remove(&self, id: ClientId) -> bool {
        self.clients.write().remove(&id).is_some()
    }

    /// A stable view of the clients present at call time, for one
    /// fan-out pass. Adds and removes that race with the pass affect
    /// later passes only.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ClientHandle> {
        self.clients.read().values().cloned().collect()
    }

    /// Number of registered clients.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    /// Whether no clients are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> (mpsc::Sender<Arc<str>>, mpsc::Receiver<Arc<str>>) {
        mpsc::channel(8)
    }

    #[test]
    fn register_allocates_distinct_ids() {
        let registry = ClientRegistry::new();
        let (tx, _rx) = channel();

        let a = registry.register(tx.clone());
        let b = registry.register(tx);
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn remove_is_noop_when_absent() {
        let registry = ClientRegistry::new();
        let (tx, _rx) = channel();

        let id = registry.register(tx);
        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        assert!(registry.is_empty());
    }

    #[test]
    fn snapshot_is_stable_under_concurrent_mutation() {
        let registry = ClientRegistry::new();
        let (tx, _rx) = channel();

        let keep = registry.register(tx.clone());
        let gone = registry.register(tx.clone());

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);

        // Mutations racing with an in-progress pass touch later passes only.
        registry.remove(gone);
        registry.register(tx);

        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.iter().any(|h| h.id() == keep));
        assert!(snapshot.iter().any(|h| h.id() == gone));
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn deliver_reports_closed_channel() {
        let registry = ClientRegistry::new();
        let (tx, rx) = channel();
        let id = registry.register(tx);
        drop(rx);

        let handle = registry
            .snapshot()
            .into_iter()
            .find(|h| h.id() == id)
            .unwrap();
        let result = handle
            .deliver("{}".into(), Duration::from_millis(10))
            .await;
        assert_eq!(result, Err(DeliveryError::Closed));
    }

    #[tokio::test]
    async fn deliver_times_out_on_full_channel() {
        let registry = ClientRegistry::new();
        let (tx, _rx) = mpsc::channel::<Arc<str>>(1);
        tx.try_send("{}".into()).unwrap();
        registry.register(tx);

        let handle = registry.snapshot().pop().unwrap();
        let result = handle
            .deliver("{}".into(), Duration::from_millis(10))
            .await;
        assert_eq!(result, Err(DeliveryError::TimedOut));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_register_remove_never_panics() {
        let registry = Arc::new(ClientRegistry::new());

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let registry = Arc::clone(&registry);
            tasks.push(tokio::spawn(async move {
                for _ in 0..200 {
                    let (tx, _rx) = mpsc::channel::<Arc<str>>(1);
                    let id = registry.register(tx);
                    let _ = registry.snapshot();
                    registry.remove(id);
                }
            }));
        }

        for task in tasks {
            task.await.unwrap();
        }
        assert!(registry.is_empty());
    }
}
