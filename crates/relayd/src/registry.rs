use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

/// Process-unique identifier assigned to a connection at accept time.
pub type ConnId = u64;

/// Handle held in the registry — used to deliver messages to a connection.
#[derive(Clone, Debug)]
pub struct ConnHandle {
    /// Identifier assigned at accept time.
    pub id: ConnId,
    /// Channel sender feeding this connection's outbound WebSocket task.
    pub tx: mpsc::Sender<Message>,
}

/// Outcome of one broadcast fan-out.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastSummary {
    /// Connections whose outbound queue accepted the message.
    pub delivered: usize,
    /// Connections skipped because their outbound queue was full.
    pub dropped_full: usize,
    /// Connections found dead (receiver gone) and evicted.
    pub dropped_closed: usize,
}

/// Concurrent set of currently open connections.
///
/// Invariant: a connection appears here iff it is open. Entries are
/// inserted only by the accept path and removed only by the close/error
/// path (or lazily by [`Registry::broadcast`] when a receiver is found
/// dead). Broadcast iterates a snapshot and never blocks on a receiver.
#[derive(Debug, Default)]
pub struct Registry {
    conns: DashMap<ConnId, ConnHandle>,
    next_id: AtomicU64,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly accepted connection and return its identifier.
    pub fn insert(&self, tx: mpsc::Sender<Message>) -> ConnId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.conns.insert(id, ConnHandle { id, tx });
        id
    }

    /// Remove a connection, returning its handle if it was present.
    pub fn remove(&self, id: ConnId) -> Option<ConnHandle> {
        self.conns.remove(&id).map(|(_, handle)| handle)
    }

    /// Deliver a message to every open connection, the sender included.
    ///
    /// Fire-and-forget per recipient: a full queue drops the message for
    /// that connection only, and a closed receiver is evicted. Neither
    /// failure aborts the remaining deliveries or reaches the sender.
    pub fn broadcast(&self, message: &Message) -> BroadcastSummary {
        let mut summary = BroadcastSummary::default();
        let mut dead = Vec::new();
        for entry in self.conns.iter() {
            match entry.value().tx.try_send(message.clone()) {
                Ok(()) => summary.delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => summary.dropped_full += 1,
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    summary.dropped_closed += 1;
                    dead.push(*entry.key());
                }
            }
        }
        // Evict after iterating; removing mid-iteration would contend on
        // the same shard locks.
        for id in dead {
            self.conns.remove(&id);
        }
        summary
    }

    /// Number of open connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.conns.len()
    }

    /// Returns `true` if no connections are open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }
}
