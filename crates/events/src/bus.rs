//! In-process commit event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`CommitBus`] is the feed the persistence layer pushes completed units of
//! work into. It is designed to be shared via `Arc<CommitBus>` across the
//! host application; the trigger worker subscribes on the other end.

use tokio::sync::broadcast;

use deskflow_core::record::Commit;

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out bus for [`Commit`] events.
///
/// Wraps a [`broadcast::Sender`] so that any number of subscribers can
/// independently receive every published commit.
pub struct CommitBus {
    sender: broadcast::Sender<Commit>,
}

impl CommitBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed commits are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish a commit to all current subscribers.
    ///
    /// If there are no active subscribers the commit is silently dropped.
    pub fn publish(&self, commit: Commit) {
        // Ignore the SendError — it only means there are zero receivers.
        let _ = self.sender.send(commit);
    }

    /// Subscribe to all commits published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<Commit> {
        self.sender.subscribe()
    }
}

impl Default for CommitBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
