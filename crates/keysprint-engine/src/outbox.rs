//! Per-participant delivery handle.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

/// A capability to enqueue one outbound frame for a participant.
///
/// The game holds an `Outbox` per roster entry; the connection task owns the
/// receiving half and drains it into the socket. Delivery is `try_send`, so
/// a stalled or disconnected peer can never block a broadcasting task — it
/// just accumulates drops and gets pruned from the roster.
#[derive(Debug)]
pub struct Outbox {
    tx: mpsc::Sender<Arc<String>>,
    dropped: AtomicU64,
}

impl Outbox {
    /// Wrap the sending half of a connection's outbound channel.
    pub fn new(tx: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            tx,
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueue a frame without waiting.
    ///
    /// Returns `false` (and counts a drop) if the channel is full or the
    /// receiving task is gone.
    pub fn send(&self, frame: Arc<String>) -> bool {
        if self.tx.try_send(frame).is_ok() {
            true
        } else {
            let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Total frames dropped on this handle.
    pub fn drop_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Whether the receiving task has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
