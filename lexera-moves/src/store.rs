use std::sync::Arc;

use tokio::sync::watch;

use crate::types::BoardSnapshot;

/// Holder of the client's board. Reads and writes are whole snapshots, so a
/// reader never sees a half-applied move.
/// Implementations: MemoryStore, future: host-provided stores (UI caches, simulations).
pub trait BoardStore: Send + Sync {
    fn snapshot(&self) -> Arc<BoardSnapshot>;

    fn replace(&self, next: Arc<BoardSnapshot>);
}

/// In-process store that doubles as a change feed for renderers.
pub struct MemoryStore {
    tx: watch::Sender<Arc<BoardSnapshot>>,
}

impl MemoryStore {
    pub fn new(initial: BoardSnapshot) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(initial));
        Self { tx }
    }

    /// Receiver that sees every replaced snapshot (latest value wins).
    pub fn subscribe(&self) -> watch::Receiver<Arc<BoardSnapshot>> {
        self.tx.subscribe()
    }
}

impl BoardStore for MemoryStore {
    fn snapshot(&self) -> Arc<BoardSnapshot> {
        self.tx.borrow().clone()
    }

    fn replace(&self, next: Arc<BoardSnapshot>) {
        self.tx.send_replace(next);
    }
}
