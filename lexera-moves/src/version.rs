use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::{BoardSnapshot, Version};

/// Hands out version stamps for one board instance.
///
/// Every stamp is strictly greater than the snapshot it is taken against and
/// than every stamp issued before. Reset only on a full board reload.
#[derive(Debug, Default)]
pub struct VersionStamper {
    issued: AtomicU64,
}

impl VersionStamper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self, snapshot: &BoardSnapshot) -> Version {
        let floor = snapshot.version;
        match self
            .issued
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(last.max(floor) + 1)
            }) {
            Ok(prev) | Err(prev) => prev.max(floor) + 1,
        }
    }

    pub fn last_issued(&self) -> Version {
        self.issued.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.issued.store(0, Ordering::SeqCst);
    }
}
