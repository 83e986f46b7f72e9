// Dispatch counters
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Snapshot of a bus's counters and gauges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusStats {
    pub sent: u64,
    pub received: u64,
    pub blocked: u64,
    pub filtered: u64,
    pub nodes: usize,
    pub broadcast_receivers: usize,
}

/// Monotonic counters; never reset while the bus lives.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    sent: AtomicU64,
    received: AtomicU64,
    blocked: AtomicU64,
    filtered: AtomicU64,
}

impl Counters {
    pub(crate) fn sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn blocked(&self) {
        self.blocked.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn filtered(&self) {
        self.filtered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, nodes: usize, broadcast_receivers: usize) -> BusStats {
        BusStats {
            sent: self.sent.load(Ordering::Relaxed),
            received: self.received.load(Ordering::Relaxed),
            blocked: self.blocked.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            nodes,
            broadcast_receivers,
        }
    }
}
