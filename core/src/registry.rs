// Broadcast registry shared by every node of a bus
use std::collections::BTreeMap;
use std::sync::{OnceLock, PoisonError, RwLock};

use crate::{EdgeMask, NodeId};

#[derive(Debug, Default)]
struct Registrants {
    entries: BTreeMap<NodeId, EdgeMask>,
    generation: u64,
}

/// Nodes opted into broadcast reception, with their subscription masks.
///
/// The container is allocated on first registration and then kept for the
/// lifetime of the bus, even when it empties again.
#[derive(Debug, Default)]
pub(crate) struct BroadcastRegistry {
    inner: OnceLock<RwLock<Registrants>>,
}

/// Point-in-time copy of the registry taken before a broadcast fan-out.
pub(crate) struct RegistrySnapshot {
    pub(crate) entries: Vec<(NodeId, EdgeMask)>,
    pub(crate) generation: u64,
}

impl BroadcastRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn is_allocated(&self) -> bool {
        self.inner.get().is_some()
    }

    pub(crate) fn insert(&self, node: NodeId, mask: EdgeMask) {
        let lock = self.inner.get_or_init(Default::default);
        let mut reg = lock.write().unwrap_or_else(PoisonError::into_inner);
        if reg.entries.insert(node, mask).is_none() {
            reg.generation += 1;
        }
    }

    /// Removes `node`; tolerates the registry never having been allocated.
    pub(crate) fn remove(&self, node: NodeId) -> bool {
        let Some(lock) = self.inner.get() else {
            return false;
        };
        let mut reg = lock.write().unwrap_or_else(PoisonError::into_inner);
        let removed = reg.entries.remove(&node).is_some();
        if removed {
            reg.generation += 1;
        }
        removed
    }

    pub(crate) fn contains(&self, node: NodeId) -> bool {
        self.inner.get().is_some_and(|lock| {
            lock.read()
                .unwrap_or_else(PoisonError::into_inner)
                .entries
                .contains_key(&node)
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.get().map_or(0, |lock| {
            lock.read()
                .unwrap_or_else(PoisonError::into_inner)
                .entries
                .len()
        })
    }

    pub(crate) fn snapshot(&self) -> Option<RegistrySnapshot> {
        let lock = self.inner.get()?;
        let reg = lock.read().unwrap_or_else(PoisonError::into_inner);
        Some(RegistrySnapshot {
            entries: reg.entries.iter().map(|(id, mask)| (*id, *mask)).collect(),
            generation: reg.generation,
        })
    }

    /// Whether `node` may still receive a broadcast from a fan-out that
    /// started at `generation`. Membership is only looked up again when the
    /// registry changed since.
    pub(crate) fn still_registered(&self, node: NodeId, generation: u64) -> bool {
        let Some(lock) = self.inner.get() else {
            return false;
        };
        let reg = lock.read().unwrap_or_else(PoisonError::into_inner);
        reg.generation == generation || reg.entries.contains_key(&node)
    }

    pub(crate) fn clear(&self) {
        if let Some(lock) = self.inner.get() {
            let mut reg = lock.write().unwrap_or_else(PoisonError::into_inner);
            if !reg.entries.is_empty() {
                reg.entries.clear();
                reg.generation += 1;
            }
        }
    }
}
