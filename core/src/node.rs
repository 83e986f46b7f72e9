// Per-node state and the owning node handle
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::{Bus, EdgeMask, Message, MessageHandler, NodeId};

/// Arena slot of one node.
///
/// `listeners` is a back-reference maintained by the nodes listening to this
/// one; it never owns them. `listeners_generation` advances on every
/// structural change of `listeners` so an in-flight fan-out can tell whether
/// its snapshot is still trustworthy.
pub(crate) struct NodeState {
    pub(crate) listening_to: Option<BTreeMap<NodeId, EdgeMask>>,
    pub(crate) listeners: Option<BTreeMap<NodeId, EdgeMask>>,
    pub(crate) listeners_generation: u64,
    pub(crate) receiving_broadcasts: bool,
    pub(crate) block_depth: i64,
    pub(crate) handler: Arc<dyn MessageHandler>,
}

/// Point-in-time copy of a node's listeners.
pub(crate) struct ListenerSnapshot {
    pub(crate) entries: Vec<(NodeId, EdgeMask)>,
    pub(crate) generation: u64,
}

impl NodeState {
    pub(crate) fn new(handler: Arc<dyn MessageHandler>) -> Self {
        Self {
            listening_to: None,
            listeners: None,
            listeners_generation: 0,
            receiving_broadcasts: false,
            block_depth: 0,
            handler,
        }
    }

    pub(crate) fn has_listeners(&self) -> bool {
        self.listeners.as_ref().is_some_and(|l| !l.is_empty())
    }

    pub(crate) fn listener_snapshot(&self) -> Option<ListenerSnapshot> {
        self.listeners.as_ref().map(|l| ListenerSnapshot {
            entries: l.iter().map(|(id, mask)| (*id, *mask)).collect(),
            generation: self.listeners_generation,
        })
    }

    pub(crate) fn add_listener(&mut self, listener: NodeId, mask: EdgeMask) {
        self.listeners
            .get_or_insert_with(BTreeMap::new)
            .insert(listener, mask);
        self.listeners_generation += 1;
    }

    pub(crate) fn remove_listener(&mut self, listener: NodeId) -> bool {
        let removed = self
            .listeners
            .as_mut()
            .is_some_and(|l| l.remove(&listener).is_some());
        if removed {
            self.listeners_generation += 1;
        }
        removed
    }

    /// Whether `listener` may still be delivered to by a fan-out whose
    /// snapshot was taken at `generation`.
    pub(crate) fn still_listening(&self, listener: NodeId, generation: u64) -> bool {
        self.listeners_generation == generation
            || self
                .listeners
                .as_ref()
                .is_some_and(|l| l.contains_key(&listener))
    }
}

/// Owning handle of a node on a [`Bus`].
///
/// Every method forwards to the bus with this node's id. Dropping the handle
/// tears the node down: it stops listening to everything, every node
/// listening to it drops its edge, and it leaves the broadcast registry.
pub struct Node {
    bus: Bus,
    id: NodeId,
}

impl Node {
    pub(crate) fn new(bus: Bus, id: NodeId) -> Self {
        Self { bus, id }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn listen_to(&self, other: NodeId, type_mask: u64, message_mask: u64) {
        self.bus.listen_to(self.id, other, type_mask, message_mask)
    }

    pub fn listen_to_all(&self, other: NodeId) {
        self.bus.listen_to_all(self.id, other)
    }

    pub fn disconnect_from(&self, other: NodeId) {
        self.bus.disconnect_from(self.id, other)
    }

    pub fn disconnect_from_all(&self) {
        self.bus.disconnect_from_all(self.id)
    }

    pub fn send(&self, msg: &Message) {
        self.bus.send(self.id, msg)
    }

    pub fn forward(&self, msg: &Message) {
        self.bus.forward(self.id, msg)
    }

    pub fn forward_to(&self, to: NodeId, msg: &Message) {
        self.bus.forward_to(self.id, to, msg)
    }

    pub fn inject(&self, msg: &Message) {
        self.bus.inject(self.id, msg)
    }

    pub fn block_messages(&self, yes: bool) {
        self.bus.block_messages(self.id, yes)
    }

    pub fn are_messages_blocked(&self) -> bool {
        self.bus.are_messages_blocked(self.id)
    }

    pub fn set_receives_broadcasts(&self, yes: bool, type_mask: u64, message_mask: u64) {
        self.bus
            .set_receives_broadcasts(self.id, yes, type_mask, message_mask)
    }

    pub fn set_receives_all_broadcasts(&self, yes: bool) {
        self.bus.set_receives_all_broadcasts(self.id, yes)
    }

    pub fn is_receiving_broadcasts(&self) -> bool {
        self.bus.is_receiving_broadcasts(self.id)
    }

    pub fn listening_to(&self) -> Vec<(NodeId, EdgeMask)> {
        self.bus.listening_to(self.id)
    }

    pub fn listeners(&self) -> Vec<(NodeId, EdgeMask)> {
        self.bus.listeners(self.id)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node").field("id", &self.id).finish()
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.bus.destroy(self.id);
    }
}
