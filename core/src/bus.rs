// Dispatch engine: listener graph, fan-out, blocking gates and broadcast registry
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info, trace, warn};

use crate::ids::IdAllocator;
use crate::node::NodeState;
use crate::registry::BroadcastRegistry;
use crate::stats::Counters;
use crate::{BusConfig, BusError, BusStats, EdgeMask, Message, MessageHandler, Node, NodeId, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Channel {
    Local,
    Broadcast,
}

struct BusShared {
    config: BusConfig,
    ids: IdAllocator,
    nodes: DashMap<NodeId, NodeState>,
    registry: BroadcastRegistry,
    global_block: AtomicI64,
    counters: Counters,
    shut_down: AtomicBool,
}

/// Shared context every node of one message bus lives in.
///
/// Cloning is cheap and yields another handle to the same bus. Nodes are
/// addressed by [`NodeId`]; operations naming an id that is not (or no
/// longer) on the bus are silent no-ops.
///
/// Dispatch is synchronous: `send`, `forward`, `forward_to` and `inject` run
/// every callback inline before returning. No internal lock is held while a
/// callback runs, so callbacks may freely re-enter the bus.
///
/// Listeners and broadcast registrants are visited in ascending [`NodeId`]
/// order, i.e. node creation order. Local fan-out runs before broadcast
/// fan-out.
///
/// Both fan-outs walk a point-in-time copy: of the sender's listeners, and of
/// the broadcast registry. When a callback changes either set mid-dispatch,
/// its generation moves and each remaining entry is re-checked against the
/// live set, so a listener or registrant removed (or destroyed) during the
/// fan-out is skipped, and one added during it is not reached until the next
/// dispatch.
#[derive(Clone)]
pub struct Bus {
    shared: Arc<BusShared>,
}

impl Bus {
    pub fn new() -> Self {
        Self::with_config(BusConfig::default())
    }

    pub fn with_config(config: BusConfig) -> Self {
        info!(bus = %config.name, "Message bus created");
        Self {
            shared: Arc::new(BusShared {
                config,
                ids: IdAllocator::new(),
                nodes: DashMap::new(),
                registry: BroadcastRegistry::new(),
                global_block: AtomicI64::new(0),
                counters: Counters::default(),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &BusConfig {
        &self.shared.config
    }

    /// Adds a node with no edges, not receiving broadcasts and unblocked.
    pub fn create_node<H>(&self, handler: H) -> Result<Node>
    where
        H: MessageHandler + 'static,
    {
        self.create_node_with(Arc::new(handler))
    }

    pub fn create_node_with(&self, handler: Arc<dyn MessageHandler>) -> Result<Node> {
        if self.shared.shut_down.load(Ordering::Acquire) {
            return Err(BusError::ShutDown);
        }
        let id = self.shared.ids.allocate();
        self.shared.nodes.insert(id, NodeState::new(handler));
        debug!(bus = %self.shared.config.name, node = %id, "Node created");
        Ok(Node::new(self.clone(), id))
    }

    // ------------------------------------------------------------------
    // Listener graph
    // ------------------------------------------------------------------

    /// Makes `me` listen to `other`.
    ///
    /// The first registration wins: if the edge already exists the call is
    /// ignored, whatever masks it carries.
    pub fn listen_to(&self, me: NodeId, other: NodeId, type_mask: u64, message_mask: u64) {
        self.connect(me, other, EdgeMask::new(type_mask, message_mask));
    }

    /// Like [`listen_to`](Self::listen_to) with the configured default masks.
    pub fn listen_to_all(&self, me: NodeId, other: NodeId) {
        self.connect(me, other, self.shared.config.default_mask());
    }

    fn connect(&self, me: NodeId, other: NodeId, mask: EdgeMask) {
        if !self.contains(other) {
            self.unknown_node("listen_to", other);
            return;
        }
        {
            let Some(mut node) = self.shared.nodes.get_mut(&me) else {
                self.unknown_node("listen_to", me);
                return;
            };
            let listening = node.listening_to.get_or_insert_with(BTreeMap::new);
            if listening.contains_key(&other) {
                return;
            }
            listening.insert(other, mask);
        }
        if let Some(mut target) = self.shared.nodes.get_mut(&other) {
            target.add_listener(me, mask);
        }
        debug!(
            bus = %self.shared.config.name,
            node = %me,
            target = %other,
            type_mask = mask.type_mask(),
            message_mask = mask.message_mask(),
            "Listening"
        );
    }

    /// Removes the edge `me -> other` on both sides; no-op if there is none.
    pub fn disconnect_from(&self, me: NodeId, other: NodeId) {
        let removed = self.shared.nodes.get_mut(&me).is_some_and(|mut node| {
            node.listening_to
                .as_mut()
                .is_some_and(|l| l.remove(&other).is_some())
        });
        if !removed {
            return;
        }
        if let Some(mut target) = self.shared.nodes.get_mut(&other) {
            target.remove_listener(me);
        }
        debug!(bus = %self.shared.config.name, node = %me, target = %other, "Disconnected");
    }

    /// Removes every outgoing edge of `me`.
    pub fn disconnect_from_all(&self, me: NodeId) {
        let targets = self
            .shared
            .nodes
            .get_mut(&me)
            .and_then(|mut node| node.listening_to.as_mut().map(std::mem::take));
        let Some(targets) = targets else {
            return;
        };
        for other in targets.into_keys() {
            if let Some(mut target) = self.shared.nodes.get_mut(&other) {
                target.remove_listener(me);
            }
        }
        debug!(bus = %self.shared.config.name, node = %me, "Disconnected from all");
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    /// Sends `msg` from `from` to its listeners, then to every broadcast
    /// registrant.
    ///
    /// Listeners equal to the incoming message's sender are skipped;
    /// broadcast registrants are not. The caller's message is never touched:
    /// receivers get a copy stamped with `from` as sender.
    pub fn send(&self, from: NodeId, msg: &Message) {
        let snapshot = {
            let Some(node) = self.shared.nodes.get(&from) else {
                self.unknown_node("send", from);
                return;
            };
            if self.is_blocked(&node) {
                drop(node);
                self.count_blocked(from);
                return;
            }
            node.listener_snapshot()
        };
        if snapshot.is_none() && !self.shared.registry.is_allocated() {
            return;
        }

        let stamped = stamp(msg, |m| m.set_sender(from));
        self.shared.counters.sent();

        if let Some(snapshot) = snapshot {
            for (listener, mask) in snapshot.entries {
                if !self.still_listening(from, listener, snapshot.generation) {
                    continue;
                }
                if msg.sender() == Some(listener) {
                    continue;
                }
                self.deliver(listener, mask, &stamped, Channel::Local);
            }
        }

        if let Some(registrants) = self.shared.registry.snapshot() {
            for (receiver, mask) in registrants.entries {
                if !self
                    .shared
                    .registry
                    .still_registered(receiver, registrants.generation)
                {
                    continue;
                }
                self.deliver(receiver, mask, &stamped, Channel::Broadcast);
            }
        }
    }

    /// Re-emits a received message to the listeners of `from` only.
    ///
    /// Private messages, messages already sent and forwarded by `from`, and
    /// nodes without listeners are ignored. Listeners equal to the incoming
    /// sender or forwarder are skipped. Nothing is broadcast.
    pub fn forward(&self, from: NodeId, msg: &Message) {
        if msg.is_private() {
            return;
        }
        let snapshot = {
            let Some(node) = self.shared.nodes.get(&from) else {
                self.unknown_node("forward", from);
                return;
            };
            if !node.has_listeners() || is_self_loop(msg, from) {
                return;
            }
            if self.is_blocked(&node) {
                drop(node);
                self.count_blocked(from);
                return;
            }
            node.listener_snapshot()
        };
        let Some(snapshot) = snapshot else {
            return;
        };

        let stamped = stamp(msg, |m| m.set_forwarder(from));
        self.shared.counters.sent();

        for (listener, mask) in snapshot.entries {
            if !self.still_listening(from, listener, snapshot.generation) {
                continue;
            }
            if msg.touched_by(listener) {
                continue;
            }
            self.deliver(listener, mask, &stamped, Channel::Local);
        }
    }

    /// Forwards `msg` straight to `to`, bypassing the graph and every mask.
    pub fn forward_to(&self, from: NodeId, to: NodeId, msg: &Message) {
        if msg.is_private() || is_self_loop(msg, from) {
            return;
        }
        let blocked = match self.shared.nodes.get(&from) {
            Some(node) => self.is_blocked(&node),
            None => {
                self.unknown_node("forward_to", from);
                return;
            }
        };
        if blocked {
            self.count_blocked(from);
            return;
        }
        let Some(handler) = self.handler_of(to) else {
            self.unknown_node("forward_to", to);
            return;
        };

        let stamped = stamp(msg, |m| m.set_forwarder(from));
        self.shared.counters.sent();
        self.shared.counters.received();
        trace!(bus = %self.shared.config.name, node = %from, target = %to, "Forwarded directly");
        handler.on_message_received(self, to, &stamped);
    }

    /// Delivers `msg` to `node`'s own receive callback as if it came from
    /// outside the graph.
    pub fn inject(&self, node: NodeId, msg: &Message) {
        let handler = {
            let Some(state) = self.shared.nodes.get(&node) else {
                self.unknown_node("inject", node);
                return;
            };
            if self.is_blocked(&state) {
                drop(state);
                self.count_blocked(node);
                return;
            }
            Arc::clone(&state.handler)
        };

        let stamped = stamp(msg, |m| m.set_sender(node));
        self.shared.counters.sent();
        self.shared.counters.received();
        trace!(bus = %self.shared.config.name, node = %node, "Injected");
        handler.on_message_received(self, node, &stamped);
    }

    fn deliver(&self, to: NodeId, mask: EdgeMask, msg: &Message, channel: Channel) {
        let Some(handler) = self.handler_of(to) else {
            return;
        };
        if !mask.accepts(msg) {
            self.shared.counters.filtered();
            trace!(bus = %self.shared.config.name, node = %to, ?channel, "Filtered");
            return;
        }
        self.shared.counters.received();
        trace!(bus = %self.shared.config.name, node = %to, ?channel, "Delivering");
        match channel {
            Channel::Local => handler.on_message_received(self, to, msg),
            Channel::Broadcast => handler.on_broadcast_received(self, to, msg),
        }
    }

    fn handler_of(&self, node: NodeId) -> Option<Arc<dyn MessageHandler>> {
        self.shared
            .nodes
            .get(&node)
            .map(|state| Arc::clone(&state.handler))
    }

    fn still_listening(&self, owner: NodeId, listener: NodeId, generation: u64) -> bool {
        self.shared
            .nodes
            .get(&owner)
            .is_some_and(|state| state.still_listening(listener, generation))
    }

    // ------------------------------------------------------------------
    // Blocking gates
    // ------------------------------------------------------------------

    /// Nests the bus-wide gate: every `true` must be matched by a `false`.
    ///
    /// # Panics
    ///
    /// When more `false` than `true` calls were made.
    pub fn block_all_messages(&self, yes: bool) {
        let delta = if yes { 1 } else { -1 };
        let depth = self.shared.global_block.fetch_add(delta, Ordering::AcqRel) + delta;
        assert!(depth >= 0, "bus-wide block depth went negative");
        debug!(bus = %self.shared.config.name, depth, "Bus-wide block depth changed");
    }

    pub fn are_all_messages_blocked(&self) -> bool {
        self.shared.global_block.load(Ordering::Acquire) != 0
    }

    /// Nests the gate of a single node.
    ///
    /// # Panics
    ///
    /// When more `false` than `true` calls were made for `node`.
    pub fn block_messages(&self, node: NodeId, yes: bool) {
        let depth = match self.shared.nodes.get_mut(&node) {
            Some(mut state) => {
                state.block_depth += if yes { 1 } else { -1 };
                state.block_depth
            }
            None => {
                self.unknown_node("block_messages", node);
                return;
            }
        };
        assert!(depth >= 0, "block depth of {node} went negative");
    }

    /// True when either gate suppresses dispatch from `node`.
    pub fn are_messages_blocked(&self, node: NodeId) -> bool {
        self.shared
            .nodes
            .get(&node)
            .is_some_and(|state| self.is_blocked(&state))
    }

    fn is_blocked(&self, state: &NodeState) -> bool {
        self.shared.global_block.load(Ordering::Acquire) + state.block_depth != 0
    }

    fn count_blocked(&self, node: NodeId) {
        self.shared.counters.blocked();
        trace!(bus = %self.shared.config.name, node = %node, "Blocked");
    }

    // ------------------------------------------------------------------
    // Broadcast registration
    // ------------------------------------------------------------------

    /// Opts `node` in or out of broadcast reception. Only an actual state
    /// change has an effect; masks of a redundant enable are ignored.
    pub fn set_receives_broadcasts(&self, node: NodeId, yes: bool, type_mask: u64, message_mask: u64) {
        let changed = match self.shared.nodes.get_mut(&node) {
            Some(mut state) => {
                let changed = state.receiving_broadcasts != yes;
                state.receiving_broadcasts = yes;
                changed
            }
            None => {
                self.unknown_node("set_receives_broadcasts", node);
                return;
            }
        };
        if !changed {
            return;
        }
        if yes {
            self.shared
                .registry
                .insert(node, EdgeMask::new(type_mask, message_mask));
        } else {
            self.shared.registry.remove(node);
        }
        debug!(bus = %self.shared.config.name, node = %node, receiving = yes, "Broadcast reception changed");
    }

    /// Like [`set_receives_broadcasts`](Self::set_receives_broadcasts) with
    /// the configured default masks.
    pub fn set_receives_all_broadcasts(&self, node: NodeId, yes: bool) {
        let mask = self.shared.config.default_mask();
        self.set_receives_broadcasts(node, yes, mask.type_mask(), mask.message_mask());
    }

    pub fn is_receiving_broadcasts(&self, node: NodeId) -> bool {
        self.shared
            .nodes
            .get(&node)
            .is_some_and(|state| state.receiving_broadcasts)
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    pub fn contains(&self, node: NodeId) -> bool {
        self.shared.nodes.contains_key(&node)
    }

    pub fn node_count(&self) -> usize {
        self.shared.nodes.len()
    }

    /// Outgoing edges of `node`, in id order.
    pub fn listening_to(&self, node: NodeId) -> Vec<(NodeId, EdgeMask)> {
        self.shared
            .nodes
            .get(&node)
            .and_then(|state| {
                state
                    .listening_to
                    .as_ref()
                    .map(|l| l.iter().map(|(id, mask)| (*id, *mask)).collect())
            })
            .unwrap_or_default()
    }

    /// Nodes listening to `node`, in id order.
    pub fn listeners(&self, node: NodeId) -> Vec<(NodeId, EdgeMask)> {
        self.shared
            .nodes
            .get(&node)
            .and_then(|state| state.listener_snapshot())
            .map(|snap| snap.entries)
            .unwrap_or_default()
    }

    /// Mask of the edge `from -> to`, if `from` listens to `to`.
    pub fn edge(&self, from: NodeId, to: NodeId) -> Option<EdgeMask> {
        self.shared
            .nodes
            .get(&from)
            .and_then(|state| state.listening_to.as_ref()?.get(&to).copied())
    }

    pub fn stats(&self) -> BusStats {
        self.shared
            .counters
            .snapshot(self.shared.nodes.len(), self.shared.registry.len())
    }

    /// Print counters to log
    pub fn log_stats(&self) {
        let stats = self.stats();
        info!("=== Bus {} ===", self.shared.config.name);
        info!("Sent: {}", stats.sent);
        info!("Received: {}", stats.received);
        info!("Blocked: {}", stats.blocked);
        info!("Filtered: {}", stats.filtered);
        info!("Nodes: {}", stats.nodes);
        info!("Broadcast receivers: {}", stats.broadcast_receivers);
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Tears down every remaining node and refuses new ones.
    ///
    /// Outstanding [`Node`] handles stay valid to drop; their operations
    /// become no-ops.
    pub fn shutdown(&self) {
        if self.shared.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(bus = %self.shared.config.name, "Message bus shutting down");
        let ids: Vec<NodeId> = self.shared.nodes.iter().map(|e| *e.key()).collect();
        for id in ids {
            self.destroy(id);
        }
        self.shared.registry.clear();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.shut_down.load(Ordering::Acquire)
    }

    /// Removes `node` and every edge touching it.
    pub(crate) fn destroy(&self, node: NodeId) {
        if !self.contains(node) {
            return;
        }
        self.disconnect_from_all(node);

        let listeners = self.shared.nodes.get_mut(&node).and_then(|mut state| {
            state.listeners_generation += 1;
            state.listeners.take()
        });
        for listener in listeners.into_iter().flat_map(BTreeMap::into_keys) {
            if let Some(mut state) = self.shared.nodes.get_mut(&listener) {
                if let Some(listening) = state.listening_to.as_mut() {
                    listening.remove(&node);
                }
            }
        }

        self.set_receives_broadcasts(node, false, 0, 0);
        debug_assert!(!self.shared.registry.contains(node));
        self.shared.nodes.remove(&node);
        debug!(bus = %self.shared.config.name, node = %node, "Node destroyed");
    }

    fn unknown_node(&self, op: &str, node: NodeId) {
        if self.shared.config.warn_on_unknown_node {
            warn!(bus = %self.shared.config.name, node = %node, op, "Unknown node");
        } else {
            debug!(bus = %self.shared.config.name, node = %node, op, "Unknown node");
        }
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bus")
            .field("name", &self.shared.config.name)
            .field("nodes", &self.shared.nodes.len())
            .field("broadcast_receivers", &self.shared.registry.len())
            .finish()
    }
}

fn is_self_loop(msg: &Message, node: NodeId) -> bool {
    msg.sender() == Some(node) && msg.forwarder() == Some(node)
}

/// Private working copy of `msg` with provenance applied.
fn stamp(msg: &Message, apply: impl FnOnce(&mut Message)) -> Message {
    assert!(
        msg.has_type(),
        "message without a type code cannot be dispatched"
    );
    let mut copy = msg.clone();
    apply(&mut copy);
    copy
}
