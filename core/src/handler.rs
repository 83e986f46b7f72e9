// Receive callbacks injected per node
use crate::{Bus, Message, NodeId};

/// Callbacks a node runs when something reaches it.
///
/// Both callbacks run inline on the dispatching caller's stack. They get the
/// bus and their own id, so they may send, forward or rewire the graph
/// (including the edge currently being walked) without holding on to the bus.
#[cfg_attr(test, mockall::automock)]
pub trait MessageHandler: Send + Sync {
    /// Local delivery: a node this one listens to sent or forwarded `msg`,
    /// or `msg` was injected / forwarded directly here.
    fn on_message_received(&self, _bus: &Bus, _me: NodeId, _msg: &Message) {}

    /// Broadcast delivery: `msg` was sent anywhere on the bus and this node
    /// is registered for broadcasts.
    fn on_broadcast_received(&self, _bus: &Bus, _me: NodeId, _msg: &Message) {}
}

/// Handler that ignores everything; useful for pure relays and senders.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

impl MessageHandler for NoopHandler {}

/// Adapts a closure into a handler that treats local and broadcast
/// deliveries alike.
pub struct FnHandler<F> {
    f: F,
}

impl<F> MessageHandler for FnHandler<F>
where
    F: Fn(&Bus, NodeId, &Message) + Send + Sync,
{
    fn on_message_received(&self, bus: &Bus, me: NodeId, msg: &Message) {
        (self.f)(bus, me, msg)
    }

    fn on_broadcast_received(&self, bus: &Bus, me: NodeId, msg: &Message) {
        (self.f)(bus, me, msg)
    }
}

pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(&Bus, NodeId, &Message) + Send + Sync,
{
    FnHandler { f }
}
