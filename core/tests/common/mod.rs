//! Shared helpers for integration tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use switchboard_core::{Bus, Message, MessageHandler, NodeId};

/// One callback invocation seen by a [`Recorder`].
#[derive(Debug, Clone)]
pub struct Delivery {
    pub node: NodeId,
    pub broadcast: bool,
    pub msg: Message,
}

/// Handler that logs every delivery; clones share the same log so one
/// recorder can back many nodes.
#[derive(Clone, Default)]
pub struct Recorder {
    log: Arc<Mutex<Vec<Delivery>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.log.lock().unwrap().clone()
    }

    pub fn received_by(&self, node: NodeId) -> Vec<Delivery> {
        self.deliveries()
            .into_iter()
            .filter(|d| d.node == node)
            .collect()
    }

    pub fn count_for(&self, node: NodeId) -> usize {
        self.received_by(node).len()
    }

    pub fn order(&self) -> Vec<NodeId> {
        self.deliveries().iter().map(|d| d.node).collect()
    }

    fn push(&self, node: NodeId, broadcast: bool, msg: &Message) {
        self.log.lock().unwrap().push(Delivery {
            node,
            broadcast,
            msg: msg.clone(),
        });
    }
}

impl MessageHandler for Recorder {
    fn on_message_received(&self, _bus: &Bus, me: NodeId, msg: &Message) {
        self.push(me, false, msg);
    }

    fn on_broadcast_received(&self, _bus: &Bus, me: NodeId, msg: &Message) {
        self.push(me, true, msg);
    }
}

/// Handler that records like [`Recorder`] and then runs a hook, used to
/// mutate the bus from inside a delivery.
pub struct Hooked<F> {
    pub recorder: Recorder,
    pub hook: F,
}

impl<F> MessageHandler for Hooked<F>
where
    F: Fn(&Bus, NodeId, &Message) + Send + Sync,
{
    fn on_message_received(&self, bus: &Bus, me: NodeId, msg: &Message) {
        self.recorder.on_message_received(bus, me, msg);
        (self.hook)(bus, me, msg);
    }

    fn on_broadcast_received(&self, bus: &Bus, me: NodeId, msg: &Message) {
        self.recorder.on_broadcast_received(bus, me, msg);
        (self.hook)(bus, me, msg);
    }
}

/// Message with every type and kind bit a default listener accepts.
pub fn msg() -> Message {
    Message::new(1, 1)
}
