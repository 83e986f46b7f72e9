// Message value carried through the bus
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::NodeId;

/// Reserved bit of the kind code used for internal forward bookkeeping.
///
/// Listener masks never carry it, so it can never make a message match.
pub const FORWARD_BIT: u64 = 1 << 63;

/// A message travelling between nodes.
///
/// `type_code` and `kind` are bitfields matched against the masks a
/// listener declared. The payload sits behind an `Arc`, so the working copy
/// made for every delivery is cheap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    type_code: u64,
    kind: u64,
    private: bool,
    sender: Option<NodeId>,
    forwarder: Option<NodeId>,
    payload: Arc<Value>,
}

impl Message {
    pub fn new(type_code: u64, kind: u64) -> Self {
        Self {
            type_code,
            kind,
            private: false,
            sender: None,
            forwarder: None,
            payload: Arc::new(Value::Null),
        }
    }

    /// Marks the message private: it may be sent but never forwarded.
    pub fn private(mut self) -> Self {
        self.private = true;
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Arc::new(payload);
        self
    }

    pub fn type_code(&self) -> u64 {
        self.type_code
    }

    pub fn kind(&self) -> u64 {
        self.kind
    }

    pub fn is_private(&self) -> bool {
        self.private
    }

    /// A message without a type code carries no type tag and cannot be dispatched.
    pub fn has_type(&self) -> bool {
        self.type_code != 0
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn sender(&self) -> Option<NodeId> {
        self.sender
    }

    pub fn set_sender(&mut self, sender: NodeId) {
        self.sender = Some(sender);
    }

    pub fn forwarder(&self) -> Option<NodeId> {
        self.forwarder
    }

    pub fn set_forwarder(&mut self, forwarder: NodeId) {
        self.forwarder = Some(forwarder);
    }

    /// True if `node` is recorded as either sender or forwarder.
    pub(crate) fn touched_by(&self, node: NodeId) -> bool {
        self.sender == Some(node) || self.forwarder == Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_sets_fields() {
        let msg = Message::new(0b10, 0x4)
            .private()
            .with_payload(json!({"reading": 42}));
        assert_eq!(msg.type_code(), 0b10);
        assert_eq!(msg.kind(), 0x4);
        assert!(msg.is_private());
        assert!(msg.has_type());
        assert_eq!(msg.payload()["reading"], 42);
        assert_eq!(msg.sender(), None);
        assert_eq!(msg.forwarder(), None);
    }

    #[test]
    fn untyped_message_has_no_type() {
        assert!(!Message::new(0, 1).has_type());
    }

    #[test]
    fn clones_share_payload() {
        let msg = Message::new(1, 1).with_payload(json!("shared"));
        let copy = msg.clone();
        assert!(Arc::ptr_eq(&msg.payload, &copy.payload));
    }
}
