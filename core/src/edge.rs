use serde::{Deserialize, Serialize};

use crate::message::{Message, FORWARD_BIT};

/// Filter pair attached to a listens-to edge or a broadcast registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeMask {
    type_mask: u64,
    message_mask: u64,
}

impl EdgeMask {
    /// Accepts every type and every kind.
    pub const ALL: EdgeMask = EdgeMask {
        type_mask: !0,
        message_mask: !FORWARD_BIT,
    };

    /// Builds a mask pair. The forward bit is always stripped from `message_mask`.
    pub fn new(type_mask: u64, message_mask: u64) -> Self {
        Self {
            type_mask,
            message_mask: message_mask & !FORWARD_BIT,
        }
    }

    pub fn type_mask(&self) -> u64 {
        self.type_mask
    }

    pub fn message_mask(&self) -> u64 {
        self.message_mask
    }

    /// A message passes iff both its type and its kind intersect the masks.
    pub fn accepts(&self, msg: &Message) -> bool {
        (msg.type_code() & self.type_mask) != 0 && (msg.kind() & self.message_mask) != 0
    }
}

impl Default for EdgeMask {
    fn default() -> Self {
        Self::ALL
    }
}
