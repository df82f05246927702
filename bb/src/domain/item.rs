//! Buffer payload

use serde::{Deserialize, Serialize};

use super::id::ActorId;

/// An item placed in the buffer, tagged with the producer that made it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Producer that generated the item
    pub producer: ActorId,
    /// Run-wide sequence number (1-based) so individual items can be traced
    pub seq: u64,
}

impl Item {
    pub fn new(producer: ActorId, seq: u64) -> Self {
        Self { producer, seq }
    }
}

impl std::fmt::Display for Item {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.producer, self.seq)
    }
}
