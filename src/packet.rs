//! Packets exchanged between node actors.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::types::{HopBudget, NodeId};

/// A packet in flight between two nodes.
///
/// Packets are values: forwarding never mutates one, it builds a new packet
/// addressed to the next hop with one hop less to spend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Packet {
    /// Node that emitted the packet
    pub source_id: NodeId,
    /// Node the packet is addressed to
    pub target_id: NodeId,
    /// Wall-clock emission time
    pub timestamp: SystemTime,
    /// Forwards this packet may still undergo
    pub hops_remaining: HopBudget,
}

impl Packet {
    /// Creates the initial packet injected at `node`.
    ///
    /// Seed packets are addressed from a node to itself.
    pub fn seed(node: NodeId, hop_budget: HopBudget) -> Self {
        Self {
            source_id: node,
            target_id: node,
            timestamp: SystemTime::now(),
            hops_remaining: hop_budget,
        }
    }

    /// Builds the copy that `from` sends to `to`, or `None` once the budget is spent.
    pub fn forward(&self, from: NodeId, to: NodeId) -> Option<Packet> {
        let hops_remaining = self.hops_remaining.checked_sub(1)?;
        Some(Packet {
            source_id: from,
            target_id: to,
            timestamp: SystemTime::now(),
            hops_remaining,
        })
    }

    /// Returns true if the packet may not be forwarded any further.
    pub fn is_exhausted(&self) -> bool {
        self.hops_remaining == 0
    }

    /// Returns true if this is a seed packet.
    pub fn is_seed(&self) -> bool {
        self.source_id == self.target_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_packet() {
        let packet = Packet::seed(3, 2);
        assert_eq!(packet.source_id, 3);
        assert_eq!(packet.target_id, 3);
        assert!(packet.is_seed());
        assert!(!packet.is_exhausted());
    }

    #[test]
    fn test_forward_builds_new_packet() {
        let seed = Packet::seed(1, 1);
        let copy = seed.forward(1, 2).unwrap();

        assert_eq!(copy.source_id, 1);
        assert_eq!(copy.target_id, 2);
        assert_eq!(copy.hops_remaining, 0);
        assert!(copy.is_exhausted());
        assert!(copy.timestamp >= seed.timestamp);
        // The original is untouched.
        assert_eq!(seed.hops_remaining, 1);
        assert!(copy.forward(2, 1).is_none());
    }

    #[test]
    fn test_packet_serialization() {
        let packet = Packet::seed(5, 1);
        let json = serde_json::to_value(&packet).unwrap();
        assert_eq!(json["sourceId"], 5);
        assert_eq!(json["hopsRemaining"], 1);
    }
}
