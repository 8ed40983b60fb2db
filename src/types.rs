//! Core type definitions for the simulation framework.
//!
//! This module defines the fundamental identifiers shared by the topology
//! model, the dispatch fabric and the run report.

use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a node (bridge) in the topology.
///
/// Identifiers come straight from the ingress envelope, which uses plain
/// signed integers.
pub type NodeId = i64;

/// Port label, unique within its owning node.
pub type PortNumber = i64;

/// Number of forwards a packet may still undergo before it is dropped.
pub type HopBudget = u32;

/// Process-unique identifier of one simulation session.
///
/// Used to tag tracing spans and reports so that concurrent sessions can be
/// told apart.
pub type SessionId = u64;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Allocates a fresh session identifier.
pub fn next_session_id() -> SessionId {
    NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_aliases() {
        let node: NodeId = -7;
        let port: PortNumber = 3;
        let budget: HopBudget = 4;

        assert_eq!(node, -7);
        assert_eq!(port, 3);
        assert_eq!(budget, 4);
    }

    #[test]
    fn test_session_ids_are_unique() {
        let a = next_session_id();
        let b = next_session_id();
        assert_ne!(a, b);
        assert!(b > a);
    }
}
