//! Observation events emitted during a simulation run.
//!
//! Events are the live view of a run: callers that ask for them through
//! [`SimulationSession::observe`](crate::session::SimulationSession::observe)
//! receive every packet delivery, forward, dropped forward and actor state
//! change as plain serializable data.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::actor::ActorState;
use crate::fabric::ForwardFailure;
use crate::packet::Packet;
use crate::types::{HopBudget, NodeId, SessionId};

/// Something observable that happened during a run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum SimEvent {
    /// A node took a packet out of its mailbox.
    #[serde(rename_all = "camelCase")]
    PacketDelivered { node: NodeId, packet: Packet },

    /// A node handed a copy to the fabric successfully.
    #[serde(rename_all = "camelCase")]
    PacketForwarded {
        from: NodeId,
        to: NodeId,
        hops_remaining: HopBudget,
    },

    /// A forward was dropped.
    #[serde(rename_all = "camelCase")]
    ForwardFailed {
        from: NodeId,
        to: NodeId,
        failure: ForwardFailure,
    },

    /// A node actor changed state.
    #[serde(rename_all = "camelCase")]
    StateChanged { node: NodeId, state: ActorState },
}

impl SimEvent {
    /// Returns the node the event is about.
    pub fn node(&self) -> NodeId {
        match self {
            SimEvent::PacketDelivered { node, .. } => *node,
            SimEvent::PacketForwarded { from, .. } => *from,
            SimEvent::ForwardFailed { from, .. } => *from,
            SimEvent::StateChanged { node, .. } => *node,
        }
    }
}

/// An event tagged with the session that produced it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEvent {
    /// Session that emitted the event
    pub session: SessionId,
    /// The event itself
    #[serde(flatten)]
    pub event: SimEvent,
}

/// Sending half of an observation stream; a no-op when nobody listens.
#[derive(Clone, Debug, Default)]
pub struct EventSink {
    session: SessionId,
    tx: Option<mpsc::UnboundedSender<SessionEvent>>,
}

impl EventSink {
    /// Creates a sink that discards everything.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Creates a sink publishing into `tx`.
    pub fn new(session: SessionId, tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self {
            session,
            tx: Some(tx),
        }
    }

    /// Returns true if events are being collected.
    pub fn is_enabled(&self) -> bool {
        self.tx.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Publishes an event. A receiver that went away is ignored.
    pub fn emit(&self, event: SimEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(SessionEvent {
                session: self.session,
                event,
            });
        }
    }
}
