//! Node actors.
//!
//! Every validated node runs as one [`NodeActor`] task. The actor owns its
//! mailbox, handles packets one at a time in arrival order, waits out the
//! configured processing delay and then hands a fresh copy of the packet to
//! the fabric for every forwarding port.
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──packet──▶ Processing ──forwarded──▶ Idle
//!   │                  │
//!   └────shutdown──────┴──▶ Draining ──mailbox empty──▶ Terminated
//! ```
//!
//! Shutdown is cooperative: it is observed while waiting for the next packet
//! and during the processing delay. A packet interrupted during its delay is
//! abandoned whole; once forwarding has begun it runs to completion, so no
//! forward is ever half-applied.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::event::{EventSink, SimEvent};
use crate::fabric::{DispatchFabric, Mailbox};
use crate::packet::Packet;
use crate::stats::NodeStats;
use crate::topology::Node;
use crate::types::NodeId;

/// Lifecycle state of a node actor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActorState {
    /// Spawned and waiting for packets.
    #[default]
    Idle,
    /// Handling a packet.
    Processing,
    /// Shutting down; discarding whatever is still queued.
    Draining,
    /// Mailbox closed and empty.
    Terminated,
}

impl fmt::Display for ActorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActorState::Idle => "idle",
            ActorState::Processing => "processing",
            ActorState::Draining => "draining",
            ActorState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// One concurrent forwarding element.
pub struct NodeActor {
    node: Node,
    mailbox: Mailbox,
    fabric: Arc<DispatchFabric>,
    shutdown: watch::Receiver<bool>,
    processing_delay: Duration,
    events: EventSink,
    failed: bool,
    state: ActorState,
    stats: NodeStats,
}

impl NodeActor {
    /// Creates an actor for `node`, reading from `mailbox`.
    ///
    /// The actor stops once `shutdown` turns `true` (or its sender goes away).
    pub fn new(
        node: Node,
        mailbox: Mailbox,
        fabric: Arc<DispatchFabric>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let stats = NodeStats::for_node(&node);
        Self {
            node,
            mailbox,
            fabric,
            shutdown,
            processing_delay: Duration::ZERO,
            events: EventSink::disabled(),
            failed: false,
            state: ActorState::Idle,
            stats,
        }
    }

    /// Sets the simulated per-packet processing delay.
    pub fn with_processing_delay(mut self, delay: Duration) -> Self {
        self.processing_delay = delay;
        self
    }

    /// Publishes lifecycle and packet events into `events`.
    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    /// Models a failed device: the actor shuts down as soon as it starts.
    pub fn failed(mut self) -> Self {
        self.failed = true;
        self.stats.failed_device = true;
        self
    }

    /// Returns the node identifier.
    pub fn id(&self) -> NodeId {
        self.node.id
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> ActorState {
        self.state
    }

    /// Runs the actor until shutdown and returns its statistics.
    pub async fn run(mut self) -> NodeStats {
        if self.failed {
            tracing::warn!(node = self.node.id, "node modelled as failed device");
        } else {
            self.serve().await;
        }
        self.drain().await;
        self.finish()
    }

    async fn serve(&mut self) {
        loop {
            if *self.shutdown.borrow() {
                return;
            }

            let next = tokio::select! {
                biased;
                _ = self.shutdown.changed() => None,
                packet = self.mailbox.recv() => packet,
            };

            let Some(packet) = next else {
                return;
            };
            if !self.handle_packet(packet).await {
                return;
            }
        }
    }

    /// Handles one packet. Returns false if shutdown interrupted it.
    pub async fn handle_packet(&mut self, packet: Packet) -> bool {
        self.transition(ActorState::Processing);
        tracing::debug!(
            node = self.node.id,
            from = packet.source_id,
            hops_remaining = packet.hops_remaining,
            "received packet"
        );
        self.events.emit(SimEvent::PacketDelivered {
            node: self.node.id,
            packet: packet.clone(),
        });

        if !self.processing_delay.is_zero() {
            let interrupted = tokio::select! {
                biased;
                _ = self.shutdown.changed() => true,
                _ = tokio::time::sleep(self.processing_delay) => false,
            };
            if interrupted {
                tracing::debug!(node = self.node.id, "packet abandoned by shutdown");
                self.stats.packets_abandoned += 1;
                self.fabric.in_flight().release();
                return false;
            }
        }

        self.stats.packets_processed += 1;
        self.forward(&packet).await;
        self.fabric.in_flight().release();
        self.transition(ActorState::Idle);
        true
    }

    async fn forward(&mut self, packet: &Packet) {
        if packet.is_exhausted() {
            tracing::trace!(node = self.node.id, "hop budget exhausted");
            self.stats.budget_exhausted += 1;
            return;
        }

        let id = self.node.id;
        let targets: Vec<NodeId> = self.node.forwarding_ports().map(|p| p.target_id).collect();

        for target in targets {
            let Some(copy) = packet.forward(id, target) else {
                break;
            };
            let hops_remaining = copy.hops_remaining;

            match self.fabric.send(target, copy).await {
                Ok(()) => {
                    self.stats.packets_forwarded += 1;
                    self.events.emit(SimEvent::PacketForwarded {
                        from: id,
                        to: target,
                        hops_remaining,
                    });
                }
                Err(failure) => {
                    tracing::warn!(node = id, to = target, %failure, "forward dropped");
                    self.stats.record_failure(target, failure);
                    self.events.emit(SimEvent::ForwardFailed {
                        from: id,
                        to: target,
                        failure,
                    });
                }
            }
        }
    }

    async fn drain(&mut self) {
        self.transition(ActorState::Draining);
        self.mailbox.close();

        while let Some(packet) = self.mailbox.recv().await {
            tracing::trace!(node = self.node.id, from = packet.source_id, "discarding queued packet");
            self.stats.packets_drained += 1;
            self.fabric.in_flight().release();
        }

        self.transition(ActorState::Terminated);
    }

    fn transition(&mut self, next: ActorState) {
        if self.state == next {
            return;
        }
        tracing::trace!(node = self.node.id, from = %self.state, to = %next, "actor state");
        self.state = next;
        self.events.emit(SimEvent::StateChanged {
            node: self.node.id,
            state: next,
        });
    }

    fn finish(self) -> NodeStats {
        let mut stats = self.stats;
        stats.final_state = self.state;
        stats
    }
}

impl fmt::Debug for NodeActor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeActor")
            .field("node", &self.node.id)
            .field("state", &self.state)
            .field("failed", &self.failed)
            .finish()
    }
}
