//! Dispatch fabric connecting node actors.
//!
//! The fabric owns one bounded mailbox per node and the table mapping node
//! identifiers to the sending half of each mailbox. The table is built once
//! per run and never changes afterwards, so it needs no lock; the bounded
//! `tokio::sync::mpsc` queues are the only shared mutable structure.
//!
//! # Delivery
//!
//! [`DispatchFabric::send`] never blocks indefinitely:
//!
//! | Situation                          | Result                          |
//! |------------------------------------|---------------------------------|
//! | target unknown                     | [`ForwardFailure::DeadTarget`]  |
//! | target closed                      | [`ForwardFailure::DeadTarget`]  |
//! | mailbox full past `send_timeout`   | [`ForwardFailure::Backpressure`]|
//! | otherwise                          | delivered                       |
//!
//! # Quiescence
//!
//! The fabric also carries the run's [`InFlight`] counter. A packet counts as
//! in flight from the moment a send is attempted until its receiver has
//! finished handling it (or discarded it). A counter of zero after seeding
//! therefore means no actor holds an unprocessed packet and no send is
//! outstanding.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::{mpsc, watch};

use crate::packet::Packet;
use crate::types::NodeId;

/// Why a forward was dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ForwardFailure {
    /// The target is unknown or has already terminated.
    DeadTarget,
    /// The target's mailbox stayed full for longer than the send timeout.
    Backpressure,
}

impl fmt::Display for ForwardFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForwardFailure::DeadTarget => write!(f, "dead target"),
            ForwardFailure::Backpressure => write!(f, "backpressure"),
        }
    }
}

/// Result of a fabric send.
pub type SendResult = Result<(), ForwardFailure>;

/// Counter of packets that are queued, being handled, or being sent.
#[derive(Clone, Debug)]
pub struct InFlight {
    counter: Arc<watch::Sender<usize>>,
}

impl InFlight {
    /// Creates a counter at zero.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self {
            counter: Arc::new(tx),
        }
    }

    /// Registers one more packet in flight.
    pub fn acquire(&self) {
        self.counter.send_modify(|n| *n += 1);
    }

    /// Marks one packet as settled.
    pub fn release(&self) {
        self.counter.send_modify(|n| *n = n.saturating_sub(1));
    }

    /// Returns the number of packets currently in flight.
    pub fn pending(&self) -> usize {
        *self.counter.borrow()
    }

    /// Resolves once no packet is in flight.
    pub async fn settled(&self) {
        let mut rx = self.counter.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

impl Default for InFlight {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving half of a node's mailbox, owned by its actor.
#[derive(Debug)]
pub struct Mailbox {
    node: NodeId,
    rx: mpsc::Receiver<Packet>,
}

impl Mailbox {
    /// Returns the node this mailbox belongs to.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Waits for the next packet, in FIFO order.
    pub async fn recv(&mut self) -> Option<Packet> {
        self.rx.recv().await
    }

    /// Stops accepting packets; buffered packets can still be received.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

struct Slot {
    tx: mpsc::Sender<Packet>,
    closed: AtomicBool,
}

/// Addressing table and bounded channels for one run.
pub struct DispatchFabric {
    slots: HashMap<NodeId, Slot>,
    send_timeout: Duration,
    in_flight: InFlight,
}

impl DispatchFabric {
    /// Builds the fabric for `nodes`, returning it with one mailbox per node.
    ///
    /// Mailboxes are returned in the order the nodes were given.
    pub fn new(
        nodes: impl IntoIterator<Item = NodeId>,
        capacity: usize,
        send_timeout: Duration,
    ) -> (Self, Vec<Mailbox>) {
        let mut slots = HashMap::new();
        let mut mailboxes = Vec::new();

        for node in nodes {
            let (tx, rx) = mpsc::channel(capacity.max(1));
            slots.insert(
                node,
                Slot {
                    tx,
                    closed: AtomicBool::new(false),
                },
            );
            mailboxes.push(Mailbox { node, rx });
        }

        let fabric = Self {
            slots,
            send_timeout,
            in_flight: InFlight::new(),
        };
        (fabric, mailboxes)
    }

    /// Delivers `packet` to the mailbox of `target`.
    ///
    /// Safe to call concurrently from any number of senders. A successful
    /// send leaves the packet counted as in flight until the receiver
    /// releases it; a failed send leaves the counter unchanged.
    pub async fn send(&self, target: NodeId, packet: Packet) -> SendResult {
        let Some(slot) = self.slots.get(&target) else {
            return Err(ForwardFailure::DeadTarget);
        };
        if slot.closed.load(Ordering::Acquire) {
            return Err(ForwardFailure::DeadTarget);
        }

        self.in_flight.acquire();
        let result = match slot.tx.send_timeout(packet, self.send_timeout).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => Err(ForwardFailure::Backpressure),
            Err(SendTimeoutError::Closed(_)) => Err(ForwardFailure::DeadTarget),
        };
        if result.is_err() {
            self.in_flight.release();
        }
        result
    }

    /// Closes the mailbox of `node` to further sends.
    ///
    /// Returns true if this call closed it, false if it was already closed or
    /// the node is unknown.
    pub fn close(&self, node: NodeId) -> bool {
        self.slots
            .get(&node)
            .map(|slot| !slot.closed.swap(true, Ordering::AcqRel))
            .unwrap_or(false)
    }

    /// Returns true if `node` no longer accepts packets.
    pub fn is_closed(&self, node: NodeId) -> bool {
        self.slots
            .get(&node)
            .map(|slot| slot.closed.load(Ordering::Acquire))
            .unwrap_or(true)
    }

    /// Returns true if the fabric addresses `node`.
    pub fn contains(&self, node: NodeId) -> bool {
        self.slots.contains_key(&node)
    }

    /// Returns the number of addressable nodes.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if the fabric addresses no node.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Returns the run's in-flight counter.
    pub fn in_flight(&self) -> &InFlight {
        &self.in_flight
    }
}

impl fmt::Debug for DispatchFabric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchFabric")
            .field("nodes", &self.slots.len())
            .field("send_timeout", &self.send_timeout)
            .field("in_flight", &self.in_flight.pending())
            .finish()
    }
}
