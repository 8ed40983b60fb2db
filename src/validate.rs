//! Topology validation.
//!
//! A raw [`Topology`] is untrusted input: identifiers may repeat, ports may
//! point at nodes that do not exist, and the forwarding ports may form a
//! loop that would flood forever. [`validate`] checks all of this up front
//! and either hands back a [`ValidatedTopology`] or the first problem it
//! found. Validation is all-or-nothing.
//!
//! # Forwarding cycles
//!
//! The forwarding subgraph has an edge `u -> v` for every forwarding port of
//! `u` that targets `v`. A tree link is normally forwarding at both ends, so
//! a plain directed cycle search would flag every link. Instead, the walk
//! starts at root candidates (nodes with `hop_count == 0`): the edge from a
//! non-root node straight back to the node it was reached from is the
//! reverse half of a tree link and is skipped. Reaching any other visited
//! node closes a loop.
//!
//! Nodes that no root reaches have nothing anchoring them, so any directed
//! cycle among them, including a mutual pair, is reported.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use thiserror::Error;

use crate::config::ValidationParams;
use crate::topology::{Node, Topology};
use crate::types::{HopBudget, NodeId, PortNumber};

/// Reasons a topology is rejected before simulation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("duplicate node id {id}")]
    DuplicateNode { id: NodeId },

    #[error("node {node} port {port} targets unknown node {target}")]
    DanglingPort {
        node: NodeId,
        port: PortNumber,
        target: NodeId,
    },

    #[error("node {node} declares port number {port} more than once")]
    DuplicatePort { node: NodeId, port: PortNumber },

    #[error("forwarding cycle through nodes {cycle:?}")]
    ForwardingCycle { cycle: Vec<NodeId> },

    #[error("node {node} port {port} targets node {target} without a declared link")]
    UndeclaredLink {
        node: NodeId,
        port: PortNumber,
        target: NodeId,
    },

    #[error("link {source_id} - {target_id} references an unknown node")]
    DanglingLink { source_id: NodeId, target_id: NodeId },
}

impl ValidationError {
    /// Stable name of the error kind, used in egress replies.
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::DuplicateNode { .. } => "DuplicateNode",
            ValidationError::DanglingPort { .. } => "DanglingPort",
            ValidationError::DuplicatePort { .. } => "DuplicatePort",
            ValidationError::ForwardingCycle { .. } => "ForwardingCycle",
            ValidationError::UndeclaredLink { .. } => "UndeclaredLink",
            ValidationError::DanglingLink { .. } => "DanglingLink",
        }
    }
}

/// Result type for validation.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// A topology that passed every check in [`validate`].
///
/// Cheap to clone; the underlying topology is shared and never mutated.
#[derive(Clone, Debug)]
pub struct ValidatedTopology {
    topology: Arc<Topology>,
    index: HashMap<NodeId, usize>,
}

impl ValidatedTopology {
    /// Returns the validated topology.
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Returns the nodes in declaration order.
    pub fn nodes(&self) -> &[Node] {
        &self.topology.nodes
    }

    /// Looks up a node by identifier.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.index.get(&id).map(|&i| &self.topology.nodes[i])
    }

    /// Returns true if the topology contains `id`.
    pub fn contains(&self, id: NodeId) -> bool {
        self.index.contains_key(&id)
    }

    /// Returns the number of nodes.
    pub fn node_count(&self) -> usize {
        self.topology.nodes.len()
    }

    /// Iterates over node identifiers in declaration order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.topology.nodes.iter().map(|n| n.id)
    }

    /// Predicts how many packets each node processes in an undisturbed run.
    ///
    /// Every node is seeded with one packet carrying `hop_budget`. A packet
    /// with budget `b > 0` produces one copy per forwarding port, each with
    /// `b - 1`. A run without backpressure, dead targets or interruption
    /// processes exactly these counts.
    ///
    /// Runs in O(hop_budget x ports). Session configs cap the budget at
    /// [`MAX_HOP_BUDGET`](crate::config::MAX_HOP_BUDGET).
    pub fn predict_processed(&self, hop_budget: HopBudget) -> BTreeMap<NodeId, u64> {
        let nodes = &self.topology.nodes;
        let mut arriving = vec![1u64; nodes.len()];
        let mut processed = vec![0u64; nodes.len()];
        let mut budget = hop_budget;

        loop {
            for (total, count) in processed.iter_mut().zip(&arriving) {
                *total = total.saturating_add(*count);
            }
            if budget == 0 || arriving.iter().all(|&c| c == 0) {
                break;
            }

            let mut next = vec![0u64; nodes.len()];
            for (i, node) in nodes.iter().enumerate() {
                if arriving[i] == 0 {
                    continue;
                }
                for port in node.forwarding_ports() {
                    if let Some(&j) = self.index.get(&port.target_id) {
                        next[j] = next[j].saturating_add(arriving[i]);
                    }
                }
            }
            arriving = next;
            budget -= 1;
        }

        nodes
            .iter()
            .zip(processed)
            .map(|(node, count)| (node.id, count))
            .collect()
    }
}

/// Validates a raw topology.
///
/// Checks run in order: unique node ids, port targets, port numbers,
/// forwarding cycles, and link declarations. The link check is skipped
/// only when `params.require_declared_links` is turned off. The first failure is returned.
pub fn validate(topology: Topology, params: &ValidationParams) -> ValidationResult<ValidatedTopology> {
    let index = index_nodes(&topology)?;
    check_ports(&topology, &index)?;
    check_forwarding_cycles(&topology, &index)?;
    if params.require_declared_links {
        check_links(&topology, &index)?;
    }

    tracing::debug!(
        nodes = topology.nodes.len(),
        links = topology.links.len(),
        "topology validated"
    );

    Ok(ValidatedTopology {
        topology: Arc::new(topology),
        index,
    })
}

fn index_nodes(topology: &Topology) -> ValidationResult<HashMap<NodeId, usize>> {
    let mut index = HashMap::with_capacity(topology.nodes.len());
    for (i, node) in topology.nodes.iter().enumerate() {
        if index.insert(node.id, i).is_some() {
            return Err(ValidationError::DuplicateNode { id: node.id });
        }
    }
    Ok(index)
}

fn check_ports(topology: &Topology, index: &HashMap<NodeId, usize>) -> ValidationResult<()> {
    for node in &topology.nodes {
        for port in &node.ports {
            if !index.contains_key(&port.target_id) {
                return Err(ValidationError::DanglingPort {
                    node: node.id,
                    port: port.port_number,
                    target: port.target_id,
                });
            }
        }
    }

    for node in &topology.nodes {
        let mut seen = HashSet::with_capacity(node.ports.len());
        for port in &node.ports {
            if !seen.insert(port.port_number) {
                return Err(ValidationError::DuplicatePort {
                    node: node.id,
                    port: port.port_number,
                });
            }
        }
    }

    Ok(())
}

fn check_links(topology: &Topology, index: &HashMap<NodeId, usize>) -> ValidationResult<()> {
    for link in &topology.links {
        if !index.contains_key(&link.source_id) || !index.contains_key(&link.target_id) {
            return Err(ValidationError::DanglingLink {
                source_id: link.source_id,
                target_id: link.target_id,
            });
        }
    }

    for node in &topology.nodes {
        for port in &node.ports {
            if !topology.links.iter().any(|l| l.joins(node.id, port.target_id)) {
                return Err(ValidationError::UndeclaredLink {
                    node: node.id,
                    port: port.port_number,
                    target: port.target_id,
                });
            }
        }
    }

    Ok(())
}

/// Forwarding adjacency by node index, duplicates removed, declaration order kept.
fn forwarding_adjacency(topology: &Topology, index: &HashMap<NodeId, usize>) -> Vec<Vec<usize>> {
    topology
        .nodes
        .iter()
        .map(|node| {
            let mut targets = Vec::new();
            for port in node.forwarding_ports() {
                if let Some(&j) = index.get(&port.target_id) {
                    if !targets.contains(&j) {
                        targets.push(j);
                    }
                }
            }
            targets
        })
        .collect()
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unseen,
    OnStack,
    Done,
}

fn check_forwarding_cycles(topology: &Topology, index: &HashMap<NodeId, usize>) -> ValidationResult<()> {
    let nodes = &topology.nodes;
    let adjacency = forwarding_adjacency(topology, index);
    let mut parent: Vec<Option<usize>> = vec![None; nodes.len()];
    let mut visited = vec![false; nodes.len()];

    // Rooted walks.
    for root in 0..nodes.len() {
        if visited[root] || !nodes[root].is_root_candidate() {
            continue;
        }
        visited[root] = true;
        let mut queue = VecDeque::from([root]);

        while let Some(x) = queue.pop_front() {
            for &y in &adjacency[x] {
                if parent[x] == Some(y) && !nodes[x].is_root_candidate() {
                    continue;
                }
                if visited[y] {
                    let cycle = close_loop(&parent, x, y)
                        .into_iter()
                        .map(|i| nodes[i].id)
                        .collect();
                    return Err(ValidationError::ForwardingCycle { cycle });
                }
                visited[y] = true;
                parent[y] = Some(x);
                queue.push_back(y);
            }
        }
    }

    // Unanchored nodes: strict directed search.
    let mut marks: Vec<Mark> = visited
        .iter()
        .map(|&v| if v { Mark::Done } else { Mark::Unseen })
        .collect();

    for start in 0..nodes.len() {
        if marks[start] != Mark::Unseen {
            continue;
        }
        marks[start] = Mark::OnStack;
        let mut stack: Vec<(usize, usize)> = vec![(start, 0)];

        while let Some(frame) = stack.last_mut() {
            let x = frame.0;
            let next = adjacency[x].get(frame.1).copied();
            frame.1 += 1;

            match next {
                Some(y) => match marks[y] {
                    Mark::Unseen => {
                        marks[y] = Mark::OnStack;
                        stack.push((y, 0));
                    }
                    Mark::OnStack => {
                        let from = stack.iter().position(|&(i, _)| i == y).unwrap_or(0);
                        let cycle = stack[from..].iter().map(|&(i, _)| nodes[i].id).collect();
                        return Err(ValidationError::ForwardingCycle { cycle });
                    }
                    Mark::Done => {}
                },
                None => {
                    marks[x] = Mark::Done;
                    stack.pop();
                }
            }
        }
    }

    Ok(())
}

/// Builds the node sequence of the loop closed by the edge `x -> y`.
///
/// The sequence starts at the deepest common ancestor of `x` and `y`, runs
/// down to `x`, then continues from `y` back up towards that ancestor. When
/// the two nodes hang off different roots, both full paths are used.
fn close_loop(parent: &[Option<usize>], x: usize, y: usize) -> Vec<usize> {
    let up_x = ancestry(parent, x);
    let up_y = ancestry(parent, y);

    let common = up_x
        .iter()
        .enumerate()
        .find_map(|(ix, node)| up_y.iter().position(|n| n == node).map(|iy| (ix, iy)));

    match common {
        Some((ix, iy)) => {
            let mut cycle: Vec<usize> = up_x[..=ix].iter().rev().copied().collect();
            cycle.extend_from_slice(&up_y[..iy]);
            cycle
        }
        None => {
            let mut cycle: Vec<usize> = up_x.iter().rev().copied().collect();
            cycle.extend_from_slice(&up_y);
            cycle
        }
    }
}

/// Returns `[node, parent, grandparent, ..., root]`.
fn ancestry(parent: &[Option<usize>], node: usize) -> Vec<usize> {
    let mut chain = vec![node];
    let mut current = node;
    while let Some(p) = parent[current] {
        if chain.contains(&p) {
            break;
        }
        chain.push(p);
        current = p;
    }
    chain
}
