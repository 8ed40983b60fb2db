//! Topology model: nodes, ports and links.
//!
//! A [`Topology`] is the full snapshot a simulation run operates on. It is
//! produced by an external spanning-tree computation and arrives through the
//! ingress envelope, so every field mirrors the wire format (camelCase JSON).
//! Once validated it is never mutated.

use serde::{Deserialize, Serialize};

use crate::types::{NodeId, PortNumber};

/// Forwarding state of a port in the externally computed spanning tree.
///
/// The wire format is a free-form string. `"Unblocked"` and `"Forwarding"`
/// (in any case) mean [`PortState::Forwarding`]; anything else is treated as
/// [`PortState::Blocking`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PortState {
    /// Traffic may not pass through the port.
    #[default]
    Blocking,
    /// Traffic passes through the port.
    Forwarding,
}

impl PortState {
    /// Returns true if packets may be forwarded through a port in this state.
    pub fn is_forwarding(&self) -> bool {
        matches!(self, PortState::Forwarding)
    }
}

impl From<String> for PortState {
    fn from(status: String) -> Self {
        PortState::from(status.as_str())
    }
}

impl From<&str> for PortState {
    fn from(status: &str) -> Self {
        let status = status.trim();
        if status.eq_ignore_ascii_case("unblocked") || status.eq_ignore_ascii_case("forwarding") {
            PortState::Forwarding
        } else {
            PortState::Blocking
        }
    }
}

impl From<PortState> for String {
    fn from(state: PortState) -> Self {
        match state {
            PortState::Blocking => "Blocked".to_string(),
            PortState::Forwarding => "Unblocked".to_string(),
        }
    }
}

/// A port on a node, pointing at a neighbouring node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Port {
    /// Node this port leads to
    pub target_id: NodeId,
    /// Port label, unique within the owning node
    pub port_number: PortNumber,
    /// Forwarding state
    #[serde(rename = "status", default)]
    pub state: PortState,
}

impl Port {
    /// Creates a forwarding port.
    pub fn forwarding(port_number: PortNumber, target_id: NodeId) -> Self {
        Self {
            target_id,
            port_number,
            state: PortState::Forwarding,
        }
    }

    /// Creates a blocking port.
    pub fn blocking(port_number: PortNumber, target_id: NodeId) -> Self {
        Self {
            target_id,
            port_number,
            state: PortState::Blocking,
        }
    }

    /// Returns true if the port forwards traffic.
    pub fn is_forwarding(&self) -> bool {
        self.state.is_forwarding()
    }
}

/// A bridge in the topology together with its tree metadata.
///
/// `root_id`, `hop_count` and `next_hop` describe the node's place in the
/// spanning tree. They are exposed to observers but never gate forwarding;
/// only port state does.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Unique identifier
    pub id: NodeId,
    /// Horizontal layout hint, opaque to the engine
    #[serde(default)]
    pub x: f64,
    /// Vertical layout hint, opaque to the engine
    #[serde(default)]
    pub y: f64,
    /// Root bridge as seen by this node
    #[serde(default)]
    pub root_id: NodeId,
    /// Distance from the root in hops
    #[serde(default)]
    pub hop_count: u32,
    /// Neighbour used en route to the root
    #[serde(default)]
    pub next_hop: NodeId,
    /// Ports in declaration order
    #[serde(default)]
    pub ports: Vec<Port>,
}

impl Node {
    /// Creates a node that considers itself the root.
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            x: 0.0,
            y: 0.0,
            root_id: id,
            hop_count: 0,
            next_hop: id,
            ports: Vec::new(),
        }
    }

    /// Sets the tree metadata of this node.
    pub fn with_tree(mut self, root_id: NodeId, hop_count: u32, next_hop: NodeId) -> Self {
        self.root_id = root_id;
        self.hop_count = hop_count;
        self.next_hop = next_hop;
        self
    }

    /// Sets the layout position.
    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    /// Adds a port to this node.
    pub fn with_port(mut self, port: Port) -> Self {
        self.ports.push(port);
        self
    }

    /// Returns true if this node is a root candidate (zero hops from root).
    pub fn is_root_candidate(&self) -> bool {
        self.hop_count == 0
    }

    /// Iterates over the ports through which traffic is forwarded.
    pub fn forwarding_ports(&self) -> impl Iterator<Item = &Port> {
        self.ports.iter().filter(|p| p.is_forwarding())
    }
}

/// An edge declaration between two nodes.
///
/// Links are descriptive metadata used for integrity checks; packets travel
/// over ports, not links.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    /// One end of the link
    pub source_id: NodeId,
    /// Other end of the link
    pub target_id: NodeId,
}

impl Link {
    /// Creates a new link.
    pub fn new(source_id: NodeId, target_id: NodeId) -> Self {
        Self {
            source_id,
            target_id,
        }
    }

    /// Returns true if this link joins `a` and `b`, in either direction.
    pub fn joins(&self, a: NodeId, b: NodeId) -> bool {
        (self.source_id == a && self.target_id == b) || (self.source_id == b && self.target_id == a)
    }
}

/// The full node and link snapshot for one simulation run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    /// Nodes in declaration order
    #[serde(default)]
    pub nodes: Vec<Node>,
    /// Declared links
    #[serde(default)]
    pub links: Vec<Link>,
}

impl Topology {
    /// Creates an empty topology.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node.
    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    /// Adds a link.
    pub fn with_link(mut self, source_id: NodeId, target_id: NodeId) -> Self {
        self.links.push(Link::new(source_id, target_id));
        self
    }

    /// Finds a node by identifier.
    pub fn find_node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Returns the number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the number of links.
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Parses a topology from its JSON wire form.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_state_from_wire() {
        assert_eq!(PortState::from("Unblocked"), PortState::Forwarding);
        assert_eq!(PortState::from("forwarding"), PortState::Forwarding);
        assert_eq!(PortState::from("Blocked"), PortState::Blocking);
        assert_eq!(PortState::from("Listening"), PortState::Blocking);
        assert_eq!(PortState::from(""), PortState::Blocking);
    }

    #[test]
    fn test_port_state_to_wire() {
        assert_eq!(String::from(PortState::Forwarding), "Unblocked");
        assert_eq!(String::from(PortState::Blocking), "Blocked");
    }

    #[test]
    fn test_node_builder() {
        let node = Node::new(1)
            .with_tree(2, 1, 2)
            .at(10.0, 20.0)
            .with_port(Port::forwarding(1, 2))
            .with_port(Port::blocking(2, 3));

        assert_eq!(node.root_id, 2);
        assert_eq!(node.hop_count, 1);
        assert!(!node.is_root_candidate());
        assert_eq!(node.forwarding_ports().count(), 1);
        assert_eq!(node.x, 10.0);
    }

    #[test]
    fn test_parse_wire_topology() {
        let json = r#"{
            "nodes": [
                {"id": 1, "x": 100.5, "y": 40, "rootId": 1, "hopCount": 0, "nextHop": 1,
                 "ports": [{"targetId": 2, "portNumber": 1, "status": "Unblocked"}]},
                {"id": 2, "rootId": 1, "hopCount": 1, "nextHop": 1,
                 "ports": [{"targetId": 1, "portNumber": 1, "status": "Blocked"}]}
            ],
            "links": [{"sourceId": 1, "targetId": 2}]
        }"#;

        let topo = Topology::from_json(json).unwrap();
        assert_eq!(topo.node_count(), 2);
        assert_eq!(topo.link_count(), 1);
        assert!(topo.nodes[0].ports[0].is_forwarding());
        assert!(!topo.nodes[1].ports[0].is_forwarding());
        assert_eq!(topo.find_node(2).unwrap().next_hop, 1);
    }

    #[test]
    fn test_missing_fields_default() {
        let topo = Topology::from_json(r#"{"nodes": [{"id": 5}]}"#).unwrap();
        let node = &topo.nodes[0];
        assert_eq!(node.hop_count, 0);
        assert!(node.ports.is_empty());
        assert!(topo.links.is_empty());
    }

    #[test]
    fn test_negative_hop_count_rejected() {
        let result = Topology::from_json(r#"{"nodes": [{"id": 5, "hopCount": -1}]}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_link_joins_either_direction() {
        let link = Link::new(1, 2);
        assert!(link.joins(1, 2));
        assert!(link.joins(2, 1));
        assert!(!link.joins(1, 3));
    }

    #[test]
    fn test_serialization_keeps_wire_names() {
        let topo = Topology::new()
            .with_node(Node::new(1).with_port(Port::forwarding(1, 2)))
            .with_link(1, 2);
        let json = serde_json::to_value(&topo).unwrap();

        assert_eq!(json["nodes"][0]["rootId"], 1);
        assert_eq!(json["nodes"][0]["ports"][0]["status"], "Unblocked");
        assert_eq!(json["links"][0]["sourceId"], 1);
    }
}
