//! Property tests over randomly shaped spanning trees.

use std::time::Duration;

use proptest::prelude::*;
use proptest::sample::Index;

use bridgesim::{
    validate, Node, Port, SimConfigBuilder, SimError, SimulationSession, Topology,
    ValidationError, ValidationParams,
};

/// Builds a tree from `parents`: node `i + 1` hangs off node `parents[i]`.
///
/// Node 0 is the root. Upward ports always forward; downward ports forward
/// when the matching flag is set.
fn tree(parents: &[Index], downward: &[bool]) -> Topology {
    let count = parents.len() + 1;
    let mut parent = vec![0usize; count];
    let mut depth = vec![0u32; count];
    let mut nodes: Vec<Node> = vec![Node::new(0)];

    for (i, choice) in parents.iter().enumerate() {
        let child = i + 1;
        let p = choice.index(child);
        parent[child] = p;
        depth[child] = depth[p] + 1;
        nodes.push(
            Node::new(child as i64)
                .with_tree(0, depth[child], p as i64)
                .with_port(Port::forwarding(0, p as i64)),
        );
    }

    for child in 1..count {
        let p = parent[child];
        let port = if downward.get(child).copied().unwrap_or(true) {
            Port::forwarding(child as i64, child as i64)
        } else {
            Port::blocking(child as i64, child as i64)
        };
        let node = std::mem::replace(&mut nodes[p], Node::new(0));
        nodes[p] = node.with_port(port);
    }

    let mut topology = Topology::new();
    for child in 1..count {
        topology = topology.with_link(parent[child] as i64, child as i64);
    }
    nodes.into_iter().fold(topology, Topology::with_node)
}

fn tree_strategy(max_nodes: usize) -> impl Strategy<Value = (Vec<Index>, Vec<bool>)> {
    (
        prop::collection::vec(any::<Index>(), 0..max_nodes),
        prop::collection::vec(any::<bool>(), max_nodes + 1),
    )
}

proptest! {
    #[test]
    fn prop_trees_are_valid((parents, downward) in tree_strategy(40)) {
        let topology = tree(&parents, &downward);
        let params = ValidationParams::default();
        prop_assert!(validate(topology, &params).is_ok());
    }

    #[test]
    fn prop_extra_forwarding_link_is_a_cycle(
        (parents, _) in tree_strategy(20),
        pick in any::<Index>(),
    ) {
        prop_assume!(parents.len() >= 2);
        let all_forwarding = vec![true; parents.len() + 1];
        let mut topology = tree(&parents, &all_forwarding);

        // Join the root to a node that is not already its child.
        let target = pick.index(parents.len()) + 1;
        prop_assume!(parents[target - 1].index(target) != 0);

        let root = topology.nodes.iter_mut().find(|n| n.id == 0).unwrap();
        root.ports.push(Port::forwarding(1000, target as i64));
        let node = topology.nodes.iter_mut().find(|n| n.id == target as i64).unwrap();
        node.ports.push(Port::forwarding(1000, 0));

        let err = validate(topology, &ValidationParams::default()).unwrap_err();
        let is_forwarding_cycle = matches!(err, ValidationError::ForwardingCycle { .. });
        prop_assert!(is_forwarding_cycle);
    }

    #[test]
    fn prop_prediction_is_bounded(
        (parents, downward) in tree_strategy(30),
        budget in 0u32..4,
    ) {
        let validated = validate(tree(&parents, &downward), &ValidationParams::default()).unwrap();
        let predicted = validated.predict_processed(budget);
        // In a tree every neighbour is behind exactly one port.
        let degree = validated
            .nodes()
            .iter()
            .map(|n| n.ports.len() as u64)
            .max()
            .unwrap_or(0)
            .max(1);

        prop_assert_eq!(predicted.len(), parents.len() + 1);
        for count in predicted.values() {
            prop_assert!(*count >= 1);
            prop_assert!(*count <= (0..=budget).map(|level| degree.pow(level)).sum::<u64>());
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn prop_trees_reach_quiescence((parents, downward) in tree_strategy(12)) {
        let topology = tree(&parents, &downward);
        let predicted = validate(topology.clone(), &ValidationParams::default())
            .unwrap()
            .predict_processed(1);

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();

        let config = SimConfigBuilder::new()
            .processing_delay(Duration::from_millis(1))
            .run_timeout(Duration::from_secs(10))
            .build()
            .unwrap();

        let report = runtime
            .block_on(SimulationSession::new(config).run(topology))
            .and_then(|r| r.into_result());

        match report {
            Ok(report) => {
                prop_assert!(report.is_complete());
                prop_assert_eq!(report.processed(), predicted);
            }
            Err(SimError::RunTimeout { .. }) => prop_assert!(false, "run did not settle"),
            Err(other) => prop_assert!(false, "unexpected error {}", other),
        }
    }
}
