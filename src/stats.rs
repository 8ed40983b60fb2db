//! Run statistics and report export.
//!
//! Every run ends in a [`RunReport`]: the outcome, per-node counters
//! returned by the actors, and every forward that was dropped. Reports
//! export to JSON and CSV and render a human-readable summary.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use crate::actor::ActorState;
use crate::error::SimError;
use crate::fabric::ForwardFailure;
use crate::topology::Node;
use crate::types::{NodeId, SessionId};

/// How a run ended.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunOutcome {
    /// Quiescence was reached.
    #[default]
    Completed,
    /// The run timeout expired first.
    TimedOut,
    /// The caller cancelled the run.
    Cancelled,
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutcome::Completed => write!(f, "completed"),
            RunOutcome::TimedOut => write!(f, "timed out"),
            RunOutcome::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A dropped forward.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedForward {
    /// Sending node
    pub from: NodeId,
    /// Intended receiver
    pub to: NodeId,
    /// Why it was dropped
    pub failure: ForwardFailure,
}

/// Counters for a single node actor.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStats {
    /// Node identifier
    pub node: NodeId,

    /// Spanning-tree root the node believes in
    pub root_id: NodeId,

    /// Distance to that root
    pub hop_count: u32,

    /// Parent on the path to the root
    pub next_hop: NodeId,

    /// Packets fully handled
    pub packets_processed: u64,

    /// Copies accepted by the fabric
    pub packets_forwarded: u64,

    /// Processed packets that had no hops left
    pub budget_exhausted: u64,

    /// Forwards dropped because the target was gone
    pub dead_targets: u64,

    /// Forwards dropped because the target's mailbox stayed full
    pub backpressure: u64,

    /// Packets interrupted by shutdown during the processing delay
    pub packets_abandoned: u64,

    /// Packets discarded from the mailbox during shutdown
    pub packets_drained: u64,

    /// Whether the node was modelled as a failed device
    pub failed_device: bool,

    /// State the actor ended in
    pub final_state: ActorState,

    /// Forwards this node dropped
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<FailedForward>,
}

impl NodeStats {
    /// Creates empty counters carrying the node's tree metadata.
    pub fn for_node(node: &Node) -> Self {
        Self {
            node: node.id,
            root_id: node.root_id,
            hop_count: node.hop_count,
            next_hop: node.next_hop,
            ..Self::default()
        }
    }

    /// Records a dropped forward from this node to `to`.
    pub fn record_failure(&mut self, to: NodeId, failure: ForwardFailure) {
        match failure {
            ForwardFailure::DeadTarget => self.dead_targets += 1,
            ForwardFailure::Backpressure => self.backpressure += 1,
        }
        self.failures.push(FailedForward {
            from: self.node,
            to,
            failure,
        });
    }
}

/// Terminal report of one simulation run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    /// Session that produced the report
    pub session: SessionId,

    /// How the run ended
    pub outcome: RunOutcome,

    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,

    /// Hop budget of the seed packets
    pub hop_budget: u32,

    /// Per-node counters, ordered by node id
    pub nodes: BTreeMap<NodeId, NodeStats>,

    /// Seeds the fabric refused
    #[serde(default)]
    pub seed_failures: Vec<FailedForward>,

    /// Actors whose task panicked
    #[serde(default)]
    pub actor_failures: Vec<NodeId>,
}

impl RunReport {
    /// Creates an empty report for `session`.
    pub fn new(session: SessionId) -> Self {
        Self {
            session,
            ..Self::default()
        }
    }

    /// Returns true if the run reached quiescence.
    pub fn is_complete(&self) -> bool {
        self.outcome == RunOutcome::Completed
    }

    /// Returns the number of packets processed per node.
    pub fn processed(&self) -> BTreeMap<NodeId, u64> {
        self.nodes
            .iter()
            .map(|(id, stats)| (*id, stats.packets_processed))
            .collect()
    }

    /// Returns the total number of packets processed.
    pub fn total_processed(&self) -> u64 {
        self.nodes.values().map(|s| s.packets_processed).sum()
    }

    /// Returns the total number of copies accepted by the fabric.
    pub fn total_forwarded(&self) -> u64 {
        self.nodes.values().map(|s| s.packets_forwarded).sum()
    }

    /// Iterates over every dropped forward, seeds first.
    pub fn failures(&self) -> impl Iterator<Item = &FailedForward> + '_ {
        self.seed_failures
            .iter()
            .chain(self.nodes.values().flat_map(|s| s.failures.iter()))
    }

    /// Counts dropped forwards of the given kind.
    pub fn count_failures(&self, failure: ForwardFailure) -> usize {
        self.failures().filter(|f| f.failure == failure).count()
    }

    /// Converts a timed-out report into an error carrying it.
    pub fn into_result(self) -> Result<RunReport, SimError> {
        match self.outcome {
            RunOutcome::TimedOut => Err(SimError::RunTimeout {
                report: Box::new(self),
            }),
            _ => Ok(self),
        }
    }

    /// Exports the report to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Exports the report to a JSON file.
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = self
            .to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }

    /// Exports per-node counters to CSV.
    pub fn to_csv(&self) -> String {
        let mut csv = String::new();

        csv.push_str(
            "node,processed,forwarded,budget_exhausted,dead_targets,backpressure,abandoned,drained,final_state\n",
        );

        for (id, stats) in &self.nodes {
            csv.push_str(&format!(
                "{},{},{},{},{},{},{},{},{}\n",
                id,
                stats.packets_processed,
                stats.packets_forwarded,
                stats.budget_exhausted,
                stats.dead_targets,
                stats.backpressure,
                stats.packets_abandoned,
                stats.packets_drained,
                stats.final_state,
            ));
        }

        csv
    }

    /// Exports per-node counters to a CSV file.
    pub fn to_csv_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        std::fs::write(path, self.to_csv())
    }

    /// Writes a human-readable summary to a writer.
    pub fn write_summary<W: Write>(&self, mut w: W) -> std::io::Result<()> {
        writeln!(w, "=== Run {} ===", self.session)?;
        writeln!(w, "Outcome: {}", self.outcome)?;
        writeln!(w, "Duration: {} ms", self.duration_ms)?;
        writeln!(w, "Hop budget: {}", self.hop_budget)?;
        writeln!(w, "Processed: {}", self.total_processed())?;
        writeln!(w, "Forwarded: {}", self.total_forwarded())?;
        writeln!(
            w,
            "Dropped: {} dead target, {} backpressure",
            self.count_failures(ForwardFailure::DeadTarget),
            self.count_failures(ForwardFailure::Backpressure)
        )?;
        if !self.actor_failures.is_empty() {
            writeln!(w, "Crashed actors: {:?}", self.actor_failures)?;
        }
        writeln!(w)?;

        writeln!(w, "--- Nodes ---")?;
        for (id, stats) in &self.nodes {
            write!(
                w,
                "Node {}: processed {}, forwarded {}",
                id, stats.packets_processed, stats.packets_forwarded
            )?;
            if stats.failed_device {
                write!(w, " (failed device)")?;
            }
            writeln!(w)?;
        }

        Ok(())
    }

    /// Returns the summary as a string.
    pub fn summary(&self) -> String {
        let mut buf = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.write_summary(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

/// A simple timer for measuring wall-clock time.
#[derive(Debug)]
pub struct Timer {
    start: std::time::Instant,
}

impl Timer {
    /// Starts a new timer.
    pub fn start() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }

    /// Returns elapsed time in whole milliseconds.
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::start()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_report() -> RunReport {
        let mut report = RunReport::new(9);
        report.hop_budget = 1;

        let mut hub = NodeStats::for_node(&Node::new(2));
        hub.packets_processed = 3;
        hub.packets_forwarded = 2;
        hub.final_state = ActorState::Terminated;

        let mut leaf = NodeStats::for_node(&Node::new(1).with_tree(2, 1, 2));
        leaf.packets_processed = 2;
        leaf.packets_forwarded = 1;
        leaf.record_failure(3, ForwardFailure::DeadTarget);

        report.nodes.insert(2, hub);
        report.nodes.insert(1, leaf);
        report
    }

    #[test]
    fn test_node_stats_carry_tree_metadata() {
        let stats = NodeStats::for_node(&Node::new(4).with_tree(1, 2, 3));
        assert_eq!(stats.node, 4);
        assert_eq!(stats.root_id, 1);
        assert_eq!(stats.hop_count, 2);
        assert_eq!(stats.next_hop, 3);
        assert_eq!(stats.final_state, ActorState::Idle);
    }

    #[test]
    fn test_record_failure() {
        let mut stats = NodeStats::for_node(&Node::new(1));
        stats.record_failure(2, ForwardFailure::DeadTarget);
        stats.record_failure(3, ForwardFailure::Backpressure);
        stats.record_failure(3, ForwardFailure::Backpressure);

        assert_eq!(stats.dead_targets, 1);
        assert_eq!(stats.backpressure, 2);
        assert_eq!(stats.failures.len(), 3);
        assert_eq!(stats.failures[0].from, 1);
    }

    #[test]
    fn test_totals() {
        let report = sample_report();
        assert_eq!(report.total_processed(), 5);
        assert_eq!(report.total_forwarded(), 3);
        assert_eq!(report.processed().get(&1), Some(&2));
        assert_eq!(report.count_failures(ForwardFailure::DeadTarget), 1);
        assert_eq!(report.count_failures(ForwardFailure::Backpressure), 0);
    }

    #[test]
    fn test_into_result() {
        let report = sample_report();
        assert!(report.is_complete());
        assert!(report.clone().into_result().is_ok());

        let mut cancelled = report.clone();
        cancelled.outcome = RunOutcome::Cancelled;
        assert!(cancelled.into_result().is_ok());

        let mut timed_out = report;
        timed_out.outcome = RunOutcome::TimedOut;
        match timed_out.into_result() {
            Err(SimError::RunTimeout { report }) => assert_eq!(report.total_processed(), 5),
            other => panic!("expected RunTimeout, got {:?}", other),
        }
    }

    #[test]
    fn test_json_export() {
        let report = sample_report();
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

        assert_eq!(json["outcome"], "completed");
        assert_eq!(json["nodes"]["2"]["packetsProcessed"], 3);
        assert_eq!(json["nodes"]["1"]["failures"][0]["failure"], "DeadTarget");
        assert!(json["nodes"]["2"].get("failures").is_none());
    }

    #[test]
    fn test_csv_export() {
        let csv = sample_report().to_csv();
        let mut lines = csv.lines();
        assert!(lines.next().unwrap().starts_with("node,processed"));
        assert_eq!(lines.next().unwrap(), "1,2,1,0,1,0,0,0,idle");
        assert_eq!(lines.next().unwrap(), "2,3,2,0,0,0,0,0,terminated");
    }

    #[test]
    fn test_file_export() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        sample_report().to_json_file(&path).unwrap();

        let restored: RunReport =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(restored, sample_report());
    }

    #[test]
    fn test_summary_output() {
        let summary = sample_report().summary();
        assert!(summary.contains("Run 9"));
        assert!(summary.contains("Outcome: completed"));
        assert!(summary.contains("Processed: 5"));
        assert!(summary.contains("1 dead target"));
    }

    #[test]
    fn test_timer() {
        let timer = Timer::start();
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(timer.elapsed_ms() >= 10);
    }
}
