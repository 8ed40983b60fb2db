//! Simulation sessions.
//!
//! A [`SimulationSession`] owns everything one run needs: the configuration,
//! a cancellation flag and an optional observation stream. Running a
//! topology validates it, spawns one actor per node on the tokio runtime,
//! seeds every node with one packet and then waits for the first of
//! quiescence, the run timeout or cancellation. Whatever ends the wait, the
//! session broadcasts shutdown, closes every mailbox, joins the actors and
//! assembles a [`RunReport`].
//!
//! Sessions share no state with each other, so any number of them can run
//! concurrently.
//!
//! ```no_run
//! use bridgesim::{SimConfig, SimulationSession, Topology};
//!
//! # async fn demo(topology: Topology) -> Result<(), bridgesim::SimError> {
//! let session = SimulationSession::new(SimConfig::default());
//! let report = session.run(topology).await?;
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::actor::NodeActor;
use crate::config::SimConfig;
use crate::error::SimResult;
use crate::event::{EventSink, SessionEvent};
use crate::fabric::DispatchFabric;
use crate::packet::Packet;
use crate::stats::{FailedForward, NodeStats, RunOutcome, RunReport, Timer};
use crate::topology::Topology;
use crate::types::{next_session_id, NodeId, SessionId};
use crate::validate::{validate, ValidatedTopology};

/// Cloneable handle that cancels a session.
///
/// Cancellation is sticky: once cancelled, the current run and any later run
/// of the same session end with [`RunOutcome::Cancelled`].
#[derive(Clone, Debug)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Requests cancellation.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Returns true if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// One simulation session.
#[derive(Debug)]
pub struct SimulationSession {
    id: SessionId,
    config: SimConfig,
    cancel: Arc<watch::Sender<bool>>,
    events: EventSink,
}

impl SimulationSession {
    /// Creates a session with a fresh identifier.
    pub fn new(config: SimConfig) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            id: next_session_id(),
            config,
            cancel: Arc::new(cancel),
            events: EventSink::disabled(),
        }
    }

    /// Returns the session identifier.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Returns the session configuration.
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Returns a handle that cancels this session.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: Arc::clone(&self.cancel),
        }
    }

    /// Starts collecting observation events for subsequent runs.
    ///
    /// Calling this again replaces the previous stream.
    pub fn observe(&mut self) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.events = EventSink::new(self.id, tx);
        rx
    }

    /// Validates and runs `topology`.
    ///
    /// Configuration and validation errors are returned before any actor is
    /// spawned. Every run that starts produces a report, whatever its
    /// outcome; use [`RunReport::into_result`] to treat a timeout as an
    /// error.
    pub async fn run(&self, topology: Topology) -> SimResult<RunReport> {
        self.config.validate()?;
        let validated = validate(topology, &self.config.validation).map_err(|err| {
            tracing::warn!(session = self.id, kind = err.kind(), %err, "topology rejected");
            err
        })?;
        Ok(self.run_validated(validated).await)
    }

    /// Parses a JSON topology and runs it.
    pub async fn run_json(&self, json: &str) -> SimResult<RunReport> {
        let topology = Topology::from_json(json)?;
        self.run(topology).await
    }

    /// Runs an already validated topology.
    pub async fn run_validated(&self, topology: ValidatedTopology) -> RunReport {
        let span = tracing::info_span!("session", id = self.id);
        self.execute(topology).instrument(span).await
    }

    async fn execute(&self, topology: ValidatedTopology) -> RunReport {
        let params = &self.config.simulation;
        let timer = Timer::start();
        // Saturates instead of overflowing on huge timeouts.
        let deadline = tokio::time::sleep(params.run_timeout());
        tokio::pin!(deadline);

        let mut report = RunReport::new(self.id);
        report.hop_budget = params.hop_budget;

        tracing::info!(
            nodes = topology.node_count(),
            hop_budget = params.hop_budget,
            "run started"
        );

        let (fabric, mailboxes) = DispatchFabric::new(
            topology.node_ids(),
            params.mailbox_capacity,
            params.send_timeout(),
        );
        let fabric = Arc::new(fabric);
        let (shutdown, _) = watch::channel(false);

        let failed: HashSet<NodeId> = params.failed_nodes.iter().copied().collect();
        for id in &failed {
            if !topology.contains(*id) {
                tracing::warn!(node = *id, "failed node not in topology, ignoring");
            }
        }

        let mut actors: Vec<(NodeId, JoinHandle<NodeStats>)> = Vec::with_capacity(mailboxes.len());
        for (node, mailbox) in topology.nodes().iter().zip(mailboxes) {
            let mut actor = NodeActor::new(
                node.clone(),
                mailbox,
                Arc::clone(&fabric),
                shutdown.subscribe(),
            )
            .with_processing_delay(params.processing_delay())
            .with_events(self.events.clone());

            if failed.contains(&node.id) {
                fabric.close(node.id);
                actor = actor.failed();
            }

            let span = tracing::debug_span!("node", id = node.id);
            actors.push((node.id, tokio::spawn(actor.run().instrument(span))));
        }

        for id in topology.node_ids() {
            if let Err(failure) = fabric.send(id, Packet::seed(id, params.hop_budget)).await {
                tracing::warn!(node = id, %failure, "seed dropped");
                report.seed_failures.push(FailedForward {
                    from: id,
                    to: id,
                    failure,
                });
            }
        }

        let mut cancelled = self.cancel.subscribe();
        let outcome = tokio::select! {
            biased;
            _ = cancelled.wait_for(|c| *c) => RunOutcome::Cancelled,
            _ = fabric.in_flight().settled() => RunOutcome::Completed,
            _ = &mut deadline => RunOutcome::TimedOut,
        };

        shutdown.send_replace(true);
        for id in topology.node_ids() {
            fabric.close(id);
        }

        for (id, handle) in actors {
            match handle.await {
                Ok(stats) => {
                    report.nodes.insert(id, stats);
                }
                Err(err) => {
                    tracing::error!(node = id, error = %err, "actor task failed");
                    report.actor_failures.push(id);
                }
            }
        }

        report.outcome = outcome;
        report.duration_ms = timer.elapsed_ms();

        match outcome {
            RunOutcome::Completed => tracing::info!(
                processed = report.total_processed(),
                duration_ms = report.duration_ms,
                "run completed"
            ),
            _ => tracing::warn!(
                %outcome,
                processed = report.total_processed(),
                pending = fabric.in_flight().pending(),
                duration_ms = report.duration_ms,
                "run ended early"
            ),
        }

        report
    }
}
