//! # Bridgesim
//!
//! A concurrent packet-forwarding simulator for bridged networks whose
//! spanning tree has already been computed elsewhere.
//!
//! ## Design Principles
//!
//! - **Topology as input**: node, port and link data arrive precomputed
//!   (for instance through an `initSTP` envelope) and are validated before
//!   anything runs. Forwarding cycles are rejected up front.
//! - **One actor per bridge**: every node runs as its own tokio task with a
//!   bounded mailbox, handling packets in arrival order and forwarding a copy
//!   on each port in the forwarding state.
//! - **Bounded propagation**: every packet carries a hop budget, so even a
//!   topology that slipped past validation cannot flood forever.
//! - **Session per run**: each run owns its fabric, cancellation flag and
//!   report, and ends in quiescence, timeout or cancellation.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bridgesim::{Node, Port, SimConfigBuilder, SimulationSession, Topology};
//! use std::time::Duration;
//!
//! # async fn demo() -> Result<(), bridgesim::SimError> {
//! let topology = Topology::new()
//!     .with_node(Node::new(2).with_port(Port::forwarding(1, 1)).with_port(Port::forwarding(2, 3)))
//!     .with_node(Node::new(1).with_tree(2, 1, 2).with_port(Port::forwarding(1, 2)))
//!     .with_node(Node::new(3).with_tree(2, 1, 2).with_port(Port::forwarding(1, 2)))
//!     .with_link(1, 2)
//!     .with_link(2, 3);
//!
//! let config = SimConfigBuilder::new()
//!     .processing_delay(Duration::from_millis(10))
//!     .build()?;
//!
//! let report = SimulationSession::new(config).run(topology).await?;
//! assert_eq!(report.total_processed(), 7);
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration-Driven Setup
//!
//! ```rust,ignore
//! use bridgesim::SimConfig;
//!
//! let config = SimConfig::from_yaml_file("bridgesim.yaml")?;
//! let handler = bridgesim::IngressHandler::new(config);
//! ```

pub mod types;
pub mod topology;
pub mod validate;
pub mod packet;
pub mod event;
pub mod fabric;
pub mod actor;
pub mod session;
pub mod stats;
pub mod config;
pub mod ingress;
pub mod error;

// Re-export commonly used types
pub use types::{HopBudget, NodeId, PortNumber, SessionId};
pub use topology::{Link, Node, Port, PortState, Topology};
pub use validate::{validate, ValidatedTopology, ValidationError};
pub use packet::Packet;
pub use event::{SessionEvent, SimEvent};
pub use fabric::{DispatchFabric, ForwardFailure, InFlight};
pub use actor::{ActorState, NodeActor};
pub use session::{CancelHandle, SimulationSession};
pub use stats::{FailedForward, NodeStats, RunOutcome, RunReport, Timer};
pub use config::{
    ConfigError, SimConfig, SimConfigBuilder, SimulationParams, ValidationParams, MAX_HOP_BUDGET,
};
pub use ingress::{Envelope, IngressHandler, Reply};
pub use error::{SimError, SimResult};

/// Initialize the tracing subscriber for logging.
///
/// Call this at the start of your program to enable logging. `RUST_LOG`
/// overrides `level`. Output goes to stderr so stdout stays free for replies.
///
/// # Example
///
/// ```rust,ignore
/// bridgesim::init_logging("info");
/// ```
pub fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// Initialize the tracing subscriber with JSON output.
///
/// Selected by the binary when `RUST_LOG_FORMAT=json`.
pub fn init_logging_json(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Initialize the tracing subscriber for tests.
///
/// Safe to call from every test; only the first call installs a subscriber.
pub fn init_test_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("debug"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
