//! Envelope ingress and reply egress.
//!
//! Requests arrive as JSON envelopes `{"type": ..., "data": ...}`. Only
//! `initSTP` does anything: its `data` is a topology, which is validated and
//! simulated in a fresh session. Every envelope gets exactly one [`Reply`].
//!
//! ```text
//! {"type":"initSTP","data":{"nodes":[...],"links":[...]}}
//!     -> {"type":"stpReport","data":{...run report...}}
//! {"type":"initSTP","data":{"nodes":"oops"}}
//!     -> {"type":"stpError","data":{"kind":"MalformedInput","message":"..."}}
//! {"type":"ping","data":null}
//!     -> {"type":"ignored","data":"ping"}
//! ```

use serde::{Deserialize, Serialize};

use crate::config::SimConfig;
use crate::error::{SimError, SimResult};
use crate::session::SimulationSession;
use crate::stats::RunReport;
use crate::topology::Topology;

/// Envelope type that starts a simulation.
pub const INIT_STP: &str = "initSTP";

/// A raw request envelope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Request type
    #[serde(rename = "type")]
    pub kind: String,
    /// Type-specific payload
    #[serde(default)]
    pub data: serde_json::Value,
}

/// A decoded request.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Simulate the given topology.
    InitStp(Topology),
    /// An envelope type this crate does not handle.
    Unknown(String),
}

/// Decodes an envelope and its payload.
pub fn parse_envelope(bytes: &[u8]) -> SimResult<Command> {
    let envelope: Envelope = serde_json::from_slice(bytes)?;
    if envelope.kind == INIT_STP {
        Ok(Command::InitStp(serde_json::from_value(envelope.data)?))
    } else {
        Ok(Command::Unknown(envelope.kind))
    }
}

/// Payload of an error reply.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable error name
    pub kind: String,
    /// Human-readable description
    pub message: String,
}

impl From<&SimError> for ErrorBody {
    fn from(err: &SimError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// A reply envelope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Reply {
    /// Report of a run that started, whatever its outcome.
    #[serde(rename = "stpReport")]
    StpReport(RunReport),
    /// The request was rejected.
    #[serde(rename = "stpError")]
    StpError(ErrorBody),
    /// The envelope type is not handled.
    #[serde(rename = "ignored")]
    Ignored(String),
}

impl Reply {
    /// Builds an error reply.
    pub fn error(err: &SimError) -> Self {
        Reply::StpError(ErrorBody::from(err))
    }

    /// Serializes the reply as a single JSON line, without the newline.
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Turns envelopes into simulation runs.
#[derive(Clone, Debug, Default)]
pub struct IngressHandler {
    config: SimConfig,
}

impl IngressHandler {
    /// Creates a handler that runs every topology with `config`.
    pub fn new(config: SimConfig) -> Self {
        Self { config }
    }

    /// Handles one envelope. Never fails; errors become error replies.
    pub async fn handle(&self, bytes: &[u8]) -> Reply {
        match parse_envelope(bytes) {
            Ok(Command::InitStp(topology)) => self.simulate(topology).await,
            Ok(Command::Unknown(kind)) => {
                tracing::warn!(kind = %kind, "ignoring envelope of unknown type");
                Reply::Ignored(kind)
            }
            Err(err) => {
                tracing::warn!(%err, "malformed envelope");
                Reply::error(&err)
            }
        }
    }

    /// Handles one envelope given as a text line.
    pub async fn handle_line(&self, line: &str) -> Reply {
        self.handle(line.trim().as_bytes()).await
    }

    async fn simulate(&self, topology: Topology) -> Reply {
        let session = SimulationSession::new(self.config.clone());
        tracing::debug!(
            session = session.id(),
            nodes = topology.node_count(),
            "initSTP received"
        );
        match session.run(topology).await {
            Ok(report) => Reply::StpReport(report),
            Err(err) => Reply::error(&err),
        }
    }
}
