//! Crate-level error type.

use thiserror::Error;

use crate::config::ConfigError;
use crate::stats::RunReport;
use crate::validate::ValidationError;

/// Errors surfaced by a simulation session.
#[derive(Error, Debug)]
pub enum SimError {
    /// The input could not be decoded. No session was started.
    #[error("malformed input: {0}")]
    MalformedInput(#[from] serde_json::Error),

    /// The topology was rejected. No session was started.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The run did not reach quiescence in time.
    #[error("run timed out after {} ms with {} packets processed", .report.duration_ms, .report.total_processed())]
    RunTimeout {
        /// Partial report of the run
        report: Box<RunReport>,
    },
}

impl SimError {
    /// Returns a stable name for the error, used in error replies.
    pub fn kind(&self) -> &'static str {
        match self {
            SimError::MalformedInput(_) => "MalformedInput",
            SimError::Validation(e) => e.kind(),
            SimError::Config(_) => "InvalidConfig",
            SimError::RunTimeout { .. } => "RunTimeout",
        }
    }
}

/// Result type for simulation operations.
pub type SimResult<T> = Result<T, SimError>;
