// src/errors.rs
//
// =============================================================================
// PIPETLAB: ERROR TAXONOMY (v 0.1 )
// =============================================================================
//
// Every failure the engine can report, grouped by what the operator must fix.
//
// Rules:
// 1. Placement/content/geometry violations surface immediately, never retried.
// 2. Hardware `CommandFailed` is retried only by the tip candidate search.
// 3. `Aborted` is raised after the recovery home move has been issued.

use thiserror::Error;

/// Failures reported by the motor/piston driver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    /// The device executed the command but it did not succeed
    /// (no tip found, motion blocked).
    #[error("command failed: {0}")]
    CommandFailed(String),

    #[error("command not accepted: {0}")]
    CommandNotAccepted(String),

    #[error("pipettor not connected")]
    NotConnected,
}

#[derive(Debug, Error)]
pub enum LabError {
    /// Invalid slot, overlapping bounds, duplicate id, stacking violation.
    #[error("placement error: {0}")]
    Placement(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Content overflow or underflow.
    #[error("capacity error: {0}")]
    Capacity(String),

    #[error("unreachable: pipettor z {pipettor_z:.2} mm outside [0, {z_max}] for {target}")]
    Reachability {
        pipettor_z: f64,
        z_max: f64,
        target: String,
    },

    #[error("tip state error: {0}")]
    TipState(String),

    #[error("hardware command error: {0}")]
    Hardware(#[from] DriverError),

    #[error("operation aborted by operator")]
    Aborted,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("codec error: {0}")]
    Codec(String),
}

impl LabError {
    /// True for driver failures the tip candidate search may step over.
    pub fn is_retryable_hardware(&self) -> bool {
        matches!(self, LabError::Hardware(DriverError::CommandFailed(_)))
    }
}

impl From<serde_json::Error> for LabError {
    fn from(e: serde_json::Error) -> Self {
        LabError::Codec(e.to_string())
    }
}

pub type LabResult<T> = Result<T, LabError>;
