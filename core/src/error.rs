//! Caller-facing failure taxonomy for scan runs.
//!
//! Per-port socket failures never surface here; those are absorbed into
//! [`crate::models::PortStatus`] so every probe outcome stays observable as
//! data.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    /// Request carried no target; rejected before any scan starts.
    #[error("missing 'target' parameter")]
    MissingTarget,
    /// A scan is already active and the coordinator rejects concurrent runs.
    #[error("scan already in progress for {target}")]
    AlreadyRunning { target: String },
    /// Run was superseded or cancelled before completion.
    #[error("scan cancelled")]
    Cancelled,
    /// Report could not be written; fatal to the run, not the process.
    #[error("failed to persist report: {0}")]
    Persist(String),
}
