//! Error types for health reconciliation

use crate::types::HealthState;
use thiserror::Error;

/// Errors that can surface from a reconciliation call.
///
/// Per-record and per-source problems never show up here; they degrade to
/// audit entries and stats. Only caller-level failures do.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Health layer not ready. Current state: {0}")]
    NotReady(HealthState),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Failed to parse record payload: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid date or offset: {0}")]
    InvalidDate(String),
}

/// Errors reported at the record boundary: a failed fetch, or a record an
/// adapter could only read in part
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    #[error("Record source unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed source response: {0}")]
    Parse(String),
}
