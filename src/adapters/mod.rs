//! Platform record adapters
//!
//! This module provides adapters that parse raw health-store JSON and map each
//! record to a [`RawRecord`], keeping provenance metadata intact.

mod health_connect;
mod healthkit;

pub use health_connect::HealthConnectAdapter;
pub use healthkit::HealthKitAdapter;

use crate::error::ReconcileError;
use crate::types::RawRecord;

/// Trait for platform record adapters
pub trait RecordAdapter {
    /// Parse a JSON document keyed by platform record type
    fn parse(&self, raw_json: &str) -> Result<Vec<RawRecord>, ReconcileError>;
}
