//! Health Reconcile - On-device reconciliation of health-store records
//!
//! Reconcile turns raw, provenance-tagged health records into 24 trusted hourly
//! buckets for one local day through a deterministic pipeline: platform
//! adaptation → trust validation → bucket distribution → active-energy
//! fallback → payload encoding.
//!
//! ## Modules
//!
//! - **Adapters**: Parse Health Connect and HealthKit JSON into raw records
//! - **Pipeline**: Fetch, validate, distribute and estimate one day
//! - **Layer**: Readiness-gated façade for host applications

pub mod adapters;
pub mod audit;
pub mod buckets;
pub mod config;
pub mod encoder;
pub mod error;
pub mod estimator;
pub mod extractor;
pub mod layer;
pub mod pipeline;
pub mod source;
pub mod trust;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use buckets::DayWindow;
pub use config::ReconcileConfig;
pub use error::{ReconcileError, SourceError};
pub use layer::HealthLayer;
pub use pipeline::{
    health_connect_to_hourly, healthkit_to_hourly, DayReport, DebugSnapshot, Reconciler,
};
pub use source::{PermissionGate, RecordSource};
pub use trust::TrustPolicy;
pub use types::{DashboardMetrics, HealthState, HourlyHealthPayload, RawRecord, RecordKind};

/// Library version reported by the CLI and embedded in reports
pub const RECONCILE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported by the CLI
pub const PRODUCER_NAME: &str = "health-reconcile";
