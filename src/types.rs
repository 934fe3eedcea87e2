//! Core types for the reconciliation pipeline
//!
//! This module defines the data structures that flow through each stage:
//! raw provenance-tagged records, canonical samples, and the hourly payload
//! handed to consumers.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Record types read from the platform health store
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    #[serde(rename = "Steps")]
    Steps,
    #[serde(rename = "Distance")]
    Distance,
    #[serde(rename = "ActiveCal")]
    ActiveCalories,
    #[serde(rename = "TotalCal")]
    TotalCalories,
    #[serde(rename = "BMR")]
    BasalMetabolicRate,
}

impl RecordKind {
    /// All kinds, in the order the pipeline processes them
    pub const ALL: [RecordKind; 5] = [
        RecordKind::Steps,
        RecordKind::Distance,
        RecordKind::ActiveCalories,
        RecordKind::TotalCalories,
        RecordKind::BasalMetabolicRate,
    ];

    /// Short name used in stats and audit entries
    pub fn type_name(&self) -> &'static str {
        match self {
            RecordKind::Steps => "Steps",
            RecordKind::Distance => "Distance",
            RecordKind::ActiveCalories => "ActiveCal",
            RecordKind::TotalCalories => "TotalCal",
            RecordKind::BasalMetabolicRate => "BMR",
        }
    }

    /// Record type identifier as named by Health Connect
    pub fn health_connect_name(&self) -> &'static str {
        match self {
            RecordKind::Steps => "Steps",
            RecordKind::Distance => "Distance",
            RecordKind::ActiveCalories => "ActiveCaloriesBurned",
            RecordKind::TotalCalories => "TotalCaloriesBurned",
            RecordKind::BasalMetabolicRate => "BasalMetabolicRate",
        }
    }

    pub fn from_health_connect_name(name: &str) -> Option<Self> {
        RecordKind::ALL
            .into_iter()
            .find(|kind| kind.health_connect_name() == name)
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Payload shapes a health record can carry
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum RecordPayload {
    Count { count: f64 },
    Energy { kilocalories: f64 },
    Distance { meters: f64 },
    BasalRate { kilocalories_per_day: f64 },
}

/// Device that captured a record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl DeviceInfo {
    /// Human-readable "manufacturer model" label
    pub fn label(&self) -> String {
        format!(
            "{} {}",
            self.manufacturer.as_deref().unwrap_or("unknown"),
            self.model.as_deref().unwrap_or("unknown")
        )
    }
}

/// Provenance metadata attached to a raw record
///
/// Keys the pipeline does not interpret are kept in `extra` so the audit log
/// can reproduce the metadata as it was received.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMetadata {
    /// Origin identifier (package name or bundle identifier)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_origin: Option<String>,
    /// Recording method code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recording_method: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceInfo>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

const DATA_ORIGIN_KEY: &str = "dataOrigin";
const RECORDING_METHOD_KEY: &str = "recordingMethod";
const DEVICE_KEY: &str = "device";

impl RecordMetadata {
    /// Read metadata from JSON, keeping whatever fields are usable.
    ///
    /// Known keys whose values have the wrong type stay in `extra` as received
    /// instead of failing the record. Returns `None` unless `value` is an object.
    pub fn from_value_lossy(value: &serde_json::Value) -> Option<Self> {
        if let Ok(metadata) = serde_json::from_value::<RecordMetadata>(value.clone()) {
            return Some(metadata);
        }

        let mut extra = value.as_object()?.clone();
        let data_origin = take_field(&mut extra, DATA_ORIGIN_KEY, |v| v.as_str().map(str::to_string));
        let recording_method = take_field(&mut extra, RECORDING_METHOD_KEY, serde_json::Value::as_i64);
        let device = take_field(&mut extra, DEVICE_KEY, |v| serde_json::from_value(v.clone()).ok());

        Some(Self {
            data_origin,
            recording_method,
            device,
            extra,
        })
    }

    /// A recording method was supplied but could not be read as a code
    pub fn has_unreadable_recording_method(&self) -> bool {
        self.recording_method.is_none()
            && self
                .extra
                .get(RECORDING_METHOD_KEY)
                .is_some_and(|v| !v.is_null())
    }
}

/// Remove `key` from `map` if `convert` accepts its value
fn take_field<T>(
    map: &mut serde_json::Map<String, serde_json::Value>,
    key: &str,
    convert: impl Fn(&serde_json::Value) -> Option<T>,
) -> Option<T> {
    let converted = map.get(key).and_then(convert)?;
    map.remove(key);
    Some(converted)
}

/// A raw record as delivered by a record source
///
/// Timestamps stay as received; they are only parsed once the record is
/// turned into a [`CanonicalSample`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub kind: RecordKind,
    /// Start of the record (RFC 3339)
    pub start_time: Option<String>,
    /// End of the record (RFC 3339); absent for instantaneous samples
    pub end_time: Option<String>,
    pub payload: Option<RecordPayload>,
    pub metadata: Option<RecordMetadata>,
}

impl RawRecord {
    pub fn origin(&self) -> Option<&str> {
        self.metadata.as_ref().and_then(|m| m.data_origin.as_deref())
    }

    pub fn recording_method(&self) -> Option<i64> {
        self.metadata.as_ref().and_then(|m| m.recording_method)
    }
}

/// A raw record with parsed bounds and an extracted scalar value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalSample {
    pub kind: RecordKind,
    pub start: DateTime<Utc>,
    /// Equal to `start` for instantaneous samples
    pub end: DateTime<Utc>,
    pub value: f64,
    pub origin_id: Option<String>,
    pub recording_method: Option<i64>,
    pub trusted: bool,
}

impl CanonicalSample {
    pub fn is_instantaneous(&self) -> bool {
        self.end == self.start
    }
}

/// Inclusive query range handed to a record source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
}

impl TimeRange {
    /// Whether `[start, end]` intersects this range
    pub fn intersects(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        start <= self.end && end >= self.start
    }
}

/// Readiness of the platform health store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthState {
    NotSupported,
    HealthAppMissing,
    NotAuthorized,
    NoTrustedData,
    Ready,
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HealthState::NotSupported => "NOT_SUPPORTED",
            HealthState::HealthAppMissing => "HEALTH_APP_MISSING",
            HealthState::NotAuthorized => "NOT_AUTHORIZED",
            HealthState::NoTrustedData => "NO_TRUSTED_DATA",
            HealthState::Ready => "READY",
        };
        f.write_str(name)
    }
}

/// One hour of reconciled activity, as handed to consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HourlyHealthPayload {
    pub steps: f64,
    pub active_calories: f64,
    pub active_calories_unit: String,
    pub distance: f64,
    pub distance_unit: String,
    /// ISO 8601 local time with numeric offset
    pub start_date: String,
    /// ISO 8601 local time with numeric offset (last millisecond of the hour)
    pub end_date: String,
}

/// Day totals for dashboard display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardMetrics {
    pub steps: f64,
    pub active_calories_kcal: f64,
    pub distance_meters: f64,
    #[serde(rename = "lastUpdatedISO")]
    pub last_updated_iso: String,
}
