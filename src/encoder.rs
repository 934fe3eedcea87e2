//! Output encoding
//!
//! Turns reconciled buckets into the consumer payload: local ISO 8601
//! timestamps with an explicit numeric offset and millisecond precision,
//! plus the dashboard day totals.

use crate::buckets::HourlyBucket;
use crate::error::ReconcileError;
use crate::types::{DashboardMetrics, HourlyHealthPayload};
use chrono::{DateTime, Duration, FixedOffset, SecondsFormat, Utc};
use serde::Serialize;

/// Local ISO 8601 format, e.g. `2024-05-15T14:00:00.000+07:00`
pub const LOCAL_ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%:z";

pub const ENERGY_UNIT: &str = "kcal";
pub const DISTANCE_UNIT: &str = "m";

/// Format an instant as local ISO 8601 with its UTC offset
pub fn to_local_iso(instant: DateTime<FixedOffset>) -> String {
    instant.format(LOCAL_ISO_FORMAT).to_string()
}

/// Encode one bucket. `endDate` is the bucket's last millisecond.
pub fn encode_bucket(bucket: &HourlyBucket) -> HourlyHealthPayload {
    HourlyHealthPayload {
        steps: bucket.steps,
        active_calories: bucket.active_calories,
        active_calories_unit: ENERGY_UNIT.to_string(),
        distance: bucket.distance,
        distance_unit: DISTANCE_UNIT.to_string(),
        start_date: to_local_iso(bucket.start()),
        end_date: to_local_iso(bucket.end() - Duration::milliseconds(1)),
    }
}

pub fn encode_payload(buckets: &[HourlyBucket]) -> Vec<HourlyHealthPayload> {
    buckets.iter().map(encode_bucket).collect()
}

/// Sum the hourly payload into day totals stamped with `generated_at`
pub fn dashboard(payload: &[HourlyHealthPayload], generated_at: DateTime<Utc>) -> DashboardMetrics {
    let (steps, active_calories, distance) = payload.iter().fold(
        (0.0, 0.0, 0.0),
        |(steps, active, distance), hour| {
            (
                steps + hour.steps,
                active + hour.active_calories,
                distance + hour.distance,
            )
        },
    );

    DashboardMetrics {
        steps,
        active_calories_kcal: active_calories,
        distance_meters: distance,
        last_updated_iso: generated_at.to_rfc3339_opts(SecondsFormat::Millis, true),
    }
}

/// Serialized output layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// One JSON document per line
    Ndjson,
    /// Compact JSON array
    Json,
    /// Indented JSON array
    JsonPretty,
}

/// Serialize a list of records in the requested layout
pub fn format_records<T: Serialize>(
    records: &[T],
    format: OutputFormat,
) -> Result<String, ReconcileError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines = Vec::with_capacity(records.len());
            for record in records {
                lines.push(serde_json::to_string(record)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(records)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(records)?),
    }
}
