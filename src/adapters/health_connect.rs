//! Health Connect adapter
//!
//! Parses Health Connect `readRecords` output and maps it to raw records.
//! Records are read one at a time: a record with wrongly typed fields keeps
//! its usable fields and still reaches trust validation and the audit log.

use crate::error::{ReconcileError, SourceError};
use crate::types::{RawRecord, RecordKind, RecordMetadata, RecordPayload};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::RecordAdapter;

/// Health Connect record adapter
///
/// Accepts a document mapping record type names (`Steps`, `Distance`,
/// `ActiveCaloriesBurned`, `TotalCaloriesBurned`, `BasalMetabolicRate`) to
/// either a record array or a `{"records": [...]}` response.
pub struct HealthConnectAdapter;

impl RecordAdapter for HealthConnectAdapter {
    fn parse(&self, raw_json: &str) -> Result<Vec<RawRecord>, ReconcileError> {
        let document: BTreeMap<String, Value> = serde_json::from_str(raw_json)?;

        let mut by_kind: BTreeMap<RecordKind, Vec<RawRecord>> = BTreeMap::new();
        for (type_name, response) in document {
            let Some(kind) = RecordKind::from_health_connect_name(&type_name) else {
                debug!(record_type = %type_name, "Skipping unsupported Health Connect record type");
                continue;
            };
            let Some(records) = response_records(&response) else {
                warn!(record_type = %type_name, "Skipping Health Connect response without a record list");
                continue;
            };
            by_kind
                .entry(kind)
                .or_default()
                .extend(records.iter().map(|r| record_from_value(kind, r)));
        }

        // Keep pipeline processing order
        Ok(RecordKind::ALL
            .into_iter()
            .flat_map(|kind| by_kind.remove(&kind).unwrap_or_default())
            .collect())
    }
}

impl HealthConnectAdapter {
    /// Parse a single `readRecords` response for a known record type
    pub fn parse_response(&self, kind: RecordKind, raw_json: &str) -> Result<Vec<RawRecord>, ReconcileError> {
        let response: Value = serde_json::from_str(raw_json)?;
        let records = response_records(&response).ok_or_else(|| {
            ReconcileError::ParseError(format!(
                "{} response is neither a record array nor {{\"records\": [...]}}",
                kind.health_connect_name()
            ))
        })?;
        Ok(records.iter().map(|r| record_from_value(kind, r)).collect())
    }
}

/// Records of a bare array or a `{"records": [...]}` response
fn response_records(response: &Value) -> Option<&Vec<Value>> {
    match response {
        Value::Array(records) => Some(records),
        Value::Object(wrapper) => wrapper.get("records")?.as_array(),
        _ => None,
    }
}

fn record_from_value(kind: RecordKind, value: &Value) -> RawRecord {
    match HcRecord::deserialize(value) {
        Ok(record) => record.into_raw(kind),
        Err(e) => {
            let error = SourceError::Parse(e.to_string());
            warn!(
                record_type = kind.health_connect_name(),
                error = %error,
                "Keeping usable fields of malformed record"
            );
            HcRecord::from_value_lossy(value).into_raw(kind)
        }
    }
}

// Health Connect response structures

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HcRecord {
    start_time: Option<String>,
    end_time: Option<String>,
    /// Instantaneous records (e.g. basal metabolic rate) carry `time`
    time: Option<String>,
    count: Option<f64>,
    energy: Option<HcEnergy>,
    distance: Option<HcLength>,
    basal_metabolic_rate: Option<HcPower>,
    metadata: Option<RecordMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HcEnergy {
    in_kilocalories: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HcLength {
    in_meters: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HcPower {
    in_kilocalories_per_day: Option<f64>,
}

impl HcRecord {
    /// Field-by-field read that drops values of the wrong type
    fn from_value_lossy(value: &Value) -> Self {
        let text = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);
        let nested = |outer: &str, inner: &str| {
            value
                .get(outer)
                .and_then(|o| o.get(inner))
                .and_then(Value::as_f64)
        };

        HcRecord {
            start_time: text("startTime"),
            end_time: text("endTime"),
            time: text("time"),
            count: value.get("count").and_then(Value::as_f64),
            energy: nested("energy", "inKilocalories").map(|v| HcEnergy {
                in_kilocalories: Some(v),
            }),
            distance: nested("distance", "inMeters").map(|v| HcLength { in_meters: Some(v) }),
            basal_metabolic_rate: nested("basalMetabolicRate", "inKilocaloriesPerDay").map(|v| HcPower {
                in_kilocalories_per_day: Some(v),
            }),
            metadata: value.get("metadata").and_then(RecordMetadata::from_value_lossy),
        }
    }

    /// First present shape wins: count, energy, distance, basal rate
    fn payload(&self) -> Option<RecordPayload> {
        if let Some(count) = self.count {
            return Some(RecordPayload::Count { count });
        }
        if let Some(kilocalories) = self.energy.as_ref().and_then(|e| e.in_kilocalories) {
            return Some(RecordPayload::Energy { kilocalories });
        }
        if let Some(meters) = self.distance.as_ref().and_then(|d| d.in_meters) {
            return Some(RecordPayload::Distance { meters });
        }
        self.basal_metabolic_rate
            .as_ref()
            .and_then(|b| b.in_kilocalories_per_day)
            .map(|kilocalories_per_day| RecordPayload::BasalRate {
                kilocalories_per_day,
            })
    }

    fn into_raw(self, kind: RecordKind) -> RawRecord {
        let payload = self.payload();
        RawRecord {
            kind,
            start_time: self.start_time.or(self.time),
            end_time: self.end_time,
            payload,
            metadata: self.metadata,
        }
    }
}
