//! HealthKit adapter
//!
//! Parses HealthKit quantity samples and maps them to raw records. The source
//! bundle identifier becomes the record origin and `HKWasUserEntered` maps to
//! the manual-entry recording method, so one trust policy covers both
//! platforms. Samples are read one at a time and an unusable field never
//! drops its sample.

use crate::error::{ReconcileError, SourceError};
use crate::trust::RECORDING_METHOD_MANUAL_ENTRY;
use crate::types::{DeviceInfo, RawRecord, RecordKind, RecordMetadata, RecordPayload};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::RecordAdapter;

const STEP_COUNT: &str = "HKQuantityTypeIdentifierStepCount";
const ACTIVE_ENERGY: &str = "HKQuantityTypeIdentifierActiveEnergyBurned";
const DISTANCE_WALKING_RUNNING: &str = "HKQuantityTypeIdentifierDistanceWalkingRunning";

const USER_ENTERED_KEY: &str = "HKWasUserEntered";

const KJ_PER_KCAL: f64 = 4.184;
const METERS_PER_MILE: f64 = 1609.344;

/// HealthKit quantity sample adapter
pub struct HealthKitAdapter;

impl RecordAdapter for HealthKitAdapter {
    fn parse(&self, raw_json: &str) -> Result<Vec<RawRecord>, ReconcileError> {
        let document: BTreeMap<String, Value> = serde_json::from_str(raw_json)?;

        let mut records = Vec::new();
        for (identifier, samples) in document {
            let Some(kind) = kind_for_identifier(&identifier) else {
                debug!(identifier = %identifier, "Skipping unsupported HealthKit quantity type");
                continue;
            };
            let Some(samples) = samples.as_array() else {
                warn!(identifier = %identifier, "Skipping HealthKit entry that is not a sample list");
                continue;
            };
            records.extend(samples.iter().map(|sample| sample_from_value(kind, sample)));
        }

        records.sort_by_key(|r| RecordKind::ALL.iter().position(|k| *k == r.kind));
        Ok(records)
    }
}

fn kind_for_identifier(identifier: &str) -> Option<RecordKind> {
    match identifier {
        STEP_COUNT => Some(RecordKind::Steps),
        ACTIVE_ENERGY => Some(RecordKind::ActiveCalories),
        DISTANCE_WALKING_RUNNING => Some(RecordKind::Distance),
        _ => None,
    }
}

fn sample_from_value(kind: RecordKind, value: &Value) -> RawRecord {
    match HkSample::deserialize(value) {
        Ok(sample) => sample.into_raw(kind),
        Err(e) => {
            let error = SourceError::Parse(e.to_string());
            warn!(
                record_type = kind.type_name(),
                error = %error,
                "Keeping usable fields of malformed sample"
            );
            HkSample::from_value_lossy(value).into_raw(kind)
        }
    }
}

// HealthKit sample structures

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HkSample {
    quantity: Option<f64>,
    unit: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
    source_revision: Option<HkSourceRevision>,
    device: Option<DeviceInfo>,
    #[serde(default)]
    metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct HkSourceRevision {
    source: Option<HkSource>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HkSource {
    bundle_identifier: Option<String>,
}

impl HkSample {
    /// Field-by-field read that drops values of the wrong type
    fn from_value_lossy(value: &Value) -> Self {
        let text = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);

        HkSample {
            quantity: value.get("quantity").and_then(Value::as_f64),
            unit: text("unit"),
            start_date: text("startDate"),
            end_date: text("endDate"),
            source_revision: value
                .pointer("/sourceRevision/source/bundleIdentifier")
                .and_then(Value::as_str)
                .map(|bundle| HkSourceRevision {
                    source: Some(HkSource {
                        bundle_identifier: Some(bundle.to_string()),
                    }),
                }),
            device: value
                .get("device")
                .and_then(|d| DeviceInfo::deserialize(d).ok()),
            metadata: value
                .get("metadata")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
        }
    }

    fn payload(&self, kind: RecordKind) -> Option<RecordPayload> {
        let quantity = self.quantity?;
        let unit = self.unit.as_deref().unwrap_or_default();

        let converted = match kind {
            RecordKind::Steps => Some(RecordPayload::Count { count: quantity }),
            RecordKind::ActiveCalories | RecordKind::TotalCalories => match unit {
                "" | "kcal" | "Cal" => Some(quantity),
                "kJ" => Some(quantity / KJ_PER_KCAL),
                _ => None,
            }
            .map(|kilocalories| RecordPayload::Energy { kilocalories }),
            RecordKind::Distance => match unit {
                "" | "m" => Some(quantity),
                "km" => Some(quantity * 1000.0),
                "mi" => Some(quantity * METERS_PER_MILE),
                _ => None,
            }
            .map(|meters| RecordPayload::Distance { meters }),
            RecordKind::BasalMetabolicRate => Some(RecordPayload::BasalRate {
                kilocalories_per_day: quantity,
            }),
        };

        if converted.is_none() {
            warn!(record_type = kind.type_name(), unit, "Unsupported HealthKit unit, dropping value");
        }
        converted
    }

    fn into_raw(self, kind: RecordKind) -> RawRecord {
        let payload = self.payload(kind);

        let user_entered = self
            .metadata
            .get(USER_ENTERED_KEY)
            .map(|v| v.as_bool().unwrap_or(false) || v.as_i64() == Some(1))
            .unwrap_or(false);

        let metadata = RecordMetadata {
            data_origin: self
                .source_revision
                .and_then(|r| r.source)
                .and_then(|s| s.bundle_identifier),
            recording_method: user_entered.then_some(RECORDING_METHOD_MANUAL_ENTRY),
            device: self.device,
            extra: self.metadata,
        };

        RawRecord {
            kind,
            start_time: self.start_date,
            end_time: self.end_date,
            payload,
            metadata: Some(metadata),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quantity_samples() {
        let json = r#"{
            "HKQuantityTypeIdentifierDistanceWalkingRunning": [{
                "quantity": 1.2,
                "unit": "km",
                "startDate": "2024-05-15T08:00:00.000+02:00",
                "endDate": "2024-05-15T08:20:00.000+02:00",
                "sourceRevision": {"source": {"bundleIdentifier": "com.apple.health", "name": "iPhone"}}
            }],
            "HKQuantityTypeIdentifierStepCount": [{
                "quantity": 350,
                "unit": "count",
                "startDate": "2024-05-15T08:00:00.000+02:00",
                "endDate": "2024-05-15T08:10:00.000+02:00",
                "sourceRevision": {"source": {"bundleIdentifier": "com.apple.health"}},
                "device": {"manufacturer": "Apple Inc.", "model": "Watch"},
                "metadata": {"HKWasUserEntered": true}
            }],
            "HKQuantityTypeIdentifierHeartRate": [{"quantity": 61}]
        }"#;

        let records = HealthKitAdapter.parse(json).unwrap();
        assert_eq!(records.len(), 2);

        let steps = &records[0];
        assert_eq!(steps.kind, RecordKind::Steps);
        assert_eq!(steps.payload, Some(RecordPayload::Count { count: 350.0 }));
        assert_eq!(steps.origin(), Some("com.apple.health"));
        assert_eq!(steps.recording_method(), Some(RECORDING_METHOD_MANUAL_ENTRY));
        let metadata = steps.metadata.as_ref().unwrap();
        assert_eq!(metadata.extra["HKWasUserEntered"], true);
        assert_eq!(metadata.device.as_ref().unwrap().label(), "Apple Inc. Watch");

        let distance = &records[1];
        assert_eq!(distance.payload, Some(RecordPayload::Distance { meters: 1200.0 }));
        assert_eq!(distance.recording_method(), None);
    }

    #[test]
    fn test_energy_units() {
        let json = r#"{"HKQuantityTypeIdentifierActiveEnergyBurned": [
            {"quantity": 418.4, "unit": "kJ", "startDate": "2024-05-15T08:00:00Z", "endDate": "2024-05-15T09:00:00Z"}
        ]}"#;
        let records = HealthKitAdapter.parse(json).unwrap();
        match records[0].payload {
            Some(RecordPayload::Energy { kilocalories }) => assert!((kilocalories - 100.0).abs() < 1e-9),
            ref other => panic!("unexpected payload {other:?}"),
        }
        assert_eq!(records[0].origin(), None);
    }

    #[test]
    fn test_unsupported_unit_keeps_sample_without_payload() {
        let json = r#"{"HKQuantityTypeIdentifierDistanceWalkingRunning": [
            {"quantity": 3, "unit": "furlong", "startDate": "2024-05-15T08:00:00Z"},
            {"quantity": 2, "unit": "km", "startDate": "2024-05-15T09:00:00Z"}
        ]}"#;
        let records = HealthKitAdapter.parse(json).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].payload, None);
        assert_eq!(records[0].start_time.as_deref(), Some("2024-05-15T08:00:00Z"));
        assert_eq!(records[1].payload, Some(RecordPayload::Distance { meters: 2000.0 }));
    }

    #[test]
    fn test_malformed_sample_keeps_usable_fields() {
        let json = r#"{"HKQuantityTypeIdentifierStepCount": [
            {
                "quantity": "lots",
                "startDate": "2024-05-15T08:00:00Z",
                "sourceRevision": {"source": {"bundleIdentifier": "com.apple.health"}},
                "device": "Watch",
                "metadata": {"HKWasUserEntered": 1}
            },
            {"quantity": 40, "startDate": "2024-05-15T08:00:00Z"}
        ]}"#;

        let records = HealthKitAdapter.parse(json).unwrap();
        assert_eq!(records.len(), 2);

        let malformed = &records[0];
        assert_eq!(malformed.payload, None);
        assert_eq!(malformed.origin(), Some("com.apple.health"));
        assert_eq!(malformed.recording_method(), Some(RECORDING_METHOD_MANUAL_ENTRY));
        assert!(malformed.metadata.as_ref().unwrap().device.is_none());

        assert_eq!(records[1].payload, Some(RecordPayload::Count { count: 40.0 }));
    }

    #[test]
    fn test_invalid_document() {
        assert!(matches!(
            HealthKitAdapter.parse("[1, 2]"),
            Err(ReconcileError::JsonError(_))
        ));
    }
}
