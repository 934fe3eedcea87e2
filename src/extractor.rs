//! Value extraction
//!
//! This module turns raw records into canonical samples:
//! - One scalar value per payload shape
//! - Parsed, ordered start/end instants
//! - Malformed records (bad timestamps, non-finite values) yield no sample

use crate::types::{CanonicalSample, RawRecord, RecordPayload};
use chrono::{DateTime, Utc};

/// Extract the scalar value carried by a record payload.
///
/// An absent payload contributes nothing and yields `0.0`.
pub fn extract_value(payload: Option<&RecordPayload>) -> f64 {
    match payload {
        Some(RecordPayload::Count { count }) => *count,
        Some(RecordPayload::Energy { kilocalories }) => *kilocalories,
        Some(RecordPayload::Distance { meters }) => *meters,
        Some(RecordPayload::BasalRate {
            kilocalories_per_day,
        }) => *kilocalories_per_day,
        None => 0.0,
    }
}

/// Unit label for a payload shape
pub fn payload_unit(payload: Option<&RecordPayload>) -> &'static str {
    match payload {
        Some(RecordPayload::Count { .. }) => "count",
        Some(RecordPayload::Energy { .. }) => "kcal",
        Some(RecordPayload::Distance { .. }) => "m",
        Some(RecordPayload::BasalRate { .. }) => "kcal/day",
        None => "none",
    }
}

/// Parse an RFC 3339 timestamp into a UTC instant
pub fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Build a canonical sample from a raw record.
///
/// Returns `None` when the start is missing or unparseable, when a present
/// end is unparseable or precedes the start, or when the value is not finite.
pub fn to_canonical(record: &RawRecord, trusted: bool) -> Option<CanonicalSample> {
    let start = parse_instant(record.start_time.as_deref()?)?;
    let end = match record.end_time.as_deref() {
        Some(raw) => parse_instant(raw)?,
        None => start,
    };

    if end < start {
        return None;
    }

    let value = extract_value(record.payload.as_ref());
    if !value.is_finite() {
        return None;
    }

    Some(CanonicalSample {
        kind: record.kind,
        start,
        end,
        value,
        origin_id: record.origin().map(str::to_string),
        recording_method: record.recording_method(),
        trusted,
    })
}

/// Unweighted mean of basal-rate values (kcal/day); `0.0` when there are none
pub fn average_bmr<I>(values: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let (sum, count) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));

    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RecordKind;

    fn record(start: Option<&str>, end: Option<&str>, payload: Option<RecordPayload>) -> RawRecord {
        RawRecord {
            kind: RecordKind::Steps,
            start_time: start.map(str::to_string),
            end_time: end.map(str::to_string),
            payload,
            metadata: None,
        }
    }

    #[test]
    fn test_extract_each_shape() {
        assert_eq!(extract_value(Some(&RecordPayload::Count { count: 812.0 })), 812.0);
        assert_eq!(
            extract_value(Some(&RecordPayload::Energy { kilocalories: 45.5 })),
            45.5
        );
        assert_eq!(
            extract_value(Some(&RecordPayload::Distance { meters: 1200.0 })),
            1200.0
        );
        assert_eq!(
            extract_value(Some(&RecordPayload::BasalRate {
                kilocalories_per_day: 1650.0
            })),
            1650.0
        );
        assert_eq!(extract_value(None), 0.0);
        assert_eq!(payload_unit(Some(&RecordPayload::Distance { meters: 1.0 })), "m");
    }

    #[test]
    fn test_interval_record() {
        let raw = record(
            Some("2024-05-15T10:30:00+07:00"),
            Some("2024-05-15T11:30:00+07:00"),
            Some(RecordPayload::Count { count: 600.0 }),
        );
        let sample = to_canonical(&raw, true).unwrap();

        assert_eq!(sample.value, 600.0);
        assert_eq!((sample.end - sample.start).num_minutes(), 60);
        assert!(!sample.is_instantaneous());
        assert!(sample.trusted);
    }

    #[test]
    fn test_missing_end_is_instantaneous() {
        let raw = record(
            Some("2024-05-15T03:15:00Z"),
            None,
            Some(RecordPayload::BasalRate {
                kilocalories_per_day: 1700.0,
            }),
        );
        let sample = to_canonical(&raw, true).unwrap();
        assert!(sample.is_instantaneous());
    }

    #[test]
    fn test_malformed_records_yield_nothing() {
        let count = Some(RecordPayload::Count { count: 10.0 });

        assert!(to_canonical(&record(None, None, count), true).is_none());
        assert!(to_canonical(&record(Some("yesterday"), None, count), true).is_none());
        assert!(to_canonical(
            &record(Some("2024-05-15T10:00:00Z"), Some("soon"), count),
            true
        )
        .is_none());
        assert!(to_canonical(
            &record(Some("2024-05-15T10:00:00Z"), Some("2024-05-15T09:00:00Z"), count),
            true
        )
        .is_none());
        assert!(to_canonical(
            &record(
                Some("2024-05-15T10:00:00Z"),
                None,
                Some(RecordPayload::Count { count: f64::NAN })
            ),
            true
        )
        .is_none());
    }

    #[test]
    fn test_average_bmr() {
        assert_eq!(average_bmr(Vec::new()), 0.0);
        assert!((average_bmr(vec![2300.0, 2500.0]) - 2400.0).abs() < 1e-9);
        assert!((average_bmr(vec![2400.0, f64::INFINITY]) - 2400.0).abs() < 1e-9);
    }
}
