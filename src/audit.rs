//! Audit log and filtering stats
//!
//! Every raw record that reaches validation leaves one immutable audit entry
//! and one stats tally, trusted or not. Rejected records keep their reason
//! and raw metadata so an exclusion can always be explained afterwards.

use crate::extractor::{extract_value, parse_instant, payload_unit};
use crate::trust::{RejectionReason, Validation};
use crate::types::{RawRecord, RecordKind};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Origin label used when a record carries none
pub const UNKNOWN_ORIGIN: &str = "unknown";

/// One ingested record, as seen by the trust validator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    #[serde(rename = "type")]
    pub record_type: RecordKind,
    /// Local wall-clock start, `unknown`, or `Err: <raw>`
    pub time_label: String,
    /// Extracted value, rounded to one decimal
    pub value: f64,
    pub unit: String,
    pub origin_id: String,
    pub trusted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recording_method: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<RejectionReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_metadata_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_label: Option<String>,
}

impl AuditEntry {
    /// Describe a record and its validation outcome
    pub fn from_record(record: &RawRecord, validation: Validation, offset: FixedOffset) -> Self {
        let metadata = record.metadata.as_ref();
        let raw_metadata_text = match metadata {
            Some(m) => serde_json::to_string_pretty(m).ok(),
            None => Some("{}".to_string()),
        };

        Self {
            record_type: record.kind,
            time_label: time_label(record.start_time.as_deref(), offset),
            value: round_tenth(extract_value(record.payload.as_ref())),
            unit: payload_unit(record.payload.as_ref()).to_string(),
            origin_id: record.origin().unwrap_or(UNKNOWN_ORIGIN).to_string(),
            trusted: validation.trusted,
            recording_method: record.recording_method(),
            rejection_reason: (!validation.trusted).then_some(validation.reason),
            raw_metadata_text,
            device_label: metadata.and_then(|m| m.device.as_ref()).map(|d| d.label()),
        }
    }
}

fn time_label(raw: Option<&str>, offset: FixedOffset) -> String {
    match raw {
        None => UNKNOWN_ORIGIN.to_string(),
        Some(raw) => match parse_instant(raw) {
            Some(instant) => instant.with_timezone(&offset).format("%H:%M:%S").to_string(),
            None => format!("Err: {raw}"),
        },
    }
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Read/accepted counts for one record type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeTally {
    pub read: u64,
    pub accepted: u64,
}

/// Accept/reject counters for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilteringStats {
    pub records_read: u64,
    pub records_accepted: u64,
    pub per_type: BTreeMap<RecordKind, TypeTally>,
    pub rejected_by_reason: BTreeMap<RejectionReason, u64>,
}

impl Default for FilteringStats {
    fn default() -> Self {
        Self {
            records_read: 0,
            records_accepted: 0,
            per_type: BTreeMap::new(),
            rejected_by_reason: RejectionReason::REJECTIONS
                .into_iter()
                .map(|reason| (reason, 0))
                .collect(),
        }
    }
}

impl FilteringStats {
    pub fn rejected_total(&self) -> u64 {
        self.rejected_by_reason.values().sum()
    }

    pub fn rejected(&self, reason: RejectionReason) -> u64 {
        self.rejected_by_reason.get(&reason).copied().unwrap_or(0)
    }

    /// Whether read/accepted/rejected counters agree with each other
    pub fn is_consistent(&self) -> bool {
        let accepted: u64 = self.per_type.values().map(|t| t.accepted).sum();
        let read: u64 = self.per_type.values().map(|t| t.read).sum();
        accepted == self.records_accepted
            && read == self.records_read
            && self.records_read == self.records_accepted + self.rejected_total()
    }
}

/// Append-only collector for one pipeline run
#[derive(Debug, Default)]
pub struct AuditCollector {
    entries: Vec<AuditEntry>,
    stats: FilteringStats,
}

impl AuditCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a record type show up in the stats even when it has no records
    pub fn register(&mut self, kind: RecordKind) {
        self.stats.per_type.entry(kind).or_default();
    }

    pub fn record(&mut self, entry: AuditEntry) {
        self.entries.push(entry);
    }

    pub fn tally(&mut self, kind: RecordKind, trusted: bool, reason: Option<RejectionReason>) {
        let per_type = self.stats.per_type.entry(kind).or_default();
        per_type.read += 1;
        self.stats.records_read += 1;

        if trusted {
            per_type.accepted += 1;
            self.stats.records_accepted += 1;
        } else {
            let reason = match reason {
                Some(RejectionReason::None) | None => RejectionReason::Other,
                Some(reason) => reason,
            };
            *self.stats.rejected_by_reason.entry(reason).or_insert(0) += 1;
        }
    }

    /// Record the entry and tally for one validated record
    pub fn observe(&mut self, record: &RawRecord, validation: Validation, offset: FixedOffset) {
        self.record(AuditEntry::from_record(record, validation, offset));
        self.tally(record.kind, validation.trusted, Some(validation.reason));
    }

    pub fn finish(self) -> (Vec<AuditEntry>, FilteringStats) {
        (self.entries, self.stats)
    }
}
