//! Record sources and permission gates
//!
//! The platform health store is reached through two seams: a
//! [`RecordSource`] that returns raw records for a type and time range, and a
//! [`PermissionGate`] that reports whether reading is allowed at all.
//! In-memory implementations back the CLI, the FFI layer and tests.

use crate::error::SourceError;
use crate::extractor::parse_instant;
use crate::types::{HealthState, RawRecord, RecordKind, TimeRange};

/// Source of raw records for one record type and time range
#[allow(async_fn_in_trait)]
pub trait RecordSource {
    async fn read_records(
        &self,
        kind: RecordKind,
        range: TimeRange,
    ) -> Result<Vec<RawRecord>, SourceError>;
}

/// Permission and readiness check for the platform health store
#[allow(async_fn_in_trait)]
pub trait PermissionGate {
    async fn ensure_permissions(&self) -> HealthState;
}

/// Gate that always reports the same state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticGate(pub HealthState);

impl PermissionGate for StaticGate {
    async fn ensure_permissions(&self) -> HealthState {
        self.0
    }
}

/// Record source over an in-memory record set
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    records: Vec<RawRecord>,
    failing: Vec<RecordKind>,
}

impl MemorySource {
    pub fn new(records: Vec<RawRecord>) -> Self {
        Self {
            records,
            failing: Vec::new(),
        }
    }

    /// Make reads of `kind` fail, as a platform error would
    pub fn with_failure(mut self, kind: RecordKind) -> Self {
        self.failing.push(kind);
        self
    }

    pub fn push(&mut self, record: RawRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl RecordSource for MemorySource {
    async fn read_records(
        &self,
        kind: RecordKind,
        range: TimeRange,
    ) -> Result<Vec<RawRecord>, SourceError> {
        if self.failing.contains(&kind) {
            return Err(SourceError::Unavailable(format!(
                "{} reads are failing",
                kind.health_connect_name()
            )));
        }

        Ok(self
            .records
            .iter()
            .filter(|record| record.kind == kind && within(record, &range))
            .cloned()
            .collect())
    }
}

/// Whether a record overlaps the range. Records whose timestamps cannot be
/// read are passed through so they still get audited downstream.
fn within(record: &RawRecord, range: &TimeRange) -> bool {
    let Some(start) = record.start_time.as_deref().and_then(parse_instant) else {
        return true;
    };
    let end = match record.end_time.as_deref() {
        Some(raw) => match parse_instant(raw) {
            Some(end) => end,
            None => return true,
        },
        None => start,
    };
    range.intersects(start, end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buckets::DayWindow;
    use crate::types::RecordPayload;
    use futures::executor::block_on;

    fn record(kind: RecordKind, start: &str) -> RawRecord {
        RawRecord {
            kind,
            start_time: Some(start.to_string()),
            end_time: None,
            payload: Some(RecordPayload::Count { count: 1.0 }),
            metadata: None,
        }
    }

    #[test]
    fn test_filters_by_kind_and_range() {
        let day = DayWindow::parse("2024-05-15", "+00:00").unwrap();
        let source = MemorySource::new(vec![
            record(RecordKind::Steps, "2024-05-15T09:00:00Z"),
            record(RecordKind::Steps, "2024-05-14T09:00:00Z"),
            record(RecordKind::Distance, "2024-05-15T09:00:00Z"),
            record(RecordKind::Steps, "garbage"),
        ]);

        let steps = block_on(source.read_records(RecordKind::Steps, day.primary_range())).unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[1].start_time.as_deref(), Some("garbage"));

        let wide = block_on(source.read_records(RecordKind::Steps, day.lookback_range(30))).unwrap();
        assert_eq!(wide.len(), 3);
    }

    #[test]
    fn test_push() {
        let mut source = MemorySource::default();
        assert!(source.is_empty());
        source.push(record(RecordKind::Steps, "2024-05-15T09:00:00Z"));
        assert_eq!(source.len(), 1);
    }

    #[test]
    fn test_injected_failure() {
        let day = DayWindow::parse("2024-05-15", "+00:00").unwrap();
        let source = MemorySource::default().with_failure(RecordKind::Distance);

        let result = block_on(source.read_records(RecordKind::Distance, day.primary_range()));
        assert!(matches!(result, Err(SourceError::Unavailable(_))));
        assert!(block_on(source.read_records(RecordKind::Steps, day.primary_range()))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_static_gate() {
        assert_eq!(
            block_on(StaticGate(HealthState::NotAuthorized).ensure_permissions()),
            HealthState::NotAuthorized
        );
    }
}
