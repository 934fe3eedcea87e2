//! Pipeline orchestration
//!
//! This module provides the reconciler: it fetches the raw record sets for a
//! day, runs every record through trust validation, distributes trusted
//! values across the hourly buckets, applies the active-energy tier fallback,
//! and keeps a debug snapshot of the last run.

use crate::adapters::{HealthConnectAdapter, HealthKitAdapter, RecordAdapter};
use crate::audit::{AuditCollector, AuditEntry, FilteringStats};
use crate::buckets::{distribute, BucketField, DayWindow, HourlyBucket, BUCKET_COUNT};
use crate::config::ReconcileConfig;
use crate::encoder::{dashboard, encode_payload};
use crate::error::ReconcileError;
use crate::estimator::{
    accumulate_total_energy, apply_fallbacks, empty_details, HourlyDetail, TierSums,
};
use crate::extractor::{average_bmr, extract_value, to_canonical};
use crate::source::{MemorySource, RecordSource};
use crate::trust::RejectionReason;
use crate::types::{DashboardMetrics, HourlyHealthPayload, RawRecord, RecordKind, TimeRange};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Message reported before any run has completed
pub const NO_DATA_MESSAGE: &str = "No data fetched yet";

/// Raw records for one run, grouped by record kind
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordSets {
    sets: BTreeMap<RecordKind, Vec<RawRecord>>,
}

impl RecordSets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Group a flat record list by kind
    pub fn from_records(records: impl IntoIterator<Item = RawRecord>) -> Self {
        let mut sets = Self::new();
        for record in records {
            sets.sets.entry(record.kind).or_default().push(record);
        }
        sets
    }

    pub fn insert(&mut self, kind: RecordKind, records: Vec<RawRecord>) {
        self.sets.insert(kind, records);
    }

    pub fn get(&self, kind: RecordKind) -> &[RawRecord] {
        self.sets.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn total(&self) -> usize {
        self.sets.values().map(Vec::len).sum()
    }
}

/// Everything a run produced besides the buckets, for diagnostics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugSnapshot {
    pub run_id: Uuid,
    pub date: NaiveDate,
    pub generated_at: DateTime<Utc>,
    pub hourly_details: Vec<HourlyDetail>,
    pub stats: FilteringStats,
    pub audit_log: Vec<AuditEntry>,
    pub avg_bmr_kcal_per_day: f64,
    #[serde(flatten)]
    pub sums: TierSums,
}

impl DebugSnapshot {
    /// Short human-readable summary of the run
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!(
                "Tier1 (Direct): {:.1} | Tier2 (Est): {:.1}",
                self.sums.tier1_sum, self.sums.tier2_sum
            ),
            format!(
                "Total Energy: {:.1} | Basal Used: {:.1}",
                self.sums.total_energy_sum, self.sums.basal_used_sum
            ),
            if self.avg_bmr_kcal_per_day > 0.0 {
                format!("BMR: {:.0} kcal/day", self.avg_bmr_kcal_per_day)
            } else {
                "BMR: MISSING kcal/day".to_string()
            },
        ];

        lines.extend(
            self.stats
                .per_type
                .iter()
                .map(|(kind, tally)| format!("• {kind}: {}/{} OK", tally.accepted, tally.read)),
        );

        let ignored = self.stats.rejected(RejectionReason::UserInput);
        if ignored > 0 {
            lines.push(format!("IGNORED: {ignored} manual/invalid records."));
        }

        lines
    }
}

/// Buckets and snapshot produced by one run
#[derive(Debug, Clone)]
pub struct ReconcileRun {
    pub buckets: [HourlyBucket; BUCKET_COUNT],
    pub debug: DebugSnapshot,
}

impl ReconcileRun {
    pub fn payload(&self) -> Vec<HourlyHealthPayload> {
        encode_payload(&self.buckets)
    }

    /// Bundle payload, dashboard and snapshot for serialization
    pub fn into_report(self, generated_at: DateTime<Utc>) -> DayReport {
        let payload = self.payload();
        let dashboard = dashboard(&payload, generated_at);
        DayReport {
            payload,
            dashboard,
            debug: self.debug,
        }
    }
}

/// Everything one reconciled day exposes to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayReport {
    pub payload: Vec<HourlyHealthPayload>,
    pub dashboard: DashboardMetrics,
    pub debug: DebugSnapshot,
}

/// Reconcile a Health Connect JSON document for one local day.
///
/// # Arguments
/// * `raw_json` - Document mapping Health Connect record types to records
/// * `date` - Local calendar date, `YYYY-MM-DD`
/// * `utc_offset` - Local offset for that date, e.g. `+07:00`
/// * `config` - Trust policy and lookback settings
///
/// # Example
/// ```ignore
/// let report = health_connect_to_hourly(
///     records_json,
///     "2024-05-15",
///     "+07:00",
///     &ReconcileConfig::default(),
/// )?;
/// ```
pub fn health_connect_to_hourly(
    raw_json: &str,
    date: &str,
    utc_offset: &str,
    config: &ReconcileConfig,
) -> Result<DayReport, ReconcileError> {
    reconcile_document(&HealthConnectAdapter, raw_json, date, utc_offset, config)
}

/// Reconcile a HealthKit sample document for one local day.
///
/// Same contract as [`health_connect_to_hourly`]; pair it with
/// [`ReconcileConfig::healthkit`] to trust any source bundle.
pub fn healthkit_to_hourly(
    raw_json: &str,
    date: &str,
    utc_offset: &str,
    config: &ReconcileConfig,
) -> Result<DayReport, ReconcileError> {
    reconcile_document(&HealthKitAdapter, raw_json, date, utc_offset, config)
}

fn reconcile_document<A: RecordAdapter>(
    adapter: &A,
    raw_json: &str,
    date: &str,
    utc_offset: &str,
    config: &ReconcileConfig,
) -> Result<DayReport, ReconcileError> {
    let day = DayWindow::parse(date, utc_offset)?;
    let records = adapter.parse(raw_json)?;
    let mut reconciler = Reconciler::new(MemorySource::new(records), config.clone());
    let run = futures::executor::block_on(reconciler.run(&day));
    Ok(run.into_report(Utc::now()))
}

/// Read one record type, degrading any failure to an empty set
async fn safe_read<S: RecordSource>(source: &S, kind: RecordKind, range: TimeRange) -> Vec<RawRecord> {
    match source.read_records(kind, range).await {
        Ok(records) => records,
        Err(e) => {
            warn!(
                record_type = kind.health_connect_name(),
                error = %e,
                "Failed to read records, continuing without them"
            );
            Vec::new()
        }
    }
}

/// Fetch all record sets for `day` concurrently.
///
/// Basal-rate records use the lookback range; every other type uses the day.
pub async fn fetch_all<S: RecordSource>(source: &S, day: &DayWindow, bmr_lookback_days: u32) -> RecordSets {
    let primary = day.primary_range();
    let lookback = day.lookback_range(bmr_lookback_days);

    let (steps, distance, active, total, bmr) = futures::join!(
        safe_read(source, RecordKind::Steps, primary),
        safe_read(source, RecordKind::Distance, primary),
        safe_read(source, RecordKind::ActiveCalories, primary),
        safe_read(source, RecordKind::TotalCalories, primary),
        safe_read(source, RecordKind::BasalMetabolicRate, lookback),
    );

    let mut sets = RecordSets::new();
    sets.insert(RecordKind::Steps, steps);
    sets.insert(RecordKind::Distance, distance);
    sets.insert(RecordKind::ActiveCalories, active);
    sets.insert(RecordKind::TotalCalories, total);
    sets.insert(RecordKind::BasalMetabolicRate, bmr);
    sets
}

/// Reconcile fetched record sets into the day's buckets.
///
/// Pipeline stages:
/// 1. Trust validation, with one audit entry and tally per record
/// 2. Value extraction and bucket distribution of trusted records
/// 3. Average BMR from trusted basal-rate records
/// 4. Per-hour tier fallback
pub fn reconcile(sets: &RecordSets, day: &DayWindow, config: &ReconcileConfig) -> ReconcileRun {
    let offset = day.offset();
    let mut audit = AuditCollector::new();
    let mut buckets = day.empty_buckets();
    let mut details = empty_details();
    let mut bmr_values = Vec::new();
    let mut malformed = 0usize;

    for kind in RecordKind::ALL {
        audit.register(kind);

        for record in sets.get(kind) {
            let validation = config
                .trust
                .validate(record.metadata.as_ref(), config.allow_manual);
            audit.observe(record, validation, offset);

            if !validation.trusted {
                continue;
            }

            if kind == RecordKind::BasalMetabolicRate {
                bmr_values.push(extract_value(record.payload.as_ref()));
                continue;
            }

            let Some(sample) = to_canonical(record, true) else {
                malformed += 1;
                continue;
            };

            match BucketField::for_kind(kind) {
                Some(field) => {
                    let touched = distribute(&sample, &mut buckets, day, field);
                    if kind == RecordKind::ActiveCalories {
                        for index in touched {
                            details[index].has_direct_record = true;
                        }
                    }
                }
                None => accumulate_total_energy(&mut details, &sample, day),
            }
        }
    }

    let avg_bmr_kcal_per_day = average_bmr(bmr_values);
    let sums = apply_fallbacks(&mut buckets, &mut details, avg_bmr_kcal_per_day);
    let (audit_log, stats) = audit.finish();

    debug!(
        date = %day.date(),
        fetched = sets.total(),
        read = stats.records_read,
        accepted = stats.records_accepted,
        malformed,
        avg_bmr_kcal_per_day,
        "Reconciled day"
    );

    ReconcileRun {
        buckets,
        debug: DebugSnapshot {
            run_id: Uuid::new_v4(),
            date: day.date(),
            generated_at: Utc::now(),
            hourly_details: details.to_vec(),
            stats,
            audit_log,
            avg_bmr_kcal_per_day,
            sums,
        },
    }
}

/// Provider façade: fetches, reconciles, and caches the last debug snapshot.
///
/// Runs take `&mut self`, so a new run can never overlap a read of the
/// previous snapshot.
pub struct Reconciler<S> {
    source: S,
    config: ReconcileConfig,
    last_debug: Option<DebugSnapshot>,
}

impl<S: RecordSource> Reconciler<S> {
    pub fn new(source: S, config: ReconcileConfig) -> Self {
        Self {
            source,
            config,
            last_debug: None,
        }
    }

    pub fn with_defaults(source: S) -> Self {
        Self::new(source, ReconcileConfig::default())
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Swap in a new source, returning the previous one
    pub fn replace_source(&mut self, source: S) -> S {
        std::mem::replace(&mut self.source, source)
    }

    /// Accept or reject manually entered records in subsequent runs
    pub fn set_bypass_manual_filter(&mut self, bypass: bool) {
        if self.config.allow_manual != bypass {
            info!(bypass, "Manual-entry filter bypass changed");
        }
        self.config.allow_manual = bypass;
    }

    pub fn bypass_manual_filter(&self) -> bool {
        self.config.allow_manual
    }

    /// Fetch and reconcile `day`, caching the debug snapshot
    pub async fn run(&mut self, day: &DayWindow) -> ReconcileRun {
        let sets = fetch_all(&self.source, day, self.config.bmr_lookback_days).await;
        let run = reconcile(&sets, day, &self.config);
        self.last_debug = Some(run.debug.clone());
        run
    }

    pub async fn hourly_payload_for(&mut self, day: &DayWindow) -> Vec<HourlyHealthPayload> {
        self.run(day).await.payload()
    }

    pub async fn today_hourly_payload(&mut self) -> Vec<HourlyHealthPayload> {
        self.hourly_payload_for(&DayWindow::today()).await
    }

    pub async fn dashboard_metrics_for(&mut self, day: &DayWindow) -> DashboardMetrics {
        let payload = self.hourly_payload_for(day).await;
        dashboard(&payload, Utc::now())
    }

    pub async fn dashboard_metrics(&mut self) -> DashboardMetrics {
        self.dashboard_metrics_for(&DayWindow::today()).await
    }

    pub fn debug_snapshot(&self) -> Option<&DebugSnapshot> {
        self.last_debug.as_ref()
    }

    pub fn debug_info(&self) -> Vec<String> {
        match &self.last_debug {
            Some(snapshot) => snapshot.summary_lines(),
            None => vec![NO_DATA_MESSAGE.to_string()],
        }
    }

    pub fn hourly_debug(&self) -> &[HourlyDetail] {
        self.last_debug
            .as_ref()
            .map(|d| d.hourly_details.as_slice())
            .unwrap_or(&[])
    }

    pub fn audit_log(&self) -> &[AuditEntry] {
        self.last_debug
            .as_ref()
            .map(|d| d.audit_log.as_slice())
            .unwrap_or(&[])
    }
}
