//! Hourly buckets and proportional distribution
//!
//! A day is partitioned into 24 fixed one-hour buckets starting at local
//! midnight. Interval samples are split across the buckets they overlap in
//! proportion to the overlap; instantaneous samples land whole in the bucket
//! containing them.

use crate::error::ReconcileError;
use crate::types::{CanonicalSample, RecordKind, TimeRange};
use chrono::{DateTime, Duration, FixedOffset, Local, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Number of buckets in a day
pub const BUCKET_COUNT: usize = 24;

/// Width of one bucket in milliseconds
pub const BUCKET_DURATION_MS: i64 = 3_600_000;

/// Length of a day in milliseconds
pub const DAY_DURATION_MS: i64 = 86_400_000;

/// The calendar day being reconciled, anchored at local midnight
///
/// Only built through [`DayWindow::new`], which guarantees the whole day
/// (through the end of bucket 23) is representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DayWindow {
    date: NaiveDate,
    start: DateTime<FixedOffset>,
}

impl DayWindow {
    /// Day starting at midnight of `date` in the given offset
    pub fn new(date: NaiveDate, offset: FixedOffset) -> Result<Self, ReconcileError> {
        let midnight = date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| ReconcileError::InvalidDate(date.to_string()))?;
        let start = offset
            .from_local_datetime(&midnight)
            .single()
            .ok_or_else(|| ReconcileError::InvalidDate(format!("{date} {offset}")))?;
        start
            .checked_add_signed(Duration::milliseconds(DAY_DURATION_MS))
            .ok_or_else(|| ReconcileError::InvalidDate(format!("{date} is outside the supported range")))?;

        Ok(Self { date, start })
    }

    /// Parse `YYYY-MM-DD` and a `±HH:MM` offset
    pub fn parse(date: &str, offset: &str) -> Result<Self, ReconcileError> {
        let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
            .map_err(|e| ReconcileError::InvalidDate(format!("{date}: {e}")))?;
        Self::new(date, parse_utc_offset(offset)?)
    }

    /// Today in the system's local offset
    pub fn today() -> Self {
        let now = Local::now();
        let offset = *now.offset();
        let date = now.date_naive();
        // Midnight always exists for a fixed offset.
        Self::new(date, offset).unwrap_or(Self {
            date,
            start: now.with_timezone(&offset),
        })
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn offset(&self) -> FixedOffset {
        *self.start.offset()
    }

    pub fn start(&self) -> DateTime<FixedOffset> {
        self.start
    }

    /// Last millisecond of the day
    pub fn end(&self) -> DateTime<FixedOffset> {
        self.start + Duration::milliseconds(DAY_DURATION_MS - 1)
    }

    /// Half-open bounds `[start, end)` of bucket `index`
    pub fn bucket_bounds(&self, index: usize) -> (DateTime<FixedOffset>, DateTime<FixedOffset>) {
        let start = self.start + Duration::milliseconds(index as i64 * BUCKET_DURATION_MS);
        (start, start + Duration::milliseconds(BUCKET_DURATION_MS))
    }

    /// Query range for same-day record types
    pub fn primary_range(&self) -> TimeRange {
        TimeRange {
            start: self.start,
            end: self.end(),
        }
    }

    /// Query range reaching `days` back before the day, through day end.
    ///
    /// Clamped to the earliest representable instant.
    pub fn lookback_range(&self, days: u32) -> TimeRange {
        let start = self
            .start
            .checked_sub_signed(Duration::days(i64::from(days)))
            .unwrap_or_else(|| DateTime::<Utc>::MIN_UTC.with_timezone(&self.offset()));
        TimeRange {
            start,
            end: self.end(),
        }
    }

    /// Fresh, zeroed buckets covering the day
    pub fn empty_buckets(&self) -> [HourlyBucket; BUCKET_COUNT] {
        std::array::from_fn(|index| {
            let (start, end) = self.bucket_bounds(index);
            HourlyBucket {
                index,
                start,
                end,
                steps: 0.0,
                active_calories: 0.0,
                distance: 0.0,
            }
        })
    }
}

/// Parse a numeric UTC offset such as `+07:00`, `-0530` or `Z`
pub fn parse_utc_offset(raw: &str) -> Result<FixedOffset, ReconcileError> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("z") {
        return FixedOffset::east_opt(0)
            .ok_or_else(|| ReconcileError::InvalidDate(raw.to_string()));
    }

    let invalid = || ReconcileError::InvalidDate(format!("invalid UTC offset: {raw}"));

    let (sign, rest) = match raw.chars().next() {
        Some('+') => (1, &raw[1..]),
        Some('-') => (-1, &raw[1..]),
        _ => return Err(invalid()),
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }

    let hours: i32 = digits[..2].parse().map_err(|_| invalid())?;
    let minutes: i32 = digits[2..].parse().map_err(|_| invalid())?;
    if minutes >= 60 {
        return Err(invalid());
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}

/// One hour of accumulated activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyBucket {
    pub index: usize,
    start: DateTime<FixedOffset>,
    end: DateTime<FixedOffset>,
    pub steps: f64,
    /// kcal
    pub active_calories: f64,
    /// meters
    pub distance: f64,
}

impl HourlyBucket {
    pub fn start(&self) -> DateTime<FixedOffset> {
        self.start
    }

    /// Exclusive end of the bucket
    pub fn end(&self) -> DateTime<FixedOffset> {
        self.end
    }
}

/// Bucket field a record kind accumulates into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketField {
    Steps,
    ActiveCalories,
    Distance,
}

impl BucketField {
    /// Field fed directly by a record kind, if any
    pub fn for_kind(kind: RecordKind) -> Option<Self> {
        match kind {
            RecordKind::Steps => Some(BucketField::Steps),
            RecordKind::ActiveCalories => Some(BucketField::ActiveCalories),
            RecordKind::Distance => Some(BucketField::Distance),
            RecordKind::TotalCalories | RecordKind::BasalMetabolicRate => None,
        }
    }

    fn add(&self, bucket: &mut HourlyBucket, amount: f64) {
        match self {
            BucketField::Steps => bucket.steps += amount,
            BucketField::ActiveCalories => bucket.active_calories += amount,
            BucketField::Distance => bucket.distance += amount,
        }
    }
}

/// Per-bucket shares of a sample's value as `(bucket index, amount)`.
///
/// Instantaneous samples give their whole value to the bucket containing the
/// instant. Interval samples are split by overlap; the part outside the day
/// is dropped.
pub fn contributions(sample: &CanonicalSample, day: &DayWindow) -> Vec<(usize, f64)> {
    if !sample.value.is_finite() {
        return Vec::new();
    }

    let day_start = day.start().timestamp_millis();
    let start = sample.start.timestamp_millis();
    let end = sample.end.timestamp_millis();

    if end <= start {
        let offset = start - day_start;
        if !(0..DAY_DURATION_MS).contains(&offset) {
            return Vec::new();
        }
        let index = (offset / BUCKET_DURATION_MS) as usize;
        return vec![(index, sample.value)];
    }

    let duration = (end - start) as f64;
    (0..BUCKET_COUNT)
        .filter_map(|i| {
            let bucket_start = day_start + i as i64 * BUCKET_DURATION_MS;
            let bucket_end = bucket_start + BUCKET_DURATION_MS;
            let overlap = end.min(bucket_end) - start.max(bucket_start);
            (overlap > 0).then(|| (i, sample.value * (overlap as f64 / duration)))
        })
        .collect()
}

/// Add a sample's shares into `field` of the buckets it overlaps.
///
/// Returns the indices of the buckets touched, in ascending order.
pub fn distribute(
    sample: &CanonicalSample,
    buckets: &mut [HourlyBucket; BUCKET_COUNT],
    day: &DayWindow,
    field: BucketField,
) -> Vec<usize> {
    contributions(sample, day)
        .into_iter()
        .map(|(index, amount)| {
            field.add(&mut buckets[index], amount);
            index
        })
        .collect()
}
