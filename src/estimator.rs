//! Active-energy tier fallback
//!
//! Each hour's active calories come from one of three tiers:
//! 1. `direct`: a trusted active-energy record touched the hour
//! 2. `estimated`: total energy minus the hour's share of basal burn
//! 3. `none`: no usable data
//!
//! Total energy is distributed into the hourly details independently of the
//! direct bucket accumulation.

use crate::buckets::{
    contributions, DayWindow, HourlyBucket, BUCKET_COUNT, BUCKET_DURATION_MS, DAY_DURATION_MS,
};
use crate::types::CanonicalSample;
use serde::{Deserialize, Serialize};

/// Where an hour's active-calorie figure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActiveCaloriesSource {
    Direct,
    Estimated,
    None,
}

/// Per-hour explanation of the active-calorie figure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HourlyDetail {
    pub hour_index: usize,
    pub active_calories: f64,
    pub active_calories_source: ActiveCaloriesSource,
    pub has_direct_record: bool,
    pub total_calories: f64,
    pub basal_used: f64,
    pub is_estimated: bool,
}

impl HourlyDetail {
    pub fn new(hour_index: usize) -> Self {
        Self {
            hour_index,
            active_calories: 0.0,
            active_calories_source: ActiveCaloriesSource::None,
            has_direct_record: false,
            total_calories: 0.0,
            basal_used: 0.0,
            is_estimated: false,
        }
    }
}

/// Fresh details for every hour of the day
pub fn empty_details() -> [HourlyDetail; BUCKET_COUNT] {
    std::array::from_fn(HourlyDetail::new)
}

/// Result of the tier decision for one hour
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    pub active_calories: f64,
    pub source: ActiveCaloriesSource,
    pub basal_used: f64,
}

/// Day-level sums across tiers
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierSums {
    pub tier1_sum: f64,
    pub tier2_sum: f64,
    pub total_energy_sum: f64,
    pub basal_used_sum: f64,
}

/// One hour's share of a day's basal burn
pub fn basal_share(avg_bmr_kcal_per_day: f64) -> f64 {
    avg_bmr_kcal_per_day * (BUCKET_DURATION_MS as f64 / DAY_DURATION_MS as f64)
}

/// Add a trusted total-energy sample into the hourly details
pub fn accumulate_total_energy(
    details: &mut [HourlyDetail; BUCKET_COUNT],
    sample: &CanonicalSample,
    day: &DayWindow,
) {
    for (index, amount) in contributions(sample, day) {
        details[index].total_calories += amount;
    }
}

/// Decide the active-calorie figure for one hour
pub fn estimate(detail: &HourlyDetail, bucket: &HourlyBucket, avg_bmr_kcal_per_day: f64) -> Estimate {
    if detail.has_direct_record {
        return Estimate {
            active_calories: bucket.active_calories,
            source: ActiveCaloriesSource::Direct,
            basal_used: 0.0,
        };
    }

    if detail.total_calories > 0.0 && avg_bmr_kcal_per_day > 0.0 {
        let basal = basal_share(avg_bmr_kcal_per_day);
        return Estimate {
            active_calories: (detail.total_calories - basal).max(0.0),
            source: ActiveCaloriesSource::Estimated,
            basal_used: basal,
        };
    }

    Estimate {
        active_calories: 0.0,
        source: ActiveCaloriesSource::None,
        basal_used: 0.0,
    }
}

/// Run the tier decision for every hour, in ascending order, writing the
/// result into both the bucket and its detail.
pub fn apply_fallbacks(
    buckets: &mut [HourlyBucket; BUCKET_COUNT],
    details: &mut [HourlyDetail; BUCKET_COUNT],
    avg_bmr_kcal_per_day: f64,
) -> TierSums {
    let mut sums = TierSums::default();

    for (bucket, detail) in buckets.iter_mut().zip(details.iter_mut()) {
        let estimate = estimate(detail, bucket, avg_bmr_kcal_per_day);
        sums.total_energy_sum += detail.total_calories;

        match estimate.source {
            ActiveCaloriesSource::Direct => sums.tier1_sum += estimate.active_calories,
            ActiveCaloriesSource::Estimated => {
                sums.tier2_sum += estimate.active_calories;
                sums.basal_used_sum += estimate.basal_used;
            }
            ActiveCaloriesSource::None => {}
        }

        bucket.active_calories = estimate.active_calories;
        detail.active_calories = estimate.active_calories;
        detail.active_calories_source = estimate.source;
        detail.basal_used = estimate.basal_used;
        detail.is_estimated = estimate.source == ActiveCaloriesSource::Estimated;
    }

    sums
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RecordKind;
    use chrono::{DateTime, Utc};

    fn day() -> DayWindow {
        DayWindow::parse("2024-05-15", "+00:00").unwrap()
    }

    fn total_energy(start: &str, end: &str, kcal: f64) -> CanonicalSample {
        let parse = |s: &str| DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc);
        CanonicalSample {
            kind: RecordKind::TotalCalories,
            start: parse(start),
            end: parse(end),
            value: kcal,
            origin_id: None,
            recording_method: None,
            trusted: true,
        }
    }

    #[test]
    fn test_basal_share() {
        assert!((basal_share(2400.0) - 100.0).abs() < 1e-9);
        assert_eq!(basal_share(0.0), 0.0);
    }

    #[test]
    fn test_direct_record_wins() {
        let day = day();
        let mut buckets = day.empty_buckets();
        buckets[9].active_calories = 35.0;
        let mut detail = HourlyDetail::new(9);
        detail.has_direct_record = true;
        detail.total_calories = 500.0;

        let result = estimate(&detail, &buckets[9], 2400.0);
        assert_eq!(result.source, ActiveCaloriesSource::Direct);
        assert_eq!(result.active_calories, 35.0);
        assert_eq!(result.basal_used, 0.0);
    }

    #[test]
    fn test_total_minus_basal() {
        let day = day();
        let mut buckets = day.empty_buckets();
        let mut details = empty_details();
        let record = total_energy("2024-05-15T14:00:00Z", "2024-05-15T15:00:00Z", 150.0);
        accumulate_total_energy(&mut details, &record, &day);

        let sums = apply_fallbacks(&mut buckets, &mut details, 2400.0);

        let hour = &details[14];
        assert_eq!(hour.active_calories_source, ActiveCaloriesSource::Estimated);
        assert!((hour.active_calories - 50.0).abs() < 1e-9);
        assert!((hour.basal_used - 100.0).abs() < 1e-9);
        assert!(hour.is_estimated);
        assert!((buckets[14].active_calories - 50.0).abs() < 1e-9);

        assert!((sums.tier2_sum - 50.0).abs() < 1e-9);
        assert!((sums.total_energy_sum - 150.0).abs() < 1e-9);
        assert!((sums.basal_used_sum - 100.0).abs() < 1e-9);
        assert_eq!(sums.tier1_sum, 0.0);
    }

    #[test]
    fn test_estimate_floors_at_zero() {
        let day = day();
        let mut detail = HourlyDetail::new(2);
        detail.total_calories = 60.0;

        let result = estimate(&detail, &day.empty_buckets()[2], 2400.0);
        assert_eq!(result.source, ActiveCaloriesSource::Estimated);
        assert_eq!(result.active_calories, 0.0);
        assert!((result.basal_used - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_bmr_disables_tier_two() {
        let day = day();
        let mut buckets = day.empty_buckets();
        let mut details = empty_details();
        details[14].total_calories = 150.0;

        let sums = apply_fallbacks(&mut buckets, &mut details, 0.0);

        assert_eq!(details[14].active_calories_source, ActiveCaloriesSource::None);
        assert!(!details[14].is_estimated);
        assert_eq!(buckets[14].active_calories, 0.0);
        assert_eq!(sums.tier2_sum, 0.0);
        assert!((sums.total_energy_sum - 150.0).abs() < 1e-9);
    }

    #[test]
    fn test_exactly_one_source_per_hour() {
        let day = day();
        let mut buckets = day.empty_buckets();
        let mut details = empty_details();
        details[1].has_direct_record = true;
        buckets[1].active_calories = 12.0;
        details[2].total_calories = 300.0;

        apply_fallbacks(&mut buckets, &mut details, 1800.0);

        for detail in &details {
            assert_eq!(
                detail.has_direct_record,
                detail.active_calories_source == ActiveCaloriesSource::Direct
            );
            if detail.basal_used > 0.0 {
                assert_eq!(detail.active_calories_source, ActiveCaloriesSource::Estimated);
            }
        }
        assert_eq!(details[2].active_calories_source, ActiveCaloriesSource::Estimated);
        assert_eq!(details[3].active_calories_source, ActiveCaloriesSource::None);
    }
}
