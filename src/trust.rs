//! Provenance-based trust validation
//!
//! Decides, from a record's metadata alone, whether the record may contribute
//! to the hourly buckets. The decision is a pure function of the metadata,
//! the configured policy, and the manual-entry bypass flag.

use crate::types::RecordMetadata;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Recording method: provenance not reported by the writer
pub const RECORDING_METHOD_UNKNOWN: i64 = 0;
/// Recording method: captured during a user-started session
pub const RECORDING_METHOD_ACTIVELY_RECORDED: i64 = 1;
/// Recording method: captured passively by a sensor
pub const RECORDING_METHOD_AUTOMATICALLY_RECORDED: i64 = 2;
/// Recording method: typed in by the user
pub const RECORDING_METHOD_MANUAL_ENTRY: i64 = 3;

/// Origin trusted when no policy is configured
pub const DEFAULT_TRUSTED_ORIGIN: &str = "com.google.android.apps.fitness";

/// Trusted-origin entry matching any non-empty origin
pub const ANY_ORIGIN: &str = "*";

/// Why a record was rejected (`None` for accepted records)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RejectionReason {
    None,
    MissingOrigin,
    UntrustedPackage,
    UserInput,
    Other,
}

impl RejectionReason {
    /// Reasons that count as rejections in the filtering stats
    pub const REJECTIONS: [RejectionReason; 4] = [
        RejectionReason::MissingOrigin,
        RejectionReason::UntrustedPackage,
        RejectionReason::UserInput,
        RejectionReason::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::None => "none",
            RejectionReason::MissingOrigin => "missingOrigin",
            RejectionReason::UntrustedPackage => "untrustedPackage",
            RejectionReason::UserInput => "userInput",
            RejectionReason::Other => "other",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of validating one record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validation {
    pub trusted: bool,
    pub reason: RejectionReason,
}

impl Validation {
    fn accept() -> Self {
        Self {
            trusted: true,
            reason: RejectionReason::None,
        }
    }

    fn reject(reason: RejectionReason) -> Self {
        Self {
            trusted: false,
            reason,
        }
    }
}

/// Which origins and recording methods are trusted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustPolicy {
    pub trusted_origins: Vec<String>,
    pub allowed_recording_methods: Vec<i64>,
    pub manual_recording_method: i64,
    pub unknown_recording_method: i64,
}

impl Default for TrustPolicy {
    fn default() -> Self {
        Self {
            trusted_origins: vec![DEFAULT_TRUSTED_ORIGIN.to_string()],
            allowed_recording_methods: vec![
                RECORDING_METHOD_ACTIVELY_RECORDED,
                RECORDING_METHOD_AUTOMATICALLY_RECORDED,
            ],
            manual_recording_method: RECORDING_METHOD_MANUAL_ENTRY,
            unknown_recording_method: RECORDING_METHOD_UNKNOWN,
        }
    }
}

impl TrustPolicy {
    /// Policy trusting exactly the given origins, with default method codes
    pub fn with_origins<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            trusted_origins: origins.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// HealthKit policy: any source bundle is trusted, only user entry is gated
    pub fn healthkit() -> Self {
        Self::with_origins([ANY_ORIGIN])
    }

    pub fn is_trusted_origin(&self, origin: &str) -> bool {
        self.trusted_origins
            .iter()
            .any(|o| o == ANY_ORIGIN || o == origin)
    }

    /// Validate record metadata. First matching rule wins.
    pub fn validate(&self, metadata: Option<&RecordMetadata>, allow_manual: bool) -> Validation {
        let Some(origin) = metadata
            .and_then(|m| m.data_origin.as_deref())
            .filter(|o| !o.is_empty())
        else {
            return Validation::reject(RejectionReason::MissingOrigin);
        };

        if !self.is_trusted_origin(origin) {
            return Validation::reject(RejectionReason::UntrustedPackage);
        }

        let Some(method) = metadata.and_then(|m| m.recording_method) else {
            // A method that was sent but unreadable is not an absent one
            if metadata.is_some_and(RecordMetadata::has_unreadable_recording_method) {
                return manual_gate(allow_manual);
            }
            return Validation::accept();
        };

        if method == self.manual_recording_method {
            return manual_gate(allow_manual);
        }

        if self.allowed_recording_methods.contains(&method) {
            return Validation::accept();
        }

        // Unknown provenance from a trusted origin is not penalized.
        if method == self.unknown_recording_method {
            return Validation::accept();
        }

        manual_gate(allow_manual)
    }
}

fn manual_gate(allow_manual: bool) -> Validation {
    if allow_manual {
        Validation::accept()
    } else {
        Validation::reject(RejectionReason::UserInput)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(origin: Option<&str>, method: Option<i64>) -> RecordMetadata {
        RecordMetadata {
            data_origin: origin.map(str::to_string),
            recording_method: method,
            ..Default::default()
        }
    }

    fn fit(method: Option<i64>) -> RecordMetadata {
        metadata(Some(DEFAULT_TRUSTED_ORIGIN), method)
    }

    #[test]
    fn test_missing_metadata_or_origin() {
        let policy = TrustPolicy::default();

        let result = policy.validate(None, false);
        assert!(!result.trusted);
        assert_eq!(result.reason, RejectionReason::MissingOrigin);

        let result = policy.validate(Some(&metadata(None, Some(2))), true);
        assert_eq!(result.reason, RejectionReason::MissingOrigin);
    }

    #[test]
    fn test_empty_origin_counts_as_missing() {
        let result = TrustPolicy::default().validate(Some(&metadata(Some(""), Some(2))), false);
        assert!(!result.trusted);
        assert_eq!(result.reason, RejectionReason::MissingOrigin);

        let result = TrustPolicy::healthkit().validate(Some(&metadata(Some(""), None)), true);
        assert_eq!(result.reason, RejectionReason::MissingOrigin);
    }

    #[test]
    fn test_healthkit_policy_trusts_any_bundle() {
        let policy = TrustPolicy::healthkit();
        assert!(policy.validate(Some(&metadata(Some("com.apple.health"), None)), false).trusted);
        assert!(policy.validate(Some(&metadata(Some("com.strava"), None)), false).trusted);

        let manual = metadata(Some("com.apple.health"), Some(RECORDING_METHOD_MANUAL_ENTRY));
        assert_eq!(
            policy.validate(Some(&manual), false).reason,
            RejectionReason::UserInput
        );
    }

    #[test]
    fn test_unreadable_method_is_not_treated_as_absent() {
        let mut record = fit(None);
        record
            .extra
            .insert("recordingMethod".to_string(), serde_json::json!("2"));

        let policy = TrustPolicy::default();
        assert_eq!(
            policy.validate(Some(&record), false).reason,
            RejectionReason::UserInput
        );
        assert!(policy.validate(Some(&record), true).trusted);
    }

    #[test]
    fn test_untrusted_origin_beats_manual_bypass() {
        let policy = TrustPolicy::default();
        let record = metadata(Some("com.example.stepfaker"), Some(2));

        let result = policy.validate(Some(&record), true);
        assert!(!result.trusted);
        assert_eq!(result.reason, RejectionReason::UntrustedPackage);
    }

    #[test]
    fn test_absent_method_is_accepted() {
        let result = TrustPolicy::default().validate(Some(&fit(None)), false);
        assert!(result.trusted);
        assert_eq!(result.reason, RejectionReason::None);
    }

    #[test]
    fn test_manual_entry_depends_on_bypass() {
        let policy = TrustPolicy::default();
        let record = fit(Some(RECORDING_METHOD_MANUAL_ENTRY));

        let blocked = policy.validate(Some(&record), false);
        assert!(!blocked.trusted);
        assert_eq!(blocked.reason, RejectionReason::UserInput);

        let allowed = policy.validate(Some(&record), true);
        assert!(allowed.trusted);
        assert_eq!(allowed.reason, RejectionReason::None);
    }

    #[test]
    fn test_automatic_and_active_methods_accepted() {
        let policy = TrustPolicy::default();
        for method in [
            RECORDING_METHOD_ACTIVELY_RECORDED,
            RECORDING_METHOD_AUTOMATICALLY_RECORDED,
        ] {
            assert!(policy.validate(Some(&fit(Some(method))), false).trusted);
        }
    }

    #[test]
    fn test_unknown_method_carve_out() {
        let result = TrustPolicy::default().validate(Some(&fit(Some(0))), false);
        assert!(result.trusted);
    }

    #[test]
    fn test_unrecognized_method_treated_as_user_input() {
        let policy = TrustPolicy::default();

        let result = policy.validate(Some(&fit(Some(42))), false);
        assert_eq!(result.reason, RejectionReason::UserInput);

        assert!(policy.validate(Some(&fit(Some(42))), true).trusted);
    }

    #[test]
    fn test_validation_is_deterministic() {
        let policy = TrustPolicy::default();
        let record = fit(Some(RECORDING_METHOD_MANUAL_ENTRY));
        for allow_manual in [false, true] {
            assert_eq!(
                policy.validate(Some(&record), allow_manual),
                policy.validate(Some(&record), allow_manual)
            );
        }
    }

    #[test]
    fn test_custom_origins() {
        let policy = TrustPolicy::with_origins(["com.apple.health", "com.garmin.connect"]);
        let record = metadata(Some("com.garmin.connect"), Some(2));
        assert!(policy.validate(Some(&record), false).trusted);

        let record = fit(Some(2));
        assert_eq!(
            policy.validate(Some(&record), false).reason,
            RejectionReason::UntrustedPackage
        );
    }
}
