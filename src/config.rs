//! Reconciliation configuration
//!
//! Loaded from JSON (see `ReconcileConfig::from_json`); every field has a
//! default so a partial document is valid.

use crate::error::ReconcileError;
use crate::trust::TrustPolicy;
use serde::{Deserialize, Serialize};

/// Default BMR lookback window in days
pub const DEFAULT_BMR_LOOKBACK_DAYS: u32 = 30;

/// Longest accepted BMR lookback window in days
pub const MAX_BMR_LOOKBACK_DAYS: u32 = 366;

/// Pipeline-wide settings for a reconciler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Origin and recording-method trust policy
    pub trust: TrustPolicy,
    /// Days before the target day searched for basal-rate records
    pub bmr_lookback_days: u32,
    /// Accept manually entered records (test/debug override)
    pub allow_manual: bool,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            trust: TrustPolicy::default(),
            bmr_lookback_days: DEFAULT_BMR_LOOKBACK_DAYS,
            allow_manual: false,
        }
    }
}

impl ReconcileConfig {
    /// Defaults for HealthKit input, where any source bundle is trusted
    pub fn healthkit() -> Self {
        Self {
            trust: TrustPolicy::healthkit(),
            ..Default::default()
        }
    }

    /// Load and validate configuration from JSON
    pub fn from_json(json: &str) -> Result<Self, ReconcileError> {
        let config: ReconcileConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to JSON
    pub fn to_json(&self) -> Result<String, ReconcileError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ReconcileError> {
        if self.bmr_lookback_days > MAX_BMR_LOOKBACK_DAYS {
            return Err(ReconcileError::InvalidConfig(format!(
                "bmr_lookback_days must be at most {MAX_BMR_LOOKBACK_DAYS}, got {}",
                self.bmr_lookback_days
            )));
        }

        if self.trust.trusted_origins.is_empty() {
            return Err(ReconcileError::InvalidConfig(
                "trust.trusted_origins must list at least one origin".to_string(),
            ));
        }

        if self.trust.trusted_origins.iter().any(|o| o.trim().is_empty()) {
            return Err(ReconcileError::InvalidConfig(
                "trust.trusted_origins contains an empty origin".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trust::DEFAULT_TRUSTED_ORIGIN;

    #[test]
    fn test_partial_document_uses_defaults() {
        let config = ReconcileConfig::from_json(r#"{"allow_manual": true}"#).unwrap();
        assert!(config.allow_manual);
        assert_eq!(config.bmr_lookback_days, DEFAULT_BMR_LOOKBACK_DAYS);
        assert_eq!(config.trust.trusted_origins, vec![DEFAULT_TRUSTED_ORIGIN]);
        assert_eq!(config.trust.allowed_recording_methods, vec![1, 2]);
    }

    #[test]
    fn test_nested_trust_policy() {
        let json = r#"{
            "trust": {
                "trusted_origins": ["com.sec.android.app.shealth"],
                "allowed_recording_methods": [2]
            },
            "bmr_lookback_days": 14
        }"#;

        let config = ReconcileConfig::from_json(json).unwrap();
        assert_eq!(config.bmr_lookback_days, 14);
        assert_eq!(config.trust.allowed_recording_methods, vec![2]);
        assert_eq!(config.trust.manual_recording_method, 3);
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(matches!(
            ReconcileConfig::from_json(r#"{"bmr_lookback_days": 4000}"#),
            Err(ReconcileError::InvalidConfig(_))
        ));
        assert!(matches!(
            ReconcileConfig::from_json(r#"{"trust": {"trusted_origins": []}}"#),
            Err(ReconcileError::InvalidConfig(_))
        ));
        assert!(matches!(
            ReconcileConfig::from_json(r#"{"trust": {"trusted_origins": ["  "]}}"#),
            Err(ReconcileError::InvalidConfig(_))
        ));
        assert!(matches!(
            ReconcileConfig::from_json("not json"),
            Err(ReconcileError::JsonError(_))
        ));
    }

    #[test]
    fn test_healthkit_defaults() {
        let config = ReconcileConfig::healthkit();
        assert_eq!(config.trust.trusted_origins, vec!["*"]);
        assert_eq!(config.bmr_lookback_days, DEFAULT_BMR_LOOKBACK_DAYS);
        assert!(!config.allow_manual);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_serialization() {
        let config = ReconcileConfig {
            allow_manual: true,
            ..Default::default()
        };
        let json = config.to_json().unwrap();
        assert_eq!(ReconcileConfig::from_json(&json).unwrap(), config);
    }
}
