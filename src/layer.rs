//! Health layer façade
//!
//! Gates every data call on the platform readiness state. Callers check or
//! refresh permissions first; data calls made in any other state fail with
//! [`ReconcileError::NotReady`] instead of returning empty numbers.

use crate::buckets::DayWindow;
use crate::error::ReconcileError;
use crate::pipeline::{DebugSnapshot, Reconciler};
use crate::source::{PermissionGate, RecordSource};
use crate::types::{DashboardMetrics, HealthState, HourlyHealthPayload};
use tracing::info;

pub struct HealthLayer<G, S> {
    gate: G,
    reconciler: Reconciler<S>,
    state: HealthState,
}

impl<G: PermissionGate, S: RecordSource> HealthLayer<G, S> {
    /// New layer; nothing is readable until [`Self::ensure_permissions`] reports ready
    pub fn new(gate: G, reconciler: Reconciler<S>) -> Self {
        Self {
            gate,
            reconciler,
            state: HealthState::NotAuthorized,
        }
    }

    pub fn state(&self) -> HealthState {
        self.state
    }

    /// Ask the gate for the current readiness state and remember it
    pub async fn ensure_permissions(&mut self) -> HealthState {
        let state = self.gate.ensure_permissions().await;
        if state != self.state {
            info!(from = %self.state, to = %state, "Health layer state changed");
        }
        self.state = state;
        state
    }

    fn ensure_ready(&self) -> Result<(), ReconcileError> {
        match self.state {
            HealthState::Ready => Ok(()),
            other => Err(ReconcileError::NotReady(other)),
        }
    }

    pub async fn hourly_payload_for(
        &mut self,
        day: &DayWindow,
    ) -> Result<Vec<HourlyHealthPayload>, ReconcileError> {
        self.ensure_ready()?;
        Ok(self.reconciler.hourly_payload_for(day).await)
    }

    pub async fn today_hourly_payload(&mut self) -> Result<Vec<HourlyHealthPayload>, ReconcileError> {
        self.hourly_payload_for(&DayWindow::today()).await
    }

    pub async fn dashboard_metrics_for(
        &mut self,
        day: &DayWindow,
    ) -> Result<DashboardMetrics, ReconcileError> {
        self.ensure_ready()?;
        Ok(self.reconciler.dashboard_metrics_for(day).await)
    }

    pub async fn dashboard_metrics(&mut self) -> Result<DashboardMetrics, ReconcileError> {
        self.dashboard_metrics_for(&DayWindow::today()).await
    }

    pub fn set_bypass_manual_filter(&mut self, bypass: bool) {
        self.reconciler.set_bypass_manual_filter(bypass);
    }

    pub fn debug_info(&self) -> Vec<String> {
        self.reconciler.debug_info()
    }

    pub fn debug_snapshot(&self) -> Option<&DebugSnapshot> {
        self.reconciler.debug_snapshot()
    }

    pub fn reconciler(&self) -> &Reconciler<S> {
        &self.reconciler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{MemorySource, StaticGate};
    use crate::trust::DEFAULT_TRUSTED_ORIGIN;
    use crate::types::{RawRecord, RecordKind, RecordMetadata, RecordPayload};
    use futures::executor::block_on;

    fn day() -> DayWindow {
        DayWindow::parse("2024-05-15", "+02:00").unwrap()
    }

    fn layer(state: HealthState) -> HealthLayer<StaticGate, MemorySource> {
        let source = MemorySource::new(vec![RawRecord {
            kind: RecordKind::Steps,
            start_time: Some("2024-05-15T06:00:00Z".to_string()),
            end_time: Some("2024-05-15T06:30:00Z".to_string()),
            payload: Some(RecordPayload::Count { count: 640.0 }),
            metadata: Some(RecordMetadata {
                data_origin: Some(DEFAULT_TRUSTED_ORIGIN.to_string()),
                ..Default::default()
            }),
        }]);
        HealthLayer::new(StaticGate(state), Reconciler::with_defaults(source))
    }

    #[test]
    fn test_data_calls_require_ready() {
        for state in [
            HealthState::NotSupported,
            HealthState::HealthAppMissing,
            HealthState::NotAuthorized,
            HealthState::NoTrustedData,
        ] {
            let mut layer = layer(state);
            assert_eq!(block_on(layer.ensure_permissions()), state);

            let err = block_on(layer.hourly_payload_for(&day())).unwrap_err();
            assert!(matches!(err, ReconcileError::NotReady(s) if s == state));
            assert!(block_on(layer.dashboard_metrics_for(&day())).is_err());
            assert!(layer.debug_snapshot().is_none());
        }
    }

    #[test]
    fn test_not_ready_before_permission_check() {
        let mut layer = layer(HealthState::Ready);
        assert!(matches!(
            block_on(layer.dashboard_metrics_for(&day())),
            Err(ReconcileError::NotReady(HealthState::NotAuthorized))
        ));
    }

    #[test]
    fn test_ready_layer_returns_payload() {
        let mut layer = layer(HealthState::Ready);
        assert_eq!(block_on(layer.ensure_permissions()), HealthState::Ready);

        let payload = block_on(layer.hourly_payload_for(&day())).unwrap();
        assert_eq!(payload.len(), 24);
        assert!((payload[8].steps - 640.0).abs() < 1e-9);
        assert!(layer.debug_snapshot().is_some());
        assert_eq!(layer.debug_info()[0], "Tier1 (Direct): 0.0 | Tier2 (Est): 0.0");
    }

    #[test]
    fn test_not_ready_message() {
        let err = ReconcileError::NotReady(HealthState::NotAuthorized);
        assert_eq!(err.to_string(), "Health layer not ready. Current state: NOT_AUTHORIZED");
    }
}
