//! Shared state for the HTTP endpoints.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use tokio::sync::watch;

use crate::driver::CycleStatus;
use crate::registry::PrometheusPermissionRegistry;

/// State handed to every handler.
///
/// Handlers only read: the registry is written by the cycle driver and the
/// status by its watch channel.
pub struct AppState {
    pub registry: Arc<PrometheusPermissionRegistry>,
    /// Renders the exporter's own metrics, when a recorder is installed.
    pub telemetry: Option<PrometheusHandle>,
    pub status: watch::Receiver<CycleStatus>
}

impl AppState {
    pub fn new(
        registry: Arc<PrometheusPermissionRegistry>,
        status: watch::Receiver<CycleStatus>
    ) -> Self {
        Self {
            registry,
            telemetry: None,
            status
        }
    }

    #[must_use]
    pub fn with_telemetry(mut self, handle: PrometheusHandle) -> Self {
        self.telemetry = Some(handle);
        self
    }

    pub fn status(&self) -> CycleStatus {
        self.status.borrow().clone()
    }
}
