//! Logging setup and the exporter's own operational metrics.

use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::error::{ExporterError, Result};
use crate::reconciler::ReconcileReport;

pub const CYCLES_TOTAL: &str = "mysql_permissions_exporter_cycles_total";
pub const CYCLE_DURATION_SECONDS: &str = "mysql_permissions_exporter_cycle_duration_seconds";
pub const SNAPSHOT_RECORDS: &str = "mysql_permissions_exporter_snapshot_records";
pub const PUBLISHED_SERIES: &str = "mysql_permissions_exporter_published_series";
pub const SERIES_REMOVED_TOTAL: &str = "mysql_permissions_exporter_series_removed_total";

/// Records cycle outcomes through the `metrics` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct CycleTelemetry;

impl CycleTelemetry {
    pub fn new() -> Self {
        Self
    }

    pub fn record_success(&self, report: &ReconcileReport, elapsed: Duration) {
        counter!(CYCLES_TOTAL, "outcome" => "success").increment(1);
        counter!(SERIES_REMOVED_TOTAL).increment(report.series_removed as u64);
        histogram!(CYCLE_DURATION_SECONDS).record(elapsed.as_secs_f64());
        gauge!(SNAPSHOT_RECORDS).set(report.records as f64);
        gauge!(PUBLISHED_SERIES).set(report.series_published as f64);
    }

    pub fn record_failure(&self, error: &ExporterError, elapsed: Duration) {
        counter!(CYCLES_TOTAL, "outcome" => error.kind()).increment(1);
        histogram!(CYCLE_DURATION_SECONDS).record(elapsed.as_secs_f64());
    }
}

/// Installs the global `metrics` recorder and returns the handle used to
/// render it on `/metrics`.
pub fn install_recorder() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ExporterError::Telemetry(e.to_string()))
}

/// Initialises `tracing` output, filtered by `RUST_LOG` and defaulting to
/// `info`.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    fn counter_value(
        snapshot: &[(
            metrics_util::CompositeKey,
            Option<metrics::Unit>,
            Option<metrics::SharedString>,
            DebugValue
        )],
        name: &str,
        outcome: Option<&str>
    ) -> Option<u64> {
        snapshot.iter().find_map(|(key, _, _, value)| {
            let key = key.key();
            if key.name() != name {
                return None;
            }
            if let Some(outcome) = outcome {
                if !key
                    .labels()
                    .any(|label| label.key() == "outcome" && label.value() == outcome)
                {
                    return None;
                }
            }
            match value {
                DebugValue::Counter(n) => Some(*n),
                _ => None
            }
        })
    }

    #[test]
    fn test_record_success() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            let telemetry = CycleTelemetry::new();
            let report = ReconcileReport {
                records: 2,
                samples_upserted: 38,
                series_added: 38,
                series_removed: 19,
                series_published: 38
            };
            telemetry.record_success(&report, Duration::from_millis(12));
        });

        let snapshot = snapshotter.snapshot().into_vec();
        assert_eq!(counter_value(&snapshot, CYCLES_TOTAL, Some("success")), Some(1));
        assert_eq!(counter_value(&snapshot, SERIES_REMOVED_TOTAL, None), Some(19));
        assert!(
            snapshot
                .iter()
                .any(|(key, _, _, _)| key.key().name() == PUBLISHED_SERIES)
        );
    }

    #[test]
    fn test_record_failure_uses_error_kind() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            let telemetry = CycleTelemetry::new();
            telemetry.record_failure(
                &ExporterError::Query(sqlx::Error::PoolTimedOut),
                Duration::from_millis(3)
            );
            telemetry.record_failure(
                &ExporterError::RegistryUpdate("boom".to_string()),
                Duration::from_millis(3)
            );
        });

        let snapshot = snapshotter.snapshot().into_vec();
        assert_eq!(
            counter_value(&snapshot, CYCLES_TOTAL, Some("query_error")),
            Some(1)
        );
        assert_eq!(
            counter_value(&snapshot, CYCLES_TOTAL, Some("registry_error")),
            Some(1)
        );
        assert_eq!(counter_value(&snapshot, CYCLES_TOTAL, Some("success")), None);
    }
}
