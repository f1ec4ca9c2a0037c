//! The polling loop: read a snapshot, reconcile it, sleep, repeat.
//!
//! ```text
//! Idle ──ping ok──► Reading ──► Reconciling ──► Sleeping ──┐
//!   │                  ▲                                     │
//!   └─ping failed─► Failed      └─────────────────────────────┘
//! ```
//!
//! Query and registry failures only cost the current cycle: they are logged,
//! the published label set is left as it was, and the loop sleeps and
//! retries. `Failed` is reached only when the store is unreachable at
//! startup.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::error::{ExporterError, Result};
use crate::reader::SnapshotReader;
use crate::reconciler::{ReconcileReport, Reconciler};
use crate::registry::PermissionRegistry;
use crate::telemetry::CycleTelemetry;

/// Where the driver currently is in its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    Idle,
    Reading,
    Reconciling,
    Sleeping,
    Failed
}

/// Status published after every transition, read by `/health`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleStatus {
    pub state: CycleState,
    pub completed_cycles: u64,
    pub failed_cycles: u64,
    /// Whether the most recent cycle failed.
    pub last_cycle_failed: bool,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub published_series: usize
}

impl Default for CycleStatus {
    fn default() -> Self {
        Self {
            state: CycleState::Idle,
            completed_cycles: 0,
            failed_cycles: 0,
            last_cycle_failed: false,
            last_success: None,
            last_error: None,
            published_series: 0
        }
    }
}

impl CycleStatus {
    pub fn is_healthy(&self) -> bool {
        self.state != CycleState::Failed && !self.last_cycle_failed
    }
}

/// Runs the read → reconcile → sleep loop against one reader and registry.
pub struct CycleDriver<S, R: ?Sized> {
    reader: S,
    reconciler: Reconciler<R>,
    interval: Duration,
    telemetry: CycleTelemetry,
    status: watch::Sender<CycleStatus>
}

impl<S, R> CycleDriver<S, R>
where
    S: SnapshotReader,
    R: PermissionRegistry + ?Sized
{
    pub fn new(reader: S, registry: Arc<R>, interval: Duration) -> Self {
        let (status, _) = watch::channel(CycleStatus::default());
        Self {
            reader,
            reconciler: Reconciler::new(registry),
            interval,
            telemetry: CycleTelemetry::new(),
            status
        }
    }

    /// Receiver of every status update.
    pub fn subscribe(&self) -> watch::Receiver<CycleStatus> {
        self.status.subscribe()
    }

    pub fn status(&self) -> CycleStatus {
        self.status.borrow().clone()
    }

    pub fn reconciler(&self) -> &Reconciler<R> {
        &self.reconciler
    }

    /// Verifies the store is reachable before the first cycle.
    ///
    /// On failure the driver moves to [`CycleState::Failed`] and the error is
    /// returned as fatal.
    pub async fn start(&mut self) -> Result<()> {
        if let Err(e) = self.reader.ping().await {
            error!(error = %e, "Startup connectivity check failed");
            let message = e.to_string();
            self.status.send_modify(|status| {
                status.state = CycleState::Failed;
                status.last_error = Some(message);
            });
            return Err(match e {
                ExporterError::Query(source) => {
                    ExporterError::connection(self.reader.endpoint(), source)
                }
                other => other
            });
        }

        info!(interval_secs = self.interval.as_secs(), "Cycle driver ready");
        Ok(())
    }

    /// Runs one read and reconcile.
    ///
    /// Errors are recorded in the status and returned, but leave the
    /// published label set untouched.
    pub async fn run_cycle(&mut self) -> Result<ReconcileReport> {
        let started = Instant::now();
        self.transition(CycleState::Reading);

        let outcome = match self.reader.read().await {
            Ok(snapshot) => {
                self.transition(CycleState::Reconciling);
                self.reconciler.reconcile(&snapshot)
            }
            Err(e) => Err(e)
        };

        let elapsed = started.elapsed();
        match &outcome {
            Ok(report) => {
                info!(
                    records = report.records,
                    series_published = report.series_published,
                    series_added = report.series_added,
                    series_removed = report.series_removed,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Permission cycle completed"
                );
                self.telemetry.record_success(report, elapsed);
                let published = report.series_published;
                self.status.send_modify(|status| {
                    status.completed_cycles += 1;
                    status.last_cycle_failed = false;
                    status.last_success = Some(Utc::now());
                    status.last_error = None;
                    status.published_series = published;
                });
            }
            Err(e) => {
                warn!(
                    error = %e,
                    kind = e.kind(),
                    series_published = self.reconciler.published().len(),
                    "Permission cycle failed, keeping previously published series"
                );
                self.telemetry.record_failure(e, elapsed);
                let message = e.to_string();
                self.status.send_modify(|status| {
                    status.failed_cycles += 1;
                    status.last_cycle_failed = true;
                    status.last_error = Some(message);
                });
            }
        }

        outcome
    }

    /// Loops until `shutdown` turns `true` or its sender is dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            // Failures are contained to the cycle; run_cycle already logged them.
            let _ = self.run_cycle().await;

            self.transition(CycleState::Sleeping);
            tokio::select! {
                () = tokio::time::sleep(self.interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.transition(CycleState::Idle);
        info!("Cycle driver stopped");
    }

    fn transition(&self, state: CycleState) {
        self.status.send_modify(|status| status.state = state);
    }
}
