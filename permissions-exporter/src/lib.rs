//! # MySQL Permissions Exporter
//!
//! Polls the MySQL grant tables and publishes every privilege flag as a
//! `mysql_permission` gauge for Prometheus to scrape.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │      MySQL      │────►│  Cycle Driver   │────►│   Permission    │
//! │ mysql.db / user │     │ read, reconcile │     │    Registry     │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//!                                                          │
//!                                                          ▼ HTTP
//!                                                   ┌─────────────┐
//!                                                   │ Prometheus  │
//!                                                   └─────────────┘
//! ```
//!
//! Each cycle reads a complete [`Snapshot`], upserts one sample per
//! `(user, host, db, permission)` and then removes the series whose label
//! set disappeared from the grant tables. A failed cycle leaves the
//! previously published series in place.
//!
//! ## Endpoints
//!
//! - `GET /metrics` - `mysql_permission` gauges plus exporter self-metrics
//! - `GET /health` - Cycle driver status

pub mod config;
pub mod driver;
pub mod error;
pub mod handlers;
pub mod privilege;
pub mod reader;
pub mod reconciler;
pub mod record;
pub mod registry;
pub mod routes;
pub mod server;
pub mod state;
pub mod telemetry;

pub use config::ExporterConfig;
pub use driver::{CycleDriver, CycleState, CycleStatus};
pub use error::{ExporterError, Result};
pub use privilege::Privilege;
pub use reader::{MySqlSnapshotReader, SnapshotReader};
pub use reconciler::{ReconcileReport, Reconciler};
pub use record::{LabelKey, PermissionRecord, PrivilegeSet, Snapshot};
pub use registry::{PermissionRegistry, PrometheusPermissionRegistry};
pub use server::ExporterServer;
