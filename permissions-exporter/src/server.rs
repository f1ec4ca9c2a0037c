//! Server setup and lifecycle for the exporter.

use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;

use crate::config::ExporterConfig;
use crate::driver::CycleDriver;
use crate::error::{ExporterError, Result};
use crate::reader::{MySqlSnapshotReader, endpoint};
use crate::registry::PrometheusPermissionRegistry;
use crate::routes::create_router;
use crate::state::AppState;
use crate::telemetry;

/// The exporter process: one cycle driver and the scrape endpoint.
pub struct ExporterServer {
    config: ExporterConfig
}

impl ExporterServer {
    pub fn new(config: ExporterConfig) -> Self {
        Self { config }
    }

    /// Connects, starts the cycle driver and serves HTTP until a shutdown
    /// signal arrives.
    ///
    /// A database that is unreachable at startup ends the run with
    /// [`ExporterError::Connection`].
    pub async fn run(self) -> Result<()> {
        let handle = telemetry::install_recorder()?;
        let registry = Arc::new(PrometheusPermissionRegistry::new()?);

        let host = endpoint(&self.config.mysql);
        let reader = match MySqlSnapshotReader::connect(&self.config.mysql).await {
            Ok(reader) => reader,
            Err(e) => {
                tracing::error!(error = %e, "Error connecting to database at {host}");
                return Err(e);
            }
        };
        tracing::info!(%host, "Database connection successful");

        let mut driver = CycleDriver::new(
            reader,
            registry.clone(),
            self.config.webserver.refresh_interval()
        );
        driver.start().await?;

        let state = Arc::new(AppState::new(registry, driver.subscribe()).with_telemetry(handle));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let driver_handle = tokio::spawn(driver.run(shutdown_rx));

        let addr = self.config.webserver.socket_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ExporterError::Server(format!("Failed to bind to {addr}: {e}")))?;

        tracing::info!(%addr, "Permissions exporter listening");

        let served = axum::serve(listener, create_router(state))
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ExporterError::Server(format!("Server error: {e}")));

        let _ = shutdown_tx.send(true);
        if let Err(e) = driver_handle.await {
            tracing::warn!(error = %e, "Cycle driver task ended abnormally");
        }

        tracing::info!("Permissions exporter stopped");
        served
    }
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        () = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        },
    }
}

/// Entry point for running the exporter from a loaded configuration.
pub async fn run_server(config: ExporterConfig) -> Result<()> {
    ExporterServer::new(config).run().await
}
