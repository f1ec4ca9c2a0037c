//! Error types for the permissions exporter.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response}
};
use serde::Serialize;
use thiserror::Error;

/// Result type alias for the exporter.
pub type Result<T> = std::result::Result<T, ExporterError>;

/// Errors that can occur in the permissions exporter.
#[derive(Error, Debug)]
pub enum ExporterError {
    /// The initial database connection could not be established.
    #[error("Error connecting to database at {host}: {source}")]
    Connection {
        host: String,
        #[source]
        source: sqlx::Error
    },

    /// The grants query failed for one cycle.
    #[error("Query error: {0}")]
    Query(#[from] sqlx::Error),

    /// A sample could not be applied to the permission registry.
    #[error("Registry update error: {0}")]
    RegistryUpdate(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Telemetry recorder installation error.
    #[error("Telemetry error: {0}")]
    Telemetry(String),

    /// Server startup error.
    #[error("Server error: {0}")]
    Server(String)
}

impl ExporterError {
    pub fn connection(host: impl Into<String>, source: sqlx::Error) -> Self {
        Self::Connection {
            host: host.into(),
            source
        }
    }

    /// Whether the error ends the process. Query and registry failures only
    /// cost one cycle.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Query(_) | Self::RegistryUpdate(_))
    }

    /// Short label used for the `outcome` of a failed cycle.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "connection_error",
            Self::Query(_) => "query_error",
            Self::RegistryUpdate(_) => "registry_error",
            Self::Configuration(_) => "configuration_error",
            Self::Telemetry(_) => "telemetry_error",
            Self::Server(_) => "server_error"
        }
    }
}

impl From<prometheus::Error> for ExporterError {
    fn from(e: prometheus::Error) -> Self {
        Self::RegistryUpdate(e.to_string())
    }
}

impl From<validator::ValidationErrors> for ExporterError {
    fn from(e: validator::ValidationErrors) -> Self {
        Self::Configuration(e.to_string())
    }
}

/// Error response body for HTTP endpoints.
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>
}

impl IntoResponse for ExporterError {
    fn into_response(self) -> Response {
        let (status, details) = match &self {
            Self::Query(e) => {
                tracing::error!(error = %e, "Database error");
                (StatusCode::SERVICE_UNAVAILABLE, None)
            }
            Self::RegistryUpdate(msg) => {
                tracing::error!(message = %msg, "Registry error");
                (StatusCode::INTERNAL_SERVER_ERROR, Some(msg.clone()))
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, None)
        };

        let body = ErrorResponse {
            error: self.to_string(),
            code: self.kind().to_uppercase(),
            details
        };

        (status, Json(body)).into_response()
    }
}
