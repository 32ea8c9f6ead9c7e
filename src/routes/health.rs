//! Service banner, liveness and metrics endpoints.

use axum::{Json, response::IntoResponse};
use chrono::{DateTime, Utc};
use http::StatusCode;
use serde::Serialize;

#[cfg(feature = "prometheus")]
use crate::observability::metrics::get_prometheus_handle;

/// Service banner returned at `/`.
#[derive(Debug, Serialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct ServiceInfo {
    #[cfg_attr(feature = "utoipa", schema(example = "AWS Cost Analysis API"))]
    pub message: String,
    /// Where the API description lives.
    #[cfg_attr(feature = "utoipa", schema(example = "/openapi.json"))]
    pub docs: String,
}

/// Liveness response.
#[derive(Debug, Serialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct HealthStatus {
    #[cfg_attr(feature = "utoipa", schema(example = "healthy"))]
    pub status: String,
    pub timestamp: DateTime<Utc>,
    /// Service version
    #[cfg_attr(feature = "utoipa", schema(example = "0.1.0"))]
    pub version: String,
}

#[cfg_attr(feature = "utoipa", utoipa::path(
    get,
    path = "/",
    tag = "health",
    operation_id = "service_info",
    responses(
        (status = 200, description = "Service banner", body = ServiceInfo),
    )
))]
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        message: "AWS Cost Analysis API".to_string(),
        docs: "/openapi.json".to_string(),
    })
}

/// Liveness check.
///
/// Always succeeds while the process is serving. It does not call
/// Cost Explorer, so it stays cheap and works without credentials.
#[cfg_attr(feature = "utoipa", utoipa::path(
    get,
    path = "/health",
    tag = "health",
    operation_id = "health_check",
    responses(
        (status = 200, description = "Service is healthy", body = HealthStatus),
    )
))]
#[tracing::instrument(name = "health.check")]
pub async fn health_check() -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Prometheus metrics endpoint.
///
/// Returns metrics in Prometheus text format.
#[tracing::instrument(name = "health.metrics")]
pub async fn metrics() -> impl IntoResponse {
    #[cfg(feature = "prometheus")]
    {
        return match get_prometheus_handle() {
            Some(handle) => (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                handle.render(),
            ),
            None => (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            ),
        };
    }
    #[cfg(not(feature = "prometheus"))]
    (
        StatusCode::NOT_FOUND,
        [("content-type", "text/plain")],
        "Prometheus metrics not enabled".to_string(),
    )
}
