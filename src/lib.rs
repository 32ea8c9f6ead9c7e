//! costscope: an AWS Cost Explorer proxy.
//!
//! Serves cost analysis, top-service and forecast endpoints that reshape
//! Cost Explorer results into chart-ready JSON, plus a bundled dashboard.

use std::sync::Arc;

#[cfg(feature = "utoipa")]
use axum::Json;
use axum::{Router, routing::get};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

pub mod billing;
pub mod config;
pub mod costs;
pub mod middleware;
pub mod observability;
#[cfg(feature = "utoipa")]
pub mod openapi;
pub mod routes;

#[cfg(test)]
mod tests;

/// State shared by every request. Immutable after startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::AppConfig>,
    pub billing: Arc<dyn billing::BillingClient>,
}

impl AppState {
    /// Build state from configuration, constructing the billing backend.
    pub fn new(config: config::AppConfig) -> Result<Self, billing::BillingError> {
        let billing = billing::from_config(&config.billing)?;
        Ok(Self {
            config: Arc::new(config),
            billing,
        })
    }
}

/// Assemble the HTTP application.
pub fn build_app(state: AppState) -> Router {
    let config = state.config.clone();

    let mut app = Router::new()
        .route("/", get(routes::health::root))
        .route("/health", get(routes::health::health_check))
        .nest("/costs", routes::cost_routes());

    if config.dashboard.enabled {
        app = app.route("/dashboard", get(routes::dashboard::dashboard));
    }

    #[cfg(feature = "utoipa")]
    {
        app = app.route("/openapi.json", get(openapi_json));
    }

    if config.observability.metrics.enabled {
        app = app.route(
            &config.observability.metrics.path,
            get(routes::health::metrics),
        );
    }

    app = app.layer(axum::middleware::from_fn(middleware::request_id_middleware));

    // Layers are applied in reverse order, so CORS runs before request handling
    if let Some(cors_layer) = config.server.cors.clone().into_layer() {
        app = app.layer(cors_layer);
    }

    app.layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(config.server.body_limit_bytes))
        .with_state(state)
}

/// Returns the OpenAPI spec as JSON
#[cfg(feature = "utoipa")]
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(openapi::ApiDoc::build())
}
