pub mod costs;
pub mod dashboard;
pub mod error;
pub mod health;

use axum::{
    Router,
    routing::{get, post},
};
pub use error::{ApiError, ErrorResponse};

use crate::AppState;

/// Routes for the cost endpoints.
pub fn cost_routes() -> Router<AppState> {
    Router::new()
        .route("/analyze", post(costs::analyze))
        .route("/services", get(costs::top_services))
        .route("/forecast", get(costs::forecast))
}
