//! Bundled single-page dashboard.

use axum::{
    extract::State,
    http::header,
    response::{Html, IntoResponse},
};
use handlebars::Handlebars;
use serde_json::json;

use super::ApiError;
use crate::AppState;

const DASHBOARD_TEMPLATE: &str = include_str!("../../assets/dashboard.html");
const DASHBOARD_TEMPLATE_NAME: &str = "dashboard";

/// Serve the cost dashboard page.
///
/// The page is static; it calls the cost endpoints from the browser.
#[cfg_attr(feature = "utoipa", utoipa::path(
    get,
    path = "/dashboard",
    tag = "dashboard",
    operation_id = "dashboard",
    responses(
        (status = 200, description = "Dashboard HTML page", body = String, content_type = "text/html"),
        (status = 500, description = "Template rendering failed", body = super::ErrorResponse),
    )
))]
pub async fn dashboard(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let page = render(&state.config.dashboard.title)?;
    Ok(([(header::CACHE_CONTROL, "no-cache")], Html(page)))
}

/// Render the page with the configured title. Handlebars HTML-escapes `{{title}}`.
fn render(title: &str) -> Result<String, ApiError> {
    let mut handlebars = Handlebars::new();
    handlebars.set_strict_mode(true);
    handlebars
        .register_template_string(DASHBOARD_TEMPLATE_NAME, DASHBOARD_TEMPLATE)
        .map_err(|e| ApiError::Internal(format!("Failed to parse dashboard template: {e}")))?;

    handlebars
        .render(DASHBOARD_TEMPLATE_NAME, &json!({ "title": title }))
        .map_err(|e| ApiError::Internal(format!("Failed to render dashboard template: {e}")))
}
