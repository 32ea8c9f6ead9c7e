use utoipa::OpenApi;

use crate::{
    costs::{
        ChartData, ChartDataset, CostAnalysis, CostAnalysisRequest, CostForecast, CostRecord,
        ForecastPoint, ServiceCost, TopServices,
    },
    routes::{costs, dashboard, error::ErrorResponse, health},
};

/// OpenAPI documentation for costscope
#[derive(OpenApi)]
#[openapi(
    info(
        title = "AWS Cost Analysis API",
        description = r#"**costscope** proxies AWS Cost Explorer and reshapes its results into chart-ready JSON.

## Endpoints

- `POST /costs/analyze` - cost records, total and Chart.js payload for a date range, optionally grouped by a dimension.
- `GET /costs/services` - the most expensive services over a trailing window.
- `GET /costs/forecast` - a daily blended-cost forecast.

## Errors

Every error response has the body `{"detail": "<message>"}`:

| Status | Meaning |
|--------|---------|
| 400 | Invalid input: unparseable or inverted dates, unknown granularity, out-of-range parameter |
| 500 | Cost Explorer call failed (`AWS API Error: ...`) or an unexpected fault (`Internal error: ...`) |
| 503 | AWS credentials are missing or rejected |

## Amounts

Money amounts are JSON numbers in the reported currency. `total_cost` and per-service costs are rounded to cents; per-record costs are not."#,
        license(name = "Apache-2.0 OR MIT"),
    ),
    tags(
        (name = "costs", description = "Cost analysis, top services and forecasts from AWS Cost Explorer."),
        (name = "dashboard", description = "Bundled HTML dashboard."),
        (name = "health", description = "Service banner and liveness."),
    ),
    paths(
        health::root,
        health::health_check,
        costs::analyze,
        costs::top_services,
        costs::forecast,
        dashboard::dashboard,
    ),
    components(schemas(
        CostAnalysisRequest,
        CostAnalysis,
        CostRecord,
        ChartData,
        ChartDataset,
        TopServices,
        ServiceCost,
        CostForecast,
        ForecastPoint,
        ErrorResponse,
        health::ServiceInfo,
        health::HealthStatus,
    ))
)]
pub struct ApiDoc;

impl ApiDoc {
    /// Build the OpenAPI document with the crate version filled in.
    pub fn build() -> utoipa::openapi::OpenApi {
        let mut spec = Self::openapi();
        spec.info.version = env!("CARGO_PKG_VERSION").to_string();
        spec
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_documents_cost_endpoints() {
        let spec = ApiDoc::build();
        for path in ["/costs/analyze", "/costs/services", "/costs/forecast", "/health"] {
            assert!(spec.paths.paths.contains_key(path), "missing {path}");
        }
        assert_eq!(spec.info.version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_serializes_to_json() {
        let json = serde_json::to_value(ApiDoc::build()).unwrap();
        assert!(json["components"]["schemas"]["CostAnalysis"].is_object());
        assert!(json["components"]["schemas"]["ErrorResponse"].is_object());
    }
}
