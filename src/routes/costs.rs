//! Cost endpoints.
//!
//! Each handler validates its input, makes the billing calls it needs, and
//! reshapes the result. Nothing is cached between requests.

use axum::{
    Json,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
};
use chrono::Utc;
use validator::Validate;

use super::error::ApiError;
#[cfg(feature = "utoipa")]
use super::error::ErrorResponse;
use crate::{
    AppState,
    costs::{
        self, CostAnalysis, CostAnalysisRequest, CostForecast, CostQuery, ForecastQuery,
        ServicesQuery, TopServices,
    },
};

/// Analyze costs over a date range.
///
/// Returns every cost record in the range, the rounded total, and a
/// Chart.js-ready payload. With `group_by`, one chart series per group.
#[cfg_attr(feature = "utoipa", utoipa::path(
    post,
    path = "/costs/analyze",
    tag = "costs",
    operation_id = "costs_analyze",
    request_body = CostAnalysisRequest,
    responses(
        (status = 200, description = "Cost breakdown", body = CostAnalysis),
        (status = 400, description = "Invalid date range or granularity", body = ErrorResponse),
        (status = 500, description = "Cost Explorer call failed", body = ErrorResponse),
        (status = 503, description = "AWS credentials unavailable", body = ErrorResponse),
    )
))]
#[tracing::instrument(name = "costs.analyze", skip(state, payload))]
pub async fn analyze(
    State(state): State<AppState>,
    payload: Result<Json<CostAnalysisRequest>, JsonRejection>,
) -> Result<Json<CostAnalysis>, ApiError> {
    let Json(request) = payload?;
    let query = CostQuery::try_from(request)?;

    tracing::debug!(
        start = %query.start,
        end = %query.end,
        granularity = %query.granularity,
        group_by = ?query.group_by,
        "Analyzing costs"
    );

    let results = state
        .billing
        .get_cost_and_usage(query.to_request())
        .await?;
    let analysis = costs::aggregate(
        &results,
        query.is_grouped(),
        state.config.billing.default_currency(),
    )?;

    Ok(Json(analysis))
}

/// Most expensive services over the trailing window.
#[cfg_attr(feature = "utoipa", utoipa::path(
    get,
    path = "/costs/services",
    tag = "costs",
    operation_id = "costs_top_services",
    params(ServicesQuery),
    responses(
        (status = 200, description = "Services ranked by cost", body = TopServices),
        (status = 400, description = "Parameter out of range", body = ErrorResponse),
        (status = 500, description = "Cost Explorer call failed", body = ErrorResponse),
        (status = 503, description = "AWS credentials unavailable", body = ErrorResponse),
    )
))]
#[tracing::instrument(name = "costs.services", skip(state, params))]
pub async fn top_services(
    State(state): State<AppState>,
    params: Result<Query<ServicesQuery>, QueryRejection>,
) -> Result<Json<TopServices>, ApiError> {
    let Query(params) = params?;
    params.validate()?;

    let today = Utc::now().date_naive();
    let results = state
        .billing
        .get_cost_and_usage(costs::services_request(params.days, today))
        .await?;

    Ok(Json(costs::top_services(
        &results,
        params.limit as usize,
        params.days,
    )))
}

/// Forecast blended cost for the coming days.
#[cfg_attr(feature = "utoipa", utoipa::path(
    get,
    path = "/costs/forecast",
    tag = "costs",
    operation_id = "costs_forecast",
    params(ForecastQuery),
    responses(
        (status = 200, description = "Daily forecast", body = CostForecast),
        (status = 400, description = "Parameter out of range", body = ErrorResponse),
        (status = 500, description = "Cost Explorer call failed", body = ErrorResponse),
        (status = 503, description = "AWS credentials unavailable", body = ErrorResponse),
    )
))]
#[tracing::instrument(name = "costs.forecast", skip(state, params))]
pub async fn forecast(
    State(state): State<AppState>,
    params: Result<Query<ForecastQuery>, QueryRejection>,
) -> Result<Json<CostForecast>, ApiError> {
    let Query(params) = params?;
    params.validate()?;

    let today = Utc::now().date_naive();
    let response = state
        .billing
        .get_cost_forecast(costs::forecast_request(params.days, today))
        .await?;

    Ok(Json(costs::reshape_forecast(
        response,
        params.days,
        state.config.billing.default_currency(),
    )))
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use async_trait::async_trait;
    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode},
    };
    use rust_decimal::dec;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use crate::{
        AppState,
        billing::{
            BillingClient, BillingError,
            types::{
                BLENDED_COST, DateInterval, GetCostAndUsageRequest, GetCostForecastRequest,
                GetCostForecastResponse, MetricValue, ResultByTime,
            },
        },
        config::AppConfig,
    };

    /// Billing client returning canned buckets and recording what it was asked.
    struct CannedBilling {
        results: Vec<ResultByTime>,
        calls: AtomicUsize,
        last_request: Mutex<Option<GetCostAndUsageRequest>>,
        fail_with: Option<fn() -> BillingError>,
    }

    impl CannedBilling {
        fn new(results: Vec<ResultByTime>) -> Self {
            Self {
                results,
                calls: AtomicUsize::new(0),
                last_request: Mutex::new(None),
                fail_with: None,
            }
        }
    }

    #[async_trait]
    impl BillingClient for CannedBilling {
        fn name(&self) -> &'static str {
            "canned"
        }

        async fn get_cost_and_usage(
            &self,
            request: GetCostAndUsageRequest,
        ) -> Result<Vec<ResultByTime>, BillingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().unwrap() = Some(request);
            match self.fail_with {
                Some(make) => Err(make()),
                None => Ok(self.results.clone()),
            }
        }

        async fn get_cost_forecast(
            &self,
            _request: GetCostForecastRequest,
        ) -> Result<GetCostForecastResponse, BillingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(GetCostForecastResponse::default())
        }
    }

    fn day(start: &str, end: &str, amount: rust_decimal::Decimal) -> ResultByTime {
        ResultByTime {
            time_period: DateInterval {
                start: start.into(),
                end: end.into(),
            },
            total: [(
                BLENDED_COST.to_string(),
                MetricValue {
                    amount: Some(amount),
                    unit: Some("USD".into()),
                },
            )]
            .into(),
            groups: vec![],
            estimated: false,
        }
    }

    fn test_app(billing: Arc<CannedBilling>) -> Router {
        crate::build_app(AppState {
            config: Arc::new(AppConfig::default()),
            billing,
        })
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_analyze_two_days() {
        let billing = Arc::new(CannedBilling::new(vec![
            day("2024-01-01", "2024-01-02", dec!(10.00)),
            day("2024-01-02", "2024-01-03", dec!(20.00)),
        ]));
        let app = test_app(billing.clone());

        let (status, body) = send(
            &app,
            post_json(
                "/costs/analyze",
                json!({"start_date": "2024-01-01", "end_date": "2024-01-03", "granularity": "DAILY"}),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_cost"], json!(30.0));
        assert_eq!(body["currency"], "USD");
        assert_eq!(body["chart_data"]["datasets"].as_array().unwrap().len(), 1);
        assert_eq!(body["chart_data"]["datasets"][0]["data"], json!([10.0, 20.0]));

        let sent = billing.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(sent.time_period.start, "2024-01-01");
        assert_eq!(sent.time_period.end, "2024-01-03");
    }

    #[tokio::test]
    async fn test_inverted_range_never_calls_billing() {
        let billing = Arc::new(CannedBilling::new(vec![]));
        let app = test_app(billing.clone());

        let (status, body) = send(
            &app,
            post_json(
                "/costs/analyze",
                json!({"start_date": "2024-01-03", "end_date": "2024-01-01"}),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "Start date must be before end date");
        assert_eq!(billing.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let billing = Arc::new(CannedBilling::new(vec![]));
        let app = test_app(billing.clone());

        let (status, body) =
            send(&app, post_json("/costs/analyze", json!({"start_date": 5}))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].is_string());
        assert_eq!(billing.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_services_limit_out_of_range() {
        let billing = Arc::new(CannedBilling::new(vec![]));
        let app = test_app(billing.clone());

        let (status, body) = send(&app, get("/costs/services?limit=0")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "limit must be between 1 and 100");

        let (status, _) = send(&app, get("/costs/services?days=abc")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(billing.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_services_defaults() {
        let billing = Arc::new(CannedBilling::new(vec![]));
        let app = test_app(billing.clone());

        let (status, body) = send(&app, get("/costs/services")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["period_days"], 30);
        assert_eq!(body["total_services"], 0);
        assert_eq!(body["top_services"], json!([]));

        let sent = billing.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(sent.granularity, "MONTHLY");
        assert_eq!(sent.group_by[0].key, "SERVICE");
    }

    #[tokio::test]
    async fn test_forecast_days_out_of_range() {
        let billing = Arc::new(CannedBilling::new(vec![]));
        let app = test_app(billing.clone());

        let (status, _) = send(&app, get("/costs/forecast?days=366")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(&app, get("/costs/forecast?days=7")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["forecast_days"], 7);
        assert_eq!(body["currency"], "USD");
        assert_eq!(billing.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_billing_errors_map_to_status() {
        let mut canned = CannedBilling::new(vec![]);
        canned.fail_with = Some(|| BillingError::Credentials("no credentials in chain".into()));
        let app = test_app(Arc::new(canned));

        let (status, body) = send(&app, get("/costs/services")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["detail"].as_str().unwrap().contains("no credentials in chain"));

        let mut canned = CannedBilling::new(vec![]);
        canned.fail_with = Some(|| BillingError::Upstream {
            status: 400,
            code: "ValidationException".into(),
            message: "end date past the allowed range".into(),
        });
        let app = test_app(Arc::new(canned));

        let (status, body) = send(
            &app,
            post_json(
                "/costs/analyze",
                json!({"start_date": "2024-01-01", "end_date": "2024-01-03"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body["detail"],
            "AWS API Error: ValidationException: end date past the allowed range"
        );
    }
}
