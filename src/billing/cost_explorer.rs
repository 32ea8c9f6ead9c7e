use std::time::{Duration, Instant};

use async_trait::async_trait;
use http::HeaderMap;
use serde::{Serialize, de::DeserializeOwned};

use super::{
    AwsRequestSigner, BillingClient, BillingError,
    types::{
        GetCostAndUsageRequest, GetCostAndUsageResponse, GetCostForecastRequest,
        GetCostForecastResponse, ResultByTime,
    },
};
use crate::{config::CostExplorerConfig, observability::metrics};

const SERVICE_NAME: &str = "ce";
const TARGET_PREFIX: &str = "AWSInsightsIndexService";
const CONTENT_TYPE: &str = "application/x-amz-json-1.1";

/// Upper bound on pages fetched for one query.
const MAX_PAGES: u32 = 100;

/// AWS Cost Explorer client speaking the JSON 1.1 protocol.
pub struct CostExplorerClient {
    http: reqwest::Client,
    signer: AwsRequestSigner,
    endpoint: String,
    timeout: Duration,
}

impl CostExplorerClient {
    pub fn new(config: &CostExplorerConfig, http: reqwest::Client) -> Self {
        Self {
            http,
            signer: AwsRequestSigner::new(
                config.credentials.clone(),
                config.region.clone(),
                SERVICE_NAME,
            ),
            endpoint: format!("{}/", config.endpoint_url()),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Issue one signed JSON 1.1 call.
    async fn call<Req, Resp>(&self, operation: &str, request: &Req) -> Result<Resp, BillingError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let body = serde_json::to_vec(request).map_err(|e| BillingError::Decode(e.to_string()))?;
        let target = format!("{TARGET_PREFIX}.{operation}");

        let headers = [("content-type", CONTENT_TYPE), ("x-amz-target", target.as_str())];
        let signed_headers = self
            .signer
            .sign_request("POST", &self.endpoint, &headers, &body)
            .await?;

        let mut builder = self
            .http
            .post(&self.endpoint)
            .header("content-type", CONTENT_TYPE)
            .header("x-amz-target", &target)
            .timeout(self.timeout);
        for (name, value) in signed_headers {
            builder = builder.header(name, value);
        }

        let response = builder.body(body).send().await?;
        let status = response.status();
        let response_headers = response.headers().clone();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            return Err(parse_error(status.as_u16(), &response_headers, &bytes));
        }

        serde_json::from_slice(&bytes).map_err(|e| BillingError::Decode(e.to_string()))
    }

    async fn fetch_all_pages(
        &self,
        mut request: GetCostAndUsageRequest,
        pages: &mut u32,
    ) -> Result<Vec<ResultByTime>, BillingError> {
        let mut results = Vec::new();

        loop {
            let page: GetCostAndUsageResponse = self.call("GetCostAndUsage", &request).await?;
            *pages += 1;
            results.extend(page.results_by_time);

            match page.next_page_token {
                Some(token) if !token.is_empty() => {
                    if *pages >= MAX_PAGES {
                        return Err(BillingError::Decode(format!(
                            "pagination did not finish after {MAX_PAGES} pages"
                        )));
                    }
                    if request.next_page_token.as_deref() == Some(token.as_str()) {
                        return Err(BillingError::Decode(
                            "service returned the same NextPageToken twice".to_string(),
                        ));
                    }
                    request.next_page_token = Some(token);
                }
                _ => return Ok(results),
            }
        }
    }
}

#[async_trait]
impl BillingClient for CostExplorerClient {
    fn name(&self) -> &'static str {
        "cost_explorer"
    }

    #[tracing::instrument(
        name = "billing.get_cost_and_usage",
        skip(self, request),
        fields(
            start = %request.time_period.start,
            end = %request.time_period.end,
            granularity = %request.granularity,
        )
    )]
    async fn get_cost_and_usage(
        &self,
        request: GetCostAndUsageRequest,
    ) -> Result<Vec<ResultByTime>, BillingError> {
        let start = Instant::now();
        let mut pages = 0;
        let result = self.fetch_all_pages(request, &mut pages).await;
        let elapsed = start.elapsed();

        match &result {
            Ok(buckets) => {
                tracing::debug!(
                    pages,
                    buckets = buckets.len(),
                    duration_ms = elapsed.as_millis() as u64,
                    "GetCostAndUsage succeeded"
                );
                metrics::record_billing_request(
                    "GetCostAndUsage",
                    "success",
                    pages,
                    elapsed.as_secs_f64(),
                );
            }
            Err(e) => {
                tracing::warn!(
                    pages,
                    error = %e,
                    kind = e.kind(),
                    duration_ms = elapsed.as_millis() as u64,
                    "GetCostAndUsage failed"
                );
                metrics::record_billing_request(
                    "GetCostAndUsage",
                    e.kind(),
                    pages,
                    elapsed.as_secs_f64(),
                );
            }
        }

        result
    }

    #[tracing::instrument(
        name = "billing.get_cost_forecast",
        skip(self, request),
        fields(start = %request.time_period.start, end = %request.time_period.end)
    )]
    async fn get_cost_forecast(
        &self,
        request: GetCostForecastRequest,
    ) -> Result<GetCostForecastResponse, BillingError> {
        let start = Instant::now();
        let result: Result<GetCostForecastResponse, _> =
            self.call("GetCostForecast", &request).await;
        let elapsed = start.elapsed();

        match &result {
            Ok(forecast) => {
                tracing::debug!(
                    points = forecast.forecast_results_by_time.len(),
                    duration_ms = elapsed.as_millis() as u64,
                    "GetCostForecast succeeded"
                );
                metrics::record_billing_request(
                    "GetCostForecast",
                    "success",
                    1,
                    elapsed.as_secs_f64(),
                );
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    kind = e.kind(),
                    duration_ms = elapsed.as_millis() as u64,
                    "GetCostForecast failed"
                );
                metrics::record_billing_request(
                    "GetCostForecast",
                    e.kind(),
                    1,
                    elapsed.as_secs_f64(),
                );
            }
        }

        result
    }
}

/// Parse a JSON 1.1 error document.
///
/// The error code comes from `__type` (possibly namespaced with `#`) or the
/// `x-amzn-errortype` header (possibly suffixed with `:`). The message is
/// `message` or `Message`.
fn parse_error(status: u16, headers: &HeaderMap, body: &[u8]) -> BillingError {
    let doc: serde_json::Value =
        serde_json::from_slice(body).unwrap_or_else(|_| serde_json::json!({}));

    let code = doc["__type"]
        .as_str()
        .or_else(|| {
            headers
                .get("x-amzn-errortype")
                .and_then(|v| v.to_str().ok())
        })
        .map(|raw| {
            let raw = raw.rsplit('#').next().unwrap_or(raw);
            raw.split(':').next().unwrap_or(raw).to_string()
        })
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| format!("HTTP{status}"));

    let message = doc["message"]
        .as_str()
        .or_else(|| doc["Message"].as_str())
        .map(str::to_string)
        .unwrap_or_else(|| {
            let text = String::from_utf8_lossy(body).trim().to_string();
            if text.is_empty() {
                format!("HTTP status {status}")
            } else {
                text
            }
        });

    BillingError::Upstream {
        status,
        code,
        message,
    }
}
