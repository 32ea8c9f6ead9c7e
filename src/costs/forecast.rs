//! Daily cost forecast passthrough.

use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::billing::types::{DateInterval, GetCostForecastRequest, GetCostForecastResponse};

/// Query string of `GET /costs/forecast`.
#[derive(Debug, Clone, Deserialize, Validate)]
#[cfg_attr(feature = "utoipa", derive(utoipa::IntoParams))]
#[cfg_attr(feature = "utoipa", into_params(parameter_in = Query))]
pub struct ForecastQuery {
    /// Number of days to forecast (1-365).
    #[serde(default = "default_days")]
    #[validate(range(min = 1, max = 365, message = "days must be between 1 and 365"))]
    pub days: u32,
}

fn default_days() -> u32 {
    30
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct ForecastPoint {
    pub date: String,
    #[serde(with = "rust_decimal::serde::float")]
    #[cfg_attr(feature = "utoipa", schema(value_type = f64))]
    pub mean_value: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    #[cfg_attr(feature = "utoipa", schema(value_type = f64))]
    pub prediction_interval_lower: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    #[cfg_attr(feature = "utoipa", schema(value_type = f64))]
    pub prediction_interval_upper: Decimal,
}

/// Response body of `GET /costs/forecast`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct CostForecast {
    pub forecast_data: Vec<ForecastPoint>,
    /// Sum of the per-period mean values.
    #[serde(with = "rust_decimal::serde::float")]
    #[cfg_attr(feature = "utoipa", schema(value_type = f64))]
    pub total_forecast: Decimal,
    pub currency: String,
    pub forecast_days: u32,
}

/// Daily blended-cost forecast for the `days` starting `today`.
pub fn forecast_request(days: u32, today: NaiveDate) -> GetCostForecastRequest {
    let end = today
        .checked_add_days(Days::new(u64::from(days)))
        .unwrap_or(NaiveDate::MAX);

    GetCostForecastRequest {
        time_period: DateInterval {
            start: today.format("%Y-%m-%d").to_string(),
            end: end.format("%Y-%m-%d").to_string(),
        },
        metric: "BLENDED_COST".to_string(),
        granularity: "DAILY".to_string(),
    }
}

/// Reshape a forecast response. Points without a mean are dropped; missing
/// interval bounds fall back to the mean.
pub fn reshape_forecast(
    response: GetCostForecastResponse,
    days: u32,
    default_currency: &str,
) -> CostForecast {
    let forecast_data: Vec<ForecastPoint> = response
        .forecast_results_by_time
        .into_iter()
        .filter_map(|result| {
            let mean = result.mean_value?;
            Some(ForecastPoint {
                date: result.time_period.start,
                mean_value: mean,
                prediction_interval_lower: result.prediction_interval_lower_bound.unwrap_or(mean),
                prediction_interval_upper: result.prediction_interval_upper_bound.unwrap_or(mean),
            })
        })
        .collect();

    let total_forecast = forecast_data.iter().map(|p| p.mean_value).sum();
    let currency = response
        .total
        .and_then(|t| t.unit)
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| default_currency.to_string());

    CostForecast {
        forecast_data,
        total_forecast,
        currency,
        forecast_days: days,
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::dec;
    use serde_json::json;

    use super::*;
    use crate::billing::types::{ForecastResult, MetricValue};

    fn point(
        start: &str,
        mean: Option<Decimal>,
        lower: Option<Decimal>,
        upper: Option<Decimal>,
    ) -> ForecastResult {
        ForecastResult {
            time_period: DateInterval {
                start: start.into(),
                end: start.into(),
            },
            mean_value: mean,
            prediction_interval_lower_bound: lower,
            prediction_interval_upper_bound: upper,
        }
    }

    #[test]
    fn test_total_is_sum_of_means() {
        let response = GetCostForecastResponse {
            total: Some(MetricValue {
                amount: Some(dec!(33.335)),
                unit: Some("USD".into()),
            }),
            forecast_results_by_time: vec![
                point("2024-01-01", Some(dec!(10.111)), Some(dec!(9)), Some(dec!(11))),
                point("2024-01-02", Some(dec!(11.112)), Some(dec!(10)), Some(dec!(12))),
                point("2024-01-03", Some(dec!(12.112)), Some(dec!(11)), Some(dec!(13))),
            ],
        };

        let forecast = reshape_forecast(response, 3, "USD");
        assert_eq!(forecast.total_forecast, dec!(33.335));
        assert_eq!(forecast.forecast_data.len(), 3);
        assert_eq!(forecast.forecast_days, 3);
    }

    #[test]
    fn test_missing_bounds_fall_back_to_mean() {
        let response = GetCostForecastResponse {
            total: None,
            forecast_results_by_time: vec![
                point("2024-01-01", Some(dec!(7.5)), None, None),
                point("2024-01-02", None, Some(dec!(1)), Some(dec!(2))),
            ],
        };

        let forecast = reshape_forecast(response, 2, "EUR");
        assert_eq!(forecast.forecast_data.len(), 1);
        assert_eq!(forecast.forecast_data[0].prediction_interval_lower, dec!(7.5));
        assert_eq!(forecast.forecast_data[0].prediction_interval_upper, dec!(7.5));
        assert_eq!(forecast.currency, "EUR");
    }

    #[test]
    fn test_request_window_starts_today() {
        let today = NaiveDate::from_ymd_opt(2024, 12, 20).unwrap();
        let request = forecast_request(30, today);
        assert_eq!(request.time_period.start, "2024-12-20");
        assert_eq!(request.time_period.end, "2025-01-19");
        assert_eq!(request.metric, "BLENDED_COST");
        assert_eq!(request.granularity, "DAILY");
    }

    #[test]
    fn test_serialized_shape() {
        let response = GetCostForecastResponse {
            total: Some(MetricValue {
                amount: Some(dec!(4)),
                unit: Some("USD".into()),
            }),
            forecast_results_by_time: vec![point(
                "2024-01-01",
                Some(dec!(4)),
                Some(dec!(3.5)),
                Some(dec!(4.5)),
            )],
        };

        let json = serde_json::to_value(reshape_forecast(response, 1, "USD")).unwrap();
        assert_eq!(
            json,
            json!({
                "forecast_data": [{
                    "date": "2024-01-01",
                    "mean_value": 4.0,
                    "prediction_interval_lower": 3.5,
                    "prediction_interval_upper": 4.5
                }],
                "total_forecast": 4.0,
                "currency": "USD",
                "forecast_days": 1
            })
        );
    }

    #[test]
    fn test_query_bounds() {
        assert!(ForecastQuery { days: 1 }.validate().is_ok());
        assert!(ForecastQuery { days: 365 }.validate().is_ok());
        assert!(ForecastQuery { days: 0 }.validate().is_err());
        assert!(ForecastQuery { days: 400 }.validate().is_err());
    }
}
