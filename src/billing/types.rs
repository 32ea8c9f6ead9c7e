//! Cost Explorer JSON 1.1 wire types.
//!
//! Field names follow the service's PascalCase shapes. Only the members the
//! cost endpoints read are modelled; everything else is ignored on decode.

use std::{collections::HashMap, str::FromStr};

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

/// Metric charted by the cost endpoints.
pub const BLENDED_COST: &str = "BlendedCost";

/// Metrics requested from `GetCostAndUsage`.
pub const COST_AND_USAGE_METRICS: [&str; 3] = [BLENDED_COST, "UnblendedCost", "UsageQuantity"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DateInterval {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GroupDefinition {
    #[serde(rename = "Type")]
    pub kind: String,
    pub key: String,
}

impl GroupDefinition {
    pub fn dimension(key: impl Into<String>) -> Self {
        Self {
            kind: "DIMENSION".to_string(),
            key: key.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetCostAndUsageRequest {
    pub time_period: DateInterval,
    pub granularity: String,
    pub metrics: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub group_by: Vec<GroupDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetCostAndUsageResponse {
    #[serde(default)]
    pub results_by_time: Vec<ResultByTime>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// One time bucket of cost data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResultByTime {
    pub time_period: DateInterval,
    #[serde(default)]
    pub total: HashMap<String, MetricValue>,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub estimated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Group {
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub metrics: HashMap<String, MetricValue>,
}

/// An amount with its unit. Amounts arrive as decimal strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetricValue {
    #[serde(default, deserialize_with = "deserialize_amount")]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetCostForecastRequest {
    pub time_period: DateInterval,
    pub metric: String,
    pub granularity: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetCostForecastResponse {
    #[serde(default)]
    pub total: Option<MetricValue>,
    #[serde(default)]
    pub forecast_results_by_time: Vec<ForecastResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ForecastResult {
    pub time_period: DateInterval,
    #[serde(default, deserialize_with = "deserialize_amount")]
    pub mean_value: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_amount")]
    pub prediction_interval_lower_bound: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_amount")]
    pub prediction_interval_upper_bound: Option<Decimal>,
}

/// Accepts plain decimal strings ("12.5"), scientific notation ("1.2E-7")
/// and bare JSON numbers.
fn deserialize_amount<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(f64),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Text(text)) => {
            let text = text.trim();
            Decimal::from_str(text)
                .or_else(|_| Decimal::from_scientific(text))
                .map(Some)
                .map_err(|e| serde::de::Error::custom(format!("invalid amount '{text}': {e}")))
        }
        Some(Raw::Number(n)) => Decimal::try_from(n)
            .map(Some)
            .map_err(|e| serde::de::Error::custom(format!("invalid amount {n}: {e}"))),
    }
}
