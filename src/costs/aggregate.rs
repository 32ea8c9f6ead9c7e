//! Reshapes Cost Explorer buckets into cost records and Chart.js series.

use rust_decimal::Decimal;
use serde::Serialize;

use super::{round_money, serialize_amounts};
use crate::billing::types::{BLENDED_COST, MetricValue, ResultByTime};

/// Label for records without a group key.
pub const UNKNOWN_GROUP: &str = "Unknown";

/// Series colors, assigned by index and cycled.
const PALETTE: [(u8, u8, u8); 6] = [
    (255, 99, 132),
    (54, 162, 235),
    (255, 205, 86),
    (75, 192, 192),
    (153, 102, 255),
    (255, 159, 64),
];

/// Color of the single ungrouped series.
const COST_SERIES_COLOR: (u8, u8, u8) = (75, 192, 192);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AggregateError {
    #[error("Cost data mixes currencies: {first} and {second}")]
    MixedCurrency { first: String, second: String },
}

/// One cost entry for one period (and group, if grouped).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct CostRecord {
    pub period_start: String,
    pub period_end: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(with = "rust_decimal::serde::float")]
    #[cfg_attr(feature = "utoipa", schema(value_type = f64))]
    pub cost: Decimal,
    pub currency: String,
}

/// Chart.js-compatible payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct ChartData {
    pub labels: Vec<String>,
    pub datasets: Vec<ChartDataset>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct ChartDataset {
    pub label: String,
    #[serde(serialize_with = "serialize_amounts")]
    #[cfg_attr(feature = "utoipa", schema(value_type = Vec<f64>))]
    pub data: Vec<Decimal>,
    pub border_color: String,
    pub background_color: String,
}

impl ChartDataset {
    fn new(label: impl Into<String>, data: Vec<Decimal>, (r, g, b): (u8, u8, u8)) -> Self {
        Self {
            label: label.into(),
            data,
            border_color: format!("rgb({r}, {g}, {b})"),
            background_color: format!("rgba({r}, {g}, {b}, 0.2)"),
        }
    }
}

/// Response body of `POST /costs/analyze`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct CostAnalysis {
    /// Sum of all record costs, rounded to cents.
    #[serde(with = "rust_decimal::serde::float")]
    #[cfg_attr(feature = "utoipa", schema(value_type = f64))]
    pub total_cost: Decimal,
    pub currency: String,
    pub data: Vec<CostRecord>,
    pub chart_data: ChartData,
}

/// Flatten result buckets into records and build the chart payload.
pub fn aggregate(
    results: &[ResultByTime],
    grouped: bool,
    default_currency: &str,
) -> Result<CostAnalysis, AggregateError> {
    let records = collect_records(results, default_currency);

    let mut currency: Option<&str> = None;
    for record in &records {
        match currency {
            None => currency = Some(record.currency.as_str()),
            Some(seen) if seen != record.currency => {
                return Err(AggregateError::MixedCurrency {
                    first: seen.to_string(),
                    second: record.currency.clone(),
                });
            }
            Some(_) => {}
        }
    }
    let currency = currency.unwrap_or(default_currency).to_string();

    let total: Decimal = records.iter().map(|r| r.cost).sum();
    let chart_data = if grouped {
        grouped_chart(&records)
    } else {
        single_series_chart(&records)
    };

    Ok(CostAnalysis {
        total_cost: round_money(total),
        currency,
        data: records,
        chart_data,
    })
}

fn collect_records(results: &[ResultByTime], default_currency: &str) -> Vec<CostRecord> {
    let mut records = Vec::new();

    for bucket in results {
        let period_start = &bucket.time_period.start;
        let period_end = &bucket.time_period.end;

        if !bucket.groups.is_empty() {
            for group in &bucket.groups {
                let Some((cost, currency)) = blended_cost(&group.metrics, default_currency) else {
                    tracing::debug!(
                        period_start = %period_start,
                        keys = ?group.keys,
                        "Group has no BlendedCost, skipping"
                    );
                    continue;
                };
                let label = group
                    .keys
                    .first()
                    .cloned()
                    .unwrap_or_else(|| UNKNOWN_GROUP.to_string());
                records.push(CostRecord {
                    period_start: period_start.clone(),
                    period_end: period_end.clone(),
                    group: Some(label),
                    cost,
                    currency,
                });
            }
        } else if let Some((cost, currency)) = blended_cost(&bucket.total, default_currency) {
            records.push(CostRecord {
                period_start: period_start.clone(),
                period_end: period_end.clone(),
                group: None,
                cost,
                currency,
            });
        }
    }

    records
}

fn blended_cost(
    metrics: &std::collections::HashMap<String, MetricValue>,
    default_currency: &str,
) -> Option<(Decimal, String)> {
    let metric = metrics.get(BLENDED_COST)?;
    let amount = metric.amount?;
    let unit = metric
        .unit
        .clone()
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| default_currency.to_string());
    Some((amount, unit))
}

/// One "Cost" series with a point per period.
fn single_series_chart(records: &[CostRecord]) -> ChartData {
    let mut labels: Vec<String> = Vec::new();
    let mut data: Vec<Decimal> = Vec::new();

    for record in records {
        if labels.last() == Some(&record.period_start) {
            if let Some(last) = data.last_mut() {
                *last += record.cost;
            }
        } else {
            labels.push(record.period_start.clone());
            data.push(record.cost);
        }
    }

    ChartData {
        labels,
        datasets: vec![ChartDataset::new("Cost", data, COST_SERIES_COLOR)],
    }
}

/// One series per group in first-seen order, aligned to the distinct
/// period starts with zero where a group has no entry.
fn grouped_chart(records: &[CostRecord]) -> ChartData {
    let mut labels: Vec<String> = Vec::new();
    let mut groups: Vec<(String, Vec<Decimal>)> = Vec::new();

    for record in records {
        let period = match labels.iter().position(|l| *l == record.period_start) {
            Some(index) => index,
            None => {
                labels.push(record.period_start.clone());
                for (_, series) in groups.iter_mut() {
                    series.push(Decimal::ZERO);
                }
                labels.len() - 1
            }
        };

        let label = record.group.as_deref().unwrap_or(UNKNOWN_GROUP);
        let series = match groups.iter().position(|(name, _)| name == label) {
            Some(index) => &mut groups[index].1,
            None => {
                groups.push((label.to_string(), vec![Decimal::ZERO; labels.len()]));
                let last = groups.len() - 1;
                &mut groups[last].1
            }
        };
        series[period] += record.cost;
    }

    let datasets = groups
        .into_iter()
        .enumerate()
        .map(|(index, (label, data))| {
            ChartDataset::new(label, data, PALETTE[index % PALETTE.len()])
        })
        .collect();

    ChartData { labels, datasets }
}
