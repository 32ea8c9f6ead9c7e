//! Top services by blended cost over a trailing window.

use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{aggregate::UNKNOWN_GROUP, round_money};
use crate::billing::types::{
    BLENDED_COST, DateInterval, GetCostAndUsageRequest, GroupDefinition, ResultByTime,
};

/// Query string of `GET /costs/services`.
#[derive(Debug, Clone, Deserialize, Validate)]
#[cfg_attr(feature = "utoipa", derive(utoipa::IntoParams))]
#[cfg_attr(feature = "utoipa", into_params(parameter_in = Query))]
pub struct ServicesQuery {
    /// Number of days to look back (1-365).
    #[serde(default = "default_days")]
    #[validate(range(min = 1, max = 365, message = "days must be between 1 and 365"))]
    pub days: u32,

    /// Number of top services to return (1-100).
    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 100, message = "limit must be between 1 and 100"))]
    pub limit: u32,
}

fn default_days() -> u32 {
    30
}

fn default_limit() -> u32 {
    10
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct ServiceCost {
    pub service: String,
    /// Total over the window, rounded to cents.
    #[serde(with = "rust_decimal::serde::float")]
    #[cfg_attr(feature = "utoipa", schema(value_type = f64))]
    pub cost: Decimal,
}

/// Response body of `GET /costs/services`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct TopServices {
    pub top_services: Vec<ServiceCost>,
    /// Number of distinct services with cost data in the window.
    pub total_services: usize,
    pub period_days: u32,
}

/// Monthly per-service query for the `days` before `today`.
pub fn services_request(days: u32, today: NaiveDate) -> GetCostAndUsageRequest {
    let start = today
        .checked_sub_days(Days::new(u64::from(days)))
        .unwrap_or(NaiveDate::MIN);

    GetCostAndUsageRequest {
        time_period: DateInterval {
            start: start.format("%Y-%m-%d").to_string(),
            end: today.format("%Y-%m-%d").to_string(),
        },
        granularity: "MONTHLY".to_string(),
        metrics: vec![BLENDED_COST.to_string()],
        group_by: vec![GroupDefinition::dimension("SERVICE")],
        next_page_token: None,
    }
}

/// Sum each service over all buckets and keep the `limit` most expensive.
///
/// Ties keep the order in which services first appeared.
pub fn top_services(results: &[ResultByTime], limit: usize, days: u32) -> TopServices {
    let mut totals: Vec<(String, Decimal)> = Vec::new();

    for bucket in results {
        for group in &bucket.groups {
            let Some(amount) = group.metrics.get(BLENDED_COST).and_then(|m| m.amount) else {
                continue;
            };
            let service = group.keys.first().map(String::as_str).unwrap_or(UNKNOWN_GROUP);
            match totals.iter_mut().find(|(name, _)| name == service) {
                Some((_, total)) => *total += amount,
                None => totals.push((service.to_string(), amount)),
            }
        }
    }

    let total_services = totals.len();
    // Stable, so equal totals stay in first-seen order
    totals.sort_by(|a, b| b.1.cmp(&a.1));
    totals.truncate(limit);

    TopServices {
        top_services: totals
            .into_iter()
            .map(|(service, cost)| ServiceCost {
                service,
                cost: round_money(cost),
            })
            .collect(),
        total_services,
        period_days: days,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rstest::rstest;
    use rust_decimal::dec;

    use super::*;
    use crate::billing::types::{Group, MetricValue};

    fn month(start: &str, groups: &[(&str, Decimal)]) -> ResultByTime {
        ResultByTime {
            time_period: DateInterval {
                start: start.into(),
                end: start.into(),
            },
            total: HashMap::new(),
            groups: groups
                .iter()
                .map(|(service, amount)| Group {
                    keys: vec![service.to_string()],
                    metrics: [(
                        BLENDED_COST.to_string(),
                        MetricValue {
                            amount: Some(*amount),
                            unit: Some("USD".into()),
                        },
                    )]
                    .into(),
                })
                .collect(),
            estimated: false,
        }
    }

    fn results() -> Vec<ResultByTime> {
        vec![
            month(
                "2024-01-01",
                &[("EC2", dec!(100.004)), ("S3", dec!(20)), ("Lambda", dec!(5))],
            ),
            month(
                "2024-02-01",
                &[("S3", dec!(90)), ("CloudFront", dec!(5)), ("EC2", dec!(1))],
            ),
        ]
    }

    #[test]
    fn test_sums_across_buckets_and_sorts() {
        let top = top_services(&results(), 10, 30);

        let names: Vec<_> = top.top_services.iter().map(|s| s.service.as_str()).collect();
        assert_eq!(names, ["S3", "EC2", "Lambda", "CloudFront"]);
        assert_eq!(top.top_services[0].cost, dec!(110));
        assert_eq!(top.top_services[1].cost, dec!(101.00));
        assert_eq!(top.total_services, 4);
        assert_eq!(top.period_days, 30);
    }

    #[rstest]
    #[case(1, 1)]
    #[case(2, 2)]
    #[case(4, 4)]
    #[case(100, 4)]
    fn test_limit_truncates(#[case] limit: usize, #[case] expected: usize) {
        let top = top_services(&results(), limit, 30);
        assert_eq!(top.top_services.len(), expected);
        assert_eq!(top.total_services, 4);
        assert!(top.top_services.windows(2).all(|w| w[0].cost >= w[1].cost));
    }

    #[test]
    fn test_ties_keep_first_seen_order() {
        let top = top_services(&results(), 10, 30);
        // Lambda and CloudFront both total 5; Lambda appeared first
        assert_eq!(top.top_services[2].service, "Lambda");
        assert_eq!(top.top_services[3].service, "CloudFront");
    }

    #[test]
    fn test_request_window() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        let request = services_request(30, today);

        assert_eq!(request.time_period.start, "2024-03-01");
        assert_eq!(request.time_period.end, "2024-03-31");
        assert_eq!(request.granularity, "MONTHLY");
        assert_eq!(request.metrics, [BLENDED_COST]);
        assert_eq!(request.group_by, [GroupDefinition::dimension("SERVICE")]);
    }

    #[rstest]
    #[case(30, 10, true)]
    #[case(1, 1, true)]
    #[case(365, 100, true)]
    #[case(0, 10, false)]
    #[case(366, 10, false)]
    #[case(30, 0, false)]
    #[case(30, 101, false)]
    fn test_query_bounds(#[case] days: u32, #[case] limit: u32, #[case] valid: bool) {
        assert_eq!(ServicesQuery { days, limit }.validate().is_ok(), valid);
    }
}
