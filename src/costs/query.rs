//! Cost query parsing and validation.

use std::{fmt, str::FromStr};

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::billing::types::{
    COST_AND_USAGE_METRICS, DateInterval, GetCostAndUsageRequest, GroupDefinition,
};

/// Errors for caller-supplied query input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("Invalid {field}: '{value}' is not a date (expected YYYY-MM-DD or an ISO 8601 date-time)")]
    InvalidDate { field: &'static str, value: String },

    #[error("Start date must be before end date")]
    InvertedRange,

    #[error("Invalid granularity '{0}': expected DAILY, MONTHLY or HOURLY")]
    UnknownGranularity(String),
}

/// Time-bucketing interval for cost data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Granularity {
    #[default]
    Daily,
    Monthly,
    Hourly,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Daily => "DAILY",
            Granularity::Monthly => "MONTHLY",
            Granularity::Hourly => "HOURLY",
        }
    }

    /// Render an instant the way Cost Explorer expects for this granularity.
    fn format(&self, at: NaiveDateTime) -> String {
        match self {
            Granularity::Hourly => at.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            Granularity::Daily | Granularity::Monthly => at.format("%Y-%m-%d").to_string(),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DAILY" => Ok(Granularity::Daily),
            "MONTHLY" => Ok(Granularity::Monthly),
            "HOURLY" => Ok(Granularity::Hourly),
            _ => Err(QueryError::UnknownGranularity(s.to_string())),
        }
    }
}

/// Body of `POST /costs/analyze`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct CostAnalysisRequest {
    /// Inclusive start, `YYYY-MM-DD` or ISO 8601 date-time.
    #[cfg_attr(feature = "utoipa", schema(example = "2024-01-01"))]
    pub start_date: String,
    /// Exclusive end, `YYYY-MM-DD` or ISO 8601 date-time.
    #[cfg_attr(feature = "utoipa", schema(example = "2024-01-31"))]
    pub end_date: String,
    /// DAILY (default), MONTHLY or HOURLY. Case-insensitive.
    #[serde(default)]
    pub granularity: Option<String>,
    /// Dimension to group by, e.g. SERVICE, REGION, USAGE_TYPE.
    #[serde(default)]
    pub group_by: Option<String>,
}

/// A validated cost query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CostQuery {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub granularity: Granularity,
    pub group_by: Option<String>,
}

impl CostQuery {
    pub fn new(
        start: NaiveDateTime,
        end: NaiveDateTime,
        granularity: Granularity,
        group_by: Option<String>,
    ) -> Result<Self, QueryError> {
        let inverted = match granularity {
            Granularity::Hourly => start >= end,
            // Only the calendar date is sent for these
            Granularity::Daily | Granularity::Monthly => start.date() >= end.date(),
        };
        if inverted {
            return Err(QueryError::InvertedRange);
        }

        let group_by = group_by
            .map(|g| g.trim().to_string())
            .filter(|g| !g.is_empty());

        Ok(Self {
            start,
            end,
            granularity,
            group_by,
        })
    }

    /// Build the Cost Explorer request for this query.
    pub fn to_request(&self) -> GetCostAndUsageRequest {
        GetCostAndUsageRequest {
            time_period: DateInterval {
                start: self.granularity.format(self.start),
                end: self.granularity.format(self.end),
            },
            granularity: self.granularity.as_str().to_string(),
            metrics: COST_AND_USAGE_METRICS.iter().map(|m| m.to_string()).collect(),
            group_by: self
                .group_by
                .iter()
                .map(GroupDefinition::dimension)
                .collect(),
            next_page_token: None,
        }
    }

    pub fn is_grouped(&self) -> bool {
        self.group_by.is_some()
    }
}

impl TryFrom<CostAnalysisRequest> for CostQuery {
    type Error = QueryError;

    fn try_from(request: CostAnalysisRequest) -> Result<Self, Self::Error> {
        let start = parse_date("start_date", &request.start_date)?;
        let end = parse_date("end_date", &request.end_date)?;
        let granularity = match request.granularity.as_deref().map(str::trim) {
            None | Some("") => Granularity::default(),
            Some(raw) => raw.parse()?,
        };
        Self::new(start, end, granularity, request.group_by)
    }
}

/// Parse a date or ISO 8601 date-time.
///
/// A trailing `Z` or a UTC offset is accepted; the wall-clock value is kept.
pub fn parse_date(field: &'static str, raw: &str) -> Result<NaiveDateTime, QueryError> {
    let value = raw.trim();

    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.naive_local());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(dt);
        }
    }

    Err(QueryError::InvalidDate {
        field,
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn request(start: &str, end: &str) -> CostAnalysisRequest {
        CostAnalysisRequest {
            start_date: start.into(),
            end_date: end.into(),
            granularity: None,
            group_by: None,
        }
    }

    #[rstest]
    #[case("2024-01-01", "2024-01-01T00:00:00")]
    #[case("2024-01-01T10:30:00", "2024-01-01T10:30:00")]
    #[case("2024-01-01T10:30:00Z", "2024-01-01T10:30:00")]
    #[case("2024-01-01T10:30:00.250Z", "2024-01-01T10:30:00.250")]
    #[case("2024-01-01T10:30:00+05:30", "2024-01-01T10:30:00")]
    #[case("2024-01-01T10:30", "2024-01-01T10:30:00")]
    #[case(" 2024-01-01 ", "2024-01-01T00:00:00")]
    fn test_parse_date_accepts(#[case] raw: &str, #[case] expected: &str) {
        let expected = NaiveDateTime::parse_from_str(expected, "%Y-%m-%dT%H:%M:%S%.f").unwrap();
        assert_eq!(parse_date("start_date", raw).unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("yesterday")]
    #[case("2024-13-01")]
    #[case("01/02/2024")]
    fn test_parse_date_rejects(#[case] raw: &str) {
        let err = parse_date("end_date", raw).unwrap_err();
        assert!(matches!(err, QueryError::InvalidDate { field: "end_date", .. }));
    }

    #[rstest]
    #[case("daily", Granularity::Daily)]
    #[case("MONTHLY", Granularity::Monthly)]
    #[case("Hourly", Granularity::Hourly)]
    fn test_granularity_case_insensitive(#[case] raw: &str, #[case] expected: Granularity) {
        assert_eq!(raw.parse::<Granularity>().unwrap(), expected);
    }

    #[test]
    fn test_unknown_granularity() {
        let mut req = request("2024-01-01", "2024-01-03");
        req.granularity = Some("WEEKLY".into());
        assert_eq!(
            CostQuery::try_from(req).unwrap_err(),
            QueryError::UnknownGranularity("WEEKLY".into())
        );
    }

    #[rstest]
    #[case("2024-01-03", "2024-01-01")]
    #[case("2024-01-01", "2024-01-01")]
    // Same calendar day: nothing to send for DAILY
    #[case("2024-01-01T00:00:00", "2024-01-01T18:00:00")]
    fn test_inverted_range_rejected(#[case] start: &str, #[case] end: &str) {
        assert_eq!(
            CostQuery::try_from(request(start, end)).unwrap_err(),
            QueryError::InvertedRange
        );
    }

    #[test]
    fn test_hourly_compares_time_of_day() {
        let mut req = request("2024-01-01T00:00:00Z", "2024-01-01T06:00:00Z");
        req.granularity = Some("HOURLY".into());
        let query = CostQuery::try_from(req).unwrap();

        let wire = query.to_request();
        assert_eq!(wire.time_period.start, "2024-01-01T00:00:00Z");
        assert_eq!(wire.time_period.end, "2024-01-01T06:00:00Z");
        assert_eq!(wire.granularity, "HOURLY");
    }

    #[test]
    fn test_to_request_daily() {
        let query = CostQuery::try_from(request("2024-01-01T12:00:00Z", "2024-01-03")).unwrap();
        let wire = query.to_request();

        assert_eq!(wire.time_period.start, "2024-01-01");
        assert_eq!(wire.time_period.end, "2024-01-03");
        assert_eq!(wire.granularity, "DAILY");
        assert_eq!(wire.metrics, ["BlendedCost", "UnblendedCost", "UsageQuantity"]);
        assert!(wire.group_by.is_empty());
    }

    #[test]
    fn test_group_by_blank_means_ungrouped() {
        let mut req = request("2024-01-01", "2024-01-03");
        req.group_by = Some("  ".into());
        let query = CostQuery::try_from(req).unwrap();
        assert!(!query.is_grouped());

        let mut req = request("2024-01-01", "2024-01-03");
        req.group_by = Some("SERVICE".into());
        let wire = CostQuery::try_from(req).unwrap().to_request();
        assert_eq!(wire.group_by, [GroupDefinition::dimension("SERVICE")]);
    }
}
