//! Cost shaping: turns Cost Explorer results into the API's response bodies.
//!
//! Everything here is pure and request-scoped; the routes fetch data through
//! a [`BillingClient`](crate::billing::BillingClient) and hand it over.

pub mod aggregate;
pub mod forecast;
pub mod query;
pub mod services;

pub use aggregate::{AggregateError, ChartData, ChartDataset, CostAnalysis, CostRecord, aggregate};
pub use forecast::{CostForecast, ForecastPoint, ForecastQuery, forecast_request, reshape_forecast};
pub use query::{CostAnalysisRequest, CostQuery, Granularity, QueryError, parse_date};
use rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive};
use serde::{Serialize, Serializer};
pub use services::{ServiceCost, ServicesQuery, TopServices, services_request, top_services};

/// Round a money amount to cents, half away from zero.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Serialize a list of amounts as JSON numbers.
pub(crate) fn serialize_amounts<S>(values: &[Decimal], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    struct Float<'a>(&'a Decimal);

    impl Serialize for Float<'_> {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            match self.0.to_f64() {
                Some(value) => serializer.serialize_f64(value),
                None => Err(serde::ser::Error::custom(format!(
                    "amount {} cannot be represented as a number",
                    self.0
                ))),
            }
        }
    }

    serializer.collect_seq(values.iter().map(Float))
}
