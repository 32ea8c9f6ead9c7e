//! Billing backends.
//!
//! The cost endpoints talk to a [`BillingClient`], which returns raw
//! Cost Explorer shapes. Two implementations exist:
//! - [`CostExplorerClient`]: the real service over JSON 1.1 with SigV4
//! - [`StaticBillingClient`]: generated data for local development

mod aws;
mod cost_explorer;
pub mod types;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
pub use aws::{AwsCredentialCache, AwsError, AwsRequestSigner, sign_request};
pub use cost_explorer::CostExplorerClient;
pub use test::StaticBillingClient;
use types::{GetCostAndUsageRequest, GetCostForecastRequest, GetCostForecastResponse, ResultByTime};

use crate::config::BillingConfig;

/// Error codes Cost Explorer returns when the caller's credentials are
/// missing, malformed or expired.
const CREDENTIAL_ERROR_CODES: &[&str] = &[
    "UnrecognizedClientException",
    "InvalidClientTokenId",
    "InvalidSignatureException",
    "IncompleteSignatureException",
    "MissingAuthenticationTokenException",
    "ExpiredTokenException",
];

/// Errors from a billing backend.
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    /// No usable credentials could be resolved.
    #[error("AWS credentials not available: {0}")]
    Credentials(String),

    #[error("Failed to sign request: {0}")]
    Signing(String),

    /// The service answered with an error document.
    #[error("{code}: {message}")]
    Upstream {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Request to billing API failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Failed to decode billing API response: {0}")]
    Decode(String),
}

impl BillingError {
    /// True when the caller cannot be served until credentials are fixed.
    pub fn is_credentials(&self) -> bool {
        match self {
            BillingError::Credentials(_) => true,
            BillingError::Upstream { code, .. } => CREDENTIAL_ERROR_CODES.contains(&code.as_str()),
            _ => false,
        }
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        if self.is_credentials() {
            return "credentials";
        }
        match self {
            BillingError::Credentials(_) => "credentials",
            BillingError::Signing(_) => "signing",
            BillingError::Upstream { .. } => "upstream",
            BillingError::Request(e) if e.is_timeout() => "timeout",
            BillingError::Request(_) => "request",
            BillingError::Decode(_) => "decode",
        }
    }
}

impl From<AwsError> for BillingError {
    fn from(err: AwsError) -> Self {
        if err.is_credentials() {
            BillingError::Credentials(err.to_string())
        } else {
            BillingError::Signing(err.to_string())
        }
    }
}

/// Source of cost-and-usage and forecast data.
#[async_trait]
pub trait BillingClient: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &'static str;

    /// Fetch every result bucket for the query, following pagination.
    async fn get_cost_and_usage(
        &self,
        request: GetCostAndUsageRequest,
    ) -> Result<Vec<ResultByTime>, BillingError>;

    async fn get_cost_forecast(
        &self,
        request: GetCostForecastRequest,
    ) -> Result<GetCostForecastResponse, BillingError>;
}

/// Build the configured billing backend.
pub fn from_config(config: &BillingConfig) -> Result<Arc<dyn BillingClient>, BillingError> {
    match config {
        BillingConfig::CostExplorer(ce) => {
            let http = reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .user_agent(concat!("costscope/", env!("CARGO_PKG_VERSION")))
                .build()?;
            tracing::info!(
                endpoint = %ce.endpoint_url(),
                region = %ce.region,
                credentials = ?ce.credentials,
                "Using AWS Cost Explorer billing backend"
            );
            Ok(Arc::new(CostExplorerClient::new(ce, http)))
        }
        BillingConfig::Test(test) => {
            tracing::warn!("Using static test billing backend; costs are generated, not real");
            Ok(Arc::new(StaticBillingClient::new(test.clone())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_codes_classified() {
        let err = BillingError::Upstream {
            status: 400,
            code: "UnrecognizedClientException".into(),
            message: "The security token included in the request is invalid.".into(),
        };
        assert!(err.is_credentials());
        assert_eq!(err.kind(), "credentials");

        let err = BillingError::Upstream {
            status: 400,
            code: "DataUnavailableException".into(),
            message: "Data is not available.".into(),
        };
        assert!(!err.is_credentials());
        assert_eq!(err.kind(), "upstream");
    }

    #[test]
    fn test_aws_error_conversion() {
        let err: BillingError = AwsError::NoCredentialsProvider.into();
        assert!(matches!(err, BillingError::Credentials(_)));

        let err: BillingError = AwsError::SigningFailed("bad".into()).into();
        assert!(matches!(err, BillingError::Signing(_)));
    }

    #[test]
    fn test_upstream_display() {
        let err = BillingError::Upstream {
            status: 400,
            code: "ValidationException".into(),
            message: "Start date is after end date".into(),
        };
        assert_eq!(err.to_string(), "ValidationException: Start date is after end date");
    }
}
