use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Billing backend configuration.
///
/// ```toml
/// [billing]
/// type = "cost_explorer"
/// region = "us-east-1"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BillingConfig {
    /// AWS Cost Explorer over its JSON 1.1 API, signed with SigV4.
    CostExplorer(CostExplorerConfig),

    /// Deterministic in-process data for local development and demos.
    Test(TestBillingConfig),
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self::CostExplorer(CostExplorerConfig::default())
    }
}

impl BillingConfig {
    /// Currency reported when a response carries no unit of its own.
    pub fn default_currency(&self) -> &str {
        match self {
            Self::CostExplorer(c) => &c.default_currency,
            Self::Test(c) => &c.currency,
        }
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::CostExplorer(c) => c.validate(),
            Self::Test(_) => Ok(()),
        }
    }
}

/// AWS Cost Explorer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct CostExplorerConfig {
    /// Region used for the endpoint and for SigV4 signing. Cost Explorer is
    /// served from `us-east-1` for the commercial partition.
    #[serde(default = "default_region")]
    pub region: String,

    /// Endpoint override (VPC endpoints, LocalStack, tests).
    /// Defaults to `https://ce.<region>.amazonaws.com`.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Credential source.
    #[serde(default)]
    pub credentials: AwsCredentials,

    /// Timeout for each Cost Explorer call, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Currency reported when a response carries no unit (e.g. empty results).
    #[serde(default = "default_currency")]
    pub default_currency: String,
}

impl Default for CostExplorerConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            endpoint: None,
            credentials: AwsCredentials::default(),
            timeout_secs: default_timeout(),
            default_currency: default_currency(),
        }
    }
}

impl CostExplorerConfig {
    /// Base URL requests are posted to, without a trailing slash.
    pub fn endpoint_url(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://ce.{}.amazonaws.com", self.region),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.region.trim().is_empty() {
            return Err(ConfigError::Validation(
                "billing.region must not be empty".into(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "billing.timeout_secs must be greater than zero".into(),
            ));
        }
        if let AwsCredentials::Static {
            access_key_id,
            secret_access_key,
            ..
        } = &self.credentials
            && (access_key_id.is_empty() || secret_access_key.is_empty())
        {
            return Err(ConfigError::Validation(
                "static AWS credentials require access_key_id and secret_access_key".into(),
            ));
        }
        Ok(())
    }
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_timeout() -> u64 {
    60
}

fn default_currency() -> String {
    "USD".to_string()
}

/// AWS credential configuration.
#[derive(Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(tag = "type", rename_all = "snake_case")]
#[serde(deny_unknown_fields)]
pub enum AwsCredentials {
    /// Use the default credential chain (env, shared config, IMDS, etc.)
    #[default]
    Default,

    /// Use static credentials.
    Static {
        access_key_id: String,
        secret_access_key: String,
        #[serde(default)]
        session_token: Option<String>,
    },

    /// Use a named profile from the shared AWS config files.
    Profile { name: String },
}

impl std::fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AwsCredentials::Default => write!(f, "Default"),
            AwsCredentials::Static { .. } => f
                .debug_struct("Static")
                .field("access_key_id", &"****")
                .field("secret_access_key", &"****")
                .field("session_token", &"****")
                .finish(),
            AwsCredentials::Profile { name } => {
                f.debug_struct("Profile").field("name", name).finish()
            }
        }
    }
}

/// Settings for the in-process test backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct TestBillingConfig {
    /// Currency unit attached to generated amounts.
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Services the generated data is spread across.
    #[serde(default = "default_test_services")]
    pub services: Vec<String>,
}

impl Default for TestBillingConfig {
    fn default() -> Self {
        Self {
            currency: default_currency(),
            services: default_test_services(),
        }
    }
}

fn default_test_services() -> Vec<String> {
    [
        "Amazon Elastic Compute Cloud - Compute",
        "Amazon Simple Storage Service",
        "Amazon Relational Database Service",
        "AWS Lambda",
        "Amazon CloudFront",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
