use serde::{Deserialize, Serialize};

/// Bundled dashboard configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct DashboardConfig {
    /// Serve the dashboard at `/dashboard`.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Page title and heading.
    #[serde(default = "default_title")]
    pub title: String,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            title: default_title(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_title() -> String {
    "AWS Cost Analysis Dashboard".to_string()
}
