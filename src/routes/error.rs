use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use validator::ValidationErrors;

use crate::{
    billing::BillingError,
    costs::{AggregateError, QueryError},
};

/// Error body returned by every endpoint.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct ErrorResponse {
    /// Human-readable description of what went wrong.
    #[cfg_attr(feature = "utoipa", schema(example = "Start date must be before end date"))]
    pub detail: String,
}

#[derive(Debug)]
pub enum ApiError {
    /// Caller input failed validation.
    BadRequest(String),
    /// The billing backend cannot be reached with the configured credentials.
    CredentialsUnavailable(String),
    /// The billing backend rejected or failed the call.
    Upstream(String),
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::CredentialsUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Upstream(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn detail(&self) -> String {
        match self {
            ApiError::BadRequest(msg) => msg.clone(),
            ApiError::CredentialsUnavailable(msg) => {
                format!("AWS credentials not configured: {msg}")
            }
            ApiError::Upstream(msg) => format!("AWS API Error: {msg}"),
            ApiError::Internal(msg) => format!("Internal error: {msg}"),
        }
    }
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errs: ValidationErrors) -> Self {
        let mut messages: Vec<String> = errs
            .field_errors()
            .into_iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |e| match &e.message {
                    Some(msg) => msg.to_string(),
                    None => format!("{field} is invalid"),
                })
            })
            .collect();
        // field_errors() is map-ordered; keep output deterministic
        messages.sort();
        ApiError::BadRequest(messages.join("; "))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        if err.is_credentials() {
            let msg = match err {
                BillingError::Credentials(msg) => msg,
                other => other.to_string(),
            };
            return ApiError::CredentialsUnavailable(msg);
        }
        match err {
            BillingError::Upstream { .. } | BillingError::Request(_) | BillingError::Decode(_) => {
                ApiError::Upstream(err.to_string())
            }
            BillingError::Credentials(_) | BillingError::Signing(_) => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<AggregateError> for ApiError {
    fn from(err: AggregateError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = self.detail();

        match &self {
            ApiError::BadRequest(_) => tracing::debug!(%detail, "Rejected request"),
            ApiError::CredentialsUnavailable(_) => {
                tracing::warn!(%detail, "Billing credentials unavailable")
            }
            ApiError::Upstream(_) | ApiError::Internal(_) => {
                tracing::error!(%detail, "Request failed")
            }
        }

        (status, Json(ErrorResponse { detail })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use validator::Validate;

    use super::*;
    use crate::costs::ServicesQuery;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_query_error_is_bad_request() {
        let response = ApiError::from(QueryError::InvertedRange).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await["detail"],
            "Start date must be before end date"
        );
    }

    #[tokio::test]
    async fn test_upstream_error_is_prefixed() {
        let err = BillingError::Upstream {
            status: 400,
            code: "DataUnavailableException".into(),
            message: "Data is not available".into(),
        };
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await["detail"],
            "AWS API Error: DataUnavailableException: Data is not available"
        );
    }

    #[tokio::test]
    async fn test_credential_errors_are_unavailable() {
        let missing = BillingError::Credentials("no providers in chain".into());
        assert_eq!(
            ApiError::from(missing).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );

        let rejected = BillingError::Upstream {
            status: 403,
            code: "UnrecognizedClientException".into(),
            message: "The security token included in the request is invalid.".into(),
        };
        let response = ApiError::from(rejected).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let detail = body_json(response).await["detail"].as_str().unwrap().to_string();
        assert!(detail.starts_with("AWS credentials not configured"));
    }

    #[test]
    fn test_signing_and_currency_errors_are_internal() {
        let signing = ApiError::from(BillingError::Signing("bad header".into()));
        assert_eq!(signing.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(signing.detail().starts_with("Internal error: "));

        let mixed = ApiError::from(AggregateError::MixedCurrency {
            first: "USD".into(),
            second: "EUR".into(),
        });
        assert!(mixed.detail().contains("USD"));
        assert!(mixed.detail().contains("EUR"));
    }

    #[test]
    fn test_validation_errors_join_messages() {
        let errs = ServicesQuery { days: 0, limit: 500 }.validate().unwrap_err();
        let err = ApiError::from(errs);
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            err.detail(),
            "days must be between 1 and 365; limit must be between 1 and 100"
        );
    }
}
