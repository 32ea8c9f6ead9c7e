//! AWS credential handling and SigV4 request signing for Cost Explorer.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, SystemTime},
};

use aws_credential_types::{Credentials, provider::ProvideCredentials};
use aws_sigv4::{
    http_request::{SignableBody, SignableRequest, SigningSettings},
    sign::v4::SigningParams,
};
use tokio::sync::{Notify, RwLock};

use crate::config::AwsCredentials;

/// Refresh credentials this long before they expire.
const CREDENTIAL_REFRESH_BUFFER_SECS: u64 = 300;

/// Error type for AWS credential operations.
#[derive(Debug, thiserror::Error)]
pub enum AwsError {
    #[error("No AWS credentials provider available")]
    NoCredentialsProvider,

    #[error("Failed to load AWS credentials: {0}")]
    CredentialsFailed(String),

    #[error("Failed to sign request: {0}")]
    SigningFailed(String),
}

impl AwsError {
    /// True when the failure comes from resolving credentials rather than from signing.
    pub fn is_credentials(&self) -> bool {
        matches!(
            self,
            AwsError::NoCredentialsProvider | AwsError::CredentialsFailed(_)
        )
    }
}

/// Process-wide AWS credential cache with automatic refresh.
///
/// Only one task refreshes at a time; concurrent callers wait on the
/// notification and then re-read the cache.
#[derive(Clone)]
pub struct AwsCredentialCache {
    credentials: Arc<RwLock<Option<Credentials>>>,
    credential_source: AwsCredentials,
    refreshing: Arc<AtomicBool>,
    refresh_notify: Arc<Notify>,
}

impl AwsCredentialCache {
    pub fn new(credential_source: AwsCredentials) -> Self {
        Self {
            credentials: Arc::new(RwLock::new(None)),
            credential_source,
            refreshing: Arc::new(AtomicBool::new(false)),
            refresh_notify: Arc::new(Notify::new()),
        }
    }

    /// Get AWS credentials, refreshing if they are missing or close to expiry.
    pub async fn get_credentials(&self) -> Result<Credentials, AwsError> {
        loop {
            {
                let cache = self.credentials.read().await;
                if let Some(creds) = cache.as_ref()
                    && Self::credentials_valid(creds)
                {
                    return Ok(creds.clone());
                }
            }

            if self
                .refreshing
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                let result = self.fetch_credentials().await;

                if let Ok(credentials) = &result {
                    *self.credentials.write().await = Some(credentials.clone());
                }

                self.refreshing.store(false, Ordering::SeqCst);
                self.refresh_notify.notify_waiters();

                return result;
            }

            // Register before re-checking so a refresh finishing in between is not missed
            let notified = self.refresh_notify.notified();
            if !self.refreshing.load(Ordering::SeqCst) {
                continue;
            }
            notified.await;
        }
    }

    fn credentials_valid(creds: &Credentials) -> bool {
        match creds.expiry() {
            Some(expiry) => {
                expiry > SystemTime::now() + Duration::from_secs(CREDENTIAL_REFRESH_BUFFER_SECS)
            }
            // Static credentials never expire
            None => true,
        }
    }

    async fn fetch_credentials(&self) -> Result<Credentials, AwsError> {
        let loader = match &self.credential_source {
            AwsCredentials::Static {
                access_key_id,
                secret_access_key,
                session_token,
            } => {
                return Ok(Credentials::new(
                    access_key_id.clone(),
                    secret_access_key.clone(),
                    session_token.clone(),
                    None,
                    "static",
                ));
            }
            AwsCredentials::Default => aws_config::defaults(aws_config::BehaviorVersion::latest()),
            AwsCredentials::Profile { name } => {
                aws_config::defaults(aws_config::BehaviorVersion::latest()).profile_name(name)
            }
        };

        let config = loader.load().await;
        let provider = config
            .credentials_provider()
            .ok_or(AwsError::NoCredentialsProvider)?;

        let credentials = provider
            .provide_credentials()
            .await
            .map_err(|e| AwsError::CredentialsFailed(e.to_string()))?;

        tracing::debug!(
            expires = ?credentials.expiry(),
            "Loaded AWS credentials"
        );
        Ok(credentials)
    }
}

/// Signs an HTTP request using AWS SigV4.
///
/// Returns the (header_name, header_value) pairs to add to the request.
#[allow(clippy::too_many_arguments)]
pub fn sign_request(
    credentials: &Credentials,
    region: &str,
    service: &str,
    method: &str,
    url: &str,
    headers: &[(&str, &str)],
    body: &[u8],
    time: SystemTime,
) -> Result<Vec<(String, String)>, AwsError> {
    let identity = credentials.clone().into();

    let signing_params = SigningParams::builder()
        .identity(&identity)
        .region(region)
        .name(service)
        .time(time)
        .settings(SigningSettings::default())
        .build()
        .map_err(|e| AwsError::SigningFailed(e.to_string()))?;

    let signable_request = SignableRequest::new(
        method,
        url,
        headers.iter().copied(),
        SignableBody::Bytes(body),
    )
    .map_err(|e| AwsError::SigningFailed(e.to_string()))?;

    let (signing_instructions, _signature) =
        aws_sigv4::http_request::sign(signable_request, &signing_params.into())
            .map_err(|e| AwsError::SigningFailed(e.to_string()))?
            .into_parts();

    Ok(signing_instructions
        .headers()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect())
}

/// Credential cache bound to a region and service name.
pub struct AwsRequestSigner {
    credential_cache: AwsCredentialCache,
    region: String,
    service: String,
}

impl AwsRequestSigner {
    pub fn new(
        credential_source: AwsCredentials,
        region: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        Self {
            credential_cache: AwsCredentialCache::new(credential_source),
            region: region.into(),
            service: service.into(),
        }
    }

    pub async fn sign_request(
        &self,
        method: &str,
        url: &str,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> Result<Vec<(String, String)>, AwsError> {
        let credentials = self.credential_cache.get_credentials().await?;
        sign_request(
            &credentials,
            &self.region,
            &self.service,
            method,
            url,
            headers,
            body,
            SystemTime::now(),
        )
    }
}
