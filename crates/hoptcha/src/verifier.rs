//! Remote CAPTCHA token verification.
//!
//! One best-effort POST per token: no retries, and every failure collapses
//! to "not verified".

use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;

use hoptcha_common::constants::VERIFY_TIMEOUT_SECS;
use hoptcha_common::{HoptchaError, VerifyRequest, VerifyResponse};

use crate::settings::Settings;

/// Decides whether a CAPTCHA token is valid
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> bool;
}

/// Verifier calling the provider's validation endpoint
pub struct RemoteVerifier {
    client: reqwest::Client,
    verify_url: String,
    client_key: String,
    client_secret: String,
}

impl RemoteVerifier {
    pub fn new(settings: &Settings) -> Result<Self, HoptchaError> {
        Self::with_timeout(settings, Duration::from_secs(VERIFY_TIMEOUT_SECS))
    }

    pub fn with_timeout(settings: &Settings, timeout: Duration) -> Result<Self, HoptchaError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HoptchaError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            verify_url: settings.verify_url.clone(),
            client_key: settings.client_id.clone(),
            client_secret: settings.client_secret.clone(),
        })
    }

    /// Verify, keeping the reason for a failure
    pub async fn try_verify(&self, token: &str) -> Result<bool, HoptchaError> {
        let payload = VerifyRequest {
            token: token.to_string(),
            client_key: self.client_key.clone(),
            client_secret: self.client_secret.clone(),
        };

        let response = self
            .client
            .post(&self.verify_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| HoptchaError::Verifier(format!("Request failed: {e}")))?;

        if response.status() != StatusCode::OK {
            return Err(HoptchaError::Verifier(format!(
                "Unexpected status {}",
                response.status()
            )));
        }

        let body: VerifyResponse = response
            .json()
            .await
            .map_err(|e| HoptchaError::Verifier(format!("Malformed response: {e}")))?;

        Ok(body.success)
    }
}

#[async_trait]
impl TokenVerifier for RemoteVerifier {
    async fn verify(&self, token: &str) -> bool {
        match self.try_verify(token).await {
            Ok(success) => {
                tracing::debug!(success, "CAPTCHA token checked");
                success
            }
            Err(e) => {
                tracing::warn!(error = %e, url = %self.verify_url, "CAPTCHA verification failed");
                false
            }
        }
    }
}
