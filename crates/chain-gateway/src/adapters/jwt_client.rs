//! HTTP client for the token verification service.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;

use crate::domain::config::AuthConfig;
use crate::ports::outbound::{AuthError, Verifier, VerifyRequest, VerifyResponse};

/// Token verification client posting to `<url>/verify`.
///
/// One attempt per token, bounded by the configured timeout.
pub struct JwtClient {
    client: Client,
    verify_url: String,
}

impl JwtClient {
    /// Create a client for the service at `base_url`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            verify_url: format!("{}/verify", base_url.trim_end_matches('/')),
        })
    }

    /// Client for the configured service, if one is configured.
    pub fn from_config(config: &AuthConfig) -> Result<Option<Self>, AuthError> {
        config
            .url
            .as_deref()
            .map(|url| Self::new(url, config.timeout))
            .transpose()
    }

    pub fn verify_url(&self) -> &str {
        &self.verify_url
    }
}

#[async_trait]
impl Verifier for JwtClient {
    async fn verify(&self, request: &VerifyRequest, token: &str) -> Result<VerifyResponse, AuthError> {
        let response = self
            .client
            .post(&self.verify_url)
            .header("Accept", "application/json")
            .header("X-Forwarded-For", &request.host)
            .header("X-Real-Ip", &request.host)
            .header("spanId", &request.span_id)
            .header("preHost", &request.pre_host)
            .header("svcName", &request.service_name)
            .header("Origin", &request.host)
            .form(&[("token", token)])
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        if status != StatusCode::OK {
            debug!(status = status.as_u16(), "Token rejected");
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| AuthError::Transport(e.to_string()))
    }
}
