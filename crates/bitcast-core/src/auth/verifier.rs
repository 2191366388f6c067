//! Server-side verification of a signed challenge.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::error::AuthError;
use crate::feed::source::ApiEnvelope;
use crate::types::Session;

/// Body sent to the verification endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRequest {
    pub message: String,
    pub signature: String,
    pub signer_address: String,
}

/// Exchanges a signed challenge for a session.
///
/// `Ok(None)` means the server answered but issued no session.
#[async_trait]
pub trait AuthVerifier: Send + Sync {
    async fn verify(&self, request: &VerificationRequest) -> Result<Option<Session>, AuthError>;
}

/// Verifier that POSTs to the Bitcast auth endpoint.
pub struct HttpAuthVerifier {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpAuthVerifier {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::VerificationFailed(format!("HTTP client: {}", e)))?;
        Ok(Self::with_client(client, endpoint))
    }

    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl AuthVerifier for HttpAuthVerifier {
    async fn verify(&self, request: &VerificationRequest) -> Result<Option<Session>, AuthError> {
        debug!(signer = %request.signer_address, "Verifying signature");

        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| AuthError::VerificationFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::VerificationFailed(format!(
                "server returned {}",
                status
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AuthError::VerificationFailed(e.to_string()))?;
        parse_verification_response(&body)
    }
}

fn parse_verification_response(body: &str) -> Result<Option<Session>, AuthError> {
    let envelope: ApiEnvelope<Session> = serde_json::from_str(body)
        .map_err(|e| AuthError::VerificationFailed(format!("malformed response: {}", e)))?;
    Ok(envelope.data)
}
