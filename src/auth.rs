// src/auth.rs
//! Credential verification
//!
//! The backend never inspects raw tokens itself: a verifier resolves a
//! bearer token to a caller identity, and everything downstream only sees
//! the resolved `user_id`.

use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

#[derive(Debug)]
pub enum AuthError {
    /// Token was rejected or the identity could not be resolved
    InvalidToken(String),
    /// The verifier backend could not be reached
    Unavailable(String),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::InvalidToken(msg) => write!(f, "invalid token: {}", msg),
            AuthError::Unavailable(msg) => write!(f, "verifier unavailable: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {}

#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// Resolve a bearer token to a caller identity.
    async fn verify(&self, token: &str) -> Result<String, AuthError>;
}

/// Verifier backed by an HTTP token-info endpoint.
pub struct HttpCredentialVerifier {
    client: reqwest::Client,
    token_info_url: String,
}

#[derive(Debug, Deserialize)]
struct TokenInfoResponse {
    user_id: String,
}

impl HttpCredentialVerifier {
    pub fn new(token_info_url: &str, timeout_secs: u64) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            token_info_url: token_info_url.to_string(),
        })
    }
}

#[async_trait]
impl CredentialVerifier for HttpCredentialVerifier {
    async fn verify(&self, token: &str) -> Result<String, AuthError> {
        let response = self
            .client
            .get(&self.token_info_url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|err| AuthError::Unavailable(err.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::InvalidToken(format!(
                "token-info returned {}",
                response.status()
            )));
        }

        let info: TokenInfoResponse = response
            .json()
            .await
            .map_err(|err| AuthError::InvalidToken(err.to_string()))?;
        Ok(info.user_id)
    }
}
