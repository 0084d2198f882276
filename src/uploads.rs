// src/uploads.rs
//! Upload URL issuance
//!
//! The blob store itself is an external collaborator: given an object path
//! and content type it issues a time-limited write URL. The backend only
//! ever stores the resulting location string.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use std::time::Duration;

#[derive(Debug)]
pub enum SignerError {
    Rejected(String),
    Unavailable(String),
}

impl fmt::Display for SignerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignerError::Rejected(msg) => write!(f, "signer rejected request: {}", msg),
            SignerError::Unavailable(msg) => write!(f, "signer unavailable: {}", msg),
        }
    }
}

impl std::error::Error for SignerError {}

#[async_trait]
pub trait UploadUrlSigner: Send + Sync {
    /// Issue a time-limited write URL for `object_path` with the given
    /// content type.
    async fn signed_upload_url(
        &self,
        object_path: &str,
        content_type: &str,
    ) -> Result<String, SignerError>;
}

/// Signer backed by an HTTP signing service.
pub struct HttpUploadUrlSigner {
    client: reqwest::Client,
    signer_url: String,
    url_ttl_secs: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignedUrlResponse {
    upload_url: String,
}

impl HttpUploadUrlSigner {
    pub fn new(signer_url: &str, url_ttl_secs: u64, timeout_secs: u64) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            signer_url: signer_url.to_string(),
            url_ttl_secs,
        })
    }
}

#[async_trait]
impl UploadUrlSigner for HttpUploadUrlSigner {
    async fn signed_upload_url(
        &self,
        object_path: &str,
        content_type: &str,
    ) -> Result<String, SignerError> {
        let response = self
            .client
            .post(&self.signer_url)
            .json(&json!({
                "objectPath": object_path,
                "contentType": content_type,
                "ttlSeconds": self.url_ttl_secs,
            }))
            .send()
            .await
            .map_err(|err| SignerError::Unavailable(err.to_string()))?;

        if !response.status().is_success() {
            return Err(SignerError::Rejected(format!(
                "signer returned {}",
                response.status()
            )));
        }

        let signed: SignedUrlResponse = response
            .json()
            .await
            .map_err(|err| SignerError::Rejected(err.to_string()))?;
        Ok(signed.upload_url)
    }
}
