// src/speech.rs
//! External speech-recognition service client
//!
//! The service is asynchronous: submitting audio returns an opaque operation
//! reference, and a separate poll against that reference yields either an
//! in-progress percentage or the terminal list of recognized segments. The
//! backend persists the reference and reconciles completion from poll
//! results; it never retries here itself.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use std::time::Duration;

#[derive(Debug)]
pub enum SpeechError {
    /// The service rejected the request or returned a malformed payload
    Service(String),
    /// The service could not be reached
    Transport(String),
}

impl fmt::Display for SpeechError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpeechError::Service(msg) => write!(f, "speech service error: {}", msg),
            SpeechError::Transport(msg) => write!(f, "speech service unreachable: {}", msg),
        }
    }
}

impl std::error::Error for SpeechError {}

/// One recognized unit from a terminal poll result, in submission order.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognizedSegment {
    pub start_time: f64,
    pub text: String,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub speaker_tag: Option<i32>,
}

/// Outcome of polling an operation reference.
#[derive(Debug, Clone)]
pub enum PollOutcome {
    InProgress { percent: f64 },
    Complete { segments: Vec<RecognizedSegment> },
}

#[async_trait]
pub trait SpeechClient: Send + Sync {
    /// Submit converted audio for recognition; returns the operation
    /// reference to poll.
    async fn submit(&self, audio_uri: &str, language_codes: &[String])
        -> Result<String, SpeechError>;

    /// Poll a previously returned operation reference.
    async fn poll(&self, reference: &str) -> Result<PollOutcome, SpeechError>;
}

/// HTTP client against a long-running-operation style API.
pub struct HttpSpeechClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    reference: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationResponse {
    #[serde(default)]
    done: bool,
    #[serde(default)]
    progress_percent: Option<f64>,
    #[serde(default)]
    results: Option<Vec<RecognizedSegment>>,
    #[serde(default)]
    error: Option<String>,
}

impl HttpSpeechClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl SpeechClient for HttpSpeechClient {
    async fn submit(
        &self,
        audio_uri: &str,
        language_codes: &[String],
    ) -> Result<String, SpeechError> {
        let response = self
            .client
            .post(format!("{}/operations", self.base_url))
            .json(&json!({
                "audioUri": audio_uri,
                "languageCodes": language_codes,
            }))
            .send()
            .await
            .map_err(|err| SpeechError::Transport(err.to_string()))?;

        if !response.status().is_success() {
            return Err(SpeechError::Service(format!(
                "submit returned {}",
                response.status()
            )));
        }

        let submitted: SubmitResponse = response
            .json()
            .await
            .map_err(|err| SpeechError::Service(err.to_string()))?;
        Ok(submitted.reference)
    }

    async fn poll(&self, reference: &str) -> Result<PollOutcome, SpeechError> {
        let response = self
            .client
            .get(format!("{}/operations/{}", self.base_url, reference))
            .send()
            .await
            .map_err(|err| SpeechError::Transport(err.to_string()))?;

        if !response.status().is_success() {
            return Err(SpeechError::Service(format!(
                "poll returned {}",
                response.status()
            )));
        }

        let operation: OperationResponse = response
            .json()
            .await
            .map_err(|err| SpeechError::Service(err.to_string()))?;

        if let Some(message) = operation.error {
            return Err(SpeechError::Service(message));
        }
        if operation.done {
            Ok(PollOutcome::Complete {
                segments: operation.results.unwrap_or_default(),
            })
        } else {
            Ok(PollOutcome::InProgress {
                percent: operation.progress_percent.unwrap_or(0.0),
            })
        }
    }
}
