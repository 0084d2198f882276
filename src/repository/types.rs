// src/repository/types.rs
//! Data models for the transcript persistence layer
//!
//! Stored documents use camelCase field names. Every field of a stored
//! transcript is optional on read: documents are built up incrementally by
//! merge writes, so any slice of the record may be absent at any time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Processing lifecycle phase of a transcript.
///
/// `NotFound` is a synthetic sentinel returned when no document (or no
/// status field) exists; it is never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Progress {
    Uploading,
    Transcribing,
    Analysing,
    Saving,
    Done,
    Error,
    NotFound,
}

/// Status slice of a transcript document.
///
/// `percent` is absent once the transcript is `Done`; absence is the
/// completion signal, not a value of 100.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptStatus {
    pub progress: Option<Progress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent: Option<f64>,
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptMetadata {
    #[serde(default)]
    pub language_codes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_mime_type: Option<String>,
    /// Audio duration in seconds, set once known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_duration: Option<f64>,
}

/// Location of the converted intermediate audio artifact and the external
/// speech service's operation handle.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SpeechData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flac_file_location_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

/// Top-level record for one audio submission.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Transcript {
    /// Backfilled from the document id when the stored record lacks it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Owner identity; set once at creation, never reassigned. Sole
    /// authorization key for reads and exports.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<TranscriptMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TranscriptStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_data: Option<SpeechData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playback_gs_url: Option<String>,
}

impl Transcript {
    pub fn progress(&self) -> Progress {
        self.status
            .as_ref()
            .and_then(|status| status.progress)
            .unwrap_or(Progress::NotFound)
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.status.as_ref().and_then(|status| status.last_updated)
    }
}

/// One immutable unit of recognized speech. Paragraphs are only ever created
/// and bulk-deleted; there is no update-in-place.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paragraph {
    /// Backfilled from the document id on read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Canonical reading-order key, in seconds from the start of the audio.
    pub start_time: f64,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker_tag: Option<i32>,
}
