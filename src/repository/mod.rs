// src/repository/mod.rs
//! Repository module for the transcript persistence layer
//!
//! The repository owns all transcript and paragraph persistence logic on top
//! of the document store adapter. HTTP handlers and the speech-polling
//! routine only ever talk to the store through it.

pub mod transcripts;
pub mod types;

pub use transcripts::TranscriptRepository;
pub use types::{Paragraph, Progress, SpeechData, Transcript, TranscriptMetadata, TranscriptStatus};
