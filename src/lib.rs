// src/lib.rs
//! HTTP backend for a speech-transcription workflow: clients upload audio,
//! an external speech service does the recognition, and the transcript
//! repository records incremental progress and results in a document store.

pub mod api;
pub mod auth;
pub mod config;
pub mod export;
pub mod poller;
pub mod repository;
pub mod speech;
pub mod store;
pub mod uploads;
