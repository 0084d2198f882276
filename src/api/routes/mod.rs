// src/api/routes/mod.rs
//! API routes module
//!
//! This module organizes all HTTP routes for the transcription backend.

pub mod health;
pub mod v1;
