// src/api/routes/v1/mod.rs
//! Version 1 API routes

pub mod transcripts;

use axum::Router;

use crate::api::AppState;

/// Create all v1 API routes
pub fn create_routes() -> Router<AppState> {
    Router::new().nest("/transcripts", transcripts::create_routes())
}
