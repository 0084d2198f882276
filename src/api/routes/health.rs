// src/api/routes/health.rs
//! Health check routes
//!
//! This module provides health check endpoints for monitoring the service.

use axum::{extract::State, response::Json, routing::get, Router};
use serde_json::{json, Value};

use crate::api::{error::ApiError, ApiResult, AppState};

/// Create health check routes
pub fn create_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(health_check))
        .route("/live", get(liveness_check))
        .route("/ready", get(readiness_check))
}

/// Basic health check endpoint
async fn health_check() -> ApiResult<Json<Value>> {
    Ok(Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now(),
        "service": "transcribe-backend",
        "version": env!("CARGO_PKG_VERSION")
    })))
}

/// Liveness check endpoint
async fn liveness_check() -> ApiResult<Json<Value>> {
    Ok(Json(json!({
        "status": "alive",
        "timestamp": chrono::Utc::now()
    })))
}

/// Readiness check endpoint; probes the document store with a cheap read.
async fn readiness_check(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    match state.repo.get_progress("readiness-probe").await {
        Ok(_) => Ok(Json(json!({
            "status": "ready",
            "timestamp": chrono::Utc::now(),
            "checks": { "store": "accessible" }
        }))),
        Err(err) => Err(ApiError::Store(err)),
    }
}
