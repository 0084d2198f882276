// src/api/mod.rs
//! API layer module
//!
//! HTTP surface over the transcript repository: request validation, caller
//! identity resolution, and error-to-response mapping. Handlers never talk
//! to the store directly.

pub mod routes;

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;

use crate::auth::CredentialVerifier;
use crate::config::Config;
use crate::repository::TranscriptRepository;
use crate::speech::SpeechClient;
use crate::uploads::UploadUrlSigner;

/// API application state
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<TranscriptRepository>,
    pub verifier: Arc<dyn CredentialVerifier>,
    pub signer: Arc<dyn UploadUrlSigner>,
    pub speech: Arc<dyn SpeechClient>,
    pub config: Arc<Config>,
}

/// Create the main API router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::new(Duration::from_secs(
            state.config.server.request_timeout_secs,
        )));

    Router::new()
        .nest("/api/v1", routes::v1::create_routes())
        .nest("/health", routes::health::create_routes())
        .layer(middleware)
        .with_state(state)
}

/// Resolved caller identity. Extraction fails as not-found so an invalid or
/// missing credential leaks nothing about stored data.
pub struct AuthedUser(pub String);

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthedUser {
    type Rejection = error::ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| {
                error::ApiError::Authorization("missing bearer credential".to_string())
            })?;

        let user_id = state.verifier.verify(token).await?;
        Ok(AuthedUser(user_id))
    }
}

/// API error types
pub mod error {
    use axum::{
        http::StatusCode,
        response::{IntoResponse, Response},
        Json,
    };
    use serde_json::json;
    use std::fmt;

    use crate::auth::AuthError;
    use crate::speech::SpeechError;
    use crate::store::StoreError;
    use crate::uploads::SignerError;

    /// API error type
    #[derive(Debug)]
    pub enum ApiError {
        /// A required request field is missing or malformed
        Validation(String),
        /// Identity mismatch or missing identity; surfaced as not-found so
        /// existence is not leaked
        Authorization(String),
        NotFound(String),
        /// Document store failure; transcript state is whatever was durably
        /// committed before the failure
        Store(StoreError),
        /// External collaborator failure (speech service, signer, verifier)
        Upstream(String),
        Internal(String),
    }

    impl fmt::Display for ApiError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                ApiError::Validation(msg) => write!(f, "Validation error: {}", msg),
                ApiError::Authorization(msg) => write!(f, "Authorization error: {}", msg),
                ApiError::NotFound(msg) => write!(f, "Not Found: {}", msg),
                ApiError::Store(err) => write!(f, "Store error: {}", err),
                ApiError::Upstream(msg) => write!(f, "Upstream service error: {}", msg),
                ApiError::Internal(msg) => write!(f, "Internal error: {}", msg),
            }
        }
    }

    impl std::error::Error for ApiError {}

    impl IntoResponse for ApiError {
        fn into_response(self) -> Response {
            let (status, error_type, message) = match self {
                ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg),
                // identical to NotFound on the wire
                ApiError::Authorization(msg) => {
                    log::warn!("authorization failure: {}", msg);
                    (
                        StatusCode::NOT_FOUND,
                        "not_found",
                        "Transcript not found".to_string(),
                    )
                }
                ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
                ApiError::Store(err) => {
                    log::error!("store failure: {}", err);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "store_error",
                        err.to_string(),
                    )
                }
                ApiError::Upstream(msg) => {
                    log::error!("upstream failure: {}", msg);
                    (StatusCode::BAD_GATEWAY, "upstream_error", msg)
                }
                ApiError::Internal(msg) => {
                    log::error!("internal failure: {}", msg);
                    (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg)
                }
            };

            let body = Json(json!({
                "error": {
                    "type": error_type,
                    "message": message,
                    "code": status.as_u16()
                }
            }));

            (status, body).into_response()
        }
    }

    impl From<StoreError> for ApiError {
        fn from(err: StoreError) -> Self {
            ApiError::Store(err)
        }
    }

    impl From<AuthError> for ApiError {
        fn from(err: AuthError) -> Self {
            match err {
                AuthError::InvalidToken(msg) => ApiError::Authorization(msg),
                AuthError::Unavailable(msg) => ApiError::Upstream(msg),
            }
        }
    }

    impl From<SignerError> for ApiError {
        fn from(err: SignerError) -> Self {
            ApiError::Upstream(err.to_string())
        }
    }

    impl From<SpeechError> for ApiError {
        fn from(err: SpeechError) -> Self {
            ApiError::Upstream(err.to_string())
        }
    }

    impl From<anyhow::Error> for ApiError {
        fn from(err: anyhow::Error) -> Self {
            match err.downcast::<StoreError>() {
                Ok(store) => ApiError::Store(store),
                Err(err) => match err.downcast::<SpeechError>() {
                    Ok(speech) => ApiError::Upstream(speech.to_string()),
                    Err(err) => ApiError::Internal(err.to_string()),
                },
            }
        }
    }
}

/// API result type
pub type ApiResult<T> = Result<T, error::ApiError>;
