// src/api/routes/v1/transcripts.rs
//! Transcript management API routes
//!
//! Every operation below is gated on the caller identity matching the
//! transcript's `userId`; a non-owner and an absent document are
//! indistinguishable to the client.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, patch, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::api::{error::ApiError, ApiResult, AppState, AuthedUser};
use crate::export::{self, ExportFormat};
use crate::poller;
use crate::repository::{Progress, Transcript};

const DEFAULT_LANGUAGE_CODE: &str = "nb-NO";

/// Create transcript routes
pub fn create_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_transcript))
        .route("/:id", get(get_transcript).delete(delete_transcript))
        .route("/:id/upload-url", post(request_upload_url))
        .route("/:id/metadata", patch(update_metadata))
        .route("/:id/export", get(export_transcript))
        .route("/:id/refresh", post(refresh_transcript))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadUrlRequest {
    content_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateMetadataRequest {
    original_mime_type: Option<String>,
    language_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExportQuery {
    format: Option<String>,
}

/// Fetch a transcript and cross-check ownership. Absent document and
/// identity mismatch both surface as not-found.
async fn owned_transcript(state: &AppState, id: &str, user_id: &str) -> ApiResult<Transcript> {
    let transcript = state
        .repo
        .get_transcript(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Transcript not found".to_string()))?;
    if transcript.user_id.as_deref() != Some(user_id) {
        return Err(ApiError::Authorization(format!(
            "caller is not the owner of transcript {}",
            id
        )));
    }
    Ok(transcript)
}

/// Create an empty transcript shell with a pre-allocated id. Content arrives
/// later through merge updates as the pipeline proceeds.
async fn create_transcript(
    State(state): State<AppState>,
    AuthedUser(user_id): AuthedUser,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let id = state.repo.build_new_id();
    state
        .repo
        .update_transcript(&id, json!({ "userId": user_id }))
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

/// Issue a time-limited write URL for the original audio upload.
async fn request_upload_url(
    State(state): State<AppState>,
    AuthedUser(user_id): AuthedUser,
    Path(id): Path<String>,
    Json(request): Json<UploadUrlRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    owned_transcript(&state, &id, &user_id).await?;
    let content_type = request
        .content_type
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ApiError::Validation("contentType is required".to_string()))?;

    let object_path = format!("uploads/{}/{}", user_id, id);
    let upload_url = state
        .signer
        .signed_upload_url(&object_path, &content_type)
        .await?;
    Ok(Json(json!({ "uploadUrl": upload_url })))
}

/// Set initial metadata and move the transcript into Uploading.
async fn update_metadata(
    State(state): State<AppState>,
    AuthedUser(user_id): AuthedUser,
    Path(id): Path<String>,
    Json(request): Json<UpdateMetadataRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    owned_transcript(&state, &id, &user_id).await?;
    let original_mime_type = request
        .original_mime_type
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ApiError::Validation("originalMimeType is required".to_string()))?;
    let language_code = request
        .language_code
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_LANGUAGE_CODE.to_string());

    state
        .repo
        .update_transcript(
            &id,
            json!({
                "metadata": {
                    "originalMimeType": original_mime_type,
                    "languageCodes": [language_code],
                }
            }),
        )
        .await?;
    state.repo.set_progress(&id, Progress::Uploading).await?;
    Ok(Json(json!({ "id": id })))
}

/// Get a specific transcript by id
async fn get_transcript(
    State(state): State<AppState>,
    AuthedUser(user_id): AuthedUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Transcript>> {
    let transcript = owned_transcript(&state, &id, &user_id).await?;
    Ok(Json(transcript))
}

/// Delete a transcript and all of its paragraphs
async fn delete_transcript(
    State(state): State<AppState>,
    AuthedUser(user_id): AuthedUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    owned_transcript(&state, &id, &user_id).await?;
    state.repo.delete_transcript(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Export a transcript in the requested format
async fn export_transcript(
    State(state): State<AppState>,
    AuthedUser(user_id): AuthedUser,
    Path(id): Path<String>,
    Query(query): Query<ExportQuery>,
) -> ApiResult<Response> {
    let transcript = owned_transcript(&state, &id, &user_id).await?;

    let requested = query.format.as_deref().unwrap_or("json");
    let format = ExportFormat::parse(requested).ok_or_else(|| {
        ApiError::Validation(format!(
            "Unsupported export format: {}. Supported formats: json, docx, xmp",
            requested
        ))
    })?;

    let paragraphs = state.repo.get_paragraphs(&id).await?;
    let rendering = export::render(format, &id, &transcript, &paragraphs)
        .map_err(|err| ApiError::Internal(err.to_string()))?;

    Ok((
        [
            (header::CONTENT_TYPE, rendering.content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", rendering.filename),
            ),
        ],
        rendering.body,
    )
        .into_response())
}

/// Poll the speech service operation and reconcile the transcript state.
async fn refresh_transcript(
    State(state): State<AppState>,
    AuthedUser(user_id): AuthedUser,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let transcript = owned_transcript(&state, &id, &user_id).await?;
    let has_reference = transcript
        .speech_data
        .as_ref()
        .map_or(false, |data| data.reference.is_some());
    if !has_reference {
        return Err(ApiError::Validation(
            "transcript has no speech operation reference yet".to_string(),
        ));
    }
    let progress = poller::reconcile_transcript(&state.repo, state.speech.as_ref(), &id).await?;
    Ok(Json(json!({ "id": id, "progress": progress })))
}
