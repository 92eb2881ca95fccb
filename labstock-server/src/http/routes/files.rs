//! File attachment endpoints.
//!
//! Uploads are stored under the configured upload directory with names
//! derived from the database row id; the original filename only ever
//! appears in responses and download headers.

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::db::repos::files::FileRecord;
use crate::db::repos::{EntityRepo, FileRepo};
use crate::http::error::ApiError;
use crate::http::extractors::AuthUser;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct FileMetaPayload {
    pub exposed_name: Option<String>,
    pub note: Option<String>,
}

#[derive(Deserialize)]
pub struct DownloadParams {
    #[serde(default)]
    pub download: bool,
}

fn disk_path(state: &AppState, stored_name: &str) -> PathBuf {
    state.config.storage.upload_dir.join(stored_name)
}

/// POST /files - multipart upload with parts `file` (required) and
/// optional `entity_id` and `note`.
async fn upload(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<FileRecord>), ApiError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut entity_id: Option<i64> = None;
    let mut note: Option<String> = None;

    while let Some(part) = multipart.next_field().await.map_err(bad_multipart)? {
        match part.name().unwrap_or("") {
            "file" => {
                let name = part
                    .file_name()
                    .map(str::to_owned)
                    .filter(|n| !n.trim().is_empty())
                    .ok_or_else(|| ApiError::BadRequest {
                        message: "file part is missing a filename".into(),
                    })?;
                let bytes = part.bytes().await.map_err(bad_multipart)?;
                file = Some((name, bytes.to_vec()));
            }
            "entity_id" => {
                let text = part.text().await.map_err(bad_multipart)?;
                entity_id = Some(text.trim().parse().map_err(|_| ApiError::BadRequest {
                    message: "entity_id must be an integer".into(),
                })?);
            }
            "note" => {
                note = Some(part.text().await.map_err(bad_multipart)?);
            }
            _ => {}
        }
    }

    let (exposed_name, bytes) = file.ok_or_else(|| ApiError::BadRequest {
        message: "multipart body must contain a 'file' part".into(),
    })?;

    if let Some(entity_id) = entity_id {
        EntityRepo::new(&state.pool).base(entity_id).await?;
    }

    let files = FileRepo::new(&state.pool);
    let record = files
        .register(user.id(), entity_id, &exposed_name, note.as_deref())
        .await?;

    // The disk name is always present right after registration.
    let stored = record.stored_name.clone().ok_or_else(|| ApiError::Internal {
        message: "file registered without a stored name".into(),
    })?;
    if let Err(e) = tokio::fs::write(disk_path(&state, &stored), &bytes).await {
        // Remove the row again; a row without disk content is a phantom
        // attachment that can never be downloaded.
        if let Err(cleanup) = files.delete(record.id).await {
            tracing::error!(file = record.id, error = %cleanup, "could not remove file row after failed write");
        }
        return Err(e.into());
    }

    tracing::info!(file = record.id, user = user.id(), name = %record.exposed_name, "file uploaded");
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /files/{id} - serve the file; `?download=true` forces an attachment.
async fn download(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<i64>,
    Query(params): Query<DownloadParams>,
) -> Result<Response, ApiError> {
    let record = FileRepo::new(&state.pool).get(id).await?;
    let stored = record.stored_name.as_deref().ok_or_else(|| ApiError::NotFound {
        resource: "file",
        id: id.to_string(),
    })?;

    let bytes = tokio::fs::read(disk_path(&state, stored)).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            tracing::error!(file = id, "file row exists but disk content is missing");
            ApiError::NotFound {
                resource: "file",
                id: id.to_string(),
            }
        } else {
            e.into()
        }
    })?;

    let disposition = if params.download {
        format!("attachment; filename=\"{}\"", record.exposed_name)
    } else {
        format!("inline; filename=\"{}\"", record.exposed_name)
    };

    Ok(Response::builder()
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_DISPOSITION, disposition)
        .body(Body::from(bytes))
        .unwrap_or_default())
}

/// PUT /files/{id} - rename or change the note (uploader or admin)
async fn update_meta(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<FileMetaPayload>,
) -> Result<Json<FileRecord>, ApiError> {
    let repo = FileRepo::new(&state.pool);
    let existing = repo.get(id).await?;
    user.require_owner(existing.user_id)?;

    let record = repo
        .update_meta(id, req.exposed_name.as_deref(), req.note.as_deref())
        .await?;
    Ok(Json(record))
}

/// DELETE /files/{id}
async fn delete(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let repo = FileRepo::new(&state.pool);
    let existing = repo.get(id).await?;
    user.require_owner(existing.user_id)?;

    if let Some(stored) = repo.delete(id).await? {
        // A missing disk file is not an error; the row is gone either way.
        if let Err(e) = tokio::fs::remove_file(disk_path(&state, &stored)).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(file = id, error = %e, "could not remove file from disk");
            }
        }
    }
    Ok(StatusCode::NO_CONTENT)
}

fn bad_multipart(e: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError::BadRequest {
        message: format!("invalid multipart body: {e}"),
    }
}

/// File routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/files", post(upload))
        .route("/files/{id}", get(download).put(update_meta).delete(delete))
}
