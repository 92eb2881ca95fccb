//! Bulk import endpoints.
//!
//! Flow: upload a spreadsheet for a kind, adjust the column mapping, then
//! execute. Execution inserts every row in one transaction with the review
//! flag set, so a bad row aborts the whole import.

use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::db::repos::files::FileRecord;
use crate::db::repos::imports::{ImportJob, JobWithMappings};
use crate::db::repos::{FileRepo, ImportRepo};
use crate::http::error::ApiError;
use crate::http::extractors::AuthUser;
use crate::models::EntityKind;
use crate::state::AppState;
use labstock_core::tabular::Table;

#[derive(Serialize)]
pub struct ImportJobResponse {
    #[serde(flatten)]
    pub job: JobWithMappings,
    /// Column headers of the uploaded table, for building the mapping UI.
    pub columns: Vec<String>,
}

#[derive(Deserialize)]
pub struct MappingPayload {
    pub field: String,
    pub column: Option<String>,
}

#[derive(Serialize)]
pub struct ExecuteResponse {
    pub created: Vec<i64>,
    pub count: usize,
}

async fn load_table(state: &AppState, file: &FileRecord) -> Result<Table, ApiError> {
    let stored = file.stored_name.as_deref().ok_or_else(|| ApiError::Internal {
        message: "import file has no stored name".into(),
    })?;
    let path = state.config.storage.upload_dir.join(stored);

    // Parsing is sync file IO; keep it off the async executor.
    let table = tokio::task::spawn_blocking(move || Table::from_path(&path))
        .await
        .map_err(|e| ApiError::Internal {
            message: format!("import parse task failed: {e}"),
        })?
        .map_err(|e| ApiError::BadRequest {
            message: format!("could not parse table: {e}"),
        })?;
    Ok(table)
}

/// Owner-or-admin gate shared by the per-job handlers.
async fn owned_job(
    state: &AppState,
    user: &AuthUser,
    id: i64,
) -> Result<JobWithMappings, ApiError> {
    let job = ImportRepo::new(&state.pool).get(id).await?;
    user.require_owner(job.job.user_id)?;
    Ok(job)
}

/// POST /imports/{kind} - upload a spreadsheet and create a job
async fn create(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(kind): Path<String>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ImportJobResponse>), ApiError> {
    user.require_role(&["editor"])?;
    let kind = EntityKind::parse(&kind)?;

    let mut upload: Option<(String, Vec<u8>)> = None;
    while let Some(part) = multipart.next_field().await.map_err(|e| ApiError::BadRequest {
        message: format!("invalid multipart body: {e}"),
    })? {
        if part.name() == Some("file") {
            let name = part
                .file_name()
                .map(str::to_owned)
                .filter(|n| !n.trim().is_empty())
                .ok_or_else(|| ApiError::BadRequest {
                    message: "file part is missing a filename".into(),
                })?;
            let bytes = part.bytes().await.map_err(|e| ApiError::BadRequest {
                message: format!("invalid multipart body: {e}"),
            })?;
            upload = Some((name, bytes.to_vec()));
        }
    }
    let (exposed_name, bytes) = upload.ok_or_else(|| ApiError::BadRequest {
        message: "multipart body must contain a 'file' part".into(),
    })?;

    let files = FileRepo::new(&state.pool);
    let file = files
        .register(user.id(), None, &exposed_name, Some("import upload"))
        .await?;
    let stored = file.stored_name.clone().ok_or_else(|| ApiError::Internal {
        message: "file registered without a stored name".into(),
    })?;
    let path = state.config.storage.upload_dir.join(&stored);
    if let Err(e) = tokio::fs::write(&path, &bytes).await {
        // Remove the row again; a row without disk content is a phantom
        // attachment that can never be parsed or downloaded.
        if let Err(cleanup) = files.delete(file.id).await {
            tracing::error!(file = file.id, error = %cleanup, "could not remove file row after failed write");
        }
        return Err(e.into());
    }

    let table = load_table(&state, &file).await?;

    let job = ImportRepo::new(&state.pool)
        .create_job(user.id(), file.id, kind, &table.columns)
        .await?;

    tracing::info!(job = job.job.id, kind = kind.as_str(), rows = table.rows.len(), "import job created");
    Ok((
        StatusCode::CREATED,
        Json(ImportJobResponse {
            job,
            columns: table.columns,
        }),
    ))
}

/// GET /imports - own pending jobs
async fn list(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<Vec<ImportJob>>, ApiError> {
    let jobs = ImportRepo::new(&state.pool).list_pending(user.id()).await?;
    Ok(Json(jobs))
}

/// GET /imports/{id} - job, mapping, and the table's columns
async fn detail(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<ImportJobResponse>, ApiError> {
    let job = owned_job(&state, &user, id).await?;
    let file = FileRepo::new(&state.pool).get(job.job.file_id).await?;
    let table = load_table(&state, &file).await?;

    Ok(Json(ImportJobResponse {
        job,
        columns: table.columns,
    }))
}

/// PUT /imports/{id}/mapping - assign or clear one column mapping
async fn set_mapping(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<MappingPayload>,
) -> Result<Json<JobWithMappings>, ApiError> {
    owned_job(&state, &user, id).await?;

    let repo = ImportRepo::new(&state.pool);
    repo.set_mapping(id, &req.field, req.column.as_deref())
        .await?;
    Ok(Json(repo.get(id).await?))
}

/// POST /imports/{id}/execute - run the import, all-or-nothing
async fn execute(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<ExecuteResponse>, ApiError> {
    let job = owned_job(&state, &user, id).await?;
    let file = FileRepo::new(&state.pool).get(job.job.file_id).await?;
    let table = load_table(&state, &file).await?;

    let origin = format!("imported from {}", file.exposed_name);
    let created = ImportRepo::new(&state.pool)
        .execute(id, &table, &origin)
        .await?;

    tracing::info!(job = id, created = created.len(), user = user.id(), "import executed");
    Ok(Json(ExecuteResponse {
        count: created.len(),
        created,
    }))
}

/// DELETE /imports/{id} - abandon a job (owner only)
async fn delete(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    owned_job(&state, &user, id).await?;
    ImportRepo::new(&state.pool).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Import routes
pub fn router() -> Router<Arc<AppState>> {
    // POST takes the entity kind in the path; GET/DELETE take a job id.
    Router::new()
        .route("/imports", get(list))
        .route("/imports/{id}", post(create).get(detail).delete(delete))
        .route("/imports/{id}/mapping", put(set_mapping))
        .route("/imports/{id}/execute", post(execute))
}
