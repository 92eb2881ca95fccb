//! Batch endpoints.
//!
//! Batches have a cross-kind list of their own (stock keeping across all
//! consumables) in addition to the per-entity view on the detail pages.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};

use super::antibodies::ExportParams;
use super::download_response;
use crate::db::repos::batches::{Batch, BatchFields, BatchFilter};
use crate::db::repos::BatchRepo;
use crate::export::{self, ExportFormat};
use crate::http::error::ApiError;
use crate::http::extractors::AuthUser;
use crate::models::{Paginated, Pagination, PaginationParams};
use crate::state::AppState;

/// GET /batches - cross-consumable list
async fn list(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(filter): Query<BatchFilter>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<Paginated<Batch>>, ApiError> {
    let page = Pagination::from(params);
    let result = BatchRepo::new(&state.pool)
        .list(user.id(), &filter, page)
        .await?;
    Ok(Json(result))
}

/// POST /entities/{id}/batches - add a batch to a consumable
async fn create(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(fields): Json<BatchFields>,
) -> Result<(StatusCode, Json<Batch>), ApiError> {
    user.require_role(&["editor"])?;
    fields.validate()?;

    let batch = BatchRepo::new(&state.pool).create(id, &fields).await?;
    Ok((StatusCode::CREATED, Json(batch)))
}

/// GET /batches/{id}
async fn detail(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Batch>, ApiError> {
    let batch = BatchRepo::new(&state.pool).get(id).await?;
    Ok(Json(batch))
}

/// PUT /batches/{id}
async fn update(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(fields): Json<BatchFields>,
) -> Result<Json<Batch>, ApiError> {
    user.require_role(&["editor"])?;
    fields.validate()?;

    let batch = BatchRepo::new(&state.pool).update(id, &fields).await?;
    Ok(Json(batch))
}

/// DELETE /batches/{id}
async fn delete(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    user.require_role(&["editor"])?;
    BatchRepo::new(&state.pool).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /batches/{id}/opened - record first use
async fn mark_opened(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Batch>, ApiError> {
    user.require_role(&["editor"])?;
    let batch = BatchRepo::new(&state.pool).mark_opened(id).await?;
    Ok(Json(batch))
}

/// POST /batches/{id}/emptied - record depletion
async fn mark_emptied(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Batch>, ApiError> {
    user.require_role(&["editor"])?;
    let batch = BatchRepo::new(&state.pool).mark_emptied(id).await?;
    Ok(Json(batch))
}

/// GET /batches/export?format=csv|json
async fn export_list(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(filter): Query<BatchFilter>,
    Query(params): Query<ExportParams>,
) -> Result<Response, ApiError> {
    let format = ExportFormat::parse(&params.format)?;
    let items = BatchRepo::new(&state.pool)
        .export(user.id(), &filter)
        .await?;

    let bytes = match format {
        ExportFormat::Csv => export::to_csv(&items)?,
        ExportFormat::Json => export::to_json(&items)?,
        ExportFormat::Fasta => {
            return Err(crate::export::ExportError::FastaUnsupported { kind: "batches" }.into())
        }
    };

    let name = export::filename("Batch", format);
    Ok(download_response(bytes, &name, format.content_type()))
}

/// Batch routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/batches", get(list))
        .route("/batches/export", get(export_list))
        .route("/batches/{id}", get(detail).put(update).delete(delete))
        .route("/batches/{id}/opened", post(mark_opened))
        .route("/batches/{id}/emptied", post(mark_emptied))
        .route("/entities/{id}/batches", post(create))
}
