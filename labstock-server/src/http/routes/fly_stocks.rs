//! Fly stock endpoints.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::antibodies::ExportParams;
use super::{download_response, entities};
use crate::db::repos::comments::Comment;
use crate::db::repos::files::FileRecord;
use crate::db::repos::fly_stocks::{FlyStock, FlyStockFields, FlyStockFilter, Modification};
use crate::db::repos::requests::Request;
use crate::db::repos::{CommentRepo, EntityRepo, FileRepo, FlyStockRepo, RequestRepo};
use crate::export::{self, ExportFormat};
use crate::http::error::ApiError;
use crate::http::extractors::AuthUser;
use crate::models::{EntityKind, EntityLabel, Paginated, Pagination, PaginationParams};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct FlyStockPayload {
    pub label: String,
    #[serde(flatten)]
    pub fields: FlyStockFields,
}

#[derive(Serialize)]
pub struct FlyStockDetail {
    #[serde(flatten)]
    pub fly_stock: FlyStock,
    pub deletable: bool,
    pub genotype: String,
    pub modifications: Vec<Modification>,
    pub comments: Vec<Comment>,
    pub requests: Vec<Request>,
    pub files: Vec<FileRecord>,
}

#[derive(Deserialize)]
pub struct ModificationPayload {
    pub modified_on: NaiveDate,
    pub description: String,
}

/// GET /fly-stocks
async fn list(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(filter): Query<FlyStockFilter>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<Paginated<FlyStock>>, ApiError> {
    let page = Pagination::from(params);
    let result = FlyStockRepo::new(&state.pool)
        .list(user.id(), &filter, page)
        .await?;
    Ok(Json(result))
}

/// POST /fly-stocks
async fn create(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<FlyStockPayload>,
) -> Result<(StatusCode, Json<FlyStock>), ApiError> {
    user.require_role(&["editor"])?;
    req.fields.validate()?;
    let label = EntityLabel::new(&req.label)?;

    let stock = FlyStockRepo::new(&state.pool)
        .create(user.id(), &label, &req.fields, None, false)
        .await?;
    Ok((StatusCode::CREATED, Json(stock)))
}

/// GET /fly-stocks/{id}
async fn detail(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<FlyStockDetail>, ApiError> {
    let repo = FlyStockRepo::new(&state.pool);
    let stock = repo.get(id).await?;

    let base = EntityRepo::new(&state.pool).base(id).await?;
    entities::check_review_visibility(&base, &user)?;

    Ok(Json(FlyStockDetail {
        deletable: base.deletable(state.config.auth.deletable_hours, Utc::now()),
        genotype: stock.genotype(),
        modifications: repo.modifications(id).await?,
        comments: CommentRepo::new(&state.pool).list_for_entity(id).await?,
        requests: RequestRepo::new(&state.pool).list_for_entity(id).await?,
        files: FileRepo::new(&state.pool).list_for_entity(id).await?,
        fly_stock: stock,
    }))
}

/// PUT /fly-stocks/{id}
async fn update(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<FlyStockPayload>,
) -> Result<Json<FlyStock>, ApiError> {
    entities::authorize_edit(&state, &user, id, EntityKind::FlyStock).await?;
    req.fields.validate()?;
    let label = EntityLabel::new(&req.label)?;

    let stock = FlyStockRepo::new(&state.pool)
        .update(id, &label, &req.fields)
        .await?;
    Ok(Json(stock))
}

/// DELETE /fly-stocks/{id}
async fn delete(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    entities::authorize_delete(&state, &user, id, EntityKind::FlyStock).await?;
    EntityRepo::new(&state.pool).delete(id).await?;
    tracing::info!(entity = id, user = user.id(), "fly stock deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /fly-stocks/export?format=csv|json
async fn export_list(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(filter): Query<FlyStockFilter>,
    Query(params): Query<ExportParams>,
) -> Result<Response, ApiError> {
    let format = ExportFormat::parse(&params.format)?;
    let items = FlyStockRepo::new(&state.pool)
        .export(user.id(), &filter)
        .await?;

    let bytes = match format {
        ExportFormat::Csv => export::to_csv(&items)?,
        ExportFormat::Json => export::to_json(&items)?,
        ExportFormat::Fasta => {
            return Err(crate::export::ExportError::FastaUnsupported { kind: "fly stocks" }.into())
        }
    };

    let name = export::filename(EntityKind::FlyStock.display_name(), format);
    Ok(download_response(bytes, &name, format.content_type()))
}

/// POST /fly-stocks/{id}/modifications
async fn add_modification(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<ModificationPayload>,
) -> Result<(StatusCode, Json<Modification>), ApiError> {
    user.require_role(&["editor"])?;
    EntityRepo::new(&state.pool)
        .base_of_kind(id, EntityKind::FlyStock)
        .await?;

    let modification = FlyStockRepo::new(&state.pool)
        .add_modification(id, user.id(), req.modified_on, &req.description)
        .await?;
    Ok((StatusCode::CREATED, Json(modification)))
}

/// PUT /modifications/{id}
async fn update_modification(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<ModificationPayload>,
) -> Result<Json<Modification>, ApiError> {
    let repo = FlyStockRepo::new(&state.pool);
    let existing = repo.get_modification(id).await?;
    user.require_owner(existing.user_id)?;

    let modification = repo
        .update_modification(id, req.modified_on, &req.description)
        .await?;
    Ok(Json(modification))
}

/// DELETE /modifications/{id}
async fn delete_modification(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let repo = FlyStockRepo::new(&state.pool);
    let existing = repo.get_modification(id).await?;
    user.require_owner(existing.user_id)?;

    repo.delete_modification(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Fly stock routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/fly-stocks", get(list).post(create))
        .route("/fly-stocks/export", get(export_list))
        .route("/fly-stocks/{id}", get(detail).put(update).delete(delete))
        .route("/fly-stocks/{id}/modifications", post(add_modification))
        .route(
            "/modifications/{id}",
            put(update_modification).delete(delete_modification),
        )
}
