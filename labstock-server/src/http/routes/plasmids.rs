//! Plasmid endpoints.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::antibodies::ExportParams;
use super::{download_response, entities};
use crate::db::repos::comments::Comment;
use crate::db::repos::files::FileRecord;
use crate::db::repos::plasmids::{
    GlycerolStock, GlycerolStockFields, Plasmid, PlasmidFields, PlasmidFilter, Preparation,
    PreparationFields,
};
use crate::db::repos::requests::Request;
use crate::db::repos::{CommentRepo, EntityRepo, FileRepo, PlasmidRepo, RequestRepo};
use crate::export::{self, ExportFormat};
use crate::http::error::ApiError;
use crate::http::extractors::AuthUser;
use crate::models::{EntityKind, EntityLabel, Paginated, Pagination, PaginationParams};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct PlasmidPayload {
    pub label: String,
    #[serde(flatten)]
    pub fields: PlasmidFields,
}

#[derive(Serialize)]
pub struct PlasmidDetail {
    #[serde(flatten)]
    pub plasmid: Plasmid,
    pub deletable: bool,
    pub preparations: Vec<Preparation>,
    pub glycerol_stocks: Vec<GlycerolStock>,
    pub comments: Vec<Comment>,
    pub requests: Vec<Request>,
    pub files: Vec<FileRecord>,
}

/// GET /plasmids
async fn list(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(filter): Query<PlasmidFilter>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<Paginated<Plasmid>>, ApiError> {
    let page = Pagination::from(params);
    let result = PlasmidRepo::new(&state.pool)
        .list(user.id(), &filter, page)
        .await?;
    Ok(Json(result))
}

/// POST /plasmids
async fn create(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<PlasmidPayload>,
) -> Result<(StatusCode, Json<Plasmid>), ApiError> {
    user.require_role(&["editor"])?;
    req.fields.validate()?;
    let label = EntityLabel::new(&req.label)?;

    let plasmid = PlasmidRepo::new(&state.pool)
        .create(user.id(), &label, &req.fields, None, false)
        .await?;
    Ok((StatusCode::CREATED, Json(plasmid)))
}

/// GET /plasmids/{id}
async fn detail(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<PlasmidDetail>, ApiError> {
    let repo = PlasmidRepo::new(&state.pool);
    let plasmid = repo.get(id).await?;

    let base = EntityRepo::new(&state.pool).base(id).await?;
    entities::check_review_visibility(&base, &user)?;

    Ok(Json(PlasmidDetail {
        deletable: base.deletable(state.config.auth.deletable_hours, Utc::now()),
        preparations: repo.preparations(id).await?,
        glycerol_stocks: repo.glycerol_stocks(id).await?,
        comments: CommentRepo::new(&state.pool).list_for_entity(id).await?,
        requests: RequestRepo::new(&state.pool).list_for_entity(id).await?,
        files: FileRepo::new(&state.pool).list_for_entity(id).await?,
        plasmid,
    }))
}

/// PUT /plasmids/{id}
async fn update(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<PlasmidPayload>,
) -> Result<Json<Plasmid>, ApiError> {
    entities::authorize_edit(&state, &user, id, EntityKind::Plasmid).await?;
    req.fields.validate()?;
    let label = EntityLabel::new(&req.label)?;

    let plasmid = PlasmidRepo::new(&state.pool)
        .update(id, &label, &req.fields)
        .await?;
    Ok(Json(plasmid))
}

/// DELETE /plasmids/{id}
async fn delete(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    entities::authorize_delete(&state, &user, id, EntityKind::Plasmid).await?;
    EntityRepo::new(&state.pool).delete(id).await?;
    tracing::info!(entity = id, user = user.id(), "plasmid deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /plasmids/export?format=csv|json
async fn export_list(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(filter): Query<PlasmidFilter>,
    Query(params): Query<ExportParams>,
) -> Result<Response, ApiError> {
    let format = ExportFormat::parse(&params.format)?;
    let items = PlasmidRepo::new(&state.pool)
        .export(user.id(), &filter)
        .await?;

    let bytes = match format {
        ExportFormat::Csv => export::to_csv(&items)?,
        ExportFormat::Json => export::to_json(&items)?,
        ExportFormat::Fasta => {
            return Err(crate::export::ExportError::FastaUnsupported { kind: "plasmids" }.into())
        }
    };

    let name = export::filename(EntityKind::Plasmid.display_name(), format);
    Ok(download_response(bytes, &name, format.content_type()))
}

/// POST /plasmids/{id}/preparations
async fn add_preparation(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(fields): Json<PreparationFields>,
) -> Result<(StatusCode, Json<Preparation>), ApiError> {
    user.require_role(&["editor"])?;
    EntityRepo::new(&state.pool)
        .base_of_kind(id, EntityKind::Plasmid)
        .await?;

    let preparation = PlasmidRepo::new(&state.pool)
        .add_preparation(id, user.id(), &fields)
        .await?;
    Ok((StatusCode::CREATED, Json(preparation)))
}

/// PUT /preparations/{id}
async fn update_preparation(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(fields): Json<PreparationFields>,
) -> Result<Json<Preparation>, ApiError> {
    let repo = PlasmidRepo::new(&state.pool);
    let existing = repo.get_preparation(id).await?;
    user.require_owner(existing.owner_id)?;

    let preparation = repo.update_preparation(id, &fields).await?;
    Ok(Json(preparation))
}

/// DELETE /preparations/{id}
async fn delete_preparation(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let repo = PlasmidRepo::new(&state.pool);
    let existing = repo.get_preparation(id).await?;
    user.require_owner(existing.owner_id)?;

    repo.delete_preparation(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /plasmids/{id}/glycerol-stocks
async fn add_glycerol_stock(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(fields): Json<GlycerolStockFields>,
) -> Result<(StatusCode, Json<GlycerolStock>), ApiError> {
    user.require_role(&["editor"])?;
    fields.validate()?;
    EntityRepo::new(&state.pool)
        .base_of_kind(id, EntityKind::Plasmid)
        .await?;

    let stock = PlasmidRepo::new(&state.pool)
        .add_glycerol_stock(id, user.id(), &fields)
        .await?;
    Ok((StatusCode::CREATED, Json(stock)))
}

/// PUT /glycerol-stocks/{id}
async fn update_glycerol_stock(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(fields): Json<GlycerolStockFields>,
) -> Result<Json<GlycerolStock>, ApiError> {
    let repo = PlasmidRepo::new(&state.pool);
    let existing = repo.get_glycerol_stock(id).await?;
    user.require_owner(existing.owner_id)?;
    fields.validate()?;

    let stock = repo.update_glycerol_stock(id, &fields).await?;
    Ok(Json(stock))
}

/// DELETE /glycerol-stocks/{id}
async fn delete_glycerol_stock(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let repo = PlasmidRepo::new(&state.pool);
    let existing = repo.get_glycerol_stock(id).await?;
    user.require_owner(existing.owner_id)?;

    repo.delete_glycerol_stock(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Plasmid routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/plasmids", get(list).post(create))
        .route("/plasmids/export", get(export_list))
        .route("/plasmids/{id}", get(detail).put(update).delete(delete))
        .route("/plasmids/{id}/preparations", post(add_preparation))
        .route(
            "/preparations/{id}",
            put(update_preparation).delete(delete_preparation),
        )
        .route("/plasmids/{id}/glycerol-stocks", post(add_glycerol_stock))
        .route(
            "/glycerol-stocks/{id}",
            put(update_glycerol_stock).delete(delete_glycerol_stock),
        )
}
