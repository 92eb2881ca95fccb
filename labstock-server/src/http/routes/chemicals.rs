//! Chemical endpoints.

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
use crate::db::repos::batches::{Batch, BatchFilter};
use crate::db::repos::chemicals::{
    Chemical, ChemicalFields, ChemicalFilter, StockSolution, StockSolutionFields,
};
use crate::db::repos::comments::Comment;
use crate::db::repos::files::FileRecord;
use crate::db::repos::requests::Request;
use crate::db::repos::{BatchRepo, ChemicalRepo, CommentRepo, EntityRepo, FileRepo, RequestRepo};
use crate::export::{self, ExportFormat};
use crate::http::error::ApiError;
use crate::http::extractors::AuthUser;
use crate::models::{EntityKind, EntityLabel, Paginated, Pagination, PaginationParams};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ChemicalPayload {
    pub label: String,
    #[serde(flatten)]
    pub fields: ChemicalFields,
}

#[derive(Serialize)]
pub struct ChemicalDetail {
    #[serde(flatten)]
    pub chemical: Chemical,
    pub deletable: bool,
    pub stock_solutions: Vec<StockSolution>,
    pub batches: Vec<Batch>,
    pub comments: Vec<Comment>,
    pub requests: Vec<Request>,
    pub files: Vec<FileRecord>,
}

/// GET /chemicals
async fn list(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(filter): Query<ChemicalFilter>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<Paginated<Chemical>>, ApiError> {
    let page = Pagination::from(params);
    let result = ChemicalRepo::new(&state.pool)
        .list(user.id(), &filter, page)
        .await?;
    Ok(Json(result))
}

/// POST /chemicals
async fn create(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<ChemicalPayload>,
) -> Result<(StatusCode, Json<Chemical>), ApiError> {
    user.require_role(&["editor"])?;
    req.fields.validate()?;
    let label = EntityLabel::new(&req.label)?;

    let chemical = ChemicalRepo::new(&state.pool)
        .create(user.id(), &label, &req.fields, None, false)
        .await?;
    Ok((StatusCode::CREATED, Json(chemical)))
}

/// GET /chemicals/{id}
async fn detail(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<ChemicalDetail>, ApiError> {
    let repo = ChemicalRepo::new(&state.pool);
    let chemical = repo.get(id).await?;

    let base = EntityRepo::new(&state.pool).base(id).await?;
    entities::check_review_visibility(&base, &user)?;

    let batches = BatchRepo::new(&state.pool)
        .export(
            user.id(),
            &BatchFilter {
                consumable_id: Some(id),
                ..Default::default()
            },
        )
        .await?;

    Ok(Json(ChemicalDetail {
        deletable: base.deletable(state.config.auth.deletable_hours, Utc::now()),
        stock_solutions: repo.stock_solutions(id).await?,
        batches,
        comments: CommentRepo::new(&state.pool).list_for_entity(id).await?,
        requests: RequestRepo::new(&state.pool).list_for_entity(id).await?,
        files: FileRepo::new(&state.pool).list_for_entity(id).await?,
        chemical,
    }))
}

/// PUT /chemicals/{id}
async fn update(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<ChemicalPayload>,
) -> Result<Json<Chemical>, ApiError> {
    entities::authorize_edit(&state, &user, id, EntityKind::Chemical).await?;
    req.fields.validate()?;
    let label = EntityLabel::new(&req.label)?;

    let chemical = ChemicalRepo::new(&state.pool)
        .update(id, &label, &req.fields)
        .await?;
    Ok(Json(chemical))
}

/// DELETE /chemicals/{id}
async fn delete(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    entities::authorize_delete(&state, &user, id, EntityKind::Chemical).await?;
    EntityRepo::new(&state.pool).delete(id).await?;
    tracing::info!(entity = id, user = user.id(), "chemical deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /chemicals/export?format=csv|json
async fn export_list(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(filter): Query<ChemicalFilter>,
    Query(params): Query<ExportParams>,
) -> Result<Response, ApiError> {
    let format = ExportFormat::parse(&params.format)?;
    let items = ChemicalRepo::new(&state.pool)
        .export(user.id(), &filter)
        .await?;

    let bytes = match format {
        ExportFormat::Csv => export::to_csv(&items)?,
        ExportFormat::Json => export::to_json(&items)?,
        ExportFormat::Fasta => {
            return Err(crate::export::ExportError::FastaUnsupported { kind: "chemicals" }.into())
        }
    };

    let name = export::filename(EntityKind::Chemical.display_name(), format);
    Ok(download_response(bytes, &name, format.content_type()))
}

/// POST /chemicals/{id}/stock-solutions
async fn add_stock_solution(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(fields): Json<StockSolutionFields>,
) -> Result<(StatusCode, Json<StockSolution>), ApiError> {
    user.require_role(&["editor"])?;
    fields.validate()?;
    EntityRepo::new(&state.pool)
        .base_of_kind(id, EntityKind::Chemical)
        .await?;

    let solution = ChemicalRepo::new(&state.pool)
        .add_stock_solution(id, user.id(), &fields)
        .await?;
    Ok((StatusCode::CREATED, Json(solution)))
}

/// PUT /stock-solutions/{id}
async fn update_stock_solution(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(fields): Json<StockSolutionFields>,
) -> Result<Json<StockSolution>, ApiError> {
    let repo = ChemicalRepo::new(&state.pool);
    let existing = repo.get_stock_solution(id).await?;
    user.require_owner(existing.responsible_id)?;
    fields.validate()?;

    let solution = repo.update_stock_solution(id, &fields).await?;
    Ok(Json(solution))
}

/// DELETE /stock-solutions/{id}
async fn delete_stock_solution(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let repo = ChemicalRepo::new(&state.pool);
    let existing = repo.get_stock_solution(id).await?;
    user.require_owner(existing.responsible_id)?;

    repo.delete_stock_solution(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Chemical routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/chemicals", get(list).post(create))
        .route("/chemicals/export", get(export_list))
        .route("/chemicals/{id}", get(detail).put(update).delete(delete))
        .route("/chemicals/{id}/stock-solutions", post(add_stock_solution))
        .route(
            "/stock-solutions/{id}",
            put(update_stock_solution).delete(delete_stock_solution),
        )
}
