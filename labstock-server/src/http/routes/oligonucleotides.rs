//! Oligonucleotide endpoints.
//!
//! The only kind with a FASTA export; the detail response also reports
//! derived sequence properties (length, GC content).

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use labstock_core::sequence;
use serde::{Deserialize, Serialize};

use super::antibodies::ExportParams;
use super::{download_response, entities};
use crate::db::repos::comments::Comment;
use crate::db::repos::files::FileRecord;
use crate::db::repos::oligonucleotides::{
    Oligonucleotide, OligonucleotideFields, OligonucleotideFilter,
};
use crate::db::repos::requests::Request;
use crate::db::repos::{CommentRepo, EntityRepo, FileRepo, OligonucleotideRepo, RequestRepo};
use crate::export::{self, ExportFormat};
use crate::http::error::ApiError;
use crate::http::extractors::AuthUser;
use crate::models::{EntityKind, EntityLabel, Paginated, Pagination, PaginationParams};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct OligonucleotidePayload {
    pub label: String,
    #[serde(flatten)]
    pub fields: OligonucleotideFields,
}

#[derive(Serialize)]
pub struct OligonucleotideDetail {
    #[serde(flatten)]
    pub oligonucleotide: Oligonucleotide,
    pub deletable: bool,
    pub length: usize,
    pub gc_content: f64,
    pub reverse_complement: String,
    pub comments: Vec<Comment>,
    pub requests: Vec<Request>,
    pub files: Vec<FileRecord>,
}

/// GET /oligonucleotides
async fn list(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(filter): Query<OligonucleotideFilter>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<Paginated<Oligonucleotide>>, ApiError> {
    let page = Pagination::from(params);
    let result = OligonucleotideRepo::new(&state.pool)
        .list(user.id(), &filter, page)
        .await?;
    Ok(Json(result))
}

/// POST /oligonucleotides
async fn create(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<OligonucleotidePayload>,
) -> Result<(StatusCode, Json<Oligonucleotide>), ApiError> {
    user.require_role(&["editor"])?;
    let label = EntityLabel::new(&req.label)?;

    let oligo = OligonucleotideRepo::new(&state.pool)
        .create(user.id(), &label, &req.fields, None, false)
        .await?;
    Ok((StatusCode::CREATED, Json(oligo)))
}

/// GET /oligonucleotides/{id}
async fn detail(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<OligonucleotideDetail>, ApiError> {
    let oligo = OligonucleotideRepo::new(&state.pool).get(id).await?;

    let base = EntityRepo::new(&state.pool).base(id).await?;
    entities::check_review_visibility(&base, &user)?;

    Ok(Json(OligonucleotideDetail {
        deletable: base.deletable(state.config.auth.deletable_hours, Utc::now()),
        length: oligo.length(),
        gc_content: sequence::gc_content(&oligo.sequence),
        reverse_complement: sequence::reverse_complement(&oligo.sequence),
        comments: CommentRepo::new(&state.pool).list_for_entity(id).await?,
        requests: RequestRepo::new(&state.pool).list_for_entity(id).await?,
        files: FileRepo::new(&state.pool).list_for_entity(id).await?,
        oligonucleotide: oligo,
    }))
}

/// PUT /oligonucleotides/{id}
async fn update(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<OligonucleotidePayload>,
) -> Result<Json<Oligonucleotide>, ApiError> {
    entities::authorize_edit(&state, &user, id, EntityKind::Oligonucleotide).await?;
    let label = EntityLabel::new(&req.label)?;

    let oligo = OligonucleotideRepo::new(&state.pool)
        .update(id, &label, &req.fields)
        .await?;
    Ok(Json(oligo))
}

/// DELETE /oligonucleotides/{id}
async fn delete(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    entities::authorize_delete(&state, &user, id, EntityKind::Oligonucleotide).await?;
    EntityRepo::new(&state.pool).delete(id).await?;
    tracing::info!(entity = id, user = user.id(), "oligonucleotide deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /oligonucleotides/export?format=csv|json|fasta
async fn export_list(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(filter): Query<OligonucleotideFilter>,
    Query(params): Query<ExportParams>,
) -> Result<Response, ApiError> {
    let format = ExportFormat::parse(&params.format)?;
    let items = OligonucleotideRepo::new(&state.pool)
        .export(user.id(), &filter)
        .await?;

    let bytes = match format {
        ExportFormat::Csv => export::to_csv(&items)?,
        ExportFormat::Json => export::to_json(&items)?,
        ExportFormat::Fasta => export::oligos_to_fasta(&items),
    };

    let name = export::filename(EntityKind::Oligonucleotide.display_name(), format);
    Ok(download_response(bytes, &name, format.content_type()))
}

/// Oligonucleotide routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/oligonucleotides", get(list).post(create))
        .route("/oligonucleotides/export", get(export_list))
        .route(
            "/oligonucleotides/{id}",
            get(detail).put(update).delete(delete),
        )
}
