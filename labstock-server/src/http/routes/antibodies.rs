//! Antibody endpoints.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{download_response, entities};
use crate::db::repos::antibodies::{Antibody, AntibodyFields, AntibodyFilter, Dilution};
use crate::db::repos::batches::{Batch, BatchFilter};
use crate::db::repos::comments::Comment;
use crate::db::repos::files::FileRecord;
use crate::db::repos::requests::Request;
use crate::db::repos::{
    AntibodyRepo, BatchRepo, CommentRepo, EntityRepo, FileRepo, RequestRepo,
};
use crate::export::{self, ExportFormat};
use crate::http::error::ApiError;
use crate::http::extractors::AuthUser;
use crate::models::{EntityKind, EntityLabel, Paginated, Pagination, PaginationParams};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct AntibodyPayload {
    pub label: String,
    #[serde(flatten)]
    pub fields: AntibodyFields,
}

#[derive(Serialize)]
pub struct AntibodyDetail {
    #[serde(flatten)]
    pub antibody: Antibody,
    pub deletable: bool,
    pub dilutions: Vec<Dilution>,
    pub batches: Vec<Batch>,
    pub comments: Vec<Comment>,
    pub requests: Vec<Request>,
    pub files: Vec<FileRecord>,
}

#[derive(Deserialize)]
pub struct DilutionPayload {
    pub application: String,
    pub dilution: String,
    pub reference: String,
}

#[derive(Deserialize)]
pub struct ExportParams {
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_format() -> String {
    "csv".to_owned()
}

/// GET /antibodies - filtered, paginated list
async fn list(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(filter): Query<AntibodyFilter>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<Paginated<Antibody>>, ApiError> {
    let page = Pagination::from(params);
    let result = AntibodyRepo::new(&state.pool)
        .list(user.id(), &filter, page)
        .await?;
    Ok(Json(result))
}

/// POST /antibodies - create
async fn create(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<AntibodyPayload>,
) -> Result<(StatusCode, Json<Antibody>), ApiError> {
    user.require_role(&["editor"])?;
    req.fields.validate()?;
    let label = EntityLabel::new(&req.label)?;

    let antibody = AntibodyRepo::new(&state.pool)
        .create(user.id(), &label, &req.fields, None, false)
        .await?;
    Ok((StatusCode::CREATED, Json(antibody)))
}

/// GET /antibodies/{id} - detail with child collections
async fn detail(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<AntibodyDetail>, ApiError> {
    let repo = AntibodyRepo::new(&state.pool);
    let antibody = repo.get(id).await?;

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

    Ok(Json(AntibodyDetail {
        deletable: base.deletable(state.config.auth.deletable_hours, Utc::now()),
        dilutions: repo.dilutions(id).await?,
        batches,
        comments: CommentRepo::new(&state.pool).list_for_entity(id).await?,
        requests: RequestRepo::new(&state.pool).list_for_entity(id).await?,
        files: FileRepo::new(&state.pool).list_for_entity(id).await?,
        antibody,
    }))
}

/// PUT /antibodies/{id} - edit (owner or admin)
async fn update(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<AntibodyPayload>,
) -> Result<Json<Antibody>, ApiError> {
    entities::authorize_edit(&state, &user, id, EntityKind::Antibody).await?;
    req.fields.validate()?;
    let label = EntityLabel::new(&req.label)?;

    let antibody = AntibodyRepo::new(&state.pool)
        .update(id, &label, &req.fields)
        .await?;
    Ok(Json(antibody))
}

/// DELETE /antibodies/{id}
async fn delete(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    entities::authorize_delete(&state, &user, id, EntityKind::Antibody).await?;
    EntityRepo::new(&state.pool).delete(id).await?;
    tracing::info!(entity = id, user = user.id(), "antibody deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /antibodies/export?format=csv|json - dump the filtered set
async fn export_list(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(filter): Query<AntibodyFilter>,
    Query(params): Query<ExportParams>,
) -> Result<Response, ApiError> {
    let format = ExportFormat::parse(&params.format)?;
    let items = AntibodyRepo::new(&state.pool)
        .export(user.id(), &filter)
        .await?;

    let bytes = match format {
        ExportFormat::Csv => export::to_csv(&items)?,
        ExportFormat::Json => export::to_json(&items)?,
        ExportFormat::Fasta => {
            return Err(crate::export::ExportError::FastaUnsupported { kind: "antibodies" }.into())
        }
    };

    let name = export::filename(EntityKind::Antibody.display_name(), format);
    Ok(download_response(bytes, &name, format.content_type()))
}

/// POST /antibodies/{id}/dilutions
async fn add_dilution(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<DilutionPayload>,
) -> Result<(StatusCode, Json<Dilution>), ApiError> {
    user.require_role(&["editor"])?;
    EntityRepo::new(&state.pool)
        .base_of_kind(id, EntityKind::Antibody)
        .await?;

    let dilution = AntibodyRepo::new(&state.pool)
        .add_dilution(id, user.id(), &req.application, &req.dilution, &req.reference)
        .await?;
    Ok((StatusCode::CREATED, Json(dilution)))
}

/// PUT /dilutions/{id} - only the recording user or an admin
async fn update_dilution(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<DilutionPayload>,
) -> Result<Json<Dilution>, ApiError> {
    let repo = AntibodyRepo::new(&state.pool);
    let existing = repo.get_dilution(id).await?;
    user.require_owner(existing.user_id)?;

    let dilution = repo
        .update_dilution(id, &req.application, &req.dilution, &req.reference)
        .await?;
    Ok(Json(dilution))
}

/// DELETE /dilutions/{id}
async fn delete_dilution(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let repo = AntibodyRepo::new(&state.pool);
    let existing = repo.get_dilution(id).await?;
    user.require_owner(existing.user_id)?;

    repo.delete_dilution(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Antibody routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/antibodies", get(list).post(create))
        .route("/antibodies/export", get(export_list))
        .route("/antibodies/{id}", get(detail).put(update).delete(delete))
        .route("/antibodies/{id}/dilutions", post(add_dilution))
        .route(
            "/dilutions/{id}",
            put(update_dilution).delete(delete_dilution),
        )
}

#[cfg(test)]
mod tests {
    // Handler logic is covered by the repository unit tests plus the ignored
    // DB round-trips; the shared pieces (ApiError mapping, auth gates) have
    // their own tests.
}
