//! Comment endpoints. Only the author (or an admin) may edit or delete.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::Deserialize;

use crate::db::repos::comments::Comment;
use crate::db::repos::{CommentRepo, EntityRepo};
use crate::http::error::ApiError;
use crate::http::extractors::AuthUser;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CommentPayload {
    pub subject: Option<String>,
    pub body: String,
}

/// GET /entities/{id}/comments
async fn list(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Comment>>, ApiError> {
    EntityRepo::new(&state.pool).base(id).await?;
    let comments = CommentRepo::new(&state.pool).list_for_entity(id).await?;
    Ok(Json(comments))
}

/// POST /entities/{id}/comments
async fn create(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<CommentPayload>,
) -> Result<(StatusCode, Json<Comment>), ApiError> {
    EntityRepo::new(&state.pool).base(id).await?;
    let comment = CommentRepo::new(&state.pool)
        .create(id, user.id(), req.subject.as_deref(), &req.body)
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

/// PUT /comments/{id}
async fn update(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<CommentPayload>,
) -> Result<Json<Comment>, ApiError> {
    let repo = CommentRepo::new(&state.pool);
    let existing = repo.get(id).await?;
    user.require_owner(existing.user_id)?;

    let comment = repo.update(id, req.subject.as_deref(), &req.body).await?;
    Ok(Json(comment))
}

/// DELETE /comments/{id}
async fn delete(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let repo = CommentRepo::new(&state.pool);
    let existing = repo.get(id).await?;
    user.require_owner(existing.user_id)?;

    repo.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Comment routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/entities/{id}/comments", get(list).post(create))
        .route("/comments/{id}", put(update).delete(delete))
}
