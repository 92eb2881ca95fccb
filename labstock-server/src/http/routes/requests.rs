//! Material request endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};

use crate::db::repos::requests::{Request, RequestFields};
use crate::db::repos::{EntityRepo, RequestRepo};
use crate::http::error::ApiError;
use crate::http::extractors::AuthUser;
use crate::state::AppState;

/// GET /entities/{id}/requests
async fn list(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Request>>, ApiError> {
    EntityRepo::new(&state.pool).base(id).await?;
    let requests = RequestRepo::new(&state.pool).list_for_entity(id).await?;
    Ok(Json(requests))
}

/// POST /entities/{id}/requests
async fn create(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(fields): Json<RequestFields>,
) -> Result<(StatusCode, Json<Request>), ApiError> {
    user.require_role(&["editor"])?;
    EntityRepo::new(&state.pool).base(id).await?;

    let request = RequestRepo::new(&state.pool).create(id, &fields).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

/// PUT /requests/{id}
async fn update(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(fields): Json<RequestFields>,
) -> Result<Json<Request>, ApiError> {
    user.require_role(&["editor"])?;
    let request = RequestRepo::new(&state.pool).update(id, &fields).await?;
    Ok(Json(request))
}

/// POST /requests/{id}/sent - record that the material went out
async fn mark_sent(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Request>, ApiError> {
    user.require_role(&["editor"])?;
    let request = RequestRepo::new(&state.pool).mark_sent(id).await?;
    Ok(Json(request))
}

/// DELETE /requests/{id}
async fn delete(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    user.require_role(&["editor"])?;
    RequestRepo::new(&state.pool).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Request routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/entities/{id}/requests", get(list).post(create))
        .route("/requests/{id}", put(update).delete(delete))
        .route("/requests/{id}/sent", post(mark_sent))
}
