//! Cross-kind entity endpoints and shared authorization checks.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use chrono::Utc;

use crate::db::repos::EntityRepo;
use crate::http::error::ApiError;
use crate::http::extractors::AuthUser;
use crate::models::{EntityBase, EntityKind};
use crate::state::AppState;

/// Owner-or-admin check for editing an entity of a known kind.
pub(crate) async fn authorize_edit(
    state: &AppState,
    user: &AuthUser,
    id: i64,
    kind: EntityKind,
) -> Result<EntityBase, ApiError> {
    user.require_role(&["editor"])?;
    let base = EntityRepo::new(&state.pool).base_of_kind(id, kind).await?;
    user.require_owner(base.owner_id)?;
    Ok(base)
}

/// Deletion additionally requires the entity to still be deletable:
/// under review, or younger than the configured window. Admins bypass
/// the window.
pub(crate) async fn authorize_delete(
    state: &AppState,
    user: &AuthUser,
    id: i64,
    kind: EntityKind,
) -> Result<EntityBase, ApiError> {
    let base = authorize_edit(state, user, id, kind).await?;

    if !user.is_admin() && !base.deletable(state.config.auth.deletable_hours, Utc::now()) {
        return Err(ApiError::Forbidden {
            reason: format!(
                "entities older than {} hours can only be deleted by an admin",
                state.config.auth.deletable_hours
            ),
        });
    }
    Ok(base)
}

/// Under-review entities are visible only to their importer.
pub(crate) fn check_review_visibility(base: &EntityBase, user: &AuthUser) -> Result<(), ApiError> {
    if base.under_review && !user.is_admin() && base.owner_id != user.id() {
        return Err(ApiError::NotFound {
            resource: "entity",
            id: base.id.to_string(),
        });
    }
    Ok(())
}

/// POST /entities/{id}/confirm - clear the review flag after checking an
/// imported entity. Owner or admin.
async fn confirm_review(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let repo = EntityRepo::new(&state.pool);
    let base = repo.base(id).await?;
    user.require_owner(base.owner_id)?;

    if !base.under_review {
        return Err(ApiError::BadRequest {
            message: "entity is not under review".into(),
        });
    }
    repo.confirm_review(id).await?;
    tracing::info!(entity = id, user = user.id(), "review confirmed");
    Ok(StatusCode::NO_CONTENT)
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/entities/{id}/confirm", post(confirm_review))
}
