//! Authentication endpoints: login, logout, registration, password change.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::auth;
use crate::db::migrations::ROLES;
use crate::db::repos::{SessionRepo, UserRepo};
use crate::http::error::ApiError;
use crate::http::extractors::AuthUser;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct LoginRequest {
    /// Username or email.
    pub login: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub is_admin: bool,
}

#[derive(Deserialize)]
pub struct PasswordChangeRequest {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub is_admin: bool,
    pub roles: Vec<String>,
}

impl From<crate::db::repos::users::UserWithRoles> for UserResponse {
    fn from(u: crate::db::repos::users::UserWithRoles) -> Self {
        Self {
            id: u.user.id,
            username: u.user.username,
            email: u.user.email,
            is_admin: u.user.is_admin,
            roles: u.roles,
        }
    }
}

const MIN_PASSWORD_LEN: usize = 8;

/// Well-formed hash that matches no password; verified against when the
/// login name is unknown so response timing does not reveal user existence.
const DUMMY_HASH: &str = "$argon2id$v=19$m=19456,t=2,p=1$MDAwMDAwMDAwMDAwMDAwMA$AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

/// POST /auth/login
async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    let users = UserRepo::new(&state.pool);

    let user = users.find_by_name_or_email(req.login.trim()).await?;
    let valid = match &user {
        Some(user) => auth::verify_password(&req.password, &user.password_hash),
        None => {
            auth::verify_password(&req.password, DUMMY_HASH);
            false
        }
    };

    let user = match (user, valid) {
        (Some(user), true) if user.is_active() => user,
        _ => {
            return Err(ApiError::Unauthorized {
                message: "invalid credentials".into(),
            })
        }
    };

    let sessions = SessionRepo::new(&state.pool);
    sessions.purge_expired().await?;
    let ttl = state.config.auth.session_ttl_hours;
    let token = sessions.create(user.id, ttl).await?;
    users.touch_last_login(user.id).await?;

    tracing::info!(user = %user.username, "login");

    let body = UserResponse::from(users.get_with_roles(user.id).await?);
    Ok((
        [(header::SET_COOKIE, auth::session_cookie(&token, ttl))],
        Json(body),
    )
        .into_response())
}

/// POST /auth/logout
async fn logout(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Response, ApiError> {
    SessionRepo::new(&state.pool).delete(&user.token).await?;
    Ok((
        StatusCode::NO_CONTENT,
        [(header::SET_COOKIE, auth::clear_session_cookie())],
    )
        .into_response())
}

/// GET /auth/me
async fn me(user: AuthUser) -> Json<UserResponse> {
    Json(UserResponse::from(user.user))
}

/// POST /auth/register - create a user (user-editor or admin only)
async fn register(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    user.require_role(&["user-editor"])?;
    if req.is_admin && !user.is_admin() {
        return Err(ApiError::Forbidden {
            reason: "only admins may create admins".into(),
        });
    }

    let username = req.username.trim();
    if username.is_empty() {
        return Err(ApiError::BadRequest {
            message: "username must not be empty".into(),
        });
    }
    if !req.email.contains('@') {
        return Err(ApiError::BadRequest {
            message: "email address looks invalid".into(),
        });
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::BadRequest {
            message: format!("password must be at least {MIN_PASSWORD_LEN} characters"),
        });
    }
    for role in &req.roles {
        if !ROLES.contains(&role.as_str()) {
            return Err(ApiError::BadRequest {
                message: format!("unknown role '{role}'"),
            });
        }
    }

    let hash = auth::hash_password(&req.password).map_err(|e| ApiError::Internal {
        message: format!("password hashing failed: {e}"),
    })?;

    let users = UserRepo::new(&state.pool);
    let created = users
        .create(username, req.email.trim(), &hash, req.is_admin, &req.roles)
        .await?;

    tracing::info!(user = %created.username, by = %user.user.user.username, "user created");

    let body = UserResponse::from(users.get_with_roles(created.id).await?);
    Ok((StatusCode::CREATED, Json(body)))
}

/// PUT /auth/password - change own password
async fn change_password(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<PasswordChangeRequest>,
) -> Result<StatusCode, ApiError> {
    if !auth::verify_password(&req.old_password, &user.user.user.password_hash) {
        return Err(ApiError::Forbidden {
            reason: "old password does not match".into(),
        });
    }
    if req.new_password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::BadRequest {
            message: format!("password must be at least {MIN_PASSWORD_LEN} characters"),
        });
    }

    let hash = auth::hash_password(&req.new_password).map_err(|e| ApiError::Internal {
        message: format!("password hashing failed: {e}"),
    })?;
    UserRepo::new(&state.pool)
        .set_password_hash(user.id(), &hash)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Auth routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
        .route("/auth/register", post(register))
        .route("/auth/password", put(change_password))
}

#[cfg(test)]
mod tests {
    // Session flow is covered by ignored DB tests in the repositories; the
    // pure pieces (hashing, cookie parsing) are tested in crate::auth.
}
