//! Custom Axum extractors.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;

use super::error::ApiError;
use crate::auth;
use crate::db::repos::users::UserWithRoles;
use crate::db::repos::{SessionRepo, UserRepo};
use crate::state::AppState;

/// The authenticated user behind the request's session cookie.
///
/// Rejects with 401 when the cookie is missing, the session is expired, or
/// the account is inactive.
pub struct AuthUser {
    pub user: UserWithRoles,
    pub token: String,
}

impl AuthUser {
    pub fn id(&self) -> i64 {
        self.user.user.id
    }

    pub fn is_admin(&self) -> bool {
        self.user.user.is_admin || self.user.roles.iter().any(|r| r == "admin")
    }

    /// 403 unless the user holds one of the roles (admins always pass).
    pub fn require_role(&self, allowed: &[&str]) -> Result<(), ApiError> {
        if self.user.has_any_role(allowed) {
            Ok(())
        } else {
            Err(ApiError::Forbidden {
                reason: format!("requires one of the roles: {}", allowed.join(", ")),
            })
        }
    }

    /// 403 unless the user owns the resource or is an admin.
    pub fn require_owner(&self, owner_id: i64) -> Result<(), ApiError> {
        if self.is_admin() || self.id() == owner_id {
            Ok(())
        } else {
            Err(ApiError::Forbidden {
                reason: "only the owner may do this".into(),
            })
        }
    }
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let cookie_header = parts
            .headers
            .get(header::COOKIE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        let token = auth::token_from_cookie_header(cookie_header)
            .ok_or_else(ApiError::unauthenticated)?;

        let user_id = SessionRepo::new(&state.pool)
            .user_id_for(token)
            .await?
            .ok_or_else(ApiError::unauthenticated)?;

        let user = UserRepo::new(&state.pool).get_with_roles(user_id).await?;
        if !user.user.is_active() {
            return Err(ApiError::unauthenticated());
        }

        Ok(Self {
            user,
            token: token.to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repos::users::User;
    use chrono::Utc;

    fn auth_user(is_admin: bool, roles: &[&str]) -> AuthUser {
        AuthUser {
            user: UserWithRoles {
                user: User {
                    id: 5,
                    username: "jdoe".into(),
                    email: "jdoe@lab.example".into(),
                    password_hash: String::new(),
                    timezone: "UTC".into(),
                    status: "active".into(),
                    is_admin,
                    created_at: Utc::now(),
                    last_login_at: None,
                },
                roles: roles.iter().map(|r| r.to_string()).collect(),
            },
            token: "t".into(),
        }
    }

    #[test]
    fn role_gate() {
        assert!(auth_user(false, &["editor"]).require_role(&["editor"]).is_ok());
        assert!(auth_user(false, &["viewer"]).require_role(&["editor"]).is_err());
        assert!(auth_user(true, &[]).require_role(&["editor"]).is_ok());
    }

    #[test]
    fn owner_gate() {
        assert!(auth_user(false, &[]).require_owner(5).is_ok());
        assert!(auth_user(false, &[]).require_owner(6).is_err());
        assert!(auth_user(true, &[]).require_owner(6).is_ok());
    }
}
