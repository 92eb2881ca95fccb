//! Session repository.
//!
//! Sessions are opaque tokens with a server-side expiry. Expired rows are
//! swept opportunistically on login.

use chrono::{Duration, Utc};
use sqlx::{PgPool, Row};

use super::DbError;
use crate::auth;

pub struct SessionRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> SessionRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Create a session for a user, returning the fresh token.
    pub async fn create(&self, user_id: i64, ttl_hours: i64) -> Result<String, DbError> {
        let token = auth::generate_token();
        let expires_at = Utc::now() + Duration::hours(ttl_hours);

        sqlx::query("INSERT INTO sessions (token, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(&token)
            .bind(user_id)
            .bind(expires_at)
            .execute(self.pool)
            .await?;

        Ok(token)
    }

    /// Resolve a token to its user id, if the session is still valid.
    pub async fn user_id_for(&self, token: &str) -> Result<Option<i64>, DbError> {
        let row = sqlx::query(
            "SELECT user_id FROM sessions WHERE token = $1 AND expires_at > NOW()",
        )
        .bind(token)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(|r| r.get("user_id")))
    }

    /// Delete a session (logout). Deleting an unknown token is not an error.
    pub async fn delete(&self, token: &str) -> Result<(), DbError> {
        sqlx::query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Remove expired sessions.
    pub async fn purge_expired(&self) -> Result<u64, DbError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= NOW()")
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires database"]
    async fn session_roundtrip() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = crate::db::create_pool(&url, 2).await.expect("pool");
        crate::db::migrations::run(&pool).await.expect("migrations");

        let users = super::super::UserRepo::new(&pool);
        let user = users
            .create("sess-test", "sess@lab.example", "h", false, &[])
            .await
            .expect("user");

        let repo = SessionRepo::new(&pool);
        let token = repo.create(user.id, 1).await.expect("session");
        assert_eq!(repo.user_id_for(&token).await.unwrap(), Some(user.id));

        repo.delete(&token).await.expect("delete");
        assert_eq!(repo.user_id_for(&token).await.unwrap(), None);
    }
}
