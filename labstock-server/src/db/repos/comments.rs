//! Comment repository.
//!
//! Comments attach to any entity. Only the author may edit or delete their
//! comment; the HTTP layer enforces that with [`Comment::user_id`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};

use super::DbError;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Comment {
    pub id: i64,
    pub entity_id: i64,
    pub user_id: i64,
    pub username: String,
    pub subject: Option<String>,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

const SELECT_HEAD: &str = "SELECT c.id, c.entity_id, c.user_id, u.username, c.subject, c.body, \
     c.created_at, c.updated_at FROM comments c JOIN users u ON u.id = c.user_id";

pub struct CommentRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> CommentRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn list_for_entity(&self, entity_id: i64) -> Result<Vec<Comment>, DbError> {
        let sql = format!("{SELECT_HEAD} WHERE c.entity_id = $1 ORDER BY c.created_at DESC, c.id");
        let rows = sqlx::query_as(&sql)
            .bind(entity_id)
            .fetch_all(self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn create(
        &self,
        entity_id: i64,
        user_id: i64,
        subject: Option<&str>,
        body: &str,
    ) -> Result<Comment, DbError> {
        if body.trim().is_empty() {
            return Err(DbError::Invalid("comment body must not be empty".into()));
        }

        let row: (i64,) = sqlx::query_as(
            "INSERT INTO comments (entity_id, user_id, subject, body) \
             VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(entity_id)
        .bind(user_id)
        .bind(subject)
        .bind(body)
        .fetch_one(self.pool)
        .await?;

        self.get(row.0).await
    }

    pub async fn get(&self, id: i64) -> Result<Comment, DbError> {
        let sql = format!("{SELECT_HEAD} WHERE c.id = $1");
        sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("comment", id))
    }

    pub async fn update(
        &self,
        id: i64,
        subject: Option<&str>,
        body: &str,
    ) -> Result<Comment, DbError> {
        if body.trim().is_empty() {
            return Err(DbError::Invalid("comment body must not be empty".into()));
        }

        let result = sqlx::query(
            "UPDATE comments SET subject = $2, body = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(subject)
        .bind(body)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("comment", id));
        }
        self.get(id).await
    }

    pub async fn delete(&self, id: i64) -> Result<(), DbError> {
        let result = sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("comment", id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires database"]
    async fn comment_lifecycle() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = crate::db::create_pool(&url, 2).await.expect("pool");
        crate::db::migrations::run(&pool).await.expect("migrations");

        let users = super::super::UserRepo::new(&pool);
        let user = users
            .create("comment-test", "comment@lab.example", "h", false, &[])
            .await
            .expect("user");

        let label = crate::models::EntityLabel::new("commented-entity").unwrap();
        let mut tx = pool.begin().await.unwrap();
        let base = super::super::entities::insert_base(
            &mut *tx,
            &label,
            crate::models::EntityKind::Plasmid,
            user.id,
            None,
            false,
        )
        .await
        .expect("entity");
        tx.commit().await.unwrap();

        let repo = CommentRepo::new(&pool);
        let comment = repo
            .create(base.id, user.id, Some("aliquots"), "moved to box 4")
            .await
            .expect("create");
        assert_eq!(comment.username, "comment-test");

        let updated = repo
            .update(comment.id, None, "moved to box 5")
            .await
            .expect("update");
        assert!(updated.updated_at.is_some());

        repo.delete(comment.id).await.expect("delete");
        assert!(matches!(
            repo.get(comment.id).await.unwrap_err(),
            DbError::NotFound { .. }
        ));
    }
}
