//! Request repository.
//!
//! Requests record that an external lab asked for an entity, and when the
//! material was sent out.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

use super::DbError;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Request {
    pub id: i64,
    pub entity_id: i64,
    pub requested_by: String,
    pub requested_on: NaiveDate,
    pub sent_on: Option<NaiveDate>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestFields {
    pub requested_by: String,
    pub requested_on: Option<NaiveDate>,
    pub sent_on: Option<NaiveDate>,
    pub note: Option<String>,
}

const REQUEST_COLUMNS: &str = "id, entity_id, requested_by, requested_on, sent_on, note";

pub struct RequestRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> RequestRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn list_for_entity(&self, entity_id: i64) -> Result<Vec<Request>, DbError> {
        let rows = sqlx::query_as(&format!(
            "SELECT {REQUEST_COLUMNS} FROM requests WHERE entity_id = $1 \
             ORDER BY requested_on DESC, id"
        ))
        .bind(entity_id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn create(&self, entity_id: i64, fields: &RequestFields) -> Result<Request, DbError> {
        if fields.requested_by.trim().is_empty() {
            return Err(DbError::Invalid("requested_by must not be empty".into()));
        }

        let row = sqlx::query_as(&format!(
            "INSERT INTO requests (entity_id, requested_by, requested_on, sent_on, note) \
             VALUES ($1, $2, COALESCE($3, CURRENT_DATE), $4, $5) RETURNING {REQUEST_COLUMNS}"
        ))
        .bind(entity_id)
        .bind(&fields.requested_by)
        .bind(fields.requested_on)
        .bind(fields.sent_on)
        .bind(&fields.note)
        .fetch_one(self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get(&self, id: i64) -> Result<Request, DbError> {
        sqlx::query_as(&format!(
            "SELECT {REQUEST_COLUMNS} FROM requests WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("request", id))
    }

    pub async fn update(&self, id: i64, fields: &RequestFields) -> Result<Request, DbError> {
        if fields.requested_by.trim().is_empty() {
            return Err(DbError::Invalid("requested_by must not be empty".into()));
        }

        sqlx::query_as(&format!(
            "UPDATE requests SET requested_by = $2, requested_on = COALESCE($3, requested_on), \
             sent_on = $4, note = $5 WHERE id = $1 RETURNING {REQUEST_COLUMNS}"
        ))
        .bind(id)
        .bind(&fields.requested_by)
        .bind(fields.requested_on)
        .bind(fields.sent_on)
        .bind(&fields.note)
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("request", id))
    }

    /// Record that the material went out today. Already-sent requests keep
    /// their original date.
    pub async fn mark_sent(&self, id: i64) -> Result<Request, DbError> {
        sqlx::query("UPDATE requests SET sent_on = CURRENT_DATE WHERE id = $1 AND sent_on IS NULL")
            .bind(id)
            .execute(self.pool)
            .await?;
        self.get(id).await
    }

    pub async fn delete(&self, id: i64) -> Result<(), DbError> {
        let result = sqlx::query("DELETE FROM requests WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("request", id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires database"]
    async fn request_defaults_to_today() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = crate::db::create_pool(&url, 2).await.expect("pool");
        crate::db::migrations::run(&pool).await.expect("migrations");

        let users = super::super::UserRepo::new(&pool);
        let user = users
            .create("req-test", "req@lab.example", "h", false, &[])
            .await
            .expect("user");

        let label = crate::models::EntityLabel::new("requested-entity").unwrap();
        let mut tx = pool.begin().await.unwrap();
        let base = super::super::entities::insert_base(
            &mut *tx,
            &label,
            crate::models::EntityKind::Antibody,
            user.id,
            None,
            false,
        )
        .await
        .expect("entity");
        tx.commit().await.unwrap();

        let repo = RequestRepo::new(&pool);
        let request = repo
            .create(
                base.id,
                &RequestFields {
                    requested_by: "Smith lab".into(),
                    requested_on: None,
                    sent_on: None,
                    note: None,
                },
            )
            .await
            .expect("create");
        assert!(request.sent_on.is_none());

        let sent = repo.mark_sent(request.id).await.expect("mark sent");
        assert!(sent.sent_on.is_some());
    }
}
