//! File metadata repository.
//!
//! File contents live on disk under the configured upload directory; the
//! database row is created first so the on-disk name can be derived from
//! the row id (`0000042.pdf`). That keeps disk names unique and free of
//! user input.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use std::path::Path;

use super::DbError;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct FileRecord {
    pub id: i64,
    pub user_id: i64,
    pub entity_id: Option<i64>,
    pub exposed_name: String,
    pub stored_name: Option<String>,
    pub note: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

const FILE_COLUMNS: &str = "id, user_id, entity_id, exposed_name, stored_name, note, uploaded_at";

/// Disk name derived from the row id plus the upload's extension.
fn stored_name(id: i64, exposed_name: &str) -> String {
    match Path::new(exposed_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
    {
        Some(ext) => format!("{id:07}.{}", ext.to_ascii_lowercase()),
        None => format!("{id:07}"),
    }
}

pub struct FileRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> FileRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Register an upload: insert the row, then fill in the derived disk
    /// name. The caller writes the bytes after this returns.
    pub async fn register(
        &self,
        user_id: i64,
        entity_id: Option<i64>,
        exposed_name: &str,
        note: Option<&str>,
    ) -> Result<FileRecord, DbError> {
        if exposed_name.trim().is_empty() {
            return Err(DbError::Invalid("file name must not be empty".into()));
        }

        let mut tx: Transaction<'_, Postgres> = self.pool.begin().await?;

        let row: (i64,) = sqlx::query_as(
            "INSERT INTO files (user_id, entity_id, exposed_name, note) \
             VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(user_id)
        .bind(entity_id)
        .bind(exposed_name)
        .bind(note)
        .fetch_one(&mut *tx)
        .await?;

        let name = stored_name(row.0, exposed_name);
        let record = sqlx::query_as(&format!(
            "UPDATE files SET stored_name = $2 WHERE id = $1 RETURNING {FILE_COLUMNS}"
        ))
        .bind(row.0)
        .bind(&name)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(record)
    }

    pub async fn get(&self, id: i64) -> Result<FileRecord, DbError> {
        sqlx::query_as(&format!("SELECT {FILE_COLUMNS} FROM files WHERE id = $1"))
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("file", id))
    }

    pub async fn list_for_entity(&self, entity_id: i64) -> Result<Vec<FileRecord>, DbError> {
        let rows = sqlx::query_as(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE entity_id = $1 ORDER BY uploaded_at DESC, id"
        ))
        .bind(entity_id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Update the user-visible name and/or note. The disk name never
    /// changes after registration.
    pub async fn update_meta(
        &self,
        id: i64,
        exposed_name: Option<&str>,
        note: Option<&str>,
    ) -> Result<FileRecord, DbError> {
        if let Some(name) = exposed_name {
            if name.trim().is_empty() {
                return Err(DbError::Invalid("file name must not be empty".into()));
            }
        }

        sqlx::query_as(&format!(
            "UPDATE files SET exposed_name = COALESCE($2, exposed_name), note = $3 \
             WHERE id = $1 RETURNING {FILE_COLUMNS}"
        ))
        .bind(id)
        .bind(exposed_name)
        .bind(note)
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("file", id))
    }

    /// Delete the row, returning the disk name so the caller can unlink it.
    pub async fn delete(&self, id: i64) -> Result<Option<String>, DbError> {
        let record = self.get(id).await?;
        sqlx::query("DELETE FROM files WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(record.stored_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_name_is_zero_padded() {
        assert_eq!(stored_name(42, "blot.PDF"), "0000042.pdf");
        assert_eq!(stored_name(1234567, "image.png"), "1234567.png");
    }

    #[test]
    fn stored_name_without_extension() {
        assert_eq!(stored_name(7, "README"), "0000007");
        assert_eq!(stored_name(7, "archive."), "0000007");
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn register_fills_stored_name() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = crate::db::create_pool(&url, 2).await.expect("pool");
        crate::db::migrations::run(&pool).await.expect("migrations");

        let users = super::super::UserRepo::new(&pool);
        let user = users
            .create("file-test", "file@lab.example", "h", false, &[])
            .await
            .expect("user");

        let repo = FileRepo::new(&pool);
        let record = repo
            .register(user.id, None, "gel.png", Some("western blot"))
            .await
            .expect("register");
        let name = record.stored_name.expect("stored name");
        assert!(name.ends_with(".png"));
        assert_eq!(name, format!("{:07}.png", record.id));
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn delete_after_failed_write_leaves_no_row() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = crate::db::create_pool(&url, 2).await.expect("pool");
        crate::db::migrations::run(&pool).await.expect("migrations");

        let users = super::super::UserRepo::new(&pool);
        let user = users
            .create("file-rollback-test", "file-rollback@lab.example", "h", false, &[])
            .await
            .expect("user");

        // Upload handlers remove the row again when the disk write fails;
        // no phantom attachment may survive.
        let repo = FileRepo::new(&pool);
        let record = repo
            .register(user.id, None, "gel.png", None)
            .await
            .expect("register");
        repo.delete(record.id).await.expect("delete");

        let err = repo.get(record.id).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
