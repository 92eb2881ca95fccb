//! Shared base-entity operations.
//!
//! Every entity kind stores its common columns in the `entities` table;
//! the kind-specific repositories call into here for the shared half of
//! create/update/delete.

use sqlx::{PgConnection, PgPool};

use super::DbError;
use crate::models::{EntityBase, EntityKind, EntityLabel};

pub const ENTITY_COLUMNS: &str =
    "id, label, entity_type, owner_id, origin, under_review, created_at, updated_at";

/// Insert the base row inside a caller-provided transaction.
///
/// Kind-specific repositories insert their detail row right after, so both
/// rows commit or roll back together.
pub async fn insert_base(
    conn: &mut PgConnection,
    label: &EntityLabel,
    kind: EntityKind,
    owner_id: i64,
    origin: Option<&str>,
    under_review: bool,
) -> Result<EntityBase, DbError> {
    let base: EntityBase = sqlx::query_as(&format!(
        "INSERT INTO entities (label, entity_type, owner_id, origin, under_review) \
         VALUES ($1, $2, $3, $4, $5) RETURNING {ENTITY_COLUMNS}"
    ))
    .bind(label.as_str())
    .bind(kind.as_str())
    .bind(owner_id)
    .bind(origin)
    .bind(under_review)
    .fetch_one(conn)
    .await?;

    Ok(base)
}

/// Update the label and bump `updated_at` inside a transaction.
pub async fn update_base(
    conn: &mut PgConnection,
    id: i64,
    label: &EntityLabel,
) -> Result<(), DbError> {
    let result = sqlx::query("UPDATE entities SET label = $2, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .bind(label.as_str())
        .execute(conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("entity", id));
    }
    Ok(())
}

pub struct EntityRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> EntityRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Load the base row of any entity.
    pub async fn base(&self, id: i64) -> Result<EntityBase, DbError> {
        sqlx::query_as(&format!(
            "SELECT {ENTITY_COLUMNS} FROM entities WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("entity", id))
    }

    /// Load the base row, checking the expected kind.
    pub async fn base_of_kind(&self, id: i64, kind: EntityKind) -> Result<EntityBase, DbError> {
        let base = self.base(id).await?;
        if base.entity_type != kind.as_str() {
            return Err(DbError::not_found(kind.as_str(), id));
        }
        Ok(base)
    }

    /// Delete an entity; detail rows, comments, files, batches, and requests
    /// cascade via foreign keys.
    pub async fn delete(&self, id: i64) -> Result<(), DbError> {
        let result = sqlx::query("DELETE FROM entities WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("entity", id));
        }
        Ok(())
    }

    /// Clear the review flag after a user confirmed an imported entity.
    ///
    /// One-way: once cleared, the flag can never be set again.
    pub async fn confirm_review(&self, id: i64) -> Result<(), DbError> {
        let result = sqlx::query(
            "UPDATE entities SET under_review = FALSE, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("entity", id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires database"]
    async fn label_uniqueness_spans_kinds() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = crate::db::create_pool(&url, 2).await.expect("pool");
        crate::db::migrations::run(&pool).await.expect("migrations");

        let users = super::super::UserRepo::new(&pool);
        let owner = users
            .create("entity-test", "entity@lab.example", "h", false, &[])
            .await
            .expect("user");

        let label = EntityLabel::new("shared-label").unwrap();

        let mut tx = pool.begin().await.unwrap();
        insert_base(&mut *tx, &label, EntityKind::Antibody, owner.id, None, false)
            .await
            .expect("first insert");
        tx.commit().await.unwrap();

        let mut tx = pool.begin().await.unwrap();
        let err = insert_base(&mut *tx, &label, EntityKind::Plasmid, owner.id, None, false)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Conflict { .. }));
    }
}
