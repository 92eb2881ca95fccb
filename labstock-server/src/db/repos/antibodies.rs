//! Antibody repository.
//!
//! Antibodies are consumables: they carry batches in addition to the usual
//! comments, files, and requests. Working dilutions live in their own table
//! keyed by antibody.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Row};

use super::entities::{insert_base, update_base};
use super::DbError;
use crate::db::filter::{ListQuery, OrderBy};
use crate::models::{EntityKind, EntityLabel, Paginated, Pagination, ValidationError};

/// Joined base + detail antibody row.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Antibody {
    pub id: i64,
    pub label: String,
    pub owner_id: i64,
    pub origin: Option<String>,
    pub under_review: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub host: String,
    pub antigen: String,
    #[sqlx(rename = "clone")]
    #[serde(rename = "clone")]
    pub clone_name: Option<String>,
    pub specification: Option<String>,
    pub storage_temp: Option<i32>,
    pub source: Option<String>,
    pub conjugate: Option<String>,
    pub storage_info: Option<String>,
}

/// Mutable antibody fields for create/edit.
#[derive(Debug, Clone, Deserialize)]
pub struct AntibodyFields {
    pub host: String,
    pub antigen: String,
    #[serde(rename = "clone")]
    pub clone_name: Option<String>,
    pub specification: Option<String>,
    pub storage_temp: Option<i32>,
    pub source: Option<String>,
    pub conjugate: Option<String>,
    pub storage_info: Option<String>,
}

impl AntibodyFields {
    /// Field-level checks the database cannot express.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.host.trim().is_empty() {
            return Err(ValidationError::Empty { field: "host" });
        }
        if self.antigen.trim().is_empty() {
            return Err(ValidationError::Empty { field: "antigen" });
        }
        if let Some(temp) = self.storage_temp {
            if !(-80..=37).contains(&temp) {
                return Err(ValidationError::OutOfRange {
                    field: "storage temperature",
                    min: -80,
                    max: 37,
                });
            }
        }
        Ok(())
    }
}

/// List filters; every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AntibodyFilter {
    pub label: Option<String>,
    pub host: Option<String>,
    pub antigen: Option<String>,
    pub clone: Option<String>,
    pub conjugate: Option<String>,
    pub order_by: Option<String>,
    pub descending: Option<bool>,
}

/// A working dilution for one application of an antibody.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Dilution {
    pub id: i64,
    pub antibody_id: i64,
    pub user_id: i64,
    pub application: String,
    pub dilution: String,
    pub reference: String,
    pub created_at: DateTime<Utc>,
}

const SELECT_HEAD: &str = "SELECT e.id, e.label, e.owner_id, e.origin, e.under_review, \
     e.created_at, e.updated_at, a.host, a.antigen, a.clone, a.specification, a.storage_temp, \
     a.source, a.conjugate, a.storage_info, COUNT(*) OVER() AS total \
     FROM entities e JOIN antibodies a ON a.entity_id = e.id WHERE TRUE";

const ORDER_COLUMNS: &[(&str, &str)] = &[
    ("label", "e.label"),
    ("id", "e.id"),
    ("host", "a.host"),
    ("antigen", "a.antigen"),
    ("clone", "a.clone"),
    ("conjugate", "a.conjugate"),
];

pub struct AntibodyRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> AntibodyRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Create an antibody (base row + detail row, one transaction).
    pub async fn create(
        &self,
        owner_id: i64,
        label: &EntityLabel,
        fields: &AntibodyFields,
        origin: Option<&str>,
        under_review: bool,
    ) -> Result<Antibody, DbError> {
        let mut tx = self.pool.begin().await?;
        let id = insert_detail(&mut tx, owner_id, label, fields, origin, under_review).await?;
        tx.commit().await?;

        self.get(id).await
    }

    /// Update label and detail fields.
    pub async fn update(
        &self,
        id: i64,
        label: &EntityLabel,
        fields: &AntibodyFields,
    ) -> Result<Antibody, DbError> {
        let mut tx = self.pool.begin().await?;

        update_base(&mut tx, id, label).await?;

        let result = sqlx::query(
            "UPDATE antibodies SET host = $2, antigen = $3, clone = $4, specification = $5, \
             storage_temp = $6, source = $7, conjugate = $8, storage_info = $9 \
             WHERE entity_id = $1",
        )
        .bind(id)
        .bind(&fields.host)
        .bind(&fields.antigen)
        .bind(&fields.clone_name)
        .bind(&fields.specification)
        .bind(fields.storage_temp)
        .bind(&fields.source)
        .bind(&fields.conjugate)
        .bind(&fields.storage_info)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("antibody", id));
        }

        tx.commit().await?;
        self.get(id).await
    }

    /// Load a single antibody.
    pub async fn get(&self, id: i64) -> Result<Antibody, DbError> {
        let sql = format!("{SELECT_HEAD} AND e.id = $1");
        sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("antibody", id))
    }

    /// Filtered, ordered, paginated list.
    pub async fn list(
        &self,
        viewer_id: i64,
        filter: &AntibodyFilter,
        page: Pagination,
    ) -> Result<Paginated<Antibody>, DbError> {
        let mut query = filtered(viewer_id, filter)?;
        query.paginate(page);

        let rows = query.builder().build().fetch_all(self.pool).await?;
        let total = rows.first().map(|r| r.get::<i64, _>("total")).unwrap_or(0);
        let items = rows
            .iter()
            .map(Antibody::from_row)
            .collect::<Result<_, _>>()?;

        Ok(Paginated {
            items,
            total,
            page: page.page,
            per_page: page.per_page,
        })
    }

    /// Full filtered set for export (no pagination).
    pub async fn export(
        &self,
        viewer_id: i64,
        filter: &AntibodyFilter,
    ) -> Result<Vec<Antibody>, DbError> {
        let mut query = filtered(viewer_id, filter)?;
        let rows = query.builder().build().fetch_all(self.pool).await?;
        Ok(rows
            .iter()
            .map(Antibody::from_row)
            .collect::<Result<_, _>>()?)
    }

    /// Dilutions for one antibody, grouped by application.
    pub async fn dilutions(&self, antibody_id: i64) -> Result<Vec<Dilution>, DbError> {
        let rows = sqlx::query_as(
            "SELECT id, antibody_id, user_id, application, dilution, reference, created_at \
             FROM dilutions WHERE antibody_id = $1 \
             ORDER BY application, created_at DESC, id",
        )
        .bind(antibody_id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Record a dilution determined by a user.
    pub async fn add_dilution(
        &self,
        antibody_id: i64,
        user_id: i64,
        application: &str,
        dilution: &str,
        reference: &str,
    ) -> Result<Dilution, DbError> {
        let row = sqlx::query_as(
            "INSERT INTO dilutions (antibody_id, user_id, application, dilution, reference) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, antibody_id, user_id, application, dilution, reference, created_at",
        )
        .bind(antibody_id)
        .bind(user_id)
        .bind(application)
        .bind(dilution)
        .bind(reference)
        .fetch_one(self.pool)
        .await?;
        Ok(row)
    }

    /// Load one dilution.
    pub async fn get_dilution(&self, id: i64) -> Result<Dilution, DbError> {
        sqlx::query_as(
            "SELECT id, antibody_id, user_id, application, dilution, reference, created_at \
             FROM dilutions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("dilution", id))
    }

    pub async fn update_dilution(
        &self,
        id: i64,
        application: &str,
        dilution: &str,
        reference: &str,
    ) -> Result<Dilution, DbError> {
        sqlx::query_as(
            "UPDATE dilutions SET application = $2, dilution = $3, reference = $4 \
             WHERE id = $1 \
             RETURNING id, antibody_id, user_id, application, dilution, reference, created_at",
        )
        .bind(id)
        .bind(application)
        .bind(dilution)
        .bind(reference)
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("dilution", id))
    }

    pub async fn delete_dilution(&self, id: i64) -> Result<(), DbError> {
        let result = sqlx::query("DELETE FROM dilutions WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("dilution", id));
        }
        Ok(())
    }
}

/// Insert base + detail rows on an open transaction; shared with imports.
pub async fn insert_detail(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    owner_id: i64,
    label: &EntityLabel,
    fields: &AntibodyFields,
    origin: Option<&str>,
    under_review: bool,
) -> Result<i64, DbError> {
    fields.validate().map_err(|e| DbError::Invalid(e.to_string()))?;

    let base = insert_base(
        &mut *tx,
        label,
        EntityKind::Antibody,
        owner_id,
        origin,
        under_review,
    )
    .await?;

    sqlx::query(
        "INSERT INTO antibodies (entity_id, host, antigen, clone, specification, storage_temp, \
         source, conjugate, storage_info) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(base.id)
    .bind(&fields.host)
    .bind(&fields.antigen)
    .bind(&fields.clone_name)
    .bind(&fields.specification)
    .bind(fields.storage_temp)
    .bind(&fields.source)
    .bind(&fields.conjugate)
    .bind(&fields.storage_info)
    .execute(&mut **tx)
    .await?;

    Ok(base.id)
}

fn filtered(viewer_id: i64, filter: &AntibodyFilter) -> Result<ListQuery, ValidationError> {
    let mut query = ListQuery::new(SELECT_HEAD);
    query
        .review_visible(viewer_id)
        .contains("e.label", filter.label.as_deref())
        .eq_text("a.host", filter.host.as_deref())
        .contains("a.antigen", filter.antigen.as_deref())
        .contains("a.clone", filter.clone.as_deref())
        .eq_text("a.conjugate", filter.conjugate.as_deref());

    let order = OrderBy::resolve(
        filter.order_by.as_deref(),
        !filter.descending.unwrap_or(false),
        ORDER_COLUMNS,
        "e.label",
    )?;
    query.order(&order);
    Ok(query)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> AntibodyFields {
        AntibodyFields {
            host: "mouse".into(),
            antigen: "GFP".into(),
            clone_name: None,
            specification: Some("monoclonal".into()),
            storage_temp: Some(-20),
            source: None,
            conjugate: None,
            storage_info: None,
        }
    }

    #[test]
    fn validation_checks_required_fields() {
        assert!(fields().validate().is_ok());

        let mut bad = fields();
        bad.host = "  ".into();
        assert!(matches!(
            bad.validate().unwrap_err(),
            ValidationError::Empty { field: "host" }
        ));

        let mut bad = fields();
        bad.storage_temp = Some(99);
        assert!(matches!(
            bad.validate().unwrap_err(),
            ValidationError::OutOfRange { .. }
        ));
    }

    #[test]
    fn filter_builds_expected_sql() {
        let filter = AntibodyFilter {
            label: Some("gfp".into()),
            host: Some("mouse".into()),
            order_by: Some("host".into()),
            ..Default::default()
        };
        let mut query = filtered(7, &filter).unwrap();
        let sql = query.sql().to_owned();

        assert!(sql.contains("e.label ILIKE"));
        assert!(sql.contains("LOWER(a.host)"));
        assert!(sql.contains("ORDER BY a.host ASC"));
        assert!(sql.contains("NOT e.under_review OR e.owner_id ="));
    }

    #[test]
    fn filter_rejects_unknown_order() {
        let filter = AntibodyFilter {
            order_by: Some("password".into()),
            ..Default::default()
        };
        assert!(filtered(1, &filter).is_err());
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn create_and_list_roundtrip() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = crate::db::create_pool(&url, 2).await.expect("pool");
        crate::db::migrations::run(&pool).await.expect("migrations");

        let users = super::super::UserRepo::new(&pool);
        let owner = users
            .create("ab-test", "ab@lab.example", "h", false, &[])
            .await
            .expect("user");

        let repo = AntibodyRepo::new(&pool);
        let label = EntityLabel::new("anti-GFP test").unwrap();
        let created = repo
            .create(owner.id, &label, &fields(), None, false)
            .await
            .expect("create");
        assert_eq!(created.host, "mouse");

        let listed = repo
            .list(owner.id, &AntibodyFilter::default(), Pagination::default())
            .await
            .expect("list");
        assert!(listed.items.iter().any(|a| a.id == created.id));
    }
}
