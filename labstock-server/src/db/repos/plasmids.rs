//! Plasmid repository.
//!
//! Plasmids carry two kinds of physical derivatives: DNA preparations and
//! glycerol stocks of the transformed strain. Both live in their own tables
//! keyed by plasmid.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Row};

use super::entities::{insert_base, update_base};
use super::DbError;
use crate::db::filter::{ListQuery, OrderBy};
use crate::models::{EntityKind, EntityLabel, Paginated, Pagination, ValidationError};

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Plasmid {
    pub id: i64,
    pub label: String,
    pub owner_id: i64,
    pub origin: Option<String>,
    pub under_review: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub insert_name: String,
    pub vector: Option<String>,
    pub cloning_date: Option<NaiveDate>,
    pub description: Option<String>,
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlasmidFields {
    pub insert_name: String,
    pub vector: Option<String>,
    pub cloning_date: Option<NaiveDate>,
    pub description: Option<String>,
    pub reference: Option<String>,
}

impl PlasmidFields {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.insert_name.trim().is_empty() {
            return Err(ValidationError::Empty {
                field: "insert name",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlasmidFilter {
    pub label: Option<String>,
    pub insert_name: Option<String>,
    pub vector: Option<String>,
    pub description: Option<String>,
    pub order_by: Option<String>,
    pub descending: Option<bool>,
}

/// A DNA preparation of a plasmid.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Preparation {
    pub id: i64,
    pub plasmid_id: i64,
    pub owner_id: i64,
    pub preparation_date: Option<NaiveDate>,
    pub method: Option<String>,
    pub eluent: Option<String>,
    pub concentration: Option<i32>,
    pub storage_place: Option<String>,
    pub emptied_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreparationFields {
    pub preparation_date: Option<NaiveDate>,
    pub method: Option<String>,
    pub eluent: Option<String>,
    pub concentration: Option<i32>,
    pub storage_place: Option<String>,
    pub emptied_date: Option<NaiveDate>,
}

/// A glycerol stock of the transformed strain.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct GlycerolStock {
    pub id: i64,
    pub plasmid_id: i64,
    pub owner_id: i64,
    pub strain: String,
    pub transformation_date: NaiveDate,
    pub storage_place: String,
    pub disposal_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GlycerolStockFields {
    pub strain: String,
    pub transformation_date: NaiveDate,
    pub storage_place: String,
    pub disposal_date: Option<NaiveDate>,
}

impl GlycerolStockFields {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.strain.trim().is_empty() {
            return Err(ValidationError::Empty { field: "strain" });
        }
        if self.storage_place.trim().is_empty() {
            return Err(ValidationError::Empty {
                field: "storage place",
            });
        }
        Ok(())
    }
}

const SELECT_HEAD: &str = "SELECT e.id, e.label, e.owner_id, e.origin, e.under_review, \
     e.created_at, e.updated_at, p.insert_name, p.vector, p.cloning_date, p.description, \
     p.reference, COUNT(*) OVER() AS total \
     FROM entities e JOIN plasmids p ON p.entity_id = e.id WHERE TRUE";

const ORDER_COLUMNS: &[(&str, &str)] = &[
    ("label", "e.label"),
    ("id", "e.id"),
    ("insert_name", "p.insert_name"),
    ("vector", "p.vector"),
    ("cloning_date", "p.cloning_date"),
];

pub struct PlasmidRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> PlasmidRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        owner_id: i64,
        label: &EntityLabel,
        fields: &PlasmidFields,
        origin: Option<&str>,
        under_review: bool,
    ) -> Result<Plasmid, DbError> {
        let mut tx = self.pool.begin().await?;
        let id = insert_detail(&mut tx, owner_id, label, fields, origin, under_review).await?;
        tx.commit().await?;
        self.get(id).await
    }

    pub async fn update(
        &self,
        id: i64,
        label: &EntityLabel,
        fields: &PlasmidFields,
    ) -> Result<Plasmid, DbError> {
        let mut tx = self.pool.begin().await?;

        update_base(&mut tx, id, label).await?;

        let result = sqlx::query(
            "UPDATE plasmids SET insert_name = $2, vector = $3, cloning_date = $4, \
             description = $5, reference = $6 WHERE entity_id = $1",
        )
        .bind(id)
        .bind(&fields.insert_name)
        .bind(&fields.vector)
        .bind(fields.cloning_date)
        .bind(&fields.description)
        .bind(&fields.reference)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("plasmid", id));
        }

        tx.commit().await?;
        self.get(id).await
    }

    pub async fn get(&self, id: i64) -> Result<Plasmid, DbError> {
        let sql = format!("{SELECT_HEAD} AND e.id = $1");
        sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("plasmid", id))
    }

    pub async fn list(
        &self,
        viewer_id: i64,
        filter: &PlasmidFilter,
        page: Pagination,
    ) -> Result<Paginated<Plasmid>, DbError> {
        let mut query = filtered(viewer_id, filter)?;
        query.paginate(page);

        let rows = query.builder().build().fetch_all(self.pool).await?;
        let total = rows.first().map(|r| r.get::<i64, _>("total")).unwrap_or(0);
        let items = rows
            .iter()
            .map(Plasmid::from_row)
            .collect::<Result<_, _>>()?;

        Ok(Paginated {
            items,
            total,
            page: page.page,
            per_page: page.per_page,
        })
    }

    pub async fn export(
        &self,
        viewer_id: i64,
        filter: &PlasmidFilter,
    ) -> Result<Vec<Plasmid>, DbError> {
        let mut query = filtered(viewer_id, filter)?;
        let rows = query.builder().build().fetch_all(self.pool).await?;
        Ok(rows
            .iter()
            .map(Plasmid::from_row)
            .collect::<Result<_, _>>()?)
    }

    pub async fn preparations(&self, plasmid_id: i64) -> Result<Vec<Preparation>, DbError> {
        let rows = sqlx::query_as(
            "SELECT id, plasmid_id, owner_id, preparation_date, method, eluent, concentration, \
             storage_place, emptied_date \
             FROM preparations WHERE plasmid_id = $1 \
             ORDER BY preparation_date DESC NULLS LAST, id",
        )
        .bind(plasmid_id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn add_preparation(
        &self,
        plasmid_id: i64,
        owner_id: i64,
        fields: &PreparationFields,
    ) -> Result<Preparation, DbError> {
        let row = sqlx::query_as(
            "INSERT INTO preparations (plasmid_id, owner_id, preparation_date, method, eluent, \
             concentration, storage_place, emptied_date) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING id, plasmid_id, owner_id, preparation_date, method, eluent, concentration, \
             storage_place, emptied_date",
        )
        .bind(plasmid_id)
        .bind(owner_id)
        .bind(fields.preparation_date)
        .bind(&fields.method)
        .bind(&fields.eluent)
        .bind(fields.concentration)
        .bind(&fields.storage_place)
        .bind(fields.emptied_date)
        .fetch_one(self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_preparation(&self, id: i64) -> Result<Preparation, DbError> {
        sqlx::query_as(
            "SELECT id, plasmid_id, owner_id, preparation_date, method, eluent, concentration, \
             storage_place, emptied_date FROM preparations WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("preparation", id))
    }

    pub async fn update_preparation(
        &self,
        id: i64,
        fields: &PreparationFields,
    ) -> Result<Preparation, DbError> {
        sqlx::query_as(
            "UPDATE preparations SET preparation_date = $2, method = $3, eluent = $4, \
             concentration = $5, storage_place = $6, emptied_date = $7 \
             WHERE id = $1 \
             RETURNING id, plasmid_id, owner_id, preparation_date, method, eluent, concentration, \
             storage_place, emptied_date",
        )
        .bind(id)
        .bind(fields.preparation_date)
        .bind(&fields.method)
        .bind(&fields.eluent)
        .bind(fields.concentration)
        .bind(&fields.storage_place)
        .bind(fields.emptied_date)
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("preparation", id))
    }

    pub async fn delete_preparation(&self, id: i64) -> Result<(), DbError> {
        let result = sqlx::query("DELETE FROM preparations WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("preparation", id));
        }
        Ok(())
    }

    pub async fn glycerol_stocks(&self, plasmid_id: i64) -> Result<Vec<GlycerolStock>, DbError> {
        let rows = sqlx::query_as(
            "SELECT id, plasmid_id, owner_id, strain, transformation_date, storage_place, \
             disposal_date \
             FROM glycerol_stocks WHERE plasmid_id = $1 \
             ORDER BY transformation_date DESC, id",
        )
        .bind(plasmid_id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn add_glycerol_stock(
        &self,
        plasmid_id: i64,
        owner_id: i64,
        fields: &GlycerolStockFields,
    ) -> Result<GlycerolStock, DbError> {
        fields
            .validate()
            .map_err(|e| DbError::Invalid(e.to_string()))?;

        let row = sqlx::query_as(
            "INSERT INTO glycerol_stocks (plasmid_id, owner_id, strain, transformation_date, \
             storage_place, disposal_date) VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id, plasmid_id, owner_id, strain, transformation_date, storage_place, \
             disposal_date",
        )
        .bind(plasmid_id)
        .bind(owner_id)
        .bind(&fields.strain)
        .bind(fields.transformation_date)
        .bind(&fields.storage_place)
        .bind(fields.disposal_date)
        .fetch_one(self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_glycerol_stock(&self, id: i64) -> Result<GlycerolStock, DbError> {
        sqlx::query_as(
            "SELECT id, plasmid_id, owner_id, strain, transformation_date, storage_place, \
             disposal_date FROM glycerol_stocks WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("glycerol stock", id))
    }

    pub async fn update_glycerol_stock(
        &self,
        id: i64,
        fields: &GlycerolStockFields,
    ) -> Result<GlycerolStock, DbError> {
        fields
            .validate()
            .map_err(|e| DbError::Invalid(e.to_string()))?;

        sqlx::query_as(
            "UPDATE glycerol_stocks SET strain = $2, transformation_date = $3, \
             storage_place = $4, disposal_date = $5 WHERE id = $1 \
             RETURNING id, plasmid_id, owner_id, strain, transformation_date, storage_place, \
             disposal_date",
        )
        .bind(id)
        .bind(&fields.strain)
        .bind(fields.transformation_date)
        .bind(&fields.storage_place)
        .bind(fields.disposal_date)
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("glycerol stock", id))
    }

    pub async fn delete_glycerol_stock(&self, id: i64) -> Result<(), DbError> {
        let result = sqlx::query("DELETE FROM glycerol_stocks WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("glycerol stock", id));
        }
        Ok(())
    }
}

/// Insert base + detail rows on an open transaction; shared with imports.
pub async fn insert_detail(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    owner_id: i64,
    label: &EntityLabel,
    fields: &PlasmidFields,
    origin: Option<&str>,
    under_review: bool,
) -> Result<i64, DbError> {
    fields.validate().map_err(|e| DbError::Invalid(e.to_string()))?;

    let base = insert_base(
        &mut *tx,
        label,
        EntityKind::Plasmid,
        owner_id,
        origin,
        under_review,
    )
    .await?;

    sqlx::query(
        "INSERT INTO plasmids (entity_id, insert_name, vector, cloning_date, description, \
         reference) VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(base.id)
    .bind(&fields.insert_name)
    .bind(&fields.vector)
    .bind(fields.cloning_date)
    .bind(&fields.description)
    .bind(&fields.reference)
    .execute(&mut **tx)
    .await?;

    Ok(base.id)
}

fn filtered(viewer_id: i64, filter: &PlasmidFilter) -> Result<ListQuery, ValidationError> {
    let mut query = ListQuery::new(SELECT_HEAD);
    query
        .review_visible(viewer_id)
        .contains("e.label", filter.label.as_deref())
        .contains("p.insert_name", filter.insert_name.as_deref())
        .contains("p.vector", filter.vector.as_deref())
        .contains("p.description", filter.description.as_deref());

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

    #[test]
    fn validation_requires_insert_name() {
        let fields = PlasmidFields {
            insert_name: " ".into(),
            vector: None,
            cloning_date: None,
            description: None,
            reference: None,
        };
        assert!(matches!(
            fields.validate().unwrap_err(),
            ValidationError::Empty {
                field: "insert name"
            }
        ));
    }

    #[test]
    fn glycerol_stock_validation() {
        let fields = GlycerolStockFields {
            strain: "DH5a".into(),
            transformation_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            storage_place: "".into(),
            disposal_date: None,
        };
        assert!(fields.validate().is_err());
    }

    #[test]
    fn filter_builds_expected_sql() {
        let filter = PlasmidFilter {
            insert_name: Some("gfp".into()),
            order_by: Some("cloning_date".into()),
            descending: Some(true),
            ..Default::default()
        };
        let mut query = filtered(3, &filter).unwrap();
        let sql = query.sql().to_owned();

        assert!(sql.contains("p.insert_name ILIKE"));
        assert!(sql.contains("ORDER BY p.cloning_date DESC"));
    }
}
