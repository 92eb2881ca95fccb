//! Chemical repository.
//!
//! Chemicals are consumables with an optional responsible user and any
//! number of stock solutions prepared from them.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Row};

use super::entities::{insert_base, update_base};
use super::DbError;
use crate::db::filter::{ListQuery, OrderBy};
use crate::models::{EntityKind, EntityLabel, Paginated, Pagination, ValidationError};

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Chemical {
    pub id: i64,
    pub label: String,
    pub owner_id: i64,
    pub origin: Option<String>,
    pub under_review: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub cas_number: Option<String>,
    pub pubchem_cid: Option<i64>,
    pub molecular_weight: Option<f64>,
    pub responsible_id: Option<i64>,
    pub storage_info: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChemicalFields {
    pub cas_number: Option<String>,
    pub pubchem_cid: Option<i64>,
    pub molecular_weight: Option<f64>,
    pub responsible_id: Option<i64>,
    pub storage_info: Option<String>,
}

// CAS registry numbers look like 7732-18-5.
static CAS_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{2,7}-\d{2}-\d$").expect("valid regex"));

impl ChemicalFields {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(cas) = self.cas_number.as_deref() {
            if !CAS_NUMBER.is_match(cas) {
                return Err(ValidationError::InvalidFormat {
                    field: "CAS number",
                    reason: "expected digits in the form NNNNN-NN-N".into(),
                });
            }
        }
        if let Some(mw) = self.molecular_weight {
            if mw <= 0.0 {
                return Err(ValidationError::InvalidFormat {
                    field: "molecular weight",
                    reason: "must be positive".into(),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChemicalFilter {
    pub label: Option<String>,
    pub cas_number: Option<String>,
    pub responsible_id: Option<i64>,
    pub order_by: Option<String>,
    pub descending: Option<bool>,
}

/// A solution prepared from a chemical.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct StockSolution {
    pub id: i64,
    pub chemical_id: i64,
    pub responsible_id: i64,
    pub solvent: String,
    pub concentration: String,
    pub storage_place: String,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StockSolutionFields {
    pub solvent: String,
    pub concentration: String,
    pub storage_place: String,
    pub details: Option<String>,
}

impl StockSolutionFields {
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, value) in [
            ("solvent", &self.solvent),
            ("concentration", &self.concentration),
            ("storage place", &self.storage_place),
        ] {
            if value.trim().is_empty() {
                return Err(ValidationError::Empty { field });
            }
        }
        Ok(())
    }
}

const SELECT_HEAD: &str = "SELECT e.id, e.label, e.owner_id, e.origin, e.under_review, \
     e.created_at, e.updated_at, c.cas_number, c.pubchem_cid, c.molecular_weight, \
     c.responsible_id, c.storage_info, COUNT(*) OVER() AS total \
     FROM entities e JOIN chemicals c ON c.entity_id = e.id WHERE TRUE";

const ORDER_COLUMNS: &[(&str, &str)] = &[
    ("label", "e.label"),
    ("id", "e.id"),
    ("cas_number", "c.cas_number"),
    ("molecular_weight", "c.molecular_weight"),
];

pub struct ChemicalRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> ChemicalRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        owner_id: i64,
        label: &EntityLabel,
        fields: &ChemicalFields,
        origin: Option<&str>,
        under_review: bool,
    ) -> Result<Chemical, DbError> {
        let mut tx = self.pool.begin().await?;
        let id = insert_detail(&mut tx, owner_id, label, fields, origin, under_review).await?;
        tx.commit().await?;
        self.get(id).await
    }

    pub async fn update(
        &self,
        id: i64,
        label: &EntityLabel,
        fields: &ChemicalFields,
    ) -> Result<Chemical, DbError> {
        fields
            .validate()
            .map_err(|e| DbError::Invalid(e.to_string()))?;

        let mut tx = self.pool.begin().await?;

        update_base(&mut tx, id, label).await?;

        let result = sqlx::query(
            "UPDATE chemicals SET cas_number = $2, pubchem_cid = $3, molecular_weight = $4, \
             responsible_id = $5, storage_info = $6 WHERE entity_id = $1",
        )
        .bind(id)
        .bind(&fields.cas_number)
        .bind(fields.pubchem_cid)
        .bind(fields.molecular_weight)
        .bind(fields.responsible_id)
        .bind(&fields.storage_info)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("chemical", id));
        }

        tx.commit().await?;
        self.get(id).await
    }

    pub async fn get(&self, id: i64) -> Result<Chemical, DbError> {
        let sql = format!("{SELECT_HEAD} AND e.id = $1");
        sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("chemical", id))
    }

    pub async fn list(
        &self,
        viewer_id: i64,
        filter: &ChemicalFilter,
        page: Pagination,
    ) -> Result<Paginated<Chemical>, DbError> {
        let mut query = filtered(viewer_id, filter)?;
        query.paginate(page);

        let rows = query.builder().build().fetch_all(self.pool).await?;
        let total = rows.first().map(|r| r.get::<i64, _>("total")).unwrap_or(0);
        let items = rows
            .iter()
            .map(Chemical::from_row)
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
        filter: &ChemicalFilter,
    ) -> Result<Vec<Chemical>, DbError> {
        let mut query = filtered(viewer_id, filter)?;
        let rows = query.builder().build().fetch_all(self.pool).await?;
        Ok(rows
            .iter()
            .map(Chemical::from_row)
            .collect::<Result<_, _>>()?)
    }

    pub async fn stock_solutions(&self, chemical_id: i64) -> Result<Vec<StockSolution>, DbError> {
        let rows = sqlx::query_as(
            "SELECT id, chemical_id, responsible_id, solvent, concentration, storage_place, \
             details FROM stock_solutions WHERE chemical_id = $1 ORDER BY id",
        )
        .bind(chemical_id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn add_stock_solution(
        &self,
        chemical_id: i64,
        responsible_id: i64,
        fields: &StockSolutionFields,
    ) -> Result<StockSolution, DbError> {
        fields
            .validate()
            .map_err(|e| DbError::Invalid(e.to_string()))?;

        let row = sqlx::query_as(
            "INSERT INTO stock_solutions (chemical_id, responsible_id, solvent, concentration, \
             storage_place, details) VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id, chemical_id, responsible_id, solvent, concentration, storage_place, \
             details",
        )
        .bind(chemical_id)
        .bind(responsible_id)
        .bind(&fields.solvent)
        .bind(&fields.concentration)
        .bind(&fields.storage_place)
        .bind(&fields.details)
        .fetch_one(self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_stock_solution(&self, id: i64) -> Result<StockSolution, DbError> {
        sqlx::query_as(
            "SELECT id, chemical_id, responsible_id, solvent, concentration, storage_place, \
             details FROM stock_solutions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("stock solution", id))
    }

    pub async fn update_stock_solution(
        &self,
        id: i64,
        fields: &StockSolutionFields,
    ) -> Result<StockSolution, DbError> {
        fields
            .validate()
            .map_err(|e| DbError::Invalid(e.to_string()))?;

        sqlx::query_as(
            "UPDATE stock_solutions SET solvent = $2, concentration = $3, storage_place = $4, \
             details = $5 WHERE id = $1 \
             RETURNING id, chemical_id, responsible_id, solvent, concentration, storage_place, \
             details",
        )
        .bind(id)
        .bind(&fields.solvent)
        .bind(&fields.concentration)
        .bind(&fields.storage_place)
        .bind(&fields.details)
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("stock solution", id))
    }

    pub async fn delete_stock_solution(&self, id: i64) -> Result<(), DbError> {
        let result = sqlx::query("DELETE FROM stock_solutions WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("stock solution", id));
        }
        Ok(())
    }
}

/// Insert base + detail rows on an open transaction; shared with imports.
pub async fn insert_detail(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    owner_id: i64,
    label: &EntityLabel,
    fields: &ChemicalFields,
    origin: Option<&str>,
    under_review: bool,
) -> Result<i64, DbError> {
    fields.validate().map_err(|e| DbError::Invalid(e.to_string()))?;

    let base = insert_base(
        &mut *tx,
        label,
        EntityKind::Chemical,
        owner_id,
        origin,
        under_review,
    )
    .await?;

    sqlx::query(
        "INSERT INTO chemicals (entity_id, cas_number, pubchem_cid, molecular_weight, \
         responsible_id, storage_info) VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(base.id)
    .bind(&fields.cas_number)
    .bind(fields.pubchem_cid)
    .bind(fields.molecular_weight)
    .bind(fields.responsible_id)
    .bind(&fields.storage_info)
    .execute(&mut **tx)
    .await?;

    Ok(base.id)
}

fn filtered(viewer_id: i64, filter: &ChemicalFilter) -> Result<ListQuery, ValidationError> {
    let mut query = ListQuery::new(SELECT_HEAD);
    query
        .review_visible(viewer_id)
        .contains("e.label", filter.label.as_deref())
        .eq_text("c.cas_number", filter.cas_number.as_deref())
        .eq_i64("c.responsible_id", filter.responsible_id);

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

    fn fields() -> ChemicalFields {
        ChemicalFields {
            cas_number: Some("7732-18-5".into()),
            pubchem_cid: Some(962),
            molecular_weight: Some(18.015),
            responsible_id: None,
            storage_info: None,
        }
    }

    #[test]
    fn accepts_valid_cas_number() {
        assert!(fields().validate().is_ok());
    }

    #[test]
    fn rejects_malformed_cas_number() {
        let mut bad = fields();
        bad.cas_number = Some("water".into());
        assert!(bad.validate().is_err());

        let mut bad = fields();
        bad.cas_number = Some("7732-18".into());
        assert!(bad.validate().is_err());
    }

    #[test]
    fn rejects_nonpositive_weight() {
        let mut bad = fields();
        bad.molecular_weight = Some(0.0);
        assert!(bad.validate().is_err());
    }

    #[test]
    fn filter_builds_expected_sql() {
        let filter = ChemicalFilter {
            cas_number: Some("7732-18-5".into()),
            responsible_id: Some(4),
            ..Default::default()
        };
        let mut query = filtered(2, &filter).unwrap();
        let sql = query.sql().to_owned();

        assert!(sql.contains("LOWER(c.cas_number)"));
        assert!(sql.contains("c.responsible_id ="));
    }
}
