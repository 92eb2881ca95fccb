//! Batch repository.
//!
//! Batches are ordered lots of a consumable (antibody or chemical). The
//! list view is cross-kind: it joins the owning entity so callers can
//! filter by consumable type or label.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Row};

use super::DbError;
use crate::db::filter::{ListQuery, OrderBy};
use crate::models::{EntityKind, Paginated, Pagination, ValidationError};

/// A batch together with its consumable's label and kind.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Batch {
    pub id: i64,
    pub consumable_id: i64,
    pub consumable_label: String,
    pub consumable_type: String,
    pub supplier: String,
    pub article_number: String,
    pub lot: String,
    pub amount: Option<String>,
    pub order_date: Option<NaiveDate>,
    pub opened_date: Option<NaiveDate>,
    pub expiration_date: Option<NaiveDate>,
    pub emptied_date: Option<NaiveDate>,
    pub price: Option<f64>,
    pub storage_place: String,
    pub in_use: bool,
}

impl Batch {
    pub fn is_empty(&self) -> bool {
        self.emptied_date.is_some()
    }

    pub fn is_open(&self) -> bool {
        self.opened_date.is_some() && self.emptied_date.is_none()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchFields {
    pub supplier: String,
    pub article_number: String,
    pub lot: String,
    pub amount: Option<String>,
    pub order_date: Option<NaiveDate>,
    pub opened_date: Option<NaiveDate>,
    pub expiration_date: Option<NaiveDate>,
    pub emptied_date: Option<NaiveDate>,
    pub price: Option<f64>,
    pub storage_place: String,
    #[serde(default)]
    pub in_use: bool,
}

impl BatchFields {
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, value) in [
            ("supplier", &self.supplier),
            ("article number", &self.article_number),
            ("lot", &self.lot),
            ("storage place", &self.storage_place),
        ] {
            if value.trim().is_empty() {
                return Err(ValidationError::Empty { field });
            }
        }
        if let (Some(opened), Some(emptied)) = (self.opened_date, self.emptied_date) {
            if emptied < opened {
                return Err(ValidationError::InvalidFormat {
                    field: "emptied date",
                    reason: "cannot precede the opened date".into(),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchFilter {
    pub consumable_id: Option<i64>,
    pub consumable_type: Option<String>,
    pub label: Option<String>,
    pub supplier: Option<String>,
    pub lot: Option<String>,
    /// true keeps only emptied batches, false only non-empty ones.
    pub empty: Option<bool>,
    pub in_use: Option<bool>,
    pub order_by: Option<String>,
    pub descending: Option<bool>,
}

const SELECT_HEAD: &str = "SELECT b.id, b.consumable_id, e.label AS consumable_label, \
     e.entity_type AS consumable_type, b.supplier, b.article_number, b.lot, b.amount, \
     b.order_date, b.opened_date, b.expiration_date, b.emptied_date, b.price, b.storage_place, \
     b.in_use, COUNT(*) OVER() AS total \
     FROM batches b JOIN entities e ON e.id = b.consumable_id WHERE TRUE";

const ORDER_COLUMNS: &[(&str, &str)] = &[
    ("id", "b.id"),
    ("label", "e.label"),
    ("supplier", "b.supplier"),
    ("order_date", "b.order_date"),
    ("expiration_date", "b.expiration_date"),
];

pub struct BatchRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> BatchRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Create a batch for a consumable entity.
    ///
    /// The entity must be a consumable kind; batches on plasmids or stocks
    /// make no sense.
    pub async fn create(&self, consumable_id: i64, fields: &BatchFields) -> Result<Batch, DbError> {
        fields
            .validate()
            .map_err(|e| DbError::Invalid(e.to_string()))?;

        let base = super::EntityRepo::new(self.pool).base(consumable_id).await?;
        let kind = EntityKind::parse(&base.entity_type)
            .map_err(|e| DbError::Invalid(e.to_string()))?;
        if !kind.is_consumable() {
            return Err(DbError::Invalid(format!(
                "{} entities cannot carry batches",
                kind.as_str()
            )));
        }

        let row = sqlx::query(
            "INSERT INTO batches (consumable_id, supplier, article_number, lot, amount, \
             order_date, opened_date, expiration_date, emptied_date, price, storage_place, \
             in_use) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) RETURNING id",
        )
        .bind(consumable_id)
        .bind(&fields.supplier)
        .bind(&fields.article_number)
        .bind(&fields.lot)
        .bind(&fields.amount)
        .bind(fields.order_date)
        .bind(fields.opened_date)
        .bind(fields.expiration_date)
        .bind(fields.emptied_date)
        .bind(fields.price)
        .bind(&fields.storage_place)
        .bind(fields.in_use)
        .fetch_one(self.pool)
        .await?;

        self.get(row.get("id")).await
    }

    pub async fn update(&self, id: i64, fields: &BatchFields) -> Result<Batch, DbError> {
        fields
            .validate()
            .map_err(|e| DbError::Invalid(e.to_string()))?;

        let result = sqlx::query(
            "UPDATE batches SET supplier = $2, article_number = $3, lot = $4, amount = $5, \
             order_date = $6, opened_date = $7, expiration_date = $8, emptied_date = $9, \
             price = $10, storage_place = $11, in_use = $12 WHERE id = $1",
        )
        .bind(id)
        .bind(&fields.supplier)
        .bind(&fields.article_number)
        .bind(&fields.lot)
        .bind(&fields.amount)
        .bind(fields.order_date)
        .bind(fields.opened_date)
        .bind(fields.expiration_date)
        .bind(fields.emptied_date)
        .bind(fields.price)
        .bind(&fields.storage_place)
        .bind(fields.in_use)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("batch", id));
        }
        self.get(id).await
    }

    pub async fn get(&self, id: i64) -> Result<Batch, DbError> {
        let sql = format!("{SELECT_HEAD} AND b.id = $1");
        sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("batch", id))
    }

    pub async fn list(
        &self,
        viewer_id: i64,
        filter: &BatchFilter,
        page: Pagination,
    ) -> Result<Paginated<Batch>, DbError> {
        let mut query = filtered(viewer_id, filter)?;
        query.paginate(page);

        let rows = query.builder().build().fetch_all(self.pool).await?;
        let total = rows.first().map(|r| r.get::<i64, _>("total")).unwrap_or(0);
        let items = rows.iter().map(Batch::from_row).collect::<Result<_, _>>()?;

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
        filter: &BatchFilter,
    ) -> Result<Vec<Batch>, DbError> {
        let mut query = filtered(viewer_id, filter)?;
        let rows = query.builder().build().fetch_all(self.pool).await?;
        Ok(rows.iter().map(Batch::from_row).collect::<Result<_, _>>()?)
    }

    pub async fn delete(&self, id: i64) -> Result<(), DbError> {
        let result = sqlx::query("DELETE FROM batches WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("batch", id));
        }
        Ok(())
    }

    /// Mark a batch as opened today if it has no opened date yet.
    pub async fn mark_opened(&self, id: i64) -> Result<Batch, DbError> {
        sqlx::query("UPDATE batches SET opened_date = CURRENT_DATE, in_use = TRUE \
                     WHERE id = $1 AND opened_date IS NULL")
            .bind(id)
            .execute(self.pool)
            .await?;
        self.get(id).await
    }

    /// Mark a batch as emptied today.
    pub async fn mark_emptied(&self, id: i64) -> Result<Batch, DbError> {
        sqlx::query("UPDATE batches SET emptied_date = CURRENT_DATE, in_use = FALSE \
                     WHERE id = $1 AND emptied_date IS NULL")
            .bind(id)
            .execute(self.pool)
            .await?;
        self.get(id).await
    }
}

fn filtered(viewer_id: i64, filter: &BatchFilter) -> Result<ListQuery, ValidationError> {
    if let Some(kind) = filter.consumable_type.as_deref() {
        let kind = EntityKind::parse(kind)?;
        if !kind.is_consumable() {
            return Err(ValidationError::InvalidVariant {
                field: "consumable type",
                value: kind.as_str().to_owned(),
            });
        }
    }

    let mut query = ListQuery::new(SELECT_HEAD);
    query
        .review_visible(viewer_id)
        .eq_i64("b.consumable_id", filter.consumable_id)
        .eq_text("e.entity_type", filter.consumable_type.as_deref())
        .contains("e.label", filter.label.as_deref())
        .contains("b.supplier", filter.supplier.as_deref())
        .eq_text("b.lot", filter.lot.as_deref());

    match filter.empty {
        Some(true) => {
            query.raw("b.emptied_date IS NOT NULL");
        }
        Some(false) => {
            query.raw("b.emptied_date IS NULL");
        }
        None => {}
    }
    if let Some(in_use) = filter.in_use {
        query.raw(if in_use { "b.in_use" } else { "NOT b.in_use" });
    }

    let order = OrderBy::resolve(
        filter.order_by.as_deref(),
        !filter.descending.unwrap_or(false),
        ORDER_COLUMNS,
        "b.id",
    )?;
    query.order(&order);
    Ok(query)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> BatchFields {
        BatchFields {
            supplier: "Sigma".into(),
            article_number: "A-1234".into(),
            lot: "L42".into(),
            amount: Some("100 g".into()),
            order_date: NaiveDate::from_ymd_opt(2024, 1, 10),
            opened_date: None,
            expiration_date: None,
            emptied_date: None,
            price: Some(89.50),
            storage_place: "shelf 3".into(),
            in_use: false,
        }
    }

    #[test]
    fn validation_checks_required_fields() {
        assert!(fields().validate().is_ok());

        let mut bad = fields();
        bad.supplier = String::new();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn emptied_cannot_precede_opened() {
        let mut bad = fields();
        bad.opened_date = NaiveDate::from_ymd_opt(2024, 2, 1);
        bad.emptied_date = NaiveDate::from_ymd_opt(2024, 1, 1);
        assert!(bad.validate().is_err());
    }

    #[test]
    fn status_helpers() {
        let batch = Batch {
            id: 1,
            consumable_id: 2,
            consumable_label: "x".into(),
            consumable_type: "chemical".into(),
            supplier: "s".into(),
            article_number: "a".into(),
            lot: "l".into(),
            amount: None,
            order_date: None,
            opened_date: NaiveDate::from_ymd_opt(2024, 2, 1),
            expiration_date: None,
            emptied_date: None,
            price: None,
            storage_place: "p".into(),
            in_use: true,
        };
        assert!(batch.is_open());
        assert!(!batch.is_empty());
    }

    #[test]
    fn filter_rejects_non_consumable_type() {
        let filter = BatchFilter {
            consumable_type: Some("plasmid".into()),
            ..Default::default()
        };
        assert!(filtered(1, &filter).is_err());
    }

    #[test]
    fn empty_filter_branches() {
        let filter = BatchFilter {
            empty: Some(true),
            in_use: Some(false),
            ..Default::default()
        };
        let mut query = filtered(1, &filter).unwrap();
        let sql = query.sql().to_owned();
        assert!(sql.contains("b.emptied_date IS NOT NULL"));
        assert!(sql.contains("NOT b.in_use"));
    }
}
