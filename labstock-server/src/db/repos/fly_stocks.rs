//! Fly stock repository.
//!
//! Genotypes are stored per chromosome; the full genotype string is derived
//! on the fly. Modifications record crossings and other changes applied to a
//! living stock.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Row};

use super::entities::{insert_base, update_base};
use super::DbError;
use crate::db::filter::{ListQuery, OrderBy};
use crate::models::{EntityKind, EntityLabel, Paginated, Pagination, ValidationError};

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct FlyStock {
    pub id: i64,
    pub label: String,
    pub owner_id: i64,
    pub origin: Option<String>,
    pub under_review: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub chromosome_x: String,
    pub chromosome_y: String,
    pub chromosome_2: String,
    pub chromosome_3: String,
    pub chromosome_4: String,
    pub source: Option<String>,
    pub reference: Option<String>,
    pub rating: Option<i32>,
    pub discarded_date: Option<NaiveDate>,
}

impl FlyStock {
    /// Conventional genotype notation, wild-type chromosomes elided.
    pub fn genotype(&self) -> String {
        let parts = [
            &self.chromosome_x,
            &self.chromosome_y,
            &self.chromosome_2,
            &self.chromosome_3,
            &self.chromosome_4,
        ];
        let written: Vec<&str> = parts
            .iter()
            .map(|c| c.as_str())
            .filter(|c| *c != "+")
            .collect();
        if written.is_empty() {
            "+".to_owned()
        } else {
            written.join("; ")
        }
    }

    pub fn is_discarded(&self) -> bool {
        self.discarded_date.is_some()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlyStockFields {
    #[serde(default = "wild_type")]
    pub chromosome_x: String,
    #[serde(default = "wild_type")]
    pub chromosome_y: String,
    #[serde(default = "wild_type")]
    pub chromosome_2: String,
    #[serde(default = "wild_type")]
    pub chromosome_3: String,
    #[serde(default = "wild_type")]
    pub chromosome_4: String,
    pub source: Option<String>,
    pub reference: Option<String>,
    pub rating: Option<i32>,
    pub discarded_date: Option<NaiveDate>,
}

fn wild_type() -> String {
    "+".to_owned()
}

impl FlyStockFields {
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, value) in [
            ("chromosome_x", &self.chromosome_x),
            ("chromosome_y", &self.chromosome_y),
            ("chromosome_2", &self.chromosome_2),
            ("chromosome_3", &self.chromosome_3),
            ("chromosome_4", &self.chromosome_4),
        ] {
            if value.trim().is_empty() {
                return Err(ValidationError::Empty { field });
            }
        }
        if let Some(rating) = self.rating {
            if !(1..=5).contains(&rating) {
                return Err(ValidationError::OutOfRange {
                    field: "rating",
                    min: 1,
                    max: 5,
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FlyStockFilter {
    pub label: Option<String>,
    /// Matches any chromosome.
    pub genotype: Option<String>,
    pub source: Option<String>,
    /// When false (the default), discarded stocks are hidden.
    pub include_discarded: Option<bool>,
    pub order_by: Option<String>,
    pub descending: Option<bool>,
}

/// A change applied to a living stock.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Modification {
    pub id: i64,
    pub fly_stock_id: i64,
    pub user_id: i64,
    pub modified_on: NaiveDate,
    pub description: String,
}

const SELECT_HEAD: &str = "SELECT e.id, e.label, e.owner_id, e.origin, e.under_review, \
     e.created_at, e.updated_at, f.chromosome_x, f.chromosome_y, f.chromosome_2, \
     f.chromosome_3, f.chromosome_4, f.source, f.reference, f.rating, f.discarded_date, \
     COUNT(*) OVER() AS total \
     FROM entities e JOIN fly_stocks f ON f.entity_id = e.id WHERE TRUE";

const ORDER_COLUMNS: &[(&str, &str)] = &[
    ("label", "e.label"),
    ("id", "e.id"),
    ("rating", "f.rating"),
    ("source", "f.source"),
];

pub struct FlyStockRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> FlyStockRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        owner_id: i64,
        label: &EntityLabel,
        fields: &FlyStockFields,
        origin: Option<&str>,
        under_review: bool,
    ) -> Result<FlyStock, DbError> {
        let mut tx = self.pool.begin().await?;
        let id = insert_detail(&mut tx, owner_id, label, fields, origin, under_review).await?;
        tx.commit().await?;
        self.get(id).await
    }

    pub async fn update(
        &self,
        id: i64,
        label: &EntityLabel,
        fields: &FlyStockFields,
    ) -> Result<FlyStock, DbError> {
        fields
            .validate()
            .map_err(|e| DbError::Invalid(e.to_string()))?;

        let mut tx = self.pool.begin().await?;

        update_base(&mut tx, id, label).await?;

        let result = sqlx::query(
            "UPDATE fly_stocks SET chromosome_x = $2, chromosome_y = $3, chromosome_2 = $4, \
             chromosome_3 = $5, chromosome_4 = $6, source = $7, reference = $8, rating = $9, \
             discarded_date = $10 WHERE entity_id = $1",
        )
        .bind(id)
        .bind(&fields.chromosome_x)
        .bind(&fields.chromosome_y)
        .bind(&fields.chromosome_2)
        .bind(&fields.chromosome_3)
        .bind(&fields.chromosome_4)
        .bind(&fields.source)
        .bind(&fields.reference)
        .bind(fields.rating)
        .bind(fields.discarded_date)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("fly stock", id));
        }

        tx.commit().await?;
        self.get(id).await
    }

    pub async fn get(&self, id: i64) -> Result<FlyStock, DbError> {
        let sql = format!("{SELECT_HEAD} AND e.id = $1");
        sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("fly stock", id))
    }

    pub async fn list(
        &self,
        viewer_id: i64,
        filter: &FlyStockFilter,
        page: Pagination,
    ) -> Result<Paginated<FlyStock>, DbError> {
        let mut query = filtered(viewer_id, filter)?;
        query.paginate(page);

        let rows = query.builder().build().fetch_all(self.pool).await?;
        let total = rows.first().map(|r| r.get::<i64, _>("total")).unwrap_or(0);
        let items = rows
            .iter()
            .map(FlyStock::from_row)
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
        filter: &FlyStockFilter,
    ) -> Result<Vec<FlyStock>, DbError> {
        let mut query = filtered(viewer_id, filter)?;
        let rows = query.builder().build().fetch_all(self.pool).await?;
        Ok(rows
            .iter()
            .map(FlyStock::from_row)
            .collect::<Result<_, _>>()?)
    }

    pub async fn modifications(&self, fly_stock_id: i64) -> Result<Vec<Modification>, DbError> {
        let rows = sqlx::query_as(
            "SELECT id, fly_stock_id, user_id, modified_on, description \
             FROM modifications WHERE fly_stock_id = $1 ORDER BY modified_on DESC, id",
        )
        .bind(fly_stock_id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn add_modification(
        &self,
        fly_stock_id: i64,
        user_id: i64,
        modified_on: NaiveDate,
        description: &str,
    ) -> Result<Modification, DbError> {
        if description.trim().is_empty() {
            return Err(DbError::Invalid("description must not be empty".into()));
        }
        let row = sqlx::query_as(
            "INSERT INTO modifications (fly_stock_id, user_id, modified_on, description) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, fly_stock_id, user_id, modified_on, description",
        )
        .bind(fly_stock_id)
        .bind(user_id)
        .bind(modified_on)
        .bind(description)
        .fetch_one(self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_modification(&self, id: i64) -> Result<Modification, DbError> {
        sqlx::query_as(
            "SELECT id, fly_stock_id, user_id, modified_on, description \
             FROM modifications WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("modification", id))
    }

    pub async fn update_modification(
        &self,
        id: i64,
        modified_on: NaiveDate,
        description: &str,
    ) -> Result<Modification, DbError> {
        if description.trim().is_empty() {
            return Err(DbError::Invalid("description must not be empty".into()));
        }
        sqlx::query_as(
            "UPDATE modifications SET modified_on = $2, description = $3 WHERE id = $1 \
             RETURNING id, fly_stock_id, user_id, modified_on, description",
        )
        .bind(id)
        .bind(modified_on)
        .bind(description)
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("modification", id))
    }

    pub async fn delete_modification(&self, id: i64) -> Result<(), DbError> {
        let result = sqlx::query("DELETE FROM modifications WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("modification", id));
        }
        Ok(())
    }
}

/// Insert base + detail rows on an open transaction; shared with imports.
pub async fn insert_detail(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    owner_id: i64,
    label: &EntityLabel,
    fields: &FlyStockFields,
    origin: Option<&str>,
    under_review: bool,
) -> Result<i64, DbError> {
    fields.validate().map_err(|e| DbError::Invalid(e.to_string()))?;

    let base = insert_base(
        &mut *tx,
        label,
        EntityKind::FlyStock,
        owner_id,
        origin,
        under_review,
    )
    .await?;

    sqlx::query(
        "INSERT INTO fly_stocks (entity_id, chromosome_x, chromosome_y, chromosome_2, \
         chromosome_3, chromosome_4, source, reference, rating, discarded_date) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(base.id)
    .bind(&fields.chromosome_x)
    .bind(&fields.chromosome_y)
    .bind(&fields.chromosome_2)
    .bind(&fields.chromosome_3)
    .bind(&fields.chromosome_4)
    .bind(&fields.source)
    .bind(&fields.reference)
    .bind(fields.rating)
    .bind(fields.discarded_date)
    .execute(&mut **tx)
    .await?;

    Ok(base.id)
}

fn filtered(viewer_id: i64, filter: &FlyStockFilter) -> Result<ListQuery, ValidationError> {
    let mut query = ListQuery::new(SELECT_HEAD);
    query
        .review_visible(viewer_id)
        .contains("e.label", filter.label.as_deref())
        .contains(
            "CONCAT_WS('; ', f.chromosome_x, f.chromosome_y, f.chromosome_2, f.chromosome_3, \
             f.chromosome_4)",
            filter.genotype.as_deref(),
        )
        .contains("f.source", filter.source.as_deref());

    if !filter.include_discarded.unwrap_or(false) {
        query.raw("f.discarded_date IS NULL");
    }

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

    fn stock(chromosomes: [&str; 5]) -> FlyStock {
        FlyStock {
            id: 1,
            label: "w1118".into(),
            owner_id: 1,
            origin: None,
            under_review: false,
            created_at: Utc::now(),
            updated_at: None,
            chromosome_x: chromosomes[0].into(),
            chromosome_y: chromosomes[1].into(),
            chromosome_2: chromosomes[2].into(),
            chromosome_3: chromosomes[3].into(),
            chromosome_4: chromosomes[4].into(),
            source: None,
            reference: None,
            rating: None,
            discarded_date: None,
        }
    }

    #[test]
    fn genotype_elides_wild_type() {
        let s = stock(["w[1118]", "+", "+", "TM3/TM6", "+"]);
        assert_eq!(s.genotype(), "w[1118]; TM3/TM6");

        let wild = stock(["+", "+", "+", "+", "+"]);
        assert_eq!(wild.genotype(), "+");
    }

    #[test]
    fn rating_must_be_one_to_five() {
        let mut fields = FlyStockFields {
            chromosome_x: "+".into(),
            chromosome_y: "+".into(),
            chromosome_2: "+".into(),
            chromosome_3: "+".into(),
            chromosome_4: "+".into(),
            source: None,
            reference: None,
            rating: Some(3),
            discarded_date: None,
        };
        assert!(fields.validate().is_ok());

        fields.rating = Some(6);
        assert!(matches!(
            fields.validate().unwrap_err(),
            ValidationError::OutOfRange { .. }
        ));
    }

    #[test]
    fn discarded_hidden_by_default() {
        let mut query = filtered(1, &FlyStockFilter::default()).unwrap();
        assert!(query.sql().contains("f.discarded_date IS NULL"));

        let filter = FlyStockFilter {
            include_discarded: Some(true),
            ..Default::default()
        };
        let mut query = filtered(1, &filter).unwrap();
        assert!(!query.sql().contains("discarded_date IS NULL"));
    }
}
