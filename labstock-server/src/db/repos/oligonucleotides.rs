//! Oligonucleotide repository.
//!
//! Sequences are normalized (whitespace stripped, uppercased) before they
//! hit the database, so filters and exports can rely on a canonical form.

use chrono::{DateTime, NaiveDate, Utc};
use labstock_core::sequence;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Row};

use super::entities::{insert_base, update_base};
use super::DbError;
use crate::db::filter::{ListQuery, OrderBy};
use crate::models::{EntityKind, EntityLabel, Paginated, Pagination, ValidationError};

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Oligonucleotide {
    pub id: i64,
    pub label: String,
    pub owner_id: i64,
    pub origin: Option<String>,
    pub under_review: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub sequence: String,
    pub date_ordered: Option<NaiveDate>,
    pub storage_place: Option<String>,
    pub description: Option<String>,
}

impl Oligonucleotide {
    pub fn length(&self) -> usize {
        self.sequence.len()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OligonucleotideFields {
    pub sequence: String,
    pub date_ordered: Option<NaiveDate>,
    pub storage_place: Option<String>,
    pub description: Option<String>,
}

impl OligonucleotideFields {
    /// Canonical sequence, or a validation error for junk input.
    pub fn normalized_sequence(&self) -> Result<String, ValidationError> {
        let normalized =
            sequence::normalize(&self.sequence).map_err(|e| ValidationError::InvalidFormat {
                field: "sequence",
                reason: e.to_string(),
            })?;
        if normalized.is_empty() {
            return Err(ValidationError::Empty { field: "sequence" });
        }
        Ok(normalized)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OligonucleotideFilter {
    pub label: Option<String>,
    /// Matches the sequence or its reverse complement.
    pub sequence: Option<String>,
    pub description: Option<String>,
    pub order_by: Option<String>,
    pub descending: Option<bool>,
}

const SELECT_HEAD: &str = "SELECT e.id, e.label, e.owner_id, e.origin, e.under_review, \
     e.created_at, e.updated_at, o.sequence, o.date_ordered, o.storage_place, o.description, \
     COUNT(*) OVER() AS total \
     FROM entities e JOIN oligonucleotides o ON o.entity_id = e.id WHERE TRUE";

const ORDER_COLUMNS: &[(&str, &str)] = &[
    ("label", "e.label"),
    ("id", "e.id"),
    ("length", "LENGTH(o.sequence)"),
    ("date_ordered", "o.date_ordered"),
];

pub struct OligonucleotideRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> OligonucleotideRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        owner_id: i64,
        label: &EntityLabel,
        fields: &OligonucleotideFields,
        origin: Option<&str>,
        under_review: bool,
    ) -> Result<Oligonucleotide, DbError> {
        let mut tx = self.pool.begin().await?;
        let id = insert_detail(&mut tx, owner_id, label, fields, origin, under_review).await?;
        tx.commit().await?;
        self.get(id).await
    }

    pub async fn update(
        &self,
        id: i64,
        label: &EntityLabel,
        fields: &OligonucleotideFields,
    ) -> Result<Oligonucleotide, DbError> {
        let normalized = fields
            .normalized_sequence()
            .map_err(|e| DbError::Invalid(e.to_string()))?;

        let mut tx = self.pool.begin().await?;

        update_base(&mut tx, id, label).await?;

        let result = sqlx::query(
            "UPDATE oligonucleotides SET sequence = $2, date_ordered = $3, storage_place = $4, \
             description = $5 WHERE entity_id = $1",
        )
        .bind(id)
        .bind(&normalized)
        .bind(fields.date_ordered)
        .bind(&fields.storage_place)
        .bind(&fields.description)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("oligonucleotide", id));
        }

        tx.commit().await?;
        self.get(id).await
    }

    pub async fn get(&self, id: i64) -> Result<Oligonucleotide, DbError> {
        let sql = format!("{SELECT_HEAD} AND e.id = $1");
        sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("oligonucleotide", id))
    }

    pub async fn list(
        &self,
        viewer_id: i64,
        filter: &OligonucleotideFilter,
        page: Pagination,
    ) -> Result<Paginated<Oligonucleotide>, DbError> {
        let mut query = filtered(viewer_id, filter)?;
        query.paginate(page);

        let rows = query.builder().build().fetch_all(self.pool).await?;
        let total = rows.first().map(|r| r.get::<i64, _>("total")).unwrap_or(0);
        let items = rows
            .iter()
            .map(Oligonucleotide::from_row)
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
        filter: &OligonucleotideFilter,
    ) -> Result<Vec<Oligonucleotide>, DbError> {
        let mut query = filtered(viewer_id, filter)?;
        let rows = query.builder().build().fetch_all(self.pool).await?;
        Ok(rows
            .iter()
            .map(Oligonucleotide::from_row)
            .collect::<Result<_, _>>()?)
    }
}

/// Insert base + detail rows on an open transaction; shared with imports.
pub async fn insert_detail(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    owner_id: i64,
    label: &EntityLabel,
    fields: &OligonucleotideFields,
    origin: Option<&str>,
    under_review: bool,
) -> Result<i64, DbError> {
    let normalized = fields
        .normalized_sequence()
        .map_err(|e| DbError::Invalid(e.to_string()))?;

    let base = insert_base(
        &mut *tx,
        label,
        EntityKind::Oligonucleotide,
        owner_id,
        origin,
        under_review,
    )
    .await?;

    sqlx::query(
        "INSERT INTO oligonucleotides (entity_id, sequence, date_ordered, storage_place, \
         description) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(base.id)
    .bind(&normalized)
    .bind(fields.date_ordered)
    .bind(&fields.storage_place)
    .bind(&fields.description)
    .execute(&mut **tx)
    .await?;

    Ok(base.id)
}

fn filtered(
    viewer_id: i64,
    filter: &OligonucleotideFilter,
) -> Result<ListQuery, ValidationError> {
    let mut query = ListQuery::new(SELECT_HEAD);
    query
        .review_visible(viewer_id)
        .contains("e.label", filter.label.as_deref())
        .contains("o.description", filter.description.as_deref());

    // A sequence query matches either strand.
    if let Some(raw) = filter.sequence.as_deref().filter(|s| !s.trim().is_empty()) {
        let needle = sequence::normalize(raw).map_err(|e| ValidationError::InvalidFormat {
            field: "sequence",
            reason: e.to_string(),
        })?;
        let reverse = sequence::reverse_complement(&needle);
        query.either_contains("o.sequence", &needle, &reverse);
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

    #[test]
    fn normalizes_sequence() {
        let fields = OligonucleotideFields {
            sequence: "atc gat".into(),
            date_ordered: None,
            storage_place: None,
            description: None,
        };
        assert_eq!(fields.normalized_sequence().unwrap(), "ATCGAT");
    }

    #[test]
    fn rejects_invalid_sequence() {
        let fields = OligonucleotideFields {
            sequence: "ATC9".into(),
            date_ordered: None,
            storage_place: None,
            description: None,
        };
        assert!(fields.normalized_sequence().is_err());
    }

    #[test]
    fn sequence_filter_matches_both_strands() {
        let filter = OligonucleotideFilter {
            sequence: Some("atcg".into()),
            ..Default::default()
        };
        let mut query = filtered(1, &filter).unwrap();
        let sql = query.sql().to_owned();

        assert!(sql.contains("o.sequence ILIKE"));
        assert!(sql.contains(" OR "));
    }

    #[test]
    fn orders_by_length() {
        let filter = OligonucleotideFilter {
            order_by: Some("length".into()),
            ..Default::default()
        };
        let mut query = filtered(1, &filter).unwrap();
        assert!(query.sql().contains("ORDER BY LENGTH(o.sequence) ASC"));
    }
}
