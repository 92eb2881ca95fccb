//! Bulk import jobs.
//!
//! An import runs in three steps: upload a spreadsheet (stored via the file
//! repository), map its columns onto importable fields, then execute. The
//! execute step is all-or-nothing: one bad row rolls back the whole batch.
//! Imported entities are flagged under review and stay invisible to other
//! users until confirmed.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;

use super::{antibodies, chemicals, fly_stocks, oligonucleotides, plasmids, DbError};
use crate::models::{EntityKind, EntityLabel};
use labstock_core::tabular::Table;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ImportJob {
    pub id: i64,
    pub user_id: i64,
    pub file_id: i64,
    pub entity_type: String,
    pub is_finished: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ColumnMapping {
    pub mapped_field: String,
    pub input_column: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobWithMappings {
    #[serde(flatten)]
    pub job: ImportJob,
    pub mappings: Vec<ColumnMapping>,
}

const JOB_COLUMNS: &str = "id, user_id, file_id, entity_type, is_finished, created_at";

pub struct ImportRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> ImportRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Create a job with one mapping slot per importable field.
    ///
    /// Slots are pre-filled where a spreadsheet column matches the field
    /// name (case-insensitive, spaces treated as underscores).
    pub async fn create_job(
        &self,
        user_id: i64,
        file_id: i64,
        kind: EntityKind,
        columns: &[String],
    ) -> Result<JobWithMappings, DbError> {
        let mut tx = self.pool.begin().await?;

        let job: ImportJob = sqlx::query_as(&format!(
            "INSERT INTO import_jobs (user_id, file_id, entity_type) \
             VALUES ($1, $2, $3) RETURNING {JOB_COLUMNS}"
        ))
        .bind(user_id)
        .bind(file_id)
        .bind(kind.as_str())
        .fetch_one(&mut *tx)
        .await?;

        for field in kind.importable_fields() {
            let guess = columns
                .iter()
                .find(|c| normalize_header(c) == *field)
                .map(|c| c.as_str());

            sqlx::query(
                "INSERT INTO column_mappings (job_id, mapped_field, input_column) \
                 VALUES ($1, $2, $3)",
            )
            .bind(job.id)
            .bind(field)
            .bind(guess)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        self.get(job.id).await
    }

    pub async fn get(&self, id: i64) -> Result<JobWithMappings, DbError> {
        let job: ImportJob = sqlx::query_as(&format!(
            "SELECT {JOB_COLUMNS} FROM import_jobs WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("import job", id))?;

        let mappings = sqlx::query_as(
            "SELECT mapped_field, input_column FROM column_mappings \
             WHERE job_id = $1 ORDER BY mapped_field",
        )
        .bind(id)
        .fetch_all(self.pool)
        .await?;

        Ok(JobWithMappings { job, mappings })
    }

    /// Unfinished jobs of one user, newest first.
    pub async fn list_pending(&self, user_id: i64) -> Result<Vec<ImportJob>, DbError> {
        let rows = sqlx::query_as(&format!(
            "SELECT {JOB_COLUMNS} FROM import_jobs \
             WHERE user_id = $1 AND NOT is_finished ORDER BY created_at DESC, id"
        ))
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Assign a spreadsheet column to a field (None clears the slot).
    pub async fn set_mapping(
        &self,
        job_id: i64,
        mapped_field: &str,
        input_column: Option<&str>,
    ) -> Result<(), DbError> {
        let result = sqlx::query(
            "UPDATE column_mappings SET input_column = $3 \
             WHERE job_id = $1 AND mapped_field = $2",
        )
        .bind(job_id)
        .bind(mapped_field)
        .bind(input_column)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::Invalid(format!(
                "no importable field named '{mapped_field}'"
            )));
        }
        Ok(())
    }

    pub async fn delete(&self, id: i64) -> Result<(), DbError> {
        let result = sqlx::query("DELETE FROM import_jobs WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("import job", id));
        }
        Ok(())
    }

    /// Run the import. Every row becomes an under-review entity owned by
    /// the importing user; any error rolls back the whole batch.
    ///
    /// Returns the ids of the created entities.
    pub async fn execute(
        &self,
        job_id: i64,
        table: &Table,
        origin: &str,
    ) -> Result<Vec<i64>, DbError> {
        let JobWithMappings { job, mappings } = self.get(job_id).await?;
        if job.is_finished {
            return Err(DbError::Invalid("import job already executed".into()));
        }
        let kind = EntityKind::parse(&job.entity_type)
            .map_err(|e| DbError::Invalid(e.to_string()))?;

        // Resolve mapped columns to indexes once, up front.
        let mut indexes: HashMap<&str, usize> = HashMap::new();
        for mapping in &mappings {
            if let Some(column) = mapping.input_column.as_deref() {
                let idx = table.column_index(column).ok_or_else(|| {
                    DbError::Invalid(format!("column '{column}' not found in the uploaded table"))
                })?;
                indexes.insert(mapping.mapped_field.as_str(), idx);
            }
        }
        if !indexes.contains_key("label") {
            return Err(DbError::Invalid("a column must be mapped to 'label'".into()));
        }

        let mut tx = self.pool.begin().await?;
        let mut created = Vec::with_capacity(table.rows.len());

        for (i, cells) in table.rows.iter().enumerate() {
            // Header is line 1; data starts on line 2.
            let line = i + 2;
            let row = RowValues {
                indexes: &indexes,
                cells,
            };
            let id = insert_row(&mut tx, kind, job.user_id, &row, origin)
                .await
                .map_err(|e| match e {
                    DbError::Invalid(msg) => DbError::Invalid(format!("row {line}: {msg}")),
                    DbError::Conflict { what } => {
                        DbError::Invalid(format!("row {line}: duplicate {what}"))
                    }
                    other => other,
                })?;
            created.push(id);
        }

        sqlx::query("UPDATE import_jobs SET is_finished = TRUE WHERE id = $1")
            .bind(job_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(created)
    }
}

/// One spreadsheet row viewed through the column mapping.
struct RowValues<'t> {
    indexes: &'t HashMap<&'t str, usize>,
    cells: &'t [Option<String>],
}

impl RowValues<'_> {
    fn text(&self, field: &str) -> Option<String> {
        self.indexes
            .get(field)
            .and_then(|&i| self.cells.get(i))
            .and_then(|c| c.clone())
    }

    fn required(&self, field: &'static str) -> Result<String, DbError> {
        self.text(field)
            .ok_or_else(|| DbError::Invalid(format!("missing value for '{field}'")))
    }

    fn date(&self, field: &str) -> Result<Option<NaiveDate>, DbError> {
        self.text(field).map(|v| parse_date(&v)).transpose()
    }

    fn i32(&self, field: &str) -> Result<Option<i32>, DbError> {
        self.text(field)
            .map(|v| {
                v.parse()
                    .map_err(|_| DbError::Invalid(format!("'{v}' is not an integer")))
            })
            .transpose()
    }

    fn i64(&self, field: &str) -> Result<Option<i64>, DbError> {
        self.text(field)
            .map(|v| {
                v.parse()
                    .map_err(|_| DbError::Invalid(format!("'{v}' is not an integer")))
            })
            .transpose()
    }

    fn f64(&self, field: &str) -> Result<Option<f64>, DbError> {
        self.text(field)
            .map(|v| {
                v.parse()
                    .map_err(|_| DbError::Invalid(format!("'{v}' is not a number")))
            })
            .transpose()
    }
}

async fn insert_row(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    kind: EntityKind,
    owner_id: i64,
    row: &RowValues<'_>,
    origin: &str,
) -> Result<i64, DbError> {
    let label = EntityLabel::new(&row.required("label")?)
        .map_err(|e| DbError::Invalid(e.to_string()))?;
    let origin = Some(origin);

    match kind {
        EntityKind::Antibody => {
            let fields = antibodies::AntibodyFields {
                host: row.required("host")?,
                antigen: row.required("antigen")?,
                clone_name: row.text("clone"),
                specification: row.text("specification"),
                storage_temp: row.i32("storage_temp")?,
                source: row.text("source"),
                conjugate: row.text("conjugate"),
                storage_info: row.text("storage_info"),
            };
            antibodies::insert_detail(tx, owner_id, &label, &fields, origin, true).await
        }
        EntityKind::Plasmid => {
            let fields = plasmids::PlasmidFields {
                insert_name: row.required("insert_name")?,
                vector: row.text("vector"),
                cloning_date: row.date("cloning_date")?,
                description: row.text("description"),
                reference: row.text("reference"),
            };
            plasmids::insert_detail(tx, owner_id, &label, &fields, origin, true).await
        }
        EntityKind::Oligonucleotide => {
            let fields = oligonucleotides::OligonucleotideFields {
                sequence: row.required("sequence")?,
                date_ordered: row.date("date_ordered")?,
                storage_place: row.text("storage_place"),
                description: row.text("description"),
            };
            oligonucleotides::insert_detail(tx, owner_id, &label, &fields, origin, true).await
        }
        EntityKind::Chemical => {
            let fields = chemicals::ChemicalFields {
                cas_number: row.text("cas_number"),
                pubchem_cid: row.i64("pubchem_cid")?,
                molecular_weight: row.f64("molecular_weight")?,
                responsible_id: None,
                storage_info: row.text("storage_info"),
            };
            chemicals::insert_detail(tx, owner_id, &label, &fields, origin, true).await
        }
        EntityKind::FlyStock => {
            let chromosome = |field: &str| row.text(field).unwrap_or_else(|| "+".to_owned());
            let fields = fly_stocks::FlyStockFields {
                chromosome_x: chromosome("chromosome_x"),
                chromosome_y: chromosome("chromosome_y"),
                chromosome_2: chromosome("chromosome_2"),
                chromosome_3: chromosome("chromosome_3"),
                chromosome_4: chromosome("chromosome_4"),
                source: row.text("source"),
                reference: row.text("reference"),
                rating: row.i32("rating")?,
                discarded_date: None,
            };
            fly_stocks::insert_detail(tx, owner_id, &label, &fields, origin, true).await
        }
    }
}

fn normalize_header(header: &str) -> String {
    header.trim().to_ascii_lowercase().replace([' ', '-'], "_")
}

fn parse_date(value: &str) -> Result<NaiveDate, DbError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(value, "%d.%m.%Y"))
        .map_err(|_| DbError::Invalid(format!("'{value}' is not a date")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_normalization() {
        assert_eq!(normalize_header(" Insert Name "), "insert_name");
        assert_eq!(normalize_header("CAS-Number"), "cas_number");
    }

    #[test]
    fn date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        assert_eq!(parse_date("2024-03-15").unwrap(), expected);
        assert_eq!(parse_date("15.03.2024").unwrap(), expected);
        assert!(parse_date("March 15").is_err());
    }

    #[test]
    fn row_values_lookup() {
        let mut indexes = HashMap::new();
        indexes.insert("label", 0);
        indexes.insert("rating", 2);
        let cells = vec![Some("w1118".to_owned()), None, Some("4".to_owned())];
        let row = RowValues {
            indexes: &indexes,
            cells: &cells,
        };

        assert_eq!(row.required("label").unwrap(), "w1118");
        assert_eq!(row.i32("rating").unwrap(), Some(4));
        assert!(row.text("source").is_none());
        assert!(row.required("source").is_err());
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn execute_is_all_or_nothing() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = crate::db::create_pool(&url, 2).await.expect("pool");
        crate::db::migrations::run(&pool).await.expect("migrations");

        let users = super::super::UserRepo::new(&pool);
        let user = users
            .create("import-test", "import@lab.example", "h", false, &[])
            .await
            .expect("user");
        let files = super::super::FileRepo::new(&pool);
        let file = files
            .register(user.id, None, "oligos.csv", None)
            .await
            .expect("file");

        let table = Table {
            columns: vec!["Label".into(), "Sequence".into()],
            rows: vec![
                vec![Some("oligo-import-1".into()), Some("ATCG".into())],
                vec![Some("oligo-import-2".into()), Some("not a sequence!".into())],
            ],
        };

        let repo = ImportRepo::new(&pool);
        let job = repo
            .create_job(user.id, file.id, EntityKind::Oligonucleotide, &table.columns)
            .await
            .expect("job");

        // Second row is invalid, so nothing may be created.
        let err = repo
            .execute(job.job.id, &table, "import of oligos.csv")
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Invalid(msg) if msg.starts_with("row 3:")));

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM entities WHERE label LIKE 'oligo-import-%'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(count, 0);
    }
}
