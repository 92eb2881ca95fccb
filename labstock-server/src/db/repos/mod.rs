//! Repositories: one module per resource.
//!
//! All repositories borrow the pool and use runtime-bound queries. Unique
//! violations surface as [`DbError::Conflict`] so the HTTP layer can answer
//! 409 instead of 500.

pub mod antibodies;
pub mod batches;
pub mod chemicals;
pub mod comments;
pub mod entities;
pub mod files;
pub mod fly_stocks;
pub mod imports;
pub mod oligonucleotides;
pub mod plasmids;
pub mod requests;
pub mod sessions;
pub mod users;

pub use antibodies::AntibodyRepo;
pub use batches::BatchRepo;
pub use chemicals::ChemicalRepo;
pub use comments::CommentRepo;
pub use entities::EntityRepo;
pub use files::FileRepo;
pub use fly_stocks::FlyStockRepo;
pub use imports::ImportRepo;
pub use oligonucleotides::OligonucleotideRepo;
pub use plasmids::PlasmidRepo;
pub use requests::RequestRepo;
pub use sessions::SessionRepo;
pub use users::UserRepo;

/// Database error type shared by all repositories.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(sqlx::Error),

    #[error("not found: {resource} '{id}'")]
    NotFound { resource: &'static str, id: String },

    #[error("duplicate value for {what}")]
    Conflict { what: String },

    #[error("referenced row does not exist: {what}")]
    ForeignKey { what: String },

    #[error("{0}")]
    Invalid(String),
}

impl From<sqlx::Error> for DbError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &e {
            let what = db_err
                .constraint()
                .map(str::to_owned)
                .unwrap_or_else(|| "unique column".to_owned());

            if db_err.is_unique_violation() {
                return Self::Conflict { what };
            }
            if db_err.is_foreign_key_violation() {
                return Self::ForeignKey { what };
            }
        }

        Self::Sqlx(e)
    }
}

impl From<crate::models::ValidationError> for DbError {
    fn from(e: crate::models::ValidationError) -> Self {
        Self::Invalid(e.to_string())
    }
}

impl DbError {
    /// Not-found constructor with a numeric id.
    pub fn not_found(resource: &'static str, id: i64) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        let err = DbError::not_found("antibody", 17);
        assert_eq!(err.to_string(), "not found: antibody '17'");
    }

    #[test]
    fn row_not_found_passes_through() {
        let err: DbError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, DbError::Sqlx(_)));
    }

    #[test]
    fn validation_error_maps_to_invalid() {
        // Bad filter input (e.g. an unknown order column) surfaces through
        // the repositories as an invalid-request error, not a 500.
        let err: DbError = crate::models::ValidationError::InvalidVariant {
            field: "order_by",
            value: "no_such_column".into(),
        }
        .into();
        assert!(matches!(err, DbError::Invalid(_)));
        assert_eq!(err.to_string(), "invalid order_by value: 'no_such_column'");
    }
}
