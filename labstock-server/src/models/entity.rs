//! Entity kinds and shared base-row fields.
//!
//! Every tracked item shares the base columns of the `entities` table; each
//! kind adds its own detail table joined by `entity_id`.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::ValidationError;

/// The entity kinds the inventory tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Antibody,
    Plasmid,
    Oligonucleotide,
    Chemical,
    FlyStock,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        Self::Antibody,
        Self::Plasmid,
        Self::Oligonucleotide,
        Self::Chemical,
        Self::FlyStock,
    ];

    /// Stable identifier stored in `entities.entity_type`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Antibody => "antibody",
            Self::Plasmid => "plasmid",
            Self::Oligonucleotide => "oligonucleotide",
            Self::Chemical => "chemical",
            Self::FlyStock => "fly_stock",
        }
    }

    /// Parse a kind from its stable identifier. Not case-sensitive.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s.to_ascii_lowercase().as_str() {
            "antibody" => Ok(Self::Antibody),
            "plasmid" => Ok(Self::Plasmid),
            "oligonucleotide" => Ok(Self::Oligonucleotide),
            "chemical" => Ok(Self::Chemical),
            "fly_stock" => Ok(Self::FlyStock),
            other => Err(ValidationError::InvalidVariant {
                field: "entity type",
                value: other.to_owned(),
            }),
        }
    }

    /// Display name used in export filenames.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Antibody => "Antibody",
            Self::Plasmid => "Plasmid",
            Self::Oligonucleotide => "Oligonucleotide",
            Self::Chemical => "Chemical",
            Self::FlyStock => "FlyStock",
        }
    }

    /// Fields that a bulk import may map spreadsheet columns onto.
    ///
    /// `label` is always first; ids and timestamps are never importable.
    pub fn importable_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Antibody => &[
                "label",
                "host",
                "antigen",
                "clone",
                "specification",
                "storage_temp",
                "source",
                "conjugate",
                "storage_info",
            ],
            Self::Plasmid => &[
                "label",
                "insert_name",
                "vector",
                "cloning_date",
                "description",
                "reference",
            ],
            Self::Oligonucleotide => &[
                "label",
                "sequence",
                "date_ordered",
                "storage_place",
                "description",
            ],
            Self::Chemical => &[
                "label",
                "cas_number",
                "pubchem_cid",
                "molecular_weight",
                "storage_info",
            ],
            Self::FlyStock => &[
                "label",
                "chromosome_x",
                "chromosome_y",
                "chromosome_2",
                "chromosome_3",
                "chromosome_4",
                "source",
                "reference",
                "rating",
            ],
        }
    }

    /// Kinds that can carry batches (consumables).
    pub fn is_consumable(&self) -> bool {
        matches!(self, Self::Antibody | Self::Chemical)
    }
}

/// Base columns shared by every entity row.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct EntityBase {
    pub id: i64,
    pub label: String,
    pub entity_type: String,
    pub owner_id: i64,
    pub origin: Option<String>,
    pub under_review: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl EntityBase {
    /// Whether the entity may still be deleted.
    ///
    /// Entities stay deletable while flagged under review or while younger
    /// than the configured window.
    pub fn deletable(&self, deletable_hours: i64, now: DateTime<Utc>) -> bool {
        self.under_review || now - self.created_at <= Duration::hours(deletable_hours)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_roundtrip() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::parse(kind.as_str()).unwrap(), kind);
        }
        assert_eq!(EntityKind::parse("FLY_STOCK").unwrap(), EntityKind::FlyStock);
        assert!(EntityKind::parse("enzyme").is_err());
    }

    #[test]
    fn importable_fields_start_with_label() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.importable_fields()[0], "label");
        }
    }

    fn base_at(created: DateTime<Utc>, under_review: bool) -> EntityBase {
        EntityBase {
            id: 1,
            label: "x".into(),
            entity_type: "antibody".into(),
            owner_id: 1,
            origin: None,
            under_review,
            created_at: created,
            updated_at: None,
        }
    }

    #[test]
    fn deletable_window() {
        let now = Utc::now();

        let fresh = base_at(now - Duration::hours(1), false);
        assert!(fresh.deletable(72, now));

        let old = base_at(now - Duration::hours(100), false);
        assert!(!old.deletable(72, now));

        let reviewed = base_at(now - Duration::hours(100), true);
        assert!(reviewed.deletable(72, now));
    }
}
