//! Export serialization: CSV, JSON, and FASTA for sequence-bearing kinds.

use chrono::Utc;
use serde::Serialize;

use crate::db::repos::oligonucleotides::Oligonucleotide;
use labstock_core::sequence;

/// Supported export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
    Fasta,
}

impl ExportFormat {
    pub fn parse(s: &str) -> Result<Self, ExportError> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            "fasta" => Ok(Self::Fasta),
            other => Err(ExportError::UnknownFormat {
                format: other.to_owned(),
            }),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Fasta => "fasta",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Csv => "text/csv; charset=utf-8",
            Self::Json => "application/json",
            Self::Fasta => "text/plain; charset=utf-8",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("unknown export format '{format}'")]
    UnknownFormat { format: String },

    #[error("{kind} cannot be exported as FASTA")]
    FastaUnsupported { kind: &'static str },

    #[error("CSV serialization failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Download filename, e.g. `Antibody_2026-08-25.csv`.
pub fn filename(kind_name: &str, format: ExportFormat) -> String {
    format!(
        "{kind_name}_{}.{}",
        Utc::now().format("%Y-%m-%d"),
        format.extension()
    )
}

pub fn to_csv<T: Serialize>(items: &[T]) -> Result<Vec<u8>, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for item in items {
        writer.serialize(item)?;
    }
    Ok(writer
        .into_inner()
        .map_err(|e| ExportError::Csv(e.into_error().into()))?)
}

pub fn to_json<T: Serialize>(items: &[T]) -> Result<Vec<u8>, ExportError> {
    let mut bytes = serde_json::to_vec_pretty(items)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// FASTA with one record per oligonucleotide.
pub fn oligos_to_fasta(items: &[Oligonucleotide]) -> Vec<u8> {
    let mut out = String::new();
    for oligo in items {
        out.push_str(&sequence::fasta_record(&oligo.label, oligo.id, &oligo.sequence));
    }
    out.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_formats() {
        assert_eq!(ExportFormat::parse("CSV").unwrap(), ExportFormat::Csv);
        assert_eq!(ExportFormat::parse("fasta").unwrap(), ExportFormat::Fasta);
        assert!(ExportFormat::parse("xml").is_err());
    }

    #[test]
    fn filename_carries_date_and_extension() {
        let name = filename("Plasmid", ExportFormat::Json);
        assert!(name.starts_with("Plasmid_"));
        assert!(name.ends_with(".json"));
    }

    #[derive(Serialize)]
    struct Row {
        label: &'static str,
        rating: Option<i32>,
    }

    #[test]
    fn csv_has_headers_and_rows() {
        let rows = [
            Row {
                label: "a",
                rating: Some(3),
            },
            Row {
                label: "b",
                rating: None,
            },
        ];
        let bytes = to_csv(&rows).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("label,rating\n"));
        assert!(text.contains("a,3\n"));
        assert!(text.contains("b,\n"));
    }

    #[test]
    fn io_failures_surface_as_csv_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err = ExportError::Csv(io.into());
        assert!(err.to_string().starts_with("CSV serialization failed"));
    }

    #[test]
    fn json_is_an_array() {
        let rows = [Row {
            label: "a",
            rating: None,
        }];
        let bytes = to_json(&rows).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 1);
    }

    #[test]
    fn fasta_records() {
        let oligo = Oligonucleotide {
            id: 12,
            label: "primer-fwd".into(),
            owner_id: 1,
            origin: None,
            under_review: false,
            created_at: Utc::now(),
            updated_at: None,
            sequence: "ATCGATCG".into(),
            date_ordered: None,
            storage_place: None,
            description: None,
        };
        let text = String::from_utf8(oligos_to_fasta(&[oligo])).unwrap();
        assert!(text.starts_with(">primer-fwd id=12;len=8\n"));
        assert!(text.contains("ATCGATCG"));
    }
}
