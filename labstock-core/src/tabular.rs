//! Tabular file parsing for bulk imports.
//!
//! Import jobs accept CSV and Excel spreadsheets. Both formats are read into
//! the same [`Table`] shape so the import machinery never cares where the
//! data came from. Cells are trimmed and blank cells become `None`.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};

use crate::error::{CoreError, Result};

/// A parsed spreadsheet: a header row plus string-normalized data rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    /// Column names from the header row.
    pub columns: Vec<String>,
    /// Data rows; each row has exactly `columns.len()` cells.
    pub rows: Vec<Vec<Option<String>>>,
}

impl Table {
    /// Read a table from a file, dispatching on the extension.
    ///
    /// Supported: `.csv`, `.xls`, `.xlsx`.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        match extension.as_str() {
            "csv" => {
                let content = std::fs::read(path)?;
                Self::from_csv(&content)
                    .map_err(|e| CoreError::invalid_table(path, e.to_string()))
            }
            "xls" | "xlsx" => Self::from_workbook(path),
            other => Err(CoreError::unsupported_format(format!(".{other}"))),
        }
    }

    /// Parse CSV bytes. The first record is the header.
    pub fn from_csv(content: &[u8]) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(content);

        let columns: Vec<String> = reader
            .headers()
            .map_err(|e| CoreError::invalid_table("<csv>", e.to_string()))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| CoreError::invalid_table("<csv>", e.to_string()))?;
            let mut row: Vec<Option<String>> =
                record.iter().map(normalize_cell).collect();
            // Short records are padded so every row matches the header width.
            row.resize(columns.len(), None);
            row.truncate(columns.len());
            rows.push(row);
        }

        Ok(Self { columns, rows })
    }

    /// Parse the first worksheet of an Excel workbook.
    fn from_workbook(path: &Path) -> Result<Self> {
        let mut workbook = open_workbook_auto(path)
            .map_err(|e| CoreError::invalid_table(path, e.to_string()))?;

        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| CoreError::invalid_table(path, "workbook has no worksheets"))?
            .map_err(|e| CoreError::invalid_table(path, e.to_string()))?;

        let mut iter = range.rows();
        let header = iter
            .next()
            .ok_or_else(|| CoreError::invalid_table(path, "worksheet is empty"))?;

        let columns: Vec<String> = header
            .iter()
            .map(|cell| cell.to_string().trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for record in iter {
            let mut row: Vec<Option<String>> = record.iter().map(cell_to_string).collect();
            row.resize(columns.len(), None);
            row.truncate(columns.len());
            rows.push(row);
        }

        Ok(Self { columns, rows })
    }

    /// Index of a named column, if present.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// True if the table has no data rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn normalize_cell(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn cell_to_string(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        // Excel stores integer-looking values as floats; render 3.0 as "3".
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => {
            Some(format!("{}", *f as i64))
        }
        other => normalize_cell(&other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_csv_with_header() {
        let csv = b"label,sequence,storage_place\noligo-1,ATCG,freezer A\noligo-2,GGCC,\n";
        let table = Table::from_csv(csv).unwrap();

        assert_eq!(table.columns, vec!["label", "sequence", "storage_place"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0][0].as_deref(), Some("oligo-1"));
        assert_eq!(table.rows[1][2], None);
    }

    #[test]
    fn trims_whitespace_and_blanks() {
        let csv = b"a,b\n  x  ,   \n";
        let table = Table::from_csv(csv).unwrap();

        assert_eq!(table.rows[0][0].as_deref(), Some("x"));
        assert_eq!(table.rows[0][1], None);
    }

    #[test]
    fn pads_short_records() {
        let csv = b"a,b,c\n1,2\n";
        let table = Table::from_csv(csv).unwrap();

        assert_eq!(table.rows[0].len(), 3);
        assert_eq!(table.rows[0][2], None);
    }

    #[test]
    fn column_index_lookup() {
        let csv = b"label,host\nab-1,mouse\n";
        let table = Table::from_csv(csv).unwrap();

        assert_eq!(table.column_index("host"), Some(1));
        assert_eq!(table.column_index("missing"), None);
    }

    #[test]
    fn rejects_unknown_extension() {
        let mut file = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
        file.write_all(b"not a table").unwrap();

        let err = Table::from_path(file.path()).unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedFormat { .. }));
    }

    #[test]
    fn reads_csv_from_path() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(b"label\nitem-1\n").unwrap();

        let table = Table::from_path(file.path()).unwrap();
        assert_eq!(table.columns, vec!["label"]);
        assert_eq!(table.rows[0][0].as_deref(), Some("item-1"));
    }
}
