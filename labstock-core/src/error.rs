/// Structured error types for labstock-core.
///
/// Uses `thiserror` for composable library errors. The CLI binary wraps
/// these in `anyhow` for convenience; the server maps them onto HTTP
/// responses.
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for labstock-core operations
#[derive(Error, Debug)]
pub enum CoreError {
    /// I/O operation failed
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    /// Configuration error
    #[error("Configuration error: {reason}")]
    Config { reason: String },

    /// Tabular file could not be parsed
    #[error("Invalid table in file {path:?}: {reason}")]
    InvalidTable { path: PathBuf, reason: String },

    /// File extension is not a supported tabular format
    #[error("Unsupported table format: {extension:?} (expected .csv, .xls or .xlsx)")]
    UnsupportedFormat { extension: String },

    /// Sequence contains characters outside the nucleotide alphabet
    #[error("Invalid nucleotide sequence: unexpected character '{character}'")]
    InvalidSequence { character: char },
}

/// Result type alias for labstock-core operations
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Create a config error
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Create an invalid table error
    pub fn invalid_table(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidTable {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an unsupported format error
    pub fn unsupported_format(extension: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            extension: extension.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::config("missing database url");
        assert_eq!(err.to_string(), "Configuration error: missing database url");

        let err = CoreError::unsupported_format(".pdf");
        assert!(err.to_string().contains(".pdf"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let core_err: CoreError = io_err.into();
        assert!(core_err.to_string().contains("file not found"));
    }
}
