//! labstock-core: shared utilities for the labstock inventory service
//!
//! Framework-free pieces used by the server and the CLI:
//! - configuration loading (TOML with environment overrides)
//! - tabular file parsing for bulk imports (CSV and Excel)
//! - nucleotide sequence helpers (normalization, GC content, FASTA)

pub mod config;
pub mod error;
pub mod sequence;
pub mod tabular;

pub use config::AppConfig;
pub use error::{CoreError, Result};
