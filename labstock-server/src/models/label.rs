//! Entity label validation
//!
//! Labels name the tracked item (stock token, chemical name, oligo id) and
//! are unique across all entity kinds.

use super::ValidationError;

/// Maximum length for entity labels, matching the DB column.
const MAX_LABEL_LEN: usize = 64;

/// Validated entity label.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityLabel(String);

impl EntityLabel {
    /// Create a new label.
    ///
    /// # Rules
    /// - Surrounding whitespace is stripped
    /// - Non-empty after trimming
    /// - Max 64 characters
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        let trimmed = s.trim();

        if trimmed.is_empty() {
            return Err(ValidationError::Empty { field: "label" });
        }

        if trimmed.chars().count() > MAX_LABEL_LEN {
            return Err(ValidationError::TooLong {
                field: "label",
                max: MAX_LABEL_LEN,
            });
        }

        Ok(Self(trimmed.to_owned()))
    }

    /// Get the label as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume and return the inner string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for EntityLabel {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_labels() {
        assert!(EntityLabel::new("anti-GFP").is_ok());
        assert!(EntityLabel::new("pUC19 Δlac").is_ok());
        assert_eq!(EntityLabel::new("  oligo-7  ").unwrap().as_str(), "oligo-7");
    }

    #[test]
    fn rejects_empty() {
        let err = EntityLabel::new("   ").unwrap_err();
        assert!(matches!(err, ValidationError::Empty { .. }));
    }

    #[test]
    fn rejects_too_long() {
        let err = EntityLabel::new(&"x".repeat(65)).unwrap_err();
        assert!(matches!(err, ValidationError::TooLong { max: 64, .. }));
    }
}
