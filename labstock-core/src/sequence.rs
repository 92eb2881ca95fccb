//! Nucleotide sequence helpers for oligonucleotides.
//!
//! Sequences are stored uppercase with whitespace stripped. Characters
//! outside `ATCG` are tolerated on input (degenerate bases, lowercase
//! annotations) but masked when rendering FASTA.

use crate::error::{CoreError, Result};

/// Width of sequence lines in rendered FASTA output.
const FASTA_LINE_WIDTH: usize = 60;

/// Normalize a raw sequence: strip whitespace, uppercase.
///
/// Rejects characters that are neither ASCII letters nor `.`.
pub fn normalize(raw: &str) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if ch.is_whitespace() {
            continue;
        }
        if !ch.is_ascii_alphabetic() && ch != '.' {
            return Err(CoreError::InvalidSequence { character: ch });
        }
        out.push(ch.to_ascii_uppercase());
    }
    Ok(out)
}

/// GC content as a percentage of sequence length. Zero for empty input.
pub fn gc_content(sequence: &str) -> f64 {
    if sequence.is_empty() {
        return 0.0;
    }
    let gc = sequence
        .chars()
        .filter(|c| matches!(c.to_ascii_uppercase(), 'G' | 'C'))
        .count();
    100.0 * gc as f64 / sequence.len() as f64
}

/// Reverse complement of a normalized sequence.
///
/// Non-ATCG characters map to `N` so a partial-match search over the result
/// never produces false positives.
pub fn reverse_complement(sequence: &str) -> String {
    sequence
        .chars()
        .rev()
        .map(|c| match c.to_ascii_uppercase() {
            'A' => 'T',
            'T' => 'A',
            'C' => 'G',
            'G' => 'C',
            _ => 'N',
        })
        .collect()
}

/// Render one FASTA record. Bases outside ATCG are masked with `.`.
///
/// The description line carries the database id and length, matching the
/// export format of the browsing UI.
pub fn fasta_record(label: &str, id: i64, sequence: &str) -> String {
    let masked: String = sequence
        .chars()
        .map(|c| {
            let upper = c.to_ascii_uppercase();
            if matches!(upper, 'A' | 'T' | 'C' | 'G') {
                upper
            } else {
                '.'
            }
        })
        .collect();

    let mut out = format!(">{label} id={id};len={}\n", masked.len());
    for chunk in masked.as_bytes().chunks(FASTA_LINE_WIDTH) {
        // Chunks of an ASCII string are valid UTF-8.
        out.push_str(std::str::from_utf8(chunk).unwrap_or(""));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_and_uppercases() {
        assert_eq!(normalize("atc g\tGA\n").unwrap(), "ATCGGA");
    }

    #[test]
    fn normalize_rejects_digits() {
        let err = normalize("ATC1G").unwrap_err();
        assert!(matches!(err, CoreError::InvalidSequence { character: '1' }));
    }

    #[test]
    fn gc_content_basic() {
        assert_eq!(gc_content("GGCC"), 100.0);
        assert_eq!(gc_content("ATAT"), 0.0);
        assert_eq!(gc_content("ATGC"), 50.0);
        assert_eq!(gc_content(""), 0.0);
    }

    #[test]
    fn reverse_complement_basic() {
        assert_eq!(reverse_complement("ATCG"), "CGAT");
        assert_eq!(reverse_complement("AAGX"), "NCTT");
    }

    #[test]
    fn fasta_masks_and_wraps() {
        let seq = "A".repeat(70) + "R";
        let record = fasta_record("oligo-1", 42, &seq);
        let lines: Vec<&str> = record.lines().collect();

        assert_eq!(lines[0], ">oligo-1 id=42;len=71");
        assert_eq!(lines[1].len(), 60);
        assert_eq!(lines[2], "AAAAAAAAAA.");
    }
}
