//! MD tag tokenizer.
//!
//! The MD string records how aligned read bases differ from the reference:
//! digit runs count matching bases, a single letter is a substituted
//! reference base, and `^` followed by letters lists reference bases deleted
//! from the read. `0` separates adjacent events (`1A0C3`).

use std::fmt;

use super::{parse_decimal, Cursor};
use crate::config::normalize_base;
use crate::error::{Result, TableError};

/// One decoded MD event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MdSegment {
    /// Number of consecutive matching bases.
    MatchRun(u32),
    /// Reference base at a mismatching position.
    Mismatch(u8),
    /// Reference bases deleted from the read, in reference order.
    DeletionRun(Vec<u8>),
}

impl MdSegment {
    /// Number of reference bases this event covers.
    pub fn reference_len(&self) -> usize {
        match self {
            MdSegment::MatchRun(n) => *n as usize,
            MdSegment::Mismatch(_) => 1,
            MdSegment::DeletionRun(bases) => bases.len(),
        }
    }
}

/// Formats a single event. Concatenating events does not rebuild an MD
/// string because separators are dropped; use [`encode_md`] for that.
impl fmt::Display for MdSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MdSegment::MatchRun(n) => write!(f, "{}", n),
            MdSegment::Mismatch(base) => write!(f, "{}", *base as char),
            MdSegment::DeletionRun(bases) => {
                write!(f, "^{}", String::from_utf8_lossy(bases))
            }
        }
    }
}

/// Re-encode decoded events into an MD string.
///
/// A `0` is written between two events that are not match runs, so a
/// mismatch after a deletion stays a separate event (`1^AC0T1`).
pub fn encode_md(segments: &[MdSegment]) -> String {
    let mut out = String::with_capacity(segments.len() * 3);
    let mut buf = itoa::Buffer::new();
    let mut after_event = false;
    for segment in segments {
        let is_event = !matches!(segment, MdSegment::MatchRun(_));
        if is_event && after_event {
            out.push('0');
        }
        match segment {
            MdSegment::MatchRun(n) => out.push_str(buf.format(*n)),
            MdSegment::Mismatch(base) => out.push(*base as char),
            MdSegment::DeletionRun(bases) => {
                out.push('^');
                out.extend(bases.iter().map(|&b| b as char));
            }
        }
        after_event = is_event;
    }
    out
}

/// Pulls one [`MdSegment`] at a time out of an MD string.
///
/// # Example
///
/// ```
/// use threen_table::tokenize::{MdSegment, MdTokenizer};
///
/// let mut md = MdTokenizer::new();
/// md.load_string("10A2^AC3");
/// let segments: Vec<MdSegment> = md.collect::<Result<_, _>>().unwrap();
/// assert_eq!(
///     segments,
///     vec![
///         MdSegment::MatchRun(10),
///         MdSegment::Mismatch(b'A'),
///         MdSegment::MatchRun(2),
///         MdSegment::DeletionRun(b"AC".to_vec()),
///         MdSegment::MatchRun(3),
///     ]
/// );
/// ```
#[derive(Debug, Default)]
pub struct MdTokenizer {
    source: Vec<u8>,
    cursor: Cursor,
}

impl MdTokenizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the input and rewind to its start.
    pub fn load_string(&mut self, md: &str) {
        self.source.clear();
        self.source.extend_from_slice(md.as_bytes());
        self.cursor.reset();
    }

    pub fn source(&self) -> &[u8] {
        &self.source
    }

    /// Decode the next event.
    ///
    /// Zero runs are separators and never produce a `MatchRun`, so a string
    /// made only of zeros yields nothing. On a grammar error the tokenizer is
    /// left exhausted until the next [`load_string`](Self::load_string).
    pub fn next_segment(&mut self) -> Result<Option<MdSegment>> {
        let result = self.decode_one();
        if result.is_err() {
            self.cursor.finish(&self.source);
        }
        result
    }

    fn decode_one(&mut self) -> Result<Option<MdSegment>> {
        self.cursor.skip_while(&self.source, |b| b == b'0');

        let Some(b) = self.cursor.peek(&self.source) else {
            return Ok(None);
        };

        if b.is_ascii_alphabetic() {
            self.cursor.advance(1);
            return Ok(Some(MdSegment::Mismatch(normalize_base(b))));
        }

        if b == b'^' {
            self.cursor.advance(1);
            let start = self.cursor.position();
            let n = self
                .cursor
                .skip_while(&self.source, |b| b.is_ascii_alphabetic());
            if n == 0 {
                return Err(TableError::malformed(
                    &self.source,
                    start - 1,
                    "deletion marker without deleted bases",
                ));
            }
            if self.cursor.peek(&self.source) == Some(b'^') {
                return Err(TableError::malformed(
                    &self.source,
                    self.cursor.position(),
                    "adjacent deletion runs",
                ));
            }
            let bases = self.source[start..start + n]
                .iter()
                .map(|&b| normalize_base(b))
                .collect();
            return Ok(Some(MdSegment::DeletionRun(bases)));
        }

        if b.is_ascii_digit() {
            let start = self.cursor.position();
            let n = self.cursor.skip_while(&self.source, |b| b.is_ascii_digit());
            let count = parse_decimal(&self.source[start..start + n]).ok_or_else(|| {
                TableError::malformed(&self.source, start, "match run out of range")
            })?;
            return Ok(Some(MdSegment::MatchRun(count)));
        }

        Err(TableError::malformed(
            &self.source,
            self.cursor.position(),
            format!("unexpected byte '{}'", b.escape_ascii()),
        ))
    }
}

impl Iterator for MdTokenizer {
    type Item = Result<MdSegment>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_segment().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;
    use serial_test::serial;
    use MdSegment::*;

    fn decode(s: &str) -> Result<Vec<MdSegment>> {
        let mut tokenizer = MdTokenizer::new();
        tokenizer.load_string(s);
        tokenizer.collect()
    }

    #[test]
    fn test_mixed_events() {
        assert_eq!(
            decode("10A2^AC3").unwrap(),
            vec![
                MatchRun(10),
                Mismatch(b'A'),
                MatchRun(2),
                DeletionRun(b"AC".to_vec()),
                MatchRun(3),
            ]
        );
    }

    #[test]
    fn test_zero_separators_collapse() {
        assert_eq!(decode("0A0").unwrap(), vec![Mismatch(b'A')]);
        assert_eq!(
            decode("1C0G1").unwrap(),
            vec![MatchRun(1), Mismatch(b'C'), Mismatch(b'G'), MatchRun(1)]
        );
        assert!(decode("0").unwrap().is_empty());
        assert!(decode("000").unwrap().is_empty());
    }

    #[test]
    fn test_internal_zeros_kept() {
        assert_eq!(decode("100").unwrap(), vec![MatchRun(100)]);
        assert_eq!(decode("05").unwrap(), vec![MatchRun(5)]);
    }

    #[test]
    fn test_adjacent_mismatches_are_single_characters() {
        assert_eq!(decode("AC").unwrap(), vec![Mismatch(b'A'), Mismatch(b'C')]);
    }

    #[test]
    fn test_no_terminator_required() {
        assert_eq!(decode("7").unwrap(), vec![MatchRun(7)]);
        assert_eq!(decode("3T").unwrap(), vec![MatchRun(3), Mismatch(b'T')]);
        assert_eq!(
            decode("2^GT").unwrap(),
            vec![MatchRun(2), DeletionRun(b"GT".to_vec())]
        );
    }

    #[test]
    fn test_deletion_then_mismatch_needs_separator() {
        // Letters after a deletion belong to it until a digit appears.
        assert_eq!(
            decode("1^AC0T1").unwrap(),
            vec![
                MatchRun(1),
                DeletionRun(b"AC".to_vec()),
                Mismatch(b'T'),
                MatchRun(1)
            ]
        );
    }

    #[test]
    fn test_adjacent_deletions_rejected() {
        let err = decode("3^AC^GT3").unwrap_err();
        assert!(matches!(err, TableError::MalformedEncoding { position: 4, .. }));
    }

    #[test]
    fn test_deletions_separated_by_zero() {
        assert_eq!(
            decode("^A0^C").unwrap(),
            vec![DeletionRun(b"A".to_vec()), DeletionRun(b"C".to_vec())]
        );
    }

    #[test]
    fn test_empty_deletion_rejected() {
        assert!(decode("^").is_err());
        assert!(decode("5^3").is_err());
    }

    #[test]
    fn test_unexpected_byte_rejected() {
        assert!(decode("5*").is_err());
        assert!(decode("-1").is_err());
    }

    #[test]
    fn test_reload_is_idempotent() {
        let mut tokenizer = MdTokenizer::new();
        tokenizer.load_string("4G0^T2");
        let first: Vec<MdSegment> = tokenizer.by_ref().collect::<Result<_>>().unwrap();
        tokenizer.load_string("4G0^T2");
        let second: Vec<MdSegment> = tokenizer.by_ref().collect::<Result<_>>().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn test_reference_len() {
        let total: usize = decode("10A2^AC3")
            .unwrap()
            .iter()
            .map(MdSegment::reference_len)
            .sum();
        assert_eq!(total, 18);
    }

    #[test]
    fn test_display_single_event() {
        assert_eq!(MatchRun(12).to_string(), "12");
        assert_eq!(Mismatch(b'T').to_string(), "T");
        assert_eq!(DeletionRun(b"AC".to_vec()).to_string(), "^AC");
    }

    #[test]
    fn test_encode_round_trip() {
        for s in ["10A2^AC3", "1^AC0T1", "1C0G1", "0A0^C2", "^A0^C"] {
            let segments = decode(s).unwrap();
            let text = encode_md(&segments);
            assert_eq!(decode(&text).unwrap(), segments, "re-encoding {s}");
        }
        assert_eq!(encode_md(&decode("1^AC0T1").unwrap()), "1^AC0T1");
        assert_eq!(encode_md(&decode("1C0G1").unwrap()), "1C0G1");
        assert_eq!(encode_md(&decode("10A2^AC3").unwrap()), "10A2^AC3");
        // leading and trailing zeros are not events
        assert_eq!(encode_md(&decode("0A0").unwrap()), "A");
    }

    #[test]
    fn test_encode_empty() {
        assert_eq!(encode_md(&[]), "");
    }

    #[test]
    fn test_error_exhausts_until_reload() {
        let mut tokenizer = MdTokenizer::new();
        tokenizer.load_string("5*3");
        assert_eq!(tokenizer.next_segment().unwrap(), Some(MatchRun(5)));
        assert!(tokenizer.next_segment().is_err());
        assert_eq!(tokenizer.next_segment().unwrap(), None);
        assert!(tokenizer.next().is_none());

        tokenizer.load_string("2A");
        assert_eq!(tokenizer.next_segment().unwrap(), Some(MatchRun(2)));
        assert_eq!(tokenizer.next_segment().unwrap(), Some(Mismatch(b'A')));
        assert_eq!(tokenizer.next_segment().unwrap(), None);
    }

    #[test]
    #[serial]
    fn test_lowercase_bases() {
        config::set_uppercase_bases(false);
        assert_eq!(decode("2g").unwrap(), vec![MatchRun(2), Mismatch(b'g')]);

        config::set_uppercase_bases(true);
        assert_eq!(
            decode("2g1^ac").unwrap(),
            vec![
                MatchRun(2),
                Mismatch(b'G'),
                MatchRun(1),
                DeletionRun(b"AC".to_vec())
            ]
        );
        config::set_uppercase_bases(false);
    }
}
