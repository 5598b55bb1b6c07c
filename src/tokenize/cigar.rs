//! CIGAR string tokenizer.
//!
//! A CIGAR string is a run of `<length><op>` pairs such as `3S10M2I5M`.
//! Every pair must carry a non-empty, non-zero decimal length followed by
//! one of the SAM operation symbols `MIDNSHP=X`.

use std::fmt;

use super::{parse_decimal, Cursor};
use crate::error::{Result, TableError};

/// One CIGAR operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CigarOp {
    /// `M`: alignment match (base may match or mismatch)
    Match,
    /// `I`: insertion to the reference
    Insertion,
    /// `D`: deletion from the reference
    Deletion,
    /// `N`: skipped reference region (introns in spliced alignments)
    Skip,
    /// `S`: soft clip, bases present in the read
    SoftClip,
    /// `H`: hard clip, bases absent from the read
    HardClip,
    /// `P`: padding
    Padding,
    /// `=`: sequence match
    SequenceMatch,
    /// `X`: sequence mismatch
    SequenceMismatch,
}

impl CigarOp {
    /// Map an operation symbol to its operation.
    #[inline]
    pub fn from_symbol(symbol: u8) -> Option<Self> {
        match symbol {
            b'M' => Some(CigarOp::Match),
            b'I' => Some(CigarOp::Insertion),
            b'D' => Some(CigarOp::Deletion),
            b'N' => Some(CigarOp::Skip),
            b'S' => Some(CigarOp::SoftClip),
            b'H' => Some(CigarOp::HardClip),
            b'P' => Some(CigarOp::Padding),
            b'=' => Some(CigarOp::SequenceMatch),
            b'X' => Some(CigarOp::SequenceMismatch),
            _ => None,
        }
    }

    #[inline]
    pub fn symbol(self) -> char {
        match self {
            CigarOp::Match => 'M',
            CigarOp::Insertion => 'I',
            CigarOp::Deletion => 'D',
            CigarOp::Skip => 'N',
            CigarOp::SoftClip => 'S',
            CigarOp::HardClip => 'H',
            CigarOp::Padding => 'P',
            CigarOp::SequenceMatch => '=',
            CigarOp::SequenceMismatch => 'X',
        }
    }

    /// Whether the operation advances the position in the read.
    #[inline]
    pub fn consumes_read(self) -> bool {
        matches!(
            self,
            CigarOp::Match
                | CigarOp::Insertion
                | CigarOp::SoftClip
                | CigarOp::SequenceMatch
                | CigarOp::SequenceMismatch
        )
    }

    /// Whether the operation advances the position on the reference.
    #[inline]
    pub fn consumes_reference(self) -> bool {
        matches!(
            self,
            CigarOp::Match
                | CigarOp::Deletion
                | CigarOp::Skip
                | CigarOp::SequenceMatch
                | CigarOp::SequenceMismatch
        )
    }
}

impl fmt::Display for CigarOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// A decoded `(length, operation)` pair. `len` is always at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub len: u32,
    pub op: CigarOp,
}

impl Segment {
    pub fn new(len: u32, op: CigarOp) -> Self {
        Self { len, op }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.len, self.op)
    }
}

/// Re-encode decoded segments into a CIGAR string.
pub fn encode_cigar(segments: &[Segment]) -> String {
    let mut out = String::with_capacity(segments.len() * 4);
    let mut buf = itoa::Buffer::new();
    for segment in segments {
        out.push_str(buf.format(segment.len));
        out.push(segment.op.symbol());
    }
    out
}

/// Pulls one [`Segment`] at a time out of a CIGAR string.
///
/// # Example
///
/// ```
/// use threen_table::tokenize::{CigarOp, CigarTokenizer, Segment};
///
/// let mut cigar = CigarTokenizer::new();
/// cigar.load_string("3S7M");
/// assert_eq!(cigar.next_segment().unwrap(), Some(Segment::new(3, CigarOp::SoftClip)));
/// assert_eq!(cigar.next_segment().unwrap(), Some(Segment::new(7, CigarOp::Match)));
/// assert_eq!(cigar.next_segment().unwrap(), None);
/// ```
#[derive(Debug, Default)]
pub struct CigarTokenizer {
    source: Vec<u8>,
    cursor: Cursor,
}

impl CigarTokenizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the input and rewind to its start.
    pub fn load_string(&mut self, cigar: &str) {
        self.source.clear();
        self.source.extend_from_slice(cigar.as_bytes());
        self.cursor.reset();
    }

    /// The currently loaded string.
    pub fn source(&self) -> &[u8] {
        &self.source
    }

    /// Decode the next segment.
    ///
    /// Returns `Ok(None)` once the string is consumed. On a grammar error the
    /// tokenizer is left exhausted until the next [`load_string`](Self::load_string).
    pub fn next_segment(&mut self) -> Result<Option<Segment>> {
        if self.cursor.is_at_end(&self.source) {
            return Ok(None);
        }
        let result = self.decode_one();
        if result.is_err() {
            self.cursor.finish(&self.source);
        }
        result.map(Some)
    }

    fn decode_one(&mut self) -> Result<Segment> {
        let start = self.cursor.position();
        self.cursor.skip_while(&self.source, |b| b.is_ascii_digit());
        let symbol_pos = self.cursor.position();

        let Some(symbol) = self.cursor.peek(&self.source) else {
            return Err(TableError::malformed(
                &self.source,
                start,
                "unterminated segment: length without operation",
            ));
        };
        let digits = &self.source[start..symbol_pos];
        if digits.is_empty() {
            return Err(TableError::malformed(
                &self.source,
                symbol_pos,
                format!("missing length before '{}'", symbol as char),
            ));
        }
        let op = CigarOp::from_symbol(symbol).ok_or_else(|| {
            TableError::malformed(
                &self.source,
                symbol_pos,
                format!("unknown operation '{}'", symbol as char),
            )
        })?;
        let len = parse_decimal(digits)
            .ok_or_else(|| TableError::malformed(&self.source, start, "length out of range"))?;
        if len == 0 {
            return Err(TableError::malformed(&self.source, start, "zero-length segment"));
        }

        self.cursor.advance(1);
        Ok(Segment { len, op })
    }
}

impl Iterator for CigarTokenizer {
    type Item = Result<Segment>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_segment().transpose()
    }
}
