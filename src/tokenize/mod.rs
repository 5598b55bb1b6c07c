//! Segment tokenizers for per-read alignment strings.
//!
//! Two independent tokenizers share only the [`Cursor`] defined here:
//! - [`CigarTokenizer`] decodes run-length alignment operations (`10M2I5M`)
//! - [`MdTokenizer`] decodes reference differences (`10A2^AC3`)
//!
//! Each tokenizer owns its input buffer and is meant to be owned by a single
//! worker thread. Reloading resets the cursor, so one instance can be reused
//! for every record a worker sees.

pub mod cigar;
pub mod md;

pub use cigar::{encode_cigar, CigarOp, CigarTokenizer, Segment};
pub use md::{encode_md, MdSegment, MdTokenizer};

/// Read position within an immutable byte string.
///
/// Only moves forward between resets.
#[derive(Debug, Default, Clone, Copy)]
pub struct Cursor {
    pos: usize,
}

impl Cursor {
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn reset(&mut self) {
        self.pos = 0;
    }

    #[inline]
    pub fn is_at_end(&self, source: &[u8]) -> bool {
        self.pos >= source.len()
    }

    /// Byte under the cursor, if any.
    #[inline]
    pub fn peek(&self, source: &[u8]) -> Option<u8> {
        source.get(self.pos).copied()
    }

    #[inline]
    pub fn advance(&mut self, n: usize) {
        self.pos += n;
    }

    /// Jump to the end of `source`; used to exhaust a tokenizer after an error.
    #[inline]
    pub fn finish(&mut self, source: &[u8]) {
        self.pos = source.len();
    }

    /// Advance while `pred` holds and return the number of bytes skipped.
    #[inline]
    pub fn skip_while(&mut self, source: &[u8], pred: impl Fn(u8) -> bool) -> usize {
        let start = self.pos;
        while let Some(b) = self.peek(source) {
            if !pred(b) {
                break;
            }
            self.pos += 1;
        }
        self.pos - start
    }
}

/// Checked decimal parse of an all-digit byte slice.
///
/// Returns None on empty input, a non-digit byte, or overflow.
#[inline]
pub(crate) fn parse_decimal(bytes: &[u8]) -> Option<u32> {
    if bytes.is_empty() {
        return None;
    }
    let mut n: u32 = 0;
    for &b in bytes {
        let d = b.wrapping_sub(b'0');
        if d > 9 {
            return None;
        }
        n = n.checked_mul(10)?.checked_add(d as u32)?;
    }
    Some(n)
}
