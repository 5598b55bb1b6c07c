//! Field extraction from SAM alignment lines.
//!
//! Only the columns the summarize pipeline needs are pulled out; everything
//! else in the line is left uninterpreted.

use crate::error::{Result, TableError};
use memchr::memchr;

/// Mandatory SAM columns before the optional tags.
const MANDATORY_FIELDS: usize = 11;

/// SAM flag bit for an unmapped segment.
const FLAG_UNMAPPED: u16 = 0x4;

/// Borrowed view of the alignment columns of one SAM line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignmentFields<'a> {
    pub qname: &'a str,
    pub flag: u16,
    pub rname: &'a str,
    /// 1-based leftmost mapping position (0 when unavailable)
    pub pos: u64,
    pub cigar: &'a str,
    /// Value of the `MD:Z:` tag, if present.
    pub md: Option<&'a str>,
}

impl AlignmentFields<'_> {
    /// True when the record carries no usable alignment.
    pub fn is_unmapped(&self) -> bool {
        self.flag & FLAG_UNMAPPED != 0 || self.cigar == "*" || self.rname == "*"
    }
}

/// Check if a line should be skipped (empty or header).
#[inline]
pub fn should_skip_line(line: &str) -> bool {
    line.is_empty() || line.starts_with('@')
}

/// Split one SAM line (without its line terminator) into alignment fields.
pub fn parse_alignment_line(line: &str, line_number: usize) -> Result<AlignmentFields<'_>> {
    let bytes = line.as_bytes();
    let mut fields = [""; MANDATORY_FIELDS];
    let mut start = 0;

    for (i, slot) in fields.iter_mut().enumerate() {
        if start > bytes.len() {
            return Err(TableError::Parse {
                line: line_number,
                message: format!("Expected at least {} fields, got {}", MANDATORY_FIELDS, i),
            });
        }
        let end = memchr(b'\t', &bytes[start..]).map_or(bytes.len(), |j| start + j);
        *slot = &line[start..end];
        start = end + 1;
    }

    let flag = fields[1].parse().map_err(|_| TableError::Parse {
        line: line_number,
        message: format!("Invalid FLAG: {}", fields[1]),
    })?;
    let pos = fields[3].parse().map_err(|_| TableError::Parse {
        line: line_number,
        message: format!("Invalid POS: {}", fields[3]),
    })?;

    let tags = if start < bytes.len() { &line[start..] } else { "" };
    let md = tags
        .split('\t')
        .find_map(|tag| tag.strip_prefix("MD:Z:"));

    Ok(AlignmentFields {
        qname: fields[0],
        flag,
        rname: fields[2],
        pos,
        cigar: fields[5],
        md,
    })
}
