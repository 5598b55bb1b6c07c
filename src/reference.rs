//! Reference sequence offset index.
//!
//! Maps each reference sequence name to the byte offset of its first
//! sequence byte in a FASTA file so a worker can seek straight to it.
//!
//! The index has two phases. While building, [`ReferenceOffsetIndex::append`]
//! collects entries in any order. [`ReferenceOffsetIndex::finalize_and_sort`]
//! then sorts by name and freezes it; afterwards only lookups are allowed and
//! the index can be shared by reference across worker threads.

use crate::error::{Result, TableError};
use log::debug;
use memchr::{memchr, memchr_iter};
use memmap2::Mmap;
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Entry count above which finalization sorts in parallel.
const PARALLEL_THRESHOLD: usize = 10_000;

/// Minimum file size to memory-map (smaller files use buffered I/O).
const MMAP_THRESHOLD: u64 = 64 * 1024;

/// One reference sequence name and its byte offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceEntry {
    pub name: String,
    pub offset: u64,
}

/// Sorted name to offset index, frozen after [`finalize_and_sort`](Self::finalize_and_sort).
///
/// # Example
///
/// ```
/// use threen_table::ReferenceOffsetIndex;
///
/// let mut index = ReferenceOffsetIndex::new();
/// index.append("chr2", 300).unwrap();
/// index.append("chr1", 100).unwrap();
/// index.finalize_and_sort().unwrap();
///
/// assert_eq!(index.lookup("chr1").unwrap(), 100);
/// assert!(index.lookup("chrM").is_err());
/// ```
#[derive(Debug, Default)]
pub struct ReferenceOffsetIndex {
    entries: Vec<ReferenceEntry>,
    finalized: bool,
}

impl ReferenceOffsetIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry. Fails with `Misuse` once the index is finalized.
    pub fn append(&mut self, name: impl Into<String>, offset: u64) -> Result<()> {
        if self.finalized {
            return Err(TableError::Misuse(
                "append after the reference index was finalized".to_string(),
            ));
        }
        self.entries.push(ReferenceEntry {
            name: name.into(),
            offset,
        });
        Ok(())
    }

    /// Sort entries by name (byte-wise) and freeze the index.
    ///
    /// Must be called exactly once. Duplicate names fail with `DuplicateName`
    /// and leave the index unfrozen.
    pub fn finalize_and_sort(&mut self) -> Result<()> {
        if self.finalized {
            return Err(TableError::Misuse(
                "reference index finalized twice".to_string(),
            ));
        }

        if self.entries.len() >= PARALLEL_THRESHOLD {
            self.entries.par_sort_unstable_by(|a, b| a.name.cmp(&b.name));
        } else {
            self.entries.sort_unstable_by(|a, b| a.name.cmp(&b.name));
        }

        if let Some(pair) = self.entries.windows(2).find(|w| w[0].name == w[1].name) {
            return Err(TableError::DuplicateName(pair[0].name.clone()));
        }

        self.finalized = true;
        debug!("reference index finalized with {} sequences", self.entries.len());
        Ok(())
    }

    /// Offset recorded for `name`.
    pub fn lookup(&self, name: &str) -> Result<u64> {
        if !self.finalized {
            return Err(TableError::Misuse(
                "lookup before the reference index was finalized".to_string(),
            ));
        }
        self.entries
            .binary_search_by(|e| e.name.as_str().cmp(name))
            .map(|i| self.entries[i].offset)
            .map_err(|_| TableError::NameNotFound(name.to_string()))
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in name order once finalized, insertion order before.
    pub fn iter(&self) -> impl Iterator<Item = &ReferenceEntry> {
        self.entries.iter()
    }

    /// Build and finalize an index by scanning FASTA headers from a reader.
    pub fn from_fasta_reader<R: BufRead>(mut reader: R) -> Result<Self> {
        let mut index = Self::new();
        let mut line = Vec::with_capacity(256);
        let mut offset: u64 = 0;
        let mut line_number = 0;

        loop {
            line.clear();
            let n = reader.read_until(b'\n', &mut line)?;
            if n == 0 {
                break;
            }
            line_number += 1;
            offset += n as u64;

            if line.first() == Some(&b'>') {
                let name = header_name(&line).map_err(|message| TableError::Parse {
                    line: line_number,
                    message: message.to_string(),
                })?;
                index.append(name, offset)?;
            }
        }

        index.finalize_and_sort()?;
        Ok(index)
    }

    /// Build and finalize an index from a FASTA file.
    ///
    /// Large files are memory-mapped and scanned for headers directly.
    pub fn from_fasta_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();

        let index = if file_size >= MMAP_THRESHOLD {
            // Safety: assumes the reference file is not modified or truncated
            // while it is mapped.
            let mmap = unsafe { Mmap::map(&file)? };
            Self::from_fasta_bytes(&mmap)?
        } else {
            Self::from_fasta_reader(BufReader::new(file))?
        };

        debug!(
            "indexed {} reference sequences from {}",
            index.len(),
            path.display()
        );
        Ok(index)
    }

    /// Build and finalize an index from in-memory FASTA bytes.
    pub fn from_fasta_bytes(data: &[u8]) -> Result<Self> {
        let mut index = Self::new();

        for pos in memchr_iter(b'>', data) {
            if pos > 0 && data[pos - 1] != b'\n' {
                continue;
            }
            let line_end = memchr(b'\n', &data[pos..]).map_or(data.len(), |i| pos + i);
            let name = header_name(&data[pos..line_end]).map_err(|message| TableError::Parse {
                line: memchr_iter(b'\n', &data[..pos]).count() + 1,
                message: message.to_string(),
            })?;
            let seq_start = (line_end + 1).min(data.len());
            index.append(name, seq_start as u64)?;
        }

        index.finalize_and_sort()?;
        Ok(index)
    }
}

/// Sequence name from a `>` header line: text up to the first whitespace.
///
/// The error is the message for a header that carries no usable name.
fn header_name(line: &[u8]) -> std::result::Result<&str, &'static str> {
    let rest = line
        .strip_prefix(b">")
        .ok_or("FASTA header without a sequence name")?;
    let end = rest
        .iter()
        .position(|b| b.is_ascii_whitespace())
        .unwrap_or(rest.len());
    if end == 0 {
        return Err("FASTA header without a sequence name");
    }
    std::str::from_utf8(&rest[..end]).map_err(|_| "FASTA header name is not valid UTF-8")
}
