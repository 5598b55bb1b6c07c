//! Error type shared by the tokenizers, the reference index and the pipeline.

use std::io;
use thiserror::Error;

/// Errors produced by this crate.
#[derive(Error, Debug)]
pub enum TableError {
    /// Input string violates the CIGAR or MD grammar.
    #[error("Malformed encoding {input:?} at offset {position}: {message}")]
    MalformedEncoding {
        input: String,
        position: usize,
        message: String,
    },

    #[error("Reference sequence not found: {0}")]
    NameNotFound(String),

    /// API used outside its lifecycle (append after finalize, lookup before).
    #[error("Misuse: {0}")]
    Misuse(String),

    #[error("Duplicate reference sequence name: {0}")]
    DuplicateName(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },
}

impl TableError {
    pub(crate) fn malformed(input: &[u8], position: usize, message: impl Into<String>) -> Self {
        TableError::MalformedEncoding {
            input: String::from_utf8_lossy(input).into_owned(),
            position,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TableError>;
