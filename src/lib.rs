//! threen-table: building blocks for alignment post-processing.
//!
//! # Features
//!
//! - **Tokenizers**: decode CIGAR strings and MD tags one segment at a time
//! - **Handoff queue**: mutex-guarded FIFO between worker threads and a writer
//! - **Reference index**: sorted name to file offset map, frozen after build
//!
//! # Example
//!
//! ```rust
//! use threen_table::tokenize::{CigarOp, CigarTokenizer, MdSegment, MdTokenizer};
//!
//! let mut cigar = CigarTokenizer::new();
//! cigar.load_string("5M1D5M");
//! let ops: Vec<CigarOp> = cigar.map(|s| s.unwrap().op).collect();
//! assert_eq!(ops, vec![CigarOp::Match, CigarOp::Deletion, CigarOp::Match]);
//!
//! let mut md = MdTokenizer::new();
//! md.load_string("5^A5");
//! assert_eq!(md.nth(1).unwrap().unwrap(), MdSegment::DeletionRun(b"A".to_vec()));
//! ```

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod queue;
pub mod record;
pub mod reference;
pub mod tokenize;

// Re-export commonly used types
pub use error::{Result, TableError};
pub use pipeline::{PipelineStats, ReadDecoder, ReadSummary, SummarizePipeline};
pub use queue::HandoffQueue;
pub use reference::{ReferenceEntry, ReferenceOffsetIndex};
pub use tokenize::{CigarOp, CigarTokenizer, MdSegment, MdTokenizer, Segment};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::PipelineConfig;
    pub use crate::error::{Result, TableError};
    pub use crate::pipeline::{ReadDecoder, SummarizePipeline};
    pub use crate::queue::HandoffQueue;
    pub use crate::reference::ReferenceOffsetIndex;
    pub use crate::tokenize::{CigarOp, CigarTokenizer, MdSegment, MdTokenizer, Segment};
}
