//! Runtime configuration.
//!
//! Process-wide flags are set once at startup and read during decoding.
//! Per-run settings for the summarize pipeline live in [`PipelineConfig`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

/// Global flag for uppercasing MD bases.
///
/// Aligners run against soft-masked references may emit lowercase bases in
/// the MD tag. When enabled, mismatch and deletion bases are uppercased as
/// they are decoded so downstream comparisons see one alphabet.
static UPPERCASE_BASES: AtomicBool = AtomicBool::new(false);

/// Enable or disable MD base uppercasing.
///
/// # Example
///
/// ```
/// use threen_table::config;
///
/// config::set_uppercase_bases(true);
/// assert_eq!(config::normalize_base(b'g'), b'G');
/// config::set_uppercase_bases(false);
/// ```
#[inline]
pub fn set_uppercase_bases(enabled: bool) {
    UPPERCASE_BASES.store(enabled, Ordering::Release);
}

/// Check if MD base uppercasing is enabled.
#[inline]
pub fn is_uppercase_bases() -> bool {
    UPPERCASE_BASES.load(Ordering::Acquire)
}

/// Normalize a decoded base according to the global setting.
#[inline]
pub fn normalize_base(base: u8) -> u8 {
    if is_uppercase_bases() {
        base.to_ascii_uppercase()
    } else {
        base
    }
}

/// Default capacity of the line channel between the reader and the workers.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Settings for [`crate::pipeline::SummarizePipeline`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of decoding worker threads (at least 1).
    pub threads: usize,
    /// Maximum number of undecoded lines in flight.
    pub channel_capacity: usize,
}

impl PipelineConfig {
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            threads: thread::available_parallelism().map_or(1, |n| n.get()),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}
