//! Tab-separated output for per-read summaries.
//!
//! Uses itoa for integer formatting to avoid allocation per field.

use crate::error::Result;
use crate::pipeline::ReadSummary;
use std::io::{BufWriter, Write};

/// Buffer size for SummaryWriter (2MB).
const DEFAULT_BUFFER_SIZE: usize = 2 * 1024 * 1024;

/// Column header written before the first summary.
pub const SUMMARY_HEADER: &str =
    "#name\tchrom\tpos\tref_offset\tref_span\tmatches\tmismatches\tinserted\tdeleted\tsoft_clipped";

/// Buffered writer for [`ReadSummary`] rows.
pub struct SummaryWriter<W: Write> {
    writer: BufWriter<W>,
    itoa_buf: itoa::Buffer,
}

impl<W: Write> SummaryWriter<W> {
    pub fn new(output: W) -> Self {
        Self::with_capacity(DEFAULT_BUFFER_SIZE, output)
    }

    pub fn with_capacity(capacity: usize, output: W) -> Self {
        Self {
            writer: BufWriter::with_capacity(capacity, output),
            itoa_buf: itoa::Buffer::new(),
        }
    }

    pub fn write_header(&mut self) -> Result<()> {
        self.writer.write_all(SUMMARY_HEADER.as_bytes())?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    #[inline]
    fn write_u64(&mut self, value: u64) -> Result<()> {
        self.writer.write_all(b"\t")?;
        self.writer
            .write_all(self.itoa_buf.format(value).as_bytes())?;
        Ok(())
    }

    /// Write one summary row followed by newline.
    pub fn write_summary(&mut self, summary: &ReadSummary) -> Result<()> {
        self.writer.write_all(summary.name.as_bytes())?;
        self.writer.write_all(b"\t")?;
        self.writer.write_all(summary.chrom.as_bytes())?;
        self.write_u64(summary.pos)?;
        match summary.ref_offset {
            Some(offset) => self.write_u64(offset)?,
            None => self.writer.write_all(b"\t.")?,
        }
        self.write_u64(summary.ref_span)?;
        self.write_u64(summary.matches)?;
        self.write_u64(summary.mismatches)?;
        self.write_u64(summary.inserted)?;
        self.write_u64(summary.deleted)?;
        self.write_u64(summary.soft_clipped)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
