//! Multi-threaded per-read summarization.
//!
//! Data flow:
//! 1. The calling thread reads SAM lines and sends `(serial, line)` over a
//!    bounded channel.
//! 2. Worker threads each own a [`ReadDecoder`] and decode reads in whatever
//!    order they receive them, looking up reference offsets in the shared,
//!    frozen [`ReferenceOffsetIndex`].
//! 3. Results go to a single writer thread through a [`HandoffQueue`]. The
//!    writer restores input order by serial before writing.
//!
//! The writer learns that input is exhausted from a `Done` message pushed
//! after every worker has exited.

use crate::config::PipelineConfig;
use crate::error::{Result, TableError};
use crate::output::SummaryWriter;
use crate::queue::HandoffQueue;
use crate::record::{parse_alignment_line, should_skip_line, AlignmentFields};
use crate::reference::ReferenceOffsetIndex;
use crate::tokenize::{CigarOp, CigarTokenizer, MdSegment, MdTokenizer};
use crossbeam_channel::{bounded, Receiver};
use log::debug;
use rustc_hash::FxHashMap;
use std::any::Any;
use std::fmt;
use std::io::{BufRead, Write};
use std::panic;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;

/// Alignment statistics for one read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadSummary {
    /// Position of the read among alignment lines in the input (0-based).
    pub serial: u64,
    pub name: String,
    pub chrom: String,
    pub pos: u64,
    /// Byte offset of the reference sequence in the FASTA file.
    pub ref_offset: Option<u64>,
    /// Reference bases spanned by the alignment (`M`, `D`, `N`, `=`, `X`).
    pub ref_span: u64,
    pub matches: u64,
    pub mismatches: u64,
    pub inserted: u64,
    pub deleted: u64,
    pub soft_clipped: u64,
}

/// Per-worker decoding state. Never shared between threads.
#[derive(Debug, Default)]
pub struct ReadDecoder {
    cigar: CigarTokenizer,
    md: MdTokenizer,
}

impl ReadDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the CIGAR and MD strings of one mapped read.
    ///
    /// Without an MD tag, match and mismatch counts come from `=` and `X`
    /// operations. With one, its reference length must agree with the
    /// aligned (non-skip) reference span of the CIGAR.
    pub fn summarize(
        &mut self,
        serial: u64,
        fields: &AlignmentFields<'_>,
        index: Option<&ReferenceOffsetIndex>,
    ) -> Result<ReadSummary> {
        let mut summary = ReadSummary {
            serial,
            name: fields.qname.to_string(),
            chrom: fields.rname.to_string(),
            pos: fields.pos,
            ref_offset: index.map(|idx| idx.lookup(fields.rname)).transpose()?,
            ref_span: 0,
            matches: 0,
            mismatches: 0,
            inserted: 0,
            deleted: 0,
            soft_clipped: 0,
        };

        let mut aligned_span: u64 = 0;
        self.cigar.load_string(fields.cigar);
        while let Some(segment) = self.cigar.next_segment()? {
            let len = segment.len as u64;
            if segment.op.consumes_reference() {
                summary.ref_span += len;
                if segment.op != CigarOp::Skip {
                    aligned_span += len;
                }
            }
            match segment.op {
                CigarOp::Insertion => summary.inserted += len,
                CigarOp::Deletion => summary.deleted += len,
                CigarOp::SoftClip => summary.soft_clipped += len,
                CigarOp::SequenceMatch => summary.matches += len,
                CigarOp::SequenceMismatch => summary.mismatches += len,
                _ => {}
            }
        }

        if let Some(md) = fields.md {
            summary.matches = 0;
            summary.mismatches = 0;
            let mut md_span: u64 = 0;
            self.md.load_string(md);
            while let Some(segment) = self.md.next_segment()? {
                md_span += segment.reference_len() as u64;
                match segment {
                    MdSegment::MatchRun(n) => summary.matches += n as u64,
                    MdSegment::Mismatch(_) => summary.mismatches += 1,
                    MdSegment::DeletionRun(_) => {}
                }
            }
            if md_span != aligned_span {
                return Err(TableError::malformed(
                    md.as_bytes(),
                    0,
                    format!(
                        "MD covers {} reference bases but CIGAR {} aligns {}",
                        md_span, fields.cigar, aligned_span
                    ),
                ));
            }
        }

        Ok(summary)
    }
}

/// Messages from workers to the writer.
#[derive(Debug, Clone)]
enum WriterMessage {
    Summary(ReadSummary),
    /// Serial of an unmapped read; keeps the writer's ordering moving.
    Skipped(u64),
    Done,
}

/// Statistics from a summarize run.
#[derive(Debug, Default, Clone)]
pub struct PipelineStats {
    /// Alignment lines read (headers excluded)
    pub records: u64,
    /// Unmapped records without a summary
    pub skipped: u64,
    /// Summaries written
    pub summarized: u64,
}

impl fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Records: {}, Summarized: {}, Skipped: {}",
            self.records, self.summarized, self.skipped
        )
    }
}

struct WorkItem {
    serial: u64,
    line_number: usize,
    line: String,
}

/// Reads SAM text and writes one [`ReadSummary`] row per mapped read, in input order.
pub struct SummarizePipeline<'a> {
    config: PipelineConfig,
    index: Option<&'a ReferenceOffsetIndex>,
}

impl<'a> SummarizePipeline<'a> {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            index: None,
        }
    }

    /// Resolve reference offsets through a finalized index.
    pub fn with_reference(mut self, index: &'a ReferenceOffsetIndex) -> Self {
        self.index = Some(index);
        self
    }

    /// Run the pipeline to completion. Returns the first error any stage hit.
    pub fn run<R, W>(&self, mut input: R, output: W) -> Result<PipelineStats>
    where
        R: BufRead,
        W: Write + Send,
    {
        let threads = self.config.threads.max(1);
        let (tx, rx) = bounded::<WorkItem>(self.config.channel_capacity.max(1));
        let queue = HandoffQueue::new();
        let failed = AtomicBool::new(false);
        let skipped = AtomicU64::new(0);
        let index = self.index;

        debug!("summarize pipeline starting with {} worker(s)", threads);

        thread::scope(|scope| {
            let writer = scope.spawn(|| {
                let result = write_ordered(&queue, output);
                if result.is_err() {
                    failed.store(true, Ordering::Release);
                }
                result
            });

            let workers: Vec<_> = (0..threads)
                .map(|_| {
                    let rx = rx.clone();
                    let (queue, failed, skipped) = (&queue, &failed, &skipped);
                    scope.spawn(move || {
                        let result = run_worker(rx, queue, index, skipped);
                        if result.is_err() {
                            failed.store(true, Ordering::Release);
                        }
                        result
                    })
                })
                .collect();
            drop(rx);

            let mut first_error: Option<TableError> = None;
            let mut records: u64 = 0;
            let mut line_number = 0;
            let mut line = String::new();

            while !failed.load(Ordering::Acquire) {
                line.clear();
                match input.read_line(&mut line) {
                    Ok(0) => break,
                    Ok(_) => {}
                    Err(e) => {
                        first_error = Some(e.into());
                        break;
                    }
                }
                line_number += 1;
                let trimmed = line.trim_end_matches(&['\n', '\r'][..]);
                if should_skip_line(trimmed) {
                    continue;
                }
                let item = WorkItem {
                    serial: records,
                    line_number,
                    line: trimmed.to_string(),
                };
                if tx.send(item).is_err() {
                    break;
                }
                records += 1;
            }
            drop(tx);

            let (worker_error, worker_panic) = join_workers(workers, &queue);
            if let Some(e) = worker_error {
                first_error.get_or_insert(e);
            }

            let written = writer.join().unwrap_or_else(|e| panic::resume_unwind(e));
            if let Some(payload) = worker_panic {
                panic::resume_unwind(payload);
            }
            match (first_error, written) {
                (Some(e), _) => Err(e),
                (None, Err(e)) => Err(e),
                (None, Ok(summarized)) => {
                    let stats = PipelineStats {
                        records,
                        skipped: skipped.load(Ordering::Acquire),
                        summarized,
                    };
                    debug!("summarize pipeline finished: {}", stats);
                    Ok(stats)
                }
            }
        })
    }
}

/// Join every worker, then send `Done` so the writer can exit.
///
/// A worker panic is returned rather than resumed; the writer must be joined
/// before the panic is re-raised.
fn join_workers(
    workers: Vec<thread::ScopedJoinHandle<'_, Result<()>>>,
    queue: &HandoffQueue<WriterMessage>,
) -> (Option<TableError>, Option<Box<dyn Any + Send + 'static>>) {
    let mut first_error = None;
    let mut first_panic = None;
    for worker in workers {
        match worker.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                first_error.get_or_insert(e);
            }
            Err(payload) => {
                first_panic.get_or_insert(payload);
            }
        }
    }
    queue.push_and_notify(WriterMessage::Done);
    (first_error, first_panic)
}

fn run_worker(
    rx: Receiver<WorkItem>,
    queue: &HandoffQueue<WriterMessage>,
    index: Option<&ReferenceOffsetIndex>,
    skipped: &AtomicU64,
) -> Result<()> {
    let mut decoder = ReadDecoder::new();
    for item in rx.iter() {
        let fields = parse_alignment_line(&item.line, item.line_number)?;
        let message = if fields.is_unmapped() {
            skipped.fetch_add(1, Ordering::Relaxed);
            WriterMessage::Skipped(item.serial)
        } else {
            WriterMessage::Summary(decoder.summarize(item.serial, &fields, index)?)
        };
        queue.push_and_notify(message);
    }
    Ok(())
}

/// Drain the queue until `Done`, writing summaries in serial order.
fn write_ordered<W: Write>(queue: &HandoffQueue<WriterMessage>, output: W) -> Result<u64> {
    let mut writer = SummaryWriter::new(output);
    writer.write_header()?;

    let mut pending: FxHashMap<u64, Option<ReadSummary>> = FxHashMap::default();
    let mut next_serial: u64 = 0;
    let mut written: u64 = 0;
    let mut front = None;

    loop {
        // Woken or spuriously returned: re-check.
        if !queue.peek_or_wait(&mut front) {
            continue;
        }
        queue.pop();

        match front.take() {
            Some(WriterMessage::Done) => break,
            Some(WriterMessage::Summary(summary)) => {
                pending.insert(summary.serial, Some(summary));
            }
            Some(WriterMessage::Skipped(serial)) => {
                pending.insert(serial, None);
            }
            None => continue,
        }

        while let Some(entry) = pending.remove(&next_serial) {
            if let Some(summary) = entry {
                writer.write_summary(&summary)?;
                written += 1;
            }
            next_serial += 1;
        }
    }

    writer.flush()?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sam_line(name: &str, chrom: &str, cigar: &str, md: Option<&str>) -> String {
        let mut line = format!("{name}\t0\t{chrom}\t10\t60\t{cigar}\t*\t0\t0\tACGT\tIIII");
        if let Some(md) = md {
            line.push_str("\tMD:Z:");
            line.push_str(md);
        }
        line
    }

    fn fields(line: &str) -> AlignmentFields<'_> {
        parse_alignment_line(line, 1).unwrap()
    }

    #[test]
    fn test_summarize_with_md() {
        let line = sam_line("r1", "chr1", "2S5M1I3M1D4M", Some("4A3^G4"));
        let mut decoder = ReadDecoder::new();
        let summary = decoder.summarize(3, &fields(&line), None).unwrap();
        assert_eq!(summary.serial, 3);
        assert_eq!(summary.ref_span, 13);
        assert_eq!(summary.matches, 11);
        assert_eq!(summary.mismatches, 1);
        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.deleted, 1);
        assert_eq!(summary.soft_clipped, 2);
        assert_eq!(summary.ref_offset, None);
    }

    #[test]
    fn test_summarize_extended_cigar_without_md() {
        let line = sam_line("r1", "chr1", "3=1X100N2=", None);
        let summary = ReadDecoder::new().summarize(0, &fields(&line), None).unwrap();
        assert_eq!(summary.matches, 5);
        assert_eq!(summary.mismatches, 1);
        assert_eq!(summary.ref_span, 106);
    }

    #[test]
    fn test_md_span_mismatch() {
        let line = sam_line("r1", "chr1", "10M", Some("9"));
        let err = ReadDecoder::new().summarize(0, &fields(&line), None).unwrap_err();
        assert!(matches!(err, TableError::MalformedEncoding { .. }));
    }

    #[test]
    fn test_summarize_reference_lookup() {
        let index = ReferenceOffsetIndex::from_fasta_bytes(b">chr1\nACGT\n>chr2\nTTTT\n").unwrap();
        let line = sam_line("r1", "chr2", "4M", None);
        let summary = ReadDecoder::new()
            .summarize(0, &fields(&line), Some(&index))
            .unwrap();
        assert_eq!(summary.ref_offset, Some(17));

        let line = sam_line("r2", "chrUn", "4M", None);
        assert!(matches!(
            ReadDecoder::new().summarize(0, &fields(&line), Some(&index)),
            Err(TableError::NameNotFound(_))
        ));
    }

    #[test]
    fn test_pipeline_preserves_input_order() {
        let mut input = String::from("@HD\tVN:1.6\n");
        for i in 0..500 {
            input.push_str(&sam_line(&format!("read{i}"), "chr1", "2M1D2M", Some("2^A2")));
            input.push('\n');
        }
        input.push_str("unmapped\t4\t*\t0\t0\t*\t*\t0\t0\tACGT\tIIII\n");

        let config = PipelineConfig::default().with_threads(4);
        let mut out = Vec::new();
        let stats = SummarizePipeline::new(config)
            .run(Cursor::new(input), &mut out)
            .unwrap();

        assert_eq!(stats.records, 501);
        assert_eq!(stats.summarized, 500);
        assert_eq!(stats.skipped, 1);

        let text = String::from_utf8(out).unwrap();
        let names: Vec<&str> = text
            .lines()
            .skip(1)
            .map(|l| l.split('\t').next().unwrap())
            .collect();
        let expected: Vec<String> = (0..500).map(|i| format!("read{i}")).collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn test_pipeline_reports_decode_error() {
        let input = format!(
            "{}\n{}\n",
            sam_line("ok", "chr1", "4M", None),
            sam_line("bad", "chr1", "4Q", None)
        );
        let mut out = Vec::new();
        let result = SummarizePipeline::new(PipelineConfig::default().with_threads(2))
            .run(Cursor::new(input), &mut out);
        assert!(matches!(result, Err(TableError::MalformedEncoding { .. })));
    }

    #[test]
    fn test_worker_panic_releases_writer() {
        let queue = HandoffQueue::new();
        let mut out = Vec::new();
        thread::scope(|scope| {
            let writer = scope.spawn(|| write_ordered(&queue, &mut out));
            let ok = scope.spawn(|| -> Result<()> {
                queue.push_and_notify(WriterMessage::Skipped(0));
                Ok(())
            });
            let bad = scope.spawn(|| -> Result<()> { panic!("worker failed") });

            let (error, payload) = join_workers(vec![ok, bad], &queue);
            assert!(error.is_none());
            assert!(payload.is_some());
            assert_eq!(writer.join().unwrap().unwrap(), 0);
        });
        assert_eq!(String::from_utf8(out).unwrap().lines().count(), 1);
    }

    #[test]
    fn test_pipeline_empty_input() {
        let mut out = Vec::new();
        let stats = SummarizePipeline::new(PipelineConfig::default())
            .run(Cursor::new(""), &mut out)
            .unwrap();
        assert_eq!(stats.records, 0);
        assert_eq!(String::from_utf8(out).unwrap().lines().count(), 1);
    }
}
