//! threen: decode alignment strings and summarize SAM records
//!
//! Usage: threen <COMMAND> [OPTIONS]

use clap::{Parser, Subcommand};
use env_logger::Env;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::process;

use threen_table::config::{self, PipelineConfig};
use threen_table::tokenize::{CigarTokenizer, MdSegment, MdTokenizer};
use threen_table::{ReferenceOffsetIndex, Result, SummarizePipeline};

#[derive(Parser)]
#[command(name = "threen")]
#[command(version)]
#[command(about = "Decode CIGAR/MD strings, index reference offsets, and summarize SAM alignments", long_about = None)]
struct Cli {
    /// Number of threads to use (default: number of CPUs)
    #[arg(long, short = 't', global = true)]
    threads: Option<usize>,

    /// Uppercase mismatch and deletion bases decoded from MD tags
    #[arg(long, global = true)]
    uppercase_bases: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a CIGAR string into one segment per line
    Cigar {
        /// CIGAR string, e.g. 3S10M2I5M
        cigar: String,
    },

    /// Decode an MD tag into one event per line
    Md {
        /// MD string, e.g. 10A2^AC3
        md: String,
    },

    /// Index sequence offsets in a FASTA file
    Index {
        /// Reference FASTA file
        #[arg(short, long)]
        reference: PathBuf,

        /// Print only the offset of this sequence
        #[arg(short, long)]
        lookup: Option<String>,
    },

    /// Summarize mapped reads from a SAM file, one row per read in input order
    Summarize {
        /// Input SAM file (use - for stdin)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Reference FASTA to resolve sequence offsets
        #[arg(short, long)]
        reference: Option<PathBuf>,

        /// Print summarize statistics to stderr
        #[arg(long)]
        stats: bool,
    },
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    // Configure thread pool if --threads specified
    if let Some(n) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build_global()
            .ok();
    }

    config::set_uppercase_bases(cli.uppercase_bases);

    let result = match cli.command {
        Commands::Cigar { cigar } => run_cigar(&cigar),
        Commands::Md { md } => run_md(&md),
        Commands::Index { reference, lookup } => run_index(reference, lookup),
        Commands::Summarize {
            input,
            reference,
            stats,
        } => run_summarize(input, reference, stats, cli.threads),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run_cigar(cigar: &str) -> Result<()> {
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    let mut tokenizer = CigarTokenizer::new();
    tokenizer.load_string(cigar);
    while let Some(segment) = tokenizer.next_segment()? {
        writeln!(out, "{}\t{}", segment.len, segment.op)?;
    }
    out.flush()?;
    Ok(())
}

fn run_md(md: &str) -> Result<()> {
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    let mut tokenizer = MdTokenizer::new();
    tokenizer.load_string(md);
    while let Some(segment) = tokenizer.next_segment()? {
        match segment {
            MdSegment::MatchRun(n) => writeln!(out, "match\t{}", n)?,
            MdSegment::Mismatch(base) => writeln!(out, "mismatch\t{}", base as char)?,
            MdSegment::DeletionRun(bases) => {
                writeln!(out, "deletion\t{}", String::from_utf8_lossy(&bases))?
            }
        }
    }
    out.flush()?;
    Ok(())
}

fn run_index(reference: PathBuf, lookup: Option<String>) -> Result<()> {
    let index = ReferenceOffsetIndex::from_fasta_path(&reference)?;
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    if let Some(name) = lookup {
        writeln!(out, "{}", index.lookup(&name)?)?;
    } else {
        for entry in index.iter() {
            writeln!(out, "{}\t{}", entry.name, entry.offset)?;
        }
    }
    out.flush()?;
    Ok(())
}

fn run_summarize(
    input: Option<PathBuf>,
    reference: Option<PathBuf>,
    stats: bool,
    threads: Option<usize>,
) -> Result<()> {
    let index = reference
        .map(ReferenceOffsetIndex::from_fasta_path)
        .transpose()?;

    let mut pipeline_config = PipelineConfig::default();
    if let Some(n) = threads {
        pipeline_config = pipeline_config.with_threads(n);
    }
    let mut pipeline = SummarizePipeline::new(pipeline_config);
    if let Some(ref idx) = index {
        pipeline = pipeline.with_reference(idx);
    }

    let reader: Box<dyn BufRead> = match input {
        Some(path) if path.to_string_lossy() != "-" => Box::new(BufReader::new(File::open(path)?)),
        _ => Box::new(BufReader::new(io::stdin())),
    };

    let result = pipeline.run(reader, io::stdout())?;
    if stats {
        eprintln!("Summarize stats: {}", result);
    }
    Ok(())
}

