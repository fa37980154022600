//! # barcorr
//!
//! Barcode correction for linked-read and single-cell sequencing data.
//!
//! # CLI
//! `barcorr <command>`
//! * `whitelist`: Infer a barcode whitelist from barcode occurrences in a FASTQ file
//! * `index`: Build the succinct barcode index and write it next to the whitelist
//! * `correct`: Cut off and correct the barcodes in a pair of FASTQ files, emit a TSV
//! * `stats`: Compute barcode statistics for a corrected TSV or tagged FASTQ file
//!
//! Check the CLI help for arguments.
//!
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use env_logger::{Builder, Env};
use log::{info, warn};

use barcorr::correct::{correct, load_or_build_index};
use barcorr::errors::Error;
use barcorr::index::BarcodeIndex;
use barcorr::stats::{stats_fastq, stats_tsv, write_stats};
use barcorr::whitelist::{infer_whitelist, InferOptions, DEFAULT_MIN_ENTROPY};

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// Print debug info
    #[clap(short, long, global = true)]
    debug: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    Whitelist(WhitelistArgs),
    Index(IndexArgs),
    Correct(CorrectArgs),
    Stats(StatsArgs),
}

/// Infer a whitelist from the number of barcode occurrences
#[derive(Args)]
struct WhitelistArgs {
    /// FASTQ file with the first reads in pairs
    fastq1: PathBuf,

    /// Length of the barcode sequence
    #[clap(short = 'b', long = "bc-len", default_value_t = 16)]
    bc_len: usize,

    /// Minimum number of occurrences for including a barcode; 0 infers it
    /// from the histogram
    #[clap(short, long, default_value_t = 0)]
    cutoff: u16,

    /// Minimum dinucleotide entropy of an inferred barcode
    #[clap(short, long, default_value_t = DEFAULT_MIN_ENTROPY)]
    entropy: f64,

    /// Reference whitelist for a detailed barcode counts histogram
    #[clap(short, long)]
    whitelist: Option<PathBuf>,

    /// Name of the whitelist output file
    #[clap(short, long, default_value = "barcode_whitelist.txt")]
    out: PathBuf,
}

/// Build the barcode index from a whitelist and write it to files
#[derive(Args)]
struct IndexArgs {
    /// File containing the barcode whitelist, one barcode per line
    whitelist: PathBuf,

    /// Maximum number of alternative corrections (rounded up to the next
    /// power of two)
    #[clap(short, long, default_value_t = 16, value_parser = clap::value_parser!(u32).range(1..=48))]
    alts: u32,
}

/// Cut off and correct the barcodes in a pair of FASTQ files
#[derive(Args)]
struct CorrectArgs {
    /// File containing the barcode whitelist
    whitelist: PathBuf,

    /// FASTQ file with the first reads in pairs (barcode + spacer + sequence)
    fastq1: PathBuf,

    /// FASTQ file with the second reads in pairs
    fastq2: PathBuf,

    /// Maximum number of alternative corrections when building the index
    /// on the fly
    #[clap(short, long, default_value_t = 16, value_parser = clap::value_parser!(u32).range(1..=48))]
    alts: u32,

    /// Length of the spacer between barcode and read sequence
    #[clap(short, long, default_value_t = 7)]
    spacer: usize,

    /// TSV output file; stdout when omitted
    #[clap(short, long)]
    out: Option<PathBuf>,
}

/// Compute barcode statistics for a TSV or (gzipped) FASTQ file
#[derive(Args)]
struct StatsArgs {
    /// Corrected TSV, or FASTQ with BX/RX/QX tags in the read descriptions
    input: PathBuf,

    /// Filename of the output file
    #[clap(short, long, default_value = "stats.txt")]
    out: PathBuf,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // help and version land here too; only real usage errors are failures
            let code: u8 = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            return ExitCode::from(code);
        }
    };

    let level = if cli.debug { "debug" } else { "info" };
    Builder::from_env(Env::default().default_filter_or(level)).init();

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            let code = e
                .downcast_ref::<Error>()
                .map(Error::exit_code)
                .unwrap_or(2);
            ExitCode::from(code.clamp(1, 255) as u8)
        }
    }
}

fn run(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Whitelist(args) => {
            let opts = InferOptions {
                bc_len: args.bc_len,
                cutoff: args.cutoff,
                min_entropy: args.entropy,
                reference_whitelist: args.whitelist,
            };
            infer_whitelist(&args.fastq1, &args.out, &opts)
                .with_context(|| format!("inferring whitelist from {}", args.fastq1.display()))?;
        }
        Command::Index(args) => {
            let index = BarcodeIndex::build(&args.whitelist, args.alts)
                .with_context(|| format!("building index for {}", args.whitelist.display()))?;
            index.save(&args.whitelist).context("writing index files")?;
        }
        Command::Correct(args) => {
            let index = load_or_build_index(&args.whitelist, args.alts)
                .with_context(|| format!("preparing index for {}", args.whitelist.display()))?;
            let counts = correct(
                &index,
                &args.fastq1,
                &args.fastq2,
                args.spacer,
                args.out.as_deref(),
            )
            .context("correcting read pairs")?;

            info!("whitelisted barcodes: {}", counts.whitelisted);
            info!("corrected barcodes: {}", counts.corrected);
            info!("unrecognized barcodes: {}", counts.unrecognized);
            if counts.skipped > 0 {
                warn!(
                    "skipped {} read pairs shorter than barcode + spacer",
                    counts.skipped
                );
            }
        }
        Command::Stats(args) => {
            let name = args.input.to_string_lossy().to_ascii_lowercase();
            let stats = if name.ends_with(".tsv") {
                stats_tsv(&args.input)?
            } else if name.ends_with(".fastq")
                || name.ends_with(".fq")
                || name.ends_with(".fastq.gz")
                || name.ends_with(".fq.gz")
            {
                stats_fastq(&args.input)?
            } else {
                return Err(Error::ParameterOutOfRange(format!(
                    "unsupported stats input '{}'; expected .tsv, .fastq[.gz] or .fq[.gz]",
                    args.input.display()
                ))
                .into());
            };
            write_stats(&args.out, &stats).context("writing stats file")?;
        }
    }
    Ok(())
}
