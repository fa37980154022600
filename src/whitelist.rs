//! Whitelist inference from raw reads.
//!
//! Counts every exact length-L barcode prefix in a FASTQ stream, derives a
//! minimum-occurrence cutoff from the first local minimum of the count
//! histogram, and drops low-complexity barcodes with a dinucleotide
//! entropy filter. The surviving barcodes become the whitelist that the
//! index is built from.
//!
#![deny(missing_docs)]
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use seq_io::fastq::Record;

use crate::bitvec::BitVec;
use crate::dna::{self, hash, unhash};
use crate::errors::{Error, Result};
use crate::index::MAX_BC_LEN;
use crate::io::invalid_data;

/// Number of histogram bins; occurrence count `k` lands in bin `min(k, 999)`.
pub const HIST_BINS: usize = 1000;

/// Default minimum dinucleotide entropy for an inferred barcode.
pub const DEFAULT_MIN_ENTROPY: f64 = 0.5;

/// Settings for [`infer_whitelist`].
#[derive(Debug, Clone)]
pub struct InferOptions {
    /// Barcode length L.
    pub bc_len: usize,
    /// Minimum occurrence count; 0 means infer it from the histogram.
    pub cutoff: u16,
    /// Minimum dinucleotide entropy for emitted barcodes.
    pub min_entropy: f64,
    /// Optional reference whitelist for the detailed histogram column.
    pub reference_whitelist: Option<PathBuf>,
}

impl Default for InferOptions {
    fn default() -> Self {
        InferOptions {
            bc_len: 16,
            cutoff: 0,
            min_entropy: DEFAULT_MIN_ENTROPY,
            reference_whitelist: None,
        }
    }
}

/// Counts the occurrences of every exact length-L barcode prefix in the
/// FASTQ stream. Prefixes containing anything outside {A,C,G,T} are
/// skipped; per-cell counts saturate at `u16::MAX`.
pub fn count_barcodes(fastq: &Path, bc_len: usize) -> Result<Vec<u16>> {
    if bc_len == 0 || bc_len > MAX_BC_LEN {
        return Err(Error::ParameterOutOfRange(format!(
            "barcode length must be in 1..={MAX_BC_LEN}, got {bc_len}"
        )));
    }
    info!("counting barcodes in {}", fastq.display());
    let mut counts = vec![0u16; 1usize << (2 * bc_len)];
    let mut reader = crate::io::open_fastq(fastq)?;
    let mut n_reads = 0u64;
    let mut n_counted = 0u64;
    while let Some(record) = reader.next() {
        let record = record.map_err(invalid_data)?;
        n_reads += 1;
        let seq = record.seq();
        if seq.len() < bc_len {
            continue;
        }
        let prefix = &seq[..bc_len];
        if !prefix.iter().all(|&b| dna::base_ord(b).is_some()) {
            continue;
        }
        let cell = hash(prefix) as usize;
        if counts[cell] != u16::MAX {
            counts[cell] += 1;
        }
        n_counted += 1;
    }
    info!("counted {n_counted} barcodes in {n_reads} reads");
    Ok(counts)
}

/// Bins the per-cell counts into a 1000-bin histogram, and into a second
/// histogram restricted to the cells of `reference` when one is given.
pub fn make_histograms(
    counts: &[u16],
    bc_len: usize,
    reference: Option<&[String]>,
) -> Result<(Vec<u64>, Vec<u64>)> {
    let mut all_hist = vec![0u64; HIST_BINS];
    let mut wl_hist = vec![0u64; HIST_BINS];

    let whitelisted = match reference {
        Some(entries) => {
            let mut marked = BitVec::new(counts.len() as u64);
            for (i, bc) in entries.iter().enumerate() {
                if bc.len() != bc_len || !bc.bytes().all(|b| dna::base_ord(b).is_some()) {
                    return Err(Error::WhitelistFormat {
                        line: i + 1,
                        reason: format!("'{bc}' is not a length-{bc_len} ACGT barcode"),
                    });
                }
                marked.set(hash(bc.as_bytes()), true);
            }
            Some(marked)
        }
        None => None,
    };

    for (cell, &count) in counts.iter().enumerate() {
        let bin = (count as usize).min(HIST_BINS - 1);
        all_hist[bin] += 1;
        if let Some(marked) = &whitelisted {
            if marked.get(cell as u64) {
                wl_hist[bin] += 1;
            }
        }
    }
    Ok((all_hist, wl_hist))
}

/// Infers the occurrence cutoff as the first local minimum of the
/// histogram: the scan keeps a running minimum and stops as soon as a bin
/// exceeds twice that minimum. Never returns less than 1.
pub fn infer_cutoff(all_hist: &[u64]) -> u16 {
    let mut cutoff = 1usize;
    let mut min = u64::MAX / 2;
    for (i, &v) in all_hist.iter().enumerate() {
        if v < min {
            min = v;
            cutoff = i;
        }
        if v > 2 * min {
            break;
        }
    }
    cutoff.max(1) as u16
}

/// Dinucleotide entropy of a barcode: the Shannon entropy of its L-1
/// overlapping dinucleotides, normalized by the 4 bits of a uniform
/// dinucleotide distribution. Homopolymers score 0.
pub fn dinucleotide_entropy(bc: &str) -> f64 {
    let bytes = bc.as_bytes();
    if bytes.len() < 2 {
        return 0.0;
    }
    let mut di_counts = [0u32; 16];
    for pair in bytes.windows(2) {
        let first = dna::base_ord(pair[0]).expect("entropy input must be ACGT");
        let second = dna::base_ord(pair[1]).expect("entropy input must be ACGT");
        di_counts[(first + 4 * second) as usize] += 1;
    }
    let total = (bytes.len() - 1) as f64;
    let mut score = 0.0;
    for &count in &di_counts {
        if count == 0 {
            continue;
        }
        let p = count as f64 / total;
        score -= p * p.log2();
    }
    score / 4.0
}

/// Runs whitelist inference end to end: count, histogram, cutoff, entropy
/// filter. Writes the whitelist to `out` and the histograms to
/// `<out>.hist`.
pub fn infer_whitelist(fastq: &Path, out: &Path, opts: &InferOptions) -> Result<()> {
    let counts = count_barcodes(fastq, opts.bc_len)?;

    let reference = match &opts.reference_whitelist {
        Some(path) => Some(crate::io::read_whitelist(path)?),
        None => None,
    };
    let (all_hist, wl_hist) = make_histograms(&counts, opts.bc_len, reference.as_deref())?;
    write_histograms(&hist_path(out), &all_hist, &wl_hist)?;

    let cutoff = if opts.cutoff == 0 {
        infer_cutoff(&all_hist)
    } else {
        opts.cutoff
    };
    info!("minimum number of barcode occurrences set to {cutoff}");

    info!("writing whitelist to {}", out.display());
    let mut writer = BufWriter::new(File::create(out)?);
    let bar = ProgressBar::new(counts.len() as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("    {bar:40} {percent}% [{elapsed_precise}]")
            .expect("static progress template"),
    );
    let mut emitted = 0u64;
    for (cell, &count) in counts.iter().enumerate() {
        if count >= cutoff {
            let bc = unhash(cell as u64, opts.bc_len);
            if dinucleotide_entropy(&bc) >= opts.min_entropy {
                writeln!(writer, "{bc}")?;
                emitted += 1;
            }
        }
        if cell % (1 << 22) == 0 {
            bar.set_position(cell as u64);
        }
    }
    bar.finish_and_clear();
    info!("wrote {emitted} whitelisted barcodes");
    Ok(())
}

fn hist_path(out: &Path) -> PathBuf {
    let mut name = out.as_os_str().to_os_string();
    name.push(".hist");
    PathBuf::from(name)
}

fn write_histograms(path: &Path, all_hist: &[u64], wl_hist: &[u64]) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(writer, "All\tWhitelisted")?;
    for (a, w) in all_hist.iter().zip(wl_hist) {
        writeln!(writer, "{a}\t{w}")?;
    }
    Ok(())
}
