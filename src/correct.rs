//! The correction pipeline: cut barcodes off read pairs, look them up in
//! the whitelist index, and emit one TSV row per pair.
//!
//! Read 1 starts with the barcode followed by a fixed-length spacer; both
//! are cut off and reported in their own TSV columns so that downstream
//! tools can reconstruct the original reads. The corrected barcode column
//! lists all candidates in quality-sorted order, or `*` when the barcode
//! could not be corrected.
//!
#![deny(missing_docs)]
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use indicatif::ProgressBar;
use itertools::Itertools;
use log::info;
use seq_io::fastq::Record;

use crate::errors::{Error, Result};
use crate::index::{BarcodeIndex, Status};
use crate::io::invalid_data;

/// Tallies of per-pair correction outcomes.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CorrectionCounts {
    /// Pairs whose barcode was an exact whitelist hit.
    pub whitelisted: u64,
    /// Pairs corrected via one substitution or one uncalled base.
    pub corrected: u64,
    /// Pairs whose barcode could not be corrected.
    pub unrecognized: u64,
    /// Pairs skipped because read 1 was shorter than barcode + spacer.
    pub skipped: u64,
}

/// Uses the prebuilt index files next to `whitelist` when they exist,
/// otherwise builds the index from the whitelist on the fly.
pub fn load_or_build_index(whitelist: &Path, alts: u32) -> Result<BarcodeIndex> {
    if BarcodeIndex::exists(whitelist) {
        let index = BarcodeIndex::load(whitelist)?;
        info!(
            "loaded index, maximum number of alternative corrections is {}",
            index.num_alts()
        );
        Ok(index)
    } else {
        info!("no index files found, building index from whitelist");
        BarcodeIndex::build(whitelist, alts)
    }
}

/// Corrects the barcodes of all read pairs and writes the TSV.
///
/// # Parameters
/// * `index`: a built or loaded [`BarcodeIndex`]
/// * `fastq1`/`fastq2`: the paired FASTQ files (read 1 carries the barcode)
/// * `spacer_len`: bases between barcode and read-1 sequence
/// * `out`: TSV output file, stdout when `None`
pub fn correct(
    index: &BarcodeIndex,
    fastq1: &Path,
    fastq2: &Path,
    spacer_len: usize,
    out: Option<&Path>,
) -> Result<CorrectionCounts> {
    let mut reader1 = crate::io::open_fastq(fastq1)?;
    let mut reader2 = crate::io::open_fastq(fastq2)?;
    let raw_writer: Box<dyn Write> = match out {
        Some(path) => Box::new(File::create(path)?),
        None => Box::new(io::stdout()),
    };
    let mut writer = io::BufWriter::new(raw_writer);

    let bc_len = index.bc_len();
    let cut = bc_len + spacer_len;
    let mut counts = CorrectionCounts::default();

    info!("retrieving whitelist barcodes");
    let bar = ProgressBar::new_spinner();
    let mut n_pairs = 0u64;

    while let Some(record1) = reader1.next() {
        let record1 = record1.map_err(invalid_data)?;
        let record2 = reader2
            .next()
            .ok_or_else(|| {
                Error::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("{} ended before {}", fastq2.display(), fastq1.display()),
                ))
            })?
            .map_err(invalid_data)?;

        n_pairs += 1;
        if n_pairs % 100_000 == 0 {
            bar.set_message(format!("{n_pairs} read pairs"));
            bar.tick();
        }

        let seq1 = record1.seq();
        let qual1 = record1.qual();
        if seq1.len() < cut || qual1.len() < cut {
            counts.skipped += 1;
            continue;
        }

        let (status, candidates) = index.retrieve(&seq1[..bc_len], &qual1[..bc_len]);
        match status {
            Status::Match => counts.whitelisted += 1,
            Status::OneError => counts.corrected += 1,
            Status::Unrecognized => counts.unrecognized += 1,
        }
        write_tsv_row(&mut writer, &record1, &record2, &candidates, bc_len, spacer_len)?;
    }
    writer.flush()?;
    bar.finish_and_clear();

    info!("processed {n_pairs} read pairs");
    Ok(counts)
}

/// One TSV row per read pair:
/// qname, corrected barcodes (or `*`), raw barcode, spacer, rest of read 1,
/// read 2, barcode quality, spacer quality, rest of qual 1, qual 2.
fn write_tsv_row<W: Write, R: Record>(
    writer: &mut W,
    record1: &R,
    record2: &R,
    candidates: &[String],
    bc_len: usize,
    spacer_len: usize,
) -> Result<()> {
    let seq1 = record1.seq();
    let qual1 = record1.qual();
    let cut = bc_len + spacer_len;

    writer.write_all(record1.id_bytes())?;
    writer.write_all(b"\t")?;
    if candidates.is_empty() {
        writer.write_all(b"*")?;
    } else {
        write!(writer, "{}", candidates.iter().join(","))?;
    }
    writer.write_all(b"\t")?;
    writer.write_all(&seq1[..bc_len])?;
    writer.write_all(b"\t")?;
    writer.write_all(&seq1[bc_len..cut])?;
    writer.write_all(b"\t")?;
    writer.write_all(&seq1[cut..])?;
    writer.write_all(b"\t")?;
    writer.write_all(record2.seq())?;
    writer.write_all(b"\t")?;
    writer.write_all(&qual1[..bc_len])?;
    writer.write_all(b"\t")?;
    writer.write_all(&qual1[bc_len..cut])?;
    writer.write_all(b"\t")?;
    writer.write_all(&qual1[cut..])?;
    writer.write_all(b"\t")?;
    writer.write_all(record2.qual())?;
    writer.write_all(b"\n")?;
    Ok(())
}
