//! Barcode statistics over corrected output.
//!
//! Consumes either the TSV written by the correct pipeline or a FASTQ
//! whose read descriptions carry `BX:Z:`/`RX:Z:`/`QX:Z:` tags, and
//! aggregates how many pairs were error-free, corrected via one mismatch,
//! or unrecognized, plus a reads-per-barcode histogram and, per quality
//! character, where the corrected mismatches sat in the barcode.
//!
#![deny(missing_docs)]
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use log::info;
use seq_io::fastq::Record;

use crate::errors::{Error, Result};
use crate::io::invalid_data;
use crate::whitelist::HIST_BINS;

/// Aggregated barcode statistics.
#[derive(Debug, Default)]
pub struct BarcodeStats {
    /// Read pairs whose barcode matched its correction exactly.
    pub error_free: u64,
    /// Read pairs corrected via exactly one mismatch.
    pub one_error: u64,
    /// Read pairs without any correction.
    pub unrecognized: u64,
    /// Histogram over reads per corrected barcode, computed over runs of
    /// equal consecutive corrected barcodes (input sorted by barcode).
    pub count_hist: Vec<u64>,
    /// Per quality character of the mismatched base: histogram of the
    /// mismatch position within the barcode.
    pub one_error_hist: BTreeMap<char, Vec<u64>>,
    prev_corrected: Option<String>,
    prev_count: u64,
}

impl BarcodeStats {
    /// Counts one read pair.
    ///
    /// # Parameters
    /// * `barcode`: the raw barcode as sequenced
    /// * `corrected`: its correction candidates, best first; empty when
    ///   unrecognized
    /// * `qual`: the barcode quality string
    pub fn count_read_pair(&mut self, barcode: &str, corrected: &[String], qual: &[u8]) {
        if corrected.is_empty() {
            self.unrecognized += 1;
            return;
        }
        if self.count_hist.is_empty() {
            self.count_hist = vec![0; HIST_BINS];
        }

        let best = &corrected[0];
        if Some(best) == self.prev_corrected.as_ref() {
            self.prev_count += 1;
        } else {
            self.flush_run();
            self.prev_corrected = Some(best.clone());
            self.prev_count = 1;
        }

        let mismatches: Vec<usize> = best
            .bytes()
            .zip(barcode.bytes())
            .enumerate()
            .filter(|(_, (corrected_base, raw_base))| corrected_base != raw_base)
            .map(|(i, _)| i)
            .collect();
        match mismatches.len() {
            0 => self.error_free += 1,
            1 => {
                self.one_error += 1;
                let pos = mismatches[0];
                let quality = *qual.get(pos).unwrap_or(&b'!') as char;
                let hist = self
                    .one_error_hist
                    .entry(quality)
                    .or_insert_with(|| vec![0; barcode.len()]);
                hist[pos] += 1;
            }
            // a correction never changes more than one base
            _ => {}
        }
    }

    /// Flushes the pending barcode run into the histogram. Call once after
    /// the last pair.
    pub fn finish(&mut self) {
        if !self.count_hist.is_empty() {
            self.flush_run();
        }
    }

    fn flush_run(&mut self) {
        if self.prev_count > 0 {
            let bin = (self.prev_count as usize).min(self.count_hist.len() - 1);
            self.count_hist[bin] += 1;
        }
        self.prev_count = 0;
    }
}

/// Splits a comma-separated corrected-barcode field; `*` means none.
pub fn parse_barcode_list(field: &str) -> Vec<String> {
    if field == "*" || field.is_empty() {
        return Vec::new();
    }
    field.split(',').map(String::from).collect()
}

/// Streams over a TSV written by the correct pipeline (sorted by barcode
/// for a meaningful per-barcode histogram).
pub fn stats_tsv(input: &Path) -> Result<BarcodeStats> {
    info!("streaming over the input TSV file");
    let mut stats = BarcodeStats::default();
    let reader = BufReader::new(File::open(input)?);
    for line in reader.lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 7 {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("TSV row with {} fields, expected at least 7", fields.len()),
            )));
        }
        let corrected = parse_barcode_list(fields[1]);
        stats.count_read_pair(fields[2], &corrected, fields[6].as_bytes());
    }
    stats.finish();
    Ok(stats)
}

/// Streams over a (gzipped) FASTQ whose read descriptions carry the
/// corrected barcode as `BX:Z:`, the raw barcode as `RX:Z:` and its
/// quality as `QX:Z:`.
pub fn stats_fastq(input: &Path) -> Result<BarcodeStats> {
    info!("streaming over the input FASTQ file");
    let mut stats = BarcodeStats::default();
    let mut reader = crate::io::open_fastq(input)?;
    let mut n_records = 0u64;
    while let Some(record) = reader.next() {
        let record = record.map_err(invalid_data)?;
        n_records += 1;
        let desc = match record.desc() {
            Some(Ok(desc)) => desc,
            _ => "",
        };
        let (barcode, corrected, qual) = parse_read_tags(desc);
        stats.count_read_pair(&barcode, &corrected, qual.as_bytes());
    }
    if n_records == 0 {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "input FASTQ file is empty",
        )));
    }
    stats.finish();
    Ok(stats)
}

/// Pulls the raw barcode (RX), corrected barcode list (BX) and barcode
/// quality (QX) out of a read description.
fn parse_read_tags(desc: &str) -> (String, Vec<String>, String) {
    let mut barcode = String::new();
    let mut corrected = Vec::new();
    let mut qual = String::new();
    for token in desc.split_whitespace() {
        if let Some(value) = token.strip_prefix("BX:Z:") {
            corrected = parse_barcode_list(value);
        } else if let Some(value) = token.strip_prefix("RX:Z:") {
            barcode = value.to_string();
        } else if let Some(value) = token.strip_prefix("QX:Z:") {
            qual = value.to_string();
        }
    }
    (barcode, corrected, qual)
}

/// Writes the aggregated statistics as a line-oriented report.
pub fn write_stats(out: &Path, stats: &BarcodeStats) -> Result<()> {
    let mut writer = BufWriter::new(File::create(out)?);
    writeln!(writer, "ERROR_FREE_BARCODES\t{}", stats.error_free)?;
    writeln!(writer, "ONE_MISMATCH_BARCODES\t{}", stats.one_error)?;
    writeln!(writer, "UNRECOGNIZED_BARCODES\t{}", stats.unrecognized)?;

    write!(writer, "BARCODE_COUNT_HIST")?;
    for count in &stats.count_hist {
        write!(writer, "\t{count}")?;
    }
    writeln!(writer)?;

    for (quality, hist) in &stats.one_error_hist {
        write!(writer, "ONE_ERROR_HIST_QUAL_{quality}")?;
        for count in hist {
            write!(writer, "\t{count}")?;
        }
        writeln!(writer)?;
    }
    Ok(())
}
