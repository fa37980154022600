//! Shared file plumbing: whitelist parsing and (compressed) FASTQ input.
//!
#![deny(missing_docs)]
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use log::debug;
use seq_io::fastq::Reader as FastqReader;

use crate::errors::{Error, Result};

/// Reads a whitelist file: one barcode per line, blank lines skipped.
///
/// Content validation (equal lengths, ACGT alphabet) happens where the
/// entries are consumed, so that entry numbers can be reported.
pub fn read_whitelist(path: &Path) -> Result<Vec<String>> {
    let file = File::open(path)?;
    let mut barcodes = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        let bc = line.trim();
        if !bc.is_empty() {
            barcodes.push(bc.to_string());
        }
    }
    Ok(barcodes)
}

/// Opens a FASTQ file, transparently decompressing gzip input.
pub fn open_fastq(path: &Path) -> Result<FastqReader<Box<dyn Read>>> {
    let file = File::open(path)?;
    let (reader, compression) = niffler::get_reader(Box::new(file)).map_err(invalid_data)?;
    debug!("opened {} with compression {:?}", path.display(), compression);
    Ok(FastqReader::new(reader))
}

/// Maps a parser error (niffler, seq_io) onto our I/O error kind.
pub fn invalid_data<E>(e: E) -> Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}
