//! The succinct barcode index.
//!
//! Three tables answer membership and single-substitution correction over
//! the full 4^L key space in constant time per query:
//!
//! * the *barcode table* `B`, one bit per cell: set iff the cell is a
//!   whitelisted barcode or correctable to one,
//! * the *match table* `M`, condensed to `popcount(B)` bits and addressed
//!   via `rank1` over `B`: distinguishes exact matches from one-error
//!   cells,
//! * the *substitution table* `S`: for every one-error cell a block of
//!   `alts` packed positions telling where a substitution leads back into
//!   the whitelist.
//!
//! Bounding the number of alternative corrections happens at build time:
//! a cell adjacent to more than `alts` whitelisted barcodes is demoted to
//! unrecognized and never looked at again.
//!
#![deny(missing_docs)]
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use itertools::Itertools;
use log::info;

use crate::bitvec::BitVec;
use crate::dna::{self, hash};
use crate::errors::{Error, Result};
use crate::intvec::{bits_for, IntVec};

/// Longest supported barcode: the dense tables address 4^16 = 2^32 cells.
pub const MAX_BC_LEN: usize = 16;

/// Largest accepted value for the alternative-corrections cap; the
/// effective cap is the next power of two.
pub const MAX_ALTS: u32 = 48;

/// Classification of an observed barcode key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Not whitelisted and not correctable.
    Unrecognized,
    /// A whitelisted barcode.
    Match,
    /// Within Hamming distance 1 of at most `alts` whitelisted barcodes.
    OneError,
}

/// Cell state during phase 1. `Invalid` marks a cell with too many
/// alternative corrections; it is encoded as `B=0, H=1` and disappears at
/// condensation, so the public [`Status`] never carries it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuildStatus {
    Unrecognized,
    Invalid,
    Match,
    OneError,
}

/// The immutable barcode index. Build or load once, then query from any
/// number of readers.
#[derive(Debug)]
pub struct BarcodeIndex {
    num_alts: u32,
    bc_len: usize,
    barcode_table: BitVec,
    match_table: BitVec,
    subst_table: IntVec,
}

impl BarcodeIndex {
    /// Builds the index from a whitelist file (one barcode per line).
    ///
    /// # Parameters
    /// * `whitelist`: text file of barcodes, all the same length, ACGT only
    /// * `alts`: alternative-corrections cap in `[1, 48]`, rounded up to
    ///    the next power of two
    pub fn build(whitelist: &Path, alts: u32) -> Result<Self> {
        let barcodes = crate::io::read_whitelist(whitelist)?;
        Self::from_barcodes(&barcodes, alts)
    }

    /// Builds the index from in-memory whitelist entries.
    pub fn from_barcodes(barcodes: &[String], alts: u32) -> Result<Self> {
        if !(1..=MAX_ALTS).contains(&alts) {
            return Err(Error::ParameterOutOfRange(format!(
                "alternative-corrections cap must be in 1..={MAX_ALTS}, got {alts}"
            )));
        }
        let num_alts = alts.next_power_of_two();

        if barcodes.is_empty() {
            return Err(Error::WhitelistFormat {
                line: 0,
                reason: "whitelist is empty".to_string(),
            });
        }
        let bc_len = barcodes[0].len();
        if bc_len == 0 || bc_len > MAX_BC_LEN {
            return Err(Error::ParameterOutOfRange(format!(
                "barcode length must be in 1..={MAX_BC_LEN}, got {bc_len}"
            )));
        }
        for (i, bc) in barcodes.iter().enumerate() {
            if bc.len() != bc_len {
                return Err(Error::WhitelistFormat {
                    line: i + 1,
                    reason: format!("'{bc}' has length {}, expected {bc_len}", bc.len()),
                });
            }
            if let Some(bad) = bc.bytes().find(|&b| dna::base_ord(b).is_none()) {
                return Err(Error::WhitelistFormat {
                    line: i + 1,
                    reason: format!("'{bc}' contains '{}', only A/C/G/T allowed", bad as char),
                });
            }
        }

        // Repeated whitelist entries would inflate the alternative counts.
        let keys: Vec<u64> = barcodes
            .iter()
            .map(|bc| hash(bc.as_bytes()))
            .unique()
            .collect();

        info!("building barcode and match table over {} barcodes", keys.len());
        let (mut barcode_table, mut match_table) = build_cell_tables(&keys, bc_len, num_alts);

        info!("condensing match table");
        condense_match_table(&barcode_table, &mut match_table);

        info!("building substitution table");
        barcode_table.build_rank();
        match_table.build_rank();
        let subst_table = build_subst_table(&keys, bc_len, num_alts, &barcode_table, &match_table);

        Ok(BarcodeIndex {
            num_alts,
            bc_len,
            barcode_table,
            match_table,
            subst_table,
        })
    }

    /// Barcode length L.
    pub fn bc_len(&self) -> usize {
        self.bc_len
    }

    /// Effective alternative-corrections cap (a power of two).
    pub fn num_alts(&self) -> u32 {
        self.num_alts
    }

    /// Classifies a 2-bit packed key.
    #[inline]
    pub fn classify(&self, h: u64) -> Status {
        if !self.barcode_table.get(h) {
            return Status::Unrecognized;
        }
        if self.match_table.get(self.barcode_table.rank1(h)) {
            Status::OneError
        } else {
            Status::Match
        }
    }

    /// All whitelisted keys at Hamming distance 1 of a one-error cell,
    /// each with the substitution position (from the right) that reaches
    /// it. Entries come in substitution-table block order; two whitelisted
    /// barcodes reachable at the same position appear in the fixed
    /// alternative order of [`dna::alternatives_at`].
    ///
    /// Only meaningful when `classify(h)` returned [`Status::OneError`].
    pub fn corrections(&self, h: u64) -> Vec<(u64, usize)> {
        let slot = self.barcode_table.rank1(h);
        let block = self.match_table.rank1(slot);
        let a = self.num_alts as u64;

        // The block holds the recorded positions in insertion order,
        // duplicate-filled behind the last real entry. Padding repeats a
        // recorded position (or is zero beyond the fill), so expanding the
        // distinct positions loses nothing and invents nothing: a match at
        // an unrecorded position would have been recorded.
        let positions = (0..a).map(|o| self.subst_table.get(block * a + o)).unique();

        let mut out = Vec::new();
        for i in positions {
            for alt in dna::alternatives_at(h, i as usize) {
                if self.classify(alt) == Status::Match {
                    out.push((alt, i as usize));
                }
            }
        }
        out
    }

    /// Writes the index as three files: `<base>.bc` (the cap and the
    /// barcode table), `<base>.match`, `<base>.subst`.
    pub fn save(&self, base: &Path) -> Result<()> {
        use std::io::Write;

        info!("writing barcode table");
        let mut w = BufWriter::new(File::create(with_suffix(base, BC_SUFFIX))?);
        bincode::serialize_into(&mut w, &self.num_alts).map_err(ser_err)?;
        bincode::serialize_into(&mut w, &self.barcode_table).map_err(ser_err)?;
        w.flush()?;

        info!("writing match table");
        let mut w = BufWriter::new(File::create(with_suffix(base, MATCH_SUFFIX))?);
        bincode::serialize_into(&mut w, &self.match_table).map_err(ser_err)?;
        w.flush()?;

        info!("writing substitution table");
        let mut w = BufWriter::new(File::create(with_suffix(base, SUBST_SUFFIX))?);
        bincode::serialize_into(&mut w, &self.subst_table).map_err(ser_err)?;
        w.flush()?;
        Ok(())
    }

    /// Loads an index written by [`BarcodeIndex::save`] and rebuilds the
    /// rank structures. A missing file is reported with its code (1 = .bc,
    /// 2 = .match, 3 = .subst); inconsistent tables are
    /// [`Error::SerializationCorrupt`].
    pub fn load(base: &Path) -> Result<Self> {
        info!("loading barcode index {}", base.display());
        let mut r = BufReader::new(open_indexed(base, BC_SUFFIX, 1)?);
        let num_alts: u32 = bincode::deserialize_from(&mut r).map_err(ser_err)?;
        let mut barcode_table: BitVec = bincode::deserialize_from(&mut r).map_err(ser_err)?;

        let r = BufReader::new(open_indexed(base, MATCH_SUFFIX, 2)?);
        let mut match_table: BitVec = bincode::deserialize_from(r).map_err(ser_err)?;

        let r = BufReader::new(open_indexed(base, SUBST_SUFFIX, 3)?);
        let subst_table: IntVec = bincode::deserialize_from(r).map_err(ser_err)?;

        if num_alts == 0 || !num_alts.is_power_of_two() || num_alts > MAX_ALTS.next_power_of_two() {
            return Err(Error::SerializationCorrupt(format!(
                "stored correction cap {num_alts} is not a power of two in range"
            )));
        }
        let nbits = barcode_table.len();
        let bc_len = (nbits.trailing_zeros() / 2) as usize;
        if nbits == 0 || bc_len == 0 || nbits != 1 << (2 * bc_len) || bc_len > MAX_BC_LEN {
            return Err(Error::SerializationCorrupt(format!(
                "barcode table length {nbits} is not 4^L for a supported L"
            )));
        }

        barcode_table.build_rank();
        if match_table.len() != barcode_table.popcount() {
            return Err(Error::SerializationCorrupt(format!(
                "match table has {} bits for {} marked cells",
                match_table.len(),
                barcode_table.popcount()
            )));
        }
        match_table.build_rank();

        let one_error_cells = match_table.popcount();
        if subst_table.len() != one_error_cells * num_alts as u64 {
            return Err(Error::SerializationCorrupt(format!(
                "substitution table has {} entries for {} one-error cells at cap {num_alts}",
                subst_table.len(),
                one_error_cells
            )));
        }
        if subst_table.width() != bits_for(bc_len as u64) {
            return Err(Error::SerializationCorrupt(format!(
                "substitution table width {} does not fit barcode length {bc_len}",
                subst_table.width()
            )));
        }

        Ok(BarcodeIndex {
            num_alts,
            bc_len,
            barcode_table,
            match_table,
            subst_table,
        })
    }

    /// True if the first index file exists, i.e. a previously saved index
    /// can be expected at this base path.
    pub fn exists(base: &Path) -> bool {
        with_suffix(base, BC_SUFFIX).exists()
    }
}

const BC_SUFFIX: &str = ".bc";
const MATCH_SUFFIX: &str = ".match";
const SUBST_SUFFIX: &str = ".subst";

fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut name = base.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

fn open_indexed(base: &Path, suffix: &str, code: u8) -> Result<File> {
    let path = with_suffix(base, suffix);
    File::open(&path).map_err(|_| Error::IndexIncomplete { path, code })
}

fn ser_err(e: bincode::Error) -> Error {
    match *e {
        bincode::ErrorKind::Io(io) => Error::Io(io),
        other => Error::SerializationCorrupt(other.to_string()),
    }
}

/// Phase-1 state of a cell, decoded from the three working tables.
fn build_status(barcode_table: &BitVec, match_table: &BitVec, helper: &IntVec, h: u64) -> BuildStatus {
    if barcode_table.get(h) {
        if match_table.get(h) {
            BuildStatus::OneError
        } else {
            BuildStatus::Match
        }
    } else if helper.get(h) == 1 {
        BuildStatus::Invalid
    } else {
        BuildStatus::Unrecognized
    }
}

/// Records one more whitelisted barcode at Hamming distance 1 of cell `h`.
///
/// The helper counts the alternatives recorded so far; once it would pass
/// `num_alts` the cell is demoted for good (`B=0, H=1`). A match always
/// stays a match.
fn record_one_error(
    barcode_table: &mut BitVec,
    match_table: &mut BitVec,
    helper: &mut IntVec,
    num_alts: u32,
    h: u64,
) {
    match build_status(barcode_table, match_table, helper, h) {
        BuildStatus::Unrecognized => {
            barcode_table.set(h, true);
            match_table.set(h, true);
            helper.set(h, 0);
        }
        BuildStatus::OneError => {
            let recorded = helper.get(h);
            if recorded < (num_alts - 1) as u64 {
                helper.set(h, recorded + 1);
            } else {
                barcode_table.set(h, false);
                match_table.set(h, false);
                helper.set(h, 1);
            }
        }
        BuildStatus::Match | BuildStatus::Invalid => {}
    }
}

/// Phase 1: the full-length barcode table and uncondensed match table.
fn build_cell_tables(keys: &[u64], bc_len: usize, num_alts: u32) -> (BitVec, BitVec) {
    let n_cells = 1u64 << (2 * bc_len);
    let mut barcode_table = BitVec::new(n_cells);
    let mut match_table = BitVec::new(n_cells);
    let mut helper = IntVec::new(n_cells, bits_for(num_alts as u64));

    for &h in keys {
        // A whitelisted barcode is always a match, even if it was first
        // reached as somebody's neighbor.
        barcode_table.set(h, true);
        match_table.set(h, false);
        dna::for_each_neighbor(h, bc_len, |_, neighbor| {
            record_one_error(&mut barcode_table, &mut match_table, &mut helper, num_alts, neighbor);
        });
    }
    (barcode_table, match_table)
}

/// Phase 2: rewrite the match bit of every marked cell down to index
/// `rank1(B, cell)` and shrink the table. The target index never exceeds
/// the source index, so the rewrite runs forward in place.
fn condense_match_table(barcode_table: &BitVec, match_table: &mut BitVec) {
    let mut m = 0u64;
    for b in barcode_table.iter_ones() {
        let v = match_table.get(b);
        match_table.set(m, v);
        m += 1;
    }
    match_table.truncate(m);
}

/// Phase 3: replay the whitelist and record, per one-error cell, the
/// substitution positions leading back to the whitelist. Each block slot
/// behind a freshly written entry is pre-filled with the same value, so
/// padding always repeats a real entry.
fn build_subst_table(
    keys: &[u64],
    bc_len: usize,
    num_alts: u32,
    barcode_table: &BitVec,
    match_table: &BitVec,
) -> IntVec {
    let a = num_alts as u64;
    let one_error_cells = match_table.popcount();
    let mut subst_table = IntVec::new(one_error_cells * a, bits_for(bc_len as u64));
    let mut fill = IntVec::new(one_error_cells, bits_for(a + 1));

    for &h in keys {
        dna::for_each_neighbor(h, bc_len, |i, neighbor| {
            if !barcode_table.get(neighbor) {
                return;
            }
            let slot = barcode_table.rank1(neighbor);
            if !match_table.get(slot) {
                return;
            }
            let block = match_table.rank1(slot);
            let offset = fill.get(block);
            debug_assert!(offset < a, "more alternatives than the cap allows");
            subst_table.set(block * a + offset, i as u64);
            fill.set(block, offset + 1);
            if offset + 1 < a {
                subst_table.set(block * a + offset + 1, i as u64);
            }
        });
    }
    subst_table
}
