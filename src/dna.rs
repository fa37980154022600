//! 2-bit encoding of fixed-length DNA barcodes.
//!
//! Barcodes over {A,C,G,T} map bijectively to integers in `[0, 4^L)` with
//! A=00, C=01, G=10, T=11, most significant base first. All tables of the
//! barcode index are addressed by these keys, so substitutions become XOR
//! operations on the key (see [`for_each_neighbor`]).
//!
#![deny(missing_docs)]

/// Decoding table, indexed by the 2-bit code of a base.
pub const BASES: [char; 4] = ['A', 'C', 'G', 'T'];

/// 2-bit code of a single base, `None` for anything outside {A,C,G,T}.
#[inline]
pub fn base_ord(b: u8) -> Option<u64> {
    match b {
        b'A' => Some(0),
        b'C' => Some(1),
        b'G' => Some(2),
        b'T' => Some(3),
        _ => None,
    }
}

/// Packs a barcode into its 2-bit key, most significant base first.
///
/// The input must be pure {A,C,G,T} of length at most 32; ambiguous bases
/// are rejected upstream (whitelist parsing, query adapter) before any key
/// is computed.
pub fn hash(barcode: &[u8]) -> u64 {
    debug_assert!(barcode.len() <= 32);
    let mut h = 0;
    for &b in barcode {
        h = (h << 2) | base_ord(b).expect("hash() requires a pure ACGT barcode");
    }
    h
}

/// Inverse of [`hash`] for a barcode of length `bc_len`.
pub fn unhash(h: u64, bc_len: usize) -> String {
    let mut buf = vec!['A'; bc_len];
    let mut h = h;
    for i in (0..bc_len).rev() {
        buf[i] = BASES[(h & 3) as usize];
        h >>= 2;
    }
    buf.into_iter().collect()
}

/// 0-based positions (from the left) that hold anything outside {A,C,G,T}.
///
/// Sequencers emit N for an uncalled base; all non-ACGT symbols are treated
/// alike here.
pub fn ambiguous_positions(barcode: &[u8]) -> Vec<usize> {
    barcode
        .iter()
        .enumerate()
        .filter(|(_, &b)| base_ord(b).is_none())
        .map(|(i, _)| i)
        .collect()
}

/// Visits all `3*bc_len` keys at Hamming distance 1 from `h`, as
/// `(position, key)` with positions counted from the right.
///
/// Flipping the base at position `i` is an XOR with one of
/// `{01, 10, 11} << 2i`; the sequence 01, 10, 01, 10 walks the three
/// alternatives and lands back on `h`.
pub fn for_each_neighbor<F: FnMut(usize, u64)>(h: u64, bc_len: usize, mut f: F) {
    let mut h = h;
    for i in 0..bc_len {
        h ^= 1 << (2 * i);
        f(i, h);
        h ^= 2 << (2 * i);
        f(i, h);
        h ^= 1 << (2 * i);
        f(i, h);
        h ^= 2 << (2 * i);
    }
}

/// The three keys differing from `h` exactly at position `i` from the right.
///
/// The order is fixed (XOR with 10, 11, 01) so that candidate lists built
/// from it are deterministic.
pub fn alternatives_at(h: u64, i: usize) -> [u64; 3] {
    [h ^ (2 << (2 * i)), h ^ (3 << (2 * i)), h ^ (1 << (2 * i))]
}
