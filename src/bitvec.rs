//! Dense bit vector with constant-time rank support.
//!
//! The barcode index keeps one bit per cell of the 4^L key space, so the
//! container has to stay close to the information-theoretic minimum:
//! bits packed into `u64` words plus one cumulative count per 512-bit
//! block for rank queries (12.5% overhead, at most eight word popcounts
//! per query).
//!
//! The rank table is derived state. It is skipped during serialization and
//! must be rebuilt with [`BitVec::build_rank`] after deserializing or after
//! the last mutation.
//!
#![deny(missing_docs)]
use serde::{Deserialize, Serialize};

/// Words per rank block (512 bits).
const BLOCK_WORDS: usize = 8;

/// Bit array of fixed length with rank1 support.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BitVec {
    nbits: u64,
    words: Vec<u64>,
    #[serde(skip)]
    block_ranks: Vec<u64>,
}

impl BitVec {
    /// An all-zero bit vector of `nbits` bits.
    pub fn new(nbits: u64) -> Self {
        let nwords = nbits.div_ceil(64) as usize;
        BitVec {
            nbits,
            words: vec![0; nwords],
            block_ranks: Vec::new(),
        }
    }

    /// Number of bits.
    pub fn len(&self) -> u64 {
        self.nbits
    }

    /// True if the vector holds no bits.
    pub fn is_empty(&self) -> bool {
        self.nbits == 0
    }

    /// Bit at position `i`.
    #[inline]
    pub fn get(&self, i: u64) -> bool {
        debug_assert!(i < self.nbits);
        (self.words[(i / 64) as usize] >> (i % 64)) & 1 == 1
    }

    /// Sets bit `i` to `v`. Invalidates any previously built rank table.
    #[inline]
    pub fn set(&mut self, i: u64, v: bool) {
        debug_assert!(i < self.nbits);
        let w = (i / 64) as usize;
        let mask = 1u64 << (i % 64);
        if v {
            self.words[w] |= mask;
        } else {
            self.words[w] &= !mask;
        }
    }

    /// Total number of set bits. Does not require [`BitVec::build_rank`].
    pub fn popcount(&self) -> u64 {
        self.words.iter().map(|w| w.count_ones() as u64).sum()
    }

    /// Builds the rank table: the cumulative popcount at every 512-bit
    /// block boundary, including one entry past the last block.
    pub fn build_rank(&mut self) {
        let nblocks = self.words.len() / BLOCK_WORDS + 1;
        let mut ranks = Vec::with_capacity(nblocks);
        let mut acc = 0u64;
        for (w, word) in self.words.iter().enumerate() {
            if w % BLOCK_WORDS == 0 {
                ranks.push(acc);
            }
            acc += word.count_ones() as u64;
        }
        while ranks.len() < nblocks {
            ranks.push(acc);
        }
        self.block_ranks = ranks;
    }

    /// Number of set bits strictly before position `i` (`i` may equal the
    /// length). Requires a current rank table.
    #[inline]
    pub fn rank1(&self, i: u64) -> u64 {
        debug_assert!(i <= self.nbits);
        debug_assert!(!self.block_ranks.is_empty(), "rank table not built");
        let word = (i / 64) as usize;
        let mut r = self.block_ranks[word / BLOCK_WORDS];
        for w in (word / BLOCK_WORDS * BLOCK_WORDS)..word {
            r += self.words[w].count_ones() as u64;
        }
        let rem = i % 64;
        if rem > 0 {
            r += (self.words[word] & ((1u64 << rem) - 1)).count_ones() as u64;
        }
        r
    }

    /// Positions of all set bits in ascending order. Skips over zero words,
    /// so sparse vectors iterate much faster than a per-bit scan.
    pub fn iter_ones(&self) -> impl Iterator<Item = u64> + '_ {
        self.words.iter().enumerate().flat_map(|(wi, &word)| {
            let mut rem = word;
            std::iter::from_fn(move || {
                if rem == 0 {
                    None
                } else {
                    let bit = rem.trailing_zeros() as u64;
                    rem &= rem - 1;
                    Some(wi as u64 * 64 + bit)
                }
            })
        })
    }

    /// Shrinks the vector to its first `nbits` bits, zeroing anything the
    /// last word carried beyond the new length. Drops the rank table.
    pub fn truncate(&mut self, nbits: u64) {
        debug_assert!(nbits <= self.nbits);
        self.words.truncate(nbits.div_ceil(64) as usize);
        let rem = nbits % 64;
        if rem > 0 {
            if let Some(last) = self.words.last_mut() {
                *last &= (1u64 << rem) - 1;
            }
        }
        self.nbits = nbits;
        self.block_ranks.clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn naive_rank(bv: &BitVec, i: u64) -> u64 {
        (0..i).filter(|&j| bv.get(j)).count() as u64
    }

    #[test]
    fn test_set_get() {
        let mut bv = BitVec::new(130);
        bv.set(0, true);
        bv.set(63, true);
        bv.set(64, true);
        bv.set(129, true);
        assert!(bv.get(0));
        assert!(!bv.get(1));
        assert!(bv.get(63));
        assert!(bv.get(64));
        assert!(bv.get(129));
        bv.set(64, false);
        assert!(!bv.get(64));
        assert_eq!(bv.popcount(), 3);
    }

    #[test]
    fn test_rank_matches_naive() {
        // spans three rank blocks
        let mut bv = BitVec::new(1600);
        for i in (0..1600).step_by(3) {
            bv.set(i, true);
        }
        for i in (0..1600).step_by(7) {
            bv.set(i, false);
        }
        bv.build_rank();
        for i in [0, 1, 63, 64, 511, 512, 513, 1023, 1024, 1599, 1600] {
            assert_eq!(bv.rank1(i), naive_rank(&bv, i), "rank1({i})");
        }
        assert_eq!(bv.rank1(1600), bv.popcount());
    }

    #[test]
    fn test_rank_full_and_empty() {
        let mut bv = BitVec::new(512);
        bv.build_rank();
        assert_eq!(bv.rank1(512), 0);

        for i in 0..512 {
            bv.set(i, true);
        }
        bv.build_rank();
        assert_eq!(bv.rank1(512), 512);
        assert_eq!(bv.rank1(100), 100);
    }

    #[test]
    fn test_iter_ones() {
        let mut bv = BitVec::new(200);
        let positions = [0u64, 1, 63, 64, 65, 127, 128, 199];
        for &i in &positions {
            bv.set(i, true);
        }
        let got: Vec<u64> = bv.iter_ones().collect();
        assert_eq!(got, positions);

        let empty = BitVec::new(512);
        assert_eq!(empty.iter_ones().count(), 0);
    }

    #[test]
    fn test_truncate_masks_stale_bits() {
        let mut bv = BitVec::new(128);
        for i in 0..128 {
            bv.set(i, true);
        }
        bv.truncate(70);
        assert_eq!(bv.len(), 70);
        assert_eq!(bv.popcount(), 70);
        bv.build_rank();
        assert_eq!(bv.rank1(70), 70);
    }

    #[test]
    fn test_serde_roundtrip_rebuilds_rank() {
        let mut bv = BitVec::new(1000);
        for i in (0..1000).step_by(5) {
            bv.set(i, true);
        }
        let bytes = bincode::serialize(&bv).unwrap();
        let mut back: BitVec = bincode::deserialize(&bytes).unwrap();
        back.build_rank();
        assert_eq!(back.len(), 1000);
        assert_eq!(back.popcount(), bv.popcount());
        bv.build_rank();
        for i in [0, 1, 4, 5, 999, 1000] {
            assert_eq!(back.rank1(i), bv.rank1(i));
        }
    }
}
