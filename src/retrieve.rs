//! Query adapter: from an observed barcode with its quality string to an
//! ordered list of whitelisted candidates.
//!
//! The index itself is total over pure ACGT keys; this layer adds the two
//! things sequencers throw at it: uncalled bases (N) and the quality
//! information used to rank alternative corrections.
//!
#![deny(missing_docs)]
use crate::dna::{self, hash, unhash};
use crate::index::{BarcodeIndex, Status};

impl BarcodeIndex {
    /// Classifies an observed barcode and returns the whitelisted
    /// candidates it can be corrected to.
    ///
    /// # Parameters
    /// * `observed`: barcode bases as read from the sequencer; anything
    ///   outside {A,C,G,T} is treated as N
    /// * `qual`: the matching quality string (same length as `observed`)
    ///
    /// A match returns the barcode itself. A one-error cell returns all
    /// candidates ordered by ascending quality of the substituted base
    /// (the lower the quality, the likelier the sequencing error, the
    /// higher the rank); ties keep the deterministic order of
    /// [`BarcodeIndex::corrections`]. A single N is treated as the one
    /// allowed error: the candidates are the exact-match completions of
    /// the N, and the status is [`Status::OneError`] iff any exist. Two or
    /// more Ns are never corrected.
    pub fn retrieve(&self, observed: &[u8], qual: &[u8]) -> (Status, Vec<String>) {
        debug_assert_eq!(observed.len(), self.bc_len());
        debug_assert_eq!(qual.len(), observed.len());
        let ambiguous = dna::ambiguous_positions(observed);
        match ambiguous.len() {
            0 => self.retrieve_exact(observed, qual),
            1 => self.retrieve_single_n(observed, ambiguous[0]),
            _ => (Status::Unrecognized, Vec::new()),
        }
    }

    fn retrieve_exact(&self, observed: &[u8], qual: &[u8]) -> (Status, Vec<String>) {
        let h = hash(observed);
        match self.classify(h) {
            Status::Unrecognized => (Status::Unrecognized, Vec::new()),
            Status::Match => (
                Status::Match,
                vec![String::from_utf8_lossy(observed).into_owned()],
            ),
            Status::OneError => {
                // substitution positions count from the right, qualities
                // from the left
                let mut candidates: Vec<(String, u8)> = self
                    .corrections(h)
                    .into_iter()
                    .map(|(key, pos)| (unhash(key, self.bc_len()), qual[qual.len() - 1 - pos]))
                    .collect();
                candidates.sort_by_key(|&(_, q)| q);
                (
                    Status::OneError,
                    candidates.into_iter().map(|(bc, _)| bc).collect(),
                )
            }
        }
    }

    /// One uncalled base: enumerate its four completions and keep those
    /// that are exact whitelist hits. Completions that would need a second
    /// substitution stay out.
    fn retrieve_single_n(&self, observed: &[u8], n_pos: usize) -> (Status, Vec<String>) {
        let mut completion = observed.to_vec();
        let mut candidates = Vec::new();
        for &base in b"ACGT" {
            completion[n_pos] = base;
            if self.classify(hash(&completion)) == Status::Match {
                candidates.push(String::from_utf8_lossy(&completion).into_owned());
            }
        }
        let status = if candidates.is_empty() {
            Status::Unrecognized
        } else {
            Status::OneError
        };
        (status, candidates)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn wl(entries: &[&str]) -> Vec<String> {
        entries.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_exact_match_and_miss() {
        let idx = BarcodeIndex::from_barcodes(&wl(&["ACGT"]), 4).unwrap();
        assert_eq!(
            idx.retrieve(b"ACGT", b"FFFF"),
            (Status::Match, vec!["ACGT".to_string()])
        );
        assert_eq!(
            idx.retrieve(b"ACGA", b"FFFF"),
            (Status::OneError, vec!["ACGT".to_string()])
        );
        assert_eq!(idx.retrieve(b"TTTT", b"FFFF"), (Status::Unrecognized, vec![]));
    }

    #[test]
    fn test_candidates_ordered_by_substituted_quality() {
        // CAAC corrects to CAAA (substitution at position 0, quality byte
        // qual[3]) and to AAAC (position 3, quality byte qual[0])
        let idx = BarcodeIndex::from_barcodes(&wl(&["CAAA", "AAAC"]), 4).unwrap();

        let (s, candidates) = idx.retrieve(b"CAAC", b"!FFF");
        assert_eq!(s, Status::OneError);
        assert_eq!(candidates, vec!["AAAC".to_string(), "CAAA".to_string()]);

        let (s, candidates) = idx.retrieve(b"CAAC", b"F!!!");
        assert_eq!(s, Status::OneError);
        assert_eq!(candidates, vec!["CAAA".to_string(), "AAAC".to_string()]);
    }

    #[test]
    fn test_equal_quality_keeps_block_order() {
        let idx = BarcodeIndex::from_barcodes(&wl(&["ACGT", "ACGA"]), 4).unwrap();
        let (s, candidates) = idx.retrieve(b"ACGC", b"FFFI");
        assert_eq!(s, Status::OneError);
        assert_eq!(candidates, vec!["ACGT".to_string(), "ACGA".to_string()]);
    }

    #[test]
    fn test_single_n_completions() {
        let idx = BarcodeIndex::from_barcodes(&wl(&["ACAT", "ACCT", "TTTT"]), 4).unwrap();
        let (s, candidates) = idx.retrieve(b"ACNT", b"FFFF");
        assert_eq!(s, Status::OneError);
        assert_eq!(candidates, vec!["ACAT".to_string(), "ACCT".to_string()]);
    }

    #[test]
    fn test_single_n_without_exact_completion() {
        let idx = BarcodeIndex::from_barcodes(&wl(&["ACAT"]), 4).unwrap();
        // GCNT: no completion is whitelisted, and the one-error completions
        // (e.g. ACAT via two changes) must not sneak in
        assert_eq!(idx.retrieve(b"GCNT", b"FFFF"), (Status::Unrecognized, vec![]));
    }

    #[test]
    fn test_multiple_ns_rejected() {
        let idx = BarcodeIndex::from_barcodes(&wl(&["ACAT", "ACCT"]), 4).unwrap();
        assert_eq!(idx.retrieve(b"ANNN", b"FFFF"), (Status::Unrecognized, vec![]));
        assert_eq!(idx.retrieve(b"NCNT", b"FFFF"), (Status::Unrecognized, vec![]));
    }

    #[test]
    fn test_non_iupac_symbol_counts_as_n() {
        let idx = BarcodeIndex::from_barcodes(&wl(&["ACAT"]), 4).unwrap();
        let (s, candidates) = idx.retrieve(b"AC.T", b"FFFF");
        assert_eq!(s, Status::OneError);
        assert_eq!(candidates, vec!["ACAT".to_string()]);
    }
}
