use std::fs;

use rand::{rngs::StdRng, Rng, SeedableRng};
use tempfile::tempdir;

use barcorr::correct::correct;
use barcorr::dna::{hash, unhash};
use barcorr::index::{BarcodeIndex, Status};
use barcorr::stats::stats_tsv;
use barcorr::whitelist::{infer_cutoff, infer_whitelist, make_histograms, InferOptions};

fn wl(entries: &[&str]) -> Vec<String> {
    entries.iter().map(|s| s.to_string()).collect()
}

#[test]
fn scenario_single_whitelisted_barcode() {
    let index = BarcodeIndex::from_barcodes(&wl(&["ACGT"]), 4).unwrap();

    assert_eq!(
        index.retrieve(b"ACGT", b"FFFF"),
        (Status::Match, vec!["ACGT".to_string()])
    );
    assert_eq!(
        index.retrieve(b"ACGA", b"FFFF"),
        (Status::OneError, vec!["ACGT".to_string()])
    );
    assert_eq!(
        index.retrieve(b"TTTT", b"FFFF"),
        (Status::Unrecognized, vec![])
    );
}

#[test]
fn scenario_two_candidates_at_the_same_position() {
    let index = BarcodeIndex::from_barcodes(&wl(&["ACGT", "ACGA"]), 4).unwrap();

    assert_eq!(
        index.retrieve(b"ACGT", b"FFFF"),
        (Status::Match, vec!["ACGT".to_string()])
    );

    // ACGC differs from both whitelisted barcodes at the last base, so
    // both candidates share the same quality and keep their block order
    let (status, candidates) = index.retrieve(b"ACGC", b"FFFI");
    assert_eq!(status, Status::OneError);
    assert_eq!(candidates, vec!["ACGT".to_string(), "ACGA".to_string()]);
}

#[test]
fn scenario_bounded_ambiguity() {
    let index =
        BarcodeIndex::from_barcodes(&wl(&["AAAA", "ACAA", "AGAA", "ATAA", "CAAA"]), 2).unwrap();

    assert_eq!(index.classify(hash(b"AAAA")), Status::Match);

    // a single whitelisted neighbor
    let (status, candidates) = index.retrieve(b"AAAT", b"FFFF");
    assert_eq!(status, Status::OneError);
    assert_eq!(candidates, vec!["AAAA".to_string()]);

    // exactly at the cap: both corrections are reported
    let (status, mut candidates) = index.retrieve(b"GAAA", b"FFFF");
    assert_eq!(status, Status::OneError);
    candidates.sort();
    assert_eq!(candidates, vec!["AAAA".to_string(), "CAAA".to_string()]);

    // over the cap: demoted to unrecognized at build time
    let overflow =
        BarcodeIndex::from_barcodes(&wl(&["AAAC", "AAAG", "AAAT", "ACAA"]), 2).unwrap();
    assert_eq!(
        overflow.retrieve(b"AAAA", b"FFFF"),
        (Status::Unrecognized, vec![])
    );
}

#[test]
fn scenario_ambiguous_bases() {
    let index = BarcodeIndex::from_barcodes(&wl(&["ACAT", "ACCT", "GGGG"]), 4).unwrap();

    assert_eq!(
        index.retrieve(b"ACNT", b"FFFF"),
        (
            Status::OneError,
            vec!["ACAT".to_string(), "ACCT".to_string()]
        )
    );
    assert_eq!(
        index.retrieve(b"ANNN", b"FFFF"),
        (Status::Unrecognized, vec![])
    );
}

#[test]
fn scenario_whitelist_inference_filters_homopolymers() {
    let dir = tempdir().unwrap();
    let fastq = dir.path().join("reads.fastq");

    // occurrence profile: AAAA 100x, AAAC 2x, AAAG 1x, CCCC 50x
    let mut content = String::new();
    let mut add_reads = |seq: &str, n: usize| {
        for i in 0..n {
            content.push_str(&format!("@{seq}_{i}\n{seq}\n+\nFFFF\n"));
        }
    };
    add_reads("AAAA", 100);
    add_reads("AAAC", 2);
    add_reads("AAAG", 1);
    add_reads("CCCC", 50);
    fs::write(&fastq, content).unwrap();

    // the histogram dips between the noise counts and the real barcodes
    let counts = barcorr::whitelist::count_barcodes(&fastq, 4).unwrap();
    let (all_hist, _) = make_histograms(&counts, 4, None).unwrap();
    let cutoff = infer_cutoff(&all_hist);
    assert!(cutoff >= 3 && cutoff <= 50, "cutoff {cutoff}");

    // at the default entropy threshold the homopolymers are filtered,
    // leaving nothing: low-complexity barcodes never make the whitelist
    let out = dir.path().join("whitelist.txt");
    infer_whitelist(&fastq, &out, &InferOptions { bc_len: 4, ..InferOptions::default() }).unwrap();
    assert_eq!(fs::read_to_string(&out).unwrap(), "");
}

#[test]
fn scenario_persistence_roundtrip_over_random_whitelist() {
    let bc_len = 8;
    let n_cells = 1u64 << (2 * bc_len);
    let mut rng = StdRng::seed_from_u64(20240117);
    let barcodes: Vec<String> = (0..10_000)
        .map(|_| unhash(rng.gen_range(0..n_cells), bc_len))
        .collect();

    let index = BarcodeIndex::from_barcodes(&barcodes, 8).unwrap();

    let dir = tempdir().unwrap();
    let base = dir.path().join("random_whitelist");
    index.save(&base).unwrap();
    let loaded = BarcodeIndex::load(&base).unwrap();

    assert_eq!(loaded.bc_len(), bc_len);
    assert_eq!(loaded.num_alts(), 8);
    for h in 0..n_cells {
        assert_eq!(loaded.classify(h), index.classify(h), "cell {h}");
        if index.classify(h) == Status::OneError {
            assert_eq!(loaded.corrections(h), index.corrections(h), "cell {h}");
        }
    }
}

#[test]
fn correction_properties_on_random_whitelist() {
    // soundness and bounded completeness, checked the slow way
    let bc_len = 6;
    let n_cells = 1u64 << (2 * bc_len);
    let alts = 4u32;
    let mut rng = StdRng::seed_from_u64(7);
    let barcodes: Vec<String> = (0..600)
        .map(|_| unhash(rng.gen_range(0..n_cells), bc_len))
        .collect();
    let index = BarcodeIndex::from_barcodes(&barcodes, alts).unwrap();

    let whitelisted: std::collections::HashSet<&str> =
        barcodes.iter().map(|s| s.as_str()).collect();
    let hamming = |a: &str, b: &str| {
        a.bytes().zip(b.bytes()).filter(|(x, y)| x != y).count()
    };

    // every whitelisted barcode is an exact match, no exceptions
    for bc in &barcodes {
        assert_eq!(index.classify(hash(bc.as_bytes())), Status::Match, "{bc}");
    }

    for h in 0..n_cells {
        let observed = unhash(h, bc_len);
        let neighbors: Vec<&&str> = whitelisted
            .iter()
            .filter(|w| hamming(w, &observed) == 1)
            .collect();

        match index.classify(h) {
            Status::Match => {
                assert!(whitelisted.contains(observed.as_str()), "{observed}");
            }
            Status::OneError => {
                let (status, candidates) = index.retrieve(observed.as_bytes(), b"FFFFFF");
                assert_eq!(status, Status::OneError);
                // sound: every candidate is whitelisted at distance one
                for c in &candidates {
                    assert!(whitelisted.contains(c.as_str()), "{observed} -> {c}");
                    assert_eq!(hamming(c, &observed), 1, "{observed} -> {c}");
                }
                // complete: at most `alts` neighbors exist, all reported
                assert!(neighbors.len() <= alts as usize);
                assert_eq!(candidates.len(), neighbors.len(), "{observed}");
            }
            Status::Unrecognized => {
                // either no neighbors at all, or too many to correct
                assert!(
                    neighbors.is_empty() || neighbors.len() > alts as usize,
                    "{observed} has {} neighbors",
                    neighbors.len()
                );
            }
        }
    }
}

#[test]
fn pipeline_correct_then_stats() {
    let dir = tempdir().unwrap();

    let whitelist_path = dir.path().join("whitelist.txt");
    fs::write(&whitelist_path, "ACGTAC\nTTTACG\n").unwrap();
    let index = BarcodeIndex::build(&whitelist_path, 16).unwrap();
    index.save(&whitelist_path).unwrap();

    let fq1 = dir.path().join("r1.fastq");
    let fq2 = dir.path().join("r2.fastq");
    fs::write(
        &fq1,
        "@p1\nACGTACGGGTTTT\n+\nIIIIIIJJJKKKK\n\
         @p2\nACGAACGGGTTTT\n+\nIIIIIIJJJKKKK\n\
         @p3\nCCCCCCGGGTTTT\n+\nIIIIIIJJJKKKK\n",
    )
    .unwrap();
    fs::write(
        &fq2,
        "@p1\nAAAA\n+\nFFFF\n@p2\nAAAA\n+\nFFFF\n@p3\nAAAA\n+\nFFFF\n",
    )
    .unwrap();

    let tsv = dir.path().join("corrected.tsv");
    let counts = correct(&index, &fq1, &fq2, 3, Some(&tsv)).unwrap();
    assert_eq!(counts.whitelisted, 1);
    assert_eq!(counts.corrected, 1);
    assert_eq!(counts.unrecognized, 1);

    let stats = stats_tsv(&tsv).unwrap();
    assert_eq!(stats.error_free, 1);
    assert_eq!(stats.one_error, 1);
    assert_eq!(stats.unrecognized, 1);
}
