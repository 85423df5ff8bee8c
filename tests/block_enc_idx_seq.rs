use blockdex::{
    BlockEncConfig, BlockEncIdxSeq, Error, MultiRangeAlphabet, Project, RangeStoreMode, SEPARATOR,
    Seqpos, alphabet, verify_integrity,
};
use proptest::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tempfile::TempDir;

const DNA_MODES: &[RangeStoreMode] = &[RangeStoreMode::BlockCompositionInclude];
const DNA_SEPARATOR_MODES: &[RangeStoreMode] = &[
    RangeStoreMode::BlockCompositionInclude,
    RangeStoreMode::RegionsList,
];

fn project_with_bwt(bwt: &[u8]) -> (TempDir, Project) {
    let dir = tempfile::tempdir().unwrap();
    let project = Project::new(dir.path().join("testidx"));
    std::fs::write(project.bwt_path(), bwt).unwrap();
    (dir, project)
}

/// Checks `get` and `rank` for every position and symbol against a linear
/// scan of the reference sequence.
fn assert_matches_naive(
    seq_idx: &BlockEncIdxSeq,
    bwt: &[u8],
    alphabet: &MultiRangeAlphabet,
    query_symbols: &[u8],
) {
    let mut hint = seq_idx.new_hint().unwrap();
    let mut counts_by_code = vec![0 as Seqpos; alphabet.size()];

    for (pos, &byte) in bwt.iter().enumerate() {
        let pos = pos as Seqpos;
        let code = alphabet.map(byte).unwrap();
        counts_by_code[code as usize] += 1;

        let canonical = alphabet.rev_map(code);
        assert_eq!(
            seq_idx.get(pos, &mut hint).unwrap(),
            canonical,
            "get({pos}) diverged"
        );

        for &sym in query_symbols {
            let expected = counts_by_code[alphabet.map(sym).unwrap() as usize];
            assert_eq!(
                seq_idx.rank(sym, pos, &mut hint).unwrap(),
                expected,
                "rank({}, {pos}) diverged",
                sym as char
            );
        }

        let rank_sum: Seqpos = (0..alphabet.size() as u8)
            .map(|code| seq_idx.sym_transformed_rank(code, pos, &mut hint).unwrap())
            .sum();
        assert_eq!(rank_sum, pos + 1, "ranks must partition the prefix");
    }

    for &sym in query_symbols {
        let code = alphabet.map(sym).unwrap();
        assert_eq!(
            seq_idx
                .rank(sym, bwt.len() as Seqpos - 1, &mut hint)
                .unwrap(),
            counts_by_code[code as usize],
            "total rank of {} diverged",
            sym as char
        );
    }
}

#[test]
fn rank_and_get_small_dna() {
    let (_dir, project) = project_with_bwt(b"gttaacaaggttccaa");
    let seq_idx = BlockEncConfig::new()
        .block_size(4)
        .construct_index(DNA_MODES, alphabet::dna(), &project)
        .unwrap();

    assert_eq!(seq_idx.len(), 16);

    let mut hint = seq_idx.new_hint().unwrap();
    assert_eq!(seq_idx.rank(b'a', 15, &mut hint).unwrap(), 6);
    assert_eq!(seq_idx.rank(b'c', 15, &mut hint).unwrap(), 3);
    assert_eq!(seq_idx.rank(b'g', 15, &mut hint).unwrap(), 3);
    assert_eq!(seq_idx.rank(b't', 15, &mut hint).unwrap(), 4);

    assert_eq!(seq_idx.get(0, &mut hint).unwrap(), b'g');
    assert_eq!(seq_idx.get(15, &mut hint).unwrap(), b'a');

    assert_matches_naive(&seq_idx, b"gttaacaaggttccaa", &alphabet::dna(), b"acgt");
}

#[test]
fn separator_goes_to_the_region_list() {
    let mut bwt = *b"gttaacaaggttccaa";
    bwt[7] = SEPARATOR;
    let (_dir, project) = project_with_bwt(&bwt);

    let seq_idx = BlockEncConfig::new()
        .block_size(4)
        .construct_index(
            DNA_SEPARATOR_MODES,
            alphabet::dna_with_separator(),
            &project,
        )
        .unwrap();

    let mut hint = seq_idx.new_hint().unwrap();
    assert_eq!(seq_idx.rank(SEPARATOR, 15, &mut hint).unwrap(), 1);
    assert_eq!(seq_idx.rank(b'a', 15, &mut hint).unwrap(), 5);

    // with region lookup the separator shows through, without it the
    // position reads as the fallback symbol
    assert_eq!(seq_idx.get(7, &mut hint).unwrap(), SEPARATOR);
    assert_eq!(seq_idx.get_block_encoded(7, &mut hint).unwrap(), b'a');

    assert_matches_naive(
        &seq_idx,
        &bwt,
        &alphabet::dna_with_separator(),
        &[b'a', b'c', b'g', b't', SEPARATOR],
    );
}

#[test]
fn loaded_index_equals_freshly_built_index() {
    let bwt = b"gttaacaaggttccaagattacagattacagattacaggttaacaaggtt";
    let (_dir, project) = project_with_bwt(bwt);

    let built = BlockEncConfig::new()
        .block_size(4)
        .construct_index(DNA_MODES, alphabet::dna(), &project)
        .unwrap();
    let loaded = BlockEncIdxSeq::load(alphabet::dna(), &project).unwrap();

    assert_eq!(built.len(), loaded.len());
    assert_eq!(built.block_size(), loaded.block_size());

    let mut built_hint = built.new_hint().unwrap();
    let mut loaded_hint = loaded.new_hint().unwrap();
    for pos in 0..built.len() {
        assert_eq!(
            built.get(pos, &mut built_hint).unwrap(),
            loaded.get(pos, &mut loaded_hint).unwrap()
        );
        for sym in b"acgt" {
            assert_eq!(
                built.rank(*sym, pos, &mut built_hint).unwrap(),
                loaded.rank(*sym, pos, &mut loaded_hint).unwrap()
            );
        }
    }
}

#[test]
fn bucket_dividing_and_non_dividing_lengths() {
    // 32 symbols with 16-symbol super-buckets: the length divides evenly and
    // rank at the final position touches the one-past-the-end bucket
    let dividing = b"acgtacgtacgtacgtttttccccggggaaaa";
    let (_dir, project) = project_with_bwt(dividing);
    let seq_idx = BlockEncConfig::new()
        .block_size(4)
        .construct_index(DNA_MODES, alphabet::dna(), &project)
        .unwrap();
    assert_matches_naive(&seq_idx, dividing, &alphabet::dna(), b"acgt");

    // 50 symbols: a trailing partial block and a partial final bucket
    let non_dividing = b"acgtacgtacgtacgtttttccccggggaaaaacgtacgtacgtacgtac";
    let (_dir, project) = project_with_bwt(non_dividing);
    let seq_idx = BlockEncConfig::new()
        .block_size(4)
        .construct_index(DNA_MODES, alphabet::dna(), &project)
        .unwrap();
    assert_matches_naive(&seq_idx, non_dividing, &alphabet::dna(), b"acgt");
}

#[test]
fn verifier_accepts_intact_and_rejects_tampered_index() {
    let bwt: Vec<u8> = b"gattacagattacaggttaacaaggttccaagattacagattacaggttaacaaggttccaag".to_vec();
    let (_dir, project) = project_with_bwt(&bwt);

    let seq_idx = BlockEncConfig::new()
        .block_size(4)
        .construct_index(DNA_MODES, alphabet::dna(), &project)
        .unwrap();
    verify_integrity(&seq_idx, &project, 16).unwrap();

    // flip one bit of the first constant-width word; the header of a
    // one-mode index is 60 bytes, and the word's most significant byte
    // (stored last, little-endian) holds the first composition indices
    let mut index_bytes = std::fs::read(project.index_path()).unwrap();
    index_bytes[67] ^= 0x80;
    std::fs::write(project.index_path(), &index_bytes).unwrap();

    let tampered = BlockEncIdxSeq::load(alphabet::dna(), &project).unwrap();
    let outcome = verify_integrity(&tampered, &project, 0);
    assert!(
        matches!(
            outcome,
            Err(Error::SymbolMismatch { .. })
                | Err(Error::RankMismatch { .. })
                | Err(Error::CorruptIndex(_))
        ),
        "tampered index must be flagged, got {outcome:?}"
    );
}

#[test]
fn shared_and_fresh_hints_agree() {
    let bwt = b"gattacagattacaggttaacaaggttccaagattacagattacagg";
    let (_dir, project) = project_with_bwt(bwt);
    let seq_idx = BlockEncConfig::new()
        .block_size(4)
        .cache_slots(2)
        .construct_index(DNA_MODES, alphabet::dna(), &project)
        .unwrap();

    let mut shared = seq_idx.new_hint().unwrap();
    for pos in 0..seq_idx.len() {
        let mut fresh = seq_idx.new_hint().unwrap();
        assert_eq!(
            seq_idx.get(pos, &mut shared).unwrap(),
            seq_idx.get(pos, &mut fresh).unwrap()
        );
        assert_eq!(
            seq_idx.rank(b't', pos, &mut shared).unwrap(),
            seq_idx.rank(b't', pos, &mut fresh).unwrap()
        );
    }

    // backwards scans must not confuse the hints either
    for pos in (0..seq_idx.len()).rev() {
        let mut fresh = seq_idx.new_hint().unwrap();
        assert_eq!(
            seq_idx.get(pos, &mut shared).unwrap(),
            seq_idx.get(pos, &mut fresh).unwrap()
        );
    }
}

#[test]
fn invalid_configurations_are_rejected() {
    let (_dir, project) = project_with_bwt(b"acgt");

    let zero_block_size = BlockEncConfig::new().block_size(0).construct_index(
        DNA_MODES,
        alphabet::dna(),
        &project,
    );
    assert!(matches!(zero_block_size, Err(Error::Config(_))));

    let direct_encoding = BlockEncConfig::new().block_size(2).construct_index(
        &[RangeStoreMode::DirectSymEncode],
        alphabet::dna(),
        &project,
    );
    assert!(matches!(direct_encoding, Err(Error::Config(_))));

    let wrong_mode_count = BlockEncConfig::new().block_size(2).construct_index(
        DNA_SEPARATOR_MODES,
        alphabet::dna(),
        &project,
    );
    assert!(matches!(wrong_mode_count, Err(Error::Config(_))));

    // a region-list range ahead of the block-encoded range breaks the code
    // correspondence between the two alphabets
    let separator_first =
        MultiRangeAlphabet::with_ranges(&[[SEPARATOR].as_slice(), b"acgt".as_slice()]);
    let bad_order = BlockEncConfig::new().block_size(2).construct_index(
        &[
            RangeStoreMode::RegionsList,
            RangeStoreMode::BlockCompositionInclude,
        ],
        separator_first,
        &project,
    );
    assert!(matches!(bad_order, Err(Error::Config(_))));

    let (_dir, empty_project) = project_with_bwt(b"");
    let empty = BlockEncConfig::new().block_size(2).construct_index(
        DNA_MODES,
        alphabet::dna(),
        &empty_project,
    );
    assert!(matches!(empty, Err(Error::Config(_))));
}

#[test]
fn missing_index_fails_to_load() {
    let dir = tempfile::tempdir().unwrap();
    let project = Project::new(dir.path().join("nothing-here"));
    assert!(BlockEncIdxSeq::load(alphabet::dna(), &project).is_err());
}

fn random_bwt(rng: &mut ChaCha8Rng, len: usize, separator_share: f64) -> Vec<u8> {
    (0..len)
        .map(|_| {
            if rng.random_bool(separator_share) {
                SEPARATOR
            } else {
                b"acgt"[rng.random_range(0..4)]
            }
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn correctness_random_sequences(
        len in 1usize..600,
        block_size in 1u32..=5,
        bucket_blocks in 1u32..=6,
        separator_share in 0.0f64..0.3,
        seed in any::<u64>(),
    ) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let bwt = random_bwt(&mut rng, len, separator_share);
        let (_dir, project) = project_with_bwt(&bwt);

        let seq_idx = BlockEncConfig::new()
            .block_size(block_size)
            .bucket_blocks(bucket_blocks)
            .construct_index(
                DNA_SEPARATOR_MODES,
                alphabet::dna_with_separator(),
                &project,
            )
            .unwrap();

        assert_matches_naive(
            &seq_idx,
            &bwt,
            &alphabet::dna_with_separator(),
            &[b'a', b'c', b'g', b't', SEPARATOR],
        );
        verify_integrity(&seq_idx, &project, 0).unwrap();

        let loaded = BlockEncIdxSeq::load(alphabet::dna_with_separator(), &project).unwrap();
        verify_integrity(&loaded, &project, 0).unwrap();
    }
}
