//! The block-composition encoded indexed sequence.
//!
//! The sequence is split into fixed-size blocks; every block is stored as a
//! pair of table indices (its composition, and the permutation realizing the
//! block within that composition). Super-buckets group blocks and carry
//! cumulative symbol counts, so `rank` touches one super-bucket, walks at
//! most `superBucketLen / blockSize` composition indices and decodes at most
//! one block. Symbols outside the block-encoded sub-alphabet live in a
//! [`SeqRangeList`] on the side.

mod construction;
mod header;
mod superblock;

pub use superblock::EisHint;

use crate::Seqpos;
use crate::alphabet::MultiRangeAlphabet;
use crate::bitpack::{self, BIT_ELEM_BITS, BitOffset};
use crate::composition::CompositionTable;
use crate::error::{Error, Result};
use crate::locate::LocateTable;
use crate::project::Project;
use crate::seq_range_list::SeqRangeList;

use superblock::SuperBlockGeometry;

use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::PathBuf;

/// How the symbols of one alphabet range are represented in the index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RangeStoreMode {
    /// Every symbol gets its own fixed-width code next to the block data.
    /// Declared for completeness; construction rejects it.
    DirectSymEncode,
    /// The range takes part in the block composition encoding.
    BlockCompositionInclude,
    /// Symbols are stored as position runs in the sequence-range list.
    RegionsList,
}

impl RangeStoreMode {
    fn to_u32(self) -> u32 {
        match self {
            RangeStoreMode::DirectSymEncode => 0,
            RangeStoreMode::BlockCompositionInclude => 1,
            RangeStoreMode::RegionsList => 2,
        }
    }

    fn from_u32(value: u32) -> Result<Self> {
        match value {
            0 => Ok(RangeStoreMode::DirectSymEncode),
            1 => Ok(RangeStoreMode::BlockCompositionInclude),
            2 => Ok(RangeStoreMode::RegionsList),
            other => Err(Error::config(format!("invalid encoding request: {other}"))),
        }
    }
}

/// A builder-like API to configure block encoded indexed sequences.
#[derive(Clone, Copy)]
pub struct BlockEncConfig {
    pub(crate) block_size: u32,
    pub(crate) bucket_blocks: Option<u32>,
    pub(crate) locate_interval: Option<u32>,
    pub(crate) cache_slots: usize,
}

impl BlockEncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Symbols per block. Table sizes grow steeply with this value, small
    /// alphabets support larger blocks.
    pub fn block_size(self, block_size: u32) -> Self {
        Self { block_size, ..self }
    }

    /// Blocks per super-bucket. Defaults to `block_size`, making a
    /// super-bucket `block_size²` symbols long.
    pub fn bucket_blocks(self, bucket_blocks: u32) -> Self {
        Self {
            bucket_blocks: Some(bucket_blocks),
            ..self
        }
    }

    /// Additionally store locate information for every BWT row whose text
    /// position is a multiple of `sample_interval`.
    pub fn locate_interval(self, sample_interval: u32) -> Self {
        Self {
            locate_interval: Some(sample_interval),
            ..self
        }
    }

    /// Super-block cache slots per hint.
    pub fn cache_slots(self, cache_slots: usize) -> Self {
        assert!(cache_slots > 0);
        Self {
            cache_slots,
            ..self
        }
    }

    /// Builds the index over the project's BWT stream and writes it to the
    /// project's `.bdx` file.
    pub fn construct_index(
        self,
        modes: &[RangeStoreMode],
        alphabet: MultiRangeAlphabet,
        project: &Project,
    ) -> Result<BlockEncIdxSeq> {
        construction::construct(self, modes, alphabet, project)
    }
}

impl Default for BlockEncConfig {
    fn default() -> Self {
        Self {
            block_size: 8,
            bucket_blocks: None,
            locate_interval: None,
            cache_slots: 32,
        }
    }
}

/// A sequence with rank support, stored block-compressed in an external
/// index file.
///
/// All queries go through a caller-owned [`EisHint`]; the sequence itself is
/// read-only after construction and can be shared.
pub struct BlockEncIdxSeq {
    seq_len: Seqpos,
    block_size: usize,
    super_bucket_len: Seqpos,
    alphabet: MultiRangeAlphabet,
    block_map_alphabet: MultiRangeAlphabet,
    block_enc_num_syms: usize,
    fallback: u8,
    modes: Vec<RangeStoreMode>,
    tables: CompositionTable,
    range_encs: SeqRangeList,
    locate: Option<LocateTable>,
    index_path: PathBuf,
    cw_data_pos: u64,
    var_data_pos: u64,
    cache_slots: usize,
}

impl BlockEncIdxSeq {
    /// Loads a previously constructed index from the project's `.bdx` file.
    ///
    /// The alphabet is not part of the index file and must be the one the
    /// index was built with; the stored range modes are checked against it.
    pub fn load(alphabet: MultiRangeAlphabet, project: &Project) -> Result<Self> {
        let index_path = project.index_path();
        let mut reader = BufReader::new(File::open(&index_path)?);
        let header = header::Header::read_from(&mut reader)?;

        let modes = header
            .modes
            .iter()
            .map(|&mode| RangeStoreMode::from_u32(mode))
            .collect::<Result<Vec<_>>>()?;
        if modes.len() != alphabet.num_ranges() {
            return Err(Error::corrupt(format!(
                "index stores {} range modes, alphabet has {} ranges",
                modes.len(),
                alphabet.num_ranges()
            )));
        }
        construction::check_modes(&modes, &alphabet)?;

        let seq_len = project.sequence_length()?;
        let block_size = header.block_size as usize;
        let super_bucket_len = header.bucket_blocks as Seqpos * header.block_size as Seqpos;

        let block_map_alphabet =
            alphabet.secondary_mapping(&RangeStoreMode::BlockCompositionInclude, &modes, 0);
        let block_enc_num_syms = block_map_alphabet.size();
        let tables = CompositionTable::new(block_size, block_enc_num_syms)?;

        let seq_idx = Self {
            seq_len,
            block_size,
            super_bucket_len,
            alphabet,
            block_map_alphabet,
            block_enc_num_syms,
            fallback: 0,
            modes,
            tables,
            range_encs: SeqRangeList::default(),
            locate: None,
            index_path,
            cw_data_pos: header.length(),
            var_data_pos: header.var_data_pos,
            cache_slots: BlockEncConfig::default().cache_slots,
        };

        let expected_var_pos = seq_idx.cw_data_pos
            + seq_idx.num_super_buckets() * seq_idx.geometry().record_size;
        if header.var_data_pos != expected_var_pos {
            return Err(Error::corrupt(format!(
                "var stream at {} disagrees with the computed super-bucket layout ({})",
                header.var_data_pos, expected_var_pos
            )));
        }

        reader.seek(SeekFrom::Start(header.range_enc_pos))?;
        let range_encs = SeqRangeList::read_from_stream(&mut reader)?;

        let locate = match header.locate_pos {
            Some(locate_pos) => {
                reader.seek(SeekFrom::Start(locate_pos))?;
                Some(LocateTable::read_from(&mut reader)?)
            }
            None => None,
        };

        tracing::debug!(
            seq_len,
            block_size,
            num_ranges = range_encs.num_ranges(),
            has_locate = locate.is_some(),
            "loaded block encoded indexed sequence"
        );

        Ok(Self {
            range_encs,
            locate,
            ..seq_idx
        })
    }

    /// Total symbol count of the indexed sequence.
    pub fn len(&self) -> Seqpos {
        self.seq_len
    }

    pub fn is_empty(&self) -> bool {
        self.seq_len == 0
    }

    pub fn alphabet(&self) -> &MultiRangeAlphabet {
        &self.alphabet
    }

    pub fn modes(&self) -> &[RangeStoreMode] {
        &self.modes
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Creates a fresh query hint with its own read handle on the index
    /// file.
    pub fn new_hint(&self) -> Result<EisHint> {
        EisHint::new(self)
    }

    /// The original input symbol at `pos`, with region-list symbols showing
    /// through.
    pub fn get(&self, pos: Seqpos, hint: &mut EisHint) -> Result<u8> {
        assert!(pos < self.seq_len);

        self.load_block(pos / self.block_size as Seqpos, true, hint)?;
        let code = hint.block_buf[pos as usize % self.block_size];
        Ok(self.alphabet.rev_map(code))
    }

    /// Like [`get`](Self::get), but without consulting the region list:
    /// positions covered by a region read as the fallback symbol.
    pub fn get_block_encoded(&self, pos: Seqpos, hint: &mut EisHint) -> Result<u8> {
        assert!(pos < self.seq_len);

        self.load_block(pos / self.block_size as Seqpos, false, hint)?;
        let code = hint.block_buf[pos as usize % self.block_size];
        Ok(self.alphabet.rev_map(code))
    }

    /// Number of occurrences of the input symbol `sym` in positions
    /// `0..=pos`. An unmapped symbol occurs 0 times.
    pub fn rank(&self, sym: u8, pos: Seqpos, hint: &mut EisHint) -> Result<Seqpos> {
        match self.alphabet.map(sym) {
            Some(code) => self.sym_transformed_rank(code, pos, hint),
            None => Ok(0),
        }
    }

    /// Number of occurrences of the internal code `code` in positions
    /// `0..=pos`.
    pub fn sym_transformed_rank(
        &self,
        code: u8,
        pos: Seqpos,
        hint: &mut EisHint,
    ) -> Result<Seqpos> {
        assert!(pos < self.seq_len);
        self.rank_prefix(code, pos + 1, hint)
    }

    /// Number of occurrences of the internal code `code` in positions
    /// `0..end`, for `end <= len()`.
    pub(crate) fn rank_prefix(&self, code: u8, end: Seqpos, hint: &mut EisHint) -> Result<Seqpos> {
        assert!(end <= self.seq_len);
        assert!((code as usize) < self.alphabet.size());

        if end == 0 {
            return Ok(0);
        }

        let in_block_ranges = self
            .alphabet
            .symbol_is_in_selected_ranges(
                code,
                &RangeStoreMode::BlockCompositionInclude,
                &self.modes,
            )
            .expect("code is within the alphabet");

        if !in_block_ranges {
            return Ok(self
                .range_encs
                .symbol_count_in_region(0, end - 1, code, &mut hint.range_hint));
        }

        let block_sym = self.block_map_alphabet.map(code).unwrap();
        let geometry = self.geometry();
        let bits_cw = self.tables.composition_idx_bits;

        let bucket = end / self.super_bucket_len;
        let sblock = hint.cache.fetch(&geometry, &mut hint.reader, bucket)?;

        let mut count = sblock.prev_bucket[block_sym as usize];
        let mut cw_offset: BitOffset = 0;
        let mut var_offset: BitOffset = sblock.var_mem_base as BitOffset;

        let block_num = end / self.block_size as Seqpos;
        let rel_blocks = block_num as u64 % geometry.bucket_blocks;
        for _ in 0..rel_blocks {
            let comp_idx = self.read_comp_idx(&sblock.cw, cw_offset)?;
            count += self.tables.sym_count_from_composition(comp_idx, block_sym) as Seqpos;
            var_offset += self.tables.perm_idx_bits(comp_idx) as BitOffset;
            cw_offset += bits_cw as BitOffset;
        }

        let in_block = (end % self.block_size as Seqpos) as usize;
        if in_block > 0 {
            let comp_idx = self.read_comp_idx(&sblock.cw, cw_offset)?;
            if self.tables.sym_count_from_composition(comp_idx, block_sym) > 0 {
                let perm_idx = self.read_perm_idx(&sblock.var, var_offset, comp_idx)?;
                hint.block_buf.resize(self.block_size, 0);
                self.tables
                    .block_from_pair(comp_idx, perm_idx, &mut hint.block_buf);

                count += hint.block_buf[..in_block]
                    .iter()
                    .filter(|&&sym| sym == block_sym)
                    .count() as Seqpos;
            }
        }

        if block_sym == self.fallback {
            // specials were stored as the fallback inside the blocks of this
            // bucket, the region list knows how many there really were
            let bucket_base = bucket * self.super_bucket_len;
            count -= self.range_encs.all_symbols_count_in_region(
                bucket_base,
                end - 1,
                &mut hint.range_hint,
            );
        }

        Ok(count)
    }

    /// Diagnostic access to the composition table: the
    /// `(composition, permutation)` index pair of a block of sub-alphabet
    /// symbols.
    pub fn block_to_index_pair(&self, block: &[u8]) -> (usize, u64) {
        let mut scratch = self.tables.new_scratch();
        let (comp_idx, perm_idx, _) = self.tables.block_to_pair(block, &mut scratch);
        (comp_idx, perm_idx)
    }

    pub(crate) fn has_locate_information(&self) -> bool {
        self.locate.is_some()
    }

    pub(crate) fn locate_table(&self) -> Option<&LocateTable> {
        self.locate.as_ref()
    }

    fn read_comp_idx(&self, cw: &[u64], offset: BitOffset) -> Result<usize> {
        let comp_idx =
            bitpack::get_uint(cw, offset, self.tables.composition_idx_bits) as usize;
        if comp_idx >= self.tables.num_compositions {
            return Err(Error::corrupt("composition index outside the table"));
        }
        Ok(comp_idx)
    }

    fn read_perm_idx(&self, var: &[u64], offset: BitOffset, comp_idx: usize) -> Result<u64> {
        let perm_idx = bitpack::get_uint(var, offset, self.tables.perm_idx_bits(comp_idx));
        if perm_idx >= self.tables.permutations[comp_idx].num_permutations {
            return Err(Error::corrupt("permutation index outside the table"));
        }
        Ok(perm_idx)
    }

    /// Decodes the block `block_num` into the hint's block buffer,
    /// overlaying region-list symbols when `query_ranges` is set.
    fn load_block(&self, block_num: Seqpos, query_ranges: bool, hint: &mut EisHint) -> Result<()> {
        let geometry = self.geometry();
        let bits_cw = self.tables.composition_idx_bits;
        let block_size = self.block_size;

        let bucket = block_num / geometry.bucket_blocks as Seqpos;
        let sblock = hint.cache.fetch(&geometry, &mut hint.reader, bucket)?;

        let mut cw_offset: BitOffset = 0;
        let mut var_offset: BitOffset = sblock.var_mem_base as BitOffset;

        let rel_blocks = block_num as u64 % geometry.bucket_blocks;
        for _ in 0..rel_blocks {
            let comp_idx = self.read_comp_idx(&sblock.cw, cw_offset)?;
            var_offset += self.tables.perm_idx_bits(comp_idx) as BitOffset;
            cw_offset += bits_cw as BitOffset;
        }

        let comp_idx = self.read_comp_idx(&sblock.cw, cw_offset)?;
        let perm_idx = self.read_perm_idx(&sblock.var, var_offset, comp_idx)?;

        hint.block_buf.resize(block_size, 0);
        self.tables
            .block_from_pair(comp_idx, perm_idx, &mut hint.block_buf);

        if query_ranges {
            let block_start = block_num * block_size as Seqpos;
            if let Some(first) = self
                .range_encs
                .find_position_next(block_start, &mut hint.range_hint)
            {
                for index in first..self.range_encs.num_ranges() {
                    let range = self.range_encs.range(index);
                    if range.start_pos >= block_start + block_size as Seqpos {
                        break;
                    }
                    let from = range.start_pos.max(block_start);
                    let to = range.end().min(block_start + block_size as Seqpos);
                    for pos in from..to {
                        hint.block_buf[(pos - block_start) as usize] = range.sym;
                    }
                }
            }
        }

        Ok(())
    }

    pub(crate) fn num_super_buckets(&self) -> u64 {
        (self.seq_len as u64).div_ceil(self.super_bucket_len as u64)
    }

    pub(crate) fn geometry(&self) -> SuperBlockGeometry {
        let bucket_blocks = self.super_bucket_len as u64 / self.block_size as u64;
        let cw_words = bitpack::bit_elems_for(
            self.tables.composition_idx_bits as u64 * bucket_blocks,
        );
        let var_words = bitpack::bit_elems_for(
            self.tables.max_perm_idx_bits as u64 * bucket_blocks + BIT_ELEM_BITS - 1,
        );
        let record_size = cw_words as u64 * 8
            + self.block_enc_num_syms as u64 * crate::io_util::SEQPOS_BYTES as u64
            + 8;

        SuperBlockGeometry {
            bucket_blocks,
            num_count_entries: self.block_enc_num_syms,
            cw_words,
            var_words,
            record_size,
            cw_data_pos: self.cw_data_pos,
            var_data_pos: self.var_data_pos,
        }
    }
}
