//! One-pass construction of the block encoded indexed sequence.
//!
//! The BWT stream is read in block-sized chunks. Every block updates the
//! running super-bucket counters, spills its special symbols into the region
//! list, and appends a composition index to the constant-width cache and a
//! permutation index to the variable-width cache. Whenever a super-bucket is
//! complete, both caches are flushed to their on-disk sections; the header is
//! written last.

use crate::Seqpos;
use crate::alphabet::MultiRangeAlphabet;
use crate::bitpack::{self, BIT_ELEM_BITS, BitElem, BitOffset};
use crate::composition::CompositionTable;
use crate::error::{Error, Result};
use crate::io_util;
use crate::locate::LocateTable;
use crate::project::Project;
use crate::seq_range_list::SeqRangeList;

use super::header::{self, Header};
use super::superblock::SuperBlockGeometry;
use super::{BlockEncConfig, BlockEncIdxSeq, RangeStoreMode};

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};

pub(super) fn check_modes(
    modes: &[RangeStoreMode],
    alphabet: &MultiRangeAlphabet,
) -> Result<()> {
    if modes.len() != alphabet.num_ranges() {
        return Err(Error::config(format!(
            "{} range modes given for an alphabet with {} ranges",
            modes.len(),
            alphabet.num_ranges()
        )));
    }
    if modes.contains(&RangeStoreMode::DirectSymEncode) {
        return Err(Error::config("direct symbol encoding is not supported"));
    }

    // decoded blocks are reverse-mapped through the full alphabet, which only
    // works while block-encoded codes coincide with full-alphabet codes
    let mut past_block_ranges = false;
    for mode in modes {
        match mode {
            RangeStoreMode::BlockCompositionInclude if past_block_ranges => {
                return Err(Error::config(
                    "block-encoded ranges must precede all other ranges",
                ));
            }
            RangeStoreMode::BlockCompositionInclude => {}
            _ => past_block_ranges = true,
        }
    }

    Ok(())
}

pub(super) fn construct(
    config: BlockEncConfig,
    modes: &[RangeStoreMode],
    alphabet: MultiRangeAlphabet,
    project: &Project,
) -> Result<BlockEncIdxSeq> {
    if config.block_size == 0 {
        return Err(Error::config("block size 0"));
    }
    check_modes(modes, &alphabet)?;

    let seq_len = project.sequence_length()?;
    if seq_len == 0 {
        return Err(Error::config("project BWT stream is empty"));
    }

    let block_size = config.block_size as usize;
    let bucket_blocks = config.bucket_blocks.unwrap_or(config.block_size);
    if bucket_blocks == 0 {
        return Err(Error::config("super-bucket of 0 blocks"));
    }
    let super_bucket_len = bucket_blocks as Seqpos * config.block_size as Seqpos;

    let block_map_alphabet =
        alphabet.secondary_mapping(&RangeStoreMode::BlockCompositionInclude, modes, 0);
    let block_enc_num_syms = block_map_alphabet.size();
    if block_enc_num_syms == 0 {
        return Err(Error::config("no alphabet range is block-encoded"));
    }
    let tables = CompositionTable::new(block_size, block_enc_num_syms)?;

    let locate = match config.locate_interval {
        Some(interval) => {
            let mut suffix_table = project.open_suffix_table(seq_len)?;
            Some(LocateTable::build(&mut suffix_table, seq_len, interval)?)
        }
        None => None,
    };

    let mut seq_idx = BlockEncIdxSeq {
        seq_len,
        block_size,
        super_bucket_len,
        block_map_alphabet,
        block_enc_num_syms,
        fallback: 0,
        modes: modes.to_vec(),
        tables,
        range_encs: SeqRangeList::with_capacity((seq_len / 100 + 1) as usize),
        cw_data_pos: header::header_length(modes.len(), locate.is_some()),
        var_data_pos: 0,
        locate,
        index_path: project.index_path(),
        cache_slots: config.cache_slots,
        alphabet,
    };
    let geometry = {
        let cw_len = seq_idx.num_super_buckets() * seq_idx.geometry().record_size;
        seq_idx.var_data_pos = seq_idx.cw_data_pos + cw_len;
        seq_idx.geometry()
    };

    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(&seq_idx.index_path)?;
    let mut bwt = project.open_bwt()?;

    let mut state = AppendState::new(&geometry, &seq_idx.tables);
    let mut bucket_counter = vec![0 as Seqpos; seq_idx.alphabet.size()];
    let mut block = vec![0u8; block_size];
    let mut scratch = seq_idx.tables.new_scratch();

    let bits_cw = seq_idx.tables.composition_idx_bits;
    let num_blocks = (seq_len as u64).div_ceil(block_size as u64);

    for block_num in 0..num_blocks {
        let block_start = block_num * block_size as u64;
        let symbols_in_block = (seq_len as u64 - block_start).min(block_size as u64) as usize;

        seq_idx
            .alphabet
            .read_and_transform(&mut bwt, &mut block[..symbols_in_block])?;
        if block[..symbols_in_block]
            .iter()
            .any(|&code| code as usize >= seq_idx.alphabet.size())
        {
            return Err(Error::config(
                "BWT stream contains a byte without alphabet mapping",
            ));
        }
        // the trailing block is padded with the first alphabet symbol
        block[symbols_in_block..].fill(0);

        for &code in block.iter() {
            bucket_counter[code as usize] += 1;
        }

        for (offset, &code) in block[..symbols_in_block].iter().enumerate() {
            if seq_idx.alphabet.symbol_is_in_selected_ranges(
                code,
                &RangeStoreMode::RegionsList,
                modes,
            ) == Some(true)
            {
                seq_idx
                    .range_encs
                    .add_position(block_start as Seqpos + offset as Seqpos, code);
            }
        }

        seq_idx.block_map_alphabet.transform(&mut block);
        let (comp_idx, perm_idx, perm_idx_bits) =
            seq_idx.tables.block_to_pair(&block, &mut scratch);
        state.append(comp_idx as u64, bits_cw, perm_idx, perm_idx_bits);

        if (block_num + 1) % geometry.bucket_blocks == 0 {
            state.flush_bucket(
                &mut file,
                &geometry,
                &bucket_counter[..seq_idx.block_enc_num_syms],
            )?;
        }
    }
    if num_blocks % geometry.bucket_blocks != 0 {
        state.flush_bucket(
            &mut file,
            &geometry,
            &bucket_counter[..seq_idx.block_enc_num_syms],
        )?;
    }

    let range_enc_pos = state.finalize(&mut file, &geometry)?;

    // terminator, so every search for a next range succeeds
    seq_idx
        .range_encs
        .append_new_range(seq_len + block_size as Seqpos, 1, 0);
    seq_idx.range_encs.compact();

    file.seek(SeekFrom::Start(range_enc_pos))?;
    let mut writer = BufWriter::new(&mut file);
    seq_idx.range_encs.save_to_stream(&mut writer)?;
    writer.flush()?;
    drop(writer);

    let locate_pos = match &seq_idx.locate {
        Some(table) => {
            let pos = file.stream_position()?;
            let mut writer = BufWriter::new(&mut file);
            table.write_to(&mut writer)?;
            writer.flush()?;
            Some(pos)
        }
        None => None,
    };

    let header = Header {
        block_size: config.block_size,
        bucket_blocks,
        var_data_pos: seq_idx.var_data_pos,
        range_enc_pos,
        modes: modes.iter().map(|mode| mode.to_u32()).collect(),
        locate_pos,
    };
    debug_assert_eq!(header.length(), seq_idx.cw_data_pos);
    file.seek(SeekFrom::Start(0))?;
    header.write_to(&mut file)?;

    tracing::debug!(
        seq_len,
        block_size,
        num_blocks,
        num_special_ranges = seq_idx.range_encs.num_ranges(),
        "constructed block encoded indexed sequence"
    );

    Ok(seq_idx)
}

/// Write-side buffers: composition indices for the current super-bucket and
/// the pending tail of the variable-width stream.
struct AppendState {
    comp_cache: Vec<BitElem>,
    perm_cache: Vec<BitElem>,
    /// bits appended to the current bucket's cw record
    cw_mem_pos: BitOffset,
    /// bits held in `perm_cache`, including carried-over ones
    var_mem_pos: BitOffset,
    /// total var bits appended over all buckets
    var_disk_offset: BitOffset,
    /// bits at the front of `perm_cache` that earlier flushes already
    /// accounted for
    var_mem_old_bits: BitOffset,
    cw_disk_offset: u64,
}

impl AppendState {
    fn new(geometry: &SuperBlockGeometry, tables: &CompositionTable) -> Self {
        let comp_bits = geometry.bucket_blocks * tables.composition_idx_bits as u64;
        let perm_bits = geometry.bucket_blocks * tables.max_perm_idx_bits as u64;

        Self {
            comp_cache: vec![0; bitpack::bit_elems_for(comp_bits).max(1)],
            perm_cache: vec![0; bitpack::bit_elems_for(perm_bits + BIT_ELEM_BITS - 1).max(1)],
            cw_mem_pos: 0,
            var_mem_pos: 0,
            var_disk_offset: 0,
            var_mem_old_bits: 0,
            cw_disk_offset: 0,
        }
    }

    fn append(&mut self, comp_idx: u64, comp_idx_bits: u32, perm_idx: u64, perm_idx_bits: u32) {
        let comp_words_needed = bitpack::bit_elems_for(self.cw_mem_pos + comp_idx_bits as u64);
        if comp_words_needed > self.comp_cache.len() {
            self.comp_cache.resize(comp_words_needed, 0);
        }
        bitpack::store_uint(&mut self.comp_cache, self.cw_mem_pos, comp_idx_bits, comp_idx);
        self.cw_mem_pos += comp_idx_bits as u64;

        let perm_words_needed = bitpack::bit_elems_for(self.var_mem_pos + perm_idx_bits as u64);
        if perm_words_needed > self.perm_cache.len() {
            self.perm_cache.resize(perm_words_needed, 0);
        }
        bitpack::store_uint(&mut self.perm_cache, self.var_mem_pos, perm_idx_bits, perm_idx);
        self.var_mem_pos += perm_idx_bits as u64;
    }

    /// Writes the finished bucket's cw record (cw bits, counts, var stream
    /// offset) and the full words of the variable-width cache, carrying
    /// unwritten trailing bits into the next bucket.
    fn flush_bucket(
        &mut self,
        file: &mut File,
        geometry: &SuperBlockGeometry,
        counts: &[Seqpos],
    ) -> Result<()> {
        file.seek(SeekFrom::Start(geometry.cw_data_pos + self.cw_disk_offset))?;

        let cw_words = bitpack::bit_elems_for(self.cw_mem_pos);
        let mut writer = BufWriter::new(&mut *file);
        for &word in &self.comp_cache[..cw_words] {
            io_util::write_u64(&mut writer, word)?;
        }
        for &count in counts {
            io_util::write_seqpos(&mut writer, count)?;
        }
        let next_var_disk_offset =
            self.var_disk_offset + self.var_mem_pos - self.var_mem_old_bits;
        io_util::write_u64(&mut writer, next_var_disk_offset)?;
        writer.flush()?;
        drop(writer);

        file.seek(SeekFrom::Start(
            geometry.var_data_pos + self.var_disk_offset / BIT_ELEM_BITS * 8,
        ))?;
        let full_words = (self.var_mem_pos / BIT_ELEM_BITS) as usize;
        let mut writer = BufWriter::new(&mut *file);
        for &word in &self.perm_cache[..full_words] {
            io_util::write_u64(&mut writer, word)?;
        }
        writer.flush()?;
        drop(writer);

        // move the word with unwritten bits to the front
        if self.var_mem_pos % BIT_ELEM_BITS != 0 {
            self.perm_cache[0] = self.perm_cache[full_words];
        }

        self.cw_disk_offset += geometry.record_size;
        self.cw_mem_pos = 0;
        self.var_disk_offset += self.var_mem_pos - self.var_mem_old_bits;
        self.var_mem_pos %= BIT_ELEM_BITS;
        self.var_mem_old_bits = self.var_mem_pos;

        Ok(())
    }

    /// Writes the trailing partial word of the variable-width stream and
    /// returns the file position where the region encodings begin.
    fn finalize(&mut self, file: &mut File, geometry: &SuperBlockGeometry) -> Result<u64> {
        debug_assert!(self.var_mem_old_bits < BIT_ELEM_BITS);
        debug_assert_eq!(self.var_mem_old_bits, self.var_mem_pos);

        if self.var_mem_old_bits > 0 {
            file.seek(SeekFrom::Start(
                geometry.var_data_pos + self.var_disk_offset / BIT_ELEM_BITS * 8,
            ))?;
            io_util::write_u64(file, self.perm_cache[0])?;
        }

        let range_enc_pos = geometry.var_data_pos
            + self.var_disk_offset / BIT_ELEM_BITS * 8
            + if self.var_disk_offset % BIT_ELEM_BITS != 0 {
                8
            } else {
                0
            };

        Ok(range_enc_pos)
    }
}
