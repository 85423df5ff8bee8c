//! Decoded super-blocks, the on-disk fetch protocol and the direct-mapped
//! cache that keeps repeated queries off the disk.

use crate::Seqpos;
use crate::bitpack::{BIT_ELEM_BITS, BitElem};
use crate::error::Result;
use crate::io_util::{self, SEQPOS_BYTES};

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use super::BlockEncIdxSeq;

/// Everything needed to locate and size super-bucket records on disk.
#[derive(Clone, Copy, Debug)]
pub(crate) struct SuperBlockGeometry {
    /// blocks per super-bucket
    pub(crate) bucket_blocks: u64,
    /// symbols in the block-encoded sub-alphabet
    pub(crate) num_count_entries: usize,
    pub(crate) cw_words: usize,
    pub(crate) var_words: usize,
    pub(crate) record_size: u64,
    pub(crate) cw_data_pos: u64,
    pub(crate) var_data_pos: u64,
}

/// One decoded super-bucket: the cumulative counts preceding it, its
/// constant-width bits and a window of the variable-width stream starting at
/// bit `var_mem_base` of the first word.
pub(crate) struct SuperBlock {
    pub(crate) prev_bucket: Vec<Seqpos>,
    pub(crate) cw: Vec<BitElem>,
    pub(crate) var: Vec<BitElem>,
    pub(crate) var_mem_base: u32,
}

impl SuperBlock {
    fn new_empty(geometry: &SuperBlockGeometry) -> Self {
        Self {
            prev_bucket: vec![0; geometry.num_count_entries],
            cw: vec![0; geometry.cw_words],
            var: vec![0; geometry.var_words],
            var_mem_base: 0,
        }
    }
}

struct CacheSlot {
    bucket: Option<Seqpos>,
    block: SuperBlock,
}

/// Direct-mapped cache over `bucket % num_slots`.
pub(crate) struct SuperBlockCache {
    slots: Vec<CacheSlot>,
}

impl SuperBlockCache {
    pub(crate) fn new(geometry: &SuperBlockGeometry, num_slots: usize) -> Self {
        assert!(num_slots > 0);

        let slots = (0..num_slots)
            .map(|_| CacheSlot {
                bucket: None,
                block: SuperBlock::new_empty(geometry),
            })
            .collect();

        Self { slots }
    }

    pub(crate) fn fetch(
        &mut self,
        geometry: &SuperBlockGeometry,
        reader: &mut File,
        bucket: Seqpos,
    ) -> Result<&SuperBlock> {
        let slot_index = (bucket as u64 % self.slots.len() as u64) as usize;
        let slot = &mut self.slots[slot_index];

        if slot.bucket != Some(bucket) {
            // invalidate first so a failed read cannot leave a lying slot
            slot.bucket = None;
            read_super_block(geometry, reader, bucket, &mut slot.block)?;
            slot.bucket = Some(bucket);
        }

        Ok(&slot.block)
    }
}

/// Reads the super-bucket `bucket` into `out`.
///
/// The counts and var-stream offset preceding bucket `b` live at the tail of
/// record `b - 1`; bucket 0 starts with all-zero counts at var offset 0. The
/// cw and var reads tolerate running past their payload section (reachable
/// for the one-past-the-end bucket that a rank query at the exact end of the
/// sequence touches); the surplus bits are never decoded.
fn read_super_block(
    geometry: &SuperBlockGeometry,
    reader: &mut File,
    bucket: Seqpos,
    out: &mut SuperBlock,
) -> Result<()> {
    let var_idx_offset;

    if bucket == 0 {
        out.prev_bucket.fill(0);
        var_idx_offset = 0;
        reader.seek(SeekFrom::Start(geometry.cw_data_pos))?;
    } else {
        let record_tail = geometry.num_count_entries as u64 * SEQPOS_BYTES as u64 + 8;
        let prev_tail_pos =
            geometry.cw_data_pos + bucket as u64 * geometry.record_size - record_tail;
        reader.seek(SeekFrom::Start(prev_tail_pos))?;

        read_seqpos_words(reader, &mut out.prev_bucket)?;
        var_idx_offset = io_util::read_u64(reader)?;
    }

    read_bit_words(reader, &mut out.cw)?;

    reader.seek(SeekFrom::Start(
        geometry.var_data_pos + var_idx_offset / BIT_ELEM_BITS * 8,
    ))?;
    out.var_mem_base = (var_idx_offset % BIT_ELEM_BITS) as u32;
    read_bit_words(reader, &mut out.var)?;

    Ok(())
}

fn read_bit_words(reader: &mut impl Read, words: &mut [BitElem]) -> Result<()> {
    let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut *words);
    io_util::read_allowing_short(reader, bytes)?;
    for word in words {
        *word = BitElem::from_le(*word);
    }
    Ok(())
}

fn read_seqpos_words(reader: &mut impl Read, values: &mut [Seqpos]) -> Result<()> {
    let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut *values);
    reader.read_exact(bytes)?;
    for value in values {
        *value = Seqpos::from_le(*value);
    }
    Ok(())
}

/// A caller-owned bundle of per-query state: the super-block cache, the
/// region-list search hint, a scratch block buffer and a private read handle
/// on the index file.
///
/// Hints never mutate the sequence index they were created from; concurrent
/// queries over the same index need one hint each, which also gives every
/// thread its own file handle.
pub struct EisHint {
    pub(crate) reader: File,
    pub(crate) cache: SuperBlockCache,
    pub(crate) range_hint: usize,
    pub(crate) block_buf: Vec<u8>,
}

impl EisHint {
    pub(crate) fn new(seq_idx: &BlockEncIdxSeq) -> Result<Self> {
        let geometry = seq_idx.geometry();

        Ok(Self {
            reader: File::open(&seq_idx.index_path)?,
            cache: SuperBlockCache::new(&geometry, seq_idx.cache_slots),
            range_hint: seq_idx.range_encs.new_search_hint(),
            block_buf: vec![0; seq_idx.block_size],
        })
    }
}
