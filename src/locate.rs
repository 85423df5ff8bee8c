//! Sampled locate information: which BWT rows correspond to sampled text
//! positions, and what those positions are.
//!
//! Rows are marked in a bitmap with block-accumulated rank support; the
//! original-text positions of marked rows are bit-packed at `⌈log2 L⌉` bits
//! each, in row order, so the bitmap rank of a marked row is its index into
//! the packed positions.

use crate::Seqpos;
use crate::bitpack::{self, BIT_ELEM_BITS, BitElem, BitOffset};
use crate::error::{Error, Result};
use crate::io_util;
use crate::project::SuffixTableReader;

use std::io::{Read, Write};

const RANK_BLOCK_WORDS: usize = 8;

pub(crate) struct LocateTable {
    sample_interval: u32,
    bits_per_position: u32,
    num_sampled: u64,
    bitmap: Vec<BitElem>,
    /// cumulative set-bit count before every `RANK_BLOCK_WORDS` words
    rank_blocks: Vec<u64>,
    packed_positions: Vec<BitElem>,
}

impl LocateTable {
    /// Streams the suffix table once and records every row whose text
    /// position is a multiple of `sample_interval`.
    pub(crate) fn build(
        suffix_table: &mut SuffixTableReader,
        seq_len: Seqpos,
        sample_interval: u32,
    ) -> Result<Self> {
        assert!(sample_interval > 0);

        let bits_per_position = bitpack::bits_for_value(seq_len as u64 - 1).max(1);
        let mut bitmap = vec![0; bitpack::bit_elems_for(seq_len as u64)];
        let mut sampled_positions = Vec::new();

        for row in 0..seq_len as u64 {
            let position = suffix_table.next_position()?;
            if position % sample_interval as Seqpos == 0 {
                bitpack::set_bit(&mut bitmap, row);
                sampled_positions.push(position);
            }
        }

        let mut packed_positions = vec![
            0;
            bitpack::bit_elems_for(
                sampled_positions.len() as u64 * bits_per_position as u64
            )
        ];
        bitpack::store_uniform_uint_array(
            &mut packed_positions,
            0,
            bits_per_position,
            &sampled_positions,
        );

        tracing::debug!(
            sample_interval,
            num_sampled = sampled_positions.len(),
            "built locate table"
        );

        Ok(Self {
            sample_interval,
            bits_per_position,
            num_sampled: sampled_positions.len() as u64,
            rank_blocks: build_rank_blocks(&bitmap),
            bitmap,
            packed_positions,
        })
    }

    pub(crate) fn sample_interval(&self) -> u32 {
        self.sample_interval
    }

    pub(crate) fn is_sampled(&self, row: Seqpos) -> bool {
        bitpack::get_bit(&self.bitmap, row as BitOffset)
    }

    /// The text position stored for a sampled row, `None` for unsampled
    /// rows.
    pub(crate) fn original_position(&self, row: Seqpos) -> Option<Seqpos> {
        if !self.is_sampled(row) {
            return None;
        }

        let index = self.rank1(row as u64);
        let value = bitpack::get_uint(
            &self.packed_positions,
            index * self.bits_per_position as u64,
            self.bits_per_position,
        );
        Some(value as Seqpos)
    }

    /// Set bits in bitmap rows `[0, row)`.
    fn rank1(&self, row: u64) -> u64 {
        let word_index = (row / BIT_ELEM_BITS) as usize;
        let mut count = self.rank_blocks[word_index / RANK_BLOCK_WORDS];

        for word in &self.bitmap[word_index / RANK_BLOCK_WORDS * RANK_BLOCK_WORDS..word_index] {
            count += word.count_ones() as u64;
        }

        let partial_bits = (row % BIT_ELEM_BITS) as u32;
        if partial_bits > 0 {
            // bits are MSB-first, the first `partial_bits` are the top ones
            count += (self.bitmap[word_index] >> (u64::BITS - partial_bits)).count_ones() as u64;
        }

        count
    }

    pub(crate) fn write_to(&self, writer: &mut impl Write) -> Result<()> {
        io_util::write_u32(writer, self.sample_interval)?;
        io_util::write_u32(writer, self.bits_per_position)?;
        io_util::write_u64(writer, self.num_sampled)?;
        io_util::write_u64(writer, self.bitmap.len() as u64)?;
        for &word in &self.bitmap {
            io_util::write_u64(writer, word)?;
        }
        for &word in &self.packed_positions {
            io_util::write_u64(writer, word)?;
        }
        Ok(())
    }

    pub(crate) fn read_from(reader: &mut impl Read) -> Result<Self> {
        let sample_interval = io_util::read_u32(reader)?;
        if sample_interval == 0 {
            return Err(Error::corrupt("locate table with sample interval 0"));
        }
        let bits_per_position = io_util::read_u32(reader)?;
        let num_sampled = io_util::read_u64(reader)?;
        let num_bitmap_words = io_util::read_u64(reader)? as usize;

        let mut bitmap = vec![0; num_bitmap_words];
        read_words(reader, &mut bitmap)?;

        let mut packed_positions =
            vec![0; bitpack::bit_elems_for(num_sampled * bits_per_position as u64)];
        read_words(reader, &mut packed_positions)?;

        Ok(Self {
            sample_interval,
            bits_per_position,
            num_sampled,
            rank_blocks: build_rank_blocks(&bitmap),
            bitmap,
            packed_positions,
        })
    }
}

fn build_rank_blocks(bitmap: &[BitElem]) -> Vec<u64> {
    let mut rank_blocks = Vec::with_capacity(bitmap.len() / RANK_BLOCK_WORDS + 1);
    let mut running = 0u64;

    for (index, word) in bitmap.iter().enumerate() {
        if index % RANK_BLOCK_WORDS == 0 {
            rank_blocks.push(running);
        }
        running += word.count_ones() as u64;
    }
    if rank_blocks.is_empty() {
        rank_blocks.push(0);
    }

    rank_blocks
}

fn read_words(reader: &mut impl Read, words: &mut [BitElem]) -> Result<()> {
    let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut *words);
    reader.read_exact(bytes)?;
    for word in words {
        *word = BitElem::from_le(*word);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::{Project, write_suffix_table};

    fn table_for(suffix_table: &[Seqpos], interval: u32) -> LocateTable {
        let dir = tempfile::tempdir().unwrap();
        let project = Project::new(dir.path().join("locate"));
        write_suffix_table(&project.suffix_table_path(), suffix_table).unwrap();

        let mut reader = project
            .open_suffix_table(suffix_table.len() as Seqpos)
            .unwrap();
        LocateTable::build(&mut reader, suffix_table.len() as Seqpos, interval).unwrap()
    }

    #[test]
    fn sampled_rows_and_positions() {
        // a permutation of 0..8, as a suffix table is
        let suffix_table: Vec<Seqpos> = vec![7, 3, 0, 5, 1, 6, 2, 4];
        let table = table_for(&suffix_table, 3);

        for (row, &position) in suffix_table.iter().enumerate() {
            let row = row as Seqpos;
            if position % 3 == 0 {
                assert!(table.is_sampled(row));
                assert_eq!(table.original_position(row), Some(position));
            } else {
                assert!(!table.is_sampled(row));
                assert_eq!(table.original_position(row), None);
            }
        }
    }

    #[test]
    fn rank_across_block_boundaries() {
        // every second row sampled over many rank blocks
        let suffix_table: Vec<Seqpos> = (0..2048).collect();
        let table = table_for(&suffix_table, 2);

        assert_eq!(table.num_sampled, 1024);
        for row in (0..2048).step_by(2) {
            assert_eq!(table.original_position(row as Seqpos), Some(row as Seqpos));
        }
    }

    #[test]
    fn stream_roundtrip() {
        let suffix_table: Vec<Seqpos> = vec![7, 3, 0, 5, 1, 6, 2, 4];
        let table = table_for(&suffix_table, 2);

        let mut buf = Vec::new();
        table.write_to(&mut buf).unwrap();
        let restored = LocateTable::read_from(&mut buf.as_slice()).unwrap();

        assert_eq!(restored.sample_interval, table.sample_interval);
        assert_eq!(restored.num_sampled, table.num_sampled);
        for row in 0..8 {
            assert_eq!(restored.original_position(row), table.original_position(row));
        }
    }
}
