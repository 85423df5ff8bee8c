//! Enumeration tables for block compositions and their permutations.
//!
//! A block of `block_size` symbols over a `num_syms`-ary alphabet is
//! represented by two indices: the rank of its symbol-count vector
//! (composition) among all weak compositions of `block_size`, and the rank of
//! the concrete symbol order among the permutations realizing that
//! composition. Both tables are enumerated once at startup and bit-packed
//! back to back, so a block encodes in
//! `composition_idx_bits + perm_idx_bits[composition]` bits.

use crate::bitpack::{self, BitElem, BitOffset};
use crate::error::{Error, Result};

use std::cmp::Ordering;

pub(crate) struct PermutationList {
    pub(crate) num_permutations: u64,
    /// `ceil(log2(num_permutations))`; 0 for a single permutation, so that
    /// such blocks spend no bits in the variable-width stream.
    pub(crate) perm_idx_bits: u32,
    cat_perms: Vec<BitElem>,
}

pub(crate) struct CompositionTable {
    block_size: usize,
    num_syms: usize,
    pub(crate) num_compositions: usize,
    /// All compositions, `bits_per_count` bits per symbol count, in strictly
    /// increasing bit-string order.
    cat_comps: Vec<BitElem>,
    pub(crate) permutations: Vec<PermutationList>,
    pub(crate) bits_per_count: u32,
    pub(crate) bits_per_symbol: u32,
    pub(crate) composition_idx_bits: u32,
    pub(crate) max_perm_idx_bits: u32,
}

/// Reusable buffers for [`CompositionTable::block_to_pair`].
pub(crate) struct PairScratch {
    counts: Vec<u32>,
    bits: Vec<BitElem>,
}

impl CompositionTable {
    pub(crate) fn new(block_size: usize, num_syms: usize) -> Result<Self> {
        assert!(block_size > 0 && num_syms > 0);

        let oversized = || Error::config("block parameters produce oversized enumeration tables");

        let max_sym = num_syms - 1;
        let bits_per_count = bitpack::bits_for_value(block_size as u64);
        let bits_per_symbol = bitpack::bits_for_value(max_sym as u64);
        let bits_per_comp = bits_per_count as BitOffset * num_syms as BitOffset;

        let num_compositions =
            binomial((block_size + max_sym) as u64, max_sym as u64).ok_or_else(oversized)?;
        let composition_idx_bits = bitpack::bits_for_value(num_compositions - 1);

        let cat_comps_bits = (num_compositions)
            .checked_mul(bits_per_comp)
            .ok_or_else(oversized)?;
        let mut cat_comps = vec![0; bitpack::bit_elems_for(cat_comps_bits)];
        let mut permutations = Vec::with_capacity(num_compositions as usize);

        let mut composition = vec![0u32; num_syms];
        let mut rightmost_nonzero = max_sym;
        composition[max_sym] = block_size as u32;

        let mut max_num_permutations = 0;
        let mut offset: BitOffset = 0;

        for comp_index in 0..num_compositions {
            bitpack::store_uniform_uint_array(&mut cat_comps, offset, bits_per_count, &composition);
            debug_assert!(
                comp_index == 0
                    || bitpack::compare(
                        &cat_comps,
                        offset,
                        bits_per_comp,
                        &cat_comps,
                        offset - bits_per_comp,
                        bits_per_comp,
                    ) == Ordering::Greater
            );

            let permutation_list = PermutationList::new(
                &composition,
                block_size,
                bits_per_symbol,
                oversized,
            )?;
            max_num_permutations = max_num_permutations.max(permutation_list.num_permutations);
            permutations.push(permutation_list);

            if comp_index + 1 < num_compositions {
                offset += bits_per_comp;
                next_composition(&mut composition, max_sym, &mut rightmost_nonzero);
            }
        }

        // the generator must have arrived at the lexically maximal composition
        debug_assert_eq!(composition[0], block_size as u32);

        tracing::debug!(
            block_size,
            num_syms,
            num_compositions,
            max_num_permutations,
            "built composition table"
        );

        Ok(Self {
            block_size,
            num_syms,
            num_compositions: num_compositions as usize,
            cat_comps,
            permutations,
            bits_per_count,
            bits_per_symbol,
            composition_idx_bits,
            max_perm_idx_bits: bitpack::bits_for_value(max_num_permutations - 1),
        })
    }

    pub(crate) fn new_scratch(&self) -> PairScratch {
        PairScratch {
            counts: vec![0; self.num_syms],
            bits: vec![0; bitpack::bit_elems_for(self.bits_per_comp() + self.bits_per_permutation())],
        }
    }

    fn bits_per_comp(&self) -> BitOffset {
        self.bits_per_count as BitOffset * self.num_syms as BitOffset
    }

    fn bits_per_permutation(&self) -> BitOffset {
        self.bits_per_symbol as BitOffset * self.block_size as BitOffset
    }

    /// Transforms a block of sub-alphabet symbols into its
    /// `(composition index, permutation index)` pair, also returning the
    /// number of significant permutation index bits.
    ///
    /// Both lookups are binary searches with a halving step; they terminate
    /// because the tables are dense, every block has exactly one entry.
    pub(crate) fn block_to_pair(
        &self,
        block: &[u8],
        scratch: &mut PairScratch,
    ) -> (usize, u64, u32) {
        debug_assert_eq!(block.len(), self.block_size);

        scratch.counts.fill(0);
        for &symbol in block {
            scratch.counts[symbol as usize] += 1;
        }
        bitpack::store_uniform_uint_array(&mut scratch.bits, 0, self.bits_per_count, &scratch.counts);

        let bits_per_comp = self.bits_per_comp();
        let comp_idx = dense_bit_search(
            &self.cat_comps,
            bits_per_comp,
            self.num_compositions,
            &scratch.bits,
            0,
        );

        let permutation_list = &self.permutations[comp_idx];
        let perm_idx = if permutation_list.num_permutations > 1 {
            bitpack::store_uniform_uint_array(
                &mut scratch.bits,
                bits_per_comp,
                self.bits_per_symbol,
                block,
            );
            dense_bit_search(
                &permutation_list.cat_perms,
                self.bits_per_permutation(),
                permutation_list.num_permutations as usize,
                &scratch.bits,
                bits_per_comp,
            ) as u64
        } else {
            0
        };

        (comp_idx, perm_idx, permutation_list.perm_idx_bits)
    }

    /// Inverse of [`block_to_pair`](Self::block_to_pair): unpacks the stored
    /// permutation into `out`.
    pub(crate) fn block_from_pair(&self, comp_idx: usize, perm_idx: u64, out: &mut [u8]) {
        debug_assert_eq!(out.len(), self.block_size);

        bitpack::get_uniform_uint_array(
            &self.permutations[comp_idx].cat_perms,
            perm_idx * self.bits_per_permutation(),
            self.bits_per_symbol,
            out,
        );
    }

    /// Occurrence count of `symbol` in the composition at `comp_idx`.
    pub(crate) fn sym_count_from_composition(&self, comp_idx: usize, symbol: u8) -> u32 {
        debug_assert!(comp_idx < self.num_compositions);

        bitpack::get_uint(
            &self.cat_comps,
            comp_idx as BitOffset * self.bits_per_comp()
                + symbol as BitOffset * self.bits_per_count as BitOffset,
            self.bits_per_count,
        ) as u32
    }

    pub(crate) fn perm_idx_bits(&self, comp_idx: usize) -> u32 {
        self.permutations[comp_idx].perm_idx_bits
    }
}

impl PermutationList {
    fn new(
        composition: &[u32],
        block_size: usize,
        bits_per_symbol: u32,
        oversized: impl Fn() -> Error,
    ) -> Result<Self> {
        let num_permutations =
            multinomial(block_size as u64, composition).ok_or_else(&oversized)?;
        let bits_per_permutation = bits_per_symbol as BitOffset * block_size as BitOffset;
        let total_bits = num_permutations
            .checked_mul(bits_per_permutation)
            .ok_or_else(&oversized)?;

        let mut cat_perms = vec![0; bitpack::bit_elems_for(total_bits)];

        let mut permutation = Vec::with_capacity(block_size);
        for (symbol, &count) in composition.iter().enumerate() {
            permutation.extend(std::iter::repeat_n(symbol as u8, count as usize));
        }

        let mut offset: BitOffset = 0;
        for perm_index in 0..num_permutations {
            bitpack::store_uniform_uint_array(&mut cat_perms, offset, bits_per_symbol, &permutation);

            if perm_index + 1 < num_permutations {
                offset += bits_per_permutation;
                next_permutation(&mut permutation);
            }
        }

        Ok(Self {
            num_permutations,
            perm_idx_bits: bitpack::bits_for_value(num_permutations - 1),
            cat_perms,
        })
    }
}

/// Advances `composition` to its lexical successor by moving one unit from
/// the rightmost non-zero entry to its left neighbor, shifting any residue
/// back to the last slot.
fn next_composition(composition: &mut [u32], max_sym: usize, rightmost_nonzero: &mut usize) {
    composition[*rightmost_nonzero - 1] += 1;
    composition[*rightmost_nonzero] -= 1;

    if composition[*rightmost_nonzero] == 0 {
        *rightmost_nonzero -= 1;
    } else if composition[max_sym] == 0 {
        composition[max_sym] = composition[*rightmost_nonzero];
        composition[*rightmost_nonzero] = 0;
        *rightmost_nonzero = max_sym;
    }
}

/// Classical next-permutation step: find the rightmost ascent, swap in the
/// next larger suffix element, sort the suffix by reversing it.
fn next_permutation(permutation: &mut [u8]) {
    let Some(ascent) = (0..permutation.len() - 1)
        .rev()
        .find(|&i| permutation[i] < permutation[i + 1])
    else {
        return;
    };

    let swap_idx = (ascent + 1..permutation.len())
        .rev()
        .find(|&i| permutation[i] > permutation[ascent])
        .unwrap();

    permutation.swap(ascent, swap_idx);
    permutation[ascent + 1..].reverse();
}

/// Binary search with a halving step over a dense table of fixed-width
/// bit-string entries. The key is guaranteed to be present.
fn dense_bit_search(
    table: &[BitElem],
    entry_bits: BitOffset,
    num_entries: usize,
    key: &[BitElem],
    key_offset: BitOffset,
) -> usize {
    let mut index = num_entries / 2;
    let mut step = index;

    loop {
        let order = bitpack::compare(
            key,
            key_offset,
            entry_bits,
            table,
            index as BitOffset * entry_bits,
            entry_bits,
        );

        match order {
            Ordering::Equal => return index,
            Ordering::Greater => {
                if step > 1 {
                    step >>= 1;
                }
                index += step;
            }
            Ordering::Less => {
                if step > 1 {
                    step >>= 1;
                }
                index -= step;
            }
        }
    }
}

fn binomial(n: u64, k: u64) -> Option<u64> {
    let k = k.min(n - k);
    let mut accum: u64 = 1;
    for i in 0..k {
        // exact at every step: accum always holds C(n, i)
        accum = accum.checked_mul(n - i)? / (i + 1);
    }
    Some(accum)
}

fn multinomial(n: u64, bin_sizes: &[u32]) -> Option<u64> {
    let mut remaining = n;
    let mut accum: u64 = 1;
    for &bin in bin_sizes {
        accum = accum.checked_mul(binomial(remaining, bin as u64)?)?;
        remaining -= bin as u64;
    }
    debug_assert_eq!(remaining, 0);
    Some(accum)
}
