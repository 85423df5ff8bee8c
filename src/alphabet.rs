//! Multi-range alphabets: a bijective remapping from raw input bytes to a
//! compact internal code space that is partitioned into named, contiguous
//! ranges.
//!
//! The point of the ranges is that different parts of the alphabet can be
//! stored differently by the index. A typical genomic setup has one range for
//! the block-encoded nucleotides and a second range for rare special symbols
//! (separators, wildcards) that go into a region list instead.

use std::io;

/// Input bytes without a mapping translate to this value.
pub const UNDEF_SYMBOL: u8 = u8::MAX;

/// Conventional boundary marker between concatenated sequences.
pub const SEPARATOR: u8 = 0xFE;

const DNA_TRANSLATION_TABLE: [u8; 256] = {
    let mut table = [UNDEF_SYMBOL; 256];

    table[b'A' as usize] = 0;
    table[b'a' as usize] = 0;

    table[b'C' as usize] = 1;
    table[b'c' as usize] = 1;

    table[b'G' as usize] = 2;
    table[b'g' as usize] = 2;

    table[b'T' as usize] = 3;
    table[b't' as usize] = 3;

    table
};

const DNA_WITH_SEPARATOR_TRANSLATION_TABLE: [u8; 256] = {
    let mut table = DNA_TRANSLATION_TABLE;
    table[SEPARATOR as usize] = 4;

    table
};

/// The plain DNA alphabet as a single range of four symbols.
pub fn dna() -> MultiRangeAlphabet {
    MultiRangeAlphabet::new(&[4], DNA_TRANSLATION_TABLE)
}

/// DNA in the first range, [`SEPARATOR`] alone in a second range.
///
/// This is the layout for indexing the BWT of concatenated sequences: the
/// nucleotide range is block-encoded, the separator range goes to the region
/// list.
pub fn dna_with_separator() -> MultiRangeAlphabet {
    MultiRangeAlphabet::new(&[4, 1], DNA_WITH_SEPARATOR_TRANSLATION_TABLE)
}

/// A bidirectional byte mapping partitioned into contiguous ranges.
///
/// The forward and reverse maps are mutual inverses over all defined inputs,
/// range boundaries are strictly increasing, and the total size is the sum of
/// the per-range sizes.
#[derive(Clone)]
pub struct MultiRangeAlphabet {
    mappings: [u8; 256],
    rev_mappings: [u8; 256],
    symbols_per_range: Vec<usize>,
    range_end_indices: Vec<usize>,
}

impl MultiRangeAlphabet {
    /// Creates an alphabet from a translation table and the number of
    /// internal codes belonging to each range.
    ///
    /// `mappings` must send every defined input byte to a code below the sum
    /// of `symbols_per_range` and everything else to [`UNDEF_SYMBOL`].
    pub fn new(symbols_per_range: &[usize], mappings: [u8; 256]) -> Self {
        assert!(!symbols_per_range.is_empty());

        let mut range_end_indices = Vec::with_capacity(symbols_per_range.len());
        let mut end = 0;
        for &num_symbols in symbols_per_range {
            end += num_symbols;
            range_end_indices.push(end);
        }

        let mut rev_mappings = [UNDEF_SYMBOL; 256];
        for (input, &code) in mappings.iter().enumerate() {
            if code != UNDEF_SYMBOL {
                rev_mappings[code as usize] = input as u8;
            }
        }

        Self {
            mappings,
            rev_mappings,
            symbols_per_range: symbols_per_range.to_vec(),
            range_end_indices,
        }
    }

    /// Creates an alphabet with one range per symbol group, mapping the
    /// listed bytes to consecutive internal codes.
    pub fn with_ranges(ranges: &[&[u8]]) -> Self {
        let mut mappings = [UNDEF_SYMBOL; 256];
        let mut symbols_per_range = Vec::with_capacity(ranges.len());
        let mut code = 0u8;

        for range in ranges {
            for &input in *range {
                assert_eq!(mappings[input as usize], UNDEF_SYMBOL);
                mappings[input as usize] = code;
                code += 1;
            }
            symbols_per_range.push(range.len());
        }

        Self::new(&symbols_per_range, mappings)
    }

    pub fn num_ranges(&self) -> usize {
        self.symbols_per_range.len()
    }

    pub fn range_size(&self, range: usize) -> usize {
        self.symbols_per_range[range]
    }

    /// Total number of internal codes.
    pub fn size(&self) -> usize {
        *self.range_end_indices.last().unwrap()
    }

    /// Size of the original value range of input symbols (256 for a byte
    /// mapping).
    pub fn domain_size(&self) -> usize {
        256
    }

    /// Looks up the internal code of an input byte.
    pub fn map(&self, symbol: u8) -> Option<u8> {
        let code = self.mappings[symbol as usize];
        (code != UNDEF_SYMBOL).then_some(code)
    }

    /// Looks up the input byte of an internal code.
    pub fn rev_map(&self, code: u8) -> u8 {
        self.rev_mappings[code as usize]
    }

    pub fn has_valid_mapping(&self, symbol: u8) -> bool {
        self.mappings[symbol as usize] != UNDEF_SYMBOL
    }

    /// Inserts a previously unmapped input byte at the end of `range`.
    ///
    /// All codes in later ranges shift up by one, keeping every range
    /// contiguous.
    pub fn add_symbol_to_range(&mut self, symbol: u8, range: usize) {
        assert!(range < self.num_ranges());
        assert_eq!(self.mappings[symbol as usize], UNDEF_SYMBOL);

        let insert_pos = self.range_end_indices[range];
        let num_symbols = self.size();

        for code in (insert_pos..num_symbols).rev() {
            let original_input = self.rev_mappings[code];
            self.rev_mappings[code + 1] = original_input;
            self.mappings[original_input as usize] += 1;
        }

        self.mappings[symbol as usize] = insert_pos as u8;
        self.rev_mappings[insert_pos] = symbol;

        self.symbols_per_range[range] += 1;
        for end in &mut self.range_end_indices[range..] {
            *end += 1;
        }
    }

    /// Derives an alphabet over this alphabet's *internal* codes in which
    /// only the ranges with `range_sel[r] == *selection` keep their symbols;
    /// codes from all other ranges collapse to `fallback`.
    ///
    /// This is how the block-encoded sub-alphabet is carved out of the full
    /// alphabet: the derived map is applied to already-transformed symbols.
    pub fn secondary_mapping<T: PartialEq>(
        &self,
        selection: &T,
        range_sel: &[T],
        fallback: u8,
    ) -> Self {
        assert_eq!(range_sel.len(), self.num_ranges());

        let mut mappings = [UNDEF_SYMBOL; 256];
        let mut new_range_sizes = Vec::with_capacity(self.num_ranges());
        let mut code = 0usize;
        let mut dest = 0u8;

        for (range, end) in self.range_end_indices.iter().enumerate() {
            if range_sel[range] == *selection {
                while code < *end {
                    mappings[code] = dest;
                    dest += 1;
                    code += 1;
                }
                new_range_sizes.push(self.symbols_per_range[range]);
            } else {
                while code < *end {
                    mappings[code] = fallback;
                    code += 1;
                }
                new_range_sizes.push(0);
            }
        }

        Self::new(&new_range_sizes, mappings)
    }

    /// Whether the internal code `code` lies in a range `r` with
    /// `range_sel[r] == *selection`. `None` if the code is outside the
    /// alphabet.
    pub fn symbol_is_in_selected_ranges<T: PartialEq>(
        &self,
        code: u8,
        selection: &T,
        range_sel: &[T],
    ) -> Option<bool> {
        let code = code as usize;
        let range = self.range_end_indices.iter().position(|&end| code < end)?;

        Some(range_sel[range] == *selection)
    }

    /// Maps a buffer of input bytes to internal codes in place.
    pub fn transform(&self, symbols: &mut [u8]) {
        for symbol in symbols {
            *symbol = self.mappings[*symbol as usize];
        }
    }

    /// Maps a buffer of internal codes back to input bytes in place.
    pub fn rev_transform(&self, symbols: &mut [u8]) {
        for symbol in symbols {
            *symbol = self.rev_mappings[*symbol as usize];
        }
    }

    /// Fills `dest` from the reader and transforms the bytes in one pass.
    /// Bytes without a mapping come out as [`UNDEF_SYMBOL`].
    pub fn read_and_transform(
        &self,
        reader: &mut impl io::Read,
        dest: &mut [u8],
    ) -> io::Result<()> {
        reader.read_exact(dest)?;
        self.transform(dest);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_and_reverse_are_inverses() {
        let alphabet = dna_with_separator();

        for input in [b'a', b'C', b'g', b'T', SEPARATOR] {
            let code = alphabet.map(input).unwrap();
            let back = alphabet.rev_map(code);
            // lowercase and uppercase share codes, reverse returns one of them
            assert_eq!(
                alphabet.map(back).unwrap(),
                code,
                "roundtrip through code {code} diverged"
            );
        }

        assert!(!alphabet.has_valid_mapping(b'x'));
        assert_eq!(alphabet.map(b'x'), None);
    }

    #[test]
    fn sizes_and_ranges() {
        let alphabet = dna_with_separator();
        assert_eq!(alphabet.size(), 5);
        assert_eq!(alphabet.num_ranges(), 2);
        assert_eq!(alphabet.range_size(0), 4);
        assert_eq!(alphabet.range_size(1), 1);
        assert_eq!(alphabet.domain_size(), 256);
    }

    #[test]
    fn adding_a_symbol_shifts_later_ranges() {
        let mut alphabet = dna_with_separator();
        let separator_code_before = alphabet.map(SEPARATOR).unwrap();

        alphabet.add_symbol_to_range(b'N', 0);

        assert_eq!(alphabet.map(b'N'), Some(4));
        assert_eq!(alphabet.map(SEPARATOR), Some(separator_code_before + 1));
        assert_eq!(alphabet.range_size(0), 5);
        assert_eq!(alphabet.size(), 6);
        assert_eq!(alphabet.rev_map(4), b'N');
        assert_eq!(alphabet.rev_map(5), SEPARATOR);
        // nucleotide codes are untouched
        assert_eq!(alphabet.map(b'a'), Some(0));
        assert_eq!(alphabet.map(b't'), Some(3));
    }

    #[test]
    fn secondary_mapping_collapses_unselected_ranges() {
        let alphabet = dna_with_separator();
        let selections = [true, false];

        let block_map = alphabet.secondary_mapping(&true, &selections, 0);

        assert_eq!(block_map.size(), 4);
        for code in 0u8..4 {
            assert_eq!(block_map.map(code), Some(code));
        }
        // the separator's internal code collapses to the fallback
        assert_eq!(block_map.map(4), Some(0));
    }

    #[test]
    fn selected_range_membership() {
        let alphabet = dna_with_separator();
        let selections = [0u8, 1];

        assert_eq!(
            alphabet.symbol_is_in_selected_ranges(2, &0, &selections),
            Some(true)
        );
        assert_eq!(
            alphabet.symbol_is_in_selected_ranges(4, &0, &selections),
            Some(false)
        );
        assert_eq!(
            alphabet.symbol_is_in_selected_ranges(4, &1, &selections),
            Some(true)
        );
        assert_eq!(
            alphabet.symbol_is_in_selected_ranges(5, &0, &selections),
            None
        );
    }

    #[test]
    fn batch_and_streaming_transforms() {
        let alphabet = dna();
        let mut symbols = *b"gattaca";
        alphabet.transform(&mut symbols);
        assert_eq!(symbols, [2, 0, 3, 3, 0, 1, 0]);

        alphabet.rev_transform(&mut symbols);
        assert_eq!(&symbols, b"gattaca");

        let mut from_stream = [0u8; 7];
        alphabet
            .read_and_transform(&mut &b"gattaca"[..], &mut from_stream)
            .unwrap();
        assert_eq!(from_stream, [2, 0, 3, 3, 0, 1, 0]);
    }
}
