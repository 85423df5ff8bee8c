//! Querying an indexed BWT: occurrence counts, LF-mapping, backward search
//! and locate.

use crate::Seqpos;
use crate::alphabet::MultiRangeAlphabet;
use crate::block_enc_idx_seq::{BlockEncConfig, BlockEncIdxSeq, EisHint, RangeStoreMode};
use crate::error::{Error, Result};
use crate::project::Project;

use std::cell::RefCell;

/// Base index types a BWT sequence can be built on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum SeqBaseEncoding {
    /// Block composition encoding, the only implemented base type.
    BlockComp,
    /// Run-length encoding of the original FM-index proposal.
    Rle,
    /// Wavelet-tree encoding.
    WaveletTree,
}

/// A half-open interval `[lower, upper)` of BWT rows; empty iff
/// `upper <= lower`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MatchBound {
    pub lower: Seqpos,
    pub upper: Seqpos,
}

impl MatchBound {
    pub const EMPTY: MatchBound = MatchBound { lower: 0, upper: 0 };

    pub fn count(&self) -> Seqpos {
        self.upper.saturating_sub(self.lower)
    }

    pub fn is_empty(&self) -> bool {
        self.upper <= self.lower
    }
}

/// A BWT sequence: an encoded indexed sequence plus the cumulative C-table,
/// supporting the standard backward search.
pub struct BwtSeq {
    seq_idx: BlockEncIdxSeq,
    /// `count[c]` = number of symbols with internal code `< c` in the whole
    /// sequence; `count[alphabet size]` = sequence length
    count: Vec<Seqpos>,
    hint: RefCell<EisHint>,
}

impl BwtSeq {
    /// Loads the project's index if one exists, otherwise constructs it,
    /// then derives the C-table by induction over the alphabet.
    pub fn new(
        encoding: SeqBaseEncoding,
        config: BlockEncConfig,
        modes: &[RangeStoreMode],
        alphabet: MultiRangeAlphabet,
        project: &Project,
    ) -> Result<Self> {
        if encoding != SeqBaseEncoding::BlockComp {
            return Err(Error::config(format!(
                "illegal/unknown encoding requested: {encoding:?}"
            )));
        }

        let seq_idx = match BlockEncIdxSeq::load(alphabet.clone(), project) {
            Ok(seq_idx) => seq_idx,
            Err(load_error) => {
                tracing::debug!(%load_error, "loading failed, constructing index");
                config.construct_index(modes, alphabet, project)?
            }
        };

        let alphabet_size = seq_idx.alphabet().size();
        if alphabet_size == 0 {
            return Err(Error::corrupt("alphabet size 0"));
        }

        let seq_len = seq_idx.len();
        let mut hint = seq_idx.new_hint()?;
        let mut count = vec![0; alphabet_size + 1];
        for code in 0..alphabet_size {
            count[code + 1] = count[code] + seq_idx.rank_prefix(code as u8, seq_len, &mut hint)?;
        }
        if count[alphabet_size] != seq_len {
            return Err(Error::corrupt(format!(
                "symbol counts sum to {}, sequence length is {}",
                count[alphabet_size], seq_len
            )));
        }

        Ok(Self {
            seq_idx,
            count,
            hint: RefCell::new(hint),
        })
    }

    pub fn len(&self) -> Seqpos {
        self.seq_idx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seq_idx.is_empty()
    }

    pub fn alphabet(&self) -> &MultiRangeAlphabet {
        self.seq_idx.alphabet()
    }

    /// The underlying encoded indexed sequence.
    pub fn seq_idx(&self) -> &BlockEncIdxSeq {
        &self.seq_idx
    }

    /// The cumulative C-table, indexable by internal code; the final entry
    /// equals the sequence length.
    pub fn count_table(&self) -> &[Seqpos] {
        &self.count
    }

    pub fn has_locate_information(&self) -> bool {
        self.seq_idx.has_locate_information()
    }

    /// The locate sampling rate the index was built with, if any.
    pub fn locate_sample_interval(&self) -> Option<u32> {
        self.seq_idx
            .locate_table()
            .map(|table| table.sample_interval())
    }

    /// Occurrences of the input symbol `sym` in BWT rows `[0, pos)`, for
    /// `pos <= len()`. An unmapped symbol occurs 0 times.
    pub fn occ(&self, sym: u8, pos: Seqpos) -> Result<Seqpos> {
        match self.alphabet().map(sym) {
            Some(code) => {
                self.seq_idx
                    .rank_prefix(code, pos, &mut self.hint.borrow_mut())
            }
            None => Ok(0),
        }
    }

    /// The input symbol of BWT row `pos`.
    pub fn symbol_at(&self, pos: Seqpos) -> Result<u8> {
        self.seq_idx.get(pos, &mut self.hint.borrow_mut())
    }

    /// Maps a BWT row to the row of its predecessor in the original text.
    pub fn lf(&self, pos: Seqpos) -> Result<Seqpos> {
        let mut hint = self.hint.borrow_mut();
        let sym = self.seq_idx.get(pos, &mut hint)?;
        let code = self
            .alphabet()
            .map(sym)
            .expect("stored symbols are always mapped");

        Ok(self.count[code as usize] + self.seq_idx.rank_prefix(code, pos, &mut hint)?)
    }

    /// The match bound of the single-symbol query `sym`: all rows whose
    /// first column holds its code. Empty for unmapped symbols.
    pub fn initial_match_bound(&self, sym: u8) -> MatchBound {
        match self.alphabet().map(sym) {
            Some(code) => MatchBound {
                lower: self.count[code as usize],
                upper: self.count[code as usize + 1],
            },
            None => MatchBound::EMPTY,
        }
    }

    /// One backward-search step: narrows `bound` for query `P` to the bound
    /// for `next_sym · P`.
    pub fn incr_match(&self, bound: MatchBound, next_sym: u8) -> Result<MatchBound> {
        if bound.is_empty() {
            return Ok(bound);
        }
        let Some(code) = self.alphabet().map(next_sym) else {
            return Ok(MatchBound::EMPTY);
        };

        let mut hint = self.hint.borrow_mut();
        let base = self.count[code as usize];
        let lower = base + self.seq_idx.rank_prefix(code, bound.lower, &mut hint)?;
        let upper = base + self.seq_idx.rank_prefix(code, bound.upper, &mut hint)?;

        Ok(MatchBound { lower, upper })
    }

    /// The BWT row interval matching `query`, via right-to-left backward
    /// search. The empty query matches everywhere.
    pub fn match_bound(&self, query: &[u8]) -> Result<MatchBound> {
        let Some((&last, front)) = query.split_last() else {
            return Ok(MatchBound {
                lower: 0,
                upper: self.len(),
            });
        };

        let mut bound = self.initial_match_bound(last);
        for &sym in front.iter().rev() {
            if bound.is_empty() {
                break;
            }
            bound = self.incr_match(bound, sym)?;
        }

        Ok(bound)
    }

    /// Number of occurrences of `query` in the indexed text.
    pub fn match_count(&self, query: &[u8]) -> Result<Seqpos> {
        Ok(self.match_bound(query)?.count())
    }

    /// Iterates over the text positions of all occurrences of `query`.
    ///
    /// Requires locate information, see
    /// [`BlockEncConfig::locate_interval`].
    pub fn exact_match_iterator(&self, query: &[u8]) -> Result<ExactMatchIter<'_>> {
        if !self.has_locate_information() {
            return Err(Error::config("index carries no locate information"));
        }
        let bound = self.match_bound(query)?;

        Ok(ExactMatchIter {
            bwt_seq: self,
            row: bound.lower,
            end: bound.upper.max(bound.lower),
        })
    }

    /// Walks LF steps from `row` until a sampled row is hit, then offsets
    /// the stored text position by the walked distance.
    fn recover_position(&self, mut row: Seqpos) -> Result<Seqpos> {
        let locate = self
            .seq_idx
            .locate_table()
            .expect("caller checked for locate information");

        let mut steps: Seqpos = 0;
        loop {
            if let Some(original_position) = locate.original_position(row) {
                return Ok(original_position + steps);
            }
            // terminates: text position 0 is a sampled multiple
            row = self.lf(row)?;
            steps += 1;
        }
    }
}

/// Iterator over the text positions matching a query, lazily recovering one
/// position per step.
pub struct ExactMatchIter<'a> {
    bwt_seq: &'a BwtSeq,
    row: Seqpos,
    end: Seqpos,
}

impl Iterator for ExactMatchIter<'_> {
    type Item = Result<Seqpos>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.row >= self.end {
            return None;
        }
        let position = self.bwt_seq.recover_position(self.row);
        self.row += 1;
        Some(position)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.end - self.row) as usize;
        (remaining, Some(remaining))
    }
}
