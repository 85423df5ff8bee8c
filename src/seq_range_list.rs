//! Sparse storage for runs of special symbols.
//!
//! Symbols outside the block-encoded sub-alphabet are rare by assumption, so
//! they are kept as a sorted list of runs instead of being spread over the
//! composition tables. Queries are hint-assisted: a sequential scan over the
//! sequence touches neighboring list slots, so the previous result index
//! usually answers the next lookup without a binary search.

use crate::Seqpos;
use crate::io_util;

use std::io::{self, Read, Write};

/// Runs longer than this are split into multiple records.
pub const MAX_SEQ_RANGE_LEN: Seqpos = u16::MAX as Seqpos;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SeqRange {
    pub start_pos: Seqpos,
    pub len: u16,
    pub sym: u8,
}

impl SeqRange {
    /// One past the last covered position.
    pub fn end(&self) -> Seqpos {
        self.start_pos + self.len as Seqpos
    }

    pub fn contains(&self, pos: Seqpos) -> bool {
        pos >= self.start_pos && pos < self.end()
    }
}

#[derive(Debug, Default)]
pub struct SeqRangeList {
    ranges: Vec<SeqRange>,
}

impl SeqRangeList {
    pub fn with_capacity(num_ranges: usize) -> Self {
        Self {
            ranges: Vec::with_capacity(num_ranges),
        }
    }

    pub fn num_ranges(&self) -> usize {
        self.ranges.len()
    }

    pub fn range(&self, index: usize) -> &SeqRange {
        &self.ranges[index]
    }

    /// Appends a run, splitting it at [`MAX_SEQ_RANGE_LEN`]. A length of 0
    /// appends nothing.
    pub fn append_new_range(&mut self, mut pos: Seqpos, mut len: Seqpos, sym: u8) {
        while len > MAX_SEQ_RANGE_LEN {
            self.ranges.push(SeqRange {
                start_pos: pos,
                len: u16::MAX,
                sym,
            });
            pos += MAX_SEQ_RANGE_LEN;
            len -= MAX_SEQ_RANGE_LEN;
        }
        if len > 0 {
            self.ranges.push(SeqRange {
                start_pos: pos,
                len: len as u16,
                sym,
            });
        }
    }

    /// Records one position, coalescing with the trailing run when the
    /// symbol matches, the position is contiguous and the run is under the
    /// length cap. Out-of-order positions fall back to a sorted insert; the
    /// expected hot path is monotonic input.
    pub fn add_position(&mut self, pos: Seqpos, sym: u8) {
        match self.ranges.last().copied() {
            Some(last) if last.start_pos > pos => self.insert_new_range(pos, 1, sym),
            Some(last) if last.sym == sym && last.end() == pos && last.len < u16::MAX => {
                self.ranges.last_mut().unwrap().len += 1;
            }
            _ => self.append_new_range(pos, 1, sym),
        }
    }

    fn insert_new_range(&mut self, pos: Seqpos, len: Seqpos, sym: u8) {
        debug_assert!(len <= MAX_SEQ_RANGE_LEN);
        let insert_at = self.ranges.partition_point(|r| r.start_pos < pos);
        self.ranges.insert(
            insert_at,
            SeqRange {
                start_pos: pos,
                len: len as u16,
                sym,
            },
        );
    }

    /// Initial value for a search hint of this list.
    pub fn new_search_hint(&self) -> usize {
        self.ranges.len() / 2
    }

    fn slot_answers(&self, index: usize, pos: Seqpos) -> bool {
        self.ranges[index].end() > pos && (index == 0 || self.ranges[index - 1].end() <= pos)
    }

    /// Finds the first run overlapping `pos` or starting at/after it,
    /// updating the hint to the result index.
    ///
    /// The hinted slot and its successor are checked before falling back to
    /// binary search.
    pub fn find_position_next(&self, pos: Seqpos, hint: &mut usize) -> Option<usize> {
        if self.ranges.is_empty() {
            return None;
        }

        let hinted = (*hint).min(self.ranges.len() - 1);
        if self.slot_answers(hinted, pos) {
            *hint = hinted;
            return Some(hinted);
        }
        if hinted + 1 < self.ranges.len() && self.slot_answers(hinted + 1, pos) {
            *hint = hinted + 1;
            return Some(hinted + 1);
        }

        let index = self.ranges.partition_point(|r| r.end() <= pos);
        if index == self.ranges.len() {
            return None;
        }
        *hint = index;
        Some(index)
    }

    /// The symbol of the run covering `pos`, if any.
    pub fn overlaps_position(&self, pos: Seqpos, hint: &mut usize) -> Option<u8> {
        let index = self.find_position_next(pos, hint)?;
        let range = &self.ranges[index];
        range.contains(pos).then_some(range.sym)
    }

    /// Number of `sym` positions covered by runs clipped to
    /// `start..=end`.
    pub fn symbol_count_in_region(
        &self,
        start: Seqpos,
        end: Seqpos,
        sym: u8,
        hint: &mut usize,
    ) -> Seqpos {
        self.count_region(start, end, hint, |range| range.sym == sym)
    }

    /// Number of positions covered by runs clipped to `start..=end`,
    /// regardless of symbol.
    pub fn all_symbols_count_in_region(
        &self,
        start: Seqpos,
        end: Seqpos,
        hint: &mut usize,
    ) -> Seqpos {
        self.count_region(start, end, hint, |_| true)
    }

    /// Adds the per-symbol totals of runs clipped to `start..=end` into
    /// `occurrences`, which must be indexable by every stored symbol.
    pub fn symbols_in_region(
        &self,
        start: Seqpos,
        end: Seqpos,
        occurrences: &mut [Seqpos],
        hint: &mut usize,
    ) {
        if start > end {
            return;
        }
        let Some(first) = self.find_position_next(start, hint) else {
            return;
        };

        for range in &self.ranges[first..] {
            if range.start_pos > end {
                break;
            }
            let from = start.max(range.start_pos);
            let to = (end + 1).min(range.end());
            if to > from {
                occurrences[range.sym as usize] += to - from;
            }
        }
    }

    fn count_region(
        &self,
        start: Seqpos,
        end: Seqpos,
        hint: &mut usize,
        counts: impl Fn(&SeqRange) -> bool,
    ) -> Seqpos {
        if start > end {
            return 0;
        }
        let Some(first) = self.find_position_next(start, hint) else {
            return 0;
        };

        let mut total = 0;
        for range in &self.ranges[first..] {
            if range.start_pos > end {
                break;
            }
            let from = start.max(range.start_pos);
            let to = (end + 1).min(range.end());
            if to > from && counts(range) {
                total += to - from;
            }
        }
        total
    }

    pub fn compact(&mut self) {
        self.ranges.shrink_to_fit();
    }

    pub fn save_to_stream(&self, writer: &mut impl Write) -> io::Result<()> {
        io_util::write_u64(writer, self.ranges.len() as u64)?;
        for range in &self.ranges {
            io_util::write_seqpos(writer, range.start_pos)?;
            io_util::write_u16(writer, range.len)?;
            writer.write_all(&[range.sym])?;
        }
        Ok(())
    }

    pub fn read_from_stream(reader: &mut impl Read) -> io::Result<Self> {
        let num_ranges = io_util::read_u64(reader)? as usize;
        let mut ranges = Vec::with_capacity(num_ranges);
        for _ in 0..num_ranges {
            let start_pos = io_util::read_seqpos(reader)?;
            let len = io_util::read_u16(reader)?;
            let sym = io_util::read_u8(reader)?;
            ranges.push(SeqRange {
                start_pos,
                len,
                sym,
            });
        }
        Ok(Self { ranges })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list_from_positions(positions: &[(Seqpos, u8)]) -> SeqRangeList {
        let mut list = SeqRangeList::default();
        for &(pos, sym) in positions {
            list.add_position(pos, sym);
        }
        list
    }

    #[test]
    fn contiguous_positions_coalesce() {
        let list = list_from_positions(&[(3, 1), (4, 1), (5, 1), (9, 1), (10, 2)]);

        assert_eq!(list.num_ranges(), 3);
        assert_eq!(
            *list.range(0),
            SeqRange {
                start_pos: 3,
                len: 3,
                sym: 1
            }
        );
        // same symbol but not contiguous
        assert_eq!(list.range(1).start_pos, 9);
        // contiguous but different symbol
        assert_eq!(list.range(2).sym, 2);
    }

    #[test]
    fn long_runs_split_at_the_cap() {
        let mut list = SeqRangeList::default();
        list.append_new_range(0, MAX_SEQ_RANGE_LEN * 2 + 10, 3);

        assert_eq!(list.num_ranges(), 3);
        assert_eq!(list.range(0).len, u16::MAX);
        assert_eq!(list.range(1).start_pos, MAX_SEQ_RANGE_LEN);
        assert_eq!(list.range(2).len, 10);

        list.append_new_range(500_000, 0, 1);
        assert_eq!(list.num_ranges(), 3, "empty runs append nothing");
    }

    #[test]
    fn out_of_order_positions_are_inserted_sorted() {
        let mut list = list_from_positions(&[(10, 1), (20, 1)]);
        list.add_position(5, 2);

        assert_eq!(list.range(0).start_pos, 5);
        assert_eq!(list.range(1).start_pos, 10);
        assert_eq!(list.range(2).start_pos, 20);
    }

    #[test]
    fn find_position_next_with_and_without_hint() {
        let list = list_from_positions(&[(3, 1), (4, 1), (9, 2), (17, 1)]);
        // runs: [3..5), [9..10), [17..18)

        let mut hint = list.new_search_hint();
        assert_eq!(list.find_position_next(0, &mut hint), Some(0));
        assert_eq!(list.find_position_next(4, &mut hint), Some(0));
        assert_eq!(list.find_position_next(5, &mut hint), Some(1));
        assert_eq!(list.find_position_next(9, &mut hint), Some(1));
        assert_eq!(list.find_position_next(12, &mut hint), Some(2));
        assert_eq!(list.find_position_next(18, &mut hint), None);

        // a stale hint must not change any answer
        for pos in 0..20 {
            let mut fresh = list.new_search_hint();
            let mut stale = 3;
            assert_eq!(
                list.find_position_next(pos, &mut fresh),
                list.find_position_next(pos, &mut stale),
                "diverged at position {pos}"
            );
        }
    }

    #[test]
    fn region_counts_clip_to_the_query() {
        let list = list_from_positions(&[(3, 1), (4, 1), (5, 1), (9, 2), (10, 2)]);
        let mut hint = list.new_search_hint();

        assert_eq!(list.symbol_count_in_region(0, 20, 1, &mut hint), 3);
        assert_eq!(list.symbol_count_in_region(4, 9, 1, &mut hint), 2);
        assert_eq!(list.symbol_count_in_region(4, 9, 2, &mut hint), 1);
        assert_eq!(list.all_symbols_count_in_region(4, 9, &mut hint), 3);
        assert_eq!(list.all_symbols_count_in_region(6, 8, &mut hint), 0);
        assert_eq!(list.all_symbols_count_in_region(9, 3, &mut hint), 0);

        let mut occurrences = [0; 3];
        list.symbols_in_region(0, 20, &mut occurrences, &mut hint);
        assert_eq!(occurrences, [0, 3, 2]);
    }

    #[test]
    fn overlap_queries() {
        let list = list_from_positions(&[(3, 1), (9, 2)]);
        let mut hint = list.new_search_hint();

        assert_eq!(list.overlaps_position(3, &mut hint), Some(1));
        assert_eq!(list.overlaps_position(9, &mut hint), Some(2));
        assert_eq!(list.overlaps_position(4, &mut hint), None);
        assert_eq!(list.overlaps_position(100, &mut hint), None);
    }

    #[test]
    fn stream_roundtrip() {
        let list = list_from_positions(&[(3, 1), (4, 1), (9, 2), (1000, 4)]);

        let mut buf = Vec::new();
        list.save_to_stream(&mut buf).unwrap();
        let restored = SeqRangeList::read_from_stream(&mut buf.as_slice()).unwrap();

        assert_eq!(restored.num_ranges(), list.num_ranges());
        for i in 0..list.num_ranges() {
            assert_eq!(restored.range(i), list.range(i));
        }
    }
}
