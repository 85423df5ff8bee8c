//! Integrity verification of a constructed index against the original BWT
//! stream.

use crate::Seqpos;
use crate::block_enc_idx_seq::BlockEncIdxSeq;
use crate::error::{Error, Result};
use crate::project::Project;

use std::io::Read;

/// Enumerates the project's BWT stream and checks, for every position, that
/// `get` returns the reference symbol and that the rank count matches the
/// running reference count.
///
/// Fails with [`Error::SymbolMismatch`] or [`Error::RankMismatch`] at the
/// first diverging position, or [`Error::Io`] if reading breaks down. When
/// `tick_every` is nonzero, a progress event is emitted every `tick_every`
/// positions.
///
/// The stream must spell symbols the way the alphabet's reverse mapping
/// does; for case-folding alphabets that is the canonical case.
pub fn verify_integrity(
    seq_idx: &BlockEncIdxSeq,
    project: &Project,
    tick_every: u64,
) -> Result<()> {
    let mut bwt = project.open_bwt()?;
    let mut hint = seq_idx.new_hint()?;

    let mut rank_table = [0 as Seqpos; 256];
    let mut buf = [0u8; 8192];
    let mut pos: Seqpos = 0;

    loop {
        let bytes_read = bwt.read(&mut buf)?;
        if bytes_read == 0 {
            break;
        }

        for &expected in &buf[..bytes_read] {
            let found = seq_idx.get(pos, &mut hint)?;
            if found != expected {
                return Err(Error::SymbolMismatch {
                    pos,
                    expected,
                    found,
                });
            }

            rank_table[expected as usize] += 1;
            let rank_expected = rank_table[expected as usize];
            let rank_found = seq_idx.rank(expected, pos, &mut hint)?;
            if rank_found != rank_expected {
                return Err(Error::RankMismatch {
                    pos,
                    expected: rank_expected,
                    found: rank_found,
                });
            }

            pos += 1;
            if tick_every != 0 && pos as u64 % tick_every == 0 {
                tracing::debug!(pos, "integrity verification progress");
            }
        }
    }

    if pos != seq_idx.len() {
        return Err(Error::corrupt(format!(
            "BWT stream ended at position {pos}, index claims length {}",
            seq_idx.len()
        )));
    }

    Ok(())
}
