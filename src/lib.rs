/*! A block-composition compressed, self-indexed representation of the
 * Burrows-Wheeler transform of a long symbol sequence.
 *
 * The sequence is cut into fixed-size blocks, each stored as a pair of
 * indices into precomputed enumeration tables: one for the block's symbol
 * composition, one for the permutation realizing it. Super-buckets carry
 * cumulative symbol counts, so `rank` queries run in constant time and `get`
 * in near-constant time against an externalized on-disk index. A BWT layer
 * on top composes the C-table with rank into the standard backward search.
 *
 * The index is built from a *project*: a pre-computed BWT byte stream (and,
 * for locate support, a suffix table) produced by external tooling. This
 * crate never sorts suffixes itself.
 *
 * ## Usage
 *
 * ```
 * use blockdex::{BlockEncConfig, Project, RangeStoreMode, alphabet};
 *
 * # fn main() -> blockdex::Result<()> {
 * let dir = tempfile::tempdir().unwrap();
 * let project = Project::new(dir.path().join("example"));
 * std::fs::write(project.bwt_path(), b"gttaacaaggttccaa").unwrap();
 *
 * let seq_idx = BlockEncConfig::new()
 *     .block_size(4)
 *     .construct_index(
 *         &[RangeStoreMode::BlockCompositionInclude],
 *         alphabet::dna(),
 *         &project,
 *     )?;
 *
 * let mut hint = seq_idx.new_hint()?;
 * assert_eq!(seq_idx.get(0, &mut hint)?, b'g');
 * assert_eq!(seq_idx.rank(b'a', 15, &mut hint)?, 6);
 * # Ok(())
 * # }
 * ```
 *
 * Pattern counting and locating go through [`BwtSeq`], which loads or
 * constructs the index for a project and adds the C-table on top. More
 * information about the on-disk layout and the query machinery can be found
 * in the module-level documentation.
 */

/// Contains functions to create commonly used alphabets.
pub mod alphabet;
pub mod bitpack;
pub mod seq_range_list;

mod block_enc_idx_seq;
mod bwt_seq;
mod composition;
mod error;
mod io_util;
mod locate;
mod project;
mod verify;

#[doc(inline)]
pub use alphabet::{MultiRangeAlphabet, SEPARATOR};
#[doc(inline)]
pub use block_enc_idx_seq::{BlockEncConfig, BlockEncIdxSeq, EisHint, RangeStoreMode};
#[doc(inline)]
pub use bwt_seq::{BwtSeq, ExactMatchIter, MatchBound, SeqBaseEncoding};
#[doc(inline)]
pub use error::{Error, Result};
#[doc(inline)]
pub use project::{Project, write_suffix_table};
#[doc(inline)]
pub use verify::verify_integrity;

/// A position in (or length of) an indexed sequence.
///
/// 64 bits wide by default; the `seqpos32` feature switches to 32 bits,
/// which halves the size of the super-bucket count records for sequences
/// below 4 GiB.
#[cfg(not(feature = "seqpos32"))]
pub type Seqpos = u64;

/// A position in (or length of) an indexed sequence.
#[cfg(feature = "seqpos32")]
pub type Seqpos = u32;
