use crate::Seqpos;

use std::io;

pub type Result<T> = std::result::Result<T, Error>;

/// All failure kinds of this crate.
///
/// Querying for a symbol outside the alphabet is *not* an error, it yields an
/// empty match. Allocation failure aborts the process, so the out-of-memory
/// cleanup chains of similar C libraries have no counterpart here.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("index i/o failed")]
    Io(#[from] io::Error),

    /// An invalid construction or load request, e.g. block size 0, an
    /// unsupported encoding, or an unknown header field.
    #[error("invalid index configuration: {0}")]
    Config(String),

    /// The on-disk index contradicts itself: bad magic, missing header
    /// sections, or super-bucket arithmetic that does not add up.
    #[error("corrupt index: {0}")]
    CorruptIndex(String),

    /// Integrity verification read a symbol different from the reference
    /// sequence.
    #[error("comparison failed at position {pos}, reference symbol: {expected}, symbol read: {found}")]
    SymbolMismatch { pos: Seqpos, expected: u8, found: u8 },

    /// Integrity verification found a rank count diverging from the running
    /// reference count.
    #[error("at position {pos}, rank operation yielded wrong count: {found}, expected {expected}")]
    RankMismatch {
        pos: Seqpos,
        expected: Seqpos,
        found: Seqpos,
    },
}

impl Error {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        Error::CorruptIndex(msg.into())
    }
}
