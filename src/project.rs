//! The on-disk project bundle the index is built from.
//!
//! A project named `foo` consists of `foo.bwt`, the BWT of the indexed
//! sequence as a plain byte stream, and optionally `foo.suf`, the matching
//! suffix table as little-endian positions (only read when locate sampling is
//! requested). Both are produced by external tooling; this crate only
//! consumes them and writes the index itself to `foo.bdx`.

use crate::error::{Error, Result};
use crate::io_util;
use crate::{Seqpos, io_util::SEQPOS_BYTES};

use std::ffi::OsString;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Clone, Debug)]
pub struct Project {
    base: PathBuf,
}

impl Project {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    fn path_with_suffix(&self, suffix: &str) -> PathBuf {
        let mut name = OsString::from(self.base.as_os_str());
        name.push(suffix);
        PathBuf::from(name)
    }

    /// Path of the BWT byte stream.
    pub fn bwt_path(&self) -> PathBuf {
        self.path_with_suffix(".bwt")
    }

    /// Path of the suffix table.
    pub fn suffix_table_path(&self) -> PathBuf {
        self.path_with_suffix(".suf")
    }

    /// Path of the block-compressed index this crate maintains.
    pub fn index_path(&self) -> PathBuf {
        self.path_with_suffix(".bdx")
    }

    /// Length of the indexed sequence, taken from the BWT stream size.
    pub fn sequence_length(&self) -> Result<Seqpos> {
        let len = std::fs::metadata(self.bwt_path())?.len();
        Seqpos::try_from(len)
            .map_err(|_| Error::config("BWT stream too long for the configured position width"))
    }

    pub fn open_bwt(&self) -> Result<BufReader<File>> {
        Ok(BufReader::new(File::open(self.bwt_path())?))
    }

    /// Opens the suffix table and checks that it covers the whole sequence.
    pub fn open_suffix_table(&self, sequence_length: Seqpos) -> Result<SuffixTableReader> {
        let path = self.suffix_table_path();
        let expected = sequence_length as u64 * SEQPOS_BYTES as u64;
        let actual = std::fs::metadata(&path)?.len();
        if actual != expected {
            return Err(Error::config(format!(
                "suffix table {} has {actual} bytes, expected {expected}",
                path.display()
            )));
        }

        Ok(SuffixTableReader {
            reader: BufReader::new(File::open(path)?),
        })
    }
}

/// Streams suffix-table entries in BWT row order.
pub struct SuffixTableReader {
    reader: BufReader<File>,
}

impl SuffixTableReader {
    pub fn next_position(&mut self) -> Result<Seqpos> {
        Ok(io_util::read_seqpos(&mut self.reader)?)
    }
}

/// Writes a suffix table in the project format. Meant for tooling and tests;
/// index construction itself never produces one.
pub fn write_suffix_table(path: &Path, suffix_table: &[Seqpos]) -> Result<()> {
    let mut file = BufWriter::new(File::create(path)?);
    for &position in suffix_table {
        io_util::write_seqpos(&mut file, position)?;
    }
    Ok(file.flush()?)
}
