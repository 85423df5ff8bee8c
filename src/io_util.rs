//! Little-endian primitive readers and writers for the on-disk index parts.
//!
//! The format is defined as little-endian on every platform, so all integer
//! traffic goes through these helpers instead of native-width casts.

use crate::Seqpos;

use std::io::{self, Read, Write};

pub(crate) const SEQPOS_BYTES: usize = size_of::<Seqpos>();

pub(crate) fn write_u16(writer: &mut impl Write, value: u16) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

pub(crate) fn write_u32(writer: &mut impl Write, value: u32) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

pub(crate) fn write_u64(writer: &mut impl Write, value: u64) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

pub(crate) fn write_seqpos(writer: &mut impl Write, value: Seqpos) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

pub(crate) fn read_u8(reader: &mut impl Read) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf)?;
    Ok(buf[0])
}

pub(crate) fn read_u16(reader: &mut impl Read) -> io::Result<u16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

pub(crate) fn read_u32(reader: &mut impl Read) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

pub(crate) fn read_u64(reader: &mut impl Read) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

pub(crate) fn read_seqpos(reader: &mut impl Read) -> io::Result<Seqpos> {
    let mut buf = [0u8; SEQPOS_BYTES];
    reader.read_exact(&mut buf)?;
    Ok(Seqpos::from_le_bytes(buf))
}

/// Reads as many bytes as available into `buf`, zero-filling the remainder on
/// a short read. Used when a fixed-size window may extend past the end of a
/// payload section.
pub(crate) fn read_allowing_short(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    buf[filled..].fill(0);
    Ok(filled)
}
