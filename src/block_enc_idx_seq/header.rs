//! The `.bdx` header: a magic, a total length and a sequence of tagged
//! fields, every integer little-endian.

use crate::error::{Error, Result};
use crate::io_util;

use std::io::{Read, Write};

pub(crate) const BDX_MAGIC: [u8; 4] = *b"BDX\0";

const BKSZ_HEADER_FIELD: u32 = 0x424b_535a;
const BBLK_HEADER_FIELD: u32 = 0x4242_4c4b;
const VOFF_HEADER_FIELD: u32 = 0x564f_4646;
const ROFF_HEADER_FIELD: u32 = 0x524f_4646;
const NMRN_HEADER_FIELD: u32 = 0x4e4d_524e;
const LOCT_HEADER_FIELD: u32 = 0x4c4f_4354;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Header {
    pub(crate) block_size: u32,
    pub(crate) bucket_blocks: u32,
    pub(crate) var_data_pos: u64,
    pub(crate) range_enc_pos: u64,
    pub(crate) modes: Vec<u32>,
    pub(crate) locate_pos: Option<u64>,
}

impl Header {
    pub(crate) fn length(&self) -> u64 {
        header_length(self.modes.len(), self.locate_pos.is_some())
    }

    pub(crate) fn write_to(&self, writer: &mut impl Write) -> Result<()> {
        writer.write_all(&BDX_MAGIC)?;
        io_util::write_u32(writer, self.length() as u32)?;

        io_util::write_u32(writer, BKSZ_HEADER_FIELD)?;
        io_util::write_u32(writer, self.block_size)?;
        io_util::write_u32(writer, BBLK_HEADER_FIELD)?;
        io_util::write_u32(writer, self.bucket_blocks)?;
        io_util::write_u32(writer, VOFF_HEADER_FIELD)?;
        io_util::write_u64(writer, self.var_data_pos)?;
        io_util::write_u32(writer, ROFF_HEADER_FIELD)?;
        io_util::write_u64(writer, self.range_enc_pos)?;

        io_util::write_u32(writer, NMRN_HEADER_FIELD)?;
        io_util::write_u32(writer, self.modes.len() as u32)?;
        for &mode in &self.modes {
            io_util::write_u32(writer, mode)?;
        }

        if let Some(locate_pos) = self.locate_pos {
            io_util::write_u32(writer, LOCT_HEADER_FIELD)?;
            io_util::write_u64(writer, locate_pos)?;
        }

        Ok(())
    }

    pub(crate) fn read_from(reader: &mut impl Read) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != BDX_MAGIC {
            return Err(Error::corrupt("missing BDX magic"));
        }

        let header_len = io_util::read_u32(reader)? as u64;

        let mut block_size = None;
        let mut bucket_blocks = None;
        let mut var_data_pos = None;
        let mut range_enc_pos = None;
        let mut modes = None;
        let mut locate_pos = None;

        let mut offset = 8u64;
        while offset < header_len {
            let tag = io_util::read_u32(reader)?;
            offset += 4;
            match tag {
                BKSZ_HEADER_FIELD => {
                    block_size = Some(io_util::read_u32(reader)?);
                    offset += 4;
                }
                BBLK_HEADER_FIELD => {
                    bucket_blocks = Some(io_util::read_u32(reader)?);
                    offset += 4;
                }
                VOFF_HEADER_FIELD => {
                    var_data_pos = Some(io_util::read_u64(reader)?);
                    offset += 8;
                }
                ROFF_HEADER_FIELD => {
                    range_enc_pos = Some(io_util::read_u64(reader)?);
                    offset += 8;
                }
                NMRN_HEADER_FIELD => {
                    let num_modes = io_util::read_u32(reader)?;
                    offset += 4;
                    let mut mode_values = Vec::with_capacity(num_modes as usize);
                    for _ in 0..num_modes {
                        mode_values.push(io_util::read_u32(reader)?);
                        offset += 4;
                    }
                    modes = Some(mode_values);
                }
                LOCT_HEADER_FIELD => {
                    locate_pos = Some(io_util::read_u64(reader)?);
                    offset += 8;
                }
                unknown => {
                    return Err(Error::config(format!(
                        "unknown header field 0x{unknown:08x}"
                    )));
                }
            }
        }
        if offset != header_len {
            return Err(Error::corrupt("header fields overrun the header length"));
        }

        let header = Header {
            block_size: block_size.ok_or_else(|| Error::corrupt("header lacks block size"))?,
            bucket_blocks: bucket_blocks
                .ok_or_else(|| Error::corrupt("header lacks super-bucket size"))?,
            var_data_pos: var_data_pos
                .ok_or_else(|| Error::corrupt("header lacks var stream offset"))?,
            range_enc_pos: range_enc_pos
                .ok_or_else(|| Error::corrupt("header lacks range encoding offset"))?,
            modes: modes.ok_or_else(|| Error::corrupt("header lacks the NMRN section"))?,
            locate_pos,
        };

        if header.block_size == 0 {
            return Err(Error::config("block size 0"));
        }
        if header.bucket_blocks == 0 {
            return Err(Error::corrupt("super-bucket of 0 blocks"));
        }

        Ok(header)
    }
}

pub(crate) fn header_length(num_modes: usize, has_locate: bool) -> u64 {
    4                           // BDX identifier
        + 4                     // length field
        + 8                     // block size
        + 8                     // blocks per bucket
        + 12                    // offset of variable width data
        + 12                    // offset of range encodings
        + 4 + 4                 // num modes
        + 4 * num_modes as u64  // one u32 for every mode
        + if has_locate { 12 } else { 0 }
}
