//! Segment header and frame encoding.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use spillway_common::types::Tuple;
use spillway_common::utils::error::{Error, Result};

use crate::codec::SpillCodec;

/// Identifies a spill segment file.
pub(crate) const MAGIC: [u8; 8] = *b"SPWSEG01";

/// Size of the uncompressed header in bytes.
pub(crate) const HEADER_LEN: u64 = 24;

/// Largest frame payload a reader will allocate for.
const MAX_FRAME_LEN: u32 = 256 * 1024 * 1024;

/// Fixed-size segment header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SegmentHeader {
    pub codec: Option<SpillCodec>,
    pub tuple_count: u64,
}

impl SegmentHeader {
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&MAGIC)?;
        w.write_u8(self.codec.map_or(0, |c| c.tag()))?;
        w.write_all(&[0u8; 7])?;
        w.write_u64::<LittleEndian>(self.tuple_count)
    }

    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let mut magic = [0u8; 8];
        r.read_exact(&mut magic).map_err(read_error)?;
        if magic != MAGIC {
            return Err(Error::Corruption("bad segment magic".to_string()));
        }

        let tag = r.read_u8().map_err(read_error)?;
        let codec = SpillCodec::from_tag(tag)
            .ok_or_else(|| Error::Corruption(format!("unknown codec tag {tag}")))?;

        let mut reserved = [0u8; 7];
        r.read_exact(&mut reserved).map_err(read_error)?;
        let tuple_count = r.read_u64::<LittleEndian>().map_err(read_error)?;

        Ok(Self { codec, tuple_count })
    }
}

/// Writes one tuple as a checksummed frame, reusing `scratch` for the
/// encoded payload. Returns the number of bytes handed to `w`.
pub(crate) fn write_frame<W: Write>(w: &mut W, tuple: &Tuple, scratch: &mut Vec<u8>) -> Result<usize> {
    scratch.clear();
    bincode::serde::encode_into_std_write(tuple, scratch, bincode::config::standard())
        .map_err(|e| Error::Serialization(e.to_string()))?;

    let len = u32::try_from(scratch.len())
        .ok()
        .filter(|len| *len <= MAX_FRAME_LEN)
        .ok_or_else(|| Error::Serialization(format!("tuple too large: {} bytes", scratch.len())))?;

    w.write_u32::<LittleEndian>(len)?;
    w.write_all(scratch)?;
    w.write_u32::<LittleEndian>(crc32fast::hash(scratch))?;

    Ok(scratch.len() + 8)
}

/// Reads and verifies one frame.
pub(crate) fn read_frame<R: Read>(r: &mut R, scratch: &mut Vec<u8>) -> Result<Tuple> {
    let len = r.read_u32::<LittleEndian>().map_err(read_error)?;
    if len > MAX_FRAME_LEN {
        return Err(Error::Corruption(format!("frame length {len} out of range")));
    }

    scratch.resize(len as usize, 0);
    r.read_exact(scratch).map_err(read_error)?;

    let stored = r.read_u32::<LittleEndian>().map_err(read_error)?;
    if stored != crc32fast::hash(scratch) {
        return Err(Error::Corruption("frame checksum mismatch".to_string()));
    }

    let (tuple, _) = bincode::serde::decode_from_slice(scratch, bincode::config::standard())
        .map_err(|e| Error::Serialization(e.to_string()))?;
    Ok(tuple)
}

/// Short reads and undecodable compressed data mean the segment is damaged;
/// anything else is an I/O failure of the backing store.
fn read_error(e: io::Error) -> Error {
    match e.kind() {
        io::ErrorKind::UnexpectedEof | io::ErrorKind::InvalidData => {
            Error::Corruption(format!("truncated or undecodable segment: {e}"))
        }
        _ => Error::SpillIo(e),
    }
}
