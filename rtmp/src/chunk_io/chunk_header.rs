use byteorder::{LittleEndian, WriteBytesExt};
use std::io::{self, Write};

/// Largest value the 3 byte timestamp field can carry before an extended timestamp is needed
pub const MAX_INITIAL_TIMESTAMP: u32 = 0x00FF_FFFF;

/// How much of the chunk message header is present on the wire
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum HeaderType {
    Large,   // Format 0, 11 bytes
    Medium,  // Format 1, 7 bytes
    Small,   // Format 2, 3 bytes
    Minimum, // Format 3, no message header
}

impl HeaderType {
    pub fn from_format(format: u8) -> HeaderType {
        match format & 0b11 {
            0 => HeaderType::Large,
            1 => HeaderType::Medium,
            2 => HeaderType::Small,
            _ => HeaderType::Minimum,
        }
    }

    pub fn format(self) -> u8 {
        match self {
            HeaderType::Large => 0,
            HeaderType::Medium => 1,
            HeaderType::Small => 2,
            HeaderType::Minimum => 3,
        }
    }
}

/// Header fields remembered per chunk stream, so compressed headers can be expanded (inbound)
/// or produced (outbound)
#[derive(Clone, Debug, PartialEq)]
pub struct ChunkHeader {
    pub chunk_stream_id: u32,

    /// Absolute timestamp of the message
    pub timestamp: u32,

    /// Delta applied by the last medium/small header, zero after a large header
    pub timestamp_delta: u32,

    /// The full value the last timestamp field conveyed (absolute for large headers, the delta
    /// otherwise), which is what gets repeated when an extended timestamp is in use
    pub timestamp_field: u32,

    pub message_length: u32,
    pub message_type_id: u8,
    pub message_stream_id: u32,
    pub extended_timestamp: bool,
}

impl ChunkHeader {
    pub fn new(chunk_stream_id: u32) -> ChunkHeader {
        ChunkHeader {
            chunk_stream_id,
            timestamp: 0,
            timestamp_delta: 0,
            timestamp_field: 0,
            message_length: 0,
            message_type_id: 0,
            message_stream_id: 0,
            extended_timestamp: false,
        }
    }
}

/// Writes the 1 to 3 byte basic header.  Chunk stream ids 0 and 1 are reserved as markers for
/// the longer forms, so the caller must have validated `csid` is between 2 and 65599.
pub fn write_basic_header<W: Write>(
    bytes: &mut W,
    header_type: HeaderType,
    csid: u32,
) -> io::Result<()> {
    let format_mask = header_type.format() << 6;
    match csid {
        x if x <= 63 => bytes.write_u8(format_mask | x as u8),
        x if x <= 319 => {
            bytes.write_u8(format_mask)?;
            bytes.write_u8((x - 64) as u8)
        }

        x => {
            bytes.write_u8(format_mask | 1)?;
            bytes.write_u16::<LittleEndian>((x - 64) as u16)
        }
    }
}
