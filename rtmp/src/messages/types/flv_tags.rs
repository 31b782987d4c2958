//! Splitting of aggregate (`FlvTags`) messages.
//!
//! The body of an aggregate message is a run of FLV tags, each laid out as:
//!
//! ```text
//! type:1 | data size:3 | timestamp:3 | timestamp extension:1 | stream id:3 | data | back pointer:4
//! ```

use byteorder::{BigEndian, ByteOrder};
use bytes::Bytes;

use crate::chunk_io::PacketType;
use crate::messages::MessageDeserializationError;

const TAG_HEADER_SIZE: usize = 11;
const BACK_POINTER_SIZE: usize = 4;

/// One tag unpacked from an aggregate message
#[derive(Clone, Debug, PartialEq)]
pub struct FlvTag {
    pub packet_type: PacketType,

    /// The tag's own timestamp.  This is relative to the stream, not to the aggregate message.
    pub timestamp: u32,
    pub data: Bytes,
}

/// Splits an aggregate message body into its tags.  The trailing back pointer of the last tag
/// may be missing.
pub fn parse_flv_tags(data: &Bytes) -> Result<Vec<FlvTag>, MessageDeserializationError> {
    let mut tags = Vec::new();
    let mut offset = 0;

    while offset < data.len() {
        if data.len() - offset < TAG_HEADER_SIZE {
            return Err(MessageDeserializationError::TruncatedFlvTag { offset });
        }

        let header = &data[offset..offset + TAG_HEADER_SIZE];
        let packet_type = PacketType::from_type_id(header[0]);
        let size = BigEndian::read_u24(&header[1..4]) as usize;
        let timestamp = BigEndian::read_u24(&header[4..7]) | (u32::from(header[7]) << 24);

        let data_start = offset + TAG_HEADER_SIZE;
        let data_end = data_start + size;
        if data_end > data.len() {
            return Err(MessageDeserializationError::TruncatedFlvTag { offset });
        }

        tags.push(FlvTag {
            packet_type,
            timestamp,
            data: data.slice(data_start..data_end),
        });

        offset = (data_end + BACK_POINTER_SIZE).min(data.len());
    }

    Ok(tags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;
    use std::io::Write;

    fn write_tag(buffer: &mut Vec<u8>, type_id: u8, timestamp: u32, data: &[u8]) {
        buffer.write_u8(type_id).unwrap();
        buffer.write_u24::<BigEndian>(data.len() as u32).unwrap();
        buffer.write_u24::<BigEndian>(timestamp & 0x00ff_ffff).unwrap();
        buffer.write_u8((timestamp >> 24) as u8).unwrap();
        buffer.write_u24::<BigEndian>(0).unwrap();
        buffer.write_all(data).unwrap();
        buffer
            .write_u32::<BigEndian>((TAG_HEADER_SIZE + data.len()) as u32)
            .unwrap();
    }

    #[test]
    fn splits_mixed_tags() {
        let mut buffer = Vec::new();
        write_tag(&mut buffer, 8, 100, &[0xaf, 1, 2, 3]);
        write_tag(&mut buffer, 9, 120, &[0x17, 0, 9]);
        write_tag(&mut buffer, 0x12, 140, &[5]);

        let tags = parse_flv_tags(&Bytes::from(buffer)).unwrap();

        assert_eq!(tags.len(), 3);
        assert_eq!(tags[0].packet_type, PacketType::Audio);
        assert_eq!(tags[0].timestamp, 100);
        assert_eq!(&tags[0].data[..], &[0xaf, 1, 2, 3]);
        assert_eq!(tags[1].packet_type, PacketType::Video);
        assert_eq!(tags[1].timestamp, 120);
        assert_eq!(tags[2].packet_type, PacketType::Metadata);
        assert_eq!(&tags[2].data[..], &[5]);
    }

    #[test]
    fn timestamp_extension_is_the_high_byte() {
        let mut buffer = Vec::new();
        write_tag(&mut buffer, 8, 0x0100_0002, &[1]);

        let tags = parse_flv_tags(&Bytes::from(buffer)).unwrap();
        assert_eq!(tags[0].timestamp, 0x0100_0002);
    }

    #[test]
    fn last_back_pointer_may_be_missing() {
        let mut buffer = Vec::new();
        write_tag(&mut buffer, 8, 1, &[1, 2]);
        let trimmed = buffer.len() - BACK_POINTER_SIZE;
        buffer.truncate(trimmed);

        let tags = parse_flv_tags(&Bytes::from(buffer)).unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(&tags[0].data[..], &[1, 2]);
    }

    #[test]
    fn truncated_tag_data_is_an_error() {
        let mut buffer = Vec::new();
        write_tag(&mut buffer, 8, 1, &[1, 2, 3, 4, 5]);
        buffer.truncate(TAG_HEADER_SIZE + 2);

        match parse_flv_tags(&Bytes::from(buffer)) {
            Err(MessageDeserializationError::TruncatedFlvTag { offset: 0 }) => (),
            x => panic!("Expected TruncatedFlvTag, got {:?}", x),
        }
    }

    #[test]
    fn empty_body_has_no_tags() {
        assert!(parse_flv_tags(&Bytes::new()).unwrap().is_empty());
    }
}
