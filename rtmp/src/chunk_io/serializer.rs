use super::chunk_header::{write_basic_header, ChunkHeader, HeaderType, MAX_INITIAL_TIMESTAMP};
use super::packet::RtmpPacket;
use crate::chunk_io::{ChunkSerializationError, CONTROL_CHANNEL};
use crate::messages::RtmpMessage;
use byteorder::{BigEndian, LittleEndian, WriteBytesExt};
use std::cmp::min;
use std::collections::HashMap;

const INITIAL_MAX_CHUNK_SIZE: u32 = 128;
const LARGEST_MAX_CHUNK_SIZE: u32 = 2147483647;
const MAX_MESSAGE_LENGTH: usize = 16777215;
const MAX_CHUNK_STREAM_ID: u32 = 65599;

/// Allows serializing RTMP packets into RTMP chunks.
///
/// Due to the nature of the RTMP chunking protocol, the same serializer should be used
/// for all packets that need to be sent to the same peer.
pub struct ChunkSerializer {
    previous_headers: HashMap<u32, ChunkHeader>,
    max_chunk_size: u32,
}

impl ChunkSerializer {
    /// Creates a new `ChunkSerializer`.
    ///
    /// By default (per the RTMP specification) the serializer will break any message into RTMP
    /// chunks with a max size of 128.  To change this amount a call to `set_max_chunk_size()` is
    /// required.
    pub fn new() -> ChunkSerializer {
        ChunkSerializer {
            max_chunk_size: INITIAL_MAX_CHUNK_SIZE,
            previous_headers: HashMap::new(),
        }
    }

    /// Changes the maximum amount of bytes from RTMP messages that can be in a single RTMP chunk.
    ///
    /// Changing the maximum chunk size requires notifying the receiver of the change, as it will
    /// affect every chunk you send out from here on out.  Therefore, when this method is called
    /// we automatically serialize a `SetChunkSize` RTMP message to be sent to the peer.  These
    /// bytes *must* be sent and cannot be ignored.
    pub fn set_max_chunk_size(
        &mut self,
        new_size: u32,
        timestamp: u32,
    ) -> Result<Vec<u8>, ChunkSerializationError> {
        if new_size == 0 || new_size > LARGEST_MAX_CHUNK_SIZE {
            return Err(ChunkSerializationError::InvalidMaxChunkSize {
                attempted_chunk_size: new_size,
            });
        }

        let packet = RtmpMessage::SetChunkSize { size: new_size }.into_packet(
            CONTROL_CHANNEL,
            timestamp,
            0,
        )?;

        let bytes = self.serialize(&packet, false)?;
        self.max_chunk_size = new_size;
        Ok(bytes)
    }

    pub fn get_max_chunk_size(&self) -> u32 {
        self.max_chunk_size
    }

    /// Turns an RTMP packet into binary data (representing RTMP chunks) that can be sent over
    /// the network.
    ///
    /// The header of the first chunk is compressed against the last packet sent on the same
    /// chunk stream:
    ///
    /// * a large header is used for the first packet on a chunk stream, when the message stream
    ///   id changes, or when the timestamp goes backwards
    /// * a medium header is used when the length or type changed
    /// * a small header is used when only the timestamp delta changed
    /// * no message header at all is used when the delta is the same as the last one
    ///
    /// `force_uncompressed` always uses a large header.  Some servers require the first messages
    /// after the handshake to be sent this way.
    pub fn serialize(
        &mut self,
        packet: &RtmpPacket,
        force_uncompressed: bool,
    ) -> Result<Vec<u8>, ChunkSerializationError> {
        if packet.body.len() > MAX_MESSAGE_LENGTH {
            return Err(ChunkSerializationError::MessageTooLong {
                size: packet.body.len(),
            });
        }

        let csid = packet.channel;
        if csid < 2 || csid > MAX_CHUNK_STREAM_ID {
            return Err(ChunkSerializationError::InvalidChunkStreamId { csid });
        }

        let mut header = ChunkHeader {
            chunk_stream_id: csid,
            timestamp: packet.timestamp,
            timestamp_delta: 0,
            timestamp_field: packet.timestamp,
            message_length: packet.body.len() as u32,
            message_type_id: packet.packet_type.type_id(),
            message_stream_id: packet.stream_id,
            extended_timestamp: false,
        };

        let header_type = match self.previous_headers.get(&csid) {
            None => HeaderType::Large,
            Some(previous) => select_header_type(&mut header, previous, force_uncompressed),
        };

        header.extended_timestamp = header.timestamp_field >= MAX_INITIAL_TIMESTAMP;

        let mut bytes = Vec::with_capacity(packet.body.len() + 18);
        write_basic_header(&mut bytes, header_type, csid)?;

        if header_type != HeaderType::Minimum {
            bytes.write_u24::<BigEndian>(min(header.timestamp_field, MAX_INITIAL_TIMESTAMP))?;
        }

        if header_type == HeaderType::Large || header_type == HeaderType::Medium {
            bytes.write_u24::<BigEndian>(header.message_length)?;
            bytes.write_u8(header.message_type_id)?;
        }

        if header_type == HeaderType::Large {
            bytes.write_u32::<LittleEndian>(header.message_stream_id)?;
        }

        if header.extended_timestamp {
            bytes.write_u32::<BigEndian>(header.timestamp_field)?;
        }

        for (index, slice) in packet.body.chunks(self.max_chunk_size as usize).enumerate() {
            if index > 0 {
                write_basic_header(&mut bytes, HeaderType::Minimum, csid)?;
                if header.extended_timestamp {
                    bytes.write_u32::<BigEndian>(header.timestamp_field)?;
                }
            }

            bytes.extend_from_slice(slice);
        }

        self.previous_headers.insert(csid, header);
        Ok(bytes)
    }
}

impl Default for ChunkSerializer {
    fn default() -> Self {
        ChunkSerializer::new()
    }
}

fn select_header_type(
    header: &mut ChunkHeader,
    previous: &ChunkHeader,
    force_uncompressed: bool,
) -> HeaderType {
    if force_uncompressed
        || previous.message_stream_id != header.message_stream_id
        || header.timestamp < previous.timestamp
    {
        return HeaderType::Large;
    }

    let delta = header.timestamp - previous.timestamp;
    if previous.message_length != header.message_length
        || previous.message_type_id != header.message_type_id
    {
        header.timestamp_delta = delta;
        header.timestamp_field = delta;
        return HeaderType::Medium;
    }

    if delta != previous.timestamp_delta {
        header.timestamp_delta = delta;
        header.timestamp_field = delta;
        return HeaderType::Small;
    }

    // The peer re-applies its stored delta, so the stored header fields carry over unchanged
    header.timestamp_delta = previous.timestamp_delta;
    header.timestamp_field = previous.timestamp_field;
    HeaderType::Minimum
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk_io::{ChunkDeserializer, PacketType};
    use bytes::Bytes;
    use std::io::Cursor;

    fn audio_packet(timestamp: u32, body: Vec<u8>) -> RtmpPacket {
        RtmpPacket::new(4, PacketType::Audio, timestamp, 1, Bytes::from(body))
    }

    #[test]
    fn first_packet_uses_large_header() {
        let mut serializer = ChunkSerializer::new();
        let bytes = serializer
            .serialize(&audio_packet(72, vec![1, 2, 3]), false)
            .unwrap();

        let mut expected = vec![0b0000_0100];
        expected.write_u24::<BigEndian>(72).unwrap();
        expected.write_u24::<BigEndian>(3).unwrap();
        expected.write_u8(0x08).unwrap();
        expected.write_u32::<LittleEndian>(1).unwrap();
        expected.extend_from_slice(&[1, 2, 3]);

        assert_eq!(bytes, expected);
    }

    #[test]
    fn headers_shrink_as_fields_repeat() {
        let mut serializer = ChunkSerializer::new();
        let first = serializer.serialize(&audio_packet(0, vec![1; 10]), false).unwrap();
        let second = serializer.serialize(&audio_packet(20, vec![1; 12]), false).unwrap();
        let third = serializer.serialize(&audio_packet(45, vec![1; 12]), false).unwrap();
        let fourth = serializer.serialize(&audio_packet(70, vec![1; 12]), false).unwrap();

        assert_eq!(first[0] >> 6, 0, "first packet should have a large header");
        assert_eq!(second[0] >> 6, 1, "length change should give a medium header");
        assert_eq!(third[0] >> 6, 2, "delta change should give a small header");
        assert_eq!(fourth[0] >> 6, 3, "same delta should give a minimum header");
        assert_eq!(fourth.len(), 1 + 12);
    }

    #[test]
    fn same_timestamp_after_large_header_is_minimum() {
        let mut serializer = ChunkSerializer::new();
        serializer.serialize(&audio_packet(50, vec![1; 4]), false).unwrap();
        let second = serializer.serialize(&audio_packet(50, vec![2; 4]), false).unwrap();

        assert_eq!(second, vec![0b1100_0100, 2, 2, 2, 2]);
    }

    #[test]
    fn stream_id_change_forces_large_header() {
        let mut serializer = ChunkSerializer::new();
        serializer.serialize(&audio_packet(0, vec![1; 4]), false).unwrap();

        let mut packet = audio_packet(0, vec![1; 4]);
        packet.stream_id = 2;
        let bytes = serializer.serialize(&packet, false).unwrap();

        assert_eq!(bytes[0] >> 6, 0);
    }

    #[test]
    fn force_uncompressed_uses_large_header() {
        let mut serializer = ChunkSerializer::new();
        serializer.serialize(&audio_packet(0, vec![1; 4]), false).unwrap();
        let bytes = serializer.serialize(&audio_packet(0, vec![1; 4]), true).unwrap();

        assert_eq!(bytes[0] >> 6, 0);
    }

    #[test]
    fn long_body_is_split_with_continuation_headers() {
        let body: Vec<u8> = (0..300).map(|x| x as u8).collect();
        let mut serializer = ChunkSerializer::new();
        let bytes = serializer.serialize(&audio_packet(0, body.clone()), false).unwrap();

        assert_eq!(bytes.len(), 12 + 300 + 2);
        assert_eq!(bytes[12 + 128], 0xC4);
        assert_eq!(bytes[12 + 128 + 1 + 128], 0xC4);
        assert_eq!(&bytes[12..140], &body[..128]);
    }

    #[test]
    fn extended_timestamp_is_written_and_repeated() {
        let mut serializer = ChunkSerializer::new();
        let bytes = serializer
            .serialize(&audio_packet(0x0100_0000, vec![5; 130]), false)
            .unwrap();

        assert_eq!(&bytes[1..4], &[0xFF, 0xFF, 0xFF]);
        assert_eq!(&bytes[12..16], &[0x01, 0, 0, 0]);
        assert_eq!(bytes[16 + 128], 0xC4);
        assert_eq!(&bytes[16 + 129..16 + 133], &[0x01, 0, 0, 0]);
    }

    #[test]
    fn set_max_chunk_size_announces_new_size() {
        let mut serializer = ChunkSerializer::new();
        let bytes = serializer.set_max_chunk_size(4096, 0).unwrap();

        let mut expected = vec![0b0000_0010];
        expected.write_u24::<BigEndian>(0).unwrap();
        expected.write_u24::<BigEndian>(4).unwrap();
        expected.write_u8(0x01).unwrap();
        expected.write_u32::<LittleEndian>(0).unwrap();
        expected.write_u32::<BigEndian>(4096).unwrap();

        assert_eq!(bytes, expected);
        assert_eq!(serializer.get_max_chunk_size(), 4096);

        let packet = audio_packet(0, vec![1; 1000]);
        assert_eq!(serializer.serialize(&packet, false).unwrap().len(), 12 + 1000);
    }

    #[test]
    fn reserved_chunk_stream_ids_are_rejected() {
        let mut serializer = ChunkSerializer::new();
        let mut packet = audio_packet(0, vec![1]);
        packet.channel = 1;

        match serializer.serialize(&packet, false) {
            Err(ChunkSerializationError::InvalidChunkStreamId { csid: 1 }) => (),
            x => panic!("Expected InvalidChunkStreamId, instead received {:?}", x),
        }
    }

    #[test]
    fn compressed_sequence_reads_back_identically() {
        let packets = vec![
            audio_packet(0, vec![1; 200]),
            audio_packet(0, vec![2; 200]),
            audio_packet(23, vec![3; 200]),
            audio_packet(46, vec![4; 200]),
            audio_packet(69, vec![5; 50]),
            audio_packet(69, vec![6; 50]),
            audio_packet(0x0100_0000, vec![7; 300]),
            audio_packet(0x0100_0010, vec![8; 300]),
            audio_packet(0x0100_0020, vec![9; 300]),
        ];

        let mut serializer = ChunkSerializer::new();
        let mut bytes = Vec::new();
        for packet in &packets {
            bytes.extend(serializer.serialize(packet, false).unwrap());
        }

        let mut deserializer = ChunkDeserializer::new();
        let mut cursor = Cursor::new(bytes);
        for expected in &packets {
            let packet = deserializer.read_packet(&mut cursor).unwrap();
            assert_eq!(packet.timestamp, expected.timestamp);
            assert_eq!(packet.stream_id, expected.stream_id);
            assert_eq!(packet.packet_type, expected.packet_type);
            assert_eq!(packet.body, expected.body);
        }
    }
}
