use super::chunk_header::{ChunkHeader, HeaderType, MAX_INITIAL_TIMESTAMP};
use super::packet::{PacketType, RtmpPacket};
use crate::chunk_io::ChunkDeserializationError;
use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use bytes::BytesMut;
use std::cmp::min;
use std::collections::HashMap;
use std::io::Read;
use tracing::{debug, trace};

const INITIAL_MAX_CHUNK_SIZE: usize = 128;
const LARGEST_MAX_CHUNK_SIZE: usize = 2147483647;

/// A message whose chunks have only partially arrived
struct InProgressPacket {
    header_type: HeaderType,
    body: BytesMut,
    body_size: usize,
}

impl InProgressPacket {
    fn is_ready(&self) -> bool {
        self.body.len() == self.body_size
    }
}

/// Reads RTMP chunks from a blocking transport and reassembles them into packets.
///
/// Due to the nature of the RTMP chunk protocol it is required that every byte going through the
/// wire is read by the same `ChunkDeserializer` instance, as future chunks can rely on previous
/// chunks, so any chunks missing from the stream may cause deserialization errors.
pub struct ChunkDeserializer {
    max_chunk_size: usize,
    previous_headers: HashMap<u32, ChunkHeader>,
    in_progress: HashMap<u32, InProgressPacket>,
}

impl ChunkDeserializer {
    /// Create a new `ChunkDeserializer` with its initial properties.
    ///
    /// Per the RTMP specification an initial `ChunkDeserializer` is expecting RTMP chunks with
    /// a max size of 128 bytes.
    pub fn new() -> ChunkDeserializer {
        ChunkDeserializer {
            max_chunk_size: INITIAL_MAX_CHUNK_SIZE,
            previous_headers: HashMap::new(),
            in_progress: HashMap::new(),
        }
    }

    /// Tells the deserializer that the peer will start sending RTMP chunks with a different
    /// max chunk size.
    ///
    /// The sender and the receiver must be exactly in tune as to what max chunk size they are
    /// utilizing, so this should be called in reaction to receiving a `SetChunkSize` message and
    /// before the next chunk is read.
    pub fn set_max_chunk_size(&mut self, new_size: usize) -> Result<(), ChunkDeserializationError> {
        if new_size == 0 || new_size > LARGEST_MAX_CHUNK_SIZE {
            return Err(ChunkDeserializationError::InvalidMaxChunkSize {
                chunk_size: new_size,
            });
        }

        self.max_chunk_size = new_size;
        Ok(())
    }

    /// Returns the maximum size of any RTMP chunks that should be received
    pub fn get_max_chunk_size(&self) -> usize {
        self.max_chunk_size
    }

    /// Discards the partially received message on the chunk stream, as requested by an
    /// `Abort` message from the peer.
    pub fn abort(&mut self, csid: u32) {
        if self.in_progress.remove(&csid).is_some() {
            debug!(csid, "Partial message aborted by peer");
        }
    }

    /// Returns how many body bytes have been received so far, and how many are expected, for
    /// the message currently being reassembled on the chunk stream.
    pub fn pending_body(&self, csid: u32) -> Option<(usize, usize)> {
        self.in_progress
            .get(&csid)
            .map(|packet| (packet.body.len(), packet.body_size))
    }

    /// Reads chunks until one completes a packet
    pub fn read_packet<R: Read>(
        &mut self,
        reader: &mut R,
    ) -> Result<RtmpPacket, ChunkDeserializationError> {
        loop {
            if let Some(packet) = self.read_chunk(reader)? {
                return Ok(packet);
            }
        }
    }

    /// Reads exactly one chunk.  If the chunk completed a packet the packet is returned,
    /// otherwise the chunk's bytes are held until the rest of the packet arrives.
    ///
    /// Any failure to read the full chunk is returned as a `Framing` error, and the
    /// deserializer should not be used again afterwards.
    pub fn read_chunk<R: Read>(
        &mut self,
        reader: &mut R,
    ) -> Result<Option<RtmpPacket>, ChunkDeserializationError> {
        let first_byte = reader.read_u8()?;
        let header_type = HeaderType::from_format(first_byte >> 6);
        let csid = match first_byte & 0b0011_1111 {
            0 => reader.read_u8()? as u32 + 64,
            1 => reader.read_u16::<LittleEndian>()? as u32 + 64,
            x => x as u32,
        };

        let mut header = match header_type {
            HeaderType::Large => ChunkHeader::new(csid),
            _ => match self.previous_headers.get(&csid) {
                Some(header) => header.clone(),
                None => return Err(ChunkDeserializationError::NoPreviousChunkOnStream { csid }),
            },
        };

        // Only type 3 chunks can continue a message, anything else starts a new one
        let continuing = header_type == HeaderType::Minimum && self.in_progress.contains_key(&csid);
        if header_type != HeaderType::Minimum && self.in_progress.remove(&csid).is_some() {
            debug!(csid, "New message started before previous message completed, discarding it");
        }

        let mut timestamp_field = 0;
        if header_type != HeaderType::Minimum {
            timestamp_field = reader.read_u24::<BigEndian>()?;
        }

        if header_type == HeaderType::Large || header_type == HeaderType::Medium {
            header.message_length = reader.read_u24::<BigEndian>()?;
            header.message_type_id = reader.read_u8()?;
        }

        if header_type == HeaderType::Large {
            header.message_stream_id = reader.read_u32::<LittleEndian>()?;
        }

        let extended = match header_type {
            HeaderType::Minimum => header.extended_timestamp,
            _ => timestamp_field == MAX_INITIAL_TIMESTAMP,
        };

        if extended {
            let extended_value = reader.read_u32::<BigEndian>()?;
            if header_type != HeaderType::Minimum {
                timestamp_field = extended_value;
            }
        }

        match header_type {
            HeaderType::Large => {
                header.timestamp = timestamp_field;
                header.timestamp_delta = 0;
            }

            HeaderType::Medium | HeaderType::Small => {
                header.timestamp_delta = timestamp_field;
                header.timestamp = header.timestamp.wrapping_add(timestamp_field);
            }

            HeaderType::Minimum => {
                // The delta only applies once per message, not to every chunk of it
                if !continuing {
                    header.timestamp = header.timestamp.wrapping_add(header.timestamp_delta);
                }
            }
        }

        if header_type != HeaderType::Minimum {
            header.timestamp_field = timestamp_field;
            header.extended_timestamp = extended;
        }

        let max_chunk_size = self.max_chunk_size;
        let body_size = header.message_length as usize;
        let packet = self
            .in_progress
            .entry(csid)
            .or_insert_with(|| InProgressPacket {
                header_type,
                body: BytesMut::with_capacity(body_size),
                body_size,
            });

        let start = packet.body.len();
        let to_read = min(packet.body_size - start, max_chunk_size);
        packet.body.resize(start + to_read, 0);
        reader.read_exact(&mut packet.body[start..])?;

        let ready = packet.is_ready();
        trace!(
            csid,
            read = packet.body.len(),
            size = packet.body_size,
            "Chunk read"
        );

        let packet = if ready {
            self.in_progress.remove(&csid).map(|packet| RtmpPacket {
                header_type: packet.header_type,
                packet_type: PacketType::from_type_id(header.message_type_id),
                channel: csid,
                timestamp: header.timestamp,
                stream_id: header.message_stream_id,
                body: packet.body.freeze(),
            })
        } else {
            None
        };

        self.previous_headers.insert(csid, header);
        Ok(packet)
    }
}

impl Default for ChunkDeserializer {
    fn default() -> Self {
        ChunkDeserializer::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;
    use std::io::Cursor;

    #[test]
    fn can_read_packet_with_type_0_chunk() {
        let mut bytes = vec![0b0000_0011];
        bytes.write_u24::<BigEndian>(72).unwrap();
        bytes.write_u24::<BigEndian>(5).unwrap();
        bytes.write_u8(0x14).unwrap();
        bytes.write_u32::<LittleEndian>(12).unwrap();
        bytes.extend_from_slice(&[1, 2, 3, 4, 5]);

        let mut deserializer = ChunkDeserializer::new();
        let packet = deserializer.read_packet(&mut Cursor::new(bytes)).unwrap();

        assert_eq!(packet.header_type, HeaderType::Large);
        assert_eq!(packet.packet_type, PacketType::Invoke);
        assert_eq!(packet.channel, 3);
        assert_eq!(packet.timestamp, 72);
        assert_eq!(packet.stream_id, 12);
        assert_eq!(&packet.body[..], &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn relative_timestamps_become_absolute() {
        let mut bytes = vec![0b0000_0100];
        bytes.write_u24::<BigEndian>(1000).unwrap();
        bytes.write_u24::<BigEndian>(1).unwrap();
        bytes.write_u8(0x08).unwrap();
        bytes.write_u32::<LittleEndian>(1).unwrap();
        bytes.push(9);

        // type 1: delta of 20, new length
        bytes.push(0b0100_0100);
        bytes.write_u24::<BigEndian>(20).unwrap();
        bytes.write_u24::<BigEndian>(2).unwrap();
        bytes.write_u8(0x08).unwrap();
        bytes.extend_from_slice(&[7, 7]);

        // type 2: delta of 30
        bytes.push(0b1000_0100);
        bytes.write_u24::<BigEndian>(30).unwrap();
        bytes.extend_from_slice(&[8, 8]);

        // type 3: reuses the delta of 30
        bytes.push(0b1100_0100);
        bytes.extend_from_slice(&[6, 6]);

        let mut cursor = Cursor::new(bytes);
        let mut deserializer = ChunkDeserializer::new();
        let timestamps: Vec<u32> = (0..4)
            .map(|_| deserializer.read_packet(&mut cursor).unwrap().timestamp)
            .collect();

        assert_eq!(timestamps, vec![1000, 1020, 1050, 1080]);
    }

    #[test]
    fn packet_split_across_chunks_reassembles() {
        let body: Vec<u8> = (0..300).map(|x| x as u8).collect();

        let mut bytes = vec![0b0000_0101];
        bytes.write_u24::<BigEndian>(5).unwrap();
        bytes.write_u24::<BigEndian>(300).unwrap();
        bytes.write_u8(0x09).unwrap();
        bytes.write_u32::<LittleEndian>(1).unwrap();
        bytes.extend_from_slice(&body[..128]);
        bytes.push(0b1100_0101);
        bytes.extend_from_slice(&body[128..256]);
        bytes.push(0b1100_0101);
        bytes.extend_from_slice(&body[256..]);

        let mut cursor = Cursor::new(bytes);
        let mut deserializer = ChunkDeserializer::new();

        assert_eq!(deserializer.read_chunk(&mut cursor).unwrap(), None);
        assert_eq!(deserializer.pending_body(5), Some((128, 300)));
        assert_eq!(deserializer.read_chunk(&mut cursor).unwrap(), None);
        assert_eq!(deserializer.pending_body(5), Some((256, 300)));

        let packet = deserializer.read_chunk(&mut cursor).unwrap().unwrap();
        assert_eq!(&packet.body[..], &body[..]);
        assert_eq!(packet.timestamp, 5, "continuation chunks must not re-apply the delta");
        assert_eq!(deserializer.pending_body(5), None);
    }

    #[test]
    fn interleaved_channels_reassemble_independently() {
        let mut bytes = vec![0b0000_0100];
        bytes.write_u24::<BigEndian>(0).unwrap();
        bytes.write_u24::<BigEndian>(130).unwrap();
        bytes.write_u8(0x08).unwrap();
        bytes.write_u32::<LittleEndian>(1).unwrap();
        bytes.extend_from_slice(&[1; 128]);

        bytes.push(0b0000_0110);
        bytes.write_u24::<BigEndian>(0).unwrap();
        bytes.write_u24::<BigEndian>(3).unwrap();
        bytes.write_u8(0x09).unwrap();
        bytes.write_u32::<LittleEndian>(1).unwrap();
        bytes.extend_from_slice(&[2, 2, 2]);

        bytes.push(0b1100_0100);
        bytes.extend_from_slice(&[1, 1]);

        let mut cursor = Cursor::new(bytes);
        let mut deserializer = ChunkDeserializer::new();

        let video = deserializer.read_packet(&mut cursor).unwrap();
        assert_eq!(video.packet_type, PacketType::Video);
        assert_eq!(video.channel, 6);

        let audio = deserializer.read_packet(&mut cursor).unwrap();
        assert_eq!(audio.packet_type, PacketType::Audio);
        assert_eq!(audio.body.len(), 130);
    }

    #[test]
    fn can_read_extended_timestamp() {
        let mut bytes = vec![0b0000_0011];
        bytes.write_u24::<BigEndian>(0xFFFFFF).unwrap();
        bytes.write_u24::<BigEndian>(1).unwrap();
        bytes.write_u8(0x14).unwrap();
        bytes.write_u32::<LittleEndian>(0).unwrap();
        bytes.write_u32::<BigEndian>(0x0100_0000).unwrap();
        bytes.push(1);

        let mut deserializer = ChunkDeserializer::new();
        let packet = deserializer.read_packet(&mut Cursor::new(bytes)).unwrap();

        assert_eq!(packet.timestamp, 0x0100_0000);
    }

    #[test]
    fn type_3_chunk_repeats_extended_timestamp() {
        let mut bytes = vec![0b0000_0011];
        bytes.write_u24::<BigEndian>(0xFFFFFF).unwrap();
        bytes.write_u24::<BigEndian>(130).unwrap();
        bytes.write_u8(0x14).unwrap();
        bytes.write_u32::<LittleEndian>(0).unwrap();
        bytes.write_u32::<BigEndian>(0x0200_0000).unwrap();
        bytes.extend_from_slice(&[0; 128]);
        bytes.push(0b1100_0011);
        bytes.write_u32::<BigEndian>(0x0200_0000).unwrap();
        bytes.extend_from_slice(&[1, 1]);

        let mut deserializer = ChunkDeserializer::new();
        let packet = deserializer.read_packet(&mut Cursor::new(bytes)).unwrap();

        assert_eq!(packet.timestamp, 0x0200_0000);
        assert_eq!(&packet.body[128..], &[1, 1]);
    }

    #[test]
    fn can_read_two_and_three_byte_chunk_stream_ids() {
        let mut bytes = vec![0b0000_0000, 100 - 64];
        bytes.write_u24::<BigEndian>(0).unwrap();
        bytes.write_u24::<BigEndian>(1).unwrap();
        bytes.write_u8(0x08).unwrap();
        bytes.write_u32::<LittleEndian>(0).unwrap();
        bytes.push(1);

        bytes.push(0b0000_0001);
        bytes.write_u16::<LittleEndian>(1000 - 64).unwrap();
        bytes.write_u24::<BigEndian>(0).unwrap();
        bytes.write_u24::<BigEndian>(1).unwrap();
        bytes.write_u8(0x08).unwrap();
        bytes.write_u32::<LittleEndian>(0).unwrap();
        bytes.push(1);

        let mut cursor = Cursor::new(bytes);
        let mut deserializer = ChunkDeserializer::new();

        assert_eq!(deserializer.read_packet(&mut cursor).unwrap().channel, 100);
        assert_eq!(deserializer.read_packet(&mut cursor).unwrap().channel, 1000);
    }

    #[test]
    fn larger_chunk_size_reads_bigger_chunks() {
        let mut bytes = vec![0b0000_0011];
        bytes.write_u24::<BigEndian>(0).unwrap();
        bytes.write_u24::<BigEndian>(200).unwrap();
        bytes.write_u8(0x08).unwrap();
        bytes.write_u32::<LittleEndian>(0).unwrap();
        bytes.extend_from_slice(&[3; 200]);

        let mut deserializer = ChunkDeserializer::new();
        deserializer.set_max_chunk_size(4096).unwrap();
        let packet = deserializer.read_chunk(&mut Cursor::new(bytes)).unwrap();

        assert_eq!(packet.map(|p| p.body.len()), Some(200));
    }

    #[test]
    fn zero_length_packet_is_ready_immediately() {
        let mut bytes = vec![0b0000_0011];
        bytes.write_u24::<BigEndian>(0).unwrap();
        bytes.write_u24::<BigEndian>(0).unwrap();
        bytes.write_u8(0x14).unwrap();
        bytes.write_u32::<LittleEndian>(0).unwrap();

        let mut deserializer = ChunkDeserializer::new();
        let packet = deserializer.read_chunk(&mut Cursor::new(bytes)).unwrap();

        assert!(packet.unwrap().body.is_empty());
    }

    #[test]
    fn error_when_type_1_chunk_arrives_first() {
        let bytes = vec![0b0100_0011, 0, 0, 0, 0, 0, 1, 0x14, 5];

        let mut deserializer = ChunkDeserializer::new();
        match deserializer.read_chunk(&mut Cursor::new(bytes)) {
            Err(ChunkDeserializationError::NoPreviousChunkOnStream { csid: 3 }) => (),
            x => panic!("Expected NoPreviousChunkOnStream, instead received {:?}", x),
        }
    }

    #[test]
    fn short_read_is_a_framing_error() {
        let mut bytes = vec![0b0000_0011];
        bytes.write_u24::<BigEndian>(0).unwrap();
        bytes.write_u24::<BigEndian>(50).unwrap();
        bytes.write_u8(0x14).unwrap();
        bytes.write_u32::<LittleEndian>(0).unwrap();
        bytes.extend_from_slice(&[1; 10]);

        let mut deserializer = ChunkDeserializer::new();
        match deserializer.read_packet(&mut Cursor::new(bytes)) {
            Err(ChunkDeserializationError::Framing(_)) => (),
            x => panic!("Expected Framing, instead received {:?}", x),
        }
    }

    #[test]
    fn abort_discards_partial_message() {
        let mut bytes = vec![0b0000_0100];
        bytes.write_u24::<BigEndian>(0).unwrap();
        bytes.write_u24::<BigEndian>(200).unwrap();
        bytes.write_u8(0x08).unwrap();
        bytes.write_u32::<LittleEndian>(1).unwrap();
        bytes.extend_from_slice(&[1; 128]);

        let mut deserializer = ChunkDeserializer::new();
        deserializer.read_chunk(&mut Cursor::new(bytes)).unwrap();
        deserializer.abort(4);

        assert_eq!(deserializer.pending_body(4), None);
    }

    #[test]
    fn invalid_chunk_sizes_are_rejected() {
        let mut deserializer = ChunkDeserializer::new();

        assert!(deserializer.set_max_chunk_size(0).is_err());
        assert!(deserializer.set_max_chunk_size(2147483648).is_err());
        assert_eq!(deserializer.get_max_chunk_size(), 128);
    }
}
