use super::chunk_header::HeaderType;
use bytes::Bytes;

/// The RTMP message type carried by a packet
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PacketType {
    SetChunkSize,
    Abort,
    BytesRead,
    Control,
    ServerBandwidth,
    ClientBandwidth,
    Audio,
    Video,
    FlexMessage,
    Metadata,
    Invoke,
    FlvTags,
    Unknown(u8),
}

impl PacketType {
    pub fn from_type_id(type_id: u8) -> PacketType {
        match type_id {
            0x01 => PacketType::SetChunkSize,
            0x02 => PacketType::Abort,
            0x03 => PacketType::BytesRead,
            0x04 => PacketType::Control,
            0x05 => PacketType::ServerBandwidth,
            0x06 => PacketType::ClientBandwidth,
            0x08 => PacketType::Audio,
            0x09 => PacketType::Video,
            0x11 => PacketType::FlexMessage,
            0x12 => PacketType::Metadata,
            0x14 => PacketType::Invoke,
            0x16 => PacketType::FlvTags,
            x => PacketType::Unknown(x),
        }
    }

    pub fn type_id(self) -> u8 {
        match self {
            PacketType::SetChunkSize => 0x01,
            PacketType::Abort => 0x02,
            PacketType::BytesRead => 0x03,
            PacketType::Control => 0x04,
            PacketType::ServerBandwidth => 0x05,
            PacketType::ClientBandwidth => 0x06,
            PacketType::Audio => 0x08,
            PacketType::Video => 0x09,
            PacketType::FlexMessage => 0x11,
            PacketType::Metadata => 0x12,
            PacketType::Invoke => 0x14,
            PacketType::FlvTags => 0x16,
            PacketType::Unknown(x) => x,
        }
    }
}

/// One fully reassembled RTMP message.
///
/// The timestamp is always absolute.  Any relative timestamps on the wire have already been
/// added to the channel's previous timestamp by the time a packet is handed out.
#[derive(Clone, Debug, PartialEq)]
pub struct RtmpPacket {
    /// How much header the first chunk of this packet carried on the wire.  Ignored when
    /// serializing, as the serializer picks the smallest header that conveys the packet.
    pub header_type: HeaderType,
    pub packet_type: PacketType,
    pub channel: u32,
    pub timestamp: u32,
    pub stream_id: u32,
    pub body: Bytes,
}

impl RtmpPacket {
    pub fn new(
        channel: u32,
        packet_type: PacketType,
        timestamp: u32,
        stream_id: u32,
        body: Bytes,
    ) -> RtmpPacket {
        RtmpPacket {
            header_type: HeaderType::Large,
            packet_type,
            channel,
            timestamp,
            stream_id,
            body,
        }
    }

    pub fn body_size(&self) -> usize {
        self.body.len()
    }
}
