/*!
This module contains all the RTMP message types as well as functionality for turning them into
and out of reassembled `RtmpPacket`s.

A packet carries the auxiliary data about a message (which channel and message stream it belongs
to and its timestamp), while the `RtmpMessage` is the decoded body.
*/

mod deserialization_errors;
mod serialization_errors;
mod types;

pub use self::deserialization_errors::MessageDeserializationError;
pub use self::serialization_errors::MessageSerializationError;
pub use self::types::flv_tags::{parse_flv_tags, FlvTag};

use crate::chunk_io::{PacketType, RtmpPacket};
use bytes::Bytes;
use rtmpc_amf0::Amf0Value;

/// The type of bandwidth limiting that is being requested
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum PeerBandwidthLimitType {
    /// Peer should limit its output bandwidth to the indicated window size
    Hard,

    /// The peer should limit it's output bandwidth to the window indicated or the limit
    /// already in effect, whichever is smaller.
    Soft,

    /// If we previously had a hard limit, this limit should be treated as hard.  Otherwise ignore.
    Dynamic,
}

/// Events and notifications carried by `Control` (user control) packets
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum UserControlEventType {
    /// Notifies the client that a stream has become functional
    StreamBegin,

    /// Notifies the client that the playback of data on the stream is over
    StreamEof,

    /// Notifies the client that there is no more data on the stream.
    StreamDry,

    /// Notifies the server of the buffer size (in milliseconds) that the client is using
    SetBufferLength,

    /// Notifies the client that the stream is a recorded stream.
    StreamIsRecorded,

    /// Server sends this to test whether the client is reachable.
    PingRequest,

    /// Client sends this in response to a ping request
    PingResponse,

    /// Server asks the client to prove which SWF it was loaded from
    SwfVerifyRequest,

    /// The client's answer to `SwfVerifyRequest`, carrying the handshake derived response
    SwfVerifyResponse,

    /// Buffer Empty (unofficial name): After the server has sent a complete buffer, and
    /// sends this Buffer Empty message, it will wait until the play
    /// duration of that buffer has passed before sending a new buffer.
    BufferEmpty,

    /// Buffer Ready (unofficial name): sent when the server starts sending the next buffer
    /// after a Buffer Empty.
    BufferReady,

    /// An event id nothing in this crate knows about
    Unknown(u16),
}

impl UserControlEventType {
    pub fn from_event_id(id: u16) -> UserControlEventType {
        match id {
            0 => UserControlEventType::StreamBegin,
            1 => UserControlEventType::StreamEof,
            2 => UserControlEventType::StreamDry,
            3 => UserControlEventType::SetBufferLength,
            4 => UserControlEventType::StreamIsRecorded,
            6 => UserControlEventType::PingRequest,
            7 => UserControlEventType::PingResponse,
            0x1a => UserControlEventType::SwfVerifyRequest,
            0x1b => UserControlEventType::SwfVerifyResponse,
            31 => UserControlEventType::BufferEmpty,
            32 => UserControlEventType::BufferReady,
            x => UserControlEventType::Unknown(x),
        }
    }

    pub fn event_id(self) -> u16 {
        match self {
            UserControlEventType::StreamBegin => 0,
            UserControlEventType::StreamEof => 1,
            UserControlEventType::StreamDry => 2,
            UserControlEventType::SetBufferLength => 3,
            UserControlEventType::StreamIsRecorded => 4,
            UserControlEventType::PingRequest => 6,
            UserControlEventType::PingResponse => 7,
            UserControlEventType::SwfVerifyRequest => 0x1a,
            UserControlEventType::SwfVerifyResponse => 0x1b,
            UserControlEventType::BufferEmpty => 31,
            UserControlEventType::BufferReady => 32,
            UserControlEventType::Unknown(x) => x,
        }
    }
}

/// An enumeration of all types of RTMP messages that are supported
#[derive(PartialEq, Debug, Clone)]
pub enum RtmpMessage {
    /// This type of message is used when an RTMP message is encountered with a type id that
    /// we do not know about
    Unknown { type_id: u8, data: Bytes },

    /// Tells the peer that the maximum chunk size for RTMP chunks it will be sending is changing
    /// to the specified size.
    SetChunkSize { size: u32 },

    /// Notifies the peer that if it is waiting for chunks to complete a message that it should
    /// discard the chunks it has already received.
    Abort { stream_id: u32 },

    /// Acknowledges the total number of bytes received so far.
    BytesRead { sequence_number: u32 },

    /// Notifies the peer of an event, such as a stream being
    /// created or telling the peer how much of a buffer it should have.
    UserControl {
        event_type: UserControlEventType,
        stream_id: Option<u32>,
        buffer_length: Option<u32>,
        timestamp: Option<u32>,
        swf_verification: Option<Bytes>,
    },

    /// Notifies the peer how many bytes should be received before sending a `BytesRead`
    /// message (the window acknowledgement size)
    ServerBandwidth { size: u32 },

    /// Indicates that the peer should limit its output bandwidth
    ClientBandwidth {
        size: u32,
        limit_type: PeerBandwidthLimitType,
    },

    /// A message containing audio data
    AudioData { data: Bytes },

    /// A message containing video data
    VideoData { data: Bytes },

    /// A message containing an array of data encoded as amf0 values
    Amf0Data { values: Vec<Amf0Value> },

    /// A command being sent, encoded with amf0 values
    Amf0Command {
        command_name: String,
        transaction_id: f64,
        command_object: Amf0Value,
        additional_arguments: Vec<Amf0Value>,
    },

    /// An aggregate of FLV tags.  Use `parse_flv_tags` to split it.
    FlvTags { data: Bytes },
}

impl RtmpMessage {
    /// Decodes the body of a reassembled packet based on its packet type
    pub fn from_packet(packet: &RtmpPacket) -> Result<RtmpMessage, MessageDeserializationError> {
        let data = packet.body.clone();
        match packet.packet_type {
            PacketType::SetChunkSize => types::set_chunk_size::deserialize(data),
            PacketType::Abort => types::abort::deserialize(data),
            PacketType::BytesRead => types::bytes_read::deserialize(data),
            PacketType::Control => types::user_control::deserialize(data),
            PacketType::ServerBandwidth => types::server_bandwidth::deserialize(data),
            PacketType::ClientBandwidth => types::client_bandwidth::deserialize(data),
            PacketType::Audio => Ok(RtmpMessage::AudioData { data }),
            PacketType::Video => Ok(RtmpMessage::VideoData { data }),
            PacketType::Metadata => types::amf0_data::deserialize(data),
            PacketType::Invoke => types::amf0_command::deserialize(data),
            PacketType::FlexMessage => {
                // AMF3 wrapped commands lead with a format byte, the rest is plain AMF0
                if data.is_empty() {
                    return Err(MessageDeserializationError::InvalidMessageFormat);
                }

                types::amf0_command::deserialize(data.slice(1..))
            }

            PacketType::FlvTags => Ok(RtmpMessage::FlvTags { data }),
            PacketType::Unknown(type_id) => Ok(RtmpMessage::Unknown { type_id, data }),
        }
    }

    /// Serializes the message into a packet ready for the chunk serializer
    pub fn into_packet(
        self,
        channel: u32,
        timestamp: u32,
        stream_id: u32,
    ) -> Result<RtmpPacket, MessageSerializationError> {
        let packet_type = self.packet_type();
        let body = match self {
            RtmpMessage::Unknown { type_id: _, data } => data,
            RtmpMessage::SetChunkSize { size } => types::set_chunk_size::serialize(size)?,
            RtmpMessage::Abort { stream_id } => types::abort::serialize(stream_id)?,
            RtmpMessage::BytesRead { sequence_number } => {
                types::bytes_read::serialize(sequence_number)?
            }

            RtmpMessage::UserControl {
                event_type,
                stream_id,
                buffer_length,
                timestamp,
                swf_verification,
            } => types::user_control::serialize(
                event_type,
                stream_id,
                buffer_length,
                timestamp,
                swf_verification,
            )?,

            RtmpMessage::ServerBandwidth { size } => types::server_bandwidth::serialize(size)?,
            RtmpMessage::ClientBandwidth { size, limit_type } => {
                types::client_bandwidth::serialize(limit_type, size)?
            }

            RtmpMessage::AudioData { data } => data,
            RtmpMessage::VideoData { data } => data,
            RtmpMessage::Amf0Data { values } => types::amf0_data::serialize(values)?,
            RtmpMessage::Amf0Command {
                command_name,
                transaction_id,
                command_object,
                additional_arguments,
            } => types::amf0_command::serialize(
                command_name,
                transaction_id,
                command_object,
                additional_arguments,
            )?,

            RtmpMessage::FlvTags { data } => data,
        };

        Ok(RtmpPacket::new(
            channel,
            packet_type,
            timestamp,
            stream_id,
            body,
        ))
    }

    pub fn packet_type(&self) -> PacketType {
        match *self {
            RtmpMessage::Unknown { type_id, .. } => PacketType::from_type_id(type_id),
            RtmpMessage::SetChunkSize { .. } => PacketType::SetChunkSize,
            RtmpMessage::Abort { .. } => PacketType::Abort,
            RtmpMessage::BytesRead { .. } => PacketType::BytesRead,
            RtmpMessage::UserControl { .. } => PacketType::Control,
            RtmpMessage::ServerBandwidth { .. } => PacketType::ServerBandwidth,
            RtmpMessage::ClientBandwidth { .. } => PacketType::ClientBandwidth,
            RtmpMessage::AudioData { .. } => PacketType::Audio,
            RtmpMessage::VideoData { .. } => PacketType::Video,
            RtmpMessage::Amf0Data { .. } => PacketType::Metadata,
            RtmpMessage::Amf0Command { .. } => PacketType::Invoke,
            RtmpMessage::FlvTags { .. } => PacketType::FlvTags,
        }
    }
}
