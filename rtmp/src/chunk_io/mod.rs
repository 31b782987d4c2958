//! Reading and writing of RTMP chunks.
//!
//! Messages are split into chunks on numbered chunk streams ("channels").  Each chunk's header
//! is compressed against the previous chunk on the same channel, so both directions keep a
//! table of the last header seen per channel.

mod chunk_header;
mod deserialization_errors;
mod deserializer;
mod packet;
mod serialization_errors;
mod serializer;

pub use self::chunk_header::HeaderType;
pub use self::deserialization_errors::ChunkDeserializationError;
pub use self::deserializer::ChunkDeserializer;
pub use self::packet::{PacketType, RtmpPacket};
pub use self::serialization_errors::ChunkSerializationError;
pub use self::serializer::ChunkSerializer;

/// Channel used for protocol control messages (chunk size, acknowledgements, user control)
pub const CONTROL_CHANNEL: u32 = 2;

/// Channel used for connection level invokes such as `connect` and `createStream`
pub const INVOKE_CHANNEL: u32 = 3;

/// Channel used for stream level invokes such as `play`, `pause` and `seek`
pub const STREAM_INVOKE_CHANNEL: u32 = 8;
