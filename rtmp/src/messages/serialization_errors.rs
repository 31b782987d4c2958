use rtmpc_amf0::Amf0SerializationError;
use std::io;
use thiserror::Error;

/// Enumeration that represents the various errors that may occur while trying to
/// serialize a RTMP message into a packet body.
#[derive(Debug, Error)]
pub enum MessageSerializationError {
    /// An invalid chunk size value was provided
    #[error("Cannot serialize a SetChunkSize message with a size of 2147483648 or greater")]
    InvalidChunkSize,

    /// A SWF verification response must be exactly the 42 bytes produced by the handshake
    #[error("A SWF verification response must be 42 bytes, but {length} were provided")]
    InvalidSwfVerificationLength { length: usize },

    /// The values provided could not be serialized into valid AMF0 encoded data
    #[error("The values provided could not be serialized into valid AMF0 encoded data: {0}")]
    Amf0SerializationError(#[from] Amf0SerializationError),

    /// Failed to write the values into the output buffer
    #[error("An IO error occurred while writing the output: {0}")]
    Io(#[from] io::Error),
}
