use crate::chunk_io::{ChunkDeserializationError, ChunkSerializationError};
use crate::handshake::HandshakeError;
use crate::messages::{MessageDeserializationError, MessageSerializationError};
use std::io;
use thiserror::Error;

/// Errors raised while connecting to, or talking with, an RTMP server
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Neither the TCP connect nor the wait for the server's answer to `connect` finished in time
    #[error("Timed out connecting to {address}")]
    ConnectTimeout { address: String },

    #[error("Could not resolve any address for host {host}")]
    AddressResolution { host: String },

    /// The server link names a transport this client cannot speak
    #[error("The {protocol} protocol is not supported")]
    UnsupportedProtocol { protocol: String },

    #[error("'{url}' is not a valid server link")]
    InvalidUrl { url: String },

    /// The encrypted handshake completed but the RC4 channel that should follow it does not
    /// exist in this client
    #[error("Encrypted RTMP sessions are not supported")]
    EncryptionUnsupported,

    #[error("Handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("An error occurred deserializing incoming data: {0}")]
    ChunkDeserialization(#[from] ChunkDeserializationError),

    #[error("An error occurred serializing outbound messages: {0}")]
    ChunkSerialization(#[from] ChunkSerializationError),

    #[error("An error occurred turning an RTMP message into a packet: {0}")]
    MessageSerialization(#[from] MessageSerializationError),

    #[error("An error occurred turning a packet into an RTMP message: {0}")]
    MessageDeserialization(#[from] MessageDeserializationError),

    /// The server answered `connect` with `_error`
    #[error("The server rejected the connection: {description}")]
    ConnectRejected { description: String },

    #[error("The operation requires an open connection")]
    NotConnected,

    #[error("The server assigned stream id {stream_id}, which is out of range")]
    StreamIdOutOfRange { stream_id: u32 },

    #[error("{0}")]
    Io(#[from] io::Error),
}
