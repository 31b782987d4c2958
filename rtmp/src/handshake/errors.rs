use std::io;
use thiserror::Error;

/// Errors that can occur while performing the client side of the RTMP handshake
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// Digest offsets can only be derived with scheme 0 or scheme 1
    #[error("Digest scheme {scheme} is not known, only schemes 0 and 1 exist")]
    UnknownDigestScheme { scheme: u8 },

    /// The handshake packet was not large enough to contain the requested offset window
    #[error("Handshake packet of {length} bytes is too short to derive offsets from")]
    PacketTooShort { length: usize },

    /// Neither digest scheme produced a valid digest inside the server's S1 packet
    #[error("The server's digest could not be verified with either digest scheme")]
    DigestVerificationFailed,

    /// The signature in S2 did not match the one computed from our own digest.  Returned as a
    /// warning in the handshake outcome, the connection continues.
    #[error("Server's S2 signature does not match, the server is not a genuine Adobe server")]
    ServerNotGenuine,

    /// With the plain handshake S2 is expected to be an exact echo of C1.  Returned as a warning
    /// in the handshake outcome, the connection continues.
    #[error("Server's S2 packet did not echo our C1 packet")]
    EchoMismatch,

    /// Bytes were passed into the handshake for a stage that is not currently active
    #[error("Handshake received {received} bytes but expected {expected} for the current stage")]
    UnexpectedPacketSize { expected: usize, received: usize },

    #[error("Operation called out of order, the handshake is {stage}")]
    OutOfOrder { stage: &'static str },

    #[error("{0}")]
    Io(#[from] io::Error),
}
