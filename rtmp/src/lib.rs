//! An RTMP client engine for playing back audio (and video) streams.
//!
//! The lower layers can be used on their own: `handshake` performs the client side of the
//! plain and FP9 handshakes, `chunk_io` turns packets into chunks and back, and `messages`
//! gives those packets meaning.  `stream` holds the per stream playback logic and `connection`
//! ties everything together behind a message pump running on its own thread.

pub mod chunk_io;
pub mod connection;
pub mod handshake;
pub mod messages;
pub mod stream;

#[cfg(test)]
mod test_utils;

pub use crate::connection::{
    ConnectionConfig, ConnectionError, ConnectionHandler, RtmpConnection, RtmpStream, ServerLink,
    StreamHandler,
};
