use super::ServerLink;
use crate::messages::PeerBandwidthLimitType;
use crate::stream::StreamState;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// A snapshot of what the pump knows about the connection
#[derive(Clone, Debug, PartialEq)]
pub struct ConnectionInfo {
    pub state: ConnectionState,
    pub server_link: Option<ServerLink>,
    pub bytes_in: u64,
    pub bytes_out: u64,

    /// Window acknowledgement size announced by the server
    pub server_bandwidth: Option<u32>,
    pub client_bandwidth: Option<(u32, PeerBandwidthLimitType)>,
    pub inbound_chunk_size: usize,
    pub outbound_chunk_size: u32,

    /// `fmsVer` from the connect result
    pub server_version: Option<String>,
    pub capabilities: Option<f64>,

    /// Result of the server initiated bandwidth check
    pub bandwidth_kbps: Option<f64>,
}

impl ConnectionInfo {
    pub fn new() -> ConnectionInfo {
        ConnectionInfo {
            state: ConnectionState::Disconnected,
            server_link: None,
            bytes_in: 0,
            bytes_out: 0,
            server_bandwidth: None,
            client_bandwidth: None,
            inbound_chunk_size: 128,
            outbound_chunk_size: 128,
            server_version: None,
            capabilities: None,
            bandwidth_kbps: None,
        }
    }
}

impl Default for ConnectionInfo {
    fn default() -> Self {
        ConnectionInfo::new()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct StreamInfo {
    /// Assigned by the server in answer to `createStream`
    pub stream_id: Option<u32>,
    pub state: StreamState,
    pub paused: bool,
    pub is_live: bool,
    pub position_ms: u32,
    pub media_bytes_received: u64,
    pub buffer_time_ms: u32,
}
