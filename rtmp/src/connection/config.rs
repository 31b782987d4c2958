use super::events::CallbackRouting;
use crate::handshake::{HandshakeConfig, SwfVerification};
use std::time::Duration;

/// Configuration options that govern how an RTMP connection operates
#[derive(Clone)]
pub struct ConnectionConfig {
    pub flash_version: String,
    pub swf_url: Option<String>,
    pub page_url: Option<String>,

    /// Replaces the `tcUrl` derived from the server link
    pub tc_url: Option<String>,

    /// Bounds both the TCP connect and the wait for the server's answer to `connect`
    pub connect_timeout: Duration,

    /// How long a single read or write may go without progress before the socket is
    /// considered dead
    pub socket_timeout: Duration,

    /// A ping is sent when nothing has been received for this long
    pub keep_alive_interval: Duration,
    pub tick_interval: Duration,

    /// Longest sleep of the pump when there is nothing to do
    pub idle_wait: Duration,

    pub outbound_chunk_size: u32,
    pub window_ack_size: u32,

    /// Buffer time offered to `on_assign_stream_id`
    pub default_buffer_time_ms: u32,

    pub handshake: HandshakeConfig,
    pub swf_verification: Option<SwfVerification>,
    pub callbacks: CallbackRouting,
}

impl ConnectionConfig {
    /// Creates a new configuration object with default values
    pub fn new() -> ConnectionConfig {
        ConnectionConfig {
            flash_version: "WIN 23,0,0,207".to_string(),
            swf_url: None,
            page_url: None,
            tc_url: None,
            connect_timeout: Duration::from_secs(7),
            socket_timeout: Duration::from_secs(10),
            keep_alive_interval: Duration::from_secs(15),
            tick_interval: Duration::from_millis(500),
            idle_wait: Duration::from_millis(100),
            outbound_chunk_size: 4096,
            window_ack_size: 2_500_000,
            default_buffer_time_ms: 2_000,
            handshake: HandshakeConfig::new(),
            swf_verification: None,
            callbacks: CallbackRouting::default(),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig::new()
    }
}
