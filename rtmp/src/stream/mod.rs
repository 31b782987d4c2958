//! Per stream playback state.
//!
//! A `StreamPacketHandler` is fed the status notifications, media and data messages addressed to
//! one logical stream and turns them into `StreamEvent`s.  It does no I/O of its own, the
//! connection decides where the events go.

mod metadata;
mod resync;
mod status;

pub use self::metadata::{Id3Tags, StreamData, StreamMetadata};
pub use self::resync::{
    duplicate_prefix_length, AudioResync, ResyncOutcome, FINGERPRINT_LENGTH, MAX_RESYNC_ATTEMPTS,
};
pub use self::status::{StatusCode, StreamStatus, METADATA_DURATION_CODE};

use bytes::{Bytes, BytesMut};
use rtmpc_amf0::Amf0Value;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Audio collected at the start of playback before anything is handed out
pub const INITIAL_AUDIO_BURST: usize = 8 * 1024;

/// How long a partial initial burst may sit before the time slice flushes it anyway
pub const INITIAL_BURST_TIMEOUT: Duration = Duration::from_secs(1);

/// Video bodies this small are command frames, not pictures
const MIN_VIDEO_PACKET_SIZE: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamState {
    None,
    Connecting,
    Playing,
    Paused,
    Seeking,
    Disconnected,
}

/// Things a stream reports to its owner
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    Status(StreamStatus),
    Metadata(StreamMetadata),
    Id3(Id3Tags),

    /// Audio payload with the one byte FLV sound header removed
    AudioData { timestamp: u32, data: Bytes },

    /// Video payload with the one byte FLV video header removed
    VideoData { timestamp: u32, data: Bytes },

    PauseChanged { paused: bool },
    Disconnected,
}

pub struct StreamPacketHandler {
    state: StreamState,
    block_counter: u32,
    media_bytes_received: u64,
    begin_of_audio: bool,
    seek_delta: u32,
    pending_seek_ms: Option<u32>,
    paused: bool,
    is_live: bool,
    last_timestamp: u32,
    audio_buffer: BytesMut,
    audio_buffer_timestamp: u32,
    audio_buffered_since: Option<Instant>,
    resync: AudioResync,
}

impl Default for StreamPacketHandler {
    fn default() -> Self {
        StreamPacketHandler::new()
    }
}

impl StreamPacketHandler {
    pub fn new() -> StreamPacketHandler {
        StreamPacketHandler {
            state: StreamState::None,
            block_counter: 0,
            media_bytes_received: 0,
            begin_of_audio: true,
            seek_delta: 0,
            pending_seek_ms: None,
            paused: false,
            is_live: true,
            last_timestamp: 0,
            audio_buffer: BytesMut::new(),
            audio_buffer_timestamp: 0,
            audio_buffered_since: None,
            resync: AudioResync::new(),
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// False once the server flagged the stream as recorded
    pub fn is_live(&self) -> bool {
        self.is_live
    }

    pub fn media_bytes_received(&self) -> u64 {
        self.media_bytes_received
    }

    /// Current playback position, including any offset reported by a seek
    pub fn position_ms(&self) -> u32 {
        self.last_timestamp.wrapping_add(self.seek_delta)
    }

    pub fn play_requested(&mut self) {
        if self.state != StreamState::Disconnected {
            self.state = StreamState::Connecting;
        }
    }

    pub fn seek_requested(&mut self, position_ms: u32) {
        self.pending_seek_ms = Some(position_ms);
    }

    pub fn mark_recorded(&mut self) {
        self.is_live = false;
    }

    pub fn handle_status(&mut self, status: StreamStatus, packet_timestamp: u32) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        debug!(code = status.code.as_str(), state = ?self.state, "Stream status received");

        match status.code {
            StatusCode::PlayReset => {
                self.media_bytes_received = 0;
                self.begin_of_audio = true;
                self.seek_delta = 0;
            }

            StatusCode::SeekNotify => {
                self.state = StreamState::Seeking;
                self.block_counter += 1;
                self.seek_delta = if packet_timestamp > 0 {
                    packet_timestamp
                } else {
                    self.pending_seek_ms.unwrap_or(0)
                };

                self.pending_seek_ms = None;
                self.last_timestamp = 0;

                // Whatever was buffered belongs to the old position
                self.audio_buffer.clear();
                self.audio_buffered_since = None;
                self.begin_of_audio = true;
                self.resync.reset();
            }

            StatusCode::PlaySwitch => {
                if self.media_bytes_received > 0 {
                    self.block_counter += 1;
                }
            }

            StatusCode::PlayStart => {
                self.block_counter = self.block_counter.saturating_sub(1);
                match self.state {
                    StreamState::None | StreamState::Connecting | StreamState::Seeking => {
                        self.state = StreamState::Playing
                    }
                    _ => (),
                }
            }

            StatusCode::PlayStop => {
                for payload in self.resync.abandon() {
                    self.append_audio(payload, self.last_timestamp, &mut events);
                }

                self.flush_audio(&mut events);
                self.begin_of_audio = true;
            }

            StatusCode::PauseNotify => {
                if self.media_bytes_received > 0 {
                    self.flush_audio(&mut events);
                    self.paused = true;
                    self.state = StreamState::Paused;
                    events.push(StreamEvent::PauseChanged { paused: true });
                }
            }

            StatusCode::UnpauseNotify => {
                self.resync.begin();
                self.paused = false;
                self.state = StreamState::Playing;
                events.push(StreamEvent::PauseChanged { paused: false });
            }

            _ => (),
        }

        events.push(StreamEvent::Status(status));
        events
    }

    pub fn handle_audio(&mut self, timestamp: u32, body: Bytes) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.block_counter > 0 {
            trace!(timestamp, "Audio blocked");
            return events;
        }

        self.media_bytes_received += body.len() as u64;
        self.last_timestamp = timestamp;
        if body.len() <= 1 {
            return events;
        }

        let payload = body.slice(1..);
        match self.resync.process(payload.clone()) {
            ResyncOutcome::Deliver(data) => {
                self.append_audio(data, timestamp, &mut events);
                self.resync.record_delivered(&payload);
            }

            ResyncOutcome::Drop | ResyncOutcome::Held => (),
            ResyncOutcome::Replay(held) => {
                for data in held {
                    self.append_audio(data, timestamp, &mut events);
                }
            }
        }

        events
    }

    pub fn handle_video(&mut self, timestamp: u32, body: Bytes) -> Vec<StreamEvent> {
        if self.block_counter > 0 {
            trace!(timestamp, "Video blocked");
            return Vec::new();
        }

        self.media_bytes_received += body.len() as u64;
        self.last_timestamp = timestamp;
        if body.len() < MIN_VIDEO_PACKET_SIZE {
            return Vec::new();
        }

        vec![StreamEvent::VideoData {
            timestamp: timestamp.wrapping_add(self.seek_delta),
            data: body.slice(1..),
        }]
    }

    pub fn handle_data(&mut self, values: &[Amf0Value], timestamp: u32) -> Vec<StreamEvent> {
        match StreamData::parse(values) {
            Some(StreamData::MetaData(metadata)) => {
                let mut events = Vec::new();
                let duration = metadata.duration_seconds;
                events.push(StreamEvent::Metadata(metadata));

                if let Some(duration) = duration {
                    let status =
                        StreamStatus::synthetic(StatusCode::MetaDataDuration, duration.to_string());
                    events.push(StreamEvent::Status(status));
                }

                events
            }

            Some(StreamData::Id3(tags)) => vec![StreamEvent::Id3(tags)],
            Some(StreamData::Status(status)) => self.handle_status(status, timestamp),
            Some(StreamData::Other(name)) => {
                debug!(name = name.as_str(), "Ignoring stream data message");
                Vec::new()
            }

            None => Vec::new(),
        }
    }

    /// Periodic work, called on every pump iteration
    pub fn time_slice(&mut self, now: Instant) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if let Some(since) = self.audio_buffered_since {
            if self.begin_of_audio && now.duration_since(since) >= INITIAL_BURST_TIMEOUT {
                self.flush_audio(&mut events);
            }
        }

        events
    }

    /// The server says the stream ran out of data
    pub fn stream_ended(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        self.flush_audio(&mut events);
        events
    }

    pub fn disconnect(&mut self) -> Vec<StreamEvent> {
        if self.state == StreamState::Disconnected {
            return Vec::new();
        }

        let mut events = Vec::new();
        self.flush_audio(&mut events);
        self.resync.reset();
        self.state = StreamState::Disconnected;
        events.push(StreamEvent::Disconnected);
        events
    }

    fn append_audio(&mut self, data: Bytes, timestamp: u32, events: &mut Vec<StreamEvent>) {
        if data.is_empty() {
            return;
        }

        if self.audio_buffer.is_empty() {
            self.audio_buffer_timestamp = timestamp;
            self.audio_buffered_since = Some(Instant::now());
        }

        self.audio_buffer.extend_from_slice(&data[..]);
        if !self.begin_of_audio || self.audio_buffer.len() >= INITIAL_AUDIO_BURST {
            self.flush_audio(events);
        }
    }

    fn flush_audio(&mut self, events: &mut Vec<StreamEvent>) {
        self.audio_buffered_since = None;
        if self.audio_buffer.is_empty() {
            return;
        }

        self.begin_of_audio = false;
        events.push(StreamEvent::AudioData {
            timestamp: self.audio_buffer_timestamp.wrapping_add(self.seek_delta),
            data: self.audio_buffer.split().freeze(),
        });
    }
}
