//! The thread that owns a connection.
//!
//! Each iteration handles one queued entry, any callbacks queued behind it, at most one inbound
//! packet, and then the periodic work (stream time slices, ticks and keep alive pings).  When
//! there is nothing to do it sleeps on the queue until a command is posted.

use super::command_queue::{Command, PlayRequest, QueueEntry};
use super::events::{run_guarded, CallbackJob, ConnectionHandler, DisconnectReason, StreamHandler};
use super::info::{ConnectionState, StreamInfo};
use super::socket::RtmpSocket;
use super::{
    ConnectResultCallback, ConnectionConfig, ConnectionError, RpcHandler, ServerLink, Shared,
    StreamKey,
};
use crate::chunk_io::{
    ChunkDeserializer, ChunkSerializer, PacketType, RtmpPacket, CONTROL_CHANNEL, INVOKE_CHANNEL,
    STREAM_INVOKE_CHANNEL,
};
use crate::handshake::{self, SWF_VERIFICATION_RESPONSE_SIZE};
use crate::messages::{RtmpMessage, UserControlEventType};
use crate::stream::{StreamEvent, StreamPacketHandler};
use parking_lot::Mutex;
use rtmpc_amf0::{Amf0Object, Amf0Value};
use slab::Slab;
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// Highest number of server assigned stream ids tracked per connection
pub(super) const MAX_STREAMS: usize = 64;

const CONNECT_TRANSACTION_ID: u32 = 1;
const CONNECT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Buffer length announced for stream 0 once connected
const CONNECTION_BUFFER_LENGTH_MS: u32 = 300;

pub(super) type SharedStreamHandler = Arc<Mutex<Box<dyn StreamHandler>>>;
pub(super) type SharedRpcHandler = Arc<Mutex<RpcHandler>>;

pub(super) struct StreamSlot {
    pub key: StreamKey,
    pub handler: SharedStreamHandler,
    pub packets: StreamPacketHandler,
    pub stream_id: Option<u32>,
    pub buffer_time_ms: u32,

    /// A play requested before the server assigned the stream id
    pub pending_play: Option<PlayRequest>,
}

/// Requests waiting for a `_result` or `_error`
pub(super) enum PendingTransaction {
    Connect,
    CreateStream { key: StreamKey },
}

pub(crate) struct Pump {
    pub(super) shared: Arc<Shared>,
    pub(super) config: ConnectionConfig,
    handler: Arc<Mutex<Box<dyn ConnectionHandler>>>,
    state: ConnectionState,
    pub(super) socket: Option<RtmpSocket>,
    pub(super) reader: ChunkDeserializer,
    writer: ChunkSerializer,
    pub(super) streams: Slab<StreamSlot>,
    handles: HashMap<StreamKey, usize>,

    /// Server stream id to stream slot
    pub(super) stream_ids: Vec<Option<usize>>,
    pub(super) transactions: HashMap<u32, PendingTransaction>,
    next_transaction_id: u32,
    pub(super) rpc_handlers: HashMap<String, SharedRpcHandler>,
    pub(super) swf_response: Option<[u8; SWF_VERIFICATION_RESPONSE_SIZE]>,
    pub(super) server_window: u32,
    acknowledged_bytes: u64,
    pub(super) bandwidth_checks: u32,
    pub(super) connect_rejection: Option<String>,

    /// Bumped on every connect so a stale disconnect can't close a newer connection
    generation: u64,
    link_lost: bool,
    running: bool,
    last_tick: Instant,
    last_ping: Instant,
    epoch: Instant,
}

impl Pump {
    pub fn new(
        shared: Arc<Shared>,
        config: ConnectionConfig,
        handler: Box<dyn ConnectionHandler>,
    ) -> Pump {
        let now = Instant::now();
        Pump {
            shared,
            config,
            handler: Arc::new(Mutex::new(handler)),
            state: ConnectionState::Disconnected,
            socket: None,
            reader: ChunkDeserializer::new(),
            writer: ChunkSerializer::new(),
            streams: Slab::new(),
            handles: HashMap::new(),
            stream_ids: vec![None; MAX_STREAMS],
            transactions: HashMap::new(),
            next_transaction_id: CONNECT_TRANSACTION_ID + 1,
            rpc_handlers: HashMap::new(),
            swf_response: None,
            server_window: 0,
            acknowledged_bytes: 0,
            bandwidth_checks: 0,
            connect_rejection: None,
            generation: 0,
            link_lost: false,
            running: true,
            last_tick: now,
            last_ping: now,
            epoch: now,
        }
    }

    pub fn run(mut self) {
        info!("Message pump started");

        while self.running {
            self.process_next_entry();
            self.run_promoted_callbacks();

            let readable = self.poll_socket();
            if readable {
                self.read_and_dispatch();
                self.run_promoted_callbacks();
            }

            let now = Instant::now();
            self.time_slice(now);
            self.tick(now);
            self.keep_alive(now);

            if self.running && !readable && self.shared.queue.is_empty() {
                self.shared.queue.wait_for_work(self.config.idle_wait);
            }
        }

        for entry in self.shared.queue.drain() {
            match entry {
                QueueEntry::Callback(job) => run_guarded(job),
                QueueEntry::Command(Command::Connect {
                    result: Some(result),
                    ..
                }) => run_guarded(Box::new(move || result(false))),

                QueueEntry::Command(_) => (),
            }
        }

        info!("Message pump stopped");
    }

    fn process_next_entry(&mut self) {
        let (sequence, entry) = match self.shared.queue.pop() {
            Some(next) => next,
            None => return,
        };

        match entry {
            QueueEntry::Callback(job) => run_guarded(job),
            QueueEntry::Command(command) => self.execute(command),
        }

        self.shared.queue.complete(sequence);
    }

    /// Callbacks queued by the last entry or packet run before anything else
    fn run_promoted_callbacks(&mut self) {
        while self.shared.queue.front_is_callback() {
            self.process_next_entry();
        }
    }

    fn execute(&mut self, command: Command) {
        let name = command.name();
        trace!(command = name, "Executing command");

        let result = match command {
            Command::Connect {
                link,
                properties,
                result,
            } => {
                self.connect(link, properties, result);
                Ok(())
            }

            Command::Close => {
                self.teardown(DisconnectReason::Requested);
                Ok(())
            }

            Command::SendPing => self.send_ping(),
            Command::CreateStream { key, handler } => self.create_stream(key, handler),
            Command::DeleteStream { key } => self.delete_stream(key),
            Command::Play { key, request } => self.play(key, request),
            Command::Pause { key, pause } => self.pause(key, pause),
            Command::Seek { key, position_ms } => self.seek(key, position_ms),
            Command::CloseStream { key } => self.close_stream(key),
            Command::RegisterRpc { name, handler } => {
                self.rpc_handlers
                    .insert(name, Arc::new(Mutex::new(handler)));
                Ok(())
            }

            Command::RemoteDisconnect { reason, generation } => {
                if generation == self.generation {
                    self.teardown(DisconnectReason::Remote(reason));
                } else {
                    debug!(reason = %reason, "Ignoring disconnect of an earlier connection");
                }

                Ok(())
            }

            Command::Shutdown => {
                self.teardown(DisconnectReason::Requested);
                self.running = false;
                Ok(())
            }
        };

        if let Err(error) = result {
            self.handle_error(name, error);
        }
    }

    /// Transport failures end the connection, anything else only loses the one operation
    pub(super) fn handle_error(&mut self, context: &str, error: ConnectionError) {
        match error {
            ConnectionError::Io(_) | ConnectionError::ChunkDeserialization(_) => {
                self.transport_failed(error)
            }

            ConnectionError::NotConnected => {
                warn!(context, "Ignored, the connection is not open");
            }

            error => warn!(context, error = %error, "Operation failed"),
        }
    }

    /// Marks the socket as dead and queues the disconnect behind whatever is already queued
    pub(super) fn transport_failed(&mut self, error: ConnectionError) {
        if self.link_lost || self.socket.is_none() {
            return;
        }

        warn!(error = %error, "Connection to the server lost");
        self.link_lost = true;
        self.shared.queue.post(Command::RemoteDisconnect {
            reason: error.to_string(),
            generation: self.generation,
        });
    }

    pub(super) fn request_remote_disconnect(&mut self, reason: String) {
        self.shared.queue.post(Command::RemoteDisconnect {
            reason,
            generation: self.generation,
        });
    }

    fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
        self.shared.info.lock().state = state;
    }

    pub(super) fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    fn connect(
        &mut self,
        link: ServerLink,
        properties: Vec<Amf0Value>,
        result: Option<ConnectResultCallback>,
    ) {
        if self.state != ConnectionState::Disconnected {
            warn!(link = %link, "Connect requested while a connection is already open");
            if let Some(result) = result {
                self.connection_callback(Box::new(move || result(false)));
            }

            return;
        }

        info!(link = %link, "Connecting");
        self.generation += 1;
        self.set_state(ConnectionState::Connecting);
        self.shared.info.lock().server_link = Some(link.clone());

        match self.try_connect(&link, properties) {
            Ok(()) => {
                info!(link = %link, "Connected");
                self.set_state(ConnectionState::Connected);

                let handler = self.handler.clone();
                self.connection_callback(Box::new(move || handler.lock().on_connect()));
                if let Some(result) = result {
                    self.connection_callback(Box::new(move || result(true)));
                }
            }

            Err(error) => {
                error!(link = %link, error = %error, "Connect failed");
                if let Some(result) = result {
                    self.connection_callback(Box::new(move || result(false)));
                }

                self.teardown(DisconnectReason::ConnectFailed(error.to_string()));
            }
        }
    }

    fn try_connect(
        &mut self,
        link: &ServerLink,
        properties: Vec<Amf0Value>,
    ) -> Result<(), ConnectionError> {
        if !link.protocol.is_supported() {
            return Err(ConnectionError::UnsupportedProtocol {
                protocol: link.protocol.to_string(),
            });
        }

        let mut socket =
            RtmpSocket::connect(link, self.config.connect_timeout, self.config.socket_timeout)?;

        let mut handshake_config = self.config.handshake.clone();
        if link.protocol.is_encrypted() {
            handshake_config.encrypted = true;
        }

        let outcome = handshake::perform(
            &mut socket,
            handshake_config,
            self.config.swf_verification.clone(),
        )?;

        for warning in &outcome.warnings {
            warn!(warning = %warning, "Handshake completed with a warning");
        }

        if outcome.encrypted {
            return Err(ConnectionError::EncryptionUnsupported);
        }

        self.swf_response = outcome.swf_verification_response;
        self.socket = Some(socket);
        self.send_connect(link, properties)?;
        self.await_connect_response(link)
    }

    fn send_connect(
        &mut self,
        link: &ServerLink,
        properties: Vec<Amf0Value>,
    ) -> Result<(), ConnectionError> {
        let text = |value: &str| Amf0Value::Utf8String(value.to_string());

        let mut object = Amf0Object::new();
        object.insert("app", text(&link.app));
        object.insert("flashVer", text(&self.config.flash_version));
        if let Some(ref swf_url) = self.config.swf_url {
            object.insert("swfUrl", text(swf_url));
        }

        let tc_url = match self.config.tc_url {
            Some(ref tc_url) => tc_url.clone(),
            None => link.tc_url(),
        };

        object.insert("tcUrl", Amf0Value::Utf8String(tc_url));
        object.insert("fpad", Amf0Value::Boolean(false));
        object.insert("capabilities", Amf0Value::Number(15.0));
        object.insert("audioCodecs", Amf0Value::Number(3191.0));
        object.insert("videoCodecs", Amf0Value::Number(252.0));
        object.insert("videoFunction", Amf0Value::Number(1.0));
        if let Some(ref page_url) = self.config.page_url {
            object.insert("pageUrl", text(page_url));
        }

        object.insert("objectEncoding", Amf0Value::Number(0.0));

        self.next_transaction_id = CONNECT_TRANSACTION_ID + 1;
        self.transactions
            .insert(CONNECT_TRANSACTION_ID, PendingTransaction::Connect);

        self.send_command(
            "connect",
            CONNECT_TRANSACTION_ID,
            Amf0Value::Object(object),
            properties,
            INVOKE_CHANNEL,
            0,
        )
    }

    /// Reads and dispatches packets until the first invoke, which answers `connect`
    fn await_connect_response(&mut self, link: &ServerLink) -> Result<(), ConnectionError> {
        let deadline = Instant::now() + self.config.connect_timeout;
        loop {
            let readable = match self.socket.as_mut() {
                Some(socket) => socket.has_data()?,
                None => return Err(ConnectionError::NotConnected),
            };

            if !readable {
                if Instant::now() >= deadline {
                    return Err(ConnectionError::ConnectTimeout {
                        address: link.address(),
                    });
                }

                thread::sleep(CONNECT_POLL_INTERVAL);
                continue;
            }

            let packet = self.read_packet()?;
            let is_invoke = match packet.packet_type {
                PacketType::Invoke | PacketType::FlexMessage => true,
                _ => false,
            };

            self.dispatch_packet(packet);
            if is_invoke {
                return match self.connect_rejection.take() {
                    Some(description) => Err(ConnectionError::ConnectRejected { description }),
                    None => Ok(()),
                };
            }
        }
    }

    /// Releases the socket and tells every stream and the connection handler.  Does nothing if
    /// there is no connection to tear down.
    pub(super) fn teardown(&mut self, reason: DisconnectReason) {
        if self.state == ConnectionState::Disconnected && self.socket.is_none() {
            return;
        }

        info!(reason = ?reason, "Closing connection");

        let indexes: Vec<usize> = self.streams.iter().map(|(index, _)| index).collect();
        for index in indexes {
            let events = {
                let slot = &mut self.streams[index];
                slot.stream_id = None;
                slot.pending_play = None;
                slot.packets.disconnect()
            };

            self.deliver_stream_events(index, events);
        }

        self.socket = None;
        self.reader = ChunkDeserializer::new();
        self.writer = ChunkSerializer::new();
        self.stream_ids = vec![None; MAX_STREAMS];
        self.transactions.clear();
        self.swf_response = None;
        self.server_window = 0;
        self.acknowledged_bytes = 0;
        self.connect_rejection = None;
        self.link_lost = false;

        {
            let mut info = self.shared.info.lock();
            info.inbound_chunk_size = self.reader.get_max_chunk_size();
            info.outbound_chunk_size = self.writer.get_max_chunk_size();
        }

        self.set_state(ConnectionState::Disconnected);

        let handler = self.handler.clone();
        self.connection_callback(Box::new(move || handler.lock().on_disconnect(reason)));
    }

    fn poll_socket(&mut self) -> bool {
        if self.link_lost || !self.is_connected() {
            return false;
        }

        let result = match self.socket.as_mut() {
            Some(socket) => socket.has_data(),
            None => return false,
        };

        match result {
            Ok(readable) => readable,
            Err(error) => {
                self.transport_failed(error.into());
                false
            }
        }
    }

    fn time_slice(&mut self, now: Instant) {
        let indexes: Vec<usize> = self.streams.iter().map(|(index, _)| index).collect();
        for index in indexes {
            let events = self.streams[index].packets.time_slice(now);
            if !events.is_empty() {
                self.deliver_stream_events(index, events);
            }
        }
    }

    fn tick(&mut self, now: Instant) {
        if now.duration_since(self.last_tick) < self.config.tick_interval {
            return;
        }

        self.last_tick = now;

        let handler = self.handler.clone();
        self.connection_callback(Box::new(move || handler.lock().on_tick()));

        for (_, slot) in self.streams.iter() {
            let handler = slot.handler.clone();
            self.config
                .callbacks
                .status
                .dispatch(&self.shared.queue, Box::new(move || handler.lock().on_tick()));
        }
    }

    fn keep_alive(&mut self, now: Instant) {
        if !self.is_connected() || self.link_lost {
            return;
        }

        let idle = match self.socket {
            Some(ref socket) => socket.idle_for(),
            None => return,
        };

        let interval = self.config.keep_alive_interval;
        if idle >= interval && now.duration_since(self.last_ping) >= interval {
            debug!(idle_ms = idle.as_millis() as u64, "Nothing received lately, probing with a ping");
            if let Err(error) = self.send_ping() {
                self.handle_error("keep_alive", error);
            }
        }
    }

    pub(super) fn connection_callback(&self, job: CallbackJob) {
        self.config
            .callbacks
            .connection
            .dispatch(&self.shared.queue, job);
    }

    /// Hands stream events to the stream's handler, each on the dispatch of its kind
    pub(super) fn deliver_stream_events(&mut self, index: usize, events: Vec<StreamEvent>) {
        let handler = match self.streams.get(index) {
            Some(slot) => slot.handler.clone(),
            None => return,
        };

        let queue = &self.shared.queue;
        let status = &self.config.callbacks.status;
        let media = &self.config.callbacks.media;

        for event in events {
            let handler = handler.clone();
            match event {
                StreamEvent::Status(value) => status.dispatch(
                    queue,
                    Box::new(move || handler.lock().on_status(&value)),
                ),

                StreamEvent::Metadata(value) => status.dispatch(
                    queue,
                    Box::new(move || handler.lock().on_metadata(&value)),
                ),

                StreamEvent::Id3(value) => {
                    status.dispatch(queue, Box::new(move || handler.lock().on_id3(&value)))
                }

                StreamEvent::AudioData { timestamp, data } => media.dispatch(
                    queue,
                    Box::new(move || handler.lock().on_audio_packet(timestamp, data)),
                ),

                StreamEvent::VideoData { timestamp, data } => media.dispatch(
                    queue,
                    Box::new(move || handler.lock().on_video_packet(timestamp, data)),
                ),

                StreamEvent::PauseChanged { paused } => status.dispatch(
                    queue,
                    Box::new(move || handler.lock().on_pause_stream(paused)),
                ),

                StreamEvent::Disconnected => {
                    status.dispatch(queue, Box::new(move || handler.lock().on_disconnect()))
                }
            }
        }

        self.publish_stream_info(index);
    }

    pub(super) fn publish_stream_info(&self, index: usize) {
        let slot = match self.streams.get(index) {
            Some(slot) => slot,
            None => return,
        };

        let info = StreamInfo {
            stream_id: slot.stream_id,
            state: slot.packets.state(),
            paused: slot.packets.is_paused(),
            is_live: slot.packets.is_live(),
            position_ms: slot.packets.position_ms(),
            media_bytes_received: slot.packets.media_bytes_received(),
            buffer_time_ms: slot.buffer_time_ms,
        };

        self.shared.streams.lock().insert(slot.key, info);
    }

    pub(super) fn stream_index(&self, stream_id: u32) -> Option<usize> {
        self.stream_ids.get(stream_id as usize).and_then(|index| *index)
    }

    pub(super) fn next_transaction(&mut self) -> u32 {
        let id = self.next_transaction_id;
        self.next_transaction_id += 1;
        id
    }

    fn slot_index(&self, key: StreamKey) -> Option<usize> {
        let index = self.handles.get(&key).cloned();
        if index.is_none() {
            warn!(key = ?key, "Command for a stream that does not exist");
        }

        index
    }

    fn create_stream(
        &mut self,
        key: StreamKey,
        handler: Box<dyn StreamHandler>,
    ) -> Result<(), ConnectionError> {
        let index = self.streams.insert(StreamSlot {
            key,
            handler: Arc::new(Mutex::new(handler)),
            packets: StreamPacketHandler::new(),
            stream_id: None,
            buffer_time_ms: self.config.default_buffer_time_ms,
            pending_play: None,
        });

        self.handles.insert(key, index);
        self.publish_stream_info(index);

        if !self.is_connected() {
            warn!(key = ?key, "Stream created without an open connection");
            let events = self.streams[index].packets.disconnect();
            self.deliver_stream_events(index, events);
            return Ok(());
        }

        let transaction_id = self.next_transaction();
        self.transactions
            .insert(transaction_id, PendingTransaction::CreateStream { key });

        debug!(transaction_id, "Requesting a new stream");
        self.send_command(
            "createStream",
            transaction_id,
            Amf0Value::Null,
            Vec::new(),
            INVOKE_CHANNEL,
            0,
        )
    }

    fn delete_stream(&mut self, key: StreamKey) -> Result<(), ConnectionError> {
        let index = match self.handles.remove(&key) {
            Some(index) => index,
            None => {
                warn!(key = ?key, "Delete requested for a stream that does not exist");
                return Ok(());
            }
        };

        let stream_id = self.streams[index].stream_id;
        let mut result = Ok(());
        if let Some(stream_id) = stream_id {
            if let Some(entry) = self.stream_ids.get_mut(stream_id as usize) {
                *entry = None;
            }

            if self.is_connected() && !self.link_lost {
                info!(stream_id, "Deleting stream");
                result = self.send_command(
                    "deleteStream",
                    0,
                    Amf0Value::Null,
                    vec![Amf0Value::Number(f64::from(stream_id))],
                    INVOKE_CHANNEL,
                    0,
                );
            }
        }

        let events = self.streams[index].packets.disconnect();
        self.deliver_stream_events(index, events);
        self.streams.remove(index);
        self.shared.streams.lock().remove(&key);

        result
    }

    fn play(&mut self, key: StreamKey, request: PlayRequest) -> Result<(), ConnectionError> {
        let index = match self.slot_index(key) {
            Some(index) => index,
            None => return Ok(()),
        };

        if !self.is_connected() {
            return Err(ConnectionError::NotConnected);
        }

        let (stream_id, buffer_time) = {
            let slot = &mut self.streams[index];
            slot.packets.play_requested();
            (slot.stream_id, slot.buffer_time_ms)
        };

        let result = match stream_id {
            Some(stream_id) => self.send_play(stream_id, &request, buffer_time),
            None => {
                debug!(name = %request.name, "Holding play until the stream id is assigned");
                self.streams[index].pending_play = Some(request);
                Ok(())
            }
        };

        self.publish_stream_info(index);
        result
    }

    pub(super) fn send_play(
        &mut self,
        stream_id: u32,
        request: &PlayRequest,
        buffer_time_ms: u32,
    ) -> Result<(), ConnectionError> {
        info!(stream_id, name = %request.name, start = request.start_ms, "Requesting playback");

        self.send_command(
            "play",
            0,
            Amf0Value::Null,
            vec![
                Amf0Value::Utf8String(request.name.clone()),
                Amf0Value::Number(request.start_ms as f64),
                Amf0Value::Number(request.length_ms as f64),
                Amf0Value::Boolean(request.reset),
            ],
            STREAM_INVOKE_CHANNEL,
            stream_id,
        )?;

        self.send_buffer_length(stream_id, buffer_time_ms)
    }

    fn pause(&mut self, key: StreamKey, pause: bool) -> Result<(), ConnectionError> {
        let (stream_id, position) = match self.assigned_stream(key)? {
            Some(assigned) => assigned,
            None => return Ok(()),
        };

        debug!(stream_id, pause, position, "Requesting pause");
        self.send_command(
            "pause",
            0,
            Amf0Value::Null,
            vec![
                Amf0Value::Boolean(pause),
                Amf0Value::Number(f64::from(position)),
            ],
            STREAM_INVOKE_CHANNEL,
            stream_id,
        )
    }

    fn seek(&mut self, key: StreamKey, position_ms: u32) -> Result<(), ConnectionError> {
        let (stream_id, _) = match self.assigned_stream(key)? {
            Some(assigned) => assigned,
            None => return Ok(()),
        };

        if let Some(index) = self.stream_index(stream_id) {
            self.streams[index].packets.seek_requested(position_ms);
        }

        debug!(stream_id, position_ms, "Requesting seek");
        self.send_command(
            "seek",
            0,
            Amf0Value::Null,
            vec![Amf0Value::Number(f64::from(position_ms))],
            STREAM_INVOKE_CHANNEL,
            stream_id,
        )
    }

    fn close_stream(&mut self, key: StreamKey) -> Result<(), ConnectionError> {
        if let Some(index) = self.slot_index(key) {
            self.streams[index].pending_play = None;
        }

        let (stream_id, _) = match self.assigned_stream(key)? {
            Some(assigned) => assigned,
            None => return Ok(()),
        };

        debug!(stream_id, "Closing stream");
        self.send_command(
            "closeStream",
            0,
            Amf0Value::Null,
            Vec::new(),
            STREAM_INVOKE_CHANNEL,
            stream_id,
        )
    }

    /// Stream id and position of a stream the server knows about
    fn assigned_stream(&self, key: StreamKey) -> Result<Option<(u32, u32)>, ConnectionError> {
        if !self.is_connected() {
            return Err(ConnectionError::NotConnected);
        }

        let index = match self.slot_index(key) {
            Some(index) => index,
            None => return Ok(None),
        };

        let slot = &self.streams[index];
        match slot.stream_id {
            Some(stream_id) => Ok(Some((stream_id, slot.packets.position_ms()))),
            None => {
                warn!(key = ?key, "Stream has no id assigned yet, command dropped");
                Ok(None)
            }
        }
    }

    fn send_ping(&mut self) -> Result<(), ConnectionError> {
        self.last_ping = Instant::now();
        let timestamp = self.epoch.elapsed().as_millis() as u32;
        self.send(
            RtmpMessage::UserControl {
                event_type: UserControlEventType::PingRequest,
                stream_id: None,
                buffer_length: None,
                timestamp: Some(timestamp),
                swf_verification: None,
            },
            CONTROL_CHANNEL,
            0,
        )
    }

    pub(super) fn send_buffer_length(
        &mut self,
        stream_id: u32,
        buffer_length_ms: u32,
    ) -> Result<(), ConnectionError> {
        self.send(
            RtmpMessage::UserControl {
                event_type: UserControlEventType::SetBufferLength,
                stream_id: Some(stream_id),
                buffer_length: Some(buffer_length_ms),
                timestamp: None,
                swf_verification: None,
            },
            CONTROL_CHANNEL,
            0,
        )
    }

    /// Announces window size, connection buffer length and our chunk size after `connect` was
    /// accepted
    pub(super) fn send_connect_follow_up(&mut self) -> Result<(), ConnectionError> {
        self.send(
            RtmpMessage::ServerBandwidth {
                size: self.config.window_ack_size,
            },
            CONTROL_CHANNEL,
            0,
        )?;

        self.send_buffer_length(0, CONNECTION_BUFFER_LENGTH_MS)?;

        let bytes = self
            .writer
            .set_max_chunk_size(self.config.outbound_chunk_size, 0)?;

        self.write_bytes(&bytes)?;
        self.shared.info.lock().outbound_chunk_size = self.writer.get_max_chunk_size();
        Ok(())
    }

    pub(super) fn send_command(
        &mut self,
        name: &str,
        transaction_id: u32,
        command_object: Amf0Value,
        arguments: Vec<Amf0Value>,
        channel: u32,
        stream_id: u32,
    ) -> Result<(), ConnectionError> {
        let message = RtmpMessage::Amf0Command {
            command_name: name.to_string(),
            transaction_id: f64::from(transaction_id),
            command_object,
            additional_arguments: arguments,
        };

        self.send(message, channel, stream_id)
    }

    pub(super) fn send(
        &mut self,
        message: RtmpMessage,
        channel: u32,
        stream_id: u32,
    ) -> Result<(), ConnectionError> {
        if self.socket.is_none() {
            return Err(ConnectionError::NotConnected);
        }

        let packet = message.into_packet(channel, 0, stream_id)?;
        trace!(
            channel,
            stream_id,
            packet_type = ?packet.packet_type,
            bytes = packet.body.len(),
            "Sending packet"
        );

        let bytes = self.writer.serialize(&packet, false)?;
        self.write_bytes(&bytes)
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), ConnectionError> {
        let socket = self.socket.as_mut().ok_or(ConnectionError::NotConnected)?;
        socket.write_all(bytes)?;
        socket.flush()?;

        let bytes_out = socket.bytes_out();
        self.shared.info.lock().bytes_out = bytes_out;
        Ok(())
    }

    /// Reads one whole packet and acknowledges received bytes once a tenth of the server's
    /// window has come in since the last acknowledgement
    pub(super) fn read_packet(&mut self) -> Result<RtmpPacket, ConnectionError> {
        let socket = self.socket.as_mut().ok_or(ConnectionError::NotConnected)?;
        let packet = self.reader.read_packet(socket)?;
        let bytes_in = socket.bytes_in();

        self.shared.info.lock().bytes_in = bytes_in;

        let threshold = u64::from(self.server_window / 10);
        if self.server_window > 0 && bytes_in - self.acknowledged_bytes >= threshold {
            self.acknowledged_bytes = bytes_in;
            trace!(bytes_in, "Acknowledging received bytes");
            self.send(
                RtmpMessage::BytesRead {
                    sequence_number: bytes_in as u32,
                },
                CONTROL_CHANNEL,
                0,
            )?;
        }

        Ok(packet)
    }
}
