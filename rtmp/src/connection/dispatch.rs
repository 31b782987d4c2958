//! Routing of inbound packets.
//!
//! Protocol control is handled here directly.  Audio, video and data messages go to the stream
//! the packet's message stream id was assigned to, commands are matched by name.

use super::pump::{PendingTransaction, Pump, MAX_STREAMS};
use super::{ConnectionError, StreamKey};
use crate::chunk_io::{PacketType, RtmpPacket, CONTROL_CHANNEL, INVOKE_CHANNEL};
use crate::messages::{parse_flv_tags, RtmpMessage, UserControlEventType};
use crate::stream::{StatusCode, StreamStatus};
use bytes::Bytes;
use rtmpc_amf0::{Amf0Object, Amf0Value};
use tracing::{debug, info, trace, warn};

/// Closes the connection when received as an `onStatus` on stream 0
const CONNECTION_CLOSED_CODE: &str = "NetConnection.Connect.Closed";

impl Pump {
    pub(super) fn read_and_dispatch(&mut self) {
        match self.read_packet() {
            Ok(packet) => self.dispatch_packet(packet),
            Err(error) => self.transport_failed(error),
        }
    }

    /// Decodes and routes one packet.  A packet that can't be decoded is logged and dropped.
    pub(super) fn dispatch_packet(&mut self, packet: RtmpPacket) {
        trace!(
            channel = packet.channel,
            stream_id = packet.stream_id,
            timestamp = packet.timestamp,
            packet_type = ?packet.packet_type,
            bytes = packet.body.len(),
            "Packet received"
        );

        let message = match RtmpMessage::from_packet(&packet) {
            Ok(message) => message,
            Err(error) => {
                warn!(
                    packet_type = ?packet.packet_type,
                    stream_id = packet.stream_id,
                    error = %error,
                    "Dropping packet that could not be decoded"
                );

                return;
            }
        };

        if let Err(error) = self.dispatch_message(message, packet.stream_id, packet.timestamp) {
            self.handle_error("dispatch", error);
        }
    }

    fn dispatch_message(
        &mut self,
        message: RtmpMessage,
        stream_id: u32,
        timestamp: u32,
    ) -> Result<(), ConnectionError> {
        match message {
            RtmpMessage::SetChunkSize { size } => {
                debug!(size, "Server changed its chunk size");
                self.reader.set_max_chunk_size(size as usize)?;
                self.shared.info.lock().inbound_chunk_size = size as usize;
            }

            RtmpMessage::Abort { stream_id: csid } => self.reader.abort(csid),
            RtmpMessage::BytesRead { sequence_number } => {
                trace!(sequence_number, "Server acknowledged bytes")
            }

            RtmpMessage::UserControl {
                event_type,
                stream_id: event_stream_id,
                timestamp: event_timestamp,
                ..
            } => self.handle_user_control(event_type, event_stream_id, event_timestamp)?,

            RtmpMessage::ServerBandwidth { size } => {
                debug!(size, "Server announced its acknowledgement window");
                self.server_window = size;
                self.shared.info.lock().server_bandwidth = Some(size);
            }

            RtmpMessage::ClientBandwidth { size, limit_type } => {
                debug!(size, limit_type = ?limit_type, "Server limited our bandwidth");
                self.shared.info.lock().client_bandwidth = Some((size, limit_type));
            }

            RtmpMessage::AudioData { data } => self.route_audio(stream_id, timestamp, data),
            RtmpMessage::VideoData { data } => self.route_video(stream_id, timestamp, data),
            RtmpMessage::Amf0Data { values } => self.route_data(stream_id, timestamp, &values),
            RtmpMessage::Amf0Command {
                command_name,
                transaction_id,
                command_object,
                additional_arguments,
            } => self.handle_command(
                &command_name,
                transaction_id,
                command_object,
                additional_arguments,
                stream_id,
                timestamp,
            )?,

            RtmpMessage::FlvTags { data } => self.split_flv_tags(stream_id, timestamp, data),
            RtmpMessage::Unknown { type_id, data } => {
                debug!(type_id, bytes = data.len(), "Ignoring message of unknown type")
            }
        }

        Ok(())
    }

    fn handle_user_control(
        &mut self,
        event_type: UserControlEventType,
        stream_id: Option<u32>,
        timestamp: Option<u32>,
    ) -> Result<(), ConnectionError> {
        match event_type {
            UserControlEventType::PingRequest => {
                trace!(timestamp, "Answering server ping");
                self.send(
                    RtmpMessage::UserControl {
                        event_type: UserControlEventType::PingResponse,
                        stream_id: None,
                        buffer_length: None,
                        timestamp: Some(timestamp.unwrap_or(0)),
                        swf_verification: None,
                    },
                    CONTROL_CHANNEL,
                    0,
                )?;
            }

            UserControlEventType::SwfVerifyRequest => match self.swf_response {
                Some(response) => {
                    debug!("Answering SWF verification request");
                    self.send(
                        RtmpMessage::UserControl {
                            event_type: UserControlEventType::SwfVerifyResponse,
                            stream_id: None,
                            buffer_length: None,
                            timestamp: None,
                            swf_verification: Some(Bytes::copy_from_slice(&response)),
                        },
                        CONTROL_CHANNEL,
                        0,
                    )?;
                }

                None => warn!("Server requested SWF verification but none is configured"),
            },

            UserControlEventType::StreamEof | UserControlEventType::StreamDry => {
                debug!(stream_id, event = ?event_type, "Stream ran out of data");
                if let Some(index) = stream_id.and_then(|id| self.stream_index(id)) {
                    let events = self.streams[index].packets.stream_ended();
                    self.deliver_stream_events(index, events);
                }
            }

            UserControlEventType::StreamIsRecorded => {
                if let Some(index) = stream_id.and_then(|id| self.stream_index(id)) {
                    self.streams[index].packets.mark_recorded();
                    self.publish_stream_info(index);
                }
            }

            other => debug!(stream_id, event = ?other, "User control event"),
        }

        Ok(())
    }

    fn handle_command(
        &mut self,
        name: &str,
        transaction_id: f64,
        command_object: Amf0Value,
        arguments: Vec<Amf0Value>,
        stream_id: u32,
        timestamp: u32,
    ) -> Result<(), ConnectionError> {
        trace!(name, transaction_id, stream_id, "Command received");

        match name {
            "_result" => match self.transactions.remove(&(transaction_id as u32)) {
                Some(PendingTransaction::Connect) => {
                    self.connect_accepted(&command_object, &arguments)?
                }

                Some(PendingTransaction::CreateStream { key }) => {
                    self.assign_stream_id(key, &arguments)?
                }

                None => debug!(transaction_id, "Result for an unknown transaction"),
            },

            "_error" => {
                let description = error_description(&arguments);
                match self.transactions.remove(&(transaction_id as u32)) {
                    Some(PendingTransaction::Connect) => {
                        warn!(description = %description, "Server rejected connect");
                        self.connect_rejection = Some(description);
                    }

                    Some(PendingTransaction::CreateStream { key }) => {
                        self.create_stream_failed(key, description)
                    }

                    None => warn!(transaction_id, description = %description, "Server error"),
                }
            }

            "onStatus" => self.route_status(stream_id, timestamp, &arguments),
            "onBWDone" => {
                debug!("Server finished its bandwidth check, requesting ours");
                let transaction_id = self.next_transaction();
                self.send_command(
                    "_checkbw",
                    transaction_id,
                    Amf0Value::Null,
                    Vec::new(),
                    INVOKE_CHANNEL,
                    0,
                )?;
            }

            "_onbwcheck" => {
                self.bandwidth_checks += 1;
                self.send_command(
                    "_result",
                    transaction_id as u32,
                    Amf0Value::Null,
                    vec![Amf0Value::Number(f64::from(self.bandwidth_checks))],
                    INVOKE_CHANNEL,
                    0,
                )?;
            }

            "_onbwdone" => {
                let kbps = arguments.iter().find_map(Amf0Value::as_number);
                info!(kbps, "Bandwidth check completed");
                self.shared.info.lock().bandwidth_kbps = kbps;
            }

            "close" => {
                info!("Server closed the connection");
                self.request_remote_disconnect("server sent close".to_string());
            }

            other => match self.rpc_handlers.get(other) {
                Some(handler) => {
                    let handler = handler.clone();
                    self.connection_callback(Box::new(move || (*handler.lock())(&arguments)));
                }

                None => debug!(name = other, "Ignoring unhandled command"),
            },
        }

        Ok(())
    }

    fn connect_accepted(
        &mut self,
        command_object: &Amf0Value,
        arguments: &[Amf0Value],
    ) -> Result<(), ConnectionError> {
        let empty = Amf0Object::new();
        let properties = command_object.as_object().unwrap_or(&empty);
        let version = properties
            .get_ignore_case("fmsVer")
            .and_then(Amf0Value::as_str)
            .map(str::to_string);

        let capabilities = properties
            .get_ignore_case("capabilities")
            .and_then(Amf0Value::as_number);

        let code = arguments
            .iter()
            .filter_map(Amf0Value::as_object)
            .find_map(|info| info.get_ignore_case("code").and_then(Amf0Value::as_str));

        info!(
            version = version.as_deref().unwrap_or("unknown"),
            code = code.unwrap_or(""),
            "Connect accepted"
        );

        {
            let mut info = self.shared.info.lock();
            info.server_version = version;
            info.capabilities = capabilities;
        }

        self.send_connect_follow_up()
    }

    fn assign_stream_id(
        &mut self,
        key: StreamKey,
        arguments: &[Amf0Value],
    ) -> Result<(), ConnectionError> {
        let index = match self.streams.iter().find(|(_, slot)| slot.key == key) {
            Some((index, _)) => index,
            None => {
                debug!(key = ?key, "Stream was deleted before its id arrived");
                return Ok(());
            }
        };

        let stream_id = match arguments.iter().find_map(Amf0Value::as_number) {
            Some(id) => id as u32,
            None => {
                let description = "createStream result carried no stream id".to_string();
                self.create_stream_failed(key, description);
                return Ok(());
            }
        };

        if stream_id == 0 || stream_id as usize >= MAX_STREAMS {
            let error = ConnectionError::StreamIdOutOfRange { stream_id };
            self.create_stream_failed(key, error.to_string());
            return Ok(());
        }

        self.stream_ids[stream_id as usize] = Some(index);
        let buffer_time = self.request_buffer_time(index, stream_id);
        let pending_play = {
            let slot = &mut self.streams[index];
            slot.stream_id = Some(stream_id);
            slot.buffer_time_ms = buffer_time;
            slot.pending_play.take()
        };

        info!(stream_id, buffer_time, "Stream id assigned");
        self.send_buffer_length(stream_id, buffer_time)?;
        if let Some(request) = pending_play {
            self.send_play(stream_id, &request, buffer_time)?;
        }

        self.publish_stream_info(index);
        Ok(())
    }

    /// Asks the stream's handler for its buffer time, waiting for the answer whatever dispatch
    /// is configured
    fn request_buffer_time(&self, index: usize, stream_id: u32) -> u32 {
        let handler = self.streams[index].handler.clone();
        let default = self.config.default_buffer_time_ms;
        let (sender, receiver) = crossbeam_channel::bounded(1);

        self.config.callbacks.status.dispatch_and_wait(Box::new(move || {
            let mut buffer_time = default;
            handler
                .lock()
                .on_assign_stream_id(stream_id, &mut buffer_time);

            let _ = sender.send(buffer_time);
        }));

        receiver.try_recv().unwrap_or(default)
    }

    fn create_stream_failed(&mut self, key: StreamKey, description: String) {
        warn!(key = ?key, description = %description, "Server refused to create a stream");
        if let Some((index, _)) = self.streams.iter().find(|(_, slot)| slot.key == key) {
            // A play waiting on the id can never be sent
            self.streams[index].pending_play = None;
            let status = StreamStatus::synthetic(StatusCode::Failed, description);
            let events = self.streams[index].packets.handle_status(status, 0);
            self.deliver_stream_events(index, events);
        }
    }

    fn route_status(&mut self, stream_id: u32, timestamp: u32, arguments: &[Amf0Value]) {
        let status = match arguments
            .iter()
            .filter_map(Amf0Value::as_object)
            .find_map(StreamStatus::from_info)
        {
            Some(status) => status,
            None => {
                warn!(stream_id, "onStatus without a status code");
                return;
            }
        };

        if stream_id == 0 {
            info!(code = status.code.as_str(), level = %status.level, "Connection status");
            if status.code.as_str() == CONNECTION_CLOSED_CODE {
                self.request_remote_disconnect(CONNECTION_CLOSED_CODE.to_string());
            }

            return;
        }

        let index = match self.stream_index(stream_id) {
            Some(index) => index,
            None => {
                debug!(stream_id, code = status.code.as_str(), "Status for an unknown stream");
                return;
            }
        };

        if status.is_play_failure() {
            warn!(stream_id, code = status.code.as_str(), description = %status.description, "Playback failed");
        } else {
            debug!(stream_id, code = status.code.as_str(), "Stream status");
        }

        let events = self.streams[index].packets.handle_status(status, timestamp);
        self.deliver_stream_events(index, events);
    }

    fn route_audio(&mut self, stream_id: u32, timestamp: u32, data: Bytes) {
        match self.stream_index(stream_id) {
            Some(index) => {
                let events = self.streams[index].packets.handle_audio(timestamp, data);
                self.deliver_stream_events(index, events);
            }

            None => trace!(stream_id, "Audio for an unknown stream"),
        }
    }

    fn route_video(&mut self, stream_id: u32, timestamp: u32, data: Bytes) {
        match self.stream_index(stream_id) {
            Some(index) => {
                let events = self.streams[index].packets.handle_video(timestamp, data);
                self.deliver_stream_events(index, events);
            }

            None => trace!(stream_id, "Video for an unknown stream"),
        }
    }

    fn route_data(&mut self, stream_id: u32, timestamp: u32, values: &[Amf0Value]) {
        match self.stream_index(stream_id) {
            Some(index) => {
                let events = self.streams[index].packets.handle_data(values, timestamp);
                self.deliver_stream_events(index, events);
            }

            None => debug!(stream_id, "Data message for an unknown stream"),
        }
    }

    /// Unpacks an aggregate message.  Each tag becomes a packet of its own, stamped relative to
    /// the aggregate's timestamp.
    fn split_flv_tags(&mut self, stream_id: u32, timestamp: u32, data: Bytes) {
        let tags = match parse_flv_tags(&data) {
            Ok(tags) => tags,
            Err(error) => {
                warn!(stream_id, error = %error, "Dropping malformed aggregate message");
                return;
            }
        };

        let first_timestamp = match tags.first() {
            Some(tag) => tag.timestamp,
            None => return,
        };

        for tag in tags {
            if tag.packet_type == PacketType::FlvTags {
                debug!(stream_id, "Skipping nested aggregate message");
                continue;
            }

            let tag_timestamp = timestamp.wrapping_add(tag.timestamp.wrapping_sub(first_timestamp));
            let packet = RtmpPacket::new(
                0,
                tag.packet_type,
                tag_timestamp,
                stream_id,
                tag.data,
            );

            self.dispatch_packet(packet);
        }
    }
}

/// Pulls a readable reason out of the info object of an `_error`
fn error_description(arguments: &[Amf0Value]) -> String {
    let info = arguments.iter().filter_map(Amf0Value::as_object).next();
    let field = |name: &str| {
        info.and_then(|info| info.get_ignore_case(name))
            .and_then(Amf0Value::as_str)
    };

    match (field("description"), field("code")) {
        (Some(description), _) if !description.is_empty() => description.to_string(),
        (_, Some(code)) => code.to_string(),
        _ => "no description".to_string(),
    }
}
