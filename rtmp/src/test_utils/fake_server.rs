//! A scripted RTMP server on a loopback socket.
//!
//! Tests drive the server side by hand: they read what the client sent and decide what to answer
//! and when.  Every read gives up after a few seconds so a broken client fails the test instead
//! of hanging it.

use crate::chunk_io::{ChunkDeserializer, ChunkSerializer, INVOKE_CHANNEL, STREAM_INVOKE_CHANNEL};
use crate::connection::{Protocol, ServerLink};
use crate::messages::RtmpMessage;
use rand::Rng;
use rtmpc_amf0::{Amf0Object, Amf0Value};
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

const HANDSHAKE_PACKET_SIZE: usize = 1536;
const READ_TIMEOUT: Duration = Duration::from_secs(5);

pub struct FakeServer {
    listener: TcpListener,
}

impl FakeServer {
    pub fn bind() -> FakeServer {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        FakeServer { listener }
    }

    pub fn port(&self) -> u16 {
        self.listener.local_addr().unwrap().port()
    }

    pub fn link(&self, app: &str) -> ServerLink {
        ServerLink::new(Protocol::Rtmp, "127.0.0.1", self.port(), app)
    }

    /// Waits for the client and completes a plain handshake with it
    pub fn accept(&self) -> ServerConnection {
        let deadline = Instant::now() + READ_TIMEOUT;
        let stream = loop {
            match self.listener.accept() {
                Ok((stream, _)) => break stream,
                Err(ref error) if error.kind() == ErrorKind::WouldBlock => {
                    assert!(Instant::now() < deadline, "No client connected in time");
                    thread::sleep(Duration::from_millis(5));
                }

                Err(error) => panic!("Accept failed: {}", error),
            }
        };

        stream.set_nonblocking(false).unwrap();
        stream.set_read_timeout(Some(READ_TIMEOUT)).unwrap();
        stream.set_nodelay(true).unwrap();

        let mut connection = ServerConnection {
            stream,
            reader: ChunkDeserializer::new(),
            writer: ChunkSerializer::new(),
        };

        connection.handshake();
        connection
    }
}

pub struct ServerConnection {
    stream: TcpStream,
    reader: ChunkDeserializer,
    writer: ChunkSerializer,
}

impl ServerConnection {
    /// Answers like a server without FP9 support: a zero version in S1 and S2 echoing C1
    fn handshake(&mut self) {
        let mut c0_c1 = vec![0_u8; HANDSHAKE_PACKET_SIZE + 1];
        self.stream.read_exact(&mut c0_c1).unwrap();
        assert_eq!(c0_c1[0], 3, "Unexpected handshake version");

        let mut s1 = vec![0_u8; HANDSHAKE_PACKET_SIZE];
        rand::thread_rng().fill(&mut s1[8..]);

        let mut response = vec![3_u8];
        response.extend_from_slice(&s1);
        response.extend_from_slice(&c0_c1[1..]);
        self.stream.write_all(&response).unwrap();

        let mut c2 = vec![0_u8; HANDSHAKE_PACKET_SIZE];
        self.stream.read_exact(&mut c2).unwrap();
    }

    /// Reads the next message and the message stream id it was sent on.  Chunk size changes
    /// from the client are applied before returning them.
    pub fn read_message(&mut self) -> (RtmpMessage, u32) {
        let packet = self.reader.read_packet(&mut self.stream).unwrap();
        let message = RtmpMessage::from_packet(&packet).unwrap();
        if let RtmpMessage::SetChunkSize { size } = message {
            self.reader.set_max_chunk_size(size as usize).unwrap();
        }

        (message, packet.stream_id)
    }

    /// Skips messages until the command called `name` arrives.  Returns its transaction id,
    /// command object, arguments and message stream id.
    pub fn read_command(&mut self, name: &str) -> (f64, Amf0Value, Vec<Amf0Value>, u32) {
        loop {
            if let (
                RtmpMessage::Amf0Command {
                    command_name,
                    transaction_id,
                    command_object,
                    additional_arguments,
                },
                stream_id,
            ) = self.read_message()
            {
                if command_name == name {
                    return (transaction_id, command_object, additional_arguments, stream_id);
                }
            }
        }
    }

    pub fn send(&mut self, message: RtmpMessage, channel: u32, stream_id: u32, timestamp: u32) {
        let packet = message.into_packet(channel, timestamp, stream_id).unwrap();
        let bytes = self.writer.serialize(&packet, false).unwrap();
        self.stream.write_all(&bytes).unwrap();
        self.stream.flush().unwrap();
    }

    pub fn set_chunk_size(&mut self, size: u32) {
        let bytes = self.writer.set_max_chunk_size(size, 0).unwrap();
        self.stream.write_all(&bytes).unwrap();
    }

    pub fn send_command(
        &mut self,
        name: &str,
        transaction_id: f64,
        command_object: Amf0Value,
        arguments: Vec<Amf0Value>,
        stream_id: u32,
    ) {
        let channel = if stream_id == 0 {
            INVOKE_CHANNEL
        } else {
            STREAM_INVOKE_CHANNEL
        };

        let message = RtmpMessage::Amf0Command {
            command_name: name.to_string(),
            transaction_id,
            command_object,
            additional_arguments: arguments,
        };

        self.send(message, channel, stream_id, 0);
    }

    pub fn send_result(&mut self, transaction_id: f64, object: Amf0Value, arguments: Vec<Amf0Value>) {
        self.send_command("_result", transaction_id, object, arguments, 0);
    }

    pub fn send_status(&mut self, stream_id: u32, code: &str) {
        self.send_command("onStatus", 0.0, Amf0Value::Null, vec![status_info(code)], stream_id);
    }

    /// Reads `connect` and accepts it
    pub fn accept_connect(&mut self) -> Amf0Object {
        let (transaction_id, object, _, _) = self.read_command("connect");
        let mut properties = Amf0Object::new();
        properties.insert("fmsVer", Amf0Value::Utf8String("FMS/3,5,7,7009".to_string()));
        properties.insert("capabilities", Amf0Value::Number(31.0));

        self.send_result(
            transaction_id,
            Amf0Value::Object(properties),
            vec![status_info("NetConnection.Connect.Success")],
        );

        object.get_object_properties().unwrap()
    }

    /// Reads `createStream` and answers with the given stream id
    pub fn accept_create_stream(&mut self, stream_id: u32) {
        let (transaction_id, _, _, _) = self.read_command("createStream");
        self.send_result(
            transaction_id,
            Amf0Value::Null,
            vec![Amf0Value::Number(f64::from(stream_id))],
        );
    }

    pub fn audio(&mut self, stream_id: u32, timestamp: u32, body: Vec<u8>) {
        self.send(
            RtmpMessage::AudioData { data: body.into() },
            4,
            stream_id,
            timestamp,
        );
    }

    pub fn disconnect(self) {
        drop(self.stream);
    }
}

pub fn status_info(code: &str) -> Amf0Value {
    let mut info = Amf0Object::new();
    info.insert("level", Amf0Value::Utf8String("status".to_string()));
    info.insert("code", Amf0Value::Utf8String(code.to_string()));
    info.insert("description", Amf0Value::Utf8String(code.to_string()));
    Amf0Value::Object(info)
}
