/*!
The connection engine: one thread per connection (the pump) owns the socket and every piece of
protocol state.  `RtmpConnection` and `RtmpStream` are thin handles that queue commands for it,
and everything the server sends comes back through the `ConnectionHandler` and `StreamHandler`
callbacks.

```no_run
use rtmpc::connection::{ConnectionConfig, ConnectionHandler, RtmpConnection, ServerLink, StreamHandler};
use bytes::Bytes;

struct Connection;
impl ConnectionHandler for Connection {}

struct Player;
impl StreamHandler for Player {
    fn on_audio_packet(&mut self, timestamp: u32, data: Bytes) {
        println!("{} bytes of audio at {}", data.len(), timestamp);
    }
}

let connection = RtmpConnection::new(ConnectionConfig::new(), Box::new(Connection)).unwrap();
connection.connect(ServerLink::parse("rtmp://localhost/vod").unwrap(), None, Vec::new());

let stream = connection.create_stream(Box::new(Player));
stream.play("mp3:song", 0, -1, true);
```
*/

mod command_queue;
mod config;
mod dispatch;
mod errors;
mod events;
mod info;
mod link;
mod pump;
mod socket;


pub use self::command_queue::PlayRequest;
pub use self::config::ConnectionConfig;
pub use self::errors::ConnectionError;
pub use self::events::{
    CallbackDispatch, CallbackExecutor, CallbackJob, CallbackMode, CallbackRouting,
    ChannelExecutor, ConnectionHandler, DisconnectReason, StreamHandler,
};
pub use self::info::{ConnectionInfo, ConnectionState, StreamInfo};
pub use self::link::{Protocol, ServerLink, DEFAULT_PORT};

use self::command_queue::{Command, CommandQueue};
use self::pump::Pump;
use parking_lot::Mutex;
use rtmpc_amf0::Amf0Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::warn;

/// Told whether the server accepted `connect`
pub type ConnectResultCallback = Box<dyn FnOnce(bool) + Send>;

/// Called with the arguments of a server invoke registered by name
pub type RpcHandler = Box<dyn FnMut(&[Amf0Value]) + Send>;

/// Opaque handle of a stream inside the pump's stream table
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StreamKey(u64);

/// State visible to both the pump and the handles
pub(crate) struct Shared {
    queue: CommandQueue,
    info: Mutex<ConnectionInfo>,
    streams: Mutex<HashMap<StreamKey, StreamInfo>>,
    next_stream_key: AtomicU64,
}

impl Shared {
    fn new() -> Shared {
        Shared {
            queue: CommandQueue::new(),
            info: Mutex::new(ConnectionInfo::new()),
            streams: Mutex::new(HashMap::new()),
            next_stream_key: AtomicU64::new(1),
        }
    }
}

/// Client side of one RTMP connection.  Dropping it tears the connection down and stops the
/// pump thread.
pub struct RtmpConnection {
    shared: Arc<Shared>,
    pump: Option<JoinHandle<()>>,
}

impl RtmpConnection {
    /// Starts the pump thread.  Nothing is sent until `connect` is called.
    pub fn new(
        config: ConnectionConfig,
        handler: Box<dyn ConnectionHandler>,
    ) -> Result<RtmpConnection, ConnectionError> {
        let shared = Arc::new(Shared::new());
        let pump = Pump::new(shared.clone(), config, handler);
        let thread = thread::Builder::new()
            .name("rtmp-pump".to_string())
            .spawn(move || pump.run())?;

        Ok(RtmpConnection {
            shared,
            pump: Some(thread),
        })
    }

    /// Queues a connection attempt.  `properties` are sent as extra arguments of the `connect`
    /// command.  The outcome is reported to `result` and, on success, to
    /// `ConnectionHandler::on_connect`.
    pub fn connect(
        &self,
        link: ServerLink,
        result: Option<ConnectResultCallback>,
        properties: Vec<Amf0Value>,
    ) {
        self.shared.queue.post(Command::Connect {
            link,
            properties,
            result,
        });
    }

    pub fn close_connection(&self) {
        self.shared.queue.post(Command::Close);
    }

    /// Registers a new logical stream.  The server is asked for a stream id straight away,
    /// commands issued before it arrives are held by the pump.
    pub fn create_stream(&self, handler: Box<dyn StreamHandler>) -> RtmpStream {
        let key = StreamKey(self.shared.next_stream_key.fetch_add(1, Ordering::SeqCst));
        self.shared.queue.post(Command::CreateStream { key, handler });

        RtmpStream {
            shared: self.shared.clone(),
            key,
        }
    }

    pub fn delete_stream(&self, stream: RtmpStream) {
        self.shared
            .queue
            .post(Command::DeleteStream { key: stream.key });
    }

    pub fn send_ping(&self) {
        self.shared.queue.post(Command::SendPing);
    }

    /// Calls `handler` whenever the server invokes `name` on the connection
    pub fn register_rpc_handler<F>(&self, name: &str, handler: F)
    where
        F: FnMut(&[Amf0Value]) + Send + 'static,
    {
        self.shared.queue.post(Command::RegisterRpc {
            name: name.to_string(),
            handler: Box::new(handler),
        });
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.info.lock().state
    }

    pub fn info(&self) -> ConnectionInfo {
        self.shared.info.lock().clone()
    }
}

impl Drop for RtmpConnection {
    fn drop(&mut self) {
        self.shared.queue.post(Command::Shutdown);
        if let Some(pump) = self.pump.take() {
            if pump.join().is_err() {
                warn!("Message pump thread panicked");
            }
        }
    }
}

/// Handle to a logical stream of a connection
pub struct RtmpStream {
    shared: Arc<Shared>,
    key: StreamKey,
}

impl RtmpStream {
    pub fn key(&self) -> StreamKey {
        self.key
    }

    /// Requests playback of `name`.  Start and length are in milliseconds, with the usual
    /// negative sentinels (-2 live or recorded, -1 live only for the start, -1 for "until the
    /// end" as the length).
    pub fn play(&self, name: &str, start_ms: i64, length_ms: i64, reset: bool) {
        self.shared.queue.post(Command::Play {
            key: self.key,
            request: PlayRequest {
                name: name.to_string(),
                start_ms,
                length_ms,
                reset,
            },
        });
    }

    pub fn pause(&self, pause: bool) {
        self.shared.queue.post(Command::Pause {
            key: self.key,
            pause,
        });
    }

    pub fn seek(&self, position_ms: u32) {
        self.shared.queue.post(Command::Seek {
            key: self.key,
            position_ms,
        });
    }

    pub fn close(&self) {
        self.shared.queue.post(Command::CloseStream { key: self.key });
    }

    /// Closes the stream and blocks until the pump has sent the close.  Returns false on
    /// timeout.
    pub fn close_and_wait(&self, timeout: Duration) -> bool {
        let sequence = self.shared.queue.post(Command::CloseStream { key: self.key });
        self.shared.queue.wait_until_processed(sequence, timeout)
    }

    /// None until the pump has registered the stream, and again after it was deleted
    pub fn info(&self) -> Option<StreamInfo> {
        self.shared.streams.lock().get(&self.key).cloned()
    }
}
