//! Callbacks raised by a connection and the ways they can be executed.
//!
//! Every callback is wrapped into a `CallbackJob` and handed to the `CallbackDispatch` configured
//! for its kind.  Jobs never unwind into the pump, a panicking handler is logged and forgotten.

use super::command_queue::CommandQueue;
use crate::stream::{Id3Tags, StreamMetadata, StreamStatus};
use bytes::Bytes;
use crossbeam_channel::{Receiver, Sender};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{error, warn};

pub type CallbackJob = Box<dyn FnOnce() + Send>;

/// Runs callback jobs on behalf of the embedding application, e.g. by forwarding them to a UI
/// thread
pub trait CallbackExecutor: Send + Sync {
    fn execute(&self, job: CallbackJob);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallbackMode {
    /// The pump waits until the executor has run the job
    Synchronous,

    /// The pump continues as soon as the job is handed over
    Asynchronous,
}

/// Where the callbacks of one kind run
#[derive(Clone)]
pub enum CallbackDispatch {
    /// Directly on the pump thread, at the point the event is raised
    Inline,

    /// On the pump thread, through the command queue, ahead of any queued commands
    PumpQueue,

    Executor(Arc<dyn CallbackExecutor>, CallbackMode),
}

impl fmt::Debug for CallbackDispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            CallbackDispatch::Inline => f.write_str("Inline"),
            CallbackDispatch::PumpQueue => f.write_str("PumpQueue"),
            CallbackDispatch::Executor(_, mode) => write!(f, "Executor({:?})", mode),
        }
    }
}

impl CallbackDispatch {
    pub(crate) fn dispatch(&self, queue: &CommandQueue, job: CallbackJob) {
        match *self {
            CallbackDispatch::Inline => run_guarded(job),
            CallbackDispatch::PumpQueue => {
                queue.post_callback(job);
            }

            CallbackDispatch::Executor(ref executor, CallbackMode::Asynchronous) => {
                executor.execute(Box::new(move || run_guarded(job)));
            }

            CallbackDispatch::Executor(ref executor, CallbackMode::Synchronous) => {
                run_on_executor(executor.as_ref(), job);
            }
        }
    }

    /// Runs the job and returns once it finished, whatever the configured mode.  Used for the
    /// callbacks whose answer the pump needs.
    pub(crate) fn dispatch_and_wait(&self, job: CallbackJob) {
        match *self {
            CallbackDispatch::Inline | CallbackDispatch::PumpQueue => run_guarded(job),
            CallbackDispatch::Executor(ref executor, _) => run_on_executor(executor.as_ref(), job),
        }
    }
}

fn run_on_executor(executor: &dyn CallbackExecutor, job: CallbackJob) {
    let (sender, receiver) = crossbeam_channel::bounded(1);
    executor.execute(Box::new(move || {
        run_guarded(job);
        let _ = sender.send(());
    }));

    // A dropped job drops the sender too, so this can't hang on a discarding executor
    if receiver.recv().is_err() {
        warn!("Callback executor discarded a synchronous job");
    }
}

pub(crate) fn run_guarded(job: CallbackJob) {
    if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(job)) {
        error!(message = panic_message(&*panic), "Callback panicked");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic payload"
    }
}

/// Picks a dispatch per callback kind
#[derive(Clone, Debug)]
pub struct CallbackRouting {
    /// Connection level callbacks and RPC handlers
    pub connection: CallbackDispatch,

    /// Stream status, metadata, pause and assignment callbacks
    pub status: CallbackDispatch,

    /// Audio and video packets
    pub media: CallbackDispatch,
}

impl CallbackRouting {
    pub fn all(dispatch: CallbackDispatch) -> CallbackRouting {
        CallbackRouting {
            connection: dispatch.clone(),
            status: dispatch.clone(),
            media: dispatch,
        }
    }
}

impl Default for CallbackRouting {
    fn default() -> Self {
        CallbackRouting::all(CallbackDispatch::PumpQueue)
    }
}

/// Executor that sends every job over a channel.  Whoever owns the receiver decides which
/// thread runs them.
#[derive(Clone)]
pub struct ChannelExecutor {
    sender: Sender<CallbackJob>,
}

impl ChannelExecutor {
    pub fn new() -> (ChannelExecutor, Receiver<CallbackJob>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (ChannelExecutor { sender }, receiver)
    }
}

impl CallbackExecutor for ChannelExecutor {
    fn execute(&self, job: CallbackJob) {
        if self.sender.send(job).is_err() {
            warn!("Callback receiver is gone, dropping callback");
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DisconnectReason {
    /// `close_connection` was called or the connection was dropped
    Requested,

    /// The server closed the connection or the socket failed
    Remote(String),

    ConnectFailed(String),
}

/// Connection level notifications.  Every method has an empty default.
pub trait ConnectionHandler: Send {
    /// The server accepted `connect`.  Raised once per successful connect.
    fn on_connect(&mut self) {}

    fn on_disconnect(&mut self, _reason: DisconnectReason) {}

    fn on_tick(&mut self) {}
}

/// Notifications for one logical stream.  Every method has an empty default.
pub trait StreamHandler: Send {
    /// The server assigned the stream its id.  `buffer_time_ms` holds the configured default
    /// and may be changed, the final value is sent to the server as the stream's buffer length.
    fn on_assign_stream_id(&mut self, _stream_id: u32, _buffer_time_ms: &mut u32) {}

    fn on_status(&mut self, _status: &StreamStatus) {}

    fn on_metadata(&mut self, _metadata: &StreamMetadata) {}

    fn on_id3(&mut self, _tags: &Id3Tags) {}

    fn on_audio_packet(&mut self, _timestamp: u32, _data: Bytes) {}

    fn on_video_packet(&mut self, _timestamp: u32, _data: Bytes) {}

    fn on_pause_stream(&mut self, _paused: bool) {}

    fn on_tick(&mut self) {}

    fn on_disconnect(&mut self) {}
}
