use super::events::{CallbackJob, StreamHandler};
use super::{ConnectResultCallback, RpcHandler, ServerLink, StreamKey};
use parking_lot::{Condvar, Mutex};
use rtmpc_amf0::Amf0Value;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[derive(Clone, Debug, PartialEq)]
pub struct PlayRequest {
    pub name: String,
    pub start_ms: i64,
    pub length_ms: i64,
    pub reset: bool,
}

/// Work for the pump thread, one variant per kind of request
pub(crate) enum Command {
    Connect {
        link: ServerLink,
        properties: Vec<Amf0Value>,
        result: Option<ConnectResultCallback>,
    },

    Close,
    SendPing,

    CreateStream {
        key: StreamKey,
        handler: Box<dyn StreamHandler>,
    },

    DeleteStream {
        key: StreamKey,
    },

    Play {
        key: StreamKey,
        request: PlayRequest,
    },

    Pause {
        key: StreamKey,
        pause: bool,
    },

    Seek {
        key: StreamKey,
        position_ms: u32,
    },

    CloseStream {
        key: StreamKey,
    },

    RegisterRpc {
        name: String,
        handler: RpcHandler,
    },

    /// Raised by the pump itself when the transport failed or the server hung up.  Only
    /// applies to the connection attempt numbered `generation`.
    RemoteDisconnect {
        reason: String,
        generation: u64,
    },

    Shutdown,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match *self {
            Command::Connect { .. } => "connect",
            Command::Close => "close",
            Command::SendPing => "send_ping",
            Command::CreateStream { .. } => "create_stream",
            Command::DeleteStream { .. } => "delete_stream",
            Command::Play { .. } => "play",
            Command::Pause { .. } => "pause",
            Command::Seek { .. } => "seek",
            Command::CloseStream { .. } => "close_stream",
            Command::RegisterRpc { .. } => "register_rpc",
            Command::RemoteDisconnect { .. } => "remote_disconnect",
            Command::Shutdown => "shutdown",
        }
    }
}

pub(crate) enum QueueEntry {
    Command(Command),
    Callback(CallbackJob),
}

impl QueueEntry {
    fn is_callback(&self) -> bool {
        match *self {
            QueueEntry::Callback(_) => true,
            QueueEntry::Command(_) => false,
        }
    }
}

struct QueueState {
    entries: VecDeque<(u64, QueueEntry)>,
    next_sequence: u64,
    in_flight: Option<u64>,
}

/// FIFO of work for the pump.  Callbacks jump ahead of every queued command but stay in order
/// among themselves.
pub(crate) struct CommandQueue {
    state: Mutex<QueueState>,
    work_posted: Condvar,
    work_completed: Condvar,
}

impl CommandQueue {
    pub fn new() -> CommandQueue {
        CommandQueue {
            state: Mutex::new(QueueState {
                entries: VecDeque::new(),
                next_sequence: 0,
                in_flight: None,
            }),
            work_posted: Condvar::new(),
            work_completed: Condvar::new(),
        }
    }

    /// Appends a command, returning its sequence number
    pub fn post(&self, command: Command) -> u64 {
        let mut state = self.state.lock();
        let sequence = next_sequence(&mut state);
        state
            .entries
            .push_back((sequence, QueueEntry::Command(command)));

        self.work_posted.notify_one();
        sequence
    }

    pub fn post_callback(&self, job: CallbackJob) -> u64 {
        let mut state = self.state.lock();
        let sequence = next_sequence(&mut state);
        let position = state
            .entries
            .iter()
            .position(|(_, entry)| !entry.is_callback())
            .unwrap_or_else(|| state.entries.len());

        state
            .entries
            .insert(position, (sequence, QueueEntry::Callback(job)));

        self.work_posted.notify_one();
        sequence
    }

    /// Takes the next entry.  It counts as in flight until `complete` is called.
    pub fn pop(&self) -> Option<(u64, QueueEntry)> {
        let mut state = self.state.lock();
        let next = state.entries.pop_front();
        if let Some((sequence, _)) = next {
            state.in_flight = Some(sequence);
        }

        next
    }

    pub fn complete(&self, sequence: u64) {
        let mut state = self.state.lock();
        if state.in_flight == Some(sequence) {
            state.in_flight = None;
        }

        self.work_completed.notify_all();
    }

    pub fn front_is_callback(&self) -> bool {
        let state = self.state.lock();
        match state.entries.front() {
            Some((_, entry)) => entry.is_callback(),
            None => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Sleeps until something is posted or the timeout passes
    pub fn wait_for_work(&self, timeout: Duration) {
        let mut state = self.state.lock();
        if state.entries.is_empty() {
            self.work_posted.wait_for(&mut state, timeout);
        }
    }

    /// Blocks the calling thread until the entry with the given sequence number has been
    /// processed.  Returns false if that did not happen within the timeout.
    pub fn wait_until_processed(&self, sequence: u64, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            let pending = state.in_flight == Some(sequence)
                || state.entries.iter().any(|(queued, _)| *queued == sequence);

            if !pending {
                return true;
            }

            if self
                .work_completed
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return false;
            }
        }
    }

    /// Empties the queue, used once the pump stops
    pub fn drain(&self) -> Vec<QueueEntry> {
        let mut state = self.state.lock();
        let entries = state.entries.drain(..).map(|(_, entry)| entry).collect();
        self.work_completed.notify_all();
        entries
    }
}

fn next_sequence(state: &mut QueueState) -> u64 {
    let sequence = state.next_sequence;
    state.next_sequence += 1;
    sequence
}
