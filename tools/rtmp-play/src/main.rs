use bytes::Bytes;
use crossbeam_channel::Sender;
use rtmpc::connection::{
    ConnectionConfig, ConnectionHandler, DisconnectReason, RtmpConnection, ServerLink,
    StreamHandler,
};
use rtmpc::stream::{Id3Tags, StatusCode, StreamMetadata, StreamStatus};
use std::env;
use std::fs::File;
use std::io::Write;
use std::process;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Live or recorded, whichever the server has
const START_ANY: i64 = -2;
const PLAY_TO_END: i64 = -1;

enum Finished {
    Disconnected,
    PlaybackEnded,
}

struct Connection {
    finished: Sender<Finished>,
}

impl ConnectionHandler for Connection {
    fn on_connect(&mut self) {
        info!("Connected to server");
    }

    fn on_disconnect(&mut self, reason: DisconnectReason) {
        info!(reason = ?reason, "Disconnected from server");
        let _ = self.finished.send(Finished::Disconnected);
    }
}

struct Player {
    output: Option<File>,
    audio_bytes: u64,
    video_packets: u64,
    finished: Sender<Finished>,
}

impl StreamHandler for Player {
    fn on_assign_stream_id(&mut self, stream_id: u32, buffer_time_ms: &mut u32) {
        info!(stream_id, buffer_time_ms = *buffer_time_ms, "Stream id assigned");
    }

    fn on_status(&mut self, status: &StreamStatus) {
        info!(code = status.code.as_str(), description = %status.description, "Stream status");
        if status.is_play_failure() {
            warn!(code = status.code.as_str(), "Playback failed");
            let _ = self.finished.send(Finished::PlaybackEnded);
        }

        if status.code == StatusCode::PlayComplete {
            let _ = self.finished.send(Finished::PlaybackEnded);
        }
    }

    fn on_metadata(&mut self, metadata: &StreamMetadata) {
        info!(
            duration = ?metadata.duration_seconds,
            audio_codec = ?metadata.audio_codec,
            sample_rate = ?metadata.audio_sample_rate,
            video_codec = ?metadata.video_codec,
            "Metadata received"
        );
    }

    fn on_id3(&mut self, tags: &Id3Tags) {
        info!(tags = ?tags, "ID3 tags received");
    }

    fn on_audio_packet(&mut self, timestamp: u32, data: Bytes) {
        self.audio_bytes += data.len() as u64;
        if let Some(ref mut output) = self.output {
            if let Err(error) = output.write_all(&data) {
                error!(error = %error, "Failed to write audio, no longer saving it");
                self.output = None;
            }
        }

        debug!(timestamp, bytes = data.len(), total = self.audio_bytes, "Audio");
    }

    fn on_video_packet(&mut self, timestamp: u32, data: Bytes) {
        self.video_packets += 1;
        debug!(timestamp, bytes = data.len(), "Video");
    }

    fn on_pause_stream(&mut self, paused: bool) {
        info!(paused, "Pause state changed");
    }

    fn on_disconnect(&mut self) {
        info!(
            audio_bytes = self.audio_bytes,
            video_packets = self.video_packets,
            "Stream disconnected"
        );
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        println!("Usage: rtmp-play <rtmp://host[:port]/app> <stream name> [audio output file]");
        process::exit(1);
    }

    let link = match ServerLink::parse(&args[1]) {
        Ok(link) => link,
        Err(error) => {
            error!(error = %error, "Invalid server link");
            process::exit(1);
        }
    };

    let output = match args.get(3) {
        Some(path) => match File::create(path) {
            Ok(file) => Some(file),
            Err(error) => {
                error!(path = path.as_str(), error = %error, "Could not create output file");
                process::exit(1);
            }
        },

        None => None,
    };

    let (finished, finished_receiver) = crossbeam_channel::unbounded();
    let connection = match RtmpConnection::new(
        ConnectionConfig::new(),
        Box::new(Connection {
            finished: finished.clone(),
        }),
    ) {
        Ok(connection) => connection,
        Err(error) => {
            error!(error = %error, "Could not start the connection");
            process::exit(1);
        }
    };

    connection.connect(
        link,
        Some(Box::new(|accepted: bool| info!(accepted, "Connect finished"))),
        Vec::new(),
    );

    let stream = connection.create_stream(Box::new(Player {
        output,
        audio_bytes: 0,
        video_packets: 0,
        finished,
    }));

    stream.play(&args[2], START_ANY, PLAY_TO_END, true);

    match finished_receiver.recv() {
        Ok(Finished::PlaybackEnded) => {
            if !stream.close_and_wait(Duration::from_secs(5)) {
                warn!("Timed out closing the stream");
            }

            connection.delete_stream(stream);
            connection.close_connection();
        }

        Ok(Finished::Disconnected) | Err(_) => (),
    }

    let info = connection.info();
    info!(
        bytes_in = info.bytes_in,
        bytes_out = info.bytes_out,
        server_version = ?info.server_version,
        "Done"
    );
}
