use rtmpc::chunk_io::{ChunkDeserializationError, ChunkDeserializer};
use rtmpc::messages::{parse_flv_tags, RtmpMessage};
use std::env;
use std::fs::File;
use std::io::{self, BufReader, Read};

/// Counts the bytes pulled through it so every message can be located in the capture
struct CountingReader<R> {
    inner: R,
    position: u64,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
        let count = self.inner.read(buffer)?;
        self.position += count as u64;
        Ok(count)
    }
}

fn main() {
    println!("RTMP Log reader");
    println!("This reads raw binary logged from a single direction in an RTMP stream,");
    println!("starting right after the handshake");
    println!();

    let args: Vec<String> = env::args().collect();
    if args.len() <= 1 {
        println!("No file specified to read.  Pass the path to the file you wish to read,");
        println!("and --step to wait for enter after every message");
        return;
    }

    let step = args.iter().skip(2).any(|arg| arg == "--step");

    println!("Reading file: {}", args[1]);
    println!();

    let file = match File::open(&args[1]) {
        Ok(file) => file,
        Err(error) => {
            println!("Could not open file: {}", error);
            return;
        }
    };

    let mut reader = CountingReader {
        inner: BufReader::new(file),
        position: 0,
    };

    let mut deserializer = ChunkDeserializer::new();
    let mut message_number = 1;
    let mut last_message_end = 0;

    loop {
        let packet = match deserializer.read_packet(&mut reader) {
            Ok(packet) => packet,
            Err(ChunkDeserializationError::Framing(ref error))
                if error.kind() == io::ErrorKind::UnexpectedEof =>
            {
                println!("Finished reading log file!");
                return;
            }

            Err(error) => {
                println!("Could not read chunk at index {}: {}", reader.position, error);
                return;
            }
        };

        println!(
            "Message: {}   Timestamp: {}   Type: {:?}    Stream_Id: {}   Channel: {}   index: {} ({:x})",
            message_number,
            packet.timestamp,
            packet.packet_type,
            packet.stream_id,
            packet.channel,
            last_message_end,
            last_message_end
        );

        match RtmpMessage::from_packet(&packet) {
            Ok(RtmpMessage::SetChunkSize { size }) => {
                if let Err(error) = deserializer.set_max_chunk_size(size as usize) {
                    println!("Invalid chunk size: {}", error);
                    return;
                }

                println!("SetChunkSize {{ size: {} }}", size);
            }

            Ok(RtmpMessage::AudioData { data }) => println!("AudioData {{ data: {} }}", hex(&data)),
            Ok(RtmpMessage::VideoData { data }) => println!("VideoData {{ data: {} }}", hex(&data)),
            Ok(RtmpMessage::Unknown { type_id, data }) => {
                println!("Unknown {{ type_id: {}, data: {} }}", type_id, hex(&data))
            }

            Ok(RtmpMessage::FlvTags { data }) => match parse_flv_tags(&data) {
                Ok(tags) => {
                    println!("FlvTags {{ count: {} }}", tags.len());
                    for tag in tags {
                        println!(
                            "    {:?} at {}: {}",
                            tag.packet_type,
                            tag.timestamp,
                            hex(&tag.data)
                        );
                    }
                }

                Err(error) => println!("FlvTags that could not be parsed: {}", error),
            },

            Ok(message) => println!("{:?}", message),
            Err(error) => println!("Could not decode message: {}", error),
        }

        println!();
        if step {
            println!("Press enter to read next message");
            let mut input = String::new();
            if io::stdin().read_line(&mut input).is_err() {
                return;
            }
        }

        message_number += 1;
        last_message_end = reader.position;
    }
}

/// First hundred bytes of a payload, plus its length when truncated
fn hex(data: &[u8]) -> String {
    let mut text: String = data.iter().take(100).map(|byte| format!("{:02x}", byte)).collect();
    if data.len() > 100 {
        text.push_str(&format!(".. ({})", data.len()));
    }

    text
}
