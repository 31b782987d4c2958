use super::{ConnectionError, ServerLink};
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Blocking reads are retried in slices of this length until the socket timeout is used up
const READ_SLICE: Duration = Duration::from_millis(100);

/// A TCP socket with the timeout semantics the pump expects.  A read that makes no progress
/// within the socket timeout, or hits the end of the stream, fails and means the server is gone.
pub(crate) struct RtmpSocket {
    stream: TcpStream,
    timeout: Duration,
    bytes_in: u64,
    bytes_out: u64,
    last_received: Instant,
}

impl RtmpSocket {
    pub fn connect(
        link: &ServerLink,
        connect_timeout: Duration,
        socket_timeout: Duration,
    ) -> Result<RtmpSocket, ConnectionError> {
        let addresses: Vec<_> = (link.host.as_str(), link.port)
            .to_socket_addrs()
            .map_err(|_| ConnectionError::AddressResolution {
                host: link.host.clone(),
            })?
            .collect();

        if addresses.is_empty() {
            return Err(ConnectionError::AddressResolution {
                host: link.host.clone(),
            });
        }

        let mut last_error = None;
        for address in addresses {
            debug!(%address, "Opening TCP connection");
            match TcpStream::connect_timeout(&address, connect_timeout) {
                Ok(stream) => {
                    info!(%address, "TCP connection established");
                    return RtmpSocket::from_stream(stream, socket_timeout);
                }

                Err(error) => last_error = Some(error),
            }
        }

        match last_error {
            Some(ref error) if error.kind() == io::ErrorKind::TimedOut => {
                Err(ConnectionError::ConnectTimeout {
                    address: link.address(),
                })
            }

            Some(error) => Err(ConnectionError::Io(error)),
            None => Err(ConnectionError::AddressResolution {
                host: link.host.clone(),
            }),
        }
    }

    pub fn from_stream(stream: TcpStream, timeout: Duration) -> Result<RtmpSocket, ConnectionError> {
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(READ_SLICE))?;
        stream.set_write_timeout(Some(timeout))?;

        Ok(RtmpSocket {
            stream,
            timeout,
            bytes_in: 0,
            bytes_out: 0,
            last_received: Instant::now(),
        })
    }

    /// True if at least one byte can be read without blocking.  The end of the stream is
    /// reported as an `UnexpectedEof` error.
    pub fn has_data(&mut self) -> io::Result<bool> {
        self.stream.set_nonblocking(true)?;
        let mut byte = [0_u8; 1];
        let result = self.stream.peek(&mut byte);
        self.stream.set_nonblocking(false)?;

        match result {
            Ok(0) => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "server closed the connection",
            )),

            Ok(_) => Ok(true),
            Err(ref error) if error.kind() == io::ErrorKind::WouldBlock => Ok(false),
            Err(error) => Err(error),
        }
    }

    pub fn bytes_in(&self) -> u64 {
        self.bytes_in
    }

    pub fn bytes_out(&self) -> u64 {
        self.bytes_out
    }

    /// Time since anything was last received
    pub fn idle_for(&self) -> Duration {
        self.last_received.elapsed()
    }
}

impl Read for RtmpSocket {
    fn read(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
        if buffer.is_empty() {
            return Ok(0);
        }

        let started = Instant::now();
        loop {
            match self.stream.read(buffer) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "server closed the connection",
                    ))
                }

                Ok(count) => {
                    self.bytes_in += count as u64;
                    self.last_received = Instant::now();
                    return Ok(count);
                }

                Err(ref error)
                    if error.kind() == io::ErrorKind::WouldBlock
                        || error.kind() == io::ErrorKind::TimedOut =>
                {
                    if started.elapsed() >= self.timeout {
                        return Err(io::Error::new(
                            io::ErrorKind::TimedOut,
                            "no data received within the socket timeout",
                        ));
                    }
                }

                Err(ref error) if error.kind() == io::ErrorKind::Interrupted => (),
                Err(error) => return Err(error),
            }
        }
    }
}

impl Write for RtmpSocket {
    fn write(&mut self, buffer: &[u8]) -> io::Result<usize> {
        let count = self.stream.write(buffer)?;
        self.bytes_out += count as u64;
        Ok(count)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}
