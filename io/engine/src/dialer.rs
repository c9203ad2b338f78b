//! Non-blocking connect for a single candidate address.

use mio::net::TcpStream;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::SocketAddr;

/// Opens a non-blocking stream whose connect is still in progress.
///
/// The state machine registers the returned stream and waits for writable
/// readiness to learn the result. An `Err` means this candidate failed
/// synchronously and the next one should be tried.
pub trait Dialer {
    fn dial(&mut self, addr: SocketAddr) -> io::Result<TcpStream>;
}

/// Dialer that creates a TCP socket matching the candidate's family.
#[derive(Debug, Clone, Copy)]
pub struct TcpDialer {
    nodelay: bool,
}

impl TcpDialer {
    pub fn new(nodelay: bool) -> Self {
        Self { nodelay }
    }
}

impl Default for TcpDialer {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Dialer for TcpDialer {
    fn dial(&mut self, addr: SocketAddr) -> io::Result<TcpStream> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_nonblocking(true)?;
        if self.nodelay {
            socket.set_nodelay(true)?;
        }

        match socket.connect(&addr.into()) {
            // A non-blocking connect must always complete asynchronously
            Ok(()) => Err(io::Error::other(
                "non-blocking connect completed synchronously",
            )),
            Err(e) if e.raw_os_error() == Some(libc::EINPROGRESS) => {
                let stream: std::net::TcpStream = socket.into();
                Ok(TcpStream::from_std(stream))
            }
            Err(e) => Err(e),
        }
    }
}
