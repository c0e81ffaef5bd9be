use std::{
    fmt::Display,
    io::{self, Read, Write},
    net::{Shutdown, SocketAddr, TcpStream},
    os::unix::io::{AsRawFd, RawFd},
};

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::endpoint::ConnectionId;

/// Why a connection was removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemovalReason {
    /// The peer hung up.
    Hangup,

    /// A read returned nothing, which is how an orderly close looks.
    NoData,

    /// The socket reported an error condition.
    Error,

    /// Reading from the socket failed, e.g. the connection was reset.
    ReadFailed,

    /// The server is shutting down.
    Shutdown,
}

impl RemovalReason {
    /// Whether the peer went away on its own.
    ///
    /// A hangup and an empty read are two ways of seeing the same thing.
    pub fn is_peer_disconnect(&self) -> bool {
        matches!(self, RemovalReason::Hangup | RemovalReason::NoData)
    }
}

impl Display for RemovalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemovalReason::Hangup => write!(f, "HUP"),
            RemovalReason::NoData => write!(f, "got no data"),
            RemovalReason::Error => write!(f, "received error"),
            RemovalReason::ReadFailed => write!(f, "read failed"),
            RemovalReason::Shutdown => write!(f, "server shutting down"),
        }
    }
}

/// A connected client.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    stream: TcpStream,
    peer: Option<SocketAddr>,
}

impl Connection {
    pub(crate) fn new(id: ConnectionId, stream: TcpStream, peer: Option<SocketAddr>) -> Self {
        Self { id, stream, peer }
    }

    /// The id this connection is known by.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// A name suitable for diagnostics.
    /// The peer address if known, otherwise the connection id.
    pub fn label(&self) -> String {
        self.peer
            .map(|peer| peer.to_string())
            .unwrap_or_else(|| self.id.to_string())
    }

    pub(crate) fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }

    /// Send the bytes as-is.
    /// The socket is non-blocking, so a slow client may only get part of it.
    pub(crate) fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        trace!(id = %self.id, len = bytes.len(), "Sending");
        self.stream.write_all(bytes)
    }

    /// Close the socket.
    /// The peer might be long gone, so failing to shut down is fine.
    pub(crate) fn close(self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

impl AsRawFd for Connection {
    fn as_raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }
}
