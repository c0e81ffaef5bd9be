use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Identifies a client connection for as long as the server runs.
///
/// Ids are handed out in increasing order when connections are accepted and are
/// never reused, unlike the OS file descriptors of the sockets.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ConnectionId(pub(crate) u64);

impl Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "client #{}", self.0)
    }
}

/// Something the server watches for readiness.
///
/// The kind is attached when the endpoint is registered,
/// so dispatch never has to compare descriptors to find out what became ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Endpoint {
    /// The listening socket.
    Listener,

    /// The serial device.
    Device,

    /// A connected client.
    Connection(ConnectionId),
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Listener => write!(f, "listener"),
            Endpoint::Device => write!(f, "device"),
            Endpoint::Connection(id) => write!(f, "{id}"),
        }
    }
}
