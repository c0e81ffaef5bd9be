use std::{
    collections::BTreeMap,
    net::{SocketAddr, TcpStream},
};

use tracing::{debug, warn};

use crate::{
    endpoint::{ConnectionId, Endpoint},
    error::Error,
    multiplexer::Multiplexer,
    peer::{Connection, RemovalReason},
};

/// What is left of a connection after it was removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removed {
    /// The id it had.
    pub id: ConnectionId,

    /// Its diagnostic label.
    pub label: String,

    /// Why it was removed.
    pub reason: RemovalReason,
}

/// Keeps track of connected clients.
///
/// A connection is in here exactly when it is in the multiplexer's watch set.
/// The focused client, if any, is always one of the connections in here.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    // Ids increase monotonically, so this is also acceptance order.
    connections: BTreeMap<ConnectionId, Connection>,
    focused: Option<ConnectionId>,
    next_id: u64,
}

impl ClientRegistry {
    /// No clients.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a freshly accepted stream.
    /// The stream is made non-blocking and watched for readiness.
    /// On failure nothing is tracked, and the stream is closed.
    pub fn add(
        &mut self,
        mux: &mut Multiplexer,
        stream: TcpStream,
        peer: Option<SocketAddr>,
    ) -> Result<ConnectionId, Error> {
        stream.set_nonblocking(true)?;

        let id = ConnectionId(self.next_id);
        self.next_id += 1;

        let connection = Connection::new(id, stream, peer);
        mux.register(Endpoint::Connection(id), &connection)?;
        self.connections.insert(id, connection);

        Ok(id)
    }

    /// Stop tracking the connection and close it.
    /// Returns `None` if there was no such connection.
    pub fn remove(
        &mut self,
        mux: &mut Multiplexer,
        id: ConnectionId,
        reason: RemovalReason,
    ) -> Option<Removed> {
        let connection = self.connections.remove(&id)?;

        if !mux.unregister(Endpoint::Connection(id)) {
            warn!(%id, "Connection was not watched");
        }

        if self.focused == Some(id) {
            debug!(%id, "Focused client removed");
            self.focused = None;
        }

        let label = connection.label();
        connection.close();

        Some(Removed { id, label, reason })
    }

    /// Remove every connection.
    pub fn drain(&mut self, mux: &mut Multiplexer, reason: RemovalReason) -> Vec<Removed> {
        self.ids()
            .into_iter()
            .filter_map(|id| self.remove(mux, id, reason))
            .collect()
    }

    /// Look up a live connection.
    pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    /// Look up a live connection.
    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.connections.get_mut(&id)
    }

    /// Make the connection the focused one.
    /// Returns whether the focus changed. Unknown ids are ignored.
    pub fn focus(&mut self, id: ConnectionId) -> bool {
        if !self.connections.contains_key(&id) || self.focused == Some(id) {
            return false;
        }

        self.focused = Some(id);
        true
    }

    /// The focused connection's id.
    pub fn focused(&self) -> Option<ConnectionId> {
        self.focused
    }

    /// The focused connection.
    pub fn focused_mut(&mut self) -> Option<&mut Connection> {
        let id = self.focused?;
        self.connections.get_mut(&id)
    }

    /// Every live connection, in the order they were accepted.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Connection> {
        self.connections.values_mut()
    }

    /// Ids of every live connection, in the order they were accepted.
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.connections.keys().copied().collect()
    }

    /// The number of live connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether there are no live connections.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
