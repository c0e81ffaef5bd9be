use std::{fmt::Display, net::SocketAddr};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::info;

use crate::{endpoint::ConnectionId, peer::RemovalReason};

/// Something that happened in the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Event {
    /// The serial device is open and watched.
    DeviceOpened(String),

    /// The server accepts clients on this address.
    Listening(SocketAddr),

    /// A client connected.
    Connected {
        /// The id given to the client.
        id: ConnectionId,
        /// Its diagnostic label.
        peer: String,
    },

    /// A client wrote something and now gets serial output in focused mode.
    Focused(ConnectionId),

    /// A client is gone.
    Disconnected {
        /// The id the client had.
        id: ConnectionId,
        /// Its diagnostic label.
        peer: String,
        /// Why it was removed.
        reason: RemovalReason,
    },

    /// The server stopped because of this problem.
    Fatal(String),

    /// Everything is closed.
    Closed,
}

impl Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Event::DeviceOpened(path) => write!(f, "serial port: {path}"),
            Event::Listening(addr) => write!(f, "server: {addr}"),
            Event::Connected { id, peer } => write!(f, "new connection from {peer} ({id})"),
            Event::Focused(id) => write!(f, "{id} is focused"),
            Event::Disconnected { id, peer, reason } => {
                write!(f, "closing {peer} ({id}): {reason}")
            }
            Event::Fatal(problem) => write!(f, "fatal: {problem}"),
            Event::Closed => write!(f, "done"),
        }
    }
}

/// An event and when it happened.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimestampedEvent {
    /// The event.
    pub inner: Event,

    /// When the event happened.
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl TimestampedEvent {
    /// Stamp the event with the current time.
    pub fn new(event: Event) -> Self {
        Self {
            inner: event,
            timestamp: chrono::Utc::now(),
        }
    }
}

impl Display for TimestampedEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.inner)
    }
}

/// An event logger and broadcaster.
#[derive(Debug)]
pub struct Events {
    tx: broadcast::Sender<TimestampedEvent>,
    #[allow(dead_code)]
    rx: broadcast::Receiver<TimestampedEvent>,
}

impl Events {
    /// Create a new events handler.
    /// It may be subscribed to to receive any events it sees.
    pub fn new() -> Self {
        let (tx, rx) = broadcast::channel(100);
        Self { tx, rx }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> broadcast::Receiver<TimestampedEvent> {
        self.tx.subscribe()
    }

    /// Send an event. This will log it and broadcast it to any subscribers.
    pub fn send(&self, event: Event) {
        let event = TimestampedEvent::new(event);
        info!("{event}");

        // We hold a receiver ourselves, so this only fails if that is gone.
        let _ = self.tx.send(event);
    }
}

impl Default for Events {
    fn default() -> Self {
        Self::new()
    }
}
