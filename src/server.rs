use std::{
    io::ErrorKind,
    net::{SocketAddr, TcpListener},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::sync::broadcast;
use tracing::{debug, error, info, trace, warn};

use crate::{
    config::ServerConfig,
    endpoint::{ConnectionId, Endpoint},
    error::Error,
    events::{Event, Events, TimestampedEvent},
    multiplexer::{Multiplexer, Readiness},
    peer::RemovalReason,
    registry::ClientRegistry,
    routing::{Router, RoutingPolicy},
    serial::{channel::DeviceChannel, DEVICE_CHUNK_SIZE},
};

/// How long a single poll may wait.
/// An interrupt is noticed at the latest after this long.
pub const POLL_TIMEOUT: Duration = Duration::from_millis(500);

/// The largest chunk read from a client in one go.
pub const CLIENT_CHUNK_SIZE: usize = 80;

/// What the loop should do after handling something.
#[derive(Debug)]
pub enum Flow {
    /// Keep going.
    Continue,

    /// Stop, something went badly wrong.
    Fatal(Error),

    /// Stop, we were asked to.
    Shutdown,
}

/// Shares one serial device with any number of TCP clients.
///
/// Everything happens on the thread calling [`MuxServer::serve`]:
/// the only place it waits is the poll, and every ready endpoint is dealt with
/// before polling again.
#[derive(Debug)]
pub struct MuxServer {
    router: Router,
    mux: Multiplexer,
    registry: ClientRegistry,
    device: Option<DeviceChannel>,
    listener: Option<TcpListener>,
    interrupt: Arc<AtomicBool>,
    events: Events,
    closed: bool,
}

impl MuxServer {
    /// A server with no device and no listener yet.
    ///
    /// Setting `interrupt` makes [`MuxServer::serve`] return within one poll timeout.
    pub fn new(policy: RoutingPolicy, interrupt: Arc<AtomicBool>) -> Self {
        Self {
            router: Router::new(policy),
            mux: Multiplexer::new(),
            registry: ClientRegistry::new(),
            device: None,
            listener: None,
            interrupt,
            events: Events::new(),
            closed: false,
        }
    }

    /// Subscribe to what happens in the server.
    pub fn subscribe(&self) -> broadcast::Receiver<TimestampedEvent> {
        self.events.subscribe()
    }

    /// Open the configured device and start listening.
    pub fn start(&mut self, config: &ServerConfig) -> Result<SocketAddr, Error> {
        let device = DeviceChannel::open(config)?;
        self.attach_device(device)?;

        self.listen(config.listen_addr())
    }

    /// Use this as the serial device.
    pub fn attach_device(&mut self, device: DeviceChannel) -> Result<(), Error> {
        if self.device.is_some() {
            return Err(Error::BadUsage("A device is already attached".into()));
        }

        self.mux.register(Endpoint::Device, &device)?;
        self.events.send(Event::DeviceOpened(device.path().into()));
        self.device = Some(device);

        Ok(())
    }

    /// Bind the listening socket.
    /// Returns the address actually bound, which is useful when asking for port 0.
    pub fn listen(&mut self, addr: SocketAddr) -> Result<SocketAddr, Error> {
        if self.listener.is_some() {
            return Err(Error::BadUsage("Already listening".into()));
        }

        let listener = TcpListener::bind(addr).map_err(|source| Error::Bind { addr, source })?;
        listener
            .set_nonblocking(true)
            .map_err(|source| Error::Bind { addr, source })?;
        let local = listener.local_addr()?;

        self.mux.register(Endpoint::Listener, &listener)?;
        self.events.send(Event::Listening(local));
        self.listener = Some(listener);

        Ok(local)
    }

    /// The number of connected clients.
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// The client serial output goes to in focused mode.
    pub fn focused(&self) -> Option<ConnectionId> {
        self.registry.focused()
    }

    /// Run until interrupted or until something fatal happens.
    ///
    /// Being interrupted is not an error.
    /// This does not close anything, see [`MuxServer::close`].
    pub fn serve(&mut self) -> Result<(), Error> {
        if self.device.is_none() {
            return Err(Error::NotReady("serial device"));
        }
        if self.listener.is_none() {
            return Err(Error::NotReady("listener"));
        }

        info!("Use ctrl+c to stop...");

        loop {
            match self.turn(POLL_TIMEOUT) {
                Flow::Continue => continue,
                Flow::Shutdown => {
                    info!("Interrupted, stopping");
                    return Ok(());
                }
                Flow::Fatal(e) => {
                    error!(?e, "{e}");
                    self.events.send(Event::Fatal(e.to_string()));
                    return Err(e);
                }
            }
        }
    }

    /// Poll once, waiting at most `timeout`, and handle everything that was ready.
    pub fn turn(&mut self, timeout: Duration) -> Flow {
        if self.interrupted() {
            return Flow::Shutdown;
        }

        let ready = match self.mux.poll(timeout) {
            Ok(ready) => ready,
            Err(e) => return Flow::Fatal(e),
        };

        for (endpoint, readiness) in ready {
            trace!(%endpoint, %readiness, "Ready");

            match self.dispatch(endpoint, readiness) {
                Flow::Continue => {}
                stop => return stop,
            }
        }

        if self.interrupted() {
            Flow::Shutdown
        } else {
            Flow::Continue
        }
    }

    fn interrupted(&self) -> bool {
        self.interrupt.load(Ordering::Relaxed)
    }

    fn dispatch(&mut self, endpoint: Endpoint, readiness: Readiness) -> Flow {
        match (endpoint, readiness) {
            (Endpoint::Listener, Readiness::Readable) => self.accept_pending(),
            (Endpoint::Listener, condition) => {
                Flow::Fatal(Error::Listener(format!("listening socket reported {condition}")))
            }

            (Endpoint::Device, Readiness::Readable) => self.read_device(),
            (Endpoint::Device, condition) => Flow::Fatal(Error::DeviceGone {
                path: self.device_path(),
                condition: condition.to_string(),
            }),

            (Endpoint::Connection(id), Readiness::Hangup) => {
                self.remove(id, RemovalReason::Hangup);
                Flow::Continue
            }
            (Endpoint::Connection(id), Readiness::Error) => {
                self.remove(id, RemovalReason::Error);
                Flow::Continue
            }
            (Endpoint::Connection(id), Readiness::Readable) => self.read_connection(id),
        }
    }

    fn accept_pending(&mut self) -> Flow {
        let Some(listener) = self.listener.as_ref() else {
            return Flow::Fatal(Error::NotReady("listener"));
        };

        loop {
            match listener.accept() {
                Ok((stream, peer)) => {
                    // The stream is dropped on failure, which closes it.
                    let id = match self.registry.add(&mut self.mux, stream, Some(peer)) {
                        Ok(id) => id,
                        Err(e) => {
                            warn!(%peer, ?e, "Could not take on connection, closing it");
                            continue;
                        }
                    };

                    self.events.send(Event::Connected {
                        id,
                        peer: peer.to_string(),
                    });
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Flow::Continue,
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::Interrupted
                            | ErrorKind::ConnectionAborted
                            | ErrorKind::ConnectionReset
                    ) =>
                {
                    debug!(?e, "Connection went away before it was accepted");
                }
                Err(e) => return Flow::Fatal(Error::Listener(e.to_string())),
            }
        }
    }

    fn read_device(&mut self) -> Flow {
        let Some(device) = self.device.as_mut() else {
            return Flow::Fatal(Error::NotReady("serial device"));
        };

        let mut buf = [0u8; DEVICE_CHUNK_SIZE];
        let n = match device.read_chunk(&mut buf) {
            Ok(n) => n,
            Err(e) => return Flow::Fatal(e),
        };

        // Serial reads time out with nothing, which does not mean the device went away.
        if n == 0 {
            trace!("Empty read from device");
            return Flow::Continue;
        }

        let recipients = self.router.device_to_clients(&mut self.registry, &buf[..n]);
        trace!(len = n, ?recipients, "Routed device output");

        Flow::Continue
    }

    fn read_connection(&mut self, id: ConnectionId) -> Flow {
        let Some(connection) = self.registry.get_mut(id) else {
            warn!(%id, "Readiness for unknown connection");
            return Flow::Continue;
        };

        let mut buf = [0u8; CLIENT_CHUNK_SIZE];
        let n = match connection.read_chunk(&mut buf) {
            Ok(0) => {
                self.remove(id, RemovalReason::NoData);
                return Flow::Continue;
            }
            Ok(n) => n,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
                return Flow::Continue;
            }
            Err(e) => {
                debug!(%id, ?e, "Read failed");
                self.remove(id, RemovalReason::ReadFailed);
                return Flow::Continue;
            }
        };

        let Some(device) = self.device.as_mut() else {
            return Flow::Fatal(Error::NotReady("serial device"));
        };

        match self
            .router
            .client_to_device(&mut self.registry, device, id, &buf[..n])
        {
            Ok(true) => {
                self.events.send(Event::Focused(id));
                Flow::Continue
            }
            Ok(false) => Flow::Continue,
            Err(e) => Flow::Fatal(e),
        }
    }

    fn remove(&mut self, id: ConnectionId, reason: RemovalReason) {
        if let Some(removed) = self.registry.remove(&mut self.mux, id, reason) {
            self.events.send(Event::Disconnected {
                id: removed.id,
                peer: removed.label,
                reason: removed.reason,
            });
        }
    }

    fn device_path(&self) -> String {
        self.device
            .as_ref()
            .map(|device| device.path().to_owned())
            .unwrap_or_default()
    }

    /// Close every client, the device and the listener.
    ///
    /// Only the first call does anything. Works no matter how far setup got.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        info!("Closing...");

        for removed in self.registry.drain(&mut self.mux, RemovalReason::Shutdown) {
            self.events.send(Event::Disconnected {
                id: removed.id,
                peer: removed.label,
                reason: removed.reason,
            });
        }

        if let Some(device) = self.device.take() {
            self.mux.unregister(Endpoint::Device);
            debug!(path = %device.path(), "Device closed");
        }

        if self.listener.take().is_some() {
            self.mux.unregister(Endpoint::Listener);
            debug!("Listener closed");
        }

        self.events.send(Event::Closed);
    }
}

impl Drop for MuxServer {
    fn drop(&mut self) {
        self.close();
    }
}

/// Set up a server from the configuration and serve until interrupted.
///
/// Whatever happens, everything that was opened is closed before this returns.
pub fn run(config: &ServerConfig, interrupt: Arc<AtomicBool>) -> Result<(), Error> {
    config.validate()?;

    let mut server = MuxServer::new(config.routing(), interrupt);
    let outcome = server.start(config).and_then(|_| server.serve());
    server.close();

    outcome
}
