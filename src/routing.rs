use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::{
    endpoint::ConnectionId, error::Error, peer::Connection, registry::ClientRegistry,
    serial::channel::DeviceChannel,
};

/// Where bytes read from the serial device go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RoutingPolicy {
    /// Every connected client gets everything.
    Broadcast,

    /// Only the client which most recently wrote something gets it.
    ///
    /// The serial line has no notion of requests and responses,
    /// so this is a guess: whoever wrote last is probably waiting for the reply.
    /// With several clients writing at once, replies can end up at the wrong one.
    #[default]
    Focused,
}

/// Moves bytes between the serial device and clients.
#[derive(Debug, Clone, Copy, Default)]
pub struct Router {
    policy: RoutingPolicy,
}

impl Router {
    /// A router following the given policy.
    pub fn new(policy: RoutingPolicy) -> Self {
        Self { policy }
    }

    /// Hand a chunk read from the device to the client(s) the policy picks.
    ///
    /// Returns the clients the chunk was sent to.
    /// Failed sends are not retried; a broken client is noticed and removed when
    /// its socket reports a hangup or an error.
    pub fn device_to_clients(
        &self,
        registry: &mut ClientRegistry,
        chunk: &[u8],
    ) -> Vec<ConnectionId> {
        match self.policy {
            RoutingPolicy::Broadcast => registry
                .iter_mut()
                .filter_map(|connection| deliver(connection, chunk))
                .collect(),
            RoutingPolicy::Focused => match registry.focused_mut() {
                Some(connection) => deliver(connection, chunk).into_iter().collect(),
                None => {
                    trace!(len = chunk.len(), "No focused client, dropping");
                    vec![]
                }
            },
        }
    }

    /// Put a chunk a client sent onto the device, and focus that client.
    ///
    /// This is the same for both policies.
    /// Returns whether the focus moved to this client.
    pub fn client_to_device(
        &self,
        registry: &mut ClientRegistry,
        device: &mut DeviceChannel,
        id: ConnectionId,
        chunk: &[u8],
    ) -> Result<bool, Error> {
        trace!(%id, len = chunk.len(), "To device");
        device.write_all(chunk)?;

        Ok(registry.focus(id))
    }
}

fn deliver(connection: &mut Connection, chunk: &[u8]) -> Option<ConnectionId> {
    match connection.send(chunk) {
        Ok(()) => Some(connection.id()),
        Err(e) => {
            debug!(id = %connection.id(), ?e, "Send failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::Read,
        net::{TcpListener, TcpStream},
        os::unix::net::UnixStream,
        time::Duration,
    };

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::multiplexer::Multiplexer;

    struct Fixture {
        listener: TcpListener,
        mux: Multiplexer,
        registry: ClientRegistry,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                listener: TcpListener::bind("127.0.0.1:0").unwrap(),
                mux: Multiplexer::new(),
                registry: ClientRegistry::new(),
            }
        }

        /// Returns the id on the server side, and the client side of the socket.
        fn connect(&mut self) -> (ConnectionId, TcpStream) {
            let client = TcpStream::connect(self.listener.local_addr().unwrap()).unwrap();
            client
                .set_read_timeout(Some(Duration::from_millis(200)))
                .unwrap();
            let (stream, peer) = self.listener.accept().unwrap();
            let id = self
                .registry
                .add(&mut self.mux, stream, Some(peer))
                .unwrap();

            (id, client)
        }
    }

    fn read_some(client: &mut TcpStream) -> Option<Vec<u8>> {
        let mut buf = [0u8; 64];
        match client.read(&mut buf) {
            Ok(n) => Some(buf[..n].to_vec()),
            Err(_) => None,
        }
    }

    #[test]
    fn broadcast_reaches_everyone() {
        let mut f = Fixture::new();
        let (a, mut client_a) = f.connect();
        let (b, mut client_b) = f.connect();

        let router = Router::new(RoutingPolicy::Broadcast);
        let recipients = router.device_to_clients(&mut f.registry, b"READY\n");

        assert_eq!(recipients, vec![a, b]);
        assert_eq!(read_some(&mut client_a).unwrap(), b"READY\n");
        assert_eq!(read_some(&mut client_b).unwrap(), b"READY\n");
    }

    #[test]
    fn focused_without_focus_drops() {
        let mut f = Fixture::new();
        let (_, mut client) = f.connect();

        let router = Router::new(RoutingPolicy::Focused);

        assert!(router.device_to_clients(&mut f.registry, b"lost").is_empty());
        assert_eq!(read_some(&mut client), None);
    }

    #[test]
    fn focused_reaches_only_last_writer() {
        let mut f = Fixture::new();
        let (a, mut client_a) = f.connect();
        let (b, mut client_b) = f.connect();

        let (device_end, mut wire) = UnixStream::pair().unwrap();
        let mut device = DeviceChannel::from_io("mock", device_end).unwrap();

        let router = Router::new(RoutingPolicy::Focused);
        assert!(router
            .client_to_device(&mut f.registry, &mut device, a, b"first")
            .unwrap());
        assert!(router
            .client_to_device(&mut f.registry, &mut device, b, b"second")
            .unwrap());

        let mut on_wire = [0u8; 11];
        wire.read_exact(&mut on_wire).unwrap();
        assert_eq!(&on_wire, b"firstsecond");

        assert_eq!(router.device_to_clients(&mut f.registry, b"reply"), vec![b]);
        assert_eq!(read_some(&mut client_b).unwrap(), b"reply");
        assert_eq!(read_some(&mut client_a), None);
    }

    #[test]
    fn writing_in_broadcast_mode_still_focuses() {
        let mut f = Fixture::new();
        let (a, _client_a) = f.connect();

        let (device_end, _wire) = UnixStream::pair().unwrap();
        let mut device = DeviceChannel::from_io("mock", device_end).unwrap();

        let router = Router::new(RoutingPolicy::Broadcast);
        router
            .client_to_device(&mut f.registry, &mut device, a, b"x")
            .unwrap();

        assert_eq!(f.registry.focused(), Some(a));
    }
}
