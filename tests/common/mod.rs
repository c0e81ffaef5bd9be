#![allow(dead_code)]

use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use color_eyre::{eyre::eyre, Result};
use serial_mux::{
    client::MuxClient,
    endpoint::ConnectionId,
    error::Error,
    events::{Event, TimestampedEvent},
    logging,
    routing::RoutingPolicy,
    serial::channel::DeviceChannel,
    server::MuxServer,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::UnixStream,
    sync::broadcast,
    task::JoinHandle,
    time::timeout,
};
use tracing::{info, Level};

/// How long to wait for anything that should happen.
pub const PATIENCE: Duration = Duration::from_secs(5);

/// A server running on a blocking task, with a unix socket standing in for the serial device.
pub struct TestServer {
    pub addr: SocketAddr,

    /// The far end of the "serial device".
    pub device: UnixStream,

    pub events: broadcast::Receiver<TimestampedEvent>,

    interrupt: Arc<AtomicBool>,
    handle: JoinHandle<Result<(), Error>>,
}

pub async fn start(policy: RoutingPolicy) -> Result<TestServer> {
    logging::init(Level::DEBUG, None);

    let (device_end, test_end) = std::os::unix::net::UnixStream::pair()?;
    test_end.set_nonblocking(true)?;
    let device = UnixStream::from_std(test_end)?;

    let interrupt = Arc::new(AtomicBool::new(false));
    let mut server = MuxServer::new(policy, Arc::clone(&interrupt));
    server.attach_device(DeviceChannel::from_io("mock", device_end)?)?;
    let addr = server.listen("127.0.0.1:0".parse()?)?;
    let events = server.subscribe();

    info!(%addr, ?policy, "Test server listening");

    let handle = tokio::task::spawn_blocking(move || {
        let outcome = server.serve();
        server.close();
        outcome
    });

    Ok(TestServer {
        addr,
        device,
        events,
        interrupt,
        handle,
    })
}

impl TestServer {
    /// Connect a client, and wait until the server has registered it.
    pub async fn connect(&mut self) -> Result<(MuxClient, ConnectionId)> {
        let client = MuxClient::connect_addr(self.addr).await?;

        let id = self
            .wait_for(|event| match event {
                Event::Connected { id, .. } => Some(*id),
                _ => None,
            })
            .await?;

        Ok((client, id))
    }

    pub async fn next_event(&mut self) -> Result<Event> {
        let event = timeout(PATIENCE, self.events.recv()).await??;

        Ok(event.inner)
    }

    /// Skip events until `f` picks one.
    pub async fn wait_for<T, F>(&mut self, f: F) -> Result<T>
    where
        F: Fn(&Event) -> Option<T>,
    {
        loop {
            let event = self.next_event().await?;
            if let Some(found) = f(&event) {
                return Ok(found);
            }
        }
    }

    /// Read exactly `n` bytes from the device side.
    pub async fn read_device(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        timeout(PATIENCE, self.device.read_exact(&mut buf)).await??;

        Ok(buf)
    }

    /// Have the device say something.
    pub async fn write_device(&mut self, bytes: &[u8]) -> Result<()> {
        self.device.write_all(bytes).await?;

        Ok(())
    }

    /// Unplug the device.
    pub fn unplug(&mut self) -> Result<()> {
        let (placeholder, _) = std::os::unix::net::UnixStream::pair()?;
        placeholder.set_nonblocking(true)?;
        drop(std::mem::replace(
            &mut self.device,
            UnixStream::from_std(placeholder)?,
        ));

        Ok(())
    }

    /// Ask the server to stop, and wait for what serving returned.
    pub async fn stop(&mut self) -> Result<Result<(), Error>> {
        self.interrupt.store(true, Ordering::Relaxed);

        self.finished().await
    }

    /// Wait for the server to stop by itself.
    pub async fn finished(&mut self) -> Result<Result<(), Error>> {
        let outcome = timeout(PATIENCE, &mut self.handle)
            .await
            .map_err(|_| eyre!("Server did not stop"))??;

        Ok(outcome)
    }
}
