use std::net::SocketAddr;

use bytes::BytesMut;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};
use tracing::{debug, trace};

use crate::error::Error;

/// A plain client of the server.
///
/// Writes go straight to the serial port (through the server), and reads
/// return whatever the serial port said, accumulated until some marker shows up.
#[derive(Debug)]
pub struct MuxClient {
    stream: TcpStream,

    /// Bytes read but not yet handed out.
    pending: BytesMut,
}

impl MuxClient {
    /// Connect to the server at the given host and port.
    pub async fn connect(host: &str, port: u16) -> Result<Self, Error> {
        let stream = TcpStream::connect((host, port)).await?;
        debug!(%host, %port, "Connected");

        Ok(Self::from_stream(stream))
    }

    /// Connect to the server at the given address.
    pub async fn connect_addr(addr: SocketAddr) -> Result<Self, Error> {
        let stream = TcpStream::connect(addr).await?;
        debug!(%addr, "Connected");

        Ok(Self::from_stream(stream))
    }

    fn from_stream(stream: TcpStream) -> Self {
        Self {
            stream,
            pending: BytesMut::with_capacity(1024),
        }
    }

    /// Write the bytes as they are.
    pub async fn write<B: AsRef<[u8]>>(&mut self, bytes: B) -> Result<(), Error> {
        self.stream.write_all(bytes.as_ref()).await?;

        Ok(())
    }

    /// Read until `marker` has been seen.
    ///
    /// Returns everything up to and including the marker.
    /// Anything which arrived after the marker is kept for the next call.
    pub async fn read_until<M: AsRef<[u8]>>(&mut self, marker: M) -> Result<Vec<u8>, Error> {
        let marker = marker.as_ref();
        if marker.is_empty() {
            return Err(Error::BadUsage("Cannot read until an empty marker".into()));
        }

        // Where to start looking, so bytes already searched are not searched again.
        let mut searched = 0;

        loop {
            if let Some(position) = find(&self.pending[searched..], marker) {
                let end = searched + position + marker.len();
                return Ok(self.pending.split_to(end).to_vec());
            }

            // The marker could straddle what we have and what comes next.
            searched = self.pending.len().saturating_sub(marker.len() - 1);

            let n = self.stream.read_buf(&mut self.pending).await?;
            trace!(n, "Read");

            if n == 0 {
                return Err(Error::Disconnected);
            }
        }
    }

    /// Take whatever has been read but not yet returned by [`MuxClient::read_until`].
    pub fn take_pending(&mut self) -> Vec<u8> {
        self.pending.split().to_vec()
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
