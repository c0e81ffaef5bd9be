use std::{
    io::{self, ErrorKind, Read, Write},
    os::unix::{
        io::{AsRawFd, RawFd},
        net::UnixStream,
    },
    time::Duration,
};

use serialport::{ClearBuffer, SerialPort, TTYPort};
use tracing::{debug, info, trace};

use crate::{config::ServerConfig, error::Error};

/// How long a read on the serial port may block.
/// Reads only happen after a poll said there is data, so this is just a safety net.
pub const READ_TIMEOUT: Duration = Duration::from_secs(1);

/// How long a write to the serial port may block.
/// Flow control can hold the line for a while, and that is not a failure.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(60);

/// Anything which can act as the serial device.
///
/// Real serial ports implement this, and so do unix sockets, which lets one end of
/// a socket pair play the device in tests.
pub trait DeviceIo: Read + Write + AsRawFd + Send {
    /// Throw away anything buffered in either direction.
    fn discard_buffers(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// Bound how long the next reads and writes may block.
    fn set_io_timeout(&mut self, _timeout: Duration) -> io::Result<()> {
        Ok(())
    }
}

impl DeviceIo for TTYPort {
    fn discard_buffers(&mut self) -> io::Result<()> {
        self.clear(ClearBuffer::All).map_err(io::Error::from)
    }

    fn set_io_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.set_timeout(timeout).map_err(io::Error::from)
    }
}

impl DeviceIo for UnixStream {}

/// The serial device the server shares.
pub struct DeviceChannel {
    path: String,
    io: Box<dyn DeviceIo>,
}

impl std::fmt::Debug for DeviceChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceChannel")
            .field("path", &self.path)
            .field("fd", &self.io.as_raw_fd())
            .finish()
    }
}

impl DeviceChannel {
    /// Open the serial port described by the configuration.
    pub fn open(config: &ServerConfig) -> Result<Self, Error> {
        let flow_control = config.flow_control();
        info!(device = %config.device, baud = config.baud, ?flow_control, "Opening serial port");

        let port = serialport::new(&config.device, config.baud)
            .data_bits(config.data_bits()?)
            .parity(config.parity.into())
            .stop_bits(config.stop_bits()?)
            .flow_control(flow_control)
            .timeout(READ_TIMEOUT)
            .open_native()
            .map_err(|source| Error::DeviceOpen {
                path: config.device.clone(),
                source,
            })?;

        Self::from_io(&config.device, port)
    }

    /// Use something already open as the device.
    /// Stale bytes are discarded.
    pub fn from_io<S: AsRef<str>, D: DeviceIo + 'static>(path: S, io: D) -> Result<Self, Error> {
        let mut channel = Self {
            path: path.as_ref().to_owned(),
            io: Box::new(io),
        };

        channel
            .io
            .discard_buffers()
            .map_err(|source| channel.failure(source))?;
        debug!(path = %channel.path, "Device buffers flushed");

        Ok(channel)
    }

    /// Where the device lives.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Read whatever is available, at most `buf.len()` bytes.
    ///
    /// A read timing out is not a problem for serial ports, that just means zero bytes.
    pub fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        match self.io.read(buf) {
            Ok(n) => Ok(n),
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                trace!(path = %self.path, kind = ?e.kind(), "Nothing read");
                Ok(0)
            }
            Err(e) => Err(self.failure(e)),
        }
    }

    /// Put the bytes on the wire as-is.
    ///
    /// Writes may block for up to [`WRITE_TIMEOUT`], reads are limited to [`READ_TIMEOUT`] again after.
    pub fn write_all(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.io
            .set_io_timeout(WRITE_TIMEOUT)
            .map_err(|e| self.failure(e))?;

        let written = self
            .io
            .write_all(bytes)
            .and_then(|()| self.io.flush());
        let restored = self.io.set_io_timeout(READ_TIMEOUT);

        written.and(restored).map_err(|e| self.failure(e))
    }

    fn failure(&self, source: io::Error) -> Error {
        Error::Device {
            path: self.path.clone(),
            source,
        }
    }
}

impl AsRawFd for DeviceChannel {
    fn as_raw_fd(&self) -> RawFd {
        self.io.as_raw_fd()
    }
}
