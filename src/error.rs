use std::{io, net::SocketAddr};

use thiserror::Error;

use crate::endpoint::Endpoint;

/// Errors that may occur in this library.
#[derive(Debug, Error)]
pub enum Error {
    /// The serial device could not be opened.
    #[error("Could not open serial device `{path}`")]
    DeviceOpen {
        /// Path to the device.
        path: String,

        /// What the serial driver said.
        #[source]
        source: serialport::Error,
    },

    /// Reading from or writing to the serial device failed.
    #[error("Serial device `{path}` failed")]
    Device {
        /// Path to the device.
        path: String,

        /// The IO problem.
        #[source]
        source: io::Error,
    },

    /// The serial device reported a hangup or an error condition.
    #[error("Serial device `{path}` reported {condition}")]
    DeviceGone {
        /// Path to the device.
        path: String,

        /// What was reported, e.g. "hangup".
        condition: String,
    },

    /// Binding the listening socket failed.
    #[error("Could not listen on {addr}")]
    Bind {
        /// The address we tried to bind.
        addr: SocketAddr,

        /// The IO problem.
        #[source]
        source: io::Error,
    },

    /// The listening socket failed after it was set up.
    #[error("Listener failed: {0}")]
    Listener(String),

    /// The polling primitive itself failed.
    #[error("Polling failed")]
    Poll(#[from] nix::errno::Errno),

    /// An endpoint was registered twice.
    #[error("The endpoint `{0}` is already watched")]
    AlreadyWatched(Endpoint),

    /// The server was asked to run without being fully set up.
    #[error("The server is missing its {0}")]
    NotReady(&'static str),

    /// The configuration is not usable.
    #[error("Bad configuration: {0}")]
    BadConfig(String),

    /// The peer closed the connection before what we waited for arrived.
    #[error("Connection closed by peer")]
    Disconnected,

    /// The library was used in a way which does not make sense.
    #[error("The request did not conform to valid usage. Problem: `{0}`")]
    BadUsage(String),

    /// IO related errors.
    #[error("Underlying IO problem")]
    Io(#[from] io::Error),
}

impl Error {
    /// Whether this error originates from the serial device.
    pub fn is_device_failure(&self) -> bool {
        matches!(
            self,
            Error::DeviceOpen { .. } | Error::Device { .. } | Error::DeviceGone { .. }
        )
    }
}
