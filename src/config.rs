use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::Path,
};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::{error::Error, routing::RoutingPolicy};

/// The default TCP port clients connect to.
pub const DEFAULT_PORT: u16 = 23200;

/// The default serial device.
pub const DEFAULT_DEVICE: &str = "/dev/ttyUSB0";

/// The default baud rate.
pub const DEFAULT_BAUD: u32 = 115_200;

/// Parity checking of the serial line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
pub enum Parity {
    /// No parity bit.
    #[default]
    None,

    /// Odd parity.
    Odd,

    /// Even parity.
    Even,
}

impl From<Parity> for serialport::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => serialport::Parity::None,
            Parity::Odd => serialport::Parity::Odd,
            Parity::Even => serialport::Parity::Even,
        }
    }
}

/// The configuration used for running the server.
///
/// Fields left out of a configuration file take their default values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// The address to listen on. All interfaces by default.
    pub host: IpAddr,

    /// The TCP port to listen on.
    pub port: u16,

    /// Path to the serial device.
    /// Likely "/dev/ttyUSBx" or "/dev/ttyACMx".
    pub device: String,

    /// Baud rate of the serial line.
    pub baud: u32,

    /// Bits per byte, 5 to 8.
    pub data_bits: u8,

    /// Parity checking.
    pub parity: Parity,

    /// Stop bits, 1 or 2.
    pub stop_bits: u8,

    /// Software (XON/XOFF) flow control.
    pub xonxoff: bool,

    /// Hardware (RTS/CTS) flow control.
    pub rtscts: bool,

    /// Send serial output to every client instead of only the one which wrote last.
    pub broadcast: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            device: DEFAULT_DEVICE.into(),
            baud: DEFAULT_BAUD,
            data_bits: 8,
            parity: Parity::None,
            stop_bits: 1,
            xonxoff: false,
            rtscts: false,
            broadcast: false,
        }
    }
}

impl ServerConfig {
    fn ron() -> ron::Options {
        ron::Options::default()
            .with_default_extension(ron::extensions::Extensions::IMPLICIT_SOME)
            .with_default_extension(ron::extensions::Extensions::UNWRAP_NEWTYPES)
    }

    /// Deserialize a .ron file's contents.
    pub fn deserialize(input: &str) -> Result<Self, Error> {
        Self::ron()
            .from_str::<ServerConfig>(input)
            .map_err(|e| Error::BadConfig(format!("Not a valid configuration: {e}")))
    }

    /// Setup a new configuration from a RON file.
    pub fn new_from_path<P: AsRef<Path>>(p: P) -> Result<Self, Error> {
        let s = std::fs::read_to_string(p.as_ref()).map_err(|e| {
            Error::BadConfig(format!("Could not read {:?}: {e}", p.as_ref()))
        })?;

        Self::deserialize(&s)
    }

    /// An example configuration with some fields filled in.
    pub fn example() -> Self {
        Self {
            device: "/dev/ttyACM0".into(),
            baud: 9600,
            parity: Parity::Even,
            rtscts: true,
            broadcast: true,
            ..Default::default()
        }
    }

    /// Serialize the configuration in a "pretty" (i.e. non-compact) fashion.
    pub fn serialize_pretty(&self) -> Result<String, Error> {
        Self::ron()
            .to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| Error::BadConfig(format!("Could not serialize configuration: {e}")))
    }

    /// Check that the configuration is something a serial port can be opened with.
    pub fn validate(&self) -> Result<(), Error> {
        if self.device.is_empty() {
            return Err(Error::BadConfig("No serial device given".into()));
        }

        if self.baud == 0 {
            return Err(Error::BadConfig("The baud rate must be positive".into()));
        }

        self.data_bits()?;
        self.stop_bits()?;

        if self.xonxoff && self.rtscts {
            return Err(Error::BadConfig(
                "Only one of software (XON/XOFF) and hardware (RTS/CTS) flow control can be used"
                    .into(),
            ));
        }

        Ok(())
    }

    /// Where the server should listen.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// How serial output is routed to clients.
    pub fn routing(&self) -> RoutingPolicy {
        if self.broadcast {
            RoutingPolicy::Broadcast
        } else {
            RoutingPolicy::Focused
        }
    }

    /// The byte width as understood by the serial driver.
    pub fn data_bits(&self) -> Result<serialport::DataBits, Error> {
        match self.data_bits {
            5 => Ok(serialport::DataBits::Five),
            6 => Ok(serialport::DataBits::Six),
            7 => Ok(serialport::DataBits::Seven),
            8 => Ok(serialport::DataBits::Eight),
            other => Err(Error::BadConfig(format!(
                "Data bits must be between 5 and 8, got {other}"
            ))),
        }
    }

    /// The stop bits as understood by the serial driver.
    pub fn stop_bits(&self) -> Result<serialport::StopBits, Error> {
        match self.stop_bits {
            1 => Ok(serialport::StopBits::One),
            2 => Ok(serialport::StopBits::Two),
            other => Err(Error::BadConfig(format!(
                "Stop bits must be 1 or 2, got {other}"
            ))),
        }
    }

    /// The flow control mode as understood by the serial driver.
    pub fn flow_control(&self) -> serialport::FlowControl {
        match (self.xonxoff, self.rtscts) {
            (_, true) => serialport::FlowControl::Hardware,
            (true, false) => serialport::FlowControl::Software,
            (false, false) => serialport::FlowControl::None,
        }
    }
}
