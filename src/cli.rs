use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::Level;

use crate::{
    config::{Parity, ServerConfig},
    error::Error,
};

/// Share a serial port with any number of TCP clients.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to a configuration file.
    /// Options given on the command line take precedence over it.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Serial port device.
    #[arg(long)]
    pub device: Option<String>,

    /// Baud rate.
    #[arg(long)]
    pub baud: Option<u32>,

    /// Host port.
    #[arg(long)]
    pub port: Option<u16>,

    /// Send serial output to all connected clients,
    /// not just the one which wrote last.
    #[arg(long)]
    pub broadcast: bool,

    /// Bits per byte, 5 to 8.
    #[arg(long)]
    pub data_bits: Option<u8>,

    /// Parity checking.
    #[arg(long, value_enum)]
    pub parity: Option<Parity>,

    /// Stop bits, 1 or 2.
    #[arg(long)]
    pub stop_bits: Option<u8>,

    /// Software (XON/XOFF) flow control.
    #[arg(long)]
    pub xonxoff: bool,

    /// Hardware (RTS/CTS) flow control.
    #[arg(long)]
    pub rtscts: bool,

    /// How much to log to stderr.
    #[arg(long, default_value_t = Level::INFO)]
    pub log_level: Level,

    /// Also log to daily rotated files in this directory.
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Subcommands
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Commands available in the command line interface.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Examples for user convenience.
    #[clap(subcommand)]
    Examples(Examples),
}

/// Helpful examples for users.
#[derive(Subcommand, Debug, Clone)]
pub enum Examples {
    /// Show an example of a configuration file's contents.
    Config,
}

/// Print what the command asks for.
pub fn handle_command(command: Commands) -> Result<(), Error> {
    match command {
        Commands::Examples(Examples::Config) => {
            println!("{}", ServerConfig::example().serialize_pretty()?);
        }
    }

    Ok(())
}

impl Cli {
    /// The configuration to run with: the configuration file (or defaults)
    /// with anything given on the command line applied on top.
    pub fn server_config(&self) -> Result<ServerConfig, Error> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::new_from_path(path)?,
            None => ServerConfig::default(),
        };

        if let Some(device) = &self.device {
            config.device = device.clone();
        }
        if let Some(baud) = self.baud {
            config.baud = baud;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(data_bits) = self.data_bits {
            config.data_bits = data_bits;
        }
        if let Some(parity) = self.parity {
            config.parity = parity;
        }
        if let Some(stop_bits) = self.stop_bits {
            config.stop_bits = stop_bits;
        }

        // Flags can only turn things on.
        config.broadcast |= self.broadcast;
        config.xonxoff |= self.xonxoff;
        config.rtscts |= self.rtscts;

        config.validate()?;

        Ok(config)
    }
}
