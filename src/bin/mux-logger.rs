use std::path::PathBuf;

use clap::Parser;
use serial_mux::{config::DEFAULT_PORT, logger, logging};
use tracing::{info, Level};

/// Connect to a serial mux server and log every line it sends, with timestamps.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Server host.
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Server port.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Where to write the log.
    #[arg(long, default_value = "mux_log.txt")]
    file: PathBuf,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    logging::init(Level::INFO, None);

    let args = Args::parse();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C, quitting");
        }
        result = logger::run(&args.host, args.port, &args.file) => {
            result?;
        }
    }

    Ok(())
}
