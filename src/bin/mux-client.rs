use std::time::Duration;

use clap::Parser;
use color_eyre::eyre::eyre;
use serial_mux::{client::MuxClient, config::DEFAULT_PORT, logging};
use tracing::{warn, Level};

/// Send one command through a serial mux server and print the reply.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Server host.
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Server port.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// The command to send. A CR LF is appended.
    #[arg(long, default_value = "pwd")]
    cmd: String,

    /// Stop reading once this shows up.
    #[arg(long, default_value = "]$")]
    prompt: String,

    /// Give up waiting for the prompt after this many seconds.
    #[arg(long, default_value_t = 5)]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    logging::init(Level::WARN, None);

    let args = Args::parse();

    let mut client = MuxClient::connect(&args.host, args.port).await?;
    client.write(format!("{}\r\n", args.cmd)).await?;

    let timeout = Duration::from_secs(args.timeout_secs);
    let reply = tokio::time::timeout(timeout, client.read_until(&args.prompt)).await;

    match reply {
        Ok(reply) => {
            print!("{}", String::from_utf8_lossy(&reply?));
            Ok(())
        }
        Err(_) => {
            let partial = client.take_pending();
            warn!(?timeout, "No prompt");
            print!("{}", String::from_utf8_lossy(&partial));
            Err(eyre!("Prompt {:?} not seen within {timeout:?}", args.prompt))
        }
    }
}
