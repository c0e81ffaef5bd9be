use std::sync::{atomic::AtomicBool, Arc};

use clap::Parser;
use color_eyre::eyre::WrapErr;
use serial_mux::{cli, logging, server};
use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
use tracing::{debug, info};

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let cli = cli::Cli::parse();

    if let Some(command) = cli.command {
        cli::handle_command(command)?;
        return Ok(());
    }

    logging::init(
        cli.log_level,
        cli.log_dir.clone().map(|dir| (cli.log_level, dir)),
    );

    let config = cli.server_config()?;
    debug!(?config, "Config");

    let interrupt = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM, SIGHUP] {
        signal_hook::flag::register(signal, Arc::clone(&interrupt))
            .wrap_err_with(|| format!("Could not register handler for signal {signal}"))?;
    }

    server::run(&config, interrupt)?;
    info!("Bye");

    Ok(())
}
