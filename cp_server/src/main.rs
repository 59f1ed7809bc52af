//! Coup relay server.
//!
//! Accepts TCP connections, greets each with its id and relays addressed
//! envelopes between them. The server knows nothing about the game.

mod config;

use std::sync::atomic::Ordering;

use anyhow::Error;
use ctrlc::set_handler;
use log::info;
use pico_args::Arguments;

use config::Config;

const HELP: &str = "\
Run a Coup relay server

USAGE:
  cp_server [OPTIONS]

OPTIONS:
  --bind             HOST:PORT   Server socket bind address  [default: env COUP_BIND or localhost:12345]
  --max-connections  N           Connections accepted at once  [default: env COUP_MAX_CONNECTIONS or 16]

FLAGS:
  -h, --help                     Print help information

ENVIRONMENT:
  COUP_BIND                      Server bind address (e.g., 0.0.0.0:12345)
  COUP_MAX_CONNECTIONS           Connection limit
  RUST_LOG                       Log filter [default: info]
";

fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let config = Config::from_env(
        pargs.opt_value_from_str("--bind")?,
        pargs.opt_value_from_str("--max-connections")?,
    )?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_target(false)
        .init();
    info!(
        "Starting Coup relay at {} (max {} connections)",
        config.bind, config.max_connections
    );

    let (handle, addr) = coup::server::start(&config.server_config())?;
    info!("Bound to {addr}");

    // Catching signals for a clean shutdown.
    let keep_running = handle.keep_running();
    set_handler(move || keep_running.store(false, Ordering::SeqCst))?;

    handle.wait();
    info!("Server stopped");
    Ok(())
}
