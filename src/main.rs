//! tl1-link: TL1 server and client
//!
//! - `tl1-link serve` accepts TL1 connections
//! - `tl1-link client` opens an interactive prompt, or with `--samples`
//!   sends a fixed set of commands
//!
//! Configuration via CLI arguments or TOML file.

use tl1_link::config::{Config, Mode, ServerConfig};
use tl1_link::dispatch::Dispatcher;
use tl1_link::server::Server;
use tl1_link::shell;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match config.mode {
        Mode::Serve(server) => run_server(server).await,
        Mode::Client(client) => {
            shell::run(&client).await?;
            Ok(())
        }
    }
}

/// Run the server until Ctrl-C.
async fn run_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        listen = %config.listen,
        workers = config.workers,
        shutdown = ?config.shutdown,
        "Starting TL1 server"
    );

    let server = Server::bind(&config, Dispatcher::with_defaults())?;
    let handle = server.shutdown_handle();
    let addr = server.local_addr();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!(address = %addr, "Stopping TL1 server");
                handle.stop();
            }
            Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
        }
    });

    server.run().await?;
    Ok(())
}
