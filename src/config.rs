//! Configuration for the TL1 server and client.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "tl1-link")]
#[command(author = "tl1-link authors")]
#[command(version = "0.1.0")]
#[command(about = "TL1 command/response server and client", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short = 'f', long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Run the TL1 server
    Serve(ServeArgs),
    /// Connect to a TL1 server
    Client(ClientArgs),
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to bind to (e.g., 0.0.0.0:8080)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Maximum number of sessions served at once
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// What happens to open sessions when the server stops
    #[arg(long, value_enum)]
    pub shutdown: Option<ShutdownMode>,
}

#[derive(Args, Debug)]
pub struct ClientArgs {
    /// Server address (e.g., 127.0.0.1:8080)
    #[arg(short = 'c', long)]
    pub connect: Option<String>,

    /// Send the sample commands instead of starting a prompt
    #[arg(long)]
    pub samples: bool,

    /// Delay between sample commands in milliseconds
    #[arg(long)]
    pub sample_delay_ms: Option<u64>,
}

/// What happens to open sessions when the server stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ShutdownMode {
    /// Sessions run until their clients disconnect
    #[default]
    Drain,
    /// Sessions are closed while waiting for input or for the peer to read
    Abort,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub client: ClientSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerSection {
    /// Address to bind to
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Maximum number of sessions served at once
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub shutdown: ShutdownMode,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            workers: default_workers(),
            shutdown: ShutdownMode::default(),
        }
    }
}

/// Client-related configuration
#[derive(Debug, Deserialize)]
pub struct ClientSection {
    /// Server address
    #[serde(default = "default_connect")]
    pub connect: String,
    /// Delay between sample commands in milliseconds
    #[serde(default = "default_sample_delay_ms")]
    pub sample_delay_ms: u64,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            connect: default_connect(),
            sample_delay_ms: default_sample_delay_ms(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_workers() -> usize {
    10
}

fn default_connect() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_sample_delay_ms() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Resolved server settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub workers: usize,
    pub shutdown: ShutdownMode,
}

/// Resolved client settings
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub connect: String,
    pub samples: bool,
    pub sample_delay: Duration,
}

/// Which side of the protocol to run
#[derive(Debug, Clone)]
pub enum Mode {
    Serve(ServerConfig),
    Client(ClientConfig),
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(CliArgs::parse())
    }

    /// Merge parsed CLI args with the TOML file they point to, if any.
    /// CLI arguments take precedence over TOML file values.
    pub fn from_args(cli: CliArgs) -> Result<Self, ConfigError> {
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        let mode = match cli.command {
            CliCommand::Serve(args) => {
                let listen = args.listen.unwrap_or(toml_config.server.listen);
                let listen = listen
                    .parse()
                    .map_err(|_| ConfigError::InvalidListen(listen))?;
                let workers = args.workers.unwrap_or(toml_config.server.workers);
                if workers == 0 {
                    return Err(ConfigError::ZeroWorkers);
                }
                Mode::Serve(ServerConfig {
                    listen,
                    workers,
                    shutdown: args.shutdown.unwrap_or(toml_config.server.shutdown),
                })
            }
            CliCommand::Client(args) => Mode::Client(ClientConfig {
                connect: args.connect.unwrap_or(toml_config.client.connect),
                samples: args.samples,
                sample_delay: Duration::from_millis(
                    args.sample_delay_ms
                        .unwrap_or(toml_config.client.sample_delay_ms),
                ),
            }),
        };

        Ok(Config {
            mode,
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        })
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {}", .0.display(), .1)]
    FileRead(PathBuf, #[source] std::io::Error),
    #[error("Failed to parse config file '{}': {}", .0.display(), .1)]
    TomlParse(PathBuf, #[source] toml::de::Error),
    #[error("Invalid listen address '{0}'")]
    InvalidListen(String),
    #[error("Worker count must be at least 1")]
    ZeroWorkers,
}
