//! Configuration module for memobox.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values, which take
//! precedence over built-in defaults.

use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::handler::EmptyMemoPolicy;

/// Default bind and connect host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default bind and connect port.
pub const DEFAULT_PORT: u16 = 65432;

/// Default listen backlog for the server socket.
pub const DEFAULT_BACKLOG: i32 = 1024;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "memobox")]
#[command(author = "memobox authors")]
#[command(version = "0.1.0")]
#[command(about = "Send and collect short text memos over TCP", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Accept memos and keep them in memory until the process exits
    Serve(ServeArgs),
    /// Send a single memo to a running server
    Send(SendArgs),
}

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Address to bind to
    #[arg(short = 'H', long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Maximum number of connections handled at once (unlimited if unset)
    #[arg(short = 'm', long)]
    pub max_connections: Option<NonZeroUsize>,

    /// Give up on a connection after this many idle seconds (0 or unset = never)
    #[arg(short = 't', long)]
    pub read_timeout: Option<u64>,

    /// Store empty memos instead of discarding them
    #[arg(long)]
    pub accept_empty: bool,
}

#[derive(Args, Debug, Default)]
pub struct SendArgs {
    /// Server host
    #[arg(short = 'H', long)]
    pub host: Option<String>,

    /// Server port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Seconds to wait for the connection to be established (0 = no limit)
    #[arg(long)]
    pub connect_timeout: Option<u64>,

    /// Memo text; read from stdin when omitted
    pub memo: Option<String>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_backlog")]
    pub backlog: i32,
    pub max_connections: Option<NonZeroUsize>,
    /// Idle read window in seconds (0 = no timeout)
    pub read_timeout_secs: Option<u64>,
    #[serde(default)]
    pub accept_empty: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            backlog: default_backlog(),
            max_connections: None,
            read_timeout_secs: None,
            accept_empty: false,
        }
    }
}

/// Client-related configuration
#[derive(Debug, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Connect timeout in seconds (0 = no timeout)
    pub connect_timeout_secs: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            connect_timeout_secs: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_backlog() -> i32 {
    DEFAULT_BACKLOG
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Resolved listener settings.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub host: String,
    pub port: u16,
    pub backlog: i32,
    /// Cap on in-flight handlers; `None` spawns without limit.
    pub max_connections: Option<NonZeroUsize>,
    /// Idle read window per connection; `None` waits forever.
    pub read_timeout: Option<Duration>,
    pub empty_memo: EmptyMemoPolicy,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            backlog: default_backlog(),
            max_connections: None,
            read_timeout: None,
            empty_memo: EmptyMemoPolicy::default(),
        }
    }
}

/// Resolved sender settings.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub host: String,
    pub port: u16,
    pub connect_timeout: Option<Duration>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            connect_timeout: None,
        }
    }
}

/// What the binary was asked to do.
#[derive(Debug, Clone)]
pub enum Mode {
    Serve(ServerOptions),
    Send {
        options: ClientOptions,
        memo: Option<String>,
    },
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
        Self::from_cli(CliArgs::parse())
    }

    /// Merge already-parsed CLI args with the TOML file they point to.
    pub fn from_cli(cli: CliArgs) -> Result<Self, ConfigError> {
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Ok(Self::merge(cli, toml_config))
    }

    fn merge(cli: CliArgs, toml_config: TomlConfig) -> Self {
        let mode = match cli.command {
            CliCommand::Serve(args) => {
                let server = toml_config.server;
                let accept_empty = args.accept_empty || server.accept_empty;
                Mode::Serve(ServerOptions {
                    host: args.host.unwrap_or(server.host),
                    port: args.port.unwrap_or(server.port),
                    backlog: server.backlog,
                    max_connections: args.max_connections.or(server.max_connections),
                    read_timeout: timeout_secs(args.read_timeout.or(server.read_timeout_secs)),
                    empty_memo: if accept_empty {
                        EmptyMemoPolicy::Accept
                    } else {
                        EmptyMemoPolicy::Discard
                    },
                })
            }
            CliCommand::Send(args) => {
                let client = toml_config.client;
                Mode::Send {
                    options: ClientOptions {
                        host: args.host.unwrap_or(client.host),
                        port: args.port.unwrap_or(client.port),
                        connect_timeout: timeout_secs(
                            args.connect_timeout.or(client.connect_timeout_secs),
                        ),
                    },
                    memo: args.memo,
                }
            }
        };

        Config {
            mode,
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        }
    }
}

/// Seconds to a timeout, where 0 turns the timeout off.
fn timeout_secs(secs: Option<u64>) -> Option<Duration> {
    secs.filter(|&s| s > 0).map(Duration::from_secs)
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {}", .0.display(), .1)]
    FileRead(PathBuf, #[source] std::io::Error),
    #[error("Failed to parse config file '{}': {}", .0.display(), .1)]
    TomlParse(PathBuf, #[source] toml::de::Error),
}
