//! Error types for memo submission.
//!
//! A single flat enum covers the listener, the per-connection handler and
//! the sender. Only a `Bind` failure stops the server; everything raised
//! while handling a connection ends that connection alone.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;

/// Result alias for memo operations.
pub type Result<T> = std::result::Result<T, MemoError>;

#[derive(Error, Debug)]
pub enum MemoError {
    /// The listening socket could not be created or bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// Read or write failure on an established connection.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The received payload is not valid UTF-8.
    #[error("memo is not valid UTF-8: {0}")]
    Decode(#[from] std::str::Utf8Error),

    /// No bytes arrived within the configured read window.
    #[error("no data received for {0:?}")]
    ReadTimeout(Duration),

    /// The sender could not reach the server.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("timed out connecting to {addr} after {timeout:?}")]
    ConnectTimeout { addr: String, timeout: Duration },

    /// Blank memos are refused before any connection is made.
    #[error("memo is empty")]
    EmptyMemo,

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
