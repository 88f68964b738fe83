//! TCP listener for incoming memos.
//!
//! Accepts connections forever and hands each one to its own task. The
//! listener never waits on handlers and never touches the store itself;
//! handlers get a clone of the sink handle when they are spawned.

use crate::config::ServerOptions;
use crate::error::{MemoError, Result};
use crate::handler::{handle_connection, Connection, Delivery, HandlerOptions};
use crate::store::{MemoSink, MemoStore};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// Memo server bound to a listening socket
pub struct Server {
    listener: TcpListener,
    sink: Arc<dyn MemoSink>,
    handler_options: HandlerOptions,
    /// `None` means no admission limit.
    connection_limit: Option<Arc<Semaphore>>,
}

impl Server {
    /// Resolve and bind the listening socket.
    ///
    /// Failing here is fatal for the server; nothing else is.
    pub async fn bind(options: &ServerOptions, sink: Arc<dyn MemoSink>) -> Result<Self> {
        let addr = resolve(&options.host, options.port).await?;
        let listener = create_listener(addr, options.backlog)
            .map_err(|source| MemoError::Bind { addr, source })?;

        info!(
            address = %listener.local_addr().unwrap_or(addr),
            max_connections = ?options.max_connections,
            read_timeout = ?options.read_timeout,
            empty_memo = ?options.empty_memo,
            "Server listening"
        );

        Ok(Server {
            listener,
            sink,
            handler_options: HandlerOptions {
                read_timeout: options.read_timeout,
                empty_memo: options.empty_memo,
            },
            connection_limit: options
                .max_connections
                .map(|max| Arc::new(Semaphore::new(max.get()))),
        })
    }

    /// The address actually bound, useful when binding port 0
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until the task is dropped
    pub async fn run(self) -> Result<()> {
        loop {
            // Wait for a connection slot
            let permit = match &self.connection_limit {
                Some(limit) => Some(
                    Arc::clone(limit)
                        .acquire_owned()
                        .await
                        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?,
                ),
                None => None,
            };

            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    debug!(peer = %peer, "New connection");

                    let sink = Arc::clone(&self.sink);
                    let options = self.handler_options;

                    tokio::spawn(async move {
                        let connection = Connection::new(stream, Some(peer));
                        match handle_connection(connection, sink.as_ref(), options).await {
                            Ok(Delivery::Stored { bytes }) => {
                                info!(peer = %peer, bytes, "Received memo");
                            }
                            Ok(Delivery::DiscardedEmpty) => {
                                debug!(peer = %peer, "Empty memo discarded");
                            }
                            Err(e) => {
                                warn!(peer = %peer, error = %e, "Memo dropped");
                            }
                        }
                        drop(permit);
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }
}

/// Bind `host:port` with default options and serve into `store` forever.
pub async fn start(host: &str, port: u16, store: Arc<MemoStore>) -> Result<()> {
    let options = ServerOptions {
        host: host.to_string(),
        port,
        ..Default::default()
    };
    Server::bind(&options, store).await?.run().await
}

async fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| MemoError::InvalidAddress(format!("{host}:{port}: {e}")))?
        .next()
        .ok_or_else(|| MemoError::InvalidAddress(format!("{host}:{port}: no addresses")))
}

/// Create the listening socket with SO_REUSEADDR and the given backlog.
fn create_listener(addr: SocketAddr, backlog: i32) -> io::Result<TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;

    TcpListener::from_std(socket.into())
}
