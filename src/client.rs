//! Memo sender.
//!
//! One connection per memo: connect, write every byte, shut down the write
//! half so the server sees EOF, then drop the socket. Nothing is read back;
//! a successful send means the bytes left this process, not that the
//! server stored them.

use crate::config::ClientOptions;
use crate::error::{MemoError, Result};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::debug;

/// Sends memos to one server address
#[derive(Debug, Clone)]
pub struct Sender {
    options: ClientOptions,
}

impl Sender {
    pub fn new(options: ClientOptions) -> Self {
        Self { options }
    }

    /// Deliver `memo` over a fresh connection. No retries.
    pub async fn send(&self, memo: &str) -> Result<()> {
        let addr = format!("{}:{}", self.options.host, self.options.port);
        let connect = TcpStream::connect((self.options.host.as_str(), self.options.port));

        let connected = match self.options.connect_timeout.filter(|t| !t.is_zero()) {
            Some(timeout) => tokio::time::timeout(timeout, connect).await.map_err(|_| {
                MemoError::ConnectTimeout {
                    addr: addr.clone(),
                    timeout,
                }
            })?,
            None => connect.await,
        };
        let mut stream = connected.map_err(|source| MemoError::Connect {
            addr: addr.clone(),
            source,
        })?;

        stream.write_all(memo.as_bytes()).await?;
        stream.shutdown().await?;

        debug!(address = %addr, bytes = memo.len(), "Memo sent");
        Ok(())
    }
}

/// Send one memo to `host:port` with default options.
pub async fn send(memo: &str, host: &str, port: u16) -> Result<()> {
    Sender::new(ClientOptions {
        host: host.to_string(),
        port,
        ..Default::default()
    })
    .send(memo)
    .await
}

/// Drop one trailing `\n` or `\r\n`, as left by line-oriented input.
pub fn strip_line_ending(memo: &str) -> &str {
    memo.strip_suffix('\n')
        .map(|rest| rest.strip_suffix('\r').unwrap_or(rest))
        .unwrap_or(memo)
}

/// Refuse memos that are empty or only whitespace.
///
/// The wire protocol carries such memos fine; this is for interactive
/// front ends that should not bother the server with them.
pub fn ensure_not_blank(memo: &str) -> Result<&str> {
    if memo.trim().is_empty() {
        Err(MemoError::EmptyMemo)
    } else {
        Ok(memo)
    }
}
