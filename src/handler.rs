//! Per-connection memo handling.
//!
//! A connection carries exactly one memo: the handler reads until the
//! peer closes its side, decodes the whole payload as UTF-8 and hands the
//! result to the memo sink. Nothing reaches the sink unless the stream was
//! drained to EOF and decoded cleanly.

use bytes::BytesMut;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, trace};

use crate::error::{MemoError, Result};
use crate::store::MemoSink;

/// Bytes reserved ahead of each read.
pub const READ_CHUNK_SIZE: usize = 1024;

/// What to do with a connection that closed without sending anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptyMemoPolicy {
    /// Drop it; the store only ever holds non-empty memos.
    #[default]
    Discard,
    /// Store it as `""`.
    Accept,
}

/// Per-connection settings
#[derive(Debug, Clone, Copy, Default)]
pub struct HandlerOptions {
    /// Give up if no bytes arrive for this long. `None` or zero waits forever.
    pub read_timeout: Option<Duration>,
    pub empty_memo: EmptyMemoPolicy,
}

/// Result of a connection that ran to EOF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Stored { bytes: usize },
    DiscardedEmpty,
}

/// Exclusive owner of one client stream.
///
/// The stream is released the first time [`close`](Self::close) is
/// called, or on drop if it never was.
#[derive(Debug)]
pub struct Connection<S> {
    stream: Option<S>,
    peer: Option<SocketAddr>,
}

impl<S> Connection<S> {
    pub fn new(stream: S, peer: Option<SocketAddr>) -> Self {
        Self {
            stream: Some(stream),
            peer,
        }
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Release the stream. Returns `false` if it was already released.
    pub fn close(&mut self) -> bool {
        match self.stream.take() {
            Some(stream) => {
                drop(stream);
                debug!(peer = ?self.peer, "Connection closed");
                true
            }
            None => false,
        }
    }
}

impl<S: AsyncRead + Unpin> Connection<S> {
    /// Read until the peer closes its write half.
    ///
    /// On error the partial buffer is dropped along with the future.
    pub async fn read_to_eof(&mut self, read_timeout: Option<Duration>) -> Result<BytesMut> {
        let stream = self.stream.as_mut().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotConnected, "connection already closed")
        })?;
        let mut buffer = BytesMut::with_capacity(READ_CHUNK_SIZE);

        loop {
            buffer.reserve(READ_CHUNK_SIZE);
            let read = stream.read_buf(&mut buffer);
            let n = match read_timeout.filter(|limit| !limit.is_zero()) {
                Some(limit) => tokio::time::timeout(limit, read)
                    .await
                    .map_err(|_| MemoError::ReadTimeout(limit))??,
                None => read.await?,
            };

            if n == 0 {
                trace!(peer = ?self.peer, total = buffer.len(), "EOF");
                return Ok(buffer);
            }
            trace!(peer = ?self.peer, bytes = n, total = buffer.len(), "Read chunk");
        }
    }
}

impl<S> Drop for Connection<S> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Read one memo from `connection` and append it to `sink`.
///
/// The connection is closed before this returns, whatever the outcome.
pub async fn handle_connection<S, K>(
    mut connection: Connection<S>,
    sink: &K,
    options: HandlerOptions,
) -> Result<Delivery>
where
    S: AsyncRead + Unpin,
    K: MemoSink + ?Sized,
{
    let read = connection.read_to_eof(options.read_timeout).await;
    connection.close();
    let buffer = read?;

    let memo = std::str::from_utf8(&buffer)?;

    if memo.is_empty() && options.empty_memo == EmptyMemoPolicy::Discard {
        debug!(peer = ?connection.peer(), "Discarding empty memo");
        return Ok(Delivery::DiscardedEmpty);
    }

    sink.append(memo.to_owned());
    Ok(Delivery::Stored {
        bytes: buffer.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoStore;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_reads_chunks_until_eof() {
        let store = MemoStore::new();
        let mock = Builder::new().read(b"Buy ").read(b"milk").build();

        let delivery = handle_connection(Connection::new(mock, None), &*store, Default::default())
            .await
            .unwrap();

        assert_eq!(delivery, Delivery::Stored { bytes: 8 });
        assert_eq!(store.snapshot(), vec!["Buy milk"]);
    }

    #[tokio::test]
    async fn test_multibyte_split_across_reads() {
        // "é" is 0xC3 0xA9; each half arrives in a different read.
        let store = MemoStore::new();
        let mock = Builder::new().read(b"caf\xc3").read(b"\xa9").build();

        handle_connection(Connection::new(mock, None), &*store, Default::default())
            .await
            .unwrap();

        assert_eq!(store.snapshot(), vec!["café"]);
    }

    #[tokio::test]
    async fn test_payload_larger_than_chunk() {
        let store = MemoStore::new();
        let text = "x".repeat(READ_CHUNK_SIZE * 3 + 17);
        let mock = Builder::new().read(text.as_bytes()).build();

        let delivery = handle_connection(Connection::new(mock, None), &*store, Default::default())
            .await
            .unwrap();

        assert_eq!(delivery, Delivery::Stored { bytes: text.len() });
        assert_eq!(store.snapshot(), vec![text]);
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_dropped() {
        let store = MemoStore::new();
        let mock = Builder::new().read(b"\xff\xfe").build();

        let err = handle_connection(Connection::new(mock, None), &*store, Default::default())
            .await
            .unwrap_err();

        assert!(matches!(err, MemoError::Decode(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_read_error_drops_partial_memo() {
        let store = MemoStore::new();
        let mock = Builder::new()
            .read(b"half a me")
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .build();

        let err = handle_connection(Connection::new(mock, None), &*store, Default::default())
            .await
            .unwrap_err();

        assert!(matches!(err, MemoError::Io(ref e) if e.kind() == io::ErrorKind::ConnectionReset));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_empty_memo_discarded_by_default() {
        let store = MemoStore::new();
        let mock = Builder::new().build();

        let delivery = handle_connection(Connection::new(mock, None), &*store, Default::default())
            .await
            .unwrap();

        assert_eq!(delivery, Delivery::DiscardedEmpty);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_empty_memo_accepted_when_configured() {
        let store = MemoStore::new();
        let mock = Builder::new().build();
        let options = HandlerOptions {
            empty_memo: EmptyMemoPolicy::Accept,
            ..Default::default()
        };

        let delivery = handle_connection(Connection::new(mock, None), &*store, options)
            .await
            .unwrap();

        assert_eq!(delivery, Delivery::Stored { bytes: 0 });
        assert_eq!(store.snapshot(), vec![""]);
    }

    #[tokio::test]
    async fn test_whitespace_memo_is_not_empty() {
        let store = MemoStore::new();
        let mock = Builder::new().read(b"  ").build();

        handle_connection(Connection::new(mock, None), &*store, Default::default())
            .await
            .unwrap();

        assert_eq!(store.snapshot(), vec!["  "]);
    }

    #[tokio::test]
    async fn test_read_timeout() {
        let store = MemoStore::new();
        let mock = Builder::new()
            .read(b"stalled")
            .wait(Duration::from_secs(5))
            .build();
        let options = HandlerOptions {
            read_timeout: Some(Duration::from_millis(50)),
            ..Default::default()
        };

        let err = handle_connection(Connection::new(mock, None), &*store, options)
            .await
            .unwrap_err();

        assert!(matches!(err, MemoError::ReadTimeout(d) if d == Duration::from_millis(50)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_zero_read_timeout_waits() {
        let store = MemoStore::new();
        let mock = Builder::new()
            .wait(Duration::from_millis(20))
            .read(b"hello")
            .build();
        let options = HandlerOptions {
            read_timeout: Some(Duration::ZERO),
            ..Default::default()
        };

        let delivery = handle_connection(Connection::new(mock, None), &*store, options)
            .await
            .unwrap();

        assert_eq!(delivery, Delivery::Stored { bytes: 5 });
        assert_eq!(store.snapshot(), vec!["hello"]);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let mock = Builder::new().build();
        let mut connection = Connection::new(mock, None);

        assert!(connection.is_open());
        assert!(connection.close());
        assert!(!connection.is_open());
        assert!(!connection.close());
        assert!(!connection.close());
    }

    #[tokio::test]
    async fn test_read_after_close() {
        let mut connection = Connection::new(Builder::new().build(), None);
        connection.close();

        let err = connection.read_to_eof(None).await.unwrap_err();
        assert!(matches!(err, MemoError::Io(ref e) if e.kind() == io::ErrorKind::NotConnected));
    }
}
