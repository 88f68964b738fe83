//! memobox: submit short text memos over TCP.
//!
//! The protocol is as small as it gets: a client opens a connection,
//! writes the UTF-8 text of one memo and closes. The server reads each
//! connection to EOF, decodes it and appends the memo to an in-memory
//! store shared by every connection handler.
//!
//! - [`client`]: one-shot memo sender
//! - [`server`]: accept loop spawning one task per connection
//! - [`handler`]: read-to-EOF, decode and append
//! - [`store`]: append-only memo list behind a mutex

pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod server;
pub mod store;

pub use config::{ClientOptions, ServerOptions, DEFAULT_HOST, DEFAULT_PORT};
pub use error::{MemoError, Result};
pub use handler::EmptyMemoPolicy;
pub use store::{MemoSink, MemoStore};
