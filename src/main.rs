//! memobox binary
//!
//! - `memobox serve`: collect memos until interrupted
//! - `memobox send [MEMO]`: submit one memo (stdin if omitted)

use memobox::client::{self, Sender};
use memobox::config::{ClientOptions, Config, Mode, ServerOptions};
use memobox::server::Server;
use memobox::MemoStore;
use tokio::io::AsyncReadExt;
use tracing::info;
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
        .init();

    match config.mode {
        Mode::Serve(options) => serve(options).await,
        Mode::Send { options, memo } => send(options, memo).await,
    }
}

/// Run the listener until Ctrl-C
async fn serve(options: ServerOptions) -> Result<(), Box<dyn std::error::Error>> {
    info!(host = %options.host, port = options.port, "Starting memobox server");

    let store = MemoStore::new();
    let server = Server::bind(&options, store.clone()).await?;

    tokio::select! {
        res = server.run() => res?,
        _ = tokio::signal::ctrl_c() => {
            info!(memos = store.len(), "Shutting down");
        }
    }

    Ok(())
}

/// Send a single memo taken from the command line or stdin
async fn send(
    options: ClientOptions,
    memo: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let memo = match memo {
        Some(memo) => memo,
        None => {
            let mut buf = String::new();
            tokio::io::stdin().read_to_string(&mut buf).await?;
            buf
        }
    };
    let memo = client::ensure_not_blank(client::strip_line_ending(&memo))?;

    Sender::new(options.clone()).send(memo).await?;
    info!(host = %options.host, port = options.port, "Memo sent!");
    Ok(())
}
