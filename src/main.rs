//! coverproxy server
//!
//! Usage:
//!   coverproxy                              # listen on 127.0.0.1:3001
//!   coverproxy --listen 0.0.0.0:8080        # custom address
//!   RUST_LOG=coverproxy=debug coverproxy    # per-hop logging

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use coverproxy::{
    server, FetchConfig, Fetcher, DEFAULT_MAX_BYTES, DEFAULT_MAX_REDIRECTS, DEFAULT_TIMEOUT_MS,
    DEFAULT_USER_AGENT,
};

const DEFAULT_HEADER_TIMEOUT_MS: u64 = server::DEFAULT_HEADER_READ_TIMEOUT.as_millis() as u64;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// SSRF-safe image proxy
#[derive(Parser, Debug)]
#[command(name = "coverproxy")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(long, env = "COVERPROXY_LISTEN", default_value = "127.0.0.1:3001")]
    listen: SocketAddr,

    /// Redirects followed per request
    #[arg(long, env = "COVERPROXY_MAX_REDIRECTS", default_value_t = DEFAULT_MAX_REDIRECTS)]
    max_redirects: u8,

    /// Largest image accepted, in bytes
    #[arg(long, env = "COVERPROXY_MAX_BYTES", default_value_t = DEFAULT_MAX_BYTES)]
    max_bytes: usize,

    /// Timeout per hop, in milliseconds
    #[arg(long, env = "COVERPROXY_TIMEOUT_MS", default_value_t = DEFAULT_TIMEOUT_MS)]
    timeout_ms: u64,

    /// User-Agent sent upstream
    #[arg(long, env = "COVERPROXY_USER_AGENT", default_value = DEFAULT_USER_AGENT)]
    user_agent: String,

    /// Time a client has to send its request headers, in milliseconds
    #[arg(long, env = "COVERPROXY_HEADER_TIMEOUT_MS", default_value_t = DEFAULT_HEADER_TIMEOUT_MS)]
    header_timeout_ms: u64,
}

impl Args {
    fn fetch_config(&self) -> FetchConfig {
        FetchConfig::new()
            .max_redirects(self.max_redirects)
            .max_bytes(self.max_bytes)
            .timeout(Duration::from_millis(self.timeout_ms))
            .user_agent(self.user_agent.clone())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let fetcher = Arc::new(Fetcher::new(args.fetch_config()));
    let config = fetcher.config();

    let listener = TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("failed to bind {}", args.listen))?;

    tracing::info!(
        listen = %args.listen,
        max_redirects = config.max_redirects,
        max_bytes = config.max_bytes,
        timeout = ?config.timeout,
        header_timeout_ms = args.header_timeout_ms,
        "coverproxy listening"
    );

    let header_timeout = Duration::from_millis(args.header_timeout_ms);
    server::serve(listener, Arc::clone(&fetcher), header_timeout)
        .await
        .context("server stopped")?;

    Ok(())
}
