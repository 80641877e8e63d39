//! # coverproxy
//!
//! SSRF-safe outbound fetching for remote cover images.
//!
//! `coverproxy` fetches attacker-influenced URLs without letting them reach
//! the host, its internal network or cloud metadata endpoints. For every hop
//! of a redirect chain it:
//!
//! 1. checks the URL scheme,
//! 2. resolves the host once (A, then AAAA) and classifies the first address,
//! 3. pins the connection to that address while still presenting the
//!    hostname for Host / TLS SNI,
//! 4. reads at most `max_bytes` of body within the per-hop timeout.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use coverproxy::{fetch_safely, FetchConfig};
//!
//! # async fn example() -> Result<(), coverproxy::Error> {
//! let image = fetch_safely("https://example.com/cover.jpg", &FetchConfig::default()).await?;
//! println!("{} bytes of {}", image.body.len(), image.content_type);
//! # Ok(())
//! # }
//! ```

mod blocklist;
mod config;
mod error;
mod fetch;
mod proxy;
mod resolve;
mod safe_url;
mod transport;

#[cfg(feature = "server")]
pub mod server;

pub use blocklist::{blocked_reason, is_ip_safe, is_safe, ReservedRange, RESERVED_RANGES};
pub use config::{
    FetchConfig, DEFAULT_MAX_BYTES, DEFAULT_MAX_REDIRECTS, DEFAULT_TIMEOUT_MS, DEFAULT_USER_AGENT,
};
pub use error::{Error, Hop};
pub use fetch::{fetch_safely, FetchedImage, Fetcher, DEFAULT_CONTENT_TYPE};
pub use proxy::{proxy_image, url_param, ProxyReply, PROXY_IMAGE_PATH};
pub use resolve::{
    resolve_and_validate, DnsFailure, Family, HickoryResolver, Lookup, LookupError, Resolution,
    Resolve, ResolveError,
};
pub use safe_url::SafeUrl;
pub use transport::{HopRequest, HopResponse, ReqwestTransport, Transport, TransportError};
