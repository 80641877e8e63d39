//! One HTTP GET against a pinned address.
//!
//! The transport never resolves names and never follows redirects. It is
//! handed the address to dial and the hostname to present (Host header and
//! TLS server name), performs a single request, and hands the response back
//! to the fetcher.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::header::{CONTENT_TYPE, LOCATION, USER_AGENT};
use reqwest::redirect::Policy as RedirectPolicy;
use reqwest::Client;
use thiserror::Error;
use url::Url;

/// Everything needed for one hop.
#[derive(Debug, Clone)]
pub struct HopRequest<'a> {
    /// URL to request; its host is what the server sees.
    pub url: &'a Url,
    /// Host to pin, as it appears in `url` (no IPv6 brackets).
    pub host: &'a str,
    /// The only address that may be dialed.
    pub pinned: SocketAddr,
    pub timeout: Duration,
    pub max_bytes: usize,
    pub user_agent: &'a str,
}

/// What came back from one hop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HopResponse {
    pub status: u16,
    /// Raw `Location` header, if present and valid UTF-8.
    pub location: Option<String>,
    pub content_type: Option<String>,
    /// Body bytes. Only read for 2xx responses; empty otherwise.
    pub body: Bytes,
}

impl HopResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }
}

/// Transport-level failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The body (or its declared length) passed the byte cap.
    #[error("response exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("request failed: {0}")]
    Request(String),
}

/// Performs a single GET to a pinned address.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, request: HopRequest<'_>) -> Result<HopResponse, TransportError>;
}

/// [`Transport`] built on reqwest.
///
/// A fresh client is built for every hop with a connect override mapping the
/// hop's host to the pinned address, so reqwest's own resolver is never
/// consulted. The client (and its connection) is dropped when the hop ends.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReqwestTransport;

impl ReqwestTransport {
    pub fn new() -> Self {
        Self
    }

    fn client_for(&self, request: &HopRequest<'_>) -> Result<Client, TransportError> {
        Client::builder()
            .resolve(request.host, request.pinned)
            .redirect(RedirectPolicy::none())
            // A system proxy would do its own resolution of the real host.
            .no_proxy()
            .pool_max_idle_per_host(0)
            .timeout(request.timeout)
            // Sizes are capped on the wire bytes; no decompression bombs.
            .no_gzip()
            .no_brotli()
            .no_deflate()
            .build()
            .map_err(|e| TransportError::Request(format!("failed to create client: {}", e)))
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, request: HopRequest<'_>) -> Result<HopResponse, TransportError> {
        let client = self.client_for(&request)?;

        let response = client
            .get(request.url.as_str())
            .header(USER_AGENT, request.user_agent)
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, request.timeout))?;

        let status = response.status().as_u16();
        let location = header_string(&response, LOCATION.as_str());
        let content_type = header_string(&response, CONTENT_TYPE.as_str());

        if !response.status().is_success() {
            return Ok(HopResponse {
                status,
                location,
                content_type,
                body: Bytes::new(),
            });
        }

        // Fail fast on a declared length over the cap.
        if let Some(content_length) = response.content_length() {
            if content_length > request.max_bytes as u64 {
                return Err(TransportError::TooLarge {
                    limit: request.max_bytes,
                });
            }
        }

        let body = read_body_with_limit(response, request.max_bytes, request.timeout).await?;

        Ok(HopResponse {
            status,
            location,
            content_type,
            body,
        })
    }
}

/// Read the body chunk by chunk, stopping as soon as the running total would
/// pass `max_bytes`. The rest of the transfer is abandoned with the response.
async fn read_body_with_limit(
    mut response: reqwest::Response,
    max_bytes: usize,
    timeout: Duration,
) -> Result<Bytes, TransportError> {
    let mut body = BytesMut::new();

    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| map_reqwest_error(e, timeout))?
    {
        if body.len() + chunk.len() > max_bytes {
            return Err(TransportError::TooLarge { limit: max_bytes });
        }
        body.extend_from_slice(&chunk);
    }

    Ok(body.freeze())
}

fn header_string(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn map_reqwest_error(e: reqwest::Error, timeout: Duration) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(timeout)
    } else {
        TransportError::Request(e.to_string())
    }
}
