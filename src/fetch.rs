//! Redirect-safe fetching.
//!
//! Every hop of a redirect chain is parsed, resolved, classified and pinned
//! on its own before a single byte is sent to it. Nothing from an earlier hop
//! is trusted by a later one.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::time::Instant;
use url::Url;

use crate::config::FetchConfig;
use crate::error::{Error, Hop};
use crate::resolve::{
    resolve_and_validate, DnsFailure, HickoryResolver, Lookup, Resolution, Resolve,
};
use crate::safe_url::SafeUrl;
use crate::transport::{HopRequest, HopResponse, ReqwestTransport, Transport, TransportError};

/// `Content-Type` reported when the upstream sends none.
pub const DEFAULT_CONTENT_TYPE: &str = "image/jpeg";

/// A successfully fetched payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedImage {
    /// Upstream `Content-Type`, or [`DEFAULT_CONTENT_TYPE`].
    pub content_type: String,
    /// Body exactly as received.
    pub body: Bytes,
    /// URL of the hop that returned the body.
    pub final_url: Url,
    /// Redirects followed to get there.
    pub redirects: u8,
}

/// Fetch states. `Failed` is the `Err` leaving [`Fetcher::fetch`].
#[derive(Debug)]
enum State {
    /// Check the scheme of `url` and pin its host.
    Resolving { url: Url },
    /// Send the GET to the pinned address before the hop's `deadline`.
    Requesting {
        target: SafeUrl,
        pinned: Resolution,
        deadline: Instant,
    },
    /// A 3xx pointed at `url`; spend one unit of redirect budget or fail.
    Redirected { url: Url },
    Done(FetchedImage),
}

/// SSRF-safe fetcher.
///
/// Cheap to clone; holds no per-request state. Every call to
/// [`fetch`](Fetcher::fetch) owns its own redirect counter and current URL.
#[derive(Clone)]
pub struct Fetcher {
    resolver: Arc<dyn Resolve>,
    transport: Arc<dyn Transport>,
    config: FetchConfig,
}

impl Fetcher {
    /// Fetcher using hickory-dns and reqwest.
    pub fn new(config: FetchConfig) -> Self {
        Self::with_parts(
            Arc::new(HickoryResolver::new()),
            Arc::new(ReqwestTransport::new()),
            config,
        )
    }

    /// Fetcher with explicit resolver and transport.
    pub fn with_parts(
        resolver: Arc<dyn Resolve>,
        transport: Arc<dyn Transport>,
        config: FetchConfig,
    ) -> Self {
        Self {
            resolver,
            transport,
            config,
        }
    }

    /// Limits applied to every fetch.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Fetch `url`, following at most `max_redirects` redirects.
    ///
    /// At most `max_redirects + 1` requests are sent. If the last permitted
    /// request is itself answered with a redirect, the fetch fails with
    /// [`Error::TooManyRedirects`].
    ///
    /// `timeout` bounds each hop as a whole: DNS resolution and the HTTP
    /// request share it.
    pub async fn fetch(&self, url: &str) -> Result<FetchedImage, Error> {
        let start = Url::parse(url).map_err(|e| Error::invalid_url(url, e.to_string()))?;
        let mut redirects: u8 = 0;
        let mut state = State::Resolving { url: start };

        loop {
            let hop = Hop(redirects);
            state = match state {
                State::Resolving { url } => {
                    let deadline = Instant::now() + self.config.timeout;
                    let target = SafeUrl::from_url(url, &self.config, hop)?;
                    tracing::debug!(url = %target.as_str(), hop = %hop, "resolving");
                    let pinned = self.resolve(&target, deadline, hop).await?;
                    State::Requesting {
                        target,
                        pinned,
                        deadline,
                    }
                }
                State::Requesting {
                    target,
                    pinned,
                    deadline,
                } => {
                    let response = self.request(&target, &pinned, deadline, hop).await?;
                    self.on_response(target, response, hop)?
                }
                State::Redirected { url: next } => {
                    if redirects >= self.config.max_redirects {
                        tracing::warn!(
                            start = %url,
                            next = %next,
                            max = self.config.max_redirects,
                            "redirect limit reached"
                        );
                        return Err(Error::TooManyRedirects {
                            url: url.to_string(),
                            next: next.to_string(),
                            hop,
                            max: self.config.max_redirects,
                        });
                    }
                    redirects += 1;
                    State::Resolving { url: next }
                }
                State::Done(image) => return Ok(image),
            };
        }
    }

    async fn resolve(
        &self,
        target: &SafeUrl,
        deadline: Instant,
        hop: Hop,
    ) -> Result<Resolution, Error> {
        let lookup = resolve_and_validate(self.resolver.as_ref(), target.host());
        match tokio::time::timeout_at(deadline, lookup).await {
            Ok(result) => result.map_err(|e| Error::from_resolve(e, hop)),
            Err(_) => {
                tracing::warn!(
                    host = %target.host(),
                    hop = %hop,
                    timeout = ?self.config.timeout,
                    "DNS resolution timed out"
                );
                Err(Error::DnsResolutionFailed {
                    host: target.host().to_string(),
                    hop,
                    failure: DnsFailure {
                        ipv4: Lookup::Failed("timed out".to_string()),
                        ipv6: Lookup::Failed("timed out".to_string()),
                    },
                })
            }
        }
    }

    async fn request(
        &self,
        target: &SafeUrl,
        pinned: &Resolution,
        deadline: Instant,
        hop: Hop,
    ) -> Result<HopResponse, Error> {
        let request = HopRequest {
            url: target.url(),
            host: target.connect_host(),
            pinned: SocketAddr::new(pinned.address, target.port()),
            // Whatever DNS left of the hop's budget.
            timeout: deadline.saturating_duration_since(Instant::now()),
            max_bytes: self.config.max_bytes,
            user_agent: &self.config.user_agent,
        };

        tracing::debug!(
            url = %target.as_str(),
            pinned = %request.pinned,
            hop = %hop,
            "requesting"
        );

        self.transport.get(request).await.map_err(|e| match e {
            TransportError::TooLarge { limit } => Error::ContentTooLarge {
                url: target.as_str().to_string(),
                hop,
                limit,
            },
            other => Error::upstream(target.as_str(), hop, None, other.to_string()),
        })
    }

    fn on_response(
        &self,
        target: SafeUrl,
        response: HopResponse,
        hop: Hop,
    ) -> Result<State, Error> {
        if response.is_success() {
            // Transports are expected to enforce the cap; re-check anyway.
            if response.body.len() > self.config.max_bytes {
                return Err(Error::ContentTooLarge {
                    url: target.as_str().to_string(),
                    hop,
                    limit: self.config.max_bytes,
                });
            }
            return Ok(State::Done(FetchedImage {
                content_type: response
                    .content_type
                    .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
                body: response.body,
                final_url: target.into_url(),
                redirects: hop.0,
            }));
        }

        if response.is_redirect() {
            let location = response
                .location
                .as_deref()
                .map(str::trim)
                .filter(|location| !location.is_empty())
                .ok_or_else(|| Error::MissingLocationHeader {
                    url: target.as_str().to_string(),
                    hop,
                })?;
            let next = target.join(location, hop)?;
            tracing::debug!(from = %target.as_str(), to = %next, hop = %hop, "redirected");
            return Ok(State::Redirected { url: next });
        }

        Err(Error::upstream(
            target.as_str(),
            hop,
            Some(response.status),
            format!("HTTP {}", response.status),
        ))
    }
}

/// Fetch `url` with a default hickory resolver and reqwest transport.
pub async fn fetch_safely(url: &str, config: &FetchConfig) -> Result<FetchedImage, Error> {
    Fetcher::new(config.clone()).fetch(url).await
}
