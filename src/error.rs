//! Error types for coverproxy.

use std::fmt;
use std::net::IpAddr;

use http::StatusCode;
use thiserror::Error;

use crate::resolve::{DnsFailure, ResolveError};

/// Position of a request in a redirect chain.
///
/// `Hop(0)` is the URL the caller asked for, `Hop(n)` the n-th redirect target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Hop(pub u8);

impl Hop {
    /// The caller's original request.
    pub const ORIGINAL: Hop = Hop(0);
}

impl fmt::Display for Hop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            f.write_str("original request")
        } else {
            write!(f, "redirect #{}", self.0)
        }
    }
}

/// Errors that terminate a fetch.
///
/// None of these are retried. The `Display` output carries operator detail
/// (host, address, hop); use [`Error::public_message`] for anything sent
/// back to an end user.
#[derive(Debug, Error)]
pub enum Error {
    /// The input is not an absolute URL with a host.
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The URL scheme is not in the allowed set.
    #[error("{hop}: scheme '{scheme}' not allowed for {url}")]
    InvalidProtocol {
        url: String,
        scheme: String,
        hop: Hop,
    },

    /// Neither an A nor an AAAA lookup produced an address.
    #[error("{hop}: DNS resolution failed for {host} ({failure})")]
    DnsResolutionFailed {
        host: String,
        hop: Hop,
        failure: DnsFailure,
    },

    /// The host resolved to an address outside the public internet.
    #[error("{hop}: {host} resolved to non-public address {ip} ({reason})")]
    PrivateAddressDenied {
        host: String,
        ip: IpAddr,
        hop: Hop,
        reason: &'static str,
    },

    /// A 3xx response came back without a usable `Location` header.
    #[error("{hop}: redirect from {url} without Location header")]
    MissingLocationHeader { url: String, hop: Hop },

    /// The response at `hop` redirected to `next` with no redirect budget left.
    #[error("{hop}: too many redirects starting at {url} (max {max}), refused {next}")]
    TooManyRedirects {
        url: String,
        next: String,
        hop: Hop,
        max: u8,
    },

    /// The response body exceeded the byte cap.
    #[error("{hop}: response from {url} exceeds {limit} bytes")]
    ContentTooLarge { url: String, hop: Hop, limit: usize },

    /// Non-success status, transport failure or timeout.
    #[error("{hop}: upstream error from {url}: {message}")]
    UpstreamError {
        url: String,
        hop: Hop,
        status: Option<u16>,
        message: String,
    },
}

impl Error {
    pub(crate) fn invalid_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn upstream(
        url: impl Into<String>,
        hop: Hop,
        status: Option<u16>,
        message: impl Into<String>,
    ) -> Self {
        Self::UpstreamError {
            url: url.into(),
            hop,
            status,
            message: message.into(),
        }
    }

    /// Attach the hop to a resolver failure.
    pub(crate) fn from_resolve(err: ResolveError, hop: Hop) -> Self {
        match err {
            ResolveError::DnsResolutionFailed { host, failure } => {
                Self::DnsResolutionFailed { host, hop, failure }
            }
            ResolveError::PrivateAddressDenied { host, ip, reason } => Self::PrivateAddressDenied {
                host,
                ip,
                hop,
                reason,
            },
        }
    }

    /// The hop this error occurred on, if it is tied to one.
    pub fn hop(&self) -> Option<Hop> {
        match self {
            Self::InvalidProtocol { hop, .. }
            | Self::DnsResolutionFailed { hop, .. }
            | Self::PrivateAddressDenied { hop, .. }
            | Self::MissingLocationHeader { hop, .. }
            | Self::TooManyRedirects { hop, .. }
            | Self::ContentTooLarge { hop, .. }
            | Self::UpstreamError { hop, .. } => Some(*hop),
            Self::InvalidUrl { .. } => None,
        }
    }

    /// HTTP status for the `/proxy-image` boundary.
    ///
    /// Bad input and denied addresses are the caller's problem (400), an
    /// oversized body is 413, anything that depends on remote conditions is 500.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidUrl { .. }
            | Self::InvalidProtocol { .. }
            | Self::PrivateAddressDenied { .. } => StatusCode::BAD_REQUEST,
            Self::ContentTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::DnsResolutionFailed { .. }
            | Self::MissingLocationHeader { .. }
            | Self::TooManyRedirects { .. }
            | Self::UpstreamError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short message safe to show an end user. Never names hosts or addresses.
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::InvalidUrl { .. } => "Invalid URL",
            Self::InvalidProtocol { .. } => "Invalid protocol",
            Self::PrivateAddressDenied { .. } => "Address not allowed",
            Self::ContentTooLarge { .. } => "Image too large",
            Self::DnsResolutionFailed { .. }
            | Self::MissingLocationHeader { .. }
            | Self::TooManyRedirects { .. }
            | Self::UpstreamError { .. } => "Failed to fetch image",
        }
    }
}
