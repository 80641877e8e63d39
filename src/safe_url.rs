//! Per-hop URL parsing and scheme checks.

use url::Url;

use crate::config::FetchConfig;
use crate::error::{Error, Hop};

/// A URL that passed the scheme check for one hop.
///
/// This is the input to resolution; it says nothing yet about where the
/// host points.
#[derive(Debug, Clone)]
pub struct SafeUrl {
    inner: Url,
    host: String,
}

impl SafeUrl {
    /// Parse the caller's URL.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidUrl`] if `input` is not an absolute URL with a host,
    /// [`Error::InvalidProtocol`] if its scheme is not allowed.
    pub fn parse(input: &str, config: &FetchConfig) -> Result<Self, Error> {
        let url = Url::parse(input).map_err(|e| Error::invalid_url(input, e.to_string()))?;
        Self::from_url(url, config, Hop::ORIGINAL)
    }

    /// Check an already-parsed URL reached at `hop`.
    pub fn from_url(url: Url, config: &FetchConfig, hop: Hop) -> Result<Self, Error> {
        if !config.allows_scheme(url.scheme()) {
            return Err(Error::InvalidProtocol {
                url: url.to_string(),
                scheme: url.scheme().to_string(),
                hop,
            });
        }

        let host = url
            .host_str()
            .ok_or_else(|| Error::invalid_url(url.as_str(), "URL must have a host"))?;
        let host = normalize_host(host);
        if host.is_empty() {
            return Err(Error::invalid_url(url.as_str(), "empty hostname"));
        }

        Ok(Self { inner: url, host })
    }

    /// Normalized hostname: lowercase, no trailing dot, no IPv6 brackets.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Host exactly as the HTTP client will see it in the request URI,
    /// minus IPv6 brackets. This is the key a connect override must use.
    pub fn connect_host(&self) -> &str {
        self.inner
            .host_str()
            .map(|h| h.trim_start_matches('[').trim_end_matches(']'))
            .unwrap_or(&self.host)
    }

    /// Port, defaulting to 80 for http and 443 for https.
    pub fn port(&self) -> u16 {
        self.inner.port_or_known_default().unwrap_or(80)
    }

    pub fn as_str(&self) -> &str {
        self.inner.as_str()
    }

    pub fn url(&self) -> &Url {
        &self.inner
    }

    /// Resolve a `Location` header against this URL. Relative references
    /// (`/next.jpg`, `../a.png`, `//cdn.example/x`) are supported.
    ///
    /// A `Location` that cannot be resolved is the upstream's fault and
    /// surfaces as [`Error::UpstreamError`].
    pub fn join(&self, location: &str, hop: Hop) -> Result<Url, Error> {
        self.inner.join(location).map_err(|e| {
            Error::upstream(
                self.as_str(),
                hop,
                None,
                format!("invalid Location header '{}': {}", location, e),
            )
        })
    }

    pub fn into_url(self) -> Url {
        self.inner
    }
}

fn normalize_host(host: &str) -> String {
    let mut normalized = host
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_lowercase();
    if normalized.ends_with('.') {
        normalized.pop();
    }
    normalized
}
