//! Fetch limits.

use std::time::Duration;

use serde::Deserialize;

/// Default number of redirects followed after the original request.
pub const DEFAULT_MAX_REDIRECTS: u8 = 5;

/// Default cap on a response body (10 MiB).
pub const DEFAULT_MAX_BYTES: usize = 10 * 1024 * 1024;

/// Default timeout for a single hop (10 seconds).
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Default `User-Agent` sent upstream. Some image hosts refuse unknown agents.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0";

/// Limits applied to one fetch.
///
/// Every fetch gets its own copy; nothing here is shared between requests.
/// The worst-case wall-clock time of a fetch is roughly
/// `(max_redirects + 1) * timeout`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawFetchConfig")]
pub struct FetchConfig {
    /// Redirects followed before giving up.
    /// Default: 5
    pub max_redirects: u8,

    /// Largest response body accepted, in bytes.
    /// Default: 10 MiB
    pub max_bytes: usize,

    /// Timeout for one hop (connect, headers and body).
    /// Default: 10 seconds
    pub timeout: Duration,

    /// Lowercase URL schemes that may be requested.
    /// Default: http, https
    pub allowed_schemes: Vec<String>,

    /// `User-Agent` header sent upstream.
    /// Default: `Mozilla/5.0`
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_redirects: DEFAULT_MAX_REDIRECTS,
            max_bytes: DEFAULT_MAX_BYTES,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            allowed_schemes: vec!["http".to_string(), "https".to_string()],
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl FetchConfig {
    /// Create a config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the redirect limit.
    pub fn max_redirects(mut self, count: u8) -> Self {
        self.max_redirects = count;
        self
    }

    /// Set the body size cap.
    pub fn max_bytes(mut self, bytes: usize) -> Self {
        self.max_bytes = bytes;
        self
    }

    /// Set the per-hop timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replace the allowed schemes.
    pub fn allowed_schemes<I, S>(mut self, schemes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.allowed_schemes = schemes
            .into_iter()
            .map(|s| s.as_ref().to_ascii_lowercase())
            .collect();
        self
    }

    /// Set the upstream `User-Agent`.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Whether `scheme` may be requested. Case-insensitive.
    pub fn allows_scheme(&self, scheme: &str) -> bool {
        self.allowed_schemes
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(scheme))
    }
}

/// Wire form of [`FetchConfig`]: the timeout is given in milliseconds.
#[derive(Deserialize)]
#[serde(default)]
struct RawFetchConfig {
    max_redirects: u8,
    max_bytes: usize,
    timeout_ms: u64,
    allowed_schemes: Vec<String>,
    user_agent: String,
}

impl Default for RawFetchConfig {
    fn default() -> Self {
        let config = FetchConfig::default();
        Self {
            max_redirects: config.max_redirects,
            max_bytes: config.max_bytes,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            allowed_schemes: config.allowed_schemes,
            user_agent: config.user_agent,
        }
    }
}

impl From<RawFetchConfig> for FetchConfig {
    fn from(raw: RawFetchConfig) -> Self {
        FetchConfig::default()
            .max_redirects(raw.max_redirects)
            .max_bytes(raw.max_bytes)
            .timeout(Duration::from_millis(raw.timeout_ms))
            .allowed_schemes(raw.allowed_schemes)
            .user_agent(raw.user_agent)
    }
}
