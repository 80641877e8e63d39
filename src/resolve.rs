//! Hostname resolution with IP pinning.
//!
//! A hostname is resolved exactly once per hop: A records first, AAAA only if
//! that produced nothing. The first address is classified and, if it is
//! public, becomes the only address the hop may connect to.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::TokioResolver;
use thiserror::Error;

use crate::blocklist::blocked_reason;

/// A single record lookup that failed outright (NXDOMAIN, timeout, SERVFAIL...).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct LookupError(pub String);

/// Source of A and AAAA records.
///
/// Implementations must query DNS directly rather than going through the
/// system's `getaddrinfo`, so the answer reflects current DNS state and not
/// hosts-file or NSS quirks.
#[async_trait]
pub trait Resolve: Send + Sync {
    /// A records for `host`, in the order the server returned them.
    async fn lookup_ipv4(&self, host: &str) -> Result<Vec<Ipv4Addr>, LookupError>;

    /// AAAA records for `host`, in the order the server returned them.
    async fn lookup_ipv6(&self, host: &str) -> Result<Vec<Ipv6Addr>, LookupError>;
}

#[async_trait]
impl<R: Resolve + ?Sized> Resolve for Arc<R> {
    async fn lookup_ipv4(&self, host: &str) -> Result<Vec<Ipv4Addr>, LookupError> {
        (**self).lookup_ipv4(host).await
    }

    async fn lookup_ipv6(&self, host: &str) -> Result<Vec<Ipv6Addr>, LookupError> {
        (**self).lookup_ipv6(host).await
    }
}

/// Async resolver backed by hickory-dns with its answer cache turned off.
#[derive(Clone)]
pub struct HickoryResolver {
    resolver: TokioResolver,
}

impl HickoryResolver {
    /// Build from the system's DNS configuration, falling back to hickory's
    /// defaults if that cannot be read.
    pub fn new() -> Self {
        let mut builder = match TokioResolver::builder_tokio() {
            Ok(builder) => builder,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read system DNS config, using defaults");
                TokioResolver::builder_with_config(
                    ResolverConfig::default(),
                    TokioConnectionProvider::default(),
                )
            }
        };
        disable_cache(builder.options_mut());

        Self {
            resolver: builder.build(),
        }
    }
}

impl Default for HickoryResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HickoryResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HickoryResolver").finish_non_exhaustive()
    }
}

fn disable_cache(opts: &mut ResolverOpts) {
    opts.cache_size = 0;
}

#[async_trait]
impl Resolve for HickoryResolver {
    async fn lookup_ipv4(&self, host: &str) -> Result<Vec<Ipv4Addr>, LookupError> {
        let lookup = self
            .resolver
            .ipv4_lookup(host)
            .await
            .map_err(|e| LookupError(e.to_string()))?;
        Ok(lookup.iter().map(|a| a.0).collect())
    }

    async fn lookup_ipv6(&self, host: &str) -> Result<Vec<Ipv6Addr>, LookupError> {
        let lookup = self
            .resolver
            .ipv6_lookup(host)
            .await
            .map_err(|e| LookupError(e.to_string()))?;
        Ok(lookup.iter().map(|aaaa| aaaa.0).collect())
    }
}

/// Address family of a pinned address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    V4,
    V6,
}

impl Family {
    /// 4 or 6.
    pub fn number(self) -> u8 {
        match self {
            Family::V4 => 4,
            Family::V6 => 6,
        }
    }

    fn of(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => Family::V4,
            IpAddr::V6(_) => Family::V6,
        }
    }
}

/// Outcome of one record-family lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// First address of the answer.
    Found(IpAddr),
    /// The query succeeded but returned no records.
    Empty,
    /// The query itself failed.
    Failed(String),
}

impl Lookup {
    fn from_result<T: Into<IpAddr>>(result: Result<Vec<T>, LookupError>) -> Self {
        match result {
            Ok(addrs) => match addrs.into_iter().next() {
                Some(addr) => Lookup::Found(addr.into()),
                None => Lookup::Empty,
            },
            Err(e) => Lookup::Failed(e.0),
        }
    }
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lookup::Found(ip) => write!(f, "found {ip}"),
            Lookup::Empty => f.write_str("no records"),
            Lookup::Failed(reason) => f.write_str(reason),
        }
    }
}

/// Why resolution produced no address: both the A and the AAAA attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsFailure {
    pub ipv4: Lookup,
    pub ipv6: Lookup,
}

impl fmt::Display for DnsFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "A: {}; AAAA: {}", self.ipv4, self.ipv6)
    }
}

/// The single address a hop is pinned to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Hostname as it appeared in the URL (sent as Host / SNI).
    pub hostname: String,
    /// Classifier-approved address to connect to.
    pub address: IpAddr,
    pub family: Family,
}

/// Resolver failures, before they are tied to a hop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("DNS resolution failed for {host} ({failure})")]
    DnsResolutionFailed { host: String, failure: DnsFailure },

    #[error("{host} resolved to non-public address {ip} ({reason})")]
    PrivateAddressDenied {
        host: String,
        ip: IpAddr,
        reason: &'static str,
    },
}

/// Resolve `hostname` to one address and reject it unless it is public.
///
/// IP literals (bare or bracketed IPv6) are classified directly without DNS.
pub async fn resolve_and_validate<R>(resolver: &R, hostname: &str) -> Result<Resolution, ResolveError>
where
    R: Resolve + ?Sized,
{
    let host = hostname.trim_start_matches('[').trim_end_matches(']');

    let address = match host.parse::<IpAddr>() {
        Ok(ip) => ip,
        Err(_) => lookup_first(resolver, host).await?,
    };

    if let Some(reason) = blocked_reason(address) {
        tracing::warn!(host = %host, ip = %address, reason, "resolved address denied");
        return Err(ResolveError::PrivateAddressDenied {
            host: host.to_string(),
            ip: address,
            reason,
        });
    }

    tracing::debug!(host = %host, ip = %address, "pinned address");
    Ok(Resolution {
        hostname: host.to_string(),
        address,
        family: Family::of(address),
    })
}

async fn lookup_first<R>(resolver: &R, host: &str) -> Result<IpAddr, ResolveError>
where
    R: Resolve + ?Sized,
{
    let ipv4 = Lookup::from_result(resolver.lookup_ipv4(host).await);
    if let Lookup::Found(ip) = ipv4 {
        return Ok(ip);
    }

    tracing::debug!(host = %host, a = %ipv4, "no A record, trying AAAA");
    let ipv6 = Lookup::from_result(resolver.lookup_ipv6(host).await);
    if let Lookup::Found(ip) = ipv6 {
        return Ok(ip);
    }

    Err(ResolveError::DnsResolutionFailed {
        host: host.to_string(),
        failure: DnsFailure { ipv4, ipv6 },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct MockResolver {
        ipv4: Option<Vec<Ipv4Addr>>,
        ipv6: Option<Vec<Ipv6Addr>>,
        ipv6_calls: AtomicUsize,
    }

    #[async_trait]
    impl Resolve for MockResolver {
        async fn lookup_ipv4(&self, _host: &str) -> Result<Vec<Ipv4Addr>, LookupError> {
            self.ipv4
                .clone()
                .ok_or_else(|| LookupError("NXDOMAIN".into()))
        }

        async fn lookup_ipv6(&self, _host: &str) -> Result<Vec<Ipv6Addr>, LookupError> {
            self.ipv6_calls.fetch_add(1, Ordering::SeqCst);
            self.ipv6
                .clone()
                .ok_or_else(|| LookupError("NXDOMAIN".into()))
        }
    }

    #[tokio::test]
    async fn test_prefers_first_a_record() {
        let resolver = MockResolver {
            ipv4: Some(vec![
                Ipv4Addr::new(93, 184, 216, 34),
                Ipv4Addr::new(10, 0, 0, 1),
            ]),
            ipv6: Some(vec!["2606:4700::1".parse().unwrap()]),
            ..Default::default()
        };

        let resolution = resolve_and_validate(&resolver, "cover.example").await.unwrap();
        assert_eq!(resolution.hostname, "cover.example");
        assert_eq!(resolution.address, IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34)));
        assert_eq!(resolution.family, Family::V4);
        assert_eq!(resolver.ipv6_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_falls_back_to_aaaa_when_a_fails() {
        let resolver = MockResolver {
            ipv4: None,
            ipv6: Some(vec!["2606:4700::1".parse().unwrap()]),
            ..Default::default()
        };

        let resolution = resolve_and_validate(&resolver, "v6only.example").await.unwrap();
        assert_eq!(resolution.family, Family::V6);
        assert_eq!(resolution.family.number(), 6);
    }

    #[tokio::test]
    async fn test_falls_back_to_aaaa_when_a_is_empty() {
        let resolver = MockResolver {
            ipv4: Some(vec![]),
            ipv6: Some(vec!["2606:4700::1".parse().unwrap()]),
            ..Default::default()
        };

        let resolution = resolve_and_validate(&resolver, "v6only.example").await.unwrap();
        assert_eq!(resolution.address, "2606:4700::1".parse::<IpAddr>().unwrap());
    }

    #[tokio::test]
    async fn test_both_lookups_fail() {
        let resolver = MockResolver {
            ipv4: None,
            ipv6: Some(vec![]),
            ..Default::default()
        };

        let err = resolve_and_validate(&resolver, "missing.example")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ResolveError::DnsResolutionFailed {
                host: "missing.example".into(),
                failure: DnsFailure {
                    ipv4: Lookup::Failed("NXDOMAIN".into()),
                    ipv6: Lookup::Empty,
                },
            }
        );
        assert!(err.to_string().contains("A: NXDOMAIN; AAAA: no records"));
    }

    #[tokio::test]
    async fn test_private_answer_denied() {
        let resolver = MockResolver {
            ipv4: Some(vec![Ipv4Addr::new(169, 254, 169, 254)]),
            ..Default::default()
        };

        let err = resolve_and_validate(&resolver, "metadata.example")
            .await
            .unwrap_err();
        match err {
            ResolveError::PrivateAddressDenied { host, ip, .. } => {
                assert_eq!(host, "metadata.example");
                assert_eq!(ip, IpAddr::V4(Ipv4Addr::new(169, 254, 169, 254)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_private_aaaa_fallback_denied() {
        let resolver = MockResolver {
            ipv4: Some(vec![]),
            ipv6: Some(vec!["fd00::1".parse().unwrap()]),
            ..Default::default()
        };

        let err = resolve_and_validate(&resolver, "ula.example").await.unwrap_err();
        assert!(matches!(err, ResolveError::PrivateAddressDenied { .. }));
    }

    #[tokio::test]
    async fn test_ip_literal_skips_dns() {
        let resolver = MockResolver::default();

        let resolution = resolve_and_validate(&resolver, "8.8.8.8").await.unwrap();
        assert_eq!(resolution.address, IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)));

        let err = resolve_and_validate(&resolver, "[::1]").await.unwrap_err();
        assert!(matches!(err, ResolveError::PrivateAddressDenied { .. }));
        assert_eq!(resolver.ipv6_calls.load(Ordering::SeqCst), 0);
    }
}
