//! Scripted resolver and transport shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use coverproxy::{HopRequest, HopResponse, LookupError, Resolve, Transport, TransportError};

/// Public address handed out for every "good" host.
pub const PUBLIC_IP: Ipv4Addr = Ipv4Addr::new(93, 184, 216, 34);

/// Resolver answering from a table. Each host has a queue of answers so a
/// test can make the same name resolve differently on later lookups.
#[derive(Default)]
pub struct StubResolver {
    answers: Mutex<HashMap<String, VecDeque<IpAddr>>>,
    lookups: Mutex<Vec<String>>,
}

impl StubResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every lookup of `host` returns `ip`.
    pub fn with(self, host: &str, ip: &str) -> Self {
        self.with_sequence(host, &[ip])
    }

    /// Successive lookups of `host` return `ips` in order; the last one repeats.
    pub fn with_sequence(self, host: &str, ips: &[&str]) -> Self {
        let ips = ips.iter().map(|ip| ip.parse().unwrap()).collect();
        self.answers.lock().unwrap().insert(host.to_string(), ips);
        self
    }

    /// Hosts looked up, in order (one entry per A query).
    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().unwrap().clone()
    }

    fn next(&self, host: &str) -> Option<IpAddr> {
        let mut answers = self.answers.lock().unwrap();
        let queue = answers.get_mut(host)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().copied()
        }
    }
}

#[async_trait]
impl Resolve for StubResolver {
    async fn lookup_ipv4(&self, host: &str) -> Result<Vec<Ipv4Addr>, LookupError> {
        self.lookups.lock().unwrap().push(host.to_string());
        match self.next(host) {
            Some(IpAddr::V4(ip)) => Ok(vec![ip]),
            Some(IpAddr::V6(_)) => Ok(vec![]),
            None => Err(LookupError("NXDOMAIN".into())),
        }
    }

    async fn lookup_ipv6(&self, host: &str) -> Result<Vec<Ipv6Addr>, LookupError> {
        let answers = self.answers.lock().unwrap();
        match answers.get(host).and_then(|q| q.front().copied()) {
            Some(IpAddr::V6(ip)) => Ok(vec![ip]),
            Some(IpAddr::V4(_)) => Ok(vec![]),
            None => Err(LookupError("NXDOMAIN".into())),
        }
    }
}

/// One request as the transport saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenRequest {
    pub url: String,
    pub host: String,
    pub pinned: SocketAddr,
    pub timeout: Duration,
}

/// Transport replying from a URL -> response table and recording every call.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<HashMap<String, Result<HopResponse, TransportError>>>,
    seen: Mutex<Vec<SeenRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ok(self, url: &str, content_type: Option<&str>, body: &'static [u8]) -> Self {
        self.reply(
            url,
            Ok(HopResponse {
                status: 200,
                location: None,
                content_type: content_type.map(str::to_string),
                body: Bytes::from_static(body),
            }),
        )
    }

    pub fn redirect(self, url: &str, location: &str) -> Self {
        self.status(url, 302, Some(location))
    }

    pub fn status(self, url: &str, status: u16, location: Option<&str>) -> Self {
        self.reply(
            url,
            Ok(HopResponse {
                status,
                location: location.map(str::to_string),
                content_type: None,
                body: Bytes::new(),
            }),
        )
    }

    pub fn reply(self, url: &str, reply: Result<HopResponse, TransportError>) -> Self {
        self.replies.lock().unwrap().insert(url.to_string(), reply);
        self
    }

    pub fn seen(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, request: HopRequest<'_>) -> Result<HopResponse, TransportError> {
        self.seen.lock().unwrap().push(SeenRequest {
            url: request.url.to_string(),
            host: request.host.to_string(),
            pinned: request.pinned,
            timeout: request.timeout,
        });
        self.replies
            .lock()
            .unwrap()
            .get(request.url.as_str())
            .cloned()
            .unwrap_or_else(|| Err(TransportError::Request("connection refused".into())))
    }
}
