use crate::error::{FetchError, Result};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyScheme {
    Http,
    Https,
    Socks5,
}

impl ProxyScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyScheme::Http => "http",
            ProxyScheme::Https => "https",
            ProxyScheme::Socks5 => "socks5",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "http" => Some(ProxyScheme::Http),
            "https" => Some(ProxyScheme::Https),
            "socks5" | "socks5h" => Some(ProxyScheme::Socks5),
            _ => None,
        }
    }
}

/// A single outbound proxy, rendered as `scheme://host:port`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProxyEndpoint {
    pub scheme: ProxyScheme,
    pub host: String,
    pub port: u16,
}

impl ProxyEndpoint {
    pub fn new(scheme: ProxyScheme, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme,
            host: host.into(),
            port,
        }
    }

    /// Parse `host:port` (assumed http) or `scheme://host:port`.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        let with_scheme = if line.contains("://") {
            line.to_string()
        } else {
            format!("http://{}", line)
        };

        let parsed = Url::parse(&with_scheme)
            .map_err(|e| FetchError::InvalidUrl(format!("Invalid proxy '{}': {}", line, e)))?;
        let scheme = ProxyScheme::parse(parsed.scheme()).ok_or_else(|| {
            FetchError::InvalidUrl(format!("Unsupported proxy scheme '{}'", parsed.scheme()))
        })?;
        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| FetchError::InvalidUrl(format!("Proxy '{}' has no host", line)))?;
        let port = parsed
            .port_or_known_default()
            .ok_or_else(|| FetchError::InvalidUrl(format!("Proxy '{}' has no port", line)))?;

        Ok(Self::new(scheme, host, port))
    }
}

impl FromStr for ProxyEndpoint {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ProxyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme.as_str(), self.host, self.port)
    }
}

/// What to do when no proxy is available for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProxyFallback {
    /// Go out directly from the local address. The source API may block it.
    #[default]
    LocalAddress,
    /// Fail the request instead of using the local address.
    Refuse,
}

pub trait ProxyProvider: Send + Sync {
    fn active_proxy(&self) -> Option<ProxyEndpoint>;

    /// Called when a request through `proxy` failed.
    fn report_failure(&self, _proxy: &ProxyEndpoint) {}

    fn fallback(&self) -> ProxyFallback {
        ProxyFallback::LocalAddress
    }
}

/// Always goes out directly.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProxy;

impl ProxyProvider for NoProxy {
    fn active_proxy(&self) -> Option<ProxyEndpoint> {
        None
    }
}

#[derive(Debug)]
struct PoolEntry {
    endpoint: ProxyEndpoint,
    active: bool,
}

/// Round-robin over the proxies that have not been reported as failing.
#[derive(Debug)]
pub struct ProxyPool {
    entries: Mutex<Vec<PoolEntry>>,
    next: AtomicUsize,
    fallback: ProxyFallback,
}

impl ProxyPool {
    pub fn new(endpoints: Vec<ProxyEndpoint>) -> Self {
        Self {
            entries: Mutex::new(
                endpoints
                    .into_iter()
                    .map(|endpoint| PoolEntry {
                        endpoint,
                        active: true,
                    })
                    .collect(),
            ),
            next: AtomicUsize::new(0),
            fallback: ProxyFallback::LocalAddress,
        }
    }

    pub fn with_fallback(mut self, fallback: ProxyFallback) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn active_count(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.active)
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ProxyProvider for ProxyPool {
    fn active_proxy(&self) -> Option<ProxyEndpoint> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let active: Vec<&ProxyEndpoint> = entries
            .iter()
            .filter(|e| e.active)
            .map(|e| &e.endpoint)
            .collect();

        if active.is_empty() {
            match self.fallback {
                ProxyFallback::LocalAddress => {
                    warn!("No usable proxy left, requesting from the local address");
                }
                ProxyFallback::Refuse => debug!("No usable proxy left"),
            }
            return None;
        }

        let idx = self.next.fetch_add(1, Ordering::Relaxed) % active.len();
        let chosen = active[idx].clone();
        info!("Using proxy {}", chosen);
        Some(chosen)
    }

    fn report_failure(&self, proxy: &ProxyEndpoint) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        for entry in entries.iter_mut().filter(|e| &e.endpoint == proxy) {
            if entry.active {
                warn!("Deactivating proxy {}", proxy);
                entry.active = false;
            }
        }
    }

    fn fallback(&self) -> ProxyFallback {
        self.fallback
    }
}
