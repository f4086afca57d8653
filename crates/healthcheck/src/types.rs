//! Health check types and structures.

use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime};
use thiserror::Error;

/// Well-known path probed on every service.
pub const HEALTH_PATH: &str = "/health";

/// URL scheme of a service endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    /// Scheme as it appears in a URL
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reasons a service address is rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("address is empty")]
    Empty,

    #[error("malformed address {input:?}: {reason}")]
    Malformed { input: String, reason: String },

    #[error("unsupported scheme {0:?} (expected http or https)")]
    UnsupportedScheme(String),

    #[error("port {0} is outside 1-65535")]
    PortOutOfRange(u32),

    #[error("address must not carry a path, query or fragment: {0:?}")]
    UnexpectedPath(String),

    #[error("address must not carry credentials: {0:?}")]
    UnexpectedCredentials(String),
}

/// Endpoint of a service, canonically `scheme://host:port`.
///
/// Ordering is by scheme, then host, then port, which is the order
/// registry snapshots are returned in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServiceAddress {
    pub scheme: Scheme,
    /// Host as written in a URL (IPv6 literals keep their brackets)
    pub host: String,
    pub port: u16,
}

impl ServiceAddress {
    /// Build an address from trusted parts.
    pub fn new(scheme: Scheme, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme,
            host: host.into(),
            port,
        }
    }

    /// Plain HTTP address on the given host and port
    pub fn http(host: impl Into<String>, port: u16) -> Self {
        Self::new(Scheme::Http, host, port)
    }

    /// Host suitable for a socket connect (brackets stripped)
    pub fn connect_host(&self) -> &str {
        self.host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(&self.host)
    }

    /// URL of the health endpoint
    pub fn health_url(&self) -> String {
        format!("{}{}", self, HEALTH_PATH)
    }

    /// Normalize a bare host the way parsed addresses carry it: names
    /// lowercased, IPv6 literals bracketed.
    pub fn canonical_host(scheme: Scheme, host: &str) -> Result<String, AddressError> {
        let host = host.trim();
        if host.is_empty() {
            return Err(AddressError::Empty);
        }
        let host = if host.contains(':') && !host.starts_with('[') {
            format!("[{}]", host)
        } else {
            host.to_string()
        };
        let parsed: ServiceAddress = format!("{}://{}:1", scheme, host).parse()?;
        Ok(parsed.host)
    }
}

impl fmt::Display for ServiceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

impl FromStr for ServiceAddress {
    type Err = AddressError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(AddressError::Empty);
        }

        let candidate = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("http://{}", trimmed)
        };

        let scheme = match candidate.split_once("://") {
            Some((s, _)) if s.eq_ignore_ascii_case("http") => Scheme::Http,
            Some((s, _)) if s.eq_ignore_ascii_case("https") => Scheme::Https,
            Some((s, _)) => return Err(AddressError::UnsupportedScheme(s.to_string())),
            None => return Err(malformed(trimmed, "missing scheme")),
        };

        // Url rejects ports above 65535 with a generic message; catch them
        // first so the caller gets a precise error.
        if let Some(port) = explicit_port(&candidate) {
            if port == 0 || port > u32::from(u16::MAX) {
                return Err(AddressError::PortOutOfRange(port));
            }
        }

        let url = Url::parse(&candidate).map_err(|e| malformed(trimmed, e))?;
        if !url.username().is_empty() || url.password().is_some() {
            return Err(AddressError::UnexpectedCredentials(trimmed.to_string()));
        }

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| AddressError::Malformed {
                input: trimmed.to_string(),
                reason: "missing host".to_string(),
            })?
            .to_string();

        let port = url.port_or_known_default().ok_or_else(|| AddressError::Malformed {
            input: trimmed.to_string(),
            reason: "missing port".to_string(),
        })?;
        if port == 0 {
            return Err(AddressError::PortOutOfRange(0));
        }
        if !matches!(url.path(), "" | "/") || url.query().is_some() || url.fragment().is_some() {
            return Err(AddressError::UnexpectedPath(trimmed.to_string()));
        }

        Ok(Self { scheme, host, port })
    }
}

impl TryFrom<String> for ServiceAddress {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ServiceAddress> for String {
    fn from(address: ServiceAddress) -> Self {
        address.to_string()
    }
}

fn malformed(input: &str, err: impl fmt::Display) -> AddressError {
    AddressError::Malformed {
        input: input.to_string(),
        reason: err.to_string(),
    }
}

/// Digits following the last ':' of the authority, if any.
fn explicit_port(url: &str) -> Option<u32> {
    let rest = url.split_once("://")?.1;
    let authority = rest.split(['/', '?', '#']).next()?;
    let (_, port) = authority.rsplit_once(':')?;
    port.parse().ok()
}

/// Verdict of a single probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Service answered the health path with a 2xx
    Online,
    /// Anything else: refused, timed out, non-2xx, unresolvable
    Offline,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Online => write!(f, "ONLINE"),
            HealthStatus::Offline => write!(f, "OFFLINE"),
        }
    }
}

/// Result of a single probe
#[derive(Debug, Clone)]
pub struct ProbeResult {
    /// Verdict
    pub status: HealthStatus,

    /// How long the probe took
    pub duration: Duration,

    /// When the probe completed
    pub checked_at: SystemTime,

    /// Why the probe failed (diagnostic only)
    pub reason: Option<String>,

    /// HTTP status code, when a response arrived
    pub response_code: Option<u16>,
}

impl ProbeResult {
    /// Create an online result
    pub fn online(duration: Duration, response_code: u16) -> Self {
        Self {
            status: HealthStatus::Online,
            duration,
            checked_at: SystemTime::now(),
            reason: None,
            response_code: Some(response_code),
        }
    }

    /// Create an offline result
    pub fn offline(duration: Duration, reason: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Offline,
            duration,
            checked_at: SystemTime::now(),
            reason: Some(reason.into()),
            response_code: None,
        }
    }

    /// Create an offline result for a probe that exceeded its budget
    pub fn timeout(duration: Duration) -> Self {
        Self::offline(duration, "Health check timed out")
    }

    /// Check if the result is online
    pub fn is_online(&self) -> bool {
        self.status == HealthStatus::Online
    }
}

/// Reasons a port range is rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortRangeError {
    #[error("port range start must be at least 1")]
    ZeroStart,

    #[error("port range {start}-{end} is empty")]
    Empty { start: u16, end: u32 },

    #[error("port range end {0} exceeds 65536")]
    EndTooLarge(u32),

    #[error("malformed port range {0:?} (expected START-END)")]
    Malformed(String),
}

/// Half-open range of ports `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPortRange", into = "RawPortRange")]
pub struct PortRange {
    start: u16,
    end: u32,
}

#[derive(Serialize, Deserialize)]
struct RawPortRange {
    start: u16,
    end: u32,
}

impl PortRange {
    /// Create a range covering `start..end`
    pub fn new(start: u16, end: u32) -> Result<Self, PortRangeError> {
        if start == 0 {
            return Err(PortRangeError::ZeroStart);
        }
        if end > u32::from(u16::MAX) + 1 {
            return Err(PortRangeError::EndTooLarge(end));
        }
        if u32::from(start) >= end {
            return Err(PortRangeError::Empty { start, end });
        }
        Ok(Self { start, end })
    }

    /// First port in the range
    pub fn start(&self) -> u16 {
        self.start
    }

    /// One past the last port in the range
    pub fn end(&self) -> u32 {
        self.end
    }

    /// Number of ports in the range
    pub fn len(&self) -> usize {
        (self.end - u32::from(self.start)) as usize
    }

    /// Always false; empty ranges cannot be constructed
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Whether `port` falls inside the range
    pub fn contains(&self, port: u16) -> bool {
        port >= self.start && u32::from(port) < self.end
    }

    /// Ports in ascending order
    pub fn iter(&self) -> impl Iterator<Item = u16> + use<> {
        // end <= 65536, so every value fits in u16
        (u32::from(self.start)..self.end).map(|port| port as u16)
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

impl FromStr for PortRange {
    type Err = PortRangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || PortRangeError::Malformed(s.to_string());
        let (start, end) = s.trim().split_once('-').ok_or_else(malformed)?;
        let start = start.trim().parse::<u16>().map_err(|_| malformed())?;
        let end = end.trim().parse::<u32>().map_err(|_| malformed())?;
        Self::new(start, end)
    }
}

impl TryFrom<RawPortRange> for PortRange {
    type Error = PortRangeError;

    fn try_from(raw: RawPortRange) -> Result<Self, Self::Error> {
        Self::new(raw.start, raw.end)
    }
}

impl From<PortRange> for RawPortRange {
    fn from(range: PortRange) -> Self {
        Self {
            start: range.start,
            end: range.end,
        }
    }
}
