//! Service records held by the registry.

use healthcheck::{HealthStatus, ServiceAddress};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime};

/// Last known status of a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    /// Never probed
    Unknown,
    Online,
    Offline,
}

impl From<HealthStatus> for ServiceStatus {
    fn from(status: HealthStatus) -> Self {
        match status {
            HealthStatus::Online => ServiceStatus::Online,
            HealthStatus::Offline => ServiceStatus::Offline,
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceStatus::Unknown => write!(f, "unknown"),
            ServiceStatus::Online => write!(f, "online"),
            ServiceStatus::Offline => write!(f, "offline"),
        }
    }
}

/// One known tool server.
///
/// Two records with the same address are the same service; equality
/// compares addresses only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub identity: String,
    pub address: ServiceAddress,
    pub status: ServiceStatus,
    #[serde(default, with = "humantime_serde")]
    pub last_checked: Option<SystemTime>,
}

impl ServiceRecord {
    /// Record that has never been probed
    pub fn new(identity: impl Into<String>, address: ServiceAddress) -> Self {
        Self {
            identity: identity.into(),
            address,
            status: ServiceStatus::Unknown,
            last_checked: None,
        }
    }

    /// Record for an address found by the scan loop, online as of `checked_at`
    pub fn discovered(address: ServiceAddress, checked_at: SystemTime) -> Self {
        let mut record = Self::new(Self::discovered_identity(&address), address);
        record.observe(ServiceStatus::Online, checked_at);
        record
    }

    /// Label given to auto-discovered services
    pub fn discovered_identity(address: &ServiceAddress) -> String {
        format!("MCP Server {}", address.port)
    }

    /// Apply a probe verdict taken at `checked_at`.
    ///
    /// Verdicts older than `last_checked` are ignored so the timestamp never
    /// moves backwards. Returns whether the verdict was applied.
    pub fn observe(&mut self, status: ServiceStatus, checked_at: SystemTime) -> bool {
        if self.last_checked.is_some_and(|prev| checked_at < prev) {
            return false;
        }
        self.status = status;
        self.last_checked = Some(checked_at);
        true
    }

    /// Time since the last applied probe, if any
    pub fn age(&self, now: SystemTime) -> Option<Duration> {
        self.last_checked
            .map(|at| now.duration_since(at).unwrap_or_default())
    }

    /// Whether the record has not been probed within `max_age`
    pub fn is_stale(&self, max_age: Duration, now: SystemTime) -> bool {
        self.age(now).is_none_or(|age| age > max_age)
    }
}

impl PartialEq for ServiceRecord {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for ServiceRecord {}
