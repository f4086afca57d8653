//! Health check implementations.

use crate::types::{ProbeResult, ServiceAddress};
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Health checker trait
///
/// Implementations never fail: every transport problem is folded into an
/// offline [`ProbeResult`] carrying a diagnostic reason.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HealthChecker: Send + Sync {
    /// Probe `address` once, giving up after `timeout`
    async fn probe(&self, address: ServiceAddress, timeout: Duration) -> ProbeResult;

    /// Get the name of this checker
    fn name(&self) -> &'static str;
}

/// Cheap liveness test run before a full health probe
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConnectProbe: Send + Sync {
    /// Whether a TCP connection to `address` succeeds within `timeout`
    async fn is_open(&self, address: ServiceAddress, timeout: Duration) -> bool;
}

/// TCP connect pre-filter
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnectProbe;

impl TcpConnectProbe {
    /// Create a new TCP connect probe
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ConnectProbe for TcpConnectProbe {
    async fn is_open(&self, address: ServiceAddress, timeout_duration: Duration) -> bool {
        let target = (address.connect_host(), address.port);

        match timeout(timeout_duration, TcpStream::connect(target)).await {
            Ok(Ok(stream)) => {
                // Only liveness matters here; close right away.
                drop(stream);
                true
            }
            Ok(Err(e)) => {
                debug!(target = %address, error = %e, "TCP connect failed");
                false
            }
            Err(_) => {
                debug!(target = %address, "TCP connect timed out");
                false
            }
        }
    }
}

/// HTTP health checker
///
/// Issues `GET {address}/health`; any 2xx is online.
#[derive(Debug, Clone)]
pub struct HttpChecker {
    client: reqwest::Client,
}

impl HttpChecker {
    /// Create a new HTTP health checker
    pub fn new() -> common::Result<Self> {
        let client = reqwest::Client::builder()
            // Local tool servers must never be reached through a proxy.
            .no_proxy()
            // A redirect is judged as-is, not by wherever it points.
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(common::Error::healthcheck)?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HealthChecker for HttpChecker {
    async fn probe(&self, address: ServiceAddress, timeout_duration: Duration) -> ProbeResult {
        let start = Instant::now();
        let url = address.health_url();

        let request = self.client.get(&url).timeout(timeout_duration).send();

        match timeout(timeout_duration, request).await {
            Ok(Ok(response)) => {
                let duration = start.elapsed();
                let status = response.status();

                if status.is_success() {
                    debug!(url = %url, status = status.as_u16(), duration_ms = duration.as_millis(),
                           "HTTP probe successful");
                    ProbeResult::online(duration, status.as_u16())
                } else {
                    debug!(url = %url, status = status.as_u16(), "HTTP probe failed: non-2xx status");
                    let mut result =
                        ProbeResult::offline(duration, format!("Unexpected status code: {}", status.as_u16()));
                    result.response_code = Some(status.as_u16());
                    result
                }
            }
            Ok(Err(e)) if e.is_timeout() => {
                let duration = start.elapsed();
                debug!(url = %url, "HTTP probe timed out");
                ProbeResult::timeout(duration)
            }
            Ok(Err(e)) => {
                let duration = start.elapsed();
                debug!(url = %url, error = %e, "HTTP probe failed");
                ProbeResult::offline(duration, format!("HTTP request failed: {}", e))
            }
            Err(_) => {
                let duration = start.elapsed();
                debug!(url = %url, "HTTP probe timed out");
                ProbeResult::timeout(duration)
            }
        }
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
