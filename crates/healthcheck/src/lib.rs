//! Health probing and port sweeping for local tool servers.
//!
//! This crate answers one question for the discovery layer: which local
//! endpoints speak the tool-server health convention
//! (`GET {scheme}://{host}:{port}/health` returning any 2xx).
//!
//! - [`HttpChecker`] performs a single bounded probe and always returns a
//!   verdict, never an error
//! - [`TcpConnectProbe`] is the cheap liveness pre-filter
//! - [`PortScanner`] sweeps a port range, running the pre-filter and then
//!   the health probe on each candidate
//!
//! # Example
//!
//! ```no_run
//! use healthcheck::{HttpChecker, PortRange, PortScanner, ScanConfig, TcpConnectProbe};
//! use futures::StreamExt;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let scanner = PortScanner::new(
//!     Arc::new(HttpChecker::new()?),
//!     Arc::new(TcpConnectProbe::new()),
//!     ScanConfig::default(),
//! );
//!
//! let hosts = vec!["localhost".to_string()];
//! let cancel = CancellationToken::new();
//! let mut hits = Box::pin(scanner.scan(&hosts, PortRange::new(8000, 8100)?, &cancel));
//! while let Some(hit) = hits.next().await {
//!     println!("found {}", hit.address);
//! }
//! # Ok(())
//! # }
//! ```

pub mod checkers;
pub mod scanner;
pub mod types;

pub use checkers::{ConnectProbe, HealthChecker, HttpChecker, TcpConnectProbe};
pub use scanner::{PortScanner, ScanConfig, ScanHit};
pub use types::{
    AddressError, HEALTH_PATH, HealthStatus, PortRange, PortRangeError, ProbeResult, Scheme,
    ServiceAddress,
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_reexports() {
        let result = ProbeResult::online(Duration::from_millis(5), 200);
        assert!(result.is_online());
        assert_eq!(result.status, HealthStatus::Online);
        assert_eq!(HEALTH_PATH, "/health");
    }

    #[test]
    fn test_scan_config_defaults_fit_budget() {
        let config = ScanConfig::default();
        assert!(config.connect_timeout <= Duration::from_millis(200));
        assert!(config.connect_timeout < config.probe_timeout);
        assert!((16..=64).contains(&config.concurrency));
    }
}
