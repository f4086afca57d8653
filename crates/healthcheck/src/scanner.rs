//! Port sweeping over local hosts.

use crate::checkers::{ConnectProbe, HealthChecker};
use crate::types::{PortRange, ProbeResult, Scheme, ServiceAddress};
use futures::{FutureExt, Stream, StreamExt, future, stream};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Scanner configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ScanConfig {
    /// Scheme used to build candidate addresses
    pub scheme: Scheme,

    /// Budget for the TCP pre-filter
    pub connect_timeout: Duration,

    /// Budget for the HTTP health probe
    pub probe_timeout: Duration,

    /// Maximum candidates probed at once
    pub concurrency: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            scheme: Scheme::Http,
            connect_timeout: Duration::from_millis(200),
            probe_timeout: Duration::from_secs(1),
            concurrency: 32,
        }
    }
}

/// A candidate that passed both the connect pre-filter and the health probe
#[derive(Debug, Clone)]
pub struct ScanHit {
    pub address: ServiceAddress,
    pub result: ProbeResult,
}

/// Sweeps port ranges looking for services that answer the health path
pub struct PortScanner {
    checker: Arc<dyn HealthChecker>,
    prefilter: Arc<dyn ConnectProbe>,
    config: ScanConfig,
}

impl PortScanner {
    /// Create a new scanner
    pub fn new(
        checker: Arc<dyn HealthChecker>,
        prefilter: Arc<dyn ConnectProbe>,
        config: ScanConfig,
    ) -> Self {
        Self {
            checker,
            prefilter,
            config,
        }
    }

    /// Scanner configuration
    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Lazily sweep every `(host, port)` pair.
    ///
    /// Candidates are visited host by host, ports ascending, and hits are
    /// yielded in that order. `cancel` is checked before each candidate is
    /// started; probes already in flight run to completion. Each call starts
    /// a fresh sweep.
    pub fn scan<'a>(
        &'a self,
        hosts: &'a [String],
        ports: PortRange,
        cancel: &'a CancellationToken,
    ) -> impl Stream<Item = ScanHit> + 'a {
        let scheme = self.config.scheme;
        let candidates = hosts.iter().flat_map(move |host| {
            ports
                .iter()
                .map(move |port| ServiceAddress::new(scheme, host.clone(), port))
        });

        stream::iter(candidates)
            .take_while(move |_| future::ready(!cancel.is_cancelled()))
            .map(move |address| self.probe_candidate(address))
            .buffered(self.config.concurrency.max(1))
            .filter_map(future::ready)
    }

    /// Probe one candidate, containing any panic to this port
    async fn probe_candidate(&self, address: ServiceAddress) -> Option<ScanHit> {
        match AssertUnwindSafe(self.check_port(address.clone()))
            .catch_unwind()
            .await
        {
            Ok(hit) => hit,
            Err(_) => {
                warn!(target = %address, "Probe panicked; skipping port");
                None
            }
        }
    }

    async fn check_port(&self, address: ServiceAddress) -> Option<ScanHit> {
        if !self
            .prefilter
            .is_open(address.clone(), self.config.connect_timeout)
            .await
        {
            return None;
        }

        let result = self
            .checker
            .probe(address.clone(), self.config.probe_timeout)
            .await;

        if result.is_online() {
            debug!(target = %address, duration_ms = result.duration.as_millis(), "Found service");
            Some(ScanHit { address, result })
        } else {
            debug!(
                target = %address,
                reason = result.reason.as_deref().unwrap_or("unknown"),
                "Open port failed health probe"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkers::{MockConnectProbe, MockHealthChecker};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn hosts() -> Vec<String> {
        vec!["localhost".to_string()]
    }

    /// Only 8001 accepts connections
    fn open_on_8001() -> MockConnectProbe {
        let mut prefilter = MockConnectProbe::new();
        prefilter
            .expect_is_open()
            .returning(|addr, _| addr.port == 8001);
        prefilter
    }

    /// Stub answering 200 on 8001 with 8000 and 8002 refusing connections
    fn stub_8001() -> (MockHealthChecker, MockConnectProbe) {
        let prefilter = open_on_8001();

        let mut checker = MockHealthChecker::new();
        checker
            .expect_probe()
            .withf(|addr, _| addr.port == 8001)
            .times(1)
            .returning(|_, _| ProbeResult::online(Duration::from_millis(1), 200));

        (checker, prefilter)
    }

    #[tokio::test]
    async fn test_scan_yields_only_healthy_ports() {
        let (checker, prefilter) = stub_8001();
        let scanner = PortScanner::new(Arc::new(checker), Arc::new(prefilter), ScanConfig::default());
        let cancel = CancellationToken::new();
        let hosts = hosts();

        let hits: Vec<ScanHit> = scanner
            .scan(&hosts, PortRange::new(8000, 8003).unwrap(), &cancel)
            .collect()
            .await;

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].address, ServiceAddress::http("localhost", 8001));
        assert!(hits[0].result.is_online());
    }

    #[tokio::test]
    async fn test_open_port_failing_probe_is_skipped() {
        let mut prefilter = MockConnectProbe::new();
        prefilter.expect_is_open().returning(|_, _| true);

        let mut checker = MockHealthChecker::new();
        checker
            .expect_probe()
            .returning(|addr, _| {
                if addr.port % 2 == 0 {
                    ProbeResult::online(Duration::from_millis(1), 200)
                } else {
                    ProbeResult::offline(Duration::from_millis(1), "Unexpected status code: 404")
                }
            });

        let scanner = PortScanner::new(Arc::new(checker), Arc::new(prefilter), ScanConfig::default());
        let cancel = CancellationToken::new();
        let hosts = hosts();

        let ports: Vec<u16> = scanner
            .scan(&hosts, PortRange::new(9000, 9006).unwrap(), &cancel)
            .map(|hit| hit.address.port)
            .collect()
            .await;

        assert_eq!(ports, vec![9000, 9002, 9004]);
    }

    #[tokio::test]
    async fn test_scan_order_is_deterministic() {
        let mut prefilter = MockConnectProbe::new();
        prefilter.expect_is_open().returning(|_, _| true);
        let mut checker = MockHealthChecker::new();
        checker
            .expect_probe()
            .returning(|_, _| ProbeResult::online(Duration::from_millis(1), 200));

        let config = ScanConfig {
            concurrency: 8,
            ..ScanConfig::default()
        };
        let scanner = PortScanner::new(Arc::new(checker), Arc::new(prefilter), config);
        let cancel = CancellationToken::new();
        let hosts = vec!["a.local".to_string(), "b.local".to_string()];

        let seen: Vec<String> = scanner
            .scan(&hosts, PortRange::new(100, 103).unwrap(), &cancel)
            .map(|hit| hit.address.to_string())
            .collect()
            .await;

        assert_eq!(
            seen,
            vec![
                "http://a.local:100",
                "http://a.local:101",
                "http://a.local:102",
                "http://b.local:100",
                "http://b.local:101",
                "http://b.local:102",
            ]
        );
    }

    #[tokio::test]
    async fn test_scan_is_restartable() {
        let prefilter = open_on_8001();
        let mut checker = MockHealthChecker::new();
        checker
            .expect_probe()
            .times(2)
            .returning(|_, _| ProbeResult::online(Duration::from_millis(1), 200));

        let scanner = PortScanner::new(Arc::new(checker), Arc::new(prefilter), ScanConfig::default());
        let cancel = CancellationToken::new();
        let hosts = hosts();
        let range = PortRange::new(8000, 8003).unwrap();

        let first = scanner.scan(&hosts, range, &cancel).count().await;
        let second = scanner.scan(&hosts, range, &cancel).count().await;
        assert_eq!((first, second), (1, 1));
    }

    #[tokio::test]
    async fn test_cancelled_scan_starts_no_probes() {
        let mut prefilter = MockConnectProbe::new();
        prefilter.expect_is_open().times(0);
        let checker = MockHealthChecker::new();

        let scanner = PortScanner::new(Arc::new(checker), Arc::new(prefilter), ScanConfig::default());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let hosts = hosts();

        let hits = scanner
            .scan(&hosts, PortRange::new(1, 65536).unwrap(), &cancel)
            .count()
            .await;
        assert_eq!(hits, 0);
    }

    #[tokio::test]
    async fn test_cancel_mid_sweep_stops_within_one_port() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();

        let mut prefilter = MockConnectProbe::new();
        let counter = attempts.clone();
        let trigger = cancel.clone();
        prefilter.expect_is_open().returning(move |addr, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            if addr.port == 5003 {
                trigger.cancel();
            }
            false
        });

        let config = ScanConfig {
            concurrency: 1,
            ..ScanConfig::default()
        };
        let scanner = PortScanner::new(Arc::new(MockHealthChecker::new()), Arc::new(prefilter), config);
        let hosts = hosts();

        let hits = scanner
            .scan(&hosts, PortRange::new(5000, 6000).unwrap(), &cancel)
            .count()
            .await;

        assert_eq!(hits, 0);
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    struct PanickingChecker;

    #[async_trait::async_trait]
    impl HealthChecker for PanickingChecker {
        async fn probe(&self, address: ServiceAddress, _timeout: Duration) -> ProbeResult {
            if address.port == 7001 {
                panic!("unexpected OS error");
            }
            ProbeResult::online(Duration::from_millis(1), 200)
        }

        fn name(&self) -> &'static str {
            "panicking"
        }
    }

    #[tokio::test]
    async fn test_probe_panic_is_contained_to_its_port() {
        let mut prefilter = MockConnectProbe::new();
        prefilter.expect_is_open().returning(|_, _| true);

        let scanner = PortScanner::new(Arc::new(PanickingChecker), Arc::new(prefilter), ScanConfig::default());
        let cancel = CancellationToken::new();
        let hosts = hosts();

        let ports: Vec<u16> = scanner
            .scan(&hosts, PortRange::new(7000, 7003).unwrap(), &cancel)
            .map(|hit| hit.address.port)
            .collect()
            .await;

        assert_eq!(ports, vec![7000, 7002]);
    }
}
