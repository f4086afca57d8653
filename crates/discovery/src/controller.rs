//! Discovery lifecycle: background sweeping, manual registration and
//! registry access.

use crate::error::{DiscoveryError, Result};
use crate::events::{DiscoveryEvent, DiscoveryState, publish};
use crate::record::{ServiceRecord, ServiceStatus};
use crate::registry::{Registry, Upsert};
use futures::{Stream, StreamExt, stream};
use healthcheck::{
    ConnectProbe, HealthChecker, HttpChecker, PortRange, PortScanner, ScanConfig, ScanHit,
    ServiceAddress, TcpConnectProbe,
};
use std::future::Future;
use std::pin::pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Controller configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    /// Hosts swept by the scan loop
    pub hosts: Vec<String>,

    /// Scanner settings (timeouts, concurrency, scheme)
    pub scan: ScanConfig,

    /// Pause between the end of one sweep and the start of the next
    pub sweep_interval: Duration,

    /// Probe budget for manual registration and refresh
    pub registration_timeout: Duration,

    /// Event channel buffer size
    pub event_capacity: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            hosts: vec!["localhost".to_string()],
            scan: ScanConfig::default(),
            sweep_interval: Duration::from_secs(10),
            registration_timeout: Duration::from_secs(5),
            event_capacity: 256,
        }
    }
}

/// Handle on a running scan loop
struct ScanTask {
    ports: PortRange,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns the service registry and the background scan loop.
///
/// All methods take `&self`; share the controller behind an `Arc`.
pub struct DiscoveryController {
    registry: Arc<Registry>,
    scanner: Arc<PortScanner>,
    checker: Arc<dyn HealthChecker>,
    config: ControllerConfig,
    task: Mutex<Option<ScanTask>>,
    events: broadcast::Sender<DiscoveryEvent>,
    state: Arc<watch::Sender<DiscoveryState>>,
}

impl DiscoveryController {
    /// Create a controller probing over HTTP with a TCP pre-filter
    pub fn new(config: ControllerConfig) -> common::Result<Self> {
        let checker = Arc::new(HttpChecker::new()?);
        Ok(Self::with_components(
            config,
            checker,
            Arc::new(TcpConnectProbe::new()),
        ))
    }

    /// Create a controller with caller-supplied probes
    ///
    /// Hosts are canonicalized the way parsed addresses are, so a swept
    /// service and a hand-registered one land on the same record. Hosts
    /// that cannot form an address are dropped.
    pub fn with_components(
        mut config: ControllerConfig,
        checker: Arc<dyn HealthChecker>,
        prefilter: Arc<dyn ConnectProbe>,
    ) -> Self {
        config.hosts = canonical_hosts(&config);
        let scanner = Arc::new(PortScanner::new(
            checker.clone(),
            prefilter,
            config.scan.clone(),
        ));
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let (state, _) = watch::channel(DiscoveryState::Idle);

        Self {
            registry: Arc::new(Registry::new()),
            scanner,
            checker,
            config,
            task: Mutex::new(None),
            events,
            state: Arc::new(state),
        }
    }

    /// Controller configuration
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    fn lock_task(&self) -> MutexGuard<'_, Option<ScanTask>> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start sweeping `ports` in the background.
    ///
    /// Returns `false` without side effects if a loop is already running.
    pub async fn start(&self, ports: PortRange) -> bool {
        let mut task = self.lock_task();
        if let Some(current) = task.as_ref() {
            if !current.handle.is_finished() {
                debug!(ports = %current.ports, "Discovery already running");
                return false;
            }
        }

        let cancel = CancellationToken::new();
        let scan_loop = ScanLoop {
            registry: self.registry.clone(),
            scanner: self.scanner.clone(),
            hosts: self.config.hosts.clone(),
            sweep_interval: self.config.sweep_interval,
            events: self.events.clone(),
            state: self.state.clone(),
        };

        self.state.send_replace(DiscoveryState::Running);
        publish(
            &self.events,
            DiscoveryEvent::Started {
                ports: ports.to_string(),
            },
        );

        let handle = tokio::spawn(scan_loop.run(ports, cancel.clone()));
        *task = Some(ScanTask {
            ports,
            cancel,
            handle,
        });

        info!(ports = %ports, hosts = ?self.config.hosts, "Discovery started");
        true
    }

    /// Stop the scan loop and wait for it to exit.
    ///
    /// In-flight probes finish naturally. Once this returns the loop makes
    /// no further registry changes. Returns `false` if no loop was running.
    pub async fn stop(&self) -> bool {
        let task = self.lock_task().take();
        let Some(task) = task else {
            debug!("Discovery not running");
            return false;
        };

        let was_running = !task.handle.is_finished();
        task.cancel.cancel();
        if let Err(e) = task.handle.await {
            warn!(error = %e, "Scan loop ended abnormally");
        }
        self.state.send_replace(DiscoveryState::Idle);

        if was_running {
            info!(ports = %task.ports, "Discovery stopped");
        }
        was_running
    }

    /// Stop discovery ahead of teardown
    pub async fn shutdown(&self) {
        self.stop().await;
        info!("Discovery controller shut down");
    }

    /// Current lifecycle state
    pub fn state(&self) -> DiscoveryState {
        *self.state.borrow()
    }

    /// Port range of the active loop, if any
    pub fn active_ports(&self) -> Option<PortRange> {
        self.lock_task()
            .as_ref()
            .filter(|task| !task.handle.is_finished())
            .map(|task| task.ports)
    }

    /// Observe lifecycle state changes
    pub fn watch_state(&self) -> watch::Receiver<DiscoveryState> {
        self.state.subscribe()
    }

    /// Subscribe to discovery events
    pub fn subscribe(&self) -> broadcast::Receiver<DiscoveryEvent> {
        self.events.subscribe()
    }

    /// Point-in-time copy of the registry, ordered by address
    pub fn snapshot(&self) -> Vec<ServiceRecord> {
        self.registry.snapshot()
    }

    /// Copy of a single record
    pub fn get(&self, address: &ServiceAddress) -> Option<ServiceRecord> {
        self.registry.get(address)
    }

    /// Register a service the user entered by hand.
    ///
    /// Input is validated before any I/O. The service is probed once and
    /// added only if it answers; an offline service is rejected and the
    /// registry is left untouched.
    pub async fn register_manual(&self, identity: &str, address: &str) -> Result<ServiceRecord> {
        let identity = identity.trim();
        if identity.is_empty() {
            return Err(DiscoveryError::InvalidInput(
                "identity must not be empty".to_string(),
            ));
        }
        let address: ServiceAddress = address.parse()?;

        let result = self
            .checker
            .probe(address.clone(), self.config.registration_timeout)
            .await;

        if !result.is_online() {
            let reason = result
                .reason
                .unwrap_or_else(|| "health check failed".to_string());
            warn!(target = %address, reason = %reason, "Manual registration rejected");
            return Err(DiscoveryError::Unreachable {
                address: address.to_string(),
                reason,
            });
        }

        let upsert = self.registry.register(identity, address, result.checked_at);
        info!(
            target = %upsert.record().address,
            identity = %upsert.record().identity,
            "Service registered"
        );
        publish_upsert(&self.events, &upsert);
        Ok(upsert.into_record())
    }

    /// Re-probe every registered service and apply the verdicts.
    ///
    /// This is the only path that marks a known service offline.
    pub async fn refresh(&self) -> Vec<ServiceRecord> {
        let addresses: Vec<ServiceAddress> = self
            .registry
            .snapshot()
            .into_iter()
            .map(|record| record.address)
            .collect();
        let timeout = self.config.registration_timeout;

        let results: Vec<_> = stream::iter(addresses)
            .map(|address| {
                let checker = self.checker.clone();
                async move {
                    let result = checker.probe(address.clone(), timeout).await;
                    (address, result)
                }
            })
            .buffer_unordered(self.config.scan.concurrency.max(1))
            .collect()
            .await;

        for (address, result) in results {
            let status = ServiceStatus::from(result.status);
            if let Some(change) = self.registry.observe(&address, status, result.checked_at) {
                info!(target = %address, from = %change.from, to = %change.to, "Service status changed");
                publish(
                    &self.events,
                    DiscoveryEvent::StatusChanged {
                        address: change.address,
                        from: change.from,
                        to: change.to,
                    },
                );
            }
        }

        self.registry.snapshot()
    }

    /// Remove a service from the registry
    pub fn remove(&self, address: &ServiceAddress) -> Option<ServiceRecord> {
        let removed = self.registry.remove(address)?;
        info!(target = %address, "Service removed");
        publish(
            &self.events,
            DiscoveryEvent::ServiceRemoved {
                address: address.clone(),
            },
        );
        Some(removed)
    }
}

impl Drop for DiscoveryController {
    fn drop(&mut self) {
        // Cannot join here; make sure the loop winds down on its own.
        if let Some(task) = self.lock_task().take() {
            task.cancel.cancel();
        }
    }
}

fn canonical_hosts(config: &ControllerConfig) -> Vec<String> {
    let mut hosts: Vec<String> = Vec::with_capacity(config.hosts.len());
    for raw in &config.hosts {
        match ServiceAddress::canonical_host(config.scan.scheme, raw) {
            Ok(host) if hosts.contains(&host) => {}
            Ok(host) => hosts.push(host),
            Err(e) => warn!(host = %raw, error = %e, "Ignoring unusable scan host"),
        }
    }
    hosts
}

fn publish_upsert(events: &broadcast::Sender<DiscoveryEvent>, upsert: &Upsert) {
    match upsert {
        Upsert::Inserted(record) => publish(
            events,
            DiscoveryEvent::ServiceAdded {
                record: record.clone(),
            },
        ),
        Upsert::Updated { record, previous } if *previous != record.status => publish(
            events,
            DiscoveryEvent::StatusChanged {
                address: record.address.clone(),
                from: *previous,
                to: record.status,
            },
        ),
        Upsert::Updated { .. } => {}
    }
}

/// State moved into the background task
struct ScanLoop {
    registry: Arc<Registry>,
    scanner: Arc<PortScanner>,
    hosts: Vec<String>,
    sweep_interval: Duration,
    events: broadcast::Sender<DiscoveryEvent>,
    state: Arc<watch::Sender<DiscoveryState>>,
}

impl ScanLoop {
    async fn run(self, ports: PortRange, cancel: CancellationToken) {
        let outcome = self.sweep_until_cancelled(ports, &cancel).await;
        self.finish(outcome);
    }

    fn finish(&self, outcome: Result<()>) {
        match outcome {
            Ok(()) => {
                info!("Discovery loop stopped");
                publish(&self.events, DiscoveryEvent::Stopped);
            }
            Err(e) => {
                error!(error = %e, "Discovery loop aborted");
                publish(
                    &self.events,
                    DiscoveryEvent::Failed {
                        message: e.to_string(),
                    },
                );
            }
        }
        self.state.send_replace(DiscoveryState::Idle);
    }

    async fn sweep_until_cancelled(&self, ports: PortRange, cancel: &CancellationToken) -> Result<()> {
        loop {
            let started = Instant::now();
            let found = self.run_sweep(ports, cancel.clone()).await?;

            if cancel.is_cancelled() {
                return Ok(());
            }

            let duration = started.elapsed();
            debug!(found, duration_ms = duration.as_millis(), "Sweep completed");
            publish(
                &self.events,
                DiscoveryEvent::SweepCompleted { found, duration },
            );

            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(self.sweep_interval) => {}
            }
        }
    }

    async fn run_sweep(&self, ports: PortRange, cancel: CancellationToken) -> Result<usize> {
        let registry = self.registry.clone();
        let scanner = self.scanner.clone();
        let hosts = self.hosts.clone();
        let events = self.events.clone();

        supervise(async move {
            let hits = scanner.scan(&hosts, ports, &cancel);
            merge_hits(&registry, &events, hits).await
        })
        .await
    }
}

/// Run one sweep in its own task so a fault outside the per-port guard
/// surfaces as an error instead of killing the loop silently.
async fn supervise<F>(sweep: F) -> Result<usize>
where
    F: Future<Output = usize> + Send + 'static,
{
    tokio::spawn(sweep)
        .await
        .map_err(|e| DiscoveryError::InternalScanFailure(format!("sweep task failed: {}", e)))
}

/// Fold scan hits into the registry; returns how many were seen
async fn merge_hits(
    registry: &Registry,
    events: &broadcast::Sender<DiscoveryEvent>,
    hits: impl Stream<Item = ScanHit>,
) -> usize {
    let mut hits = pin!(hits);
    let mut found = 0;

    while let Some(hit) = hits.next().await {
        found += 1;
        let upsert = registry.record_discovery(hit.address, hit.result.checked_at);
        if let Upsert::Inserted(record) = &upsert {
            info!(target = %record.address, identity = %record.identity, "Discovered service");
        }
        publish_upsert(events, &upsert);
    }

    found
}
