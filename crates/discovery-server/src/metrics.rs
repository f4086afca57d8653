//! Prometheus metrics for the discovery server.

use discovery::{DiscoveryEvent, DiscoveryState, ServiceRecord, ServiceStatus};
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use std::time::Duration;

/// Labels for per-status gauges
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct StatusLabels {
    /// Status (unknown, online, offline)
    pub status: String,
}

/// Labels for status transition metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct TransitionLabels {
    /// From status
    pub from: String,
    /// To status
    pub to: String,
}

/// Labels for manual registration metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RegistrationLabels {
    /// Result (success, invalid_input, unreachable)
    pub result: String,
}

/// Labels for model server requests
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct GatewayLabels {
    /// Operation (list_models, generate)
    pub operation: String,
    /// Result (success or an error kind)
    pub result: String,
}

/// Metrics registry with all discovery server metrics
pub struct MetricsRegistry {
    /// Prometheus registry
    pub registry: Registry,

    /// Completed sweeps
    sweeps_total: Counter,
    /// Sweep wall time
    sweep_duration_seconds: Histogram,
    /// Registry size by status
    services: Family<StatusLabels, Gauge>,
    /// Records inserted
    services_added_total: Counter,
    /// Status transitions
    status_changes_total: Family<TransitionLabels, Counter>,
    /// Manual registrations by result
    registrations_total: Family<RegistrationLabels, Counter>,
    /// Scan loop aborts
    loop_failures_total: Counter,
    /// Scan loop state (1=running, 0=idle)
    running: Gauge,
    /// Model server requests
    gateway_requests_total: Family<GatewayLabels, Counter>,
}

impl MetricsRegistry {
    /// Create a new metrics registry
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let sweeps_total = Counter::default();
        registry.register(
            "discovery_sweeps",
            "Total completed port sweeps",
            sweeps_total.clone(),
        );

        // Exponential buckets from 10ms to ~80s
        let sweep_duration_seconds = Histogram::new(exponential_buckets(0.01, 2.0, 14));
        registry.register(
            "discovery_sweep_duration_seconds",
            "Port sweep duration in seconds",
            sweep_duration_seconds.clone(),
        );

        let services = Family::<StatusLabels, Gauge>::default();
        registry.register(
            "discovery_services",
            "Known services by status",
            services.clone(),
        );

        let services_added_total = Counter::default();
        registry.register(
            "discovery_services_added",
            "Total services added to the registry",
            services_added_total.clone(),
        );

        let status_changes_total = Family::<TransitionLabels, Counter>::default();
        registry.register(
            "discovery_status_changes",
            "Total service status transitions",
            status_changes_total.clone(),
        );

        let registrations_total = Family::<RegistrationLabels, Counter>::default();
        registry.register(
            "discovery_registrations",
            "Total manual registrations by result",
            registrations_total.clone(),
        );

        let loop_failures_total = Counter::default();
        registry.register(
            "discovery_loop_failures",
            "Total scan loop aborts",
            loop_failures_total.clone(),
        );

        let running = Gauge::default();
        registry.register(
            "discovery_running",
            "Scan loop state (1=running, 0=idle)",
            running.clone(),
        );

        let gateway_requests_total = Family::<GatewayLabels, Counter>::default();
        registry.register(
            "gateway_requests",
            "Total model server requests",
            gateway_requests_total.clone(),
        );

        Self {
            registry,
            sweeps_total,
            sweep_duration_seconds,
            services,
            services_added_total,
            status_changes_total,
            registrations_total,
            loop_failures_total,
            running,
            gateway_requests_total,
        }
    }

    /// Update counters from a controller event
    pub fn record_event(&self, event: &DiscoveryEvent) {
        match event {
            DiscoveryEvent::Started { .. } => self.set_state(DiscoveryState::Running),
            DiscoveryEvent::Stopped => self.set_state(DiscoveryState::Idle),
            DiscoveryEvent::Failed { .. } => {
                self.loop_failures_total.inc();
                self.set_state(DiscoveryState::Idle);
            }
            DiscoveryEvent::SweepCompleted { duration, .. } => self.record_sweep(*duration),
            DiscoveryEvent::ServiceAdded { .. } => {
                self.services_added_total.inc();
            }
            DiscoveryEvent::StatusChanged { from, to, .. } => {
                self.status_changes_total
                    .get_or_create(&TransitionLabels {
                        from: from.to_string(),
                        to: to.to_string(),
                    })
                    .inc();
            }
            DiscoveryEvent::ServiceRemoved { .. } => {}
        }
    }

    /// Record a completed sweep
    pub fn record_sweep(&self, duration: Duration) {
        self.sweeps_total.inc();
        self.sweep_duration_seconds.observe(duration.as_secs_f64());
    }

    /// Set scan loop state gauge
    pub fn set_state(&self, state: DiscoveryState) {
        self.running.set(match state {
            DiscoveryState::Running => 1,
            DiscoveryState::Idle => 0,
        });
    }

    /// Recount services by status from a registry snapshot
    pub fn update_services(&self, records: &[ServiceRecord]) {
        for status in [
            ServiceStatus::Unknown,
            ServiceStatus::Online,
            ServiceStatus::Offline,
        ] {
            let count = records.iter().filter(|r| r.status == status).count();
            self.services
                .get_or_create(&StatusLabels {
                    status: status.to_string(),
                })
                .set(count as i64);
        }
    }

    /// Record a manual registration attempt
    pub fn record_registration(&self, result: &str) {
        self.registrations_total
            .get_or_create(&RegistrationLabels {
                result: result.to_string(),
            })
            .inc();
    }

    /// Record a model server request
    pub fn record_gateway_request(&self, operation: &str, result: &str) {
        self.gateway_requests_total
            .get_or_create(&GatewayLabels {
                operation: operation.to_string(),
                result: result.to_string(),
            })
            .inc();
    }

    /// Encode all metrics in Prometheus text format
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buffer = String::new();
        encode(&mut buffer, &self.registry)?;
        Ok(buffer)
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
