//! Main discovery server implementation.

use crate::config::Config;
use crate::http_server::{ApiServer, AppState};
use crate::metrics::MetricsRegistry;
use discovery::{DiscoveryController, DiscoveryEvent};
use gateway::OllamaClient;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Discovery server: controller, model server client and control API
pub struct DiscoveryServer {
    config: Config,
    state: AppState,
}

impl DiscoveryServer {
    /// Build every component from configuration without starting anything
    pub fn new(config: Config) -> common::Result<Self> {
        let ports = config.port_range()?;
        let controller = Arc::new(DiscoveryController::new(config.to_controller_config())?);
        let gateway = Arc::new(OllamaClient::new(config.to_gateway_config())?);

        let metrics = if config.metrics.enabled {
            info!("Metrics enabled on {}/metrics", config.http.listen_addr);
            Some(Arc::new(MetricsRegistry::new()))
        } else {
            info!("Metrics disabled");
            None
        };

        let state = AppState {
            controller,
            gateway,
            metrics,
            ports,
            stale_after: config.discovery.stale_after,
        };

        Ok(Self { config, state })
    }

    /// Shared handler state
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Run until `shutdown` resolves, then stop discovery
    pub async fn run<F>(self, shutdown: F) -> common::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!("Starting discovery server");

        let recorder = self
            .state
            .metrics
            .clone()
            .map(|metrics| spawn_metrics_recorder(self.state.controller.clone(), metrics));

        if self.config.discovery.autostart {
            self.state.controller.start(self.state.ports).await;
        } else {
            info!("Autostart disabled; waiting for POST /discovery/start");
        }

        let controller = self.state.controller.clone();
        let server = ApiServer::new(self.state, self.config.http.listen_addr.clone());
        let outcome = server.run(shutdown).await;

        controller.shutdown().await;
        if let Some(handle) = recorder {
            handle.abort();
        }

        info!("Discovery server stopped");
        outcome
    }
}

/// Keep metrics in step with controller events
fn spawn_metrics_recorder(
    controller: Arc<DiscoveryController>,
    metrics: Arc<MetricsRegistry>,
) -> JoinHandle<()> {
    let mut events = controller.subscribe();
    metrics.set_state(controller.state());
    metrics.update_services(&controller.snapshot());

    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    debug!(kind = event.kind(), "Recording event");
                    metrics.record_event(&event);
                    if changes_registry(&event) {
                        metrics.update_services(&controller.snapshot());
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Metrics recorder lagged behind events");
                    metrics.set_state(controller.state());
                    metrics.update_services(&controller.snapshot());
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn changes_registry(event: &DiscoveryEvent) -> bool {
    matches!(
        event,
        DiscoveryEvent::ServiceAdded { .. }
            | DiscoveryEvent::StatusChanged { .. }
            | DiscoveryEvent::ServiceRemoved { .. }
            | DiscoveryEvent::SweepCompleted { .. }
    )
}

/// Resolves on Ctrl-C
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        // Without a signal handler, run until killed
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
