//! Events published by the discovery controller.

use crate::record::{ServiceRecord, ServiceStatus};
use healthcheck::ServiceAddress;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::sync::broadcast;

/// Lifecycle state of the scan loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryState {
    Idle,
    Running,
}

impl fmt::Display for DiscoveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryState::Idle => write!(f, "idle"),
            DiscoveryState::Running => write!(f, "running"),
        }
    }
}

/// Notification for UI layers and metrics
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiscoveryEvent {
    /// Scan loop launched over `ports`
    Started { ports: String },

    /// A new address entered the registry
    ServiceAdded { record: ServiceRecord },

    /// A known record changed status
    StatusChanged {
        address: ServiceAddress,
        from: ServiceStatus,
        to: ServiceStatus,
    },

    /// A record was removed on request
    ServiceRemoved { address: ServiceAddress },

    /// A full sweep finished
    SweepCompleted {
        found: usize,
        #[serde(with = "humantime_serde")]
        duration: Duration,
    },

    /// Scan loop exited after a stop request
    Stopped,

    /// Scan loop aborted; state is back to idle
    Failed { message: String },
}

impl DiscoveryEvent {
    /// Short name used in logs and metric labels
    pub fn kind(&self) -> &'static str {
        match self {
            DiscoveryEvent::Started { .. } => "started",
            DiscoveryEvent::ServiceAdded { .. } => "service_added",
            DiscoveryEvent::StatusChanged { .. } => "status_changed",
            DiscoveryEvent::ServiceRemoved { .. } => "service_removed",
            DiscoveryEvent::SweepCompleted { .. } => "sweep_completed",
            DiscoveryEvent::Stopped => "stopped",
            DiscoveryEvent::Failed { .. } => "failed",
        }
    }
}

/// Publish without caring whether anyone is listening.
pub(crate) fn publish(events: &broadcast::Sender<DiscoveryEvent>, event: DiscoveryEvent) {
    // Err only means there are no subscribers right now.
    let _ = events.send(event);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = DiscoveryEvent::SweepCompleted {
            found: 2,
            duration: Duration::from_millis(1500),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "sweep_completed");
        assert_eq!(json["found"], 2);
        assert_eq!(json["duration"], "1s 500ms");

        let event = DiscoveryEvent::StatusChanged {
            address: ServiceAddress::http("localhost", 8001),
            from: ServiceStatus::Online,
            to: ServiceStatus::Offline,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["address"], "http://localhost:8001");
        assert_eq!(json["to"], "offline");
        assert_eq!(event.kind(), "status_changed");
    }

    #[test]
    fn test_publish_without_subscribers() {
        let (tx, rx) = broadcast::channel(4);
        drop(rx);
        publish(&tx, DiscoveryEvent::Stopped);
    }
}
