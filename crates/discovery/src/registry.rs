//! Address-keyed registry of known services.

use crate::record::{ServiceRecord, ServiceStatus};
use healthcheck::ServiceAddress;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

/// Outcome of an upsert
#[derive(Debug, Clone, PartialEq)]
pub enum Upsert {
    /// Address was new; the stored record is returned
    Inserted(ServiceRecord),
    /// Address existed; the record after the update is returned
    Updated {
        record: ServiceRecord,
        previous: ServiceStatus,
    },
}

impl Upsert {
    /// Record as stored after the operation
    pub fn record(&self) -> &ServiceRecord {
        match self {
            Upsert::Inserted(record) | Upsert::Updated { record, .. } => record,
        }
    }

    /// Consume into the stored record
    pub fn into_record(self) -> ServiceRecord {
        match self {
            Upsert::Inserted(record) | Upsert::Updated { record, .. } => record,
        }
    }
}

/// A status transition caused by an applied probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub address: ServiceAddress,
    pub from: ServiceStatus,
    pub to: ServiceStatus,
}

/// In-memory registry of [`ServiceRecord`]s keyed by address.
///
/// Every method takes the lock for a short synchronous section and never
/// hands out references into the map. Callers probe outside the lock and
/// write back only the verdict.
#[derive(Debug, Default)]
pub struct Registry {
    records: Mutex<BTreeMap<ServiceAddress, ServiceRecord>>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    // Records are plain values updated in a single assignment, so a
    // poisoned lock still guards a consistent map.
    fn lock(&self) -> MutexGuard<'_, BTreeMap<ServiceAddress, ServiceRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Point-in-time copy of every record, ordered by address
    pub fn snapshot(&self) -> Vec<ServiceRecord> {
        self.lock().values().cloned().collect()
    }

    /// Copy of the record at `address`
    pub fn get(&self, address: &ServiceAddress) -> Option<ServiceRecord> {
        self.lock().get(address).cloned()
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the registry holds no records
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Merge a scan hit: insert an online record or mark the existing one
    /// online. The identity of an existing record is kept.
    pub fn record_discovery(&self, address: ServiceAddress, checked_at: SystemTime) -> Upsert {
        let mut records = self.lock();
        match records.get_mut(&address) {
            Some(record) => {
                let previous = record.status;
                record.observe(ServiceStatus::Online, checked_at);
                Upsert::Updated {
                    record: record.clone(),
                    previous,
                }
            }
            None => {
                let record = ServiceRecord::discovered(address.clone(), checked_at);
                records.insert(address, record.clone());
                Upsert::Inserted(record)
            }
        }
    }

    /// Merge a successful manual registration. The identity is overwritten
    /// (last write wins).
    pub fn register(
        &self,
        identity: impl Into<String>,
        address: ServiceAddress,
        checked_at: SystemTime,
    ) -> Upsert {
        let identity = identity.into();
        let mut records = self.lock();
        match records.get_mut(&address) {
            Some(record) => {
                let previous = record.status;
                record.identity = identity;
                record.observe(ServiceStatus::Online, checked_at);
                Upsert::Updated {
                    record: record.clone(),
                    previous,
                }
            }
            None => {
                let mut record = ServiceRecord::new(identity, address.clone());
                record.observe(ServiceStatus::Online, checked_at);
                records.insert(address, record.clone());
                Upsert::Inserted(record)
            }
        }
    }

    /// Apply a probe verdict to an existing record.
    ///
    /// Unknown addresses are ignored (the record may have been removed while
    /// the probe was in flight). Returns the transition, if the status changed.
    pub fn observe(
        &self,
        address: &ServiceAddress,
        status: ServiceStatus,
        checked_at: SystemTime,
    ) -> Option<StatusChange> {
        let mut records = self.lock();
        let record = records.get_mut(address)?;
        let from = record.status;
        if record.observe(status, checked_at) && from != status {
            Some(StatusChange {
                address: address.clone(),
                from,
                to: status,
            })
        } else {
            None
        }
    }

    /// Remove the record at `address`
    pub fn remove(&self, address: &ServiceAddress) -> Option<ServiceRecord> {
        self.lock().remove(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn addr(port: u16) -> ServiceAddress {
        ServiceAddress::http("localhost", port)
    }

    #[test]
    fn test_discovery_inserts_then_updates() {
        let registry = Registry::new();
        let t0 = SystemTime::now();

        let first = registry.record_discovery(addr(8001), t0);
        assert!(matches!(first, Upsert::Inserted(_)));

        let t1 = t0 + Duration::from_secs(1);
        let second = registry.record_discovery(addr(8001), t1);
        match second {
            Upsert::Updated { record, previous } => {
                assert_eq!(previous, ServiceStatus::Online);
                assert_eq!(record.last_checked, Some(t1));
            }
            other => panic!("Expected update, got {:?}", other),
        }
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_discovery_keeps_user_identity() {
        let registry = Registry::new();
        let t0 = SystemTime::now();

        registry.register("Web Search", addr(8001), t0);
        let upsert = registry.record_discovery(addr(8001), t0 + Duration::from_secs(1));
        assert_eq!(upsert.record().identity, "Web Search");
    }

    #[test]
    fn test_register_last_write_wins() {
        let registry = Registry::new();
        let t0 = SystemTime::now();

        registry.record_discovery(addr(8001), t0);
        let upsert = registry.register("Files", addr(8001), t0 + Duration::from_secs(1));
        assert_eq!(upsert.record().identity, "Files");
        assert_eq!(registry.snapshot().len(), 1);
    }

    #[test]
    fn test_merge_order_independent() {
        let t0 = SystemTime::now();
        let t1 = t0 + Duration::from_millis(10);
        let t2 = t0 + Duration::from_millis(20);

        let a = Registry::new();
        a.record_discovery(addr(8001), t0);
        a.register("Manual", addr(8001), t1);
        a.record_discovery(addr(8001), t2);

        let b = Registry::new();
        b.record_discovery(addr(8001), t2);
        b.register("Manual", addr(8001), t1);
        b.record_discovery(addr(8001), t0);

        let (ra, rb) = (a.snapshot(), b.snapshot());
        assert_eq!(ra.len(), 1);
        assert_eq!(rb.len(), 1);
        assert_eq!(ra[0].status, ServiceStatus::Online);
        assert_eq!(rb[0].status, ServiceStatus::Online);
        assert_eq!(ra[0].last_checked, Some(t2));
        assert_eq!(rb[0].last_checked, Some(t2));
    }

    #[test]
    fn test_observe_reports_transitions() {
        let registry = Registry::new();
        let t0 = SystemTime::now();
        registry.record_discovery(addr(8001), t0);

        let change = registry.observe(&addr(8001), ServiceStatus::Offline, t0 + Duration::from_secs(1));
        assert_eq!(
            change,
            Some(StatusChange {
                address: addr(8001),
                from: ServiceStatus::Online,
                to: ServiceStatus::Offline,
            })
        );

        // Same status again is not a transition
        assert!(registry.observe(&addr(8001), ServiceStatus::Offline, t0 + Duration::from_secs(2)).is_none());
        // Stale verdict is dropped
        assert!(registry.observe(&addr(8001), ServiceStatus::Online, t0).is_none());
        assert_eq!(registry.get(&addr(8001)).unwrap().status, ServiceStatus::Offline);
        // Unknown address is ignored
        assert!(registry.observe(&addr(9999), ServiceStatus::Online, t0).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_snapshot_is_ordered_copy() {
        let registry = Registry::new();
        let now = SystemTime::now();
        for port in [8010, 8002, 8005] {
            registry.record_discovery(addr(port), now);
        }

        let mut snapshot = registry.snapshot();
        let ports: Vec<u16> = snapshot.iter().map(|r| r.address.port).collect();
        assert_eq!(ports, vec![8002, 8005, 8010]);

        // Mutating the copy does not touch the registry
        snapshot[0].identity = "changed".to_string();
        assert_eq!(registry.get(&addr(8002)).unwrap().identity, "MCP Server 8002");
    }

    #[test]
    fn test_remove() {
        let registry = Registry::new();
        registry.record_discovery(addr(8001), SystemTime::now());

        assert!(registry.remove(&addr(8001)).is_some());
        assert!(registry.remove(&addr(8001)).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_concurrent_writers() {
        let registry = Arc::new(Registry::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for port in 8000..8050 {
                        if (port + i) % 2 == 0 {
                            registry.record_discovery(addr(port), SystemTime::now());
                        } else {
                            registry.register(format!("worker {}", i), addr(port), SystemTime::now());
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 50);
        assert!(snapshot.iter().all(|r| r.status == ServiceStatus::Online));
    }
}
