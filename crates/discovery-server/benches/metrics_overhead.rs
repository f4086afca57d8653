// Cost of feeding controller events into the metrics registry

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use discovery::{DiscoveryEvent, ServiceRecord, ServiceStatus};
use discovery_server::metrics::MetricsRegistry;
use healthcheck::ServiceAddress;
use std::hint::black_box;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

fn sample_events() -> Vec<DiscoveryEvent> {
    let address = ServiceAddress::http("localhost", 8001);
    vec![
        DiscoveryEvent::ServiceAdded {
            record: ServiceRecord::discovered(address.clone(), SystemTime::now()),
        },
        DiscoveryEvent::StatusChanged {
            address,
            from: ServiceStatus::Online,
            to: ServiceStatus::Offline,
        },
        DiscoveryEvent::SweepCompleted {
            found: 1,
            duration: Duration::from_millis(120),
        },
    ]
}

fn bench_event_recording(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_recording");
    let events = sample_events();

    // Metrics disabled (None)
    group.bench_function("disabled", |b| {
        let metrics: Option<Arc<MetricsRegistry>> = None;
        b.iter(|| {
            if let Some(ref m) = metrics {
                for event in &events {
                    m.record_event(black_box(event));
                }
            }
        });
    });

    group.bench_function("enabled", |b| {
        let metrics = Some(Arc::new(MetricsRegistry::new()));
        b.iter(|| {
            if let Some(ref m) = metrics {
                for event in &events {
                    m.record_event(black_box(event));
                }
            }
        });
    });

    group.finish();
}

fn bench_service_gauges(c: &mut Criterion) {
    let mut group = c.benchmark_group("update_services");
    let registry = MetricsRegistry::new();

    for size in [10usize, 100, 1000] {
        let now = SystemTime::now();
        let records: Vec<ServiceRecord> = (0..size)
            .map(|i| ServiceRecord::discovered(ServiceAddress::http("localhost", 1 + i as u16), now))
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(size), &records, |b, records| {
            b.iter(|| registry.update_services(black_box(records)));
        });
    }

    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let registry = MetricsRegistry::new();
    for event in sample_events() {
        registry.record_event(&event);
    }

    c.bench_function("encode", |b| {
        b.iter(|| black_box(registry.encode()));
    });
}

criterion_group!(benches, bench_event_recording, bench_service_gauges, bench_encode);
criterion_main!(benches);
