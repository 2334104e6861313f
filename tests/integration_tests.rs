//! Observa Integration Tests
//!
//! End-to-end scenarios through the public API:
//! - Counter collection against the in-memory backend
//! - External callbacks and their failures
//! - Callback de-duplication across performers sharing a key
//! - Shared callbacks, gauges, up-down counters and histograms
//! - Prometheus exposition and YAML configuration

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;

use observa::adapters::{InMemoryBackend, PrometheusBackend};
use observa::domain::{
    Attributes, CallbackResult, MetricInfo, MetricKind, ObserveContext, ObserveOption,
};
use observa::meter::{MeterOption, MeterProvider, MetricHandle, MetricOption};
use observa::performer::{CallbackRegistry, CounterPerformer};
use observa::{Error, ErrorCode, MetricsConfig};

fn static_attributes() -> Attributes {
    Attributes::new().with("service", "checkout")
}

fn counter_info(name: &str) -> MetricInfo {
    MetricInfo::new(name, MetricKind::Counter).with_attributes(static_attributes())
}

// =============================================================================
// Counter Scenarios
// =============================================================================

mod counter_tests {
    use super::*;

    #[test]
    fn test_three_increments_observed_as_three() {
        let backend = InMemoryBackend::new();
        let registry = CallbackRegistry::new();
        let counter =
            CounterPerformer::new(&backend, &registry, Arc::new(counter_info("orders_total")))
                .unwrap();

        counter.inc(&[]);
        counter.inc(&[]);
        counter.inc(&[]);

        let report = backend.collect();
        assert!(report.errors.is_empty());
        let observations = report.observations_of("orders_total");
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].value, 3.0);
        assert_eq!(observations[0].attributes, static_attributes());
    }

    #[test]
    fn test_external_callback_wins_over_local_state() {
        let backend = InMemoryBackend::new();
        let registry = CallbackRegistry::new();
        let info = counter_info("orders_total").with_callback(Some(Arc::new(
            |_ctx: &ObserveContext| -> anyhow::Result<Option<CallbackResult>> {
                Ok(Some(
                    CallbackResult::new(42.0)
                        .with_attributes(Attributes::new().with("region", "us")),
                ))
            },
        )));
        let counter = CounterPerformer::new(&backend, &registry, Arc::new(info)).unwrap();

        counter.add(5.0, &[]);
        assert_eq!(counter.value(), 5.0);

        let report = backend.collect();
        let observations = report.observations_of("orders_total");
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].value, 42.0);
        assert_eq!(
            observations[0].attributes,
            static_attributes().with("region", "us")
        );
    }

    #[test]
    fn test_external_callback_error_surfaces() {
        let backend = InMemoryBackend::new();
        let registry = CallbackRegistry::new();
        let info = counter_info("orders_total").with_callback(Some(Arc::new(
            |_ctx: &ObserveContext| -> anyhow::Result<Option<CallbackResult>> {
                Err(anyhow::anyhow!("order store unreachable"))
            },
        )));
        let counter = CounterPerformer::new(&backend, &registry, Arc::new(info)).unwrap();
        counter.inc(&[]);

        let report = backend.collect();
        assert!(report.observations_of("orders_total").is_empty());
        assert_eq!(report.errors.len(), 1);

        let err = &report.errors[0];
        assert_eq!(err.code(), ErrorCode::OperationFailed);
        assert_eq!(err.metric(), Some("orders_total"));
        assert!(err.to_string().contains("order store unreachable"));
    }

    #[test]
    fn test_callback_sees_collection_deadline() {
        let backend = InMemoryBackend::new();
        let registry = CallbackRegistry::new();
        let info = counter_info("slow_total").with_callback(Some(Arc::new(
            |ctx: &ObserveContext| -> anyhow::Result<Option<CallbackResult>> {
                ctx.check()?;
                Ok(Some(CallbackResult::new(1.0)))
            },
        )));
        let _counter = CounterPerformer::new(&backend, &registry, Arc::new(info)).unwrap();

        let expired = ObserveContext::with_timeout(Duration::ZERO);
        let report = backend.collect_with(&expired);
        assert!(report.observations.is_empty());
        assert!(report.errors[0].to_string().contains("deadline"));

        let report = backend.collect_with(&ObserveContext::with_timeout(Duration::from_secs(60)));
        assert_eq!(report.value_of("slow_total"), Some(1.0));
    }

    #[test]
    #[should_panic(expected = "invalid argument")]
    fn test_negative_add_panics() {
        let backend = InMemoryBackend::new();
        let registry = CallbackRegistry::new();
        let counter =
            CounterPerformer::new(&backend, &registry, Arc::new(counter_info("orders_total")))
                .unwrap();
        counter.add(-2.0, &[]);
    }

    #[test]
    fn test_dynamic_attributes_reported_with_last_mutation() {
        let backend = InMemoryBackend::new();
        let registry = CallbackRegistry::new();
        let counter =
            CounterPerformer::new(&backend, &registry, Arc::new(counter_info("orders_total")))
                .unwrap();

        counter.inc(&[ObserveOption::new(Attributes::new().with("method", "card"))]);
        counter.inc(&[ObserveOption::new(Attributes::new().with("method", "cash"))]);

        let report = backend.collect();
        assert_eq!(report.value_of("orders_total"), Some(2.0));
        assert_eq!(
            report.observations_of("orders_total")[0].attributes,
            static_attributes().with("method", "cash")
        );
    }

    #[test]
    fn test_concurrent_adds_not_lost() {
        let backend = InMemoryBackend::new();
        let registry = CallbackRegistry::new();
        let counter =
            CounterPerformer::new(&backend, &registry, Arc::new(counter_info("hits_total")))
                .unwrap();

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..1000 {
                        counter.inc(&[]);
                    }
                });
            }
            // collection cycles overlapping the writers
            scope.spawn(|| {
                for _ in 0..50 {
                    let _ = backend.collect();
                }
            });
        });

        assert_eq!(counter.value(), 8000.0);
        assert_eq!(backend.collect().value_of("hits_total"), Some(8000.0));
    }
}

// =============================================================================
// Callback De-duplication
// =============================================================================

mod dedup_tests {
    use super::*;

    #[test]
    fn test_same_key_registers_one_callback() {
        let backend = InMemoryBackend::new();
        let registry = CallbackRegistry::new();
        let info = Arc::new(counter_info("orders_total"));

        let first = CounterPerformer::new(&backend, &registry, Arc::clone(&info)).unwrap();
        let second = CounterPerformer::new(&backend, &registry, Arc::clone(&info)).unwrap();

        assert_eq!(backend.callback_registrations_for("orders_total"), 1);
        assert!(first.has_callback());
        assert!(!second.has_callback());

        first.add(1.0, &[]);
        second.add(10.0, &[]);
        assert_eq!(first.value(), 1.0);
        assert_eq!(second.value(), 10.0);

        let report = backend.collect();
        assert_eq!(report.observations_of("orders_total").len(), 1);
        assert_eq!(report.value_of("orders_total"), Some(1.0));
    }

    #[test]
    fn test_fresh_registry_per_composition() {
        let backend = InMemoryBackend::new();
        let info = Arc::new(counter_info("orders_total"));

        let _a = CounterPerformer::new(&backend, &CallbackRegistry::new(), Arc::clone(&info))
            .unwrap();
        let _b = CounterPerformer::new(&backend, &CallbackRegistry::new(), Arc::clone(&info))
            .unwrap();

        assert_eq!(backend.callback_registrations_for("orders_total"), 2);
    }

    #[test]
    fn test_creation_failure_leaves_registry_untouched() {
        let backend = InMemoryBackend::new();
        let registry = CallbackRegistry::new();
        backend.set_fail_creations(true);

        let result =
            CounterPerformer::new(&backend, &registry, Arc::new(counter_info("orders_total")));
        let err = result.unwrap_err();
        assert_matches!(err, Error::Internal { .. });
        assert_eq!(err.metric(), Some("orders_total"));
        assert!(registry.is_empty());

        backend.set_fail_creations(false);
        let counter =
            CounterPerformer::new(&backend, &registry, Arc::new(counter_info("orders_total")))
                .unwrap();
        assert!(counter.has_callback());
    }

    #[test]
    fn test_conflicting_definition_rejected() {
        let backend = Arc::new(InMemoryBackend::new());
        let provider = MeterProvider::new(backend.clone());
        let meter = provider.meter(MeterOption::new("shop", "1"));

        meter.counter("items", MetricOption::new()).unwrap();
        let err = meter.gauge("items", MetricOption::new()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Internal);
    }
}

// =============================================================================
// Callback Removal and Shared Callbacks
// =============================================================================

mod callback_tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_callback_detaching_its_own_counter() {
        let backend = Arc::new(InMemoryBackend::new());
        let registry = CallbackRegistry::new();
        let slot: Arc<parking_lot::Mutex<Option<Arc<CounterPerformer>>>> = Arc::default();

        let own = Arc::clone(&slot);
        let info = counter_info("bootstrap_total").with_callback(Some(Arc::new(
            move |_ctx: &ObserveContext| -> anyhow::Result<Option<CallbackResult>> {
                if let Some(counter) = own.lock().as_ref() {
                    counter.remove_callback();
                }
                Ok(Some(CallbackResult::new(1.0)))
            },
        )));
        let counter =
            Arc::new(CounterPerformer::new(backend.as_ref(), &registry, Arc::new(info)).unwrap());
        *slot.lock() = Some(Arc::clone(&counter));

        let (tx, rx) = mpsc::channel();
        let collector = Arc::clone(&backend);
        std::thread::spawn(move || {
            let first = collector.collect();
            let second = collector.collect();
            let _ = tx.send((first, second));
        });
        let (first, second) = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("collection cycle did not finish");

        assert_eq!(first.value_of("bootstrap_total"), Some(1.0));
        assert!(second.observations.is_empty());
        assert!(!counter.has_callback());
    }

    #[test]
    fn test_shared_callback_replaces_earlier_performer() {
        let backend = Arc::new(InMemoryBackend::new());
        let provider = MeterProvider::new(backend.clone());
        let meter = provider.meter(MeterOption::new("queue", "1"));
        let first = meter.gauge("backlog", MetricOption::new()).unwrap();
        let second = meter.gauge("backlog", MetricOption::new()).unwrap();
        first.set(50.0, &[]);

        let _registration = meter
            .register_callback(&[&second], |_ctx, observer| {
                observer.observe("backlog", 12.0, &Attributes::new());
                Ok(())
            })
            .unwrap();

        let report = backend.collect();
        assert_eq!(report.observations_of("backlog").len(), 1);
        assert_eq!(report.value_of("backlog"), Some(12.0));
        assert!(!first.has_callback());
    }

    #[test]
    fn test_remove_callback_stops_reporting() {
        let backend = Arc::new(InMemoryBackend::new());
        let provider = MeterProvider::new(backend.clone());
        let meter = provider.meter(MeterOption::new("shop", "1"));
        let counter = meter.counter("orders_total", MetricOption::new()).unwrap();

        counter.inc(&[]);
        assert_eq!(backend.collect().value_of("orders_total"), Some(1.0));

        counter.remove_callback();
        counter.inc(&[]);
        assert_eq!(counter.value(), 2.0);
        assert_eq!(backend.collect().value_of("orders_total"), None);

        // permanent: a new performer for the same key does not take over
        let again = meter.counter("orders_total", MetricOption::new()).unwrap();
        again.inc(&[]);
        assert_eq!(backend.collect().value_of("orders_total"), None);
    }

    #[test]
    fn test_shared_callback_reports_several_metrics() {
        let backend = Arc::new(InMemoryBackend::new());
        let provider = MeterProvider::new(backend.clone());
        let meter = provider.meter(
            MeterOption::new("pool", "2").with_attributes(Attributes::new().with("db", "main")),
        );
        let idle = meter.gauge("connections_idle", MetricOption::new()).unwrap();
        let busy = meter.gauge("connections_busy", MetricOption::new()).unwrap();
        idle.set(100.0, &[]);

        let registration = meter
            .register_callback(&[&idle, &busy], |_ctx, observer| {
                observer.observe("connections_idle", 3.0, &Attributes::new());
                observer.observe(
                    "connections_busy",
                    7.0,
                    &Attributes::new().with("shard", 1),
                );
                Ok(())
            })
            .unwrap();

        let report = backend.collect();
        assert_eq!(report.observations.len(), 2);
        assert_eq!(report.value_of("connections_idle"), Some(3.0));
        assert_eq!(
            report.observations_of("connections_busy")[0].attributes,
            Attributes::new().with("db", "main").with("shard", 1)
        );

        // later performers for a covered key register nothing
        let before = backend.callback_registrations();
        let _late = meter.gauge("connections_idle", MetricOption::new()).unwrap();
        assert_eq!(backend.callback_registrations(), before);

        registration.unregister();
        assert!(backend.collect().observations.is_empty());
    }

    #[test]
    fn test_shared_registration_failure() {
        let backend = Arc::new(InMemoryBackend::new());
        let provider = MeterProvider::new(backend.clone());
        let meter = provider.meter(MeterOption::default());
        let gauge = meter.gauge("temperature", MetricOption::new()).unwrap();

        backend.set_fail_creations(true);
        let result = meter.register_callback(&[&gauge], |_ctx, _observer| Ok(()));
        assert_matches!(result, Err(Error::Registration { .. }));

        // the per-instrument callback is still in place
        backend.set_fail_creations(false);
        gauge.set(21.0, &[]);
        assert_eq!(backend.collect().value_of("temperature"), Some(21.0));
    }
}

// =============================================================================
// Other Kinds
// =============================================================================

mod kind_tests {
    use super::*;

    #[test]
    fn test_gauge_and_up_down_counter() {
        let backend = Arc::new(InMemoryBackend::new());
        let provider = MeterProvider::new(backend.clone());
        let meter = provider.meter(MeterOption::new("worker", "1"));

        let queue = meter.gauge("queue_depth", MetricOption::new()).unwrap();
        let inflight = meter.up_down_counter("inflight", MetricOption::new()).unwrap();

        queue.set(12.0, &[]);
        queue.sub(2.0, &[]);
        inflight.inc(&[]);
        inflight.inc(&[]);
        inflight.dec(&[]);

        let report = backend.collect();
        assert_eq!(report.value_of("queue_depth"), Some(10.0));
        assert_eq!(report.value_of("inflight"), Some(1.0));
    }

    #[test]
    fn test_histogram_records_synchronously() {
        let backend = Arc::new(InMemoryBackend::new());
        let provider = MeterProvider::new(backend.clone());
        let meter = provider.meter(MeterOption::new("api", "1"));
        let latency = meter
            .histogram(
                "latency_seconds",
                MetricOption::new()
                    .with_attributes(Attributes::new().with("route", "/cart"))
                    .with_buckets(vec![0.1, 0.5, 1.0]),
            )
            .unwrap();

        latency.record(0.2, &[]);
        latency.record(0.7, &[ObserveOption::new(Attributes::new().with("status", 500))]);

        let records = backend.histogram_records("latency_seconds");
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].0, 0.7);
        assert_eq!(
            records[1].1,
            Attributes::new().with("route", "/cart").with("status", 500)
        );
        assert_eq!(latency.buckets(), &[0.1, 0.5, 1.0]);
    }
}

// =============================================================================
// Prometheus Backend
// =============================================================================

mod prometheus_tests {
    use super::*;

    fn sample(text: &str, prefix: &str) -> Option<f64> {
        text.lines()
            .find(|line| line.starts_with(prefix))
            .and_then(|line| line.rsplit(' ').next())
            .and_then(|value| value.parse().ok())
    }

    #[test]
    fn test_exposition_through_meter() {
        let backend = Arc::new(PrometheusBackend::new().unwrap());
        let provider = MeterProvider::new(backend.clone());
        let meter = provider.meter(
            MeterOption::new("checkout", "1")
                .with_attributes(Attributes::new().with("service", "checkout")),
        );

        let orders = meter
            .counter("orders_total", MetricOption::new().with_help("Orders placed"))
            .unwrap();
        let queue = meter.gauge("queue_depth", MetricOption::new()).unwrap();
        let latency = meter
            .histogram(
                "latency_seconds",
                MetricOption::new().with_buckets(vec![0.5, 1.0]),
            )
            .unwrap();

        orders.inc(&[]);
        orders.inc(&[]);
        queue.set(4.0, &[]);
        latency.record(0.25, &[]);

        let text = backend.encode_text().unwrap();
        assert!(text.contains("# HELP orders_total Orders placed"));
        assert_eq!(
            sample(&text, "orders_total{service=\"checkout\"}"),
            Some(2.0)
        );
        assert_eq!(sample(&text, "queue_depth{service=\"checkout\"}"), Some(4.0));
        assert_eq!(
            sample(&text, "latency_seconds_count{service=\"checkout\"}"),
            Some(1.0)
        );
    }

    #[test]
    fn test_same_name_from_two_scopes_rejected() {
        let backend = Arc::new(PrometheusBackend::new().unwrap());
        let provider = MeterProvider::new(backend.clone());
        let frontend = provider.meter(MeterOption::new("frontend", "1"));
        let worker = provider.meter(MeterOption::new("worker", "1"));

        let requests = frontend
            .counter("requests_total", MetricOption::new())
            .unwrap();
        let err = worker
            .counter("requests_total", MetricOption::new())
            .unwrap_err();
        assert_matches!(err, Error::Internal { .. });
        assert_eq!(err.metric(), Some("requests_total"));

        requests.add(2.0, &[]);
        let text = backend.encode_text().unwrap();
        let samples = text
            .lines()
            .filter(|line| line.starts_with("requests_total"))
            .count();
        assert_eq!(samples, 1);
        assert_eq!(sample(&text, "requests_total"), Some(2.0));
    }

    #[test]
    fn test_failed_callback_counted_and_skipped() {
        let backend = Arc::new(PrometheusBackend::new().unwrap());
        let provider = MeterProvider::new(backend.clone());
        let meter = provider.meter(MeterOption::default());
        let _broken = meter
            .gauge(
                "upstream_lag",
                MetricOption::new().with_callback(|_ctx| Err(anyhow::anyhow!("no upstream"))),
            )
            .unwrap();

        let text = backend.encode_text().unwrap();
        assert!(!text.contains("upstream_lag{"));
        assert!(!text.contains("\nupstream_lag "));
        assert_eq!(backend.callback_errors(), 1);
    }
}

// =============================================================================
// Configuration
// =============================================================================

mod config_tests {
    use super::*;

    #[test]
    fn test_yaml_config_builds_metrics() {
        let config = MetricsConfig::from_yaml_str(
            r#"
instrument: billing
instrumentVersion: v3
attributes:
  region: eu
defaultBuckets: [0.5, 1.0, 5.0]
metrics:
  - name: invoices_total
    kind: counter
  - name: open_invoices
    kind: gauge
  - name: render_seconds
    kind: histogram
"#,
        )
        .unwrap();

        let backend = Arc::new(InMemoryBackend::new());
        let provider = MeterProvider::new(backend.clone());
        let meter = provider.meter(config.meter_option());
        let handles = config.build(&meter).unwrap();
        assert_eq!(handles.len(), 3);

        let MetricHandle::Counter(invoices) = &handles[0] else {
            panic!("expected a counter");
        };
        invoices.inc(&[]);
        let MetricHandle::Histogram(render) = &handles[2] else {
            panic!("expected a histogram");
        };
        assert_eq!(render.buckets(), &[0.5, 1.0, 5.0]);

        let report = backend.collect();
        assert_eq!(report.value_of("invoices_total"), Some(1.0));
        assert_eq!(
            report.observations_of("invoices_total")[0].attributes,
            Attributes::new().with("region", "eu")
        );
        assert_eq!(provider.registry().keys().len(), 2);
        assert!(provider
            .registry()
            .contains("billing@v3:open_invoices"));
    }

    #[test]
    fn test_invalid_config_code() {
        let err = MetricsConfig::from_yaml_str("metrics: [{name: '', kind: gauge}]").unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidConfiguration);
    }
}
