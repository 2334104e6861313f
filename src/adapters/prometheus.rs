//! Prometheus Backend Adapter
//!
//! Implements the `MetricBackend` port on top of the `prometheus` crate.
//! Every scrape (`Registry::gather`) is one collection cycle: all registered
//! callbacks run and their observations become metric families.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{
    Counter, Encoder, Gauge, Histogram, HistogramOpts, IntCounter, Opts, Registry, TextEncoder,
};
use tracing::warn;

use super::collection::{CallbackTable, Observation};
use crate::domain::{
    Attributes, BackendResult, CallbackHandle, HistogramInstrument, InstrumentDescriptor,
    InstrumentId, MetricBackend, MetricKind, ObservableInstrument, ObserveCallback,
    ObserveContext, SharedCallback,
};
use crate::error::BackendError;

/// Name of the counter tracking failed callbacks.
pub const CALLBACK_ERRORS_METRIC: &str = "observa_callback_errors_total";

/// Backend exposing observations through a Prometheus registry.
pub struct PrometheusBackend {
    inner: Arc<Inner>,
    registry: Registry,
}

struct Inner {
    table: CallbackTable,
    histograms: RwLock<HashMap<String, Arc<PrometheusHistogram>>>,
    callback_errors: IntCounter,
    collect_timeout: Option<Duration>,
}

impl PrometheusBackend {
    /// Create a backend with its own registry and no collection deadline.
    pub fn new() -> BackendResult<Self> {
        Self::build(None)
    }

    /// Create a backend whose collection cycles carry a deadline `timeout`
    /// after the scrape starts.
    pub fn with_collect_timeout(timeout: Duration) -> BackendResult<Self> {
        Self::build(Some(timeout))
    }

    fn build(collect_timeout: Option<Duration>) -> BackendResult<Self> {
        let callback_errors = IntCounter::with_opts(Opts::new(
            CALLBACK_ERRORS_METRIC,
            "Metric callbacks that failed during collection",
        ))?;
        let inner = Arc::new(Inner {
            table: CallbackTable::new(),
            histograms: RwLock::new(HashMap::new()),
            callback_errors,
            collect_timeout,
        });

        let registry = Registry::new();
        registry.register(Box::new(PrometheusCollector {
            inner: Arc::clone(&inner),
        }))?;
        Ok(Self { inner, registry })
    }

    /// Registry this backend is registered with.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Also expose this backend through `registry`.
    pub fn register(&self, registry: &Registry) -> BackendResult<()> {
        registry.register(Box::new(PrometheusCollector {
            inner: Arc::clone(&self.inner),
        }))?;
        Ok(())
    }

    /// Run a collection cycle and return the resulting families.
    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    /// Run a collection cycle and render it in the text exposition format.
    pub fn encode_text(&self) -> BackendResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| BackendError::Rejected(e.to_string()))
    }

    /// Callback failures seen so far.
    pub fn callback_errors(&self) -> u64 {
        self.inner.callback_errors.get()
    }
}

impl std::fmt::Debug for PrometheusBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusBackend")
            .field("table", &self.inner.table)
            .field("histograms", &self.inner.histograms.read().len())
            .field("collect_timeout", &self.inner.collect_timeout)
            .finish()
    }
}

impl MetricBackend for PrometheusBackend {
    fn create_observable_counter(
        &self,
        descriptor: InstrumentDescriptor,
        callback: Option<ObserveCallback>,
    ) -> BackendResult<Arc<dyn ObservableInstrument>> {
        validate_name(&descriptor)?;
        self.inner.table.create_observable(descriptor, callback)
    }

    fn create_observable_up_down_counter(
        &self,
        descriptor: InstrumentDescriptor,
        callback: Option<ObserveCallback>,
    ) -> BackendResult<Arc<dyn ObservableInstrument>> {
        validate_name(&descriptor)?;
        self.inner.table.create_observable(descriptor, callback)
    }

    fn create_observable_gauge(
        &self,
        descriptor: InstrumentDescriptor,
        callback: Option<ObserveCallback>,
    ) -> BackendResult<Arc<dyn ObservableInstrument>> {
        validate_name(&descriptor)?;
        self.inner.table.create_observable(descriptor, callback)
    }

    fn create_histogram(
        &self,
        descriptor: InstrumentDescriptor,
        buckets: &[f64],
    ) -> BackendResult<Arc<dyn HistogramInstrument>> {
        validate_name(&descriptor)?;
        self.inner.table.declare(&descriptor)?;

        let histogram = self
            .inner
            .histograms
            .write()
            .entry(descriptor.name.clone())
            .or_insert_with(|| {
                Arc::new(PrometheusHistogram {
                    descriptor,
                    buckets: buckets.to_vec(),
                    series: RwLock::new(HashMap::new()),
                })
            })
            .clone();
        Ok(histogram)
    }

    fn register_callback(
        &self,
        callback: SharedCallback,
        instruments: &[InstrumentId],
    ) -> BackendResult<Arc<dyn CallbackHandle>> {
        self.inner.table.register_shared(callback, instruments)
    }
}

// =============================================================================
// Collector
// =============================================================================

/// Bridges the callback table into a Prometheus registry.
struct PrometheusCollector {
    inner: Arc<Inner>,
}

impl Collector for PrometheusCollector {
    fn desc(&self) -> Vec<&Desc> {
        self.inner.callback_errors.desc()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let ctx = match self.inner.collect_timeout {
            Some(timeout) => ObserveContext::with_timeout(timeout),
            None => ObserveContext::new(),
        };
        let report = self.inner.table.collect(&ctx);
        self.inner.callback_errors.inc_by(report.errors.len() as u64);

        let mut families = Vec::with_capacity(report.observations.len());
        let mut descriptors: HashMap<&str, Option<InstrumentDescriptor>> = HashMap::new();
        for observation in &report.observations {
            let descriptor = descriptors
                .entry(observation.name.as_str())
                .or_insert_with(|| self.inner.table.descriptor(&observation.name));
            let Some(descriptor) = descriptor else {
                continue;
            };
            match series(descriptor, observation) {
                Ok(mut collected) => families.append(&mut collected),
                Err(err) => {
                    warn!(metric = %observation.name, error = %err, "Dropped observation");
                }
            }
        }

        for histogram in self.inner.histograms.read().values() {
            families.extend(histogram.collect());
        }
        families.extend(self.inner.callback_errors.collect());
        families
    }
}

/// One observation as a single-sample metric family.
fn series(
    descriptor: &InstrumentDescriptor,
    observation: &Observation,
) -> prometheus::Result<Vec<MetricFamily>> {
    let opts = Opts::new(metric_name(&descriptor.name), help_text(descriptor))
        .const_labels(labels(&observation.attributes).into_iter().collect());

    match descriptor.kind {
        MetricKind::Counter => {
            if observation.value.is_nan() || observation.value < 0.0 {
                warn!(
                    metric = %descriptor.name,
                    value = observation.value,
                    "Skipped negative counter observation"
                );
                return Ok(Vec::new());
            }
            let counter = Counter::with_opts(opts)?;
            counter.inc_by(observation.value);
            Ok(counter.collect())
        }
        MetricKind::UpDownCounter | MetricKind::Gauge => {
            let gauge = Gauge::with_opts(opts)?;
            gauge.set(observation.value);
            Ok(gauge.collect())
        }
        MetricKind::Histogram => Ok(Vec::new()),
    }
}

// =============================================================================
// Histogram
// =============================================================================

/// Histogram keeping one Prometheus histogram per label set.
struct PrometheusHistogram {
    descriptor: InstrumentDescriptor,
    buckets: Vec<f64>,
    series: RwLock<HashMap<BTreeMap<String, String>, Histogram>>,
}

impl PrometheusHistogram {
    fn collect(&self) -> Vec<MetricFamily> {
        self.series
            .read()
            .values()
            .flat_map(|histogram| histogram.collect())
            .collect()
    }
}

impl std::fmt::Debug for PrometheusHistogram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusHistogram")
            .field("name", &self.descriptor.name)
            .field("buckets", &self.buckets)
            .field("series", &self.series.read().len())
            .finish()
    }
}

impl HistogramInstrument for PrometheusHistogram {
    fn descriptor(&self) -> &InstrumentDescriptor {
        &self.descriptor
    }

    fn record(&self, value: f64, attributes: &Attributes) {
        let labels = labels(attributes);
        if let Some(histogram) = self.series.read().get(&labels) {
            histogram.observe(value);
            return;
        }

        let mut series = self.series.write();
        if let Some(histogram) = series.get(&labels) {
            histogram.observe(value);
            return;
        }
        let name = metric_name(&self.descriptor.name);
        let opts = HistogramOpts::new(name, help_text(&self.descriptor))
            .const_labels(labels.clone().into_iter().collect())
            .buckets(self.buckets.clone());
        match Histogram::with_opts(opts) {
            Ok(histogram) => {
                histogram.observe(value);
                series.insert(labels, histogram);
            }
            Err(err) => {
                warn!(metric = %self.descriptor.name, error = %err, "Dropped histogram record");
            }
        }
    }
}

// =============================================================================
// Naming
// =============================================================================

fn validate_name(descriptor: &InstrumentDescriptor) -> BackendResult<()> {
    if descriptor.name.trim().is_empty() {
        return Err(BackendError::InvalidInstrument {
            name: descriptor.name.clone(),
            reason: "metric name is empty".to_string(),
        });
    }
    Ok(())
}

/// Prometheus requires a help string; fall back to the metric name.
fn help_text(descriptor: &InstrumentDescriptor) -> String {
    if descriptor.help.is_empty() {
        descriptor.name.clone()
    } else {
        descriptor.help.clone()
    }
}

/// Map a metric name onto `[a-zA-Z_:][a-zA-Z0-9_:]*`.
fn metric_name(name: &str) -> String {
    let mut sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == ':' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.starts_with(|c: char| c.is_ascii_digit()) {
        sanitized.insert(0, '_');
    }
    sanitized
}

/// Map an attribute key onto `[a-zA-Z_][a-zA-Z0-9_]*`, avoiding the
/// reserved `__` prefix.
fn label_name(key: &str) -> String {
    let mut sanitized: String = key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if sanitized.starts_with("__") {
        sanitized = format!("_{}", sanitized.trim_start_matches('_'));
    }
    if sanitized.is_empty() || sanitized.starts_with(|c: char| c.is_ascii_digit()) {
        sanitized.insert(0, '_');
    }
    sanitized
}

/// Attributes as const labels; the last value of a repeated key wins.
fn labels(attributes: &Attributes) -> BTreeMap<String, String> {
    attributes
        .iter()
        .map(|attribute| (label_name(&attribute.key), attribute.value.to_string()))
        .collect()
}
