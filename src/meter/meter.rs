//! Meter
//!
//! Creates performers for one instrumentation scope and registers shared
//! callbacks that report for several metrics at once.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use super::option::{MeterOption, MetricOption};
use crate::domain::{
    Attributes, CallbackHandle, InstrumentId, MetricBackend, MetricInfo, MetricInstrument,
    MetricKind, MultiObserver, ObserveContext, SharedCallback,
};
use crate::error::{Error, Result};
use crate::performer::{
    CallbackRegistry, CounterPerformer, GaugePerformer, HistogramPerformer, ObservableMetric,
    UpDownCounterPerformer,
};

/// Performer of any kind, as produced by [`Meter::create`].
#[derive(Debug)]
pub enum MetricHandle {
    Counter(CounterPerformer),
    UpDownCounter(UpDownCounterPerformer),
    Gauge(GaugePerformer),
    Histogram(HistogramPerformer),
}

impl MetricHandle {
    pub fn info(&self) -> &MetricInfo {
        match self {
            MetricHandle::Counter(m) => m.info(),
            MetricHandle::UpDownCounter(m) => m.info(),
            MetricHandle::Gauge(m) => m.info(),
            MetricHandle::Histogram(m) => m.info(),
        }
    }

    pub fn kind(&self) -> MetricKind {
        self.info().kind()
    }

    /// The handle as an observable metric; `None` for histograms.
    pub fn as_observable(&self) -> Option<&dyn ObservableMetric> {
        match self {
            MetricHandle::Counter(m) => Some(m),
            MetricHandle::UpDownCounter(m) => Some(m),
            MetricHandle::Gauge(m) => Some(m),
            MetricHandle::Histogram(_) => None,
        }
    }
}

/// Factory for the metrics of one instrumentation scope.
pub struct Meter {
    backend: Arc<dyn MetricBackend>,
    registry: Arc<CallbackRegistry>,
    instrument: MetricInstrument,
    attributes: Attributes,
    metrics: RwLock<Vec<Arc<MetricInfo>>>,
}

impl Meter {
    pub fn new(
        backend: Arc<dyn MetricBackend>,
        registry: Arc<CallbackRegistry>,
        option: MeterOption,
    ) -> Self {
        Self {
            backend,
            registry,
            instrument: option.metric_instrument(),
            attributes: option.attributes,
            metrics: RwLock::new(Vec::new()),
        }
    }

    pub fn instrument(&self) -> &MetricInstrument {
        &self.instrument
    }

    /// Attributes added to every metric of this meter.
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Definitions of every metric created so far.
    pub fn metrics(&self) -> Vec<Arc<MetricInfo>> {
        self.metrics.read().clone()
    }

    pub fn counter(&self, name: &str, option: MetricOption) -> Result<CounterPerformer> {
        let info = self.metric_info(name, MetricKind::Counter, option)?;
        let counter =
            CounterPerformer::new(self.backend.as_ref(), &self.registry, Arc::clone(&info))?;
        self.metrics.write().push(info);
        Ok(counter)
    }

    pub fn up_down_counter(
        &self,
        name: &str,
        option: MetricOption,
    ) -> Result<UpDownCounterPerformer> {
        let info = self.metric_info(name, MetricKind::UpDownCounter, option)?;
        let counter =
            UpDownCounterPerformer::new(self.backend.as_ref(), &self.registry, Arc::clone(&info))?;
        self.metrics.write().push(info);
        Ok(counter)
    }

    pub fn gauge(&self, name: &str, option: MetricOption) -> Result<GaugePerformer> {
        let info = self.metric_info(name, MetricKind::Gauge, option)?;
        let gauge = GaugePerformer::new(self.backend.as_ref(), &self.registry, Arc::clone(&info))?;
        self.metrics.write().push(info);
        Ok(gauge)
    }

    pub fn histogram(&self, name: &str, option: MetricOption) -> Result<HistogramPerformer> {
        if option.callback.is_some() {
            return Err(Error::InvalidArgument(format!(
                "histogram \"{}\" cannot take a callback",
                name
            )));
        }
        let info = self.metric_info(name, MetricKind::Histogram, option)?;
        let histogram = HistogramPerformer::new(self.backend.as_ref(), Arc::clone(&info))?;
        self.metrics.write().push(info);
        Ok(histogram)
    }

    /// Create a metric of the given kind.
    pub fn create(
        &self,
        name: &str,
        kind: MetricKind,
        option: MetricOption,
    ) -> Result<MetricHandle> {
        Ok(match kind {
            MetricKind::Counter => MetricHandle::Counter(self.counter(name, option)?),
            MetricKind::UpDownCounter => {
                MetricHandle::UpDownCounter(self.up_down_counter(name, option)?)
            }
            MetricKind::Gauge => MetricHandle::Gauge(self.gauge(name, option)?),
            MetricKind::Histogram => MetricHandle::Histogram(self.histogram(name, option)?),
        })
    }

    /// Register one callback that reports for all of `metrics`.
    ///
    /// The shared callback is registered first; per-instrument callbacks
    /// reporting the covered keys are then detached, whichever performer
    /// registered them, and the keys recorded, so performers created later
    /// for the same keys register nothing.
    ///
    /// Each metric name may appear once in `metrics`.
    pub fn register_callback<F>(
        &self,
        metrics: &[&dyn ObservableMetric],
        callback: F,
    ) -> Result<CallbackRegistration>
    where
        F: Fn(&ObserveContext, &mut MetricObserver<'_>) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        if metrics.is_empty() {
            return Err(Error::InvalidArgument(
                "shared callback must cover at least one metric".to_string(),
            ));
        }

        let mut routes = HashMap::with_capacity(metrics.len());
        let mut instruments = Vec::with_capacity(metrics.len());
        let mut keys = Vec::with_capacity(metrics.len());
        for metric in metrics {
            let info = metric.info();
            let route = Route {
                instrument: metric.instrument_id(),
                attributes: info.attributes().clone(),
            };
            if routes.insert(info.name().to_string(), route).is_some() {
                return Err(Error::InvalidArgument(format!(
                    "metric \"{}\" is listed more than once in a shared callback",
                    info.name()
                )));
            }
            instruments.push(metric.instrument_id());
            keys.push(info.key());
        }
        let label = metrics
            .iter()
            .map(|m| m.info().name())
            .collect::<Vec<_>>()
            .join(",");

        let callback_label = label.clone();
        let shared: SharedCallback = Box::new(
            move |ctx: &ObserveContext, observer: &mut dyn MultiObserver| -> Result<()> {
                let mut metric_observer = MetricObserver {
                    routes: &routes,
                    inner: observer,
                };
                callback(ctx, &mut metric_observer).map_err(|source| Error::OperationFailed {
                    metric: callback_label.clone(),
                    source: source.into(),
                })
            },
        );

        let handle = self
            .backend
            .register_callback(shared, &instruments)
            .map_err(|source| Error::Registration {
                metrics: label.clone(),
                source,
            })?;

        for metric in metrics {
            metric.remove_callback();
        }
        for key in &keys {
            // the performer reporting this key may not be among `metrics`
            if let Some(owner) = self.registry.cover(key.clone()) {
                owner.detach();
            }
        }
        debug!(metrics = %label, "Registered shared callback");

        Ok(CallbackRegistration { handle, keys })
    }

    fn metric_info(
        &self,
        name: &str,
        kind: MetricKind,
        option: MetricOption,
    ) -> Result<Arc<MetricInfo>> {
        if name.trim().is_empty() {
            return Err(Error::InvalidArgument("metric name cannot be empty".to_string()));
        }
        let info = MetricInfo::new(name, kind)
            .with_help(option.help)
            .with_unit(option.unit)
            .with_instrument(self.instrument.clone())
            .with_attributes(self.attributes.concat(&option.attributes))
            .with_buckets(option.buckets)
            .with_callback(option.callback);
        Ok(Arc::new(info))
    }
}

impl std::fmt::Debug for Meter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Meter")
            .field("instrument", &self.instrument)
            .field("attributes", &self.attributes)
            .field("metrics", &self.metrics.read().len())
            .finish()
    }
}

#[derive(Debug, Clone)]
struct Route {
    instrument: InstrumentId,
    attributes: Attributes,
}

/// Observer handed to shared callbacks; routes values by metric name.
pub struct MetricObserver<'a> {
    routes: &'a HashMap<String, Route>,
    inner: &'a mut dyn MultiObserver,
}

impl MetricObserver<'_> {
    /// Report `value` for `metric` with its static attributes plus `attributes`.
    ///
    /// Returns false, reporting nothing, when `metric` is not covered by
    /// this callback.
    pub fn observe(&mut self, metric: &str, value: f64, attributes: &Attributes) -> bool {
        let Some(route) = self.routes.get(metric) else {
            warn!(metric = %metric, "Shared callback observed an unregistered metric");
            return false;
        };
        self.inner
            .observe(route.instrument, value, &route.attributes.concat(attributes));
        true
    }
}

/// Handle for a shared callback registration.
#[derive(Debug)]
pub struct CallbackRegistration {
    handle: Arc<dyn CallbackHandle>,
    keys: Vec<String>,
}

impl CallbackRegistration {
    /// Detach the shared callback. Returns true on the first call.
    ///
    /// Covered keys stay in the registry, so the metrics are not reported
    /// again by their own callbacks.
    pub fn unregister(&self) -> bool {
        self.handle.unregister()
    }

    /// Keys of the metrics this callback reports for.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}
