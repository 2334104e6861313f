//! Meter Provider
//!
//! Entry point owning the backend and the callback registry. Hands out one
//! meter per instrumentation scope.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use super::meter::Meter;
use super::option::MeterOption;
use crate::domain::{MetricBackend, MetricInfo, MetricInstrument};
use crate::performer::CallbackRegistry;

/// Provider of meters sharing one backend and one callback registry.
pub struct MeterProvider {
    backend: Arc<dyn MetricBackend>,
    registry: Arc<CallbackRegistry>,
    meters: DashMap<MetricInstrument, Arc<Meter>>,
}

impl MeterProvider {
    /// Create a provider with a fresh callback registry.
    pub fn new(backend: Arc<dyn MetricBackend>) -> Self {
        Self::with_registry(backend, Arc::new(CallbackRegistry::new()))
    }

    /// Create a provider sharing an existing callback registry.
    pub fn with_registry(backend: Arc<dyn MetricBackend>, registry: Arc<CallbackRegistry>) -> Self {
        Self {
            backend,
            registry,
            meters: DashMap::new(),
        }
    }

    /// Meter for the scope named by `option`.
    ///
    /// Meters are cached per (instrument, version); the attributes of the
    /// first request for a scope are the ones kept.
    pub fn meter(&self, option: MeterOption) -> Arc<Meter> {
        let instrument = option.metric_instrument();
        let meter = self.meters.entry(instrument).or_insert_with(|| {
            debug!(instrument = %option.metric_instrument(), "Created meter");
            Arc::new(Meter::new(
                Arc::clone(&self.backend),
                Arc::clone(&self.registry),
                option,
            ))
        });
        Arc::clone(meter.value())
    }

    /// Instrumentation scopes with a meter, sorted.
    pub fn instruments(&self) -> Vec<MetricInstrument> {
        let mut instruments: Vec<MetricInstrument> =
            self.meters.iter().map(|entry| entry.key().clone()).collect();
        instruments.sort();
        instruments
    }

    /// Definitions of every metric created through this provider.
    pub fn metrics(&self) -> Vec<Arc<MetricInfo>> {
        let mut metrics: Vec<Arc<MetricInfo>> = self
            .meters
            .iter()
            .flat_map(|entry| entry.value().metrics())
            .collect();
        metrics.sort_by_key(|info| info.key());
        metrics
    }

    pub fn registry(&self) -> &Arc<CallbackRegistry> {
        &self.registry
    }

    pub fn backend(&self) -> &Arc<dyn MetricBackend> {
        &self.backend
    }
}

impl std::fmt::Debug for MeterProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeterProvider")
            .field("meters", &self.meters.len())
            .field("registry", &self.registry)
            .finish()
    }
}
