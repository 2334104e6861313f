//! UpDownCounter Performer

use std::sync::Arc;

use super::observable::{ObservableMetric, ObservablePerformer};
use super::registry::CallbackRegistry;
use crate::domain::{InstrumentId, MetricBackend, MetricInfo, ObserveOption};
use crate::error::Result;

/// Observable counter that may go down as well as up.
#[derive(Debug)]
pub struct UpDownCounterPerformer {
    inner: ObservablePerformer,
}

impl UpDownCounterPerformer {
    pub fn new(
        backend: &dyn MetricBackend,
        registry: &CallbackRegistry,
        info: Arc<MetricInfo>,
    ) -> Result<Self> {
        Ok(Self {
            inner: ObservablePerformer::new(backend, registry, info)?,
        })
    }

    pub fn inc(&self, options: &[ObserveOption]) {
        self.add(1.0, options);
    }

    pub fn dec(&self, options: &[ObserveOption]) {
        self.add(-1.0, options);
    }

    /// Add `delta`, which may be negative.
    pub fn add(&self, delta: f64, options: &[ObserveOption]) {
        let base = self.inner.base();
        base.add_value(delta);
        base.set_observe_options_by_option(options);
    }

    pub fn remove_callback(&self) {
        self.inner.remove_callback();
    }

    pub fn value(&self) -> f64 {
        self.inner.base().value()
    }

    pub fn info(&self) -> &MetricInfo {
        self.inner.info()
    }

    pub fn has_callback(&self) -> bool {
        self.inner.has_callback()
    }
}

impl ObservableMetric for UpDownCounterPerformer {
    fn info(&self) -> &MetricInfo {
        self.inner.info()
    }

    fn instrument_id(&self) -> InstrumentId {
        self.inner.instrument_id()
    }

    fn remove_callback(&self) {
        self.inner.remove_callback();
    }
}
