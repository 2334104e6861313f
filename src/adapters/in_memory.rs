//! In-Memory Backend Adapter
//!
//! Implements the `MetricBackend` port without any exporter. Collection
//! cycles run on demand, which makes it the backend of choice for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::collection::{CallbackTable, CollectReport};
use crate::domain::{
    Attributes, BackendResult, CallbackHandle, HistogramInstrument, InstrumentDescriptor,
    InstrumentId, MetricBackend, ObservableInstrument, ObserveCallback, ObserveContext,
    SharedCallback,
};
use crate::error::BackendError;

/// Backend keeping everything in memory.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    table: CallbackTable,
    histograms: RwLock<HashMap<String, Arc<InMemoryHistogram>>>,
    fail_creations: AtomicBool,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent create or register call fail.
    pub fn set_fail_creations(&self, fail: bool) {
        self.fail_creations.store(fail, Ordering::Release);
    }

    /// Run one collection cycle with a default context.
    pub fn collect(&self) -> CollectReport {
        self.table.collect(&ObserveContext::new())
    }

    /// Run one collection cycle with the given context.
    pub fn collect_with(&self, ctx: &ObserveContext) -> CollectReport {
        self.table.collect(ctx)
    }

    /// Total callbacks ever registered.
    pub fn callback_registrations(&self) -> usize {
        self.table.callback_registrations()
    }

    /// Callbacks ever registered for instruments named `name`.
    pub fn callback_registrations_for(&self, name: &str) -> usize {
        self.table.callback_registrations_for(name)
    }

    /// Observable instruments created so far.
    pub fn instrument_count(&self) -> usize {
        self.table.instrument_count()
    }

    /// Values recorded into the histogram named `name`.
    pub fn histogram_records(&self, name: &str) -> Vec<(f64, Attributes)> {
        self.histograms
            .read()
            .get(name)
            .map(|h| h.records.read().clone())
            .unwrap_or_default()
    }

    fn check_available(&self) -> BackendResult<()> {
        if self.fail_creations.load(Ordering::Acquire) {
            return Err(BackendError::Rejected(
                "in-memory backend is refusing new instruments".to_string(),
            ));
        }
        Ok(())
    }
}

impl MetricBackend for InMemoryBackend {
    fn create_observable_counter(
        &self,
        descriptor: InstrumentDescriptor,
        callback: Option<ObserveCallback>,
    ) -> BackendResult<Arc<dyn ObservableInstrument>> {
        self.check_available()?;
        self.table.create_observable(descriptor, callback)
    }

    fn create_observable_up_down_counter(
        &self,
        descriptor: InstrumentDescriptor,
        callback: Option<ObserveCallback>,
    ) -> BackendResult<Arc<dyn ObservableInstrument>> {
        self.check_available()?;
        self.table.create_observable(descriptor, callback)
    }

    fn create_observable_gauge(
        &self,
        descriptor: InstrumentDescriptor,
        callback: Option<ObserveCallback>,
    ) -> BackendResult<Arc<dyn ObservableInstrument>> {
        self.check_available()?;
        self.table.create_observable(descriptor, callback)
    }

    fn create_histogram(
        &self,
        descriptor: InstrumentDescriptor,
        buckets: &[f64],
    ) -> BackendResult<Arc<dyn HistogramInstrument>> {
        self.check_available()?;
        self.table.declare(&descriptor)?;

        let histogram = self
            .histograms
            .write()
            .entry(descriptor.name.clone())
            .or_insert_with(|| {
                Arc::new(InMemoryHistogram {
                    descriptor,
                    buckets: buckets.to_vec(),
                    records: RwLock::new(Vec::new()),
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
        self.check_available()?;
        self.table.register_shared(callback, instruments)
    }
}

/// Histogram keeping every recorded value.
#[derive(Debug)]
pub struct InMemoryHistogram {
    descriptor: InstrumentDescriptor,
    buckets: Vec<f64>,
    records: RwLock<Vec<(f64, Attributes)>>,
}

impl InMemoryHistogram {
    pub fn buckets(&self) -> &[f64] {
        &self.buckets
    }
}

impl HistogramInstrument for InMemoryHistogram {
    fn descriptor(&self) -> &InstrumentDescriptor {
        &self.descriptor
    }

    fn record(&self, value: f64, attributes: &Attributes) {
        self.records.write().push((value, attributes.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MetricInstrument, MetricKind};
    use assert_matches::assert_matches;

    fn descriptor(name: &str, kind: MetricKind) -> InstrumentDescriptor {
        InstrumentDescriptor {
            name: name.to_string(),
            help: "help".to_string(),
            unit: String::new(),
            kind,
            instrument: MetricInstrument::new("test", "0.1"),
        }
    }

    #[test]
    fn test_fail_creations() {
        let backend = InMemoryBackend::new();
        backend.set_fail_creations(true);
        let result = backend.create_observable_counter(descriptor("c", MetricKind::Counter), None);
        assert_matches!(result, Err(BackendError::Rejected(_)));
        assert_eq!(backend.instrument_count(), 0);

        backend.set_fail_creations(false);
        assert!(backend
            .create_observable_counter(descriptor("c", MetricKind::Counter), None)
            .is_ok());
    }

    #[test]
    fn test_histogram_shared_by_name() {
        let backend = InMemoryBackend::new();
        let first = backend
            .create_histogram(descriptor("latency", MetricKind::Histogram), &[0.1, 1.0])
            .unwrap();
        let second = backend
            .create_histogram(descriptor("latency", MetricKind::Histogram), &[0.1, 1.0])
            .unwrap();

        first.record(0.2, &Attributes::new());
        second.record(0.3, &Attributes::new());
        assert_eq!(backend.histogram_records("latency").len(), 2);
        assert!(backend.histogram_records("missing").is_empty());
    }

    #[test]
    fn test_histogram_conflicts_with_counter() {
        let backend = InMemoryBackend::new();
        backend
            .create_observable_counter(descriptor("latency", MetricKind::Counter), None)
            .unwrap();
        let result = backend.create_histogram(descriptor("latency", MetricKind::Histogram), &[]);
        assert_matches!(result, Err(BackendError::Conflict { .. }));
    }
}
