//! Counter Performer
//!
//! Monotonic counter recorded locally and reported through a callback.

use std::sync::Arc;

use super::observable::{ObservableMetric, ObservablePerformer};
use super::registry::CallbackRegistry;
use crate::domain::{InstrumentId, MetricBackend, MetricInfo, ObserveOption};
use crate::error::{Error, Result};

/// Observable counter.
///
/// `add` only mutates local state; the backend reads it when it runs a
/// collection cycle.
#[derive(Debug)]
pub struct CounterPerformer {
    inner: ObservablePerformer,
}

impl CounterPerformer {
    /// Create the performer and its backend instrument.
    pub fn new(
        backend: &dyn MetricBackend,
        registry: &CallbackRegistry,
        info: Arc<MetricInfo>,
    ) -> Result<Self> {
        Ok(Self {
            inner: ObservablePerformer::new(backend, registry, info)?,
        })
    }

    /// Increment the counter by 1.
    pub fn inc(&self, options: &[ObserveOption]) {
        self.add(1.0, options);
    }

    /// Add `increment` to the counter.
    ///
    /// # Panics
    ///
    /// Panics if `increment` is negative or NaN. Use [`try_add`](Self::try_add)
    /// to get an error instead.
    pub fn add(&self, increment: f64, options: &[ObserveOption]) {
        if let Err(err) = self.try_add(increment, options) {
            panic!("{}", err);
        }
    }

    /// Add `increment`, rejecting negative or NaN values with
    /// [`Error::InvalidArgument`].
    pub fn try_add(&self, increment: f64, options: &[ObserveOption]) -> Result<()> {
        if increment.is_nan() || increment < 0.0 {
            return Err(Error::InvalidArgument(format!(
                "counter \"{}\" cannot be increased by {}",
                self.inner.info().name(),
                increment
            )));
        }
        let base = self.inner.base();
        base.add_value(increment);
        base.set_observe_options_by_option(options);
        Ok(())
    }

    /// Detach the per-instrument callback. Permanent; local updates continue
    /// to be accepted but are no longer reported.
    pub fn remove_callback(&self) {
        self.inner.remove_callback();
    }

    /// Locally accumulated value.
    pub fn value(&self) -> f64 {
        self.inner.base().value()
    }

    pub fn info(&self) -> &MetricInfo {
        self.inner.info()
    }

    /// True while this counter's own callback is registered with the backend.
    pub fn has_callback(&self) -> bool {
        self.inner.has_callback()
    }
}

impl ObservableMetric for CounterPerformer {
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

// =============================================================================
// Tests
// =============================================================================
