//! Observable Performer Construction
//!
//! The protocol every observable kind follows: build local state, decide
//! whether a per-instrument callback is needed, ask the backend for the
//! instrument, then record the key.

use std::sync::Arc;

use tracing::debug;

use super::base::BaseObservePerformer;
use super::registry::{CallbackOwner, CallbackRegistry};
use crate::domain::{
    InstrumentId, MetricBackend, MetricInfo, MetricKind, ObservableInstrument, ObserveCallback,
    ObserveContext, Observer,
};
use crate::error::{Error, Result};

/// Observable metric as seen by shared callbacks.
pub trait ObservableMetric: Send + Sync {
    /// Definition of the metric.
    fn info(&self) -> &MetricInfo;

    /// Backend identifier of the underlying instrument.
    fn instrument_id(&self) -> InstrumentId;

    /// Detach the per-instrument callback, if this metric registered one.
    fn remove_callback(&self);
}

/// State and backend handle common to counters, up-down counters and gauges.
#[derive(Debug)]
pub(crate) struct ObservablePerformer {
    info: Arc<MetricInfo>,
    base: Arc<BaseObservePerformer>,
    instrument: Arc<dyn ObservableInstrument>,
    owner: Option<Arc<CallbackOwner>>,
}

impl ObservablePerformer {
    pub(crate) fn new(
        backend: &dyn MetricBackend,
        registry: &CallbackRegistry,
        info: Arc<MetricInfo>,
    ) -> Result<Self> {
        let base = Arc::new(BaseObservePerformer::new(info.attributes().clone()));
        let key = info.key();

        let callback = if registry.contains(&key) {
            debug!(metric = %info.name(), key = %key, "Metric reported by a shared callback");
            None
        } else {
            Some(observe_callback(Arc::clone(&info), Arc::clone(&base)))
        };
        let owns_callback = callback.is_some();

        let descriptor = info.descriptor();
        let created = match info.kind() {
            MetricKind::Counter => backend.create_observable_counter(descriptor, callback),
            MetricKind::UpDownCounter => {
                backend.create_observable_up_down_counter(descriptor, callback)
            }
            MetricKind::Gauge => backend.create_observable_gauge(descriptor, callback),
            MetricKind::Histogram => {
                return Err(Error::InvalidArgument(format!(
                    "histogram \"{}\" is not an observable instrument",
                    info.name()
                )))
            }
        };
        let instrument = created.map_err(|source| Error::Internal {
            metric: info.name().to_string(),
            kind: info.kind(),
            source,
        })?;

        let owner = owns_callback
            .then(|| Arc::new(CallbackOwner::new(Arc::clone(&instrument))));
        if let Some(owner) = &owner {
            registry.claim(key, Arc::clone(owner));
        }
        debug!(
            metric = %info.name(),
            kind = %info.kind(),
            instrument = %instrument.id(),
            owns_callback,
            "Created observable performer"
        );

        Ok(Self {
            info,
            base,
            instrument,
            owner,
        })
    }

    pub(crate) fn info(&self) -> &MetricInfo {
        &self.info
    }

    pub(crate) fn base(&self) -> &BaseObservePerformer {
        &self.base
    }

    pub(crate) fn instrument_id(&self) -> InstrumentId {
        self.instrument.id()
    }

    /// Whether this performer registered its own callback and still has it.
    pub(crate) fn has_callback(&self) -> bool {
        self.owner.as_ref().is_some_and(|owner| !owner.is_detached())
    }

    /// Permanently detach the per-instrument callback. Later calls are no-ops.
    pub(crate) fn remove_callback(&self) {
        if self.owner.as_ref().is_some_and(|owner| owner.detach()) {
            debug!(metric = %self.info.name(), "Removed per-instrument callback");
        }
    }
}

/// Callback the backend invokes for one performer.
///
/// An external callback, when configured, takes priority over local state.
fn observe_callback(info: Arc<MetricInfo>, base: Arc<BaseObservePerformer>) -> ObserveCallback {
    Box::new(move |ctx: &ObserveContext, observer: &mut dyn Observer| -> Result<()> {
        let Some(callback) = info.callback() else {
            observer.observe(base.value(), &base.observe_options());
            return Ok(());
        };

        let result = callback(ctx).map_err(|source| Error::OperationFailed {
            metric: info.name().to_string(),
            source: source.into(),
        })?;
        if let Some(result) = result {
            observer.observe(
                result.value,
                &base.merge_attributes_to_observe_options(&result.attributes),
            );
        }
        Ok(())
    })
}
