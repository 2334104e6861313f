//! Metric Definition
//!
//! The static configuration of one metric: naming, static attributes and the
//! optional external callback that reports its value.

use std::fmt;
use std::sync::Arc;

use super::attributes::Attributes;
use super::instrument::{InstrumentDescriptor, MetricInstrument, MetricKind};
use super::ports::ObserveContext;

/// Value reported by an external callback for one collection cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackResult {
    pub value: f64,
    pub attributes: Attributes,
}

impl CallbackResult {
    pub fn new(value: f64) -> Self {
        Self {
            value,
            attributes: Attributes::new(),
        }
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }
}

/// User-supplied callback producing a metric's value on demand.
///
/// `Ok(None)` means there is nothing to report this cycle.
pub type MetricCallback =
    Arc<dyn Fn(&ObserveContext) -> anyhow::Result<Option<CallbackResult>> + Send + Sync>;

/// Full definition of one metric.
#[derive(Clone)]
pub struct MetricInfo {
    name: String,
    help: String,
    unit: String,
    kind: MetricKind,
    instrument: MetricInstrument,
    attributes: Attributes,
    buckets: Vec<f64>,
    callback: Option<MetricCallback>,
}

impl MetricInfo {
    pub fn new(name: impl Into<String>, kind: MetricKind) -> Self {
        Self {
            name: name.into(),
            help: String::new(),
            unit: String::new(),
            kind,
            instrument: MetricInstrument::default(),
            attributes: Attributes::new(),
            buckets: Vec::new(),
            callback: None,
        }
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = help.into();
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn with_instrument(mut self, instrument: MetricInstrument) -> Self {
        self.instrument = instrument;
        self
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_buckets(mut self, buckets: Vec<f64>) -> Self {
        self.buckets = buckets;
        self
    }

    pub fn with_callback(mut self, callback: Option<MetricCallback>) -> Self {
        self.callback = callback;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn help(&self) -> &str {
        &self.help
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn instrument(&self) -> &MetricInstrument {
        &self.instrument
    }

    /// Static attributes, fixed at definition time.
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn buckets(&self) -> &[f64] {
        &self.buckets
    }

    pub fn callback(&self) -> Option<&MetricCallback> {
        self.callback.as_ref()
    }

    /// Identity used for shared-callback bookkeeping.
    ///
    /// `instrument@version:name` when an instrument is set, otherwise the
    /// bare metric name.
    pub fn key(&self) -> String {
        if self.instrument.is_anonymous() {
            return self.name.clone();
        }
        format!(
            "{}@{}:{}",
            self.instrument.name(),
            self.instrument.version(),
            self.name
        )
    }

    pub fn descriptor(&self) -> InstrumentDescriptor {
        InstrumentDescriptor {
            name: self.name.clone(),
            help: self.help.clone(),
            unit: self.unit.clone(),
            kind: self.kind,
            instrument: self.instrument.clone(),
        }
    }
}

impl fmt::Debug for MetricInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricInfo")
            .field("name", &self.name)
            .field("help", &self.help)
            .field("unit", &self.unit)
            .field("kind", &self.kind)
            .field("instrument", &self.instrument)
            .field("attributes", &self.attributes)
            .field("buckets", &self.buckets)
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}
