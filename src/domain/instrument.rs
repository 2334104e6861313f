//! Instrument Identity
//!
//! Value objects naming the instrumentation scope that owns a metric and the
//! shape of the instrument a backend is asked to create.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Instrumentation scope identity: an immutable (name, version) pair.
///
/// Exporters use it to look up which component registered a metric. No
/// uniqueness is enforced here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MetricInstrument {
    name: String,
    version: String,
}

impl MetricInstrument {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// Instrument name of the metric.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Instrument version of the metric.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// True when no instrument name was given.
    pub fn is_anonymous(&self) -> bool {
        self.name.is_empty()
    }
}

impl fmt::Display for MetricInstrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// Kind of metric instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Counter,
    UpDownCounter,
    Gauge,
    Histogram,
}

impl MetricKind {
    /// Observable kinds report through callbacks; histograms record synchronously.
    pub fn is_observable(&self) -> bool {
        !matches!(self, MetricKind::Histogram)
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricKind::Counter => write!(f, "counter"),
            MetricKind::UpDownCounter => write!(f, "up_down_counter"),
            MetricKind::Gauge => write!(f, "gauge"),
            MetricKind::Histogram => write!(f, "histogram"),
        }
    }
}

/// What a backend needs to know to create an instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentDescriptor {
    pub name: String,
    pub help: String,
    pub unit: String,
    pub kind: MetricKind,
    pub instrument: MetricInstrument,
}

impl InstrumentDescriptor {
    /// Two descriptors describe the same instrument if every field matches,
    /// owning scope included. A name is exported once, so two scopes cannot
    /// share it.
    pub fn is_compatible(&self, other: &InstrumentDescriptor) -> bool {
        self == other
    }
}
