//! Domain Layer
//!
//! Value objects and ports shared by performers and backend adapters.
//!
//! - **Attributes** (`attributes.rs`) - Ordered key/value labels
//! - **Instrument** (`instrument.rs`) - Instrument identity and descriptors
//! - **Metric** (`metric.rs`) - Metric definitions and external callbacks
//! - **Ports** (`ports.rs`) - Trait abstractions for the metrics backend

pub mod attributes;
pub mod instrument;
pub mod metric;
pub mod ports;

pub use attributes::{Attribute, AttributeValue, Attributes, ObserveOption};
pub use instrument::{InstrumentDescriptor, MetricInstrument, MetricKind};
pub use metric::{CallbackResult, MetricCallback, MetricInfo};
pub use ports::{
    BackendResult, CallbackHandle, HistogramInstrument, InstrumentId, MetricBackend,
    MultiObserver, ObservableInstrument, ObserveCallback, ObserveContext, Observer,
    SharedCallback,
};
