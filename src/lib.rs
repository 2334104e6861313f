//! Observa - Observable Metric Performers
//!
//! Metric instruments that the application updates synchronously and that a
//! metrics backend reads on its own schedule through registered callbacks.
//!
//! # Architecture
//!
//! ```text
//! application ──add/set──▶ Performer ──local state──┐
//!                                                    │
//! backend ──collection cycle──▶ callback ◀───────────┘
//!                                 │
//!                                 └──▶ observation (value, attributes)
//! ```
//!
//! A performer keeps its value in an atomic cell and its latest attributes in
//! a narrow lock. Creating one registers a callback with the backend unless
//! the metric's key is already covered by a callback, which keeps repeated
//! instances of the same metric from reporting twice.
//!
//! # Modules
//!
//! - [`adapters`] - Backend implementations (Prometheus, in-memory)
//! - [`config`] - YAML/JSON metric declarations
//! - [`domain`] - Attributes, instrument identity, backend ports
//! - [`error`] - Error types
//! - [`meter`] - Meters and the meter provider
//! - [`performer`] - Counter, up-down counter, gauge and histogram performers

pub mod adapters;
pub mod config;
pub mod domain;
pub mod error;
pub mod meter;
pub mod performer;

// Re-export commonly used types
pub use adapters::{InMemoryBackend, PrometheusBackend};
pub use config::MetricsConfig;
pub use domain::{
    Attribute, AttributeValue, Attributes, CallbackResult, MetricInstrument, MetricKind,
    ObserveContext, ObserveOption,
};
pub use error::{BackendError, Error, ErrorCode, Result};
pub use meter::{Meter, MeterOption, MeterProvider, MetricOption};
pub use performer::{
    CallbackRegistry, CounterPerformer, GaugePerformer, HistogramPerformer,
    UpDownCounterPerformer,
};
