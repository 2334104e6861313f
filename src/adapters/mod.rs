//! Backend Adapters
//!
//! Implementations of the `MetricBackend` port, following the Port/Adapter
//! (Hexagonal) architecture pattern.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                     Domain Layer                         │
//! │   MetricBackend │ ObservableInstrument │ CallbackHandle  │
//! └─────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                Adapters (This Module)                    │
//! │      PrometheusBackend │ InMemoryBackend                 │
//! │              └──── CallbackTable ────┘                   │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use observa::adapters::PrometheusBackend;
//! use observa::meter::{MeterOption, MeterProvider, MetricOption};
//!
//! let backend = Arc::new(PrometheusBackend::new()?);
//! let provider = MeterProvider::new(backend.clone());
//! let meter = provider.meter(MeterOption::new("http", "v1"));
//! let requests = meter.counter("requests_total", MetricOption::new())?;
//! requests.inc(&[]);
//!
//! println!("{}", backend.encode_text()?);
//! ```

mod collection;
mod in_memory;
mod prometheus;

pub use collection::{CallbackTable, CollectReport, Observation};
pub use in_memory::{InMemoryBackend, InMemoryHistogram};
pub use self::prometheus::{PrometheusBackend, CALLBACK_ERRORS_METRIC};
