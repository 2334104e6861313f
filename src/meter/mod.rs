//! Meters
//!
//! - **Option** (`option.rs`) - Meter and per-metric settings
//! - **Meter** (`meter.rs`) - Performer factory and shared callbacks
//! - **Provider** (`provider.rs`) - Meter cache over one backend

#[allow(clippy::module_inception)]
pub mod meter;
pub mod option;
pub mod provider;

pub use meter::{CallbackRegistration, Meter, MetricHandle, MetricObserver};
pub use option::{MeterOption, MetricOption};
pub use provider::MeterProvider;
