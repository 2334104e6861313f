//! Metric Performers
//!
//! Application-facing handles for each metric kind.
//!
//! - **Base** (`base.rs`) - Atomic value and attribute state
//! - **Registry** (`registry.rs`) - Keys already covered by a callback
//! - **Observable** (`observable.rs`) - Shared construction protocol
//! - **Counter** / **UpDownCounter** / **Gauge** - Observable kinds
//! - **Histogram** (`histogram.rs`) - Synchronous recording

pub mod base;
pub mod counter;
pub mod gauge;
pub mod histogram;
pub mod observable;
pub mod registry;
pub mod up_down_counter;

mod proptest;

pub use base::BaseObservePerformer;
pub use counter::CounterPerformer;
pub use gauge::GaugePerformer;
pub use histogram::{HistogramPerformer, DEFAULT_BUCKETS};
pub use observable::ObservableMetric;
pub use registry::{CallbackOwner, CallbackRegistry};
pub use up_down_counter::UpDownCounterPerformer;
