//! Domain Ports (DDD Port/Adapter Pattern)
//!
//! The metrics backend is an external collaborator: it creates instruments and
//! owns the collection schedule. Performers only see it through the traits in
//! this module; adapters provide the concrete implementations.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Performers                              │
//! │   Counter │ UpDownCounter │ Gauge │ Histogram │ Meter        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Ports (Traits)                             │
//! │  MetricBackend │ ObservableInstrument │ HistogramInstrument  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Adapters (Impls)                            │
//! │        PrometheusBackend │ InMemoryBackend                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use super::attributes::Attributes;
use super::instrument::InstrumentDescriptor;
use crate::error::{BackendError, Result};

/// Result type for backend operations.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

// =============================================================================
// Collection Context
// =============================================================================

/// Context handed to callbacks for one collection cycle.
///
/// Carries an optional deadline and a cancellation token. Nothing in this
/// crate enforces either; callbacks that honour them report failures which
/// are then surfaced as operation failures for that cycle.
#[derive(Debug, Clone, Default)]
pub struct ObserveContext {
    deadline: Option<Instant>,
    cancellation: CancellationToken,
}

impl ObserveContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context whose deadline is `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; `None` without a deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        matches!(self.deadline, Some(deadline) if Instant::now() >= deadline)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Fails with a descriptive error once the cycle is cancelled or past
    /// its deadline. Intended for use inside callbacks.
    pub fn check(&self) -> anyhow::Result<()> {
        if self.is_cancelled() {
            anyhow::bail!("collection cycle cancelled");
        }
        if self.is_expired() {
            anyhow::bail!("collection cycle deadline exceeded");
        }
        Ok(())
    }
}

// =============================================================================
// Observers
// =============================================================================

/// Opaque identifier a backend assigns to each observable instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrumentId(pub u64);

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Receives observations for one instrument during one cycle.
pub trait Observer {
    fn observe(&mut self, value: f64, attributes: &Attributes);
}

/// Receives observations for several instruments during one cycle.
pub trait MultiObserver {
    fn observe(&mut self, instrument: InstrumentId, value: f64, attributes: &Attributes);
}

/// Per-instrument callback invoked by the backend each collection cycle.
pub type ObserveCallback =
    Box<dyn Fn(&ObserveContext, &mut dyn Observer) -> Result<()> + Send + Sync>;

/// Callback reporting for several instruments at once.
pub type SharedCallback =
    Box<dyn Fn(&ObserveContext, &mut dyn MultiObserver) -> Result<()> + Send + Sync>;

// =============================================================================
// Instrument Handles
// =============================================================================

/// Handle to an observable instrument created by a backend.
pub trait ObservableInstrument: Send + Sync + fmt::Debug {
    fn id(&self) -> InstrumentId;

    fn descriptor(&self) -> &InstrumentDescriptor;

    /// Detach the per-instrument callback. Returns true if one was attached.
    fn unregister_callback(&self) -> bool;
}

/// Handle to a synchronous histogram created by a backend.
pub trait HistogramInstrument: Send + Sync + fmt::Debug {
    fn descriptor(&self) -> &InstrumentDescriptor;

    fn record(&self, value: f64, attributes: &Attributes);
}

/// Handle to a shared callback registration.
pub trait CallbackHandle: Send + Sync + fmt::Debug {
    /// Detach the shared callback. Returns true on the first call.
    fn unregister(&self) -> bool;
}

// =============================================================================
// Backend Port
// =============================================================================

/// Metrics runtime that creates instruments and drives collection cycles.
///
/// Implementations must accept a repeated creation of a compatible
/// descriptor (same name, kind, unit and help) and reject a conflicting one.
pub trait MetricBackend: Send + Sync {
    fn create_observable_counter(
        &self,
        descriptor: InstrumentDescriptor,
        callback: Option<ObserveCallback>,
    ) -> BackendResult<Arc<dyn ObservableInstrument>>;

    fn create_observable_up_down_counter(
        &self,
        descriptor: InstrumentDescriptor,
        callback: Option<ObserveCallback>,
    ) -> BackendResult<Arc<dyn ObservableInstrument>>;

    fn create_observable_gauge(
        &self,
        descriptor: InstrumentDescriptor,
        callback: Option<ObserveCallback>,
    ) -> BackendResult<Arc<dyn ObservableInstrument>>;

    fn create_histogram(
        &self,
        descriptor: InstrumentDescriptor,
        buckets: &[f64],
    ) -> BackendResult<Arc<dyn HistogramInstrument>>;

    /// Register one callback reporting for all of `instruments`.
    fn register_callback(
        &self,
        callback: SharedCallback,
        instruments: &[InstrumentId],
    ) -> BackendResult<Arc<dyn CallbackHandle>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_without_deadline() {
        let ctx = ObserveContext::new();
        assert!(ctx.deadline().is_none());
        assert!(ctx.remaining().is_none());
        assert!(!ctx.is_expired());
        assert!(ctx.check().is_ok());
    }

    #[test]
    fn test_context_expired_deadline() {
        let ctx = ObserveContext::new().with_deadline(Instant::now());
        assert!(ctx.is_expired());
        assert_eq!(ctx.remaining(), Some(Duration::ZERO));
        let err = ctx.check().unwrap_err();
        assert!(err.to_string().contains("deadline"));
    }

    #[test]
    fn test_context_cancellation() {
        let token = CancellationToken::new();
        let ctx = ObserveContext::with_timeout(Duration::from_secs(60))
            .with_cancellation(token.clone());
        assert!(ctx.check().is_ok());

        token.cancel();
        assert!(ctx.is_cancelled());
        assert!(ctx.check().unwrap_err().to_string().contains("cancelled"));
    }

    #[test]
    fn test_instrument_id_display() {
        assert_eq!(InstrumentId(7).to_string(), "#7");
    }
}
