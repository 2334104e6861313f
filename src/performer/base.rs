//! Base Observe Performer
//!
//! Local value and attribute state shared by every observable performer.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::domain::{Attributes, ObserveOption};

/// Accumulated value plus the attributes to report it with.
///
/// The value is an `f64` stored as bits in an `AtomicU64` and updated with a
/// CAS loop, so concurrent additions never lose updates. Dynamic attributes
/// live behind a narrow lock and are replaced wholesale on each mutation.
#[derive(Debug)]
pub struct BaseObservePerformer {
    value: AtomicU64,
    static_attributes: Attributes,
    dynamic_attributes: RwLock<Attributes>,
}

impl BaseObservePerformer {
    /// Create a performer starting at zero with the given static attributes.
    pub fn new(static_attributes: Attributes) -> Self {
        Self {
            value: AtomicU64::new(0f64.to_bits()),
            static_attributes,
            dynamic_attributes: RwLock::new(Attributes::new()),
        }
    }

    /// Atomically add `delta` to the accumulated value.
    ///
    /// No sign check happens here; monotonic kinds validate before calling.
    pub fn add_value(&self, delta: f64) {
        let mut current = self.value.load(Ordering::Acquire);
        loop {
            let updated = (f64::from_bits(current) + delta).to_bits();
            match self.value.compare_exchange_weak(
                current,
                updated,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }

    /// Atomically replace the accumulated value.
    pub fn set_value(&self, value: f64) {
        self.value.store(value.to_bits(), Ordering::Release);
    }

    /// Snapshot of the accumulated value.
    pub fn value(&self) -> f64 {
        f64::from_bits(self.value.load(Ordering::Acquire))
    }

    /// Replace the dynamic attributes with those carried by `options`.
    ///
    /// Last write wins; nothing from earlier calls survives.
    pub fn set_observe_options_by_option(&self, options: &[ObserveOption]) {
        let dynamic: Attributes = options
            .iter()
            .flat_map(|option| option.attributes.iter().cloned())
            .collect();
        *self.dynamic_attributes.write() = dynamic;
    }

    /// Static attributes followed by the current dynamic attributes.
    pub fn observe_options(&self) -> Attributes {
        let dynamic = self.dynamic_attributes.read();
        self.static_attributes.concat(&dynamic)
    }

    /// Static attributes followed by `extra`, for one-off observations.
    ///
    /// Dynamic attributes are excluded on purpose: the result labels an
    /// observation produced by an external callback, and attributes left
    /// over from the last `add` or `set` do not describe it.
    pub fn merge_attributes_to_observe_options(&self, extra: &Attributes) -> Attributes {
        self.static_attributes.concat(extra)
    }

    pub fn static_attributes(&self) -> &Attributes {
        &self.static_attributes
    }
}

// =============================================================================
// Tests
// =============================================================================
