//! Callback Registry
//!
//! Tracks metric keys already reported by a callback, so instances sharing a
//! key do not register duplicate callbacks with the backend.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::domain::{InstrumentId, ObservableInstrument};

/// Per-instrument callback registered by one performer.
///
/// Shared between the performer and the registry so that either side can
/// detach it. Detaching is permanent.
#[derive(Debug)]
pub struct CallbackOwner {
    instrument: Arc<dyn ObservableInstrument>,
    detached: AtomicBool,
}

impl CallbackOwner {
    pub(crate) fn new(instrument: Arc<dyn ObservableInstrument>) -> Self {
        Self {
            instrument,
            detached: AtomicBool::new(false),
        }
    }

    pub fn instrument_id(&self) -> InstrumentId {
        self.instrument.id()
    }

    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }

    /// Unregister the callback. Returns false if it was already detached.
    pub fn detach(&self) -> bool {
        if self.detached.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.instrument.unregister_callback();
        true
    }
}

/// Set of metric keys covered by a registered callback.
///
/// Keys are inserted once and never removed. A key claimed by a performer
/// remembers that performer's callback until a shared callback covers it.
/// Constructed explicitly and passed to whatever builds performers.
#[derive(Debug, Default)]
pub struct CallbackRegistry {
    keys: DashMap<String, Option<Arc<CallbackOwner>>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains_key(key)
    }

    /// Insert `key` without an owner. Returns false if it was already present.
    pub fn add(&self, key: impl Into<String>) -> bool {
        match self.keys.entry(key.into()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(None);
                true
            }
        }
    }

    /// Record `owner` as the callback reporting `key`. Returns false, leaving
    /// the registry unchanged, if the key is already present.
    pub(crate) fn claim(&self, key: impl Into<String>, owner: Arc<CallbackOwner>) -> bool {
        match self.keys.entry(key.into()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(Some(owner));
                true
            }
        }
    }

    /// Mark `key` as reported by a shared callback, returning the
    /// per-instrument callback that reported it until now.
    pub fn cover(&self, key: impl Into<String>) -> Option<Arc<CallbackOwner>> {
        self.keys.insert(key.into(), None).flatten()
    }

    /// Per-instrument callback currently reporting `key`.
    pub fn owner(&self, key: &str) -> Option<Arc<CallbackOwner>> {
        self.keys.get(key).and_then(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.keys.iter().map(|k| k.key().clone()).collect();
        keys.sort();
        keys
    }
}
