//! Callback Table
//!
//! Instrument and callback bookkeeping shared by the backend adapters, plus
//! the collection cycle that runs every registered callback once.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::domain::{
    Attributes, BackendResult, CallbackHandle, InstrumentDescriptor, InstrumentId, MultiObserver,
    ObservableInstrument, ObserveCallback, ObserveContext, Observer, SharedCallback,
};
use crate::error::{BackendError, Error};

/// One reported value.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub instrument: InstrumentId,
    pub name: String,
    pub value: f64,
    pub attributes: Attributes,
}

/// Outcome of one collection cycle.
///
/// A failing callback contributes an error and none of its observations.
#[derive(Debug, Default)]
pub struct CollectReport {
    pub observations: Vec<Observation>,
    pub errors: Vec<Error>,
}

impl CollectReport {
    /// Observations reported under `name`, in collection order.
    pub fn observations_of(&self, name: &str) -> Vec<&Observation> {
        self.observations.iter().filter(|o| o.name == name).collect()
    }

    /// Value of the last observation reported under `name`.
    pub fn value_of(&self, name: &str) -> Option<f64> {
        self.observations
            .iter()
            .rev()
            .find(|o| o.name == name)
            .map(|o| o.value)
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty() && self.errors.is_empty()
    }
}

struct InstrumentSlot {
    descriptor: InstrumentDescriptor,
    callback: Option<Arc<ObserveCallback>>,
}

struct SharedSlot {
    instruments: Vec<InstrumentId>,
    callback: Arc<SharedCallback>,
}

#[derive(Default)]
struct TableState {
    next_id: u64,
    descriptors: HashMap<String, InstrumentDescriptor>,
    instruments: BTreeMap<u64, InstrumentSlot>,
    shared: BTreeMap<u64, SharedSlot>,
    registrations: HashMap<String, usize>,
}

impl TableState {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Accept a compatible re-declaration, reject a conflicting one.
    fn declare(&mut self, descriptor: &InstrumentDescriptor) -> BackendResult<()> {
        match self.descriptors.get(&descriptor.name) {
            Some(existing) if !existing.is_compatible(descriptor) => Err(BackendError::Conflict {
                name: descriptor.name.clone(),
                existing: format!(
                    "{} in scope {:?} (unit {:?}, help {:?})",
                    existing.kind,
                    existing.instrument.to_string(),
                    existing.unit,
                    existing.help
                ),
            }),
            Some(_) => Ok(()),
            None => {
                self.descriptors
                    .insert(descriptor.name.clone(), descriptor.clone());
                Ok(())
            }
        }
    }
}

/// Instruments and callbacks known to one backend.
#[derive(Default)]
pub struct CallbackTable {
    state: Arc<RwLock<TableState>>,
}

impl CallbackTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check a descriptor against those already declared.
    pub fn declare(&self, descriptor: &InstrumentDescriptor) -> BackendResult<()> {
        self.state.write().declare(descriptor)
    }

    /// Create an observable instrument with an optional callback.
    pub fn create_observable(
        &self,
        descriptor: InstrumentDescriptor,
        callback: Option<ObserveCallback>,
    ) -> BackendResult<Arc<dyn ObservableInstrument>> {
        let mut state = self.state.write();
        state.declare(&descriptor)?;

        let id = state.allocate_id();
        if callback.is_some() {
            *state
                .registrations
                .entry(descriptor.name.clone())
                .or_insert(0) += 1;
        }
        state.instruments.insert(
            id,
            InstrumentSlot {
                descriptor: descriptor.clone(),
                callback: callback.map(Arc::new),
            },
        );
        debug!(instrument = %descriptor.name, id, "Created observable instrument");

        Ok(Arc::new(TableInstrument {
            id: InstrumentId(id),
            descriptor,
            state: Arc::clone(&self.state),
        }))
    }

    /// Register one callback reporting for several instruments.
    pub fn register_shared(
        &self,
        callback: SharedCallback,
        instruments: &[InstrumentId],
    ) -> BackendResult<Arc<dyn CallbackHandle>> {
        let mut state = self.state.write();
        for instrument in instruments {
            if !state.instruments.contains_key(&instrument.0) {
                return Err(BackendError::UnknownInstrument(instrument.0));
            }
        }
        for instrument in instruments {
            let name = state.instruments[&instrument.0].descriptor.name.clone();
            *state.registrations.entry(name).or_insert(0) += 1;
        }

        let id = state.allocate_id();
        state.shared.insert(
            id,
            SharedSlot {
                instruments: instruments.to_vec(),
                callback: Arc::new(callback),
            },
        );
        Ok(Arc::new(SharedRegistration {
            id,
            state: Arc::clone(&self.state),
            unregistered: AtomicBool::new(false),
        }))
    }

    /// Total callbacks registered, counting a shared callback once per
    /// instrument it covers.
    pub fn callback_registrations(&self) -> usize {
        self.state.read().registrations.values().sum()
    }

    /// Callbacks registered for instruments named `name`.
    pub fn callback_registrations_for(&self, name: &str) -> usize {
        self.state
            .read()
            .registrations
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    /// Descriptor declared under `name`.
    pub fn descriptor(&self, name: &str) -> Option<InstrumentDescriptor> {
        self.state.read().descriptors.get(name).cloned()
    }

    /// Number of observable instruments created.
    pub fn instrument_count(&self) -> usize {
        self.state.read().instruments.len()
    }

    /// Run one collection cycle.
    ///
    /// Callbacks are copied out and run with the table unlocked, so a
    /// callback may detach itself or create instruments. Instruments created
    /// during a cycle report from the next one.
    pub fn collect(&self, ctx: &ObserveContext) -> CollectReport {
        let (instruments, shared) = self.snapshot();
        let mut report = CollectReport::default();

        for (id, name, callback) in instruments {
            let mut observer = BufferedObserver::default();
            match callback(ctx, &mut observer) {
                Ok(()) => {
                    report
                        .observations
                        .extend(observer.values.into_iter().map(|(value, attributes)| {
                            Observation {
                                instrument: id,
                                name: name.clone(),
                                value,
                                attributes,
                            }
                        }));
                }
                Err(err) => {
                    warn!(instrument = %name, error = %err, "Metric callback failed");
                    report.errors.push(err);
                }
            }
        }

        for (covered, callback) in shared {
            let mut observer = BufferedMultiObserver::default();
            match callback(ctx, &mut observer) {
                Ok(()) => {
                    for (instrument, value, attributes) in observer.values {
                        let Some(name) = covered.get(&instrument) else {
                            warn!(
                                instrument = %instrument,
                                "Shared callback observed an instrument it does not cover"
                            );
                            continue;
                        };
                        report.observations.push(Observation {
                            instrument,
                            name: name.clone(),
                            value,
                            attributes,
                        });
                    }
                }
                Err(err) => {
                    warn!(error = %err, "Shared metric callback failed");
                    report.errors.push(err);
                }
            }
        }

        report
    }

    /// Callbacks to run this cycle, in id order.
    #[allow(clippy::type_complexity)]
    fn snapshot(
        &self,
    ) -> (
        Vec<(InstrumentId, String, Arc<ObserveCallback>)>,
        Vec<(HashMap<InstrumentId, String>, Arc<SharedCallback>)>,
    ) {
        let state = self.state.read();
        let instruments = state
            .instruments
            .iter()
            .filter_map(|(id, slot)| {
                let callback = slot.callback.as_ref()?;
                Some((InstrumentId(*id), slot.descriptor.name.clone(), Arc::clone(callback)))
            })
            .collect();
        let shared = state
            .shared
            .values()
            .map(|slot| {
                let covered = slot
                    .instruments
                    .iter()
                    .filter_map(|id| {
                        let target = state.instruments.get(&id.0)?;
                        Some((*id, target.descriptor.name.clone()))
                    })
                    .collect();
                (covered, Arc::clone(&slot.callback))
            })
            .collect();
        (instruments, shared)
    }
}

impl std::fmt::Debug for CallbackTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("CallbackTable")
            .field("instruments", &state.instruments.len())
            .field("shared", &state.shared.len())
            .finish()
    }
}

#[derive(Default)]
struct BufferedObserver {
    values: Vec<(f64, Attributes)>,
}

impl Observer for BufferedObserver {
    fn observe(&mut self, value: f64, attributes: &Attributes) {
        self.values.push((value, attributes.clone()));
    }
}

#[derive(Default)]
struct BufferedMultiObserver {
    values: Vec<(InstrumentId, f64, Attributes)>,
}

impl MultiObserver for BufferedMultiObserver {
    fn observe(&mut self, instrument: InstrumentId, value: f64, attributes: &Attributes) {
        self.values.push((instrument, value, attributes.clone()));
    }
}

/// Observable instrument handle backed by a [`CallbackTable`].
struct TableInstrument {
    id: InstrumentId,
    descriptor: InstrumentDescriptor,
    state: Arc<RwLock<TableState>>,
}

impl ObservableInstrument for TableInstrument {
    fn id(&self) -> InstrumentId {
        self.id
    }

    fn descriptor(&self) -> &InstrumentDescriptor {
        &self.descriptor
    }

    fn unregister_callback(&self) -> bool {
        self.state
            .write()
            .instruments
            .get_mut(&self.id.0)
            .and_then(|slot| slot.callback.take())
            .is_some()
    }
}

impl std::fmt::Debug for TableInstrument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableInstrument")
            .field("id", &self.id)
            .field("name", &self.descriptor.name)
            .finish()
    }
}

struct SharedRegistration {
    id: u64,
    state: Arc<RwLock<TableState>>,
    unregistered: AtomicBool,
}

impl CallbackHandle for SharedRegistration {
    fn unregister(&self) -> bool {
        if self.unregistered.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.state.write().shared.remove(&self.id).is_some()
    }
}

impl std::fmt::Debug for SharedRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedRegistration")
            .field("id", &self.id)
            .field("unregistered", &self.unregistered.load(Ordering::Relaxed))
            .finish()
    }
}
