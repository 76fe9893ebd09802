//! Priority-ordered component storage with capability snapshots
//!
//! The collection keeps its components sorted by descending priority
//! (stable on insertion order) and materializes, per capability, an
//! ordered list of registered handles. Snapshots are cached and
//! invalidated on every structural change, so one dispatch pass always
//! iterates a stable list even while the collection mutates concurrently.

use super::capability::{CapabilityHandle, CapabilityRegistrar};
use super::traits::{AttachState, CollectionListener, Component, Decorate};
use crate::error::{CoreError, CoreResult};
use crate::metadata::MetadataContext;
use parking_lot::Mutex;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

struct ComponentEntry {
    component: Arc<dyn Component>,
    ptr: usize,
    priority: i32,
    capabilities: Vec<CapabilityHandle>,
}

#[derive(Default)]
struct CollectionState {
    /// Priority-descending, stable on insertion order
    entries: Vec<ComponentEntry>,
    /// Per-capability snapshot cache, keyed like the capability index
    snapshots: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    /// Attach-state ledger keyed by component data pointer. Holds an
    /// entry only while an instance is attached or mid-transition;
    /// absent means `NotAttached`, so detached addresses never pin the
    /// map and a reused allocation starts clean.
    states: HashMap<usize, AttachState>,
    /// Bumped on every structural change; guards snapshot caching
    generation: u64,
}

/// An ordered, mutable collection of heterogeneous components.
///
/// Structural mutation (add/remove/snapshot) is internally synchronized;
/// components themselves remain responsible for their own thread-safety.
/// Lifecycle and listener callbacks run synchronously on the mutating
/// thread, outside the internal lock, in the documented order. An error
/// or panic in one callback propagates to the caller without rolling
/// back mutations already applied.
pub struct ComponentCollection {
    owner_name: &'static str,
    state: Mutex<CollectionState>,
    sealed: AtomicBool,
}

impl ComponentCollection {
    pub fn new(owner_name: &'static str) -> Self {
        Self {
            owner_name,
            state: Mutex::new(CollectionState::default()),
            sealed: AtomicBool::new(false),
        }
    }

    /// Name of the owner this collection belongs to, for diagnostics.
    pub fn owner_name(&self) -> &'static str {
        self.owner_name
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Add a component, running the full attach protocol.
    ///
    /// Order: listener `on_adding` (veto) → component `on_attaching`
    /// (veto) → capability registration and priority-ordered splice →
    /// component `on_attached` → listener `on_added`. A veto returns
    /// `Ok(false)`; vetoes are an expected outcome, not an error.
    /// Re-adding an instance that is already attached is an error.
    pub fn add<T>(&self, component: Arc<T>, metadata: Option<&MetadataContext>) -> CoreResult<bool>
    where
        T: Component,
    {
        self.ensure_active()?;
        let as_dyn: Arc<dyn Component> = component.clone();
        let ptr = Arc::as_ptr(&as_dyn) as *const () as usize;

        // The duplicate check and the `Attaching` reservation share one
        // critical section: a concurrent add of the same instance finds
        // the reservation and fails instead of splicing twice.
        {
            let mut state = self.state.lock();
            if state.states.contains_key(&ptr) {
                return Err(CoreError::InvalidArgument(
                    "component instance is already attached".to_string(),
                ));
            }
            state.states.insert(ptr, AttachState::Attaching);
        }

        let listeners = self.capabilities::<dyn CollectionListener>();
        for listener in &listeners {
            if !listener.on_adding(self, as_dyn.as_ref(), metadata) {
                self.clear_state(ptr);
                debug!(owner = self.owner_name, "add vetoed by collection listener");
                return Ok(false);
            }
        }
        if !as_dyn.on_attaching(self, metadata) {
            self.clear_state(ptr);
            debug!(owner = self.owner_name, "add vetoed by component");
            return Ok(false);
        }

        let mut registrar = CapabilityRegistrar::default();
        Arc::clone(&component).register_capabilities(&mut registrar);
        let priority = as_dyn.priority();

        {
            let mut state = self.state.lock();
            let index = state
                .entries
                .iter()
                .position(|entry| entry.priority < priority)
                .unwrap_or(state.entries.len());
            state.entries.insert(
                index,
                ComponentEntry {
                    component: as_dyn.clone(),
                    ptr,
                    priority,
                    capabilities: registrar.into_entries(),
                },
            );
            state.snapshots.clear();
            state.generation += 1;
            state.states.insert(ptr, AttachState::Attached);
        }

        as_dyn.on_attached(self, metadata);
        for listener in &listeners {
            listener.on_added(self, as_dyn.as_ref(), metadata);
        }
        debug!(owner = self.owner_name, priority, "component attached");
        Ok(true)
    }

    /// Remove a component, running the full detach protocol.
    ///
    /// Order: component `on_detaching` (veto) → removal → component
    /// `on_detached` → listener `on_removed`. Removing a component that
    /// is not attached is a no-op: `Ok(false)`, no callbacks fired.
    pub fn remove<T>(
        &self,
        component: &Arc<T>,
        metadata: Option<&MetadataContext>,
    ) -> CoreResult<bool>
    where
        T: Component + ?Sized,
    {
        self.ensure_active()?;
        let ptr = Arc::as_ptr(component) as *const () as usize;

        // Claim the detach under the lock; a concurrent remove of the
        // same instance loses the claim and reports a no-op, so the
        // detach hooks fire once.
        {
            let mut state = self.state.lock();
            if !matches!(state.states.get(&ptr), Some(AttachState::Attached)) {
                return Ok(false);
            }
            state.states.insert(ptr, AttachState::Detaching);
        }

        if !component.on_detaching(self, metadata) {
            // Reset the claim unless a disposal already took the entry.
            let mut state = self.state.lock();
            if matches!(state.states.get(&ptr), Some(AttachState::Detaching)) {
                state.states.insert(ptr, AttachState::Attached);
            }
            drop(state);
            debug!(owner = self.owner_name, "remove vetoed by component");
            return Ok(false);
        }

        let removed = {
            let mut state = self.state.lock();
            let Some(index) = state.entries.iter().position(|entry| entry.ptr == ptr) else {
                // Lost a race with a concurrent remove
                return Ok(false);
            };
            let entry = state.entries.remove(index);
            state.snapshots.clear();
            state.generation += 1;
            state.states.insert(ptr, AttachState::Detached);
            entry.component
        };

        removed.on_detached(self, metadata);
        for listener in &self.capabilities::<dyn CollectionListener>() {
            listener.on_removed(self, removed.as_ref(), metadata);
        }
        self.clear_state(ptr);
        debug!(owner = self.owner_name, "component detached");
        Ok(true)
    }

    /// Stable snapshot of every attached component, in dispatch order.
    pub fn components(&self) -> Vec<Arc<dyn Component>> {
        self.state
            .lock()
            .entries
            .iter()
            .map(|entry| entry.component.clone())
            .collect()
    }

    /// Stable, decorated snapshot of the handles registered for
    /// capability `C`, in dispatch order.
    ///
    /// The returned list does not reflect mutations made after the call;
    /// a dispatch pass iterates exactly what it was given. Decorators
    /// for `C` run when the snapshot is rebuilt after a structural
    /// change.
    pub fn capabilities<C>(&self) -> Vec<Arc<C>>
    where
        C: ?Sized + Send + Sync + 'static,
    {
        let key = TypeId::of::<Arc<C>>();
        let (mut items, generation) = {
            let state = self.state.lock();
            if let Some(cached) = state
                .snapshots
                .get(&key)
                .and_then(|boxed| boxed.downcast_ref::<Vec<Arc<C>>>())
            {
                return cached.clone();
            }
            (collect_raw::<C>(&state), state.generation)
        };

        // Decorators run outside the lock so they may inspect the
        // collection; they must not mutate it from inside `decorate`.
        let decorators = self.raw_capabilities::<dyn Decorate<C>>();
        for decorator in &decorators {
            decorator.decorate(&mut items);
        }

        let mut state = self.state.lock();
        if state.generation == generation {
            state.snapshots.insert(key, Box::new(items.clone()));
        }
        items
    }

    /// Current lifecycle position of a component instance.
    ///
    /// Instances that are not currently attached read `NotAttached`,
    /// including ones that were detached earlier; `Detaching` and
    /// `Detached` are observable from inside the detach callbacks.
    pub fn state_of<T>(&self, component: &Arc<T>) -> AttachState
    where
        T: Component + ?Sized,
    {
        let ptr = Arc::as_ptr(component) as *const () as usize;
        self.state
            .lock()
            .states
            .get(&ptr)
            .copied()
            .unwrap_or(AttachState::NotAttached)
    }

    /// Detach everything and seal the collection; idempotent.
    ///
    /// Detach vetoes are not consulted; each component's `on_detached`
    /// fires exactly once. Subsequent `add`/`remove` calls fail with
    /// [`CoreError::Disposed`].
    pub(crate) fn dispose(&self, metadata: Option<&MetadataContext>) {
        if self.sealed.swap(true, Ordering::AcqRel) {
            return;
        }
        let removed: Vec<ComponentEntry> = {
            let mut state = self.state.lock();
            state.snapshots.clear();
            state.generation += 1;
            let entries = std::mem::take(&mut state.entries);
            for entry in &entries {
                state.states.insert(entry.ptr, AttachState::Detached);
            }
            entries
        };
        for entry in &removed {
            entry.component.on_detached(self, metadata);
        }
        {
            let mut state = self.state.lock();
            for entry in &removed {
                state.states.remove(&entry.ptr);
            }
        }
        debug!(
            owner = self.owner_name,
            detached = removed.len(),
            "collection disposed"
        );
    }

    fn raw_capabilities<C>(&self) -> Vec<Arc<C>>
    where
        C: ?Sized + Send + Sync + 'static,
    {
        let state = self.state.lock();
        collect_raw::<C>(&state)
    }

    fn ensure_active(&self) -> CoreResult<()> {
        if self.sealed.load(Ordering::Acquire) {
            Err(CoreError::Disposed {
                owner: self.owner_name,
            })
        } else {
            Ok(())
        }
    }

    fn clear_state(&self, ptr: usize) {
        self.state.lock().states.remove(&ptr);
    }
}

impl std::fmt::Debug for ComponentCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentCollection")
            .field("owner", &self.owner_name)
            .field("len", &self.len())
            .finish()
    }
}

fn collect_raw<C>(state: &CollectionState) -> Vec<Arc<C>>
where
    C: ?Sized + Send + Sync + 'static,
{
    let key = TypeId::of::<Arc<C>>();
    let mut items = Vec::new();
    for entry in &state.entries {
        for capability in &entry.capabilities {
            if capability.type_id == key {
                if let Some(handle) = capability.handle.downcast_ref::<Arc<C>>() {
                    items.push(handle.clone());
                }
            }
        }
    }
    items
}
