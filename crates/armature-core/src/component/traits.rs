//! Component contracts
//!
//! A component is a narrowly-scoped behavior unit registered onto an
//! owner's [`ComponentCollection`](super::ComponentCollection). The
//! [`Component`] trait carries ordering and lifecycle; everything a
//! component can *do* is expressed as capabilities it registers at
//! attach time (see [`CapabilityRegistrar`](super::CapabilityRegistrar)),
//! so dispatch never has to probe component types at runtime.

use super::capability::CapabilityRegistrar;
use super::collection::ComponentCollection;
use crate::metadata::MetadataContext;
use std::sync::Arc;

/// Lifecycle position of a component relative to a collection.
///
/// `Attaching`/`Detaching` are transient: they are observable from
/// lifecycle callbacks (and from other threads) while an add or remove
/// is in progress on the calling thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachState {
    NotAttached,
    Attaching,
    Attached,
    Detaching,
    Detached,
}

/// A pluggable behavior unit.
///
/// Higher `priority` runs first; components with equal priority keep
/// insertion order. Lifecycle hooks run synchronously on the thread
/// performing the add or remove, in the documented order: `on_attaching`
/// (veto) → storage splice → `on_attached`, and `on_detaching` (veto) →
/// removal → `on_detached`.
pub trait Component: Send + Sync + 'static {
    /// Sort key; higher values dispatch first. Defaults to 0.
    fn priority(&self) -> i32 {
        0
    }

    /// Register the capability handles this component exposes.
    ///
    /// Called exactly once per successful attach, before the component
    /// becomes visible to dispatch.
    fn register_capabilities(self: Arc<Self>, registrar: &mut CapabilityRegistrar)
    where
        Self: Sized,
    {
        let _ = registrar;
    }

    /// Veto-capable pre-attach hook; return `false` to abort the add.
    fn on_attaching(
        &self,
        collection: &ComponentCollection,
        metadata: Option<&MetadataContext>,
    ) -> bool {
        let _ = (collection, metadata);
        true
    }

    /// Runs after the component is in the collection.
    fn on_attached(&self, collection: &ComponentCollection, metadata: Option<&MetadataContext>) {
        let _ = (collection, metadata);
    }

    /// Veto-capable pre-detach hook; return `false` to abort the remove.
    /// Not consulted during owner disposal.
    fn on_detaching(
        &self,
        collection: &ComponentCollection,
        metadata: Option<&MetadataContext>,
    ) -> bool {
        let _ = (collection, metadata);
        true
    }

    /// Runs after the component has left the collection.
    fn on_detached(&self, collection: &ComponentCollection, metadata: Option<&MetadataContext>) {
        let _ = (collection, metadata);
    }
}

/// Observes structural changes of a collection.
///
/// Registered as a capability; `on_adding` may veto the add before the
/// candidate's own lifecycle hooks run.
pub trait CollectionListener: Send + Sync + 'static {
    /// Return `false` to veto the pending add.
    fn on_adding(
        &self,
        collection: &ComponentCollection,
        component: &dyn Component,
        metadata: Option<&MetadataContext>,
    ) -> bool {
        let _ = (collection, component, metadata);
        true
    }

    fn on_added(
        &self,
        collection: &ComponentCollection,
        component: &dyn Component,
        metadata: Option<&MetadataContext>,
    ) {
        let _ = (collection, component, metadata);
    }

    fn on_removed(
        &self,
        collection: &ComponentCollection,
        component: &dyn Component,
        metadata: Option<&MetadataContext>,
    ) {
        let _ = (collection, component, metadata);
    }
}

/// Transforms the materialized list of one capability.
///
/// A decorator lets a cross-cutting component reorder, filter, or wrap
/// the siblings exposing capability `C` without their cooperation. It
/// runs whenever the capability snapshot for `C` is rebuilt after a
/// structural change.
pub trait Decorate<C>: Send + Sync + 'static
where
    C: ?Sized + Send + Sync + 'static,
{
    fn decorate(&self, items: &mut Vec<Arc<C>>);
}
