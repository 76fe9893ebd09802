//! Capability registration
//!
//! Components declare what they can do by registering `Arc<dyn Cap>`
//! handles at attach time. Handles are indexed by the `TypeId` of the
//! `Arc<C>` handle type, which works uniformly for trait objects and
//! concrete types, so lookups are a map probe plus a downcast instead of
//! a type test per component per dispatch.

use std::any::{Any, TypeId};
use std::sync::Arc;

pub(crate) struct CapabilityHandle {
    pub(crate) type_id: TypeId,
    pub(crate) handle: Box<dyn Any + Send + Sync>,
}

/// Collects the capability handles of one component during attach.
#[derive(Default)]
pub struct CapabilityRegistrar {
    entries: Vec<CapabilityHandle>,
}

impl CapabilityRegistrar {
    /// Register a capability handle.
    ///
    /// `C` is usually a capability trait object (`dyn SomeCapability`);
    /// registering the same capability more than once exposes the
    /// component multiple times in that capability's dispatch list.
    pub fn register<C>(&mut self, capability: Arc<C>)
    where
        C: ?Sized + Send + Sync + 'static,
    {
        self.entries.push(CapabilityHandle {
            type_id: TypeId::of::<Arc<C>>(),
            handle: Box::new(capability),
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn into_entries(self) -> Vec<CapabilityHandle> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greets: Send + Sync {
        fn greet(&self) -> &'static str;
    }

    struct Greeter;

    impl Greets for Greeter {
        fn greet(&self) -> &'static str {
            "hello"
        }
    }

    #[test]
    fn registered_handle_round_trips_through_any() {
        let mut registrar = CapabilityRegistrar::default();
        let greeter: Arc<dyn Greets> = Arc::new(Greeter);
        registrar.register::<dyn Greets>(greeter);

        let entries = registrar.into_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].type_id, TypeId::of::<Arc<dyn Greets>>());

        let handle = entries[0]
            .handle
            .downcast_ref::<Arc<dyn Greets>>()
            .expect("handle downcasts back to its capability type");
        assert_eq!(handle.greet(), "hello");
    }
}
