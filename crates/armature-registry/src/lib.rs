//! armature-registry: application-scoped service resolution
//!
//! A [`ServiceRegistry`] maps service types to shared instances. It is
//! an explicit object passed at construction time, scoped to an
//! application or session, never a process-wide static: its lifecycle is
//! its owner's lifecycle, and "clearing" it is dropping it. A registry
//! may chain to a parent for fallback configuration, so a session can
//! override a service an application registered.
//!
//! Services are keyed by the handle type `Arc<T>`, which works uniformly
//! for concrete types and trait objects:
//!
//! ```
//! use armature_registry::ServiceRegistry;
//! use std::sync::Arc;
//!
//! trait Clock: Send + Sync { fn now(&self) -> u64; }
//! struct FixedClock;
//! impl Clock for FixedClock { fn now(&self) -> u64 { 42 } }
//!
//! let registry = ServiceRegistry::new();
//! registry.register::<dyn Clock>(Arc::new(FixedClock));
//! let clock = registry.require::<dyn Clock>().unwrap();
//! assert_eq!(clock.now(), 42);
//! ```

use parking_lot::RwLock;
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Errors raised by service resolution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// `require` found no instance for the service type
    #[error("service '{type_name}' is not registered")]
    NotRegistered { type_name: &'static str },
}

/// Registry result type
pub type RegistryResult<T> = Result<T, RegistryError>;

/// An application-scoped table of shared service instances.
#[derive(Default)]
pub struct ServiceRegistry {
    services: RwLock<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
    parent: Option<Arc<ServiceRegistry>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry that falls back to `parent` for unregistered services.
    pub fn with_parent(parent: Arc<ServiceRegistry>) -> Self {
        Self {
            services: RwLock::new(HashMap::new()),
            parent: Some(parent),
        }
    }

    /// Register a service instance, returning any instance it replaced.
    ///
    /// `T` is typically a trait object (`dyn SomeService`); use the
    /// turbofish to register a concrete instance under its trait.
    pub fn register<T>(&self, service: Arc<T>) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        debug!(service = type_name::<T>(), "service registered");
        self.services
            .write()
            .insert(TypeId::of::<Arc<T>>(), Box::new(service))
            .and_then(|previous| previous.downcast::<Arc<T>>().ok())
            .map(|previous| *previous)
    }

    /// Resolve a service, consulting the parent chain on a miss.
    pub fn get<T>(&self) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let local = self
            .services
            .read()
            .get(&TypeId::of::<Arc<T>>())
            .and_then(|boxed| boxed.downcast_ref::<Arc<T>>())
            .cloned();
        match local {
            Some(service) => Some(service),
            None => self.parent.as_ref().and_then(|parent| parent.get::<T>()),
        }
    }

    /// Resolve a service or fail with a typed error naming it.
    pub fn require<T>(&self) -> RegistryResult<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.get::<T>().ok_or(RegistryError::NotRegistered {
            type_name: type_name::<T>(),
        })
    }

    /// Whether the service is resolvable here or through the parent.
    pub fn contains<T>(&self) -> bool
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.get::<T>().is_some()
    }

    /// Remove a locally registered service; the parent is untouched.
    pub fn remove<T>(&self) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.services
            .write()
            .remove(&TypeId::of::<Arc<T>>())
            .and_then(|boxed| boxed.downcast::<Arc<T>>().ok())
            .map(|boxed| *boxed)
    }

    /// Number of locally registered services.
    pub fn len(&self) -> usize {
        self.services.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.read().is_empty()
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("local_services", &self.len())
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct English;
    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".to_string()
        }
    }

    struct French;
    impl Greeter for French {
        fn greet(&self) -> String {
            "bonjour".to_string()
        }
    }

    #[test]
    fn concrete_services_round_trip() {
        let registry = ServiceRegistry::new();
        registry.register::<String>(Arc::new("configured".to_string()));

        assert_eq!(registry.require::<String>().unwrap().as_str(), "configured");
        assert!(registry.contains::<String>());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn trait_object_services_round_trip() {
        let registry = ServiceRegistry::new();
        registry.register::<dyn Greeter>(Arc::new(English));

        assert_eq!(registry.require::<dyn Greeter>().unwrap().greet(), "hello");
    }

    #[test]
    fn register_replaces_and_returns_previous() {
        let registry = ServiceRegistry::new();
        registry.register::<dyn Greeter>(Arc::new(English));
        let previous = registry.register::<dyn Greeter>(Arc::new(French));

        assert_eq!(previous.unwrap().greet(), "hello");
        assert_eq!(registry.require::<dyn Greeter>().unwrap().greet(), "bonjour");
    }

    #[test]
    fn missing_service_is_a_typed_error() {
        let registry = ServiceRegistry::new();
        assert!(matches!(
            registry.require::<dyn Greeter>(),
            Err(RegistryError::NotRegistered { .. })
        ));
    }

    #[test]
    fn child_falls_back_to_parent_and_can_override() {
        let parent = Arc::new(ServiceRegistry::new());
        parent.register::<dyn Greeter>(Arc::new(English));
        let child = ServiceRegistry::with_parent(parent);

        assert_eq!(child.require::<dyn Greeter>().unwrap().greet(), "hello");

        child.register::<dyn Greeter>(Arc::new(French));
        assert_eq!(child.require::<dyn Greeter>().unwrap().greet(), "bonjour");

        child.remove::<dyn Greeter>();
        assert_eq!(child.require::<dyn Greeter>().unwrap().greet(), "hello");
    }
}
