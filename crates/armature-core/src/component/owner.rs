//! Component owners
//!
//! An owner is the aggregate root every pipeline object embeds: one
//! component collection, one lazily created metadata context, and an
//! atomic disposal gate that every public operation of the embedding
//! object checks first.

use super::collection::ComponentCollection;
use crate::error::{CoreError, CoreResult};
use crate::metadata::MetadataContext;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// The extensible aggregate root.
///
/// Pipeline objects (messenger, validator, command manager) embed an
/// owner rather than inherit from it; their public operations call
/// [`ComponentOwner::ensure_alive`] before touching the collection.
pub struct ComponentOwner {
    name: &'static str,
    components: Arc<ComponentCollection>,
    metadata: OnceLock<MetadataContext>,
    disposed: AtomicBool,
}

impl ComponentOwner {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            components: Arc::new(ComponentCollection::new(name)),
            metadata: OnceLock::new(),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The owner's component collection. Shared so release tokens can
    /// hold a weak reference back to it.
    pub fn components(&self) -> &Arc<ComponentCollection> {
        &self.components
    }

    /// The owner's metadata context, created on first access.
    pub fn metadata(&self) -> &MetadataContext {
        self.metadata.get_or_init(MetadataContext::new)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Fail fast when the owner has been disposed.
    pub fn ensure_alive(&self) -> CoreResult<()> {
        if self.is_disposed() {
            Err(CoreError::Disposed { owner: self.name })
        } else {
            Ok(())
        }
    }

    /// Dispose the owner: detach every component exactly once and seal
    /// the collection. Returns `false` if already disposed.
    pub fn dispose(&self, metadata: Option<&MetadataContext>) -> bool {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.components.dispose(metadata);
        debug!(owner = self.name, "owner disposed");
        true
    }
}

impl std::fmt::Debug for ComponentOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentOwner")
            .field("name", &self.name)
            .field("components", &self.components.len())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
