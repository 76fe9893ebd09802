//! armature-core: component collections, owners, and typed metadata
//!
//! Every framework object is an *owner*: an open aggregate whose
//! behavior is supplied by prioritized, pluggable components. This crate
//! provides the pieces the dispatch pipelines build on:
//!
//! - [`ComponentCollection`] / [`ComponentOwner`] — priority-ordered
//!   component storage with attach/detach lifecycle, capability
//!   registration, decorators, and disposal gating.
//! - [`MetadataContext`] / [`MetadataKey`] — a typed, thread-safe
//!   key/value store passed alongside operations.
//! - [`ActionToken`] — move-only one-shot release handles for scoped
//!   registrations.

pub mod component;
pub mod error;
pub mod metadata;
pub mod token;

pub use component::{
    AttachState, CapabilityRegistrar, CollectionListener, Component, ComponentCollection,
    ComponentOwner, Decorate,
};
pub use error::{CoreError, CoreResult};
pub use metadata::{KeyId, MetadataContext, MetadataEntry, MetadataKey, MetadataKeyBuilder};
pub use token::ActionToken;
