//! Component collections, capabilities, and owners

mod capability;
mod collection;
mod owner;
mod traits;

pub use capability::CapabilityRegistrar;
pub use collection::ComponentCollection;
pub use owner::ComponentOwner;
pub use traits::{AttachState, CollectionListener, Component, Decorate};
