//! Typed metadata keys and the thread-safe context store

mod context;
mod key;

pub use context::{MetadataContext, MetadataEntry};
pub use key::{KeyId, MetadataKey, MetadataKeyBuilder};
