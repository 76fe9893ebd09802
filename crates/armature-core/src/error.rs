//! Error types for the component/metadata core

use thiserror::Error;

/// Errors raised by owners, collections, and metadata contexts.
///
/// Expected-absence conditions (missing metadata key, no matching
/// capability) are *not* errors; they surface as `None` or empty
/// collections. Everything here is a fail-fast programmer-error
/// condition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A public operation was invoked on a disposed owner or collection
    #[error("'{owner}' has been disposed")]
    Disposed { owner: &'static str },

    /// An argument violated a documented precondition
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A metadata key's validator rejected the value passed to `set`
    #[error("invalid value for metadata key '{key}': {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;
