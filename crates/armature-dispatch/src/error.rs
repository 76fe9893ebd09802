//! Error types for the dispatch pipelines

use armature_core::CoreError;
use thiserror::Error;

/// Errors raised by the messenger, validator, and command pipelines.
#[derive(Error, Debug, Clone)]
pub enum DispatchError {
    /// A core precondition failed (disposed owner, invalid argument)
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A validation run was canceled, either by a superseding run for
    /// the same member or by owner disposal
    #[error("validation for '{member}' was canceled")]
    Canceled { member: String },

    /// No provider produced a mediator for the command
    #[error("no mediator available for command '{name}'")]
    NoMediator { name: String },

    /// The resolved mediator refused to execute the command
    #[error("command '{name}' is not executable in the current state")]
    NotExecutable { name: String },

    /// A component failed during fan-out; carried when the failure is
    /// the operation's overall outcome rather than an isolated one
    #[error("component failure: {0}")]
    Component(String),
}

/// Dispatch result type
pub type DispatchResult<T> = Result<T, DispatchError>;
