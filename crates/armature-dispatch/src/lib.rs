//! armature-dispatch: fan-out pipelines over the component core
//!
//! Each pipeline owner wraps a [`ComponentOwner`](armature_core::ComponentOwner)
//! and fans its one primary operation out across the components that
//! registered the matching capability, in priority order:
//!
//! - [`Messenger`] — publish/subscribe with per-subscriber execution-mode
//!   marshaling and RAII [`Subscription`] handles.
//! - [`Validator`] — async, cancellable validation with per-member
//!   last-writer-wins semantics and an aggregated error store.
//! - [`CommandManager`] — provider-style mediator lookup with
//!   short-circuit-on-first-answer semantics.
//!
//! Work never runs on a pipeline-owned thread pool; it is marshaled onto
//! host-provided lanes through the [`ThreadDispatcher`] abstraction.

pub mod command;
pub mod error;
pub mod messenger;
pub mod thread;
pub mod validator;

pub use command::{
    CommandListener, CommandManager, CommandMediator, CommandRequest, MediatorProvider,
};
pub use error::{DispatchError, DispatchResult};
pub use messenger::{
    Message, MessageContext, Messenger, MessengerListener, MessengerSubscriber, Subscription,
};
pub use thread::{
    DispatcherHandle, ExecutionMode, InlineDispatcher, Job, ThreadDispatcher, TokioDispatcher,
};
pub use validator::{ValidationError, ValidationListener, Validator, ValidatorComponent};
