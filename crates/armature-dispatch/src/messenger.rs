//! Publish/subscribe pipeline
//!
//! The messenger fans a published message out across every subscriber
//! component whose `can_handle` accepts it. Subscribers declare an
//! execution mode; subscribers sharing a mode run in priority order
//! within that mode's lane, and delivery across lanes has no ordering
//! guarantee. Publishing is fire-and-forget per subscriber: the call
//! returns once every lane has been handed its group.
//!
//! Subscriptions are explicit handles: [`Messenger::subscribe`] returns
//! a [`Subscription`] that detaches the component when released or
//! dropped, so liveness never depends on garbage-collection semantics.

use crate::error::DispatchResult;
use crate::thread::{DispatcherHandle, ExecutionMode};
use armature_core::{
    ActionToken, Component, ComponentCollection, ComponentOwner, MetadataContext,
};
use std::any::Any;
use std::sync::{Arc, Weak};
use tracing::{debug, error};
use uuid::Uuid;

/// A published message: an opaque shared payload plus envelope data.
#[derive(Clone)]
pub struct Message {
    id: Uuid,
    payload: Arc<dyn Any + Send + Sync>,
    sender: Option<String>,
}

impl Message {
    pub fn new<P: Any + Send + Sync>(payload: P) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload: Arc::new(payload),
            sender: None,
        }
    }

    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn sender(&self) -> Option<&str> {
        self.sender.as_deref()
    }

    /// Downcast the payload to a concrete type.
    pub fn payload<P: Any + Send + Sync>(&self) -> Option<&P> {
        self.payload.downcast_ref::<P>()
    }
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Message")
            .field("id", &self.id)
            .field("sender", &self.sender)
            .finish()
    }
}

/// Per-delivery context handed to subscribers alongside the message.
#[derive(Clone)]
pub struct MessageContext {
    pub metadata: Option<Arc<MetadataContext>>,
    pub mode: ExecutionMode,
}

/// Subscriber capability: registered by components that handle messages.
pub trait MessengerSubscriber: Send + Sync + 'static {
    /// Lane this subscriber's handler runs on.
    fn execution_mode(&self) -> ExecutionMode {
        ExecutionMode::Current
    }

    /// Cheap acceptance test, evaluated on the publishing thread.
    fn can_handle(&self, message: &Message) -> bool;

    /// Handle one delivery. An error is isolated to this subscriber:
    /// it is logged and other subscribers still run.
    fn handle(&self, message: &Message, context: &MessageContext) -> DispatchResult<()>;
}

/// Listener capability: notified after the publish fan-out completes.
pub trait MessengerListener: Send + Sync + 'static {
    fn on_published(&self, message: &Message, delivered: usize);
}

/// Handle scoping one subscription; detaches on release or drop.
pub struct Subscription {
    token: ActionToken,
    id: Uuid,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Detach the subscriber now.
    pub fn release(self) {
        self.token.release();
    }

    pub fn is_released(&self) -> bool {
        self.token.is_released()
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("released", &self.is_released())
            .finish()
    }
}

/// The publish/subscribe pipeline owner.
pub struct Messenger {
    owner: ComponentOwner,
    dispatcher: DispatcherHandle,
}

impl Messenger {
    pub fn new(dispatcher: DispatcherHandle) -> Self {
        Self {
            owner: ComponentOwner::new("messenger"),
            dispatcher,
        }
    }

    /// The underlying component collection, for registering listeners
    /// and decorators directly.
    pub fn components(&self) -> &Arc<ComponentCollection> {
        self.owner.components()
    }

    pub fn is_disposed(&self) -> bool {
        self.owner.is_disposed()
    }

    /// Attach a subscriber component and return its scoped handle.
    ///
    /// Returns `Ok(None)` when the attach was vetoed. The component must
    /// register the [`MessengerSubscriber`] capability to receive
    /// messages; the handle removes it when released or dropped.
    pub fn subscribe<T>(
        &self,
        component: Arc<T>,
        metadata: Option<&MetadataContext>,
    ) -> DispatchResult<Option<Subscription>>
    where
        T: Component,
    {
        self.owner.ensure_alive()?;
        if !self.owner.components().add(component.clone(), metadata)? {
            return Ok(None);
        }

        let id = Uuid::new_v4();
        let collection: Weak<ComponentCollection> = Arc::downgrade(self.owner.components());
        let token = ActionToken::new(move || {
            if let Some(collection) = collection.upgrade() {
                if let Err(e) = collection.remove(&component, None) {
                    debug!(error = %e, "subscription release after disposal");
                }
            }
        });
        Ok(Some(Subscription { token, id }))
    }

    /// Publish a message to every accepting subscriber.
    ///
    /// Returns the number of subscribers the message was handed to.
    /// Delivery on non-`Current` lanes happens after this call returns.
    pub fn publish(
        &self,
        message: Message,
        metadata: Option<Arc<MetadataContext>>,
    ) -> DispatchResult<usize> {
        self.owner.ensure_alive()?;

        let subscribers = self
            .owner
            .components()
            .capabilities::<dyn MessengerSubscriber>();
        let accepting: Vec<_> = subscribers
            .into_iter()
            .filter(|subscriber| subscriber.can_handle(&message))
            .collect();
        let delivered = accepting.len();

        // Group by lane, preserving priority order within each group
        // and first-seen order across groups.
        let mut groups: Vec<(ExecutionMode, Vec<Arc<dyn MessengerSubscriber>>)> = Vec::new();
        for subscriber in accepting {
            let mode = subscriber.execution_mode();
            match groups.iter_mut().find(|(m, _)| *m == mode) {
                Some((_, group)) => group.push(subscriber),
                None => groups.push((mode, vec![subscriber])),
            }
        }

        for (mode, group) in groups {
            let context = MessageContext {
                metadata: metadata.clone(),
                mode,
            };
            let delivery = message.clone();
            self.dispatcher.execute(
                mode,
                Box::new(move || {
                    for subscriber in &group {
                        if let Err(e) = subscriber.handle(&delivery, &context) {
                            error!(
                                message_id = %delivery.id(),
                                error = %e,
                                "subscriber failed; continuing fan-out"
                            );
                        }
                    }
                }),
            );
        }

        // Listener pass, strictly after the primary fan-out hand-off.
        for listener in self
            .owner
            .components()
            .capabilities::<dyn MessengerListener>()
        {
            listener.on_published(&message, delivered);
        }
        debug!(message_id = %message.id(), delivered, "message published");
        Ok(delivered)
    }

    /// Dispose the messenger; detaches all subscribers exactly once.
    pub fn dispose(&self, metadata: Option<&MetadataContext>) -> bool {
        self.owner.dispose(metadata)
    }
}
