//! Command mediation pipeline
//!
//! Resolving a command is a provider-style lookup: mediator providers
//! are consulted in priority order and the first non-`None` answer wins.
//! Listeners are told about every mediator that was produced, strictly
//! after the lookup pass.

use crate::error::{DispatchError, DispatchResult};
use armature_core::{ComponentCollection, ComponentOwner, MetadataContext};
use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A command lookup/execution request.
#[derive(Clone)]
pub struct CommandRequest {
    name: String,
    parameter: Option<Arc<dyn Any + Send + Sync>>,
}

impl CommandRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameter: None,
        }
    }

    pub fn with_parameter<P: Any + Send + Sync>(mut self, parameter: P) -> Self {
        self.parameter = Some(Arc::new(parameter));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameter(&self) -> Option<&(dyn Any + Send + Sync)> {
        self.parameter.as_deref()
    }

    /// Downcast the parameter to a concrete type.
    pub fn parameter_as<P: Any + Send + Sync>(&self) -> Option<&P> {
        self.parameter.as_deref().and_then(|p| p.downcast_ref())
    }
}

impl std::fmt::Debug for CommandRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRequest")
            .field("name", &self.name)
            .field("has_parameter", &self.parameter.is_some())
            .finish()
    }
}

/// Executes one command on behalf of the manager.
#[async_trait]
pub trait CommandMediator: Send + Sync + 'static {
    /// Whether the command can run right now; checked before `execute`.
    fn can_execute(&self, request: &CommandRequest) -> bool {
        let _ = request;
        true
    }

    async fn execute(
        &self,
        request: &CommandRequest,
        token: &CancellationToken,
    ) -> DispatchResult<()>;
}

/// Provider capability: consulted in priority order; first `Some` wins.
pub trait MediatorProvider: Send + Sync + 'static {
    fn try_get_mediator(&self, request: &CommandRequest) -> Option<Arc<dyn CommandMediator>>;
}

/// Listener capability: notified after a mediator was produced.
pub trait CommandListener: Send + Sync + 'static {
    fn on_mediator_created(&self, request: &CommandRequest, mediator: &Arc<dyn CommandMediator>);
}

/// The command pipeline owner.
pub struct CommandManager {
    owner: ComponentOwner,
    root: CancellationToken,
}

impl CommandManager {
    pub fn new() -> Self {
        Self {
            owner: ComponentOwner::new("command-manager"),
            root: CancellationToken::new(),
        }
    }

    pub fn components(&self) -> &Arc<ComponentCollection> {
        self.owner.components()
    }

    pub fn is_disposed(&self) -> bool {
        self.owner.is_disposed()
    }

    /// Resolve a mediator for `request`.
    ///
    /// Providers run in priority order; the first non-`None` result
    /// short-circuits the scan. No provider answering is an expected
    /// absence: `Ok(None)`.
    pub fn mediator(
        &self,
        request: &CommandRequest,
    ) -> DispatchResult<Option<Arc<dyn CommandMediator>>> {
        self.owner.ensure_alive()?;
        if request.name.is_empty() {
            return Err(
                armature_core::CoreError::InvalidArgument("command name must not be empty".into())
                    .into(),
            );
        }

        let providers = self
            .owner
            .components()
            .capabilities::<dyn MediatorProvider>();
        let mediator = providers
            .iter()
            .find_map(|provider| provider.try_get_mediator(request));

        if let Some(mediator) = &mediator {
            for listener in self.owner.components().capabilities::<dyn CommandListener>() {
                listener.on_mediator_created(request, mediator);
            }
            debug!(command = request.name(), "mediator resolved");
        }
        Ok(mediator)
    }

    /// Resolve and execute `request` in one step.
    pub async fn execute(&self, request: &CommandRequest) -> DispatchResult<()> {
        let mediator = self
            .mediator(request)?
            .ok_or_else(|| DispatchError::NoMediator {
                name: request.name.clone(),
            })?;
        if !mediator.can_execute(request) {
            return Err(DispatchError::NotExecutable {
                name: request.name.clone(),
            });
        }
        let token = self.root.child_token();
        mediator.execute(request, &token).await
    }

    /// Dispose the manager: cancel outstanding executions and detach
    /// all components exactly once.
    pub fn dispose(&self, metadata: Option<&MetadataContext>) -> bool {
        if !self.owner.dispose(metadata) {
            return false;
        }
        self.root.cancel();
        true
    }
}

impl Default for CommandManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use armature_core::{CapabilityRegistrar, Component};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Recording {
        executions: AtomicUsize,
        executable: bool,
    }

    #[async_trait]
    impl CommandMediator for Recording {
        fn can_execute(&self, _: &CommandRequest) -> bool {
            self.executable
        }

        async fn execute(&self, _: &CommandRequest, _: &CancellationToken) -> DispatchResult<()> {
            self.executions.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Providing {
        priority: i32,
        mediator: Option<Arc<Recording>>,
    }

    impl Providing {
        fn new(priority: i32, mediator: Option<Arc<Recording>>) -> Arc<Self> {
            Arc::new(Self { priority, mediator })
        }
    }

    impl Component for Providing {
        fn priority(&self) -> i32 {
            self.priority
        }

        fn register_capabilities(self: Arc<Self>, registrar: &mut CapabilityRegistrar) {
            registrar.register::<dyn MediatorProvider>(self);
        }
    }

    impl MediatorProvider for Providing {
        fn try_get_mediator(&self, _: &CommandRequest) -> Option<Arc<dyn CommandMediator>> {
            self.mediator
                .clone()
                .map(|mediator| mediator as Arc<dyn CommandMediator>)
        }
    }

    fn recording(executable: bool) -> Arc<Recording> {
        Arc::new(Recording {
            executions: AtomicUsize::new(0),
            executable,
        })
    }

    #[tokio::test]
    async fn first_answering_provider_wins() {
        let manager = CommandManager::new();
        let fallback = recording(true);
        // Higher-priority provider yields nothing; lookup falls through.
        manager
            .components()
            .add(Providing::new(10, None), None)
            .unwrap();
        manager
            .components()
            .add(Providing::new(5, Some(fallback.clone())), None)
            .unwrap();

        let request = CommandRequest::new("save");
        manager.execute(&request).await.unwrap();
        assert_eq!(fallback.executions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_mediator_is_reported() {
        let manager = CommandManager::new();
        let err = manager
            .execute(&CommandRequest::new("unknown"))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::NoMediator { .. }));
    }

    #[tokio::test]
    async fn unexecutable_command_is_rejected_before_running() {
        let manager = CommandManager::new();
        let mediator = recording(false);
        manager
            .components()
            .add(Providing::new(0, Some(mediator.clone())), None)
            .unwrap();

        let err = manager
            .execute(&CommandRequest::new("blocked"))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::NotExecutable { .. }));
        assert_eq!(mediator.executions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn listeners_hear_about_created_mediators() {
        struct Auditing {
            names: std::sync::Mutex<Vec<String>>,
        }
        impl Component for Auditing {
            fn register_capabilities(self: Arc<Self>, registrar: &mut CapabilityRegistrar) {
                registrar.register::<dyn CommandListener>(self);
            }
        }
        impl CommandListener for Auditing {
            fn on_mediator_created(
                &self,
                request: &CommandRequest,
                _: &Arc<dyn CommandMediator>,
            ) {
                self.names.lock().unwrap().push(request.name().to_string());
            }
        }

        let manager = CommandManager::new();
        let auditor = Arc::new(Auditing {
            names: std::sync::Mutex::new(Vec::new()),
        });
        manager.components().add(auditor.clone(), None).unwrap();
        manager
            .components()
            .add(Providing::new(0, Some(recording(true))), None)
            .unwrap();

        let resolved = manager.mediator(&CommandRequest::new("open")).unwrap();
        assert!(resolved.is_some());
        assert_eq!(*auditor.names.lock().unwrap(), vec!["open"]);
    }

    #[tokio::test]
    async fn request_parameter_round_trips() {
        let request = CommandRequest::new("with-arg").with_parameter(41u32);
        assert_eq!(request.parameter_as::<u32>(), Some(&41));
        assert_eq!(request.parameter_as::<String>(), None);
    }

    #[tokio::test]
    async fn disposed_manager_rejects_lookups() {
        let manager = CommandManager::new();
        assert!(manager.dispose(None));
        assert!(matches!(
            manager.mediator(&CommandRequest::new("late")),
            Err(DispatchError::Core(_))
        ));
    }
}
