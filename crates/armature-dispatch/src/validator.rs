//! Async validation pipeline
//!
//! `validate(member)` fans out across every attached validator
//! component, joins their results, and publishes the aggregated error
//! set. Validation is serialized per member with last-writer-wins
//! semantics: a new request for a member cancels the in-flight one, the
//! superseded call resolves as canceled, and only the winning run
//! touches the error store. One failing component is logged and skipped;
//! its siblings still contribute.

use crate::error::{DispatchError, DispatchResult};
use armature_core::{ComponentCollection, ComponentOwner, MetadataContext};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

/// One validation finding for a member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub member: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(member: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            member: member.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.member, self.message)
    }
}

/// Validator capability: produces findings for one member.
///
/// Implementations should observe `token` at their own suspension
/// points; a canceled run's output is discarded either way.
#[async_trait]
pub trait ValidatorComponent: Send + Sync + 'static {
    async fn validate(
        &self,
        member: &str,
        metadata: Option<&MetadataContext>,
        token: &CancellationToken,
    ) -> DispatchResult<Vec<ValidationError>>;
}

/// Listener capability: notified after a member's error set changed.
pub trait ValidationListener: Send + Sync + 'static {
    fn on_errors_changed(&self, member: &str, errors: &[ValidationError]);
}

struct InFlight {
    run_id: Uuid,
    token: CancellationToken,
}

/// The validation pipeline owner.
pub struct Validator {
    owner: ComponentOwner,
    errors: DashMap<String, Vec<ValidationError>>,
    in_flight: DashMap<String, InFlight>,
    root: CancellationToken,
}

impl Validator {
    pub fn new() -> Self {
        Self {
            owner: ComponentOwner::new("validator"),
            errors: DashMap::new(),
            in_flight: DashMap::new(),
            root: CancellationToken::new(),
        }
    }

    pub fn components(&self) -> &Arc<ComponentCollection> {
        self.owner.components()
    }

    pub fn is_disposed(&self) -> bool {
        self.owner.is_disposed()
    }

    /// Validate one member across every validator component.
    ///
    /// Returns the aggregated findings of the winning run, or
    /// [`DispatchError::Canceled`] when this run was superseded by a
    /// newer request for the same member (or the validator disposed).
    pub async fn validate(
        &self,
        member: &str,
        metadata: Option<&MetadataContext>,
    ) -> DispatchResult<Vec<ValidationError>> {
        self.owner.ensure_alive()?;
        if member.is_empty() {
            return Err(
                armature_core::CoreError::InvalidArgument("member name must not be empty".into())
                    .into(),
            );
        }

        let run_id = Uuid::new_v4();
        let token = self.root.child_token();
        if let Some(previous) = self.in_flight.insert(
            member.to_string(),
            InFlight {
                run_id,
                token: token.clone(),
            },
        ) {
            debug!(member, "superseding in-flight validation");
            previous.token.cancel();
        }

        let components = self
            .owner
            .components()
            .capabilities::<dyn ValidatorComponent>();
        let runs = components
            .iter()
            .map(|component| component.validate(member, metadata, &token));

        let results = tokio::select! {
            results = futures::future::join_all(runs) => results,
            _ = token.cancelled() => {
                return Err(DispatchError::Canceled { member: member.to_string() });
            }
        };
        if token.is_cancelled() {
            return Err(DispatchError::Canceled {
                member: member.to_string(),
            });
        }

        let mut findings = Vec::new();
        for result in results {
            match result {
                Ok(mut errors) => findings.append(&mut errors),
                Err(e) => warn!(member, error = %e, "validator component failed; skipping"),
            }
        }

        // Only the current run may publish; a loser that slipped past
        // the cancellation checks must not clobber the winner.
        let still_current = self
            .in_flight
            .remove_if(member, |_, in_flight| in_flight.run_id == run_id)
            .is_some();
        if !still_current {
            return Err(DispatchError::Canceled {
                member: member.to_string(),
            });
        }

        if findings.is_empty() {
            self.errors.remove(member);
        } else {
            self.errors.insert(member.to_string(), findings.clone());
        }

        for listener in self
            .owner
            .components()
            .capabilities::<dyn ValidationListener>()
        {
            listener.on_errors_changed(member, &findings);
        }
        debug!(member, findings = findings.len(), "validation completed");
        Ok(findings)
    }

    /// Current findings for one member.
    pub fn errors(&self, member: &str) -> Vec<ValidationError> {
        self.errors
            .get(member)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Every member with findings, with its findings.
    pub fn all_errors(&self) -> Vec<(String, Vec<ValidationError>)> {
        self.errors
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Drop the findings for one member and notify listeners.
    pub fn clear_errors(&self, member: &str) -> DispatchResult<()> {
        self.owner.ensure_alive()?;
        if self.errors.remove(member).is_some() {
            for listener in self
                .owner
                .components()
                .capabilities::<dyn ValidationListener>()
            {
                listener.on_errors_changed(member, &[]);
            }
        }
        Ok(())
    }

    /// Dispose the validator: cancel every in-flight run and detach all
    /// components exactly once.
    pub fn dispose(&self, metadata: Option<&MetadataContext>) -> bool {
        if !self.owner.dispose(metadata) {
            return false;
        }
        self.root.cancel();
        self.in_flight.clear();
        true
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use armature_core::{CapabilityRegistrar, Component};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct RuleComponent {
        priority: i32,
        message: Option<&'static str>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl RuleComponent {
        fn failing(message: &'static str) -> Arc<Self> {
            Arc::new(Self {
                priority: 0,
                message: Some(message),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            })
        }

        fn passing() -> Arc<Self> {
            Arc::new(Self {
                priority: 0,
                message: None,
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            })
        }

        fn slow(message: &'static str, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                priority: 0,
                message: Some(message),
                delay,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl Component for RuleComponent {
        fn priority(&self) -> i32 {
            self.priority
        }

        fn register_capabilities(self: Arc<Self>, registrar: &mut CapabilityRegistrar) {
            registrar.register::<dyn ValidatorComponent>(self);
        }
    }

    #[async_trait]
    impl ValidatorComponent for RuleComponent {
        async fn validate(
            &self,
            member: &str,
            _: Option<&MetadataContext>,
            token: &CancellationToken,
        ) -> DispatchResult<Vec<ValidationError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(self.delay) => {}
                    _ = token.cancelled() => {
                        return Err(DispatchError::Canceled { member: member.to_string() });
                    }
                }
            }
            Ok(self
                .message
                .map(|message| vec![ValidationError::new(member, message)])
                .unwrap_or_default())
        }
    }

    #[tokio::test]
    async fn findings_from_all_components_are_aggregated() {
        let validator = Validator::new();
        validator
            .components()
            .add(RuleComponent::failing("too short"), None)
            .unwrap();
        validator
            .components()
            .add(RuleComponent::passing(), None)
            .unwrap();
        validator
            .components()
            .add(RuleComponent::failing("reserved name"), None)
            .unwrap();

        let findings = validator.validate("name", None).await.unwrap();
        assert_eq!(findings.len(), 2);
        assert_eq!(validator.errors("name"), findings);
        assert!(validator.has_errors());
    }

    #[tokio::test]
    async fn passing_run_clears_previous_findings() {
        let validator = Validator::new();
        let rule = RuleComponent::failing("bad");
        validator.components().add(rule.clone(), None).unwrap();
        validator.validate("field", None).await.unwrap();
        assert!(validator.has_errors());

        validator.components().remove(&rule, None).unwrap();
        let findings = validator.validate("field", None).await.unwrap();
        assert!(findings.is_empty());
        assert!(!validator.has_errors());
    }

    #[tokio::test]
    async fn newer_request_supersedes_the_in_flight_one() {
        let validator = Arc::new(Validator::new());
        let slow = RuleComponent::slow("slow finding", Duration::from_secs(5));
        validator.components().add(slow.clone(), None).unwrap();

        let first = {
            let validator = validator.clone();
            tokio::spawn(async move { validator.validate("member", None).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Swap in a fast rule; the in-flight run keeps its snapshot.
        validator.components().remove(&slow, None).unwrap();
        validator
            .components()
            .add(RuleComponent::failing("fast finding"), None)
            .unwrap();
        let second = validator.validate("member", None).await.unwrap();

        let first = first.await.unwrap();
        assert!(matches!(first, Err(DispatchError::Canceled { .. })));
        assert_eq!(validator.errors("member"), second);
        assert!(second.iter().any(|e| e.message == "fast finding"));
    }

    #[tokio::test]
    async fn validating_different_members_runs_independently() {
        let validator = Validator::new();
        validator
            .components()
            .add(RuleComponent::failing("always"), None)
            .unwrap();

        validator.validate("a", None).await.unwrap();
        validator.validate("b", None).await.unwrap();

        let mut members: Vec<_> = validator
            .all_errors()
            .into_iter()
            .map(|(member, _)| member)
            .collect();
        members.sort();
        assert_eq!(members, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn empty_member_name_fails_fast() {
        let validator = Validator::new();
        let err = validator.validate("", None).await.unwrap_err();
        assert!(matches!(err, DispatchError::Core(_)));
    }

    #[tokio::test]
    async fn dispose_cancels_in_flight_runs() {
        let validator = Arc::new(Validator::new());
        validator
            .components()
            .add(
                RuleComponent::slow("never lands", Duration::from_secs(5)),
                None,
            )
            .unwrap();

        let run = {
            let validator = validator.clone();
            tokio::spawn(async move { validator.validate("member", None).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(validator.dispose(None));
        let outcome = run.await.unwrap();
        assert!(matches!(outcome, Err(DispatchError::Canceled { .. })));
        assert!(!validator.has_errors());
        assert!(matches!(
            validator.validate("member", None).await,
            Err(DispatchError::Core(_))
        ));
    }

    #[tokio::test]
    async fn listener_sees_the_aggregated_error_set() {
        struct Watching {
            seen: std::sync::Mutex<Vec<(String, usize)>>,
        }
        impl Component for Watching {
            fn register_capabilities(self: Arc<Self>, registrar: &mut CapabilityRegistrar) {
                registrar.register::<dyn ValidationListener>(self);
            }
        }
        impl ValidationListener for Watching {
            fn on_errors_changed(&self, member: &str, errors: &[ValidationError]) {
                self.seen
                    .lock()
                    .unwrap()
                    .push((member.to_string(), errors.len()));
            }
        }

        let validator = Validator::new();
        let watcher = Arc::new(Watching {
            seen: std::sync::Mutex::new(Vec::new()),
        });
        validator.components().add(watcher.clone(), None).unwrap();
        validator
            .components()
            .add(RuleComponent::failing("nope"), None)
            .unwrap();

        validator.validate("field", None).await.unwrap();
        validator.clear_errors("field").unwrap();

        let seen = watcher.seen.lock().unwrap().clone();
        assert_eq!(seen, vec![("field".to_string(), 1), ("field".to_string(), 0)]);
    }
}
