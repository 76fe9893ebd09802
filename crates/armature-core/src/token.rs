//! One-shot release tokens
//!
//! An [`ActionToken`] is a move-only handle that runs its action exactly
//! once: either when [`ActionToken::release`] consumes it, or on drop if
//! it was never released explicitly. Subscription handles and other
//! scoped registrations are built on top of it.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

type Action = Box<dyn FnOnce() + Send + 'static>;

/// A move-only, single-shot release handle.
///
/// The wrapped action runs at most once regardless of how the token is
/// consumed. Dropping an unreleased token runs the action, so holding a
/// token is enough to scope a registration.
pub struct ActionToken {
    action: Mutex<Option<Action>>,
    released: AtomicBool,
}

impl ActionToken {
    /// Wrap an action to be run on release or drop.
    pub fn new(action: impl FnOnce() + Send + 'static) -> Self {
        Self {
            action: Mutex::new(Some(Box::new(action))),
            released: AtomicBool::new(false),
        }
    }

    /// A token with no action; useful as a placeholder.
    pub fn noop() -> Self {
        Self {
            action: Mutex::new(None),
            released: AtomicBool::new(true),
        }
    }

    /// Run the action now, consuming the token.
    pub fn release(self) {
        self.run_once();
    }

    /// Whether the action has already run (or the token was a no-op).
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    fn run_once(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            if let Some(action) = self.action.lock().take() {
                action();
            }
        }
    }
}

impl Drop for ActionToken {
    fn drop(&mut self) {
        self.run_once();
    }
}

impl std::fmt::Debug for ActionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionToken")
            .field("released", &self.is_released())
            .finish()
    }
}
