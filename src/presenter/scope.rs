//! Presenter scopes.
//!
//! A scope is the presenter's view-model as far as the engine is concerned:
//! an identity the rendering layer looks views up by, and an update channel
//! the rendering layer installs on attach and removes on detach. The engine
//! only ever calls [`Scope::update`].

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use uuid::Uuid;

/// Identity of a scope for view lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub Uuid);

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Callback the rendering layer installs to receive update notifications.
pub type UpdateFn = Arc<dyn Fn() + Send + Sync>;

pub struct Scope {
    id: ScopeId,
    notifier: RwLock<Option<UpdateFn>>,
}

impl Default for Scope {
    fn default() -> Self {
        Self {
            id: ScopeId(Uuid::new_v4()),
            notifier: RwLock::new(None),
        }
    }
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(&self) -> ScopeId {
        self.id
    }

    /// Install the update channel (replaces any previous one).
    pub fn attach(&self, notifier: UpdateFn) {
        *self.notifier.write() = Some(notifier);
    }

    /// Remove the update channel; later updates are no-ops.
    pub fn detach(&self) {
        *self.notifier.write() = None;
    }

    pub fn is_attached(&self) -> bool {
        self.notifier.read().is_some()
    }

    /// Notify the rendering layer; a no-op while detached.
    pub fn update(&self) {
        let notifier = self.notifier.read().clone();
        if let Some(notify) = notifier {
            notify();
        }
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.id)
            .field("attached", &self.is_attached())
            .finish()
    }
}
