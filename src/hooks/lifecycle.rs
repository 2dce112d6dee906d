//! Navigation lifecycle hooks.
//!
//! Observers implement [`NavigationHook`] to follow transactions without
//! taking part in them: logging, analytics, test recorders.
//!
//! - All methods have default no-op implementations.
//! - `&self` receivers; hooks are shared and immutable once registered.
//! - Hooks are advisory. Errors are logged and never change the outcome of
//!   a navigation.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::intent::NavigationIntent;
use crate::place::Place;

/// Summary of a committed transaction.
#[derive(Debug, Clone, Serialize)]
pub struct CommitRecord {
    /// Transaction identifier (also used in log lines).
    pub transaction: Uuid,
    /// Committed target place.
    pub place: Place,
    /// Token of the committed target intent.
    pub token: String,
    /// Presenters created during the transaction and kept.
    pub created: Vec<Place>,
    /// Presenters released at commit, deepest first.
    pub released: Vec<Place>,
    /// Number of redirects folded into the transaction.
    pub redirects: usize,
    pub committed_at: DateTime<Utc>,
}

/// Observer of navigation transactions.
pub trait NavigationHook: Send + Sync + 'static {
    /// A top-level transaction opened.
    fn on_start(
        &self,
        _source: Option<&NavigationIntent>,
        _target: &NavigationIntent,
    ) -> Result<(), HookError> {
        Ok(())
    }

    /// A nested navigation retargeted the open transaction.
    fn on_redirect(
        &self,
        _from: &NavigationIntent,
        _to: &NavigationIntent,
        _level: usize,
    ) -> Result<(), HookError> {
        Ok(())
    }

    /// A presenter declined the navigation at `place`.
    fn on_veto(&self, _place: &Place, _target: &NavigationIntent) -> Result<(), HookError> {
        Ok(())
    }

    /// The transaction committed.
    fn on_commit(&self, _record: &CommitRecord) -> Result<(), HookError> {
        Ok(())
    }

    /// The transaction rolled back to its source location.
    fn on_rollback(&self, _target: &NavigationIntent, _reason: &str) -> Result<(), HookError> {
        Ok(())
    }
}

/// Logs transaction events at debug level; commit records are emitted as JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct TraceHook;

impl NavigationHook for TraceHook {
    fn on_redirect(
        &self,
        from: &NavigationIntent,
        to: &NavigationIntent,
        level: usize,
    ) -> Result<(), HookError> {
        log::debug!("navigation redirect {} -> {} (level {})", from, to, level);
        Ok(())
    }

    fn on_commit(&self, record: &CommitRecord) -> Result<(), HookError> {
        let json = serde_json::to_string(record)?;
        log::debug!("navigation commit {}", json);
        Ok(())
    }

    fn on_rollback(&self, target: &NavigationIntent, reason: &str) -> Result<(), HookError> {
        log::debug!("navigation to {} rolled back: {}", target, reason);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// HookError
// ---------------------------------------------------------------------------

/// Failure reported by a [`NavigationHook`]; logged, never propagated.
#[derive(Debug, Clone, Error)]
#[error("navigation hook failed: {message}")]
pub struct HookError {
    pub message: String,
}

impl HookError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for HookError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(err.to_string())
    }
}

impl From<&str> for HookError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

// ---------------------------------------------------------------------------
// HookRegistry
// ---------------------------------------------------------------------------

/// Registered navigation hooks, invoked in registration order.
#[derive(Default)]
pub struct HookRegistry {
    hooks: Vec<Box<dyn NavigationHook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, hook: impl NavigationHook) {
        self.hooks.push(Box::new(hook));
    }

    pub fn register_boxed(&mut self, hook: Box<dyn NavigationHook>) {
        self.hooks.push(hook);
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub fn invoke_on_start(&self, source: Option<&NavigationIntent>, target: &NavigationIntent) {
        for hook in &self.hooks {
            if let Err(e) = hook.on_start(source, target) {
                log::warn!("NavigationHook.on_start error: {}", e);
            }
        }
    }

    pub fn invoke_on_redirect(&self, from: &NavigationIntent, to: &NavigationIntent, level: usize) {
        for hook in &self.hooks {
            if let Err(e) = hook.on_redirect(from, to, level) {
                log::warn!("NavigationHook.on_redirect error: {}", e);
            }
        }
    }

    pub fn invoke_on_veto(&self, place: &Place, target: &NavigationIntent) {
        for hook in &self.hooks {
            if let Err(e) = hook.on_veto(place, target) {
                log::warn!("NavigationHook.on_veto error: {}", e);
            }
        }
    }

    pub fn invoke_on_commit(&self, record: &CommitRecord) {
        for hook in &self.hooks {
            if let Err(e) = hook.on_commit(record) {
                log::warn!("NavigationHook.on_commit error: {}", e);
            }
        }
    }

    pub fn invoke_on_rollback(&self, target: &NavigationIntent, reason: &str) {
        for hook in &self.hooks {
            if let Err(e) = hook.on_rollback(target, reason) {
                log::warn!("NavigationHook.on_rollback error: {}", e);
            }
        }
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry")
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
