//! Presenter lifecycle contract.
//!
//! One presenter exists per active place. The engine drives it through:
//!
//! - [`Presenter::apply_parameters`] on every navigation whose path includes
//!   the place (`initializing` only on the first call). Returning `false`
//!   vetoes the walk below this place. The call may itself navigate; that
//!   request is folded into the running transaction as a redirect.
//! - [`Presenter::compute_derived_fields`] once per commit, after every
//!   presenter on the committed path applied successfully.
//! - [`Presenter::publish_parameters`] whenever the engine rebuilds the
//!   canonical intent for the current location.
//! - [`Presenter::release`] exactly once when the place leaves the active path.
//!
//! Receivers are `&self`; presenters keep their state behind interior
//! mutability, the same way lifecycle hooks do.

pub mod scope;

use std::any::Any;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::application::AppHandle;
use crate::intent::NavigationIntent;

pub use scope::{Scope, ScopeId, UpdateFn};

/// Per-place controller owning a scope.
#[async_trait]
pub trait Presenter: Send + Sync + 'static {
    /// Shared presenter state (application handle, scope, release flag).
    fn core(&self) -> &PresenterCore;

    /// Apply the target intent to this presenter.
    ///
    /// `deepest` is true when this presenter's place is the navigation target
    /// itself rather than an ancestor on the way there.
    async fn apply_parameters(
        &self,
        intent: &NavigationIntent,
        initializing: bool,
        deepest: bool,
    ) -> anyhow::Result<bool>;

    /// Contribute durable state to an intent being rebuilt. Must not mutate
    /// presenter state.
    fn publish_parameters(&self, _intent: &mut NavigationIntent) {}

    /// Recompute values that depend on state finalized by other presenters
    /// during the same transaction.
    fn compute_derived_fields(&self) {}

    /// Presenter-specific cleanup, run at most once by [`release`](Self::release).
    fn on_release(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Detach the scope and run cleanup. Later calls are no-ops.
    fn release(&self) -> anyhow::Result<()> {
        if !self.core().mark_released() {
            return Ok(());
        }
        self.core().scope().detach();
        self.on_release()
    }

    /// Downcasting support for typed presenter lookups.
    fn as_any(&self) -> &dyn Any;

    fn scope(&self) -> &Scope {
        self.core().scope()
    }
}

/// State every presenter carries.
#[derive(Debug)]
pub struct PresenterCore {
    app: AppHandle,
    scope: Scope,
    released: AtomicBool,
}

impl PresenterCore {
    pub fn new(app: AppHandle) -> Self {
        Self {
            app,
            scope: Scope::new(),
            released: AtomicBool::new(false),
        }
    }

    /// Handle to the owning application.
    pub fn app(&self) -> &AppHandle {
        &self.app
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Flip the released flag; true only for the first caller.
    pub fn mark_released(&self) -> bool {
        !self.released.swap(true, Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Factories
// ---------------------------------------------------------------------------

/// Builds the presenter for one place.
///
/// The registry keeps one factory per place id. Closures of the right shape
/// are factories; [`TypedFactory`] builds presenters implementing
/// [`ConstructPresenter`].
pub trait PresenterFactory: Send + Sync + 'static {
    fn create(&self, app: AppHandle) -> anyhow::Result<Arc<dyn Presenter>>;
}

impl<F> PresenterFactory for F
where
    F: Fn(AppHandle) -> anyhow::Result<Arc<dyn Presenter>> + Send + Sync + 'static,
{
    fn create(&self, app: AppHandle) -> anyhow::Result<Arc<dyn Presenter>> {
        self(app)
    }
}

/// Presenters constructible from an application handle alone.
pub trait ConstructPresenter: Presenter + Sized {
    fn construct(app: AppHandle) -> anyhow::Result<Self>;
}

/// Factory for a [`ConstructPresenter`] type.
pub struct TypedFactory<P>(PhantomData<fn() -> P>);

impl<P> TypedFactory<P> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<P> Default for TypedFactory<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: ConstructPresenter> PresenterFactory for TypedFactory<P> {
    fn create(&self, app: AppHandle) -> anyhow::Result<Arc<dyn Presenter>> {
        Ok(Arc::new(P::construct(app)?))
    }
}
