//! The navigation engine.
//!
//! [`Application`] owns the live presenter map, the place registry and the
//! history channel. Presenters receive an [`AppHandle`], a weak reference
//! that lets them navigate, build intents and look up sibling presenters
//! without keeping the engine alive.


use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;

use crate::config::EngineConfig;
use crate::errors::{NavigationError, Result};
use crate::history::{ChangeListener, DebouncedHistory, History, TokenProducer};
use crate::hooks::{HookRegistry, NavigationHook};
use crate::intent::NavigationIntent;
use crate::navigation::context::{NavigationContext, PresenterMap};
use crate::navigation::{FlipOptions, NavigationOutcome, NavigationTarget};
use crate::place::{Place, PlaceRegistry};
use crate::presenter::Presenter;

/// Shared engine state.
pub(crate) struct AppInner {
    pub(crate) registry: Arc<PlaceRegistry>,
    pub(crate) config: EngineConfig,
    pub(crate) history: Option<Arc<dyn History>>,
    pub(crate) hooks: HookRegistry,
    /// Recovery target for failed history-driven navigation.
    pub(crate) fallback: Option<Place>,
    /// Live presenters, replaced wholesale at commit.
    pub(crate) live: RwLock<Arc<PresenterMap>>,
    pub(crate) last_place: RwLock<Option<Place>>,
    /// The open transaction, if any.
    pub(crate) txn: Mutex<Option<NavigationContext>>,
    /// Signalled whenever a nested walk returns or a transaction closes.
    pub(crate) settled: Notify,
    shut_down: AtomicBool,
}

impl AppInner {
    pub(crate) fn handle(self: &Arc<Self>) -> AppHandle {
        AppHandle {
            inner: Arc::downgrade(self),
        }
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    pub(crate) fn live_snapshot(&self) -> Arc<PresenterMap> {
        self.live.read().clone()
    }

    pub(crate) fn last_place(&self) -> Option<Place> {
        self.last_place.read().clone()
    }

    pub(crate) fn is_navigating(&self) -> bool {
        self.txn.lock().is_some()
    }

    /// Canonical intent for `place`: every live presenter publishes into it,
    /// root to leaf.
    pub(crate) fn new_intent(&self, place: &Place) -> NavigationIntent {
        let mut intent = NavigationIntent::new(place.clone());
        for active in self.live_snapshot().values() {
            active.presenter.publish_parameters(&mut intent);
        }
        intent
    }

    /// Presenter for `place`, preferring the open transaction's working set.
    pub(crate) fn get_presenter(&self, place: &Place) -> Option<Arc<dyn Presenter>> {
        {
            let txn = self.txn.lock();
            if let Some(active) = txn.as_ref().and_then(|ctx| ctx.working.get(&place.id())) {
                return Some(Arc::clone(&active.presenter));
            }
        }
        self.live
            .read()
            .get(&place.id())
            .map(|active| Arc::clone(&active.presenter))
    }

    pub(crate) async fn flip(
        self: &Arc<Self>,
        place: &Place,
        options: FlipOptions,
    ) -> Result<NavigationOutcome> {
        let mut intent = self.new_intent(place);
        options.apply(&mut intent);
        self.navigate(NavigationTarget::Intent(intent), None).await
    }

    /// Ask the history channel to push the current location.
    pub(crate) fn update_history(self: &Arc<Self>) {
        let Some(history) = &self.history else {
            return;
        };
        let weak = Arc::downgrade(self);
        let producer: TokenProducer = Arc::new(move || {
            let inner = weak.upgrade()?;
            let place = inner.last_place()?;
            Some(inner.new_intent(&place).to_token())
        });
        history.update(producer);
    }

    /// React to a location change the engine did not cause.
    ///
    /// Failures are logged and recovered by navigating to the fallback place;
    /// a failing fallback is logged and left alone.
    pub(crate) async fn handle_external_change(self: &Arc<Self>, token: String) {
        if self.is_navigating() {
            log::debug!("Ignoring external location '{}' during navigation", token);
            return;
        }
        log::debug!("External location change to '{}'", token);
        match self.navigate(NavigationTarget::Token(token.clone()), None).await {
            Ok(NavigationOutcome::Vetoed(_)) | Ok(NavigationOutcome::Ignored) => {
                self.update_history();
            }
            Ok(_) => {}
            Err(err) => {
                log::error!("Navigation to external location '{}' failed: {}", token, err);
                let Some(fallback) = self.fallback.clone() else {
                    self.update_history();
                    return;
                };
                let intent = self.new_intent(&fallback);
                if let Err(err) = self.navigate(NavigationTarget::Intent(intent), None).await {
                    log::error!("Fallback navigation to {} failed: {}", fallback, err);
                }
            }
        }
    }

    fn change_listener(self: &Arc<Self>) -> ChangeListener {
        let weak = Arc::downgrade(self);
        Arc::new(move |token: String| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if inner.is_navigating() {
                log::debug!("Ignoring external location '{}' during navigation", token);
                return;
            }
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    runtime.spawn(async move { inner.handle_external_change(token).await });
                }
                Err(_) => log::warn!(
                    "External location '{}' reported outside a tokio runtime; dropped",
                    token
                ),
            }
        })
    }

    fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(history) = &self.history {
            history.set_on_change(None);
        }
        self.release_all();
        log::debug!("Application shut down");
    }
}

impl Drop for AppInner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ---------------------------------------------------------------------------
// Application
// ---------------------------------------------------------------------------

/// Owner of one presenter tree.
#[derive(Clone)]
pub struct Application {
    pub(crate) inner: Arc<AppInner>,
}

impl Application {
    /// Engine with default configuration and no history channel.
    pub fn new(registry: impl Into<Arc<PlaceRegistry>>) -> Self {
        Self::from_parts(
            registry.into(),
            EngineConfig::default(),
            None,
            HookRegistry::new(),
            None,
        )
    }

    pub fn builder(registry: impl Into<Arc<PlaceRegistry>>) -> ApplicationBuilder {
        ApplicationBuilder::new(registry.into())
    }

    fn from_parts(
        registry: Arc<PlaceRegistry>,
        config: EngineConfig,
        history: Option<Arc<dyn History>>,
        hooks: HookRegistry,
        fallback: Option<Place>,
    ) -> Self {
        Self {
            inner: Arc::new(AppInner {
                registry,
                config,
                history,
                hooks,
                fallback,
                live: RwLock::new(Arc::new(PresenterMap::new())),
                last_place: RwLock::new(None),
                txn: Mutex::new(None),
                settled: Notify::new(),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    /// Install the history listener and navigate to the current location.
    ///
    /// An empty location navigates to `initial`. A location that fails to
    /// apply or leaves nothing committed falls back to the configured
    /// fallback place, then to `initial`.
    pub async fn start(&self, initial: &Place) -> Result<NavigationOutcome> {
        let location = match &self.inner.history {
            Some(history) => {
                history.set_on_change(Some(self.inner.change_listener()));
                history.location()
            }
            None => String::new(),
        };

        let result = if location.is_empty() {
            self.flip(initial, FlipOptions::default()).await
        } else {
            self.navigate(location.as_str()).await
        };
        let recovery = self.inner.fallback.clone().unwrap_or_else(|| initial.clone());
        let same_target = location.is_empty() && recovery == *initial;
        match result {
            Ok(outcome) if self.last_place().is_some() || same_target => return Ok(outcome),
            Ok(outcome) => log::warn!(
                "Initial location '{}' left nothing committed ({:?})",
                location,
                outcome
            ),
            Err(err) if same_target => return Err(err),
            Err(err) => log::error!("Initial location '{}' failed: {}", location, err),
        }
        self.flip(&recovery, FlipOptions::default()).await
    }

    /// Navigate to an intent or a raw token.
    pub async fn navigate(&self, target: impl Into<NavigationTarget>) -> Result<NavigationOutcome> {
        self.inner.navigate(target.into(), None).await
    }

    /// Navigate, replacing an unresolvable target place with `fallback`.
    pub async fn navigate_or(
        &self,
        target: impl Into<NavigationTarget>,
        fallback: &Place,
    ) -> Result<NavigationOutcome> {
        self.inner.navigate(target.into(), Some(fallback)).await
    }

    /// Navigate to `place`, keeping the state live presenters publish.
    pub async fn flip(&self, place: &Place, options: FlipOptions) -> Result<NavigationOutcome> {
        self.inner.flip(place, options).await
    }

    pub fn new_intent(&self, place: &Place) -> NavigationIntent {
        self.inner.new_intent(place)
    }

    /// Canonical intent for the committed location.
    pub fn current_intent(&self) -> Option<NavigationIntent> {
        self.last_place().map(|place| self.new_intent(&place))
    }

    pub fn last_place(&self) -> Option<Place> {
        self.inner.last_place()
    }

    /// Places with a live presenter, root first.
    pub fn active_places(&self) -> Vec<Place> {
        self.inner
            .live_snapshot()
            .values()
            .map(|active| active.place.clone())
            .collect()
    }

    pub fn is_navigating(&self) -> bool {
        self.inner.is_navigating()
    }

    pub fn get_presenter(&self, place: &Place) -> Option<Arc<dyn Presenter>> {
        self.inner.get_presenter(place)
    }

    /// Run `f` against the presenter for `place` if it has type `T`.
    pub fn with_presenter<T: Presenter, R>(&self, place: &Place, f: impl FnOnce(&T) -> R) -> Option<R> {
        let presenter = self.get_presenter(place)?;
        presenter.as_any().downcast_ref::<T>().map(f)
    }

    pub fn registry(&self) -> &Arc<PlaceRegistry> {
        &self.inner.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Push the current location to the history channel.
    pub fn update_history(&self) {
        self.inner.update_history()
    }

    /// Apply a location change reported by something other than the engine.
    pub async fn handle_external_change(&self, token: impl Into<String>) {
        self.inner.handle_external_change(token.into()).await
    }

    pub fn handle(&self) -> AppHandle {
        self.inner.handle()
    }

    /// Release every live presenter deepest first and detach from history.
    /// Later navigation requests are ignored.
    pub fn shutdown(&self) {
        self.inner.shutdown()
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.is_shut_down()
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("last_place", &self.last_place())
            .field("active", &self.active_places())
            .field("navigating", &self.is_navigating())
            .field("hooks", &self.inner.hooks)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

pub struct ApplicationBuilder {
    registry: Arc<PlaceRegistry>,
    config: EngineConfig,
    history: Option<Arc<dyn History>>,
    debounce: bool,
    hooks: HookRegistry,
    fallback: Option<Place>,
}

impl ApplicationBuilder {
    fn new(registry: Arc<PlaceRegistry>) -> Self {
        Self {
            registry,
            config: EngineConfig::default(),
            history: None,
            debounce: false,
            hooks: HookRegistry::new(),
            fallback: None,
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Use `history` as is; it is expected to coalesce updates itself.
    pub fn history(mut self, history: impl History) -> Self {
        let history: Arc<dyn History> = Arc::new(history);
        self.history = Some(history);
        self.debounce = false;
        self
    }

    /// Wrap `history` in a [`DebouncedHistory`] using the configured window.
    pub fn debounced_history(mut self, history: impl History) -> Self {
        let history: Arc<dyn History> = Arc::new(history);
        self.history = Some(history);
        self.debounce = true;
        self
    }

    pub fn hook(mut self, hook: impl NavigationHook) -> Self {
        self.hooks.register(hook);
        self
    }

    /// Recovery target for failed history-driven navigation; overrides
    /// `fallback_place` from the configuration.
    pub fn fallback(mut self, place: Place) -> Self {
        self.fallback = Some(place);
        self
    }

    pub fn build(self) -> Result<Application> {
        let fallback = match (self.fallback, &self.config.fallback_place) {
            (Some(place), _) => Some(place),
            (None, Some(name)) => Some(self.registry.require(name)?),
            (None, None) => None,
        };
        if let Some(place) = &fallback {
            if place.is_detached() {
                return Err(NavigationError::UnboundPlace(place.name().to_string()));
            }
        }
        let history = match self.history {
            Some(history) if self.debounce => {
                let window = self.config.history_debounce();
                Some(Arc::new(DebouncedHistory::from_arc(history, window)) as Arc<dyn History>)
            }
            other => other,
        };
        Ok(Application::from_parts(
            self.registry,
            self.config,
            history,
            self.hooks,
            fallback,
        ))
    }
}

// ---------------------------------------------------------------------------
// AppHandle
// ---------------------------------------------------------------------------

/// Weak handle presenters hold to their application.
#[derive(Clone)]
pub struct AppHandle {
    inner: Weak<AppInner>,
}

impl AppHandle {
    /// A handle not attached to any application.
    pub fn dangling() -> Self {
        Self { inner: Weak::new() }
    }

    pub fn upgrade(&self) -> Option<Application> {
        self.inner.upgrade().map(|inner| Application { inner })
    }

    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }

    fn require(&self) -> Result<Arc<AppInner>> {
        self.inner.upgrade().ok_or(NavigationError::ApplicationDropped)
    }

    pub async fn navigate(&self, target: impl Into<NavigationTarget>) -> Result<NavigationOutcome> {
        let inner = self.require()?;
        inner.navigate(target.into(), None).await
    }

    pub async fn flip(&self, place: &Place, options: FlipOptions) -> Result<NavigationOutcome> {
        let inner = self.require()?;
        inner.flip(place, options).await
    }

    pub fn new_intent(&self, place: &Place) -> Result<NavigationIntent> {
        Ok(self.require()?.new_intent(place))
    }

    pub fn get_presenter(&self, place: &Place) -> Option<Arc<dyn Presenter>> {
        self.inner.upgrade()?.get_presenter(place)
    }

    pub fn with_presenter<T: Presenter, R>(&self, place: &Place, f: impl FnOnce(&T) -> R) -> Option<R> {
        let presenter = self.get_presenter(place)?;
        presenter.as_any().downcast_ref::<T>().map(f)
    }

    pub fn registry(&self) -> Option<Arc<PlaceRegistry>> {
        self.inner.upgrade().map(|inner| Arc::clone(&inner.registry))
    }
}

impl std::fmt::Debug for AppHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppHandle")
            .field("alive", &self.is_alive())
            .finish()
    }
}
