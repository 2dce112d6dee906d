//! Walk, commit and rollback.

use std::sync::Arc;

use chrono::Utc;

use super::context::{Active, NavigationContext, Phase, PresenterMap, Step};
use super::{NavigationOutcome, NavigationTarget};
use crate::application::AppInner;
use crate::errors::{NavigationError, Result};
use crate::hooks::CommitRecord;
use crate::intent::NavigationIntent;
use crate::place::Place;
use crate::presenter::Presenter;

/// How a request entered the engine.
enum Entry {
    /// Opened a new transaction at generation 0.
    Open,
    /// Folded into the open transaction at this generation.
    Nested {
        generation: u64,
        prior: Arc<NavigationIntent>,
        level: usize,
        id: uuid::Uuid,
    },
    Ignored,
}

impl AppInner {
    /// Run a navigation request.
    ///
    /// `fallback` replaces a target that does not resolve to a bound place;
    /// the parsed parameters and attributes are carried over.
    pub(crate) async fn navigate(
        self: &Arc<Self>,
        target: NavigationTarget,
        fallback: Option<&Place>,
    ) -> Result<NavigationOutcome> {
        if self.is_shut_down() {
            log::warn!("Navigation requested after shutdown; ignoring");
            return Ok(NavigationOutcome::Ignored);
        }

        let mut intent = match target {
            NavigationTarget::Intent(intent) => intent,
            NavigationTarget::Token(token) => NavigationIntent::parse(&token, &*self.registry),
        };
        if intent.place().is_detached() {
            if let Some(fallback) = fallback {
                log::warn!(
                    "Unknown place '{}', falling back to {}",
                    intent.place().name(),
                    fallback
                );
                intent = intent.redirect(fallback.clone());
            }
        }
        if intent.place().is_detached() {
            return Err(NavigationError::UnboundPlace(intent.place().name().to_string()));
        }

        let source = self.last_place().map(|place| self.new_intent(&place));
        let entry = {
            let mut txn = self.txn.lock();
            match txn.as_mut() {
                None => {
                    let working = self.live_snapshot().as_ref().clone();
                    *txn = Some(NavigationContext::open(source, intent.clone(), working));
                    Entry::Open
                }
                Some(ctx) if ctx.phase == Phase::RollingBack => Entry::Ignored,
                Some(ctx) => match ctx.redirect(intent.clone()) {
                    Ok((generation, prior)) => Entry::Nested {
                        generation,
                        prior,
                        level: ctx.level,
                        id: ctx.id,
                    },
                    Err(cycle) => {
                        log::warn!("[{}] {}", ctx.id, cycle);
                        return Err(NavigationError::Cycle(cycle));
                    }
                },
            }
        };

        match entry {
            Entry::Open => self.spawn_outermost(intent).await,
            Entry::Nested {
                generation,
                prior,
                level,
                id,
            } => {
                log::debug!(
                    "[{}] redirect {} -> {} at level {}",
                    id,
                    prior,
                    intent,
                    level
                );
                let nested = NestedWalk {
                    inner: self,
                    id,
                    generation,
                    target: intent.place().clone(),
                    finished: false,
                };
                self.hooks.invoke_on_redirect(&prior, &intent, level);
                self.run_nested(nested).await
            }
            Entry::Ignored => {
                log::warn!("Navigation to {} requested during rollback; ignoring", intent);
                Ok(NavigationOutcome::Ignored)
            }
        }
    }

    /// Drive a newly opened transaction to commit or rollback.
    ///
    /// The transaction runs on its own task so that dropping the caller's
    /// future cannot leave it half open; the caller only stops waiting.
    async fn spawn_outermost(self: &Arc<Self>, intent: NavigationIntent) -> Result<NavigationOutcome> {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return self.run_outermost(&intent).await;
        };
        let inner = Arc::clone(self);
        let task = runtime.spawn(async move { inner.run_outermost(&intent).await });
        match task.await {
            Ok(result) => result,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(_) => Err(NavigationError::Cancelled),
        }
    }

    async fn run_outermost(self: &Arc<Self>, target: &NavigationIntent) -> Result<NavigationOutcome> {
        let (id, source) = {
            let txn = self.txn.lock();
            match txn.as_ref() {
                Some(ctx) => (ctx.id, ctx.source.clone()),
                None => return Ok(NavigationOutcome::Ignored),
            }
        };
        let _open = OpenTransaction { inner: self, id };
        log::debug!(
            "[{}] navigation opened: {} -> {}",
            id,
            source.as_ref().map(NavigationIntent::to_token).unwrap_or_default(),
            target
        );
        self.hooks.invoke_on_start(source.as_ref(), target);

        let own = self.walk(0).await;
        self.finish_walk(0, &own);
        self.conclude(own).await
    }

    async fn run_nested(self: &Arc<Self>, mut nested: NestedWalk<'_>) -> Result<NavigationOutcome> {
        let result = self.walk(nested.generation).await;
        self.finish_walk(nested.generation, &result);
        nested.finished = true;
        let place = nested.target.clone();
        drop(nested);

        match result? {
            Step::Vetoed(at) => Ok(NavigationOutcome::Vetoed(at)),
            Step::Completed | Step::Superseded => Ok(NavigationOutcome::Redirected(place)),
        }
    }

    fn finish_walk(&self, generation: u64, result: &Result<Step>) {
        let mut txn = self.txn.lock();
        let Some(ctx) = txn.as_mut() else {
            return;
        };
        match result {
            Ok(step) => ctx.finish_walk(generation, step),
            Err(NavigationError::Cycle(_)) => {}
            Err(err) => {
                let place = ctx.target.place().clone();
                ctx.record_failure(&place, err.to_string());
            }
        }
    }

    /// Wait until every nested walk of the open transaction has returned.
    async fn wait_settled(&self) {
        loop {
            let notified = self.settled.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            let pending = {
                let txn = self.txn.lock();
                txn.as_ref().map_or(0, |ctx| ctx.pending)
            };
            if pending == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Walk the current target path for `generation`, root to leaf.
    async fn walk(self: &Arc<Self>, generation: u64) -> Result<Step> {
        let (id, target) = {
            let txn = self.txn.lock();
            match txn.as_ref() {
                Some(ctx) if ctx.is_current(generation) => (ctx.id, Arc::clone(&ctx.target)),
                _ => return Ok(Step::Superseded),
            }
        };

        for place in target.place().path() {
            let deepest = place == *target.place();
            let existing = {
                let txn = self.txn.lock();
                match txn.as_ref() {
                    Some(ctx) if ctx.is_current(generation) => {
                        ctx.working.get(&place.id()).map(|a| Arc::clone(&a.presenter))
                    }
                    _ => return Ok(Step::Superseded),
                }
            };

            let (presenter, initializing) = match existing {
                Some(presenter) => (presenter, false),
                None => {
                    let presenter = self.registry.instantiate(&place, self.handle())?;
                    let kept = {
                        let mut txn = self.txn.lock();
                        match txn.as_mut() {
                            Some(ctx) if ctx.is_current(generation) => {
                                ctx.working.insert(
                                    place.id(),
                                    Active {
                                        place: place.clone(),
                                        presenter: Arc::clone(&presenter),
                                    },
                                );
                                ctx.created.push(place.id());
                                true
                            }
                            _ => false,
                        }
                    };
                    if !kept {
                        release_logged(&place, presenter.as_ref());
                        return Ok(Step::Superseded);
                    }
                    log::debug!("[{}] created presenter for {}", id, place);
                    (presenter, true)
                }
            };

            log::debug!(
                "[{}] apply {} (initializing={}, deepest={})",
                id,
                place,
                initializing,
                deepest
            );
            let accepted = presenter
                .apply_parameters(&target, initializing, deepest)
                .await
                .map_err(|source| NavigationError::Presenter {
                    place: place.path_name().to_string(),
                    source,
                })?;

            if !self.is_current(generation) {
                return Ok(Step::Superseded);
            }
            if !accepted {
                log::warn!("[{}] {} vetoed navigation to {}", id, place, target);
                self.hooks.invoke_on_veto(&place, &target);
                return Ok(Step::Vetoed(place));
            }
        }
        Ok(Step::Completed)
    }

    fn is_current(&self, generation: u64) -> bool {
        let txn = self.txn.lock();
        txn.as_ref().is_some_and(|ctx| ctx.is_current(generation))
    }

    /// Decide the fate of the transaction once every walk has returned.
    ///
    /// A request that lands between the decision and the commit moves the
    /// generation on; the commit then declines and the decision is retaken.
    async fn conclude(self: &Arc<Self>, own: Result<Step>) -> Result<NavigationOutcome> {
        let mut own = Some(own);
        loop {
            self.wait_settled().await;
            let (id, cycle, failure, outcome, target, generation) = {
                let mut txn = self.txn.lock();
                let Some(ctx) = txn.as_mut() else {
                    return Ok(NavigationOutcome::Ignored);
                };
                if ctx.pending > 0 {
                    continue;
                }
                (
                    ctx.id,
                    ctx.cycle.take(),
                    ctx.failure.take(),
                    ctx.outcome.take(),
                    Arc::clone(&ctx.target),
                    ctx.generation,
                )
            };

            if let Some(cycle) = cycle {
                self.rollback("redirect cycle").await;
                return Err(NavigationError::cycle(&cycle));
            }
            let own_step = match own.take() {
                Some(Ok(step)) => step,
                Some(Err(err)) => {
                    self.rollback("presenter failure").await;
                    return Err(err);
                }
                None => Step::Superseded,
            };
            if let Some(failure) = failure {
                self.rollback("presenter failure").await;
                return Err(NavigationError::Presenter {
                    place: failure.place,
                    source: anyhow::anyhow!(failure.message),
                });
            }

            let committed = match outcome.unwrap_or(own_step) {
                Step::Completed => {
                    self.commit_or_rollback(target.place().clone(), generation)
                        .await?
                }
                Step::Vetoed(at) if self.config.rollback_on_veto => {
                    self.rollback("vetoed").await;
                    return Ok(NavigationOutcome::Vetoed(at));
                }
                Step::Vetoed(at) => self
                    .commit_or_rollback(at.clone(), generation)
                    .await?
                    .map(|_| NavigationOutcome::Vetoed(at)),
                Step::Superseded => {
                    log::warn!("[{}] navigation to {} finished without a completed walk", id, target);
                    self.rollback("superseded").await;
                    return Ok(NavigationOutcome::Ignored);
                }
            };
            match committed {
                Some(outcome) => return Ok(outcome),
                None => log::debug!("[{}] retargeted before commit; deciding again", id),
            }
        }
    }

    async fn commit_or_rollback(
        self: &Arc<Self>,
        place: Place,
        generation: u64,
    ) -> Result<Option<NavigationOutcome>> {
        match self.commit(&place, generation) {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                self.rollback("inconsistent presenter set").await;
                Err(err)
            }
        }
    }

    /// Install the presenters on `place`'s path as the live set.
    ///
    /// The live map is swapped while the transaction lock is held, so a new
    /// transaction never observes a mix of old and new presenters.
    ///
    /// Returns `None` without touching anything when the transaction has
    /// moved past `generation` or a nested walk is still running.
    fn commit(self: &Arc<Self>, place: &Place, generation: u64) -> Result<Option<NavigationOutcome>> {
        let path = place.path();
        let (ctx, committed, leftovers) = {
            let mut txn = self.txn.lock();
            let ctx = match txn.as_mut() {
                Some(ctx) => ctx,
                None => return Ok(Some(NavigationOutcome::Ignored)),
            };
            if ctx.generation != generation || ctx.pending > 0 {
                return Ok(None);
            }
            if let Some(missing) = path.iter().find(|p| !ctx.working.contains_key(&p.id())) {
                return Err(NavigationError::MissingPresenter(missing.path_name().to_string()));
            }
            let Some(mut ctx) = txn.take() else {
                return Ok(Some(NavigationOutcome::Ignored));
            };

            let mut committed = PresenterMap::new();
            for p in &path {
                if let Some(active) = ctx.working.remove(&p.id()) {
                    committed.insert(p.id(), active);
                }
            }
            let leftovers: Vec<Active> = std::mem::take(&mut ctx.working).into_values().rev().collect();
            let committed = Arc::new(committed);
            *self.live.write() = Arc::clone(&committed);
            *self.last_place.write() = Some(place.clone());
            (ctx, committed, leftovers)
        };
        self.settled.notify_waiters();

        for active in &leftovers {
            log::debug!("[{}] releasing {}", ctx.id, active.place);
            release_logged(&active.place, active.presenter.as_ref());
        }
        for active in committed.values() {
            active.presenter.compute_derived_fields();
        }
        for active in committed.values() {
            active.presenter.scope().update();
        }

        let record = CommitRecord {
            transaction: ctx.id,
            place: place.clone(),
            token: self.new_intent(place).to_token(),
            created: ctx
                .created
                .iter()
                .filter_map(|id| committed.get(id).map(|a| a.place.clone()))
                .collect(),
            released: leftovers.iter().map(|a| a.place.clone()).collect(),
            redirects: ctx.redirects,
            committed_at: Utc::now(),
        };
        log::info!(
            "[{}] committed {} ({} created, {} released, {} redirects)",
            ctx.id,
            record.token,
            record.created.len(),
            record.released.len(),
            record.redirects
        );
        self.hooks.invoke_on_commit(&record);
        self.update_history();
        Ok(Some(NavigationOutcome::Committed(place.clone())))
    }

    /// Restore the source location and discard presenters created since open.
    ///
    /// Navigation requests issued by presenters while the source is
    /// re-applied are ignored.
    async fn rollback(self: &Arc<Self>, reason: &str) {
        let (id, source, target, created) = {
            let mut txn = self.txn.lock();
            let Some(ctx) = txn.as_mut() else {
                return;
            };
            ctx.phase = Phase::RollingBack;
            (
                ctx.id,
                ctx.source.clone(),
                Arc::clone(&ctx.target),
                ctx.created_presenters(),
            )
        };
        log::warn!("[{}] rolling back navigation to {}: {}", id, target, reason);

        if let Some(source) = source {
            let live = self.live_snapshot();
            for active in live.values() {
                let deepest = active.place == *source.place();
                match active.presenter.apply_parameters(&source, false, deepest).await {
                    Ok(true) => {}
                    Ok(false) => log::warn!(
                        "[{}] {} declined the restored location {}",
                        id,
                        active.place,
                        source
                    ),
                    Err(err) => log::error!(
                        "[{}] {} failed to restore {}: {:#}",
                        id,
                        active.place,
                        source,
                        err
                    ),
                }
            }
        }

        for active in &created {
            log::debug!("[{}] releasing {}", id, active.place);
            release_logged(&active.place, active.presenter.as_ref());
        }

        {
            let mut txn = self.txn.lock();
            *txn = None;
        }
        self.settled.notify_waiters();
        self.hooks.invoke_on_rollback(&target, reason);
    }

    /// Close transaction `id` without re-applying the source location.
    ///
    /// Presenters it created are released deepest first.
    fn abandon(&self, id: uuid::Uuid) {
        let ctx = {
            let mut txn = self.txn.lock();
            if !txn.as_ref().is_some_and(|ctx| ctx.id == id) {
                return;
            }
            txn.take()
        };
        self.settled.notify_waiters();
        let Some(ctx) = ctx else {
            return;
        };
        log::warn!("[{}] navigation to {} abandoned", id, ctx.target);
        for active in ctx.created_presenters() {
            release_logged(&active.place, active.presenter.as_ref());
        }
        self.hooks.invoke_on_rollback(&ctx.target, "abandoned");
    }

    /// Release every presenter the engine still holds, deepest first.
    pub(crate) fn release_all(&self) {
        let working = {
            let mut txn = self.txn.lock();
            txn.take().map(|ctx| ctx.working).unwrap_or_default()
        };
        let live = std::mem::take(&mut *self.live.write());
        *self.last_place.write() = None;

        let mut all: PresenterMap = live.as_ref().clone();
        all.extend(working);
        for active in all.values().rev() {
            release_logged(&active.place, active.presenter.as_ref());
        }
        self.settled.notify_waiters();
    }
}

/// Closes the transaction if the walk driving it unwinds before deciding.
struct OpenTransaction<'a> {
    inner: &'a AppInner,
    id: uuid::Uuid,
}

impl Drop for OpenTransaction<'_> {
    fn drop(&mut self) {
        self.inner.abandon(self.id);
    }
}

/// Accounts for one nested walk; the opener waits until every one is dropped.
struct NestedWalk<'a> {
    inner: &'a AppInner,
    id: uuid::Uuid,
    generation: u64,
    target: Place,
    finished: bool,
}

impl Drop for NestedWalk<'_> {
    fn drop(&mut self) {
        {
            let mut txn = self.inner.txn.lock();
            if let Some(ctx) = txn.as_mut().filter(|ctx| ctx.id == self.id) {
                ctx.leave_nested();
            }
        }
        if !self.finished {
            log::warn!(
                "[{}] redirect to {} dropped before its walk finished",
                self.id,
                self.target
            );
        }
        self.inner.settled.notify_waiters();
    }
}

/// Release a presenter, logging instead of propagating failures.
fn release_logged(place: &Place, presenter: &dyn Presenter) {
    if let Err(err) = presenter.release() {
        log::error!("Failed to release presenter for {}: {:#}", place, err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::{AppHandle, Application};
    use crate::place::PlaceRegistry;
    use crate::presenter::tests::NullPresenter;

    fn null(app: AppHandle) -> anyhow::Result<Arc<dyn Presenter>> {
        Ok(Arc::new(NullPresenter::new(app)))
    }

    #[tokio::test]
    async fn test_commit_declines_once_retargeted() {
        let mut registry = PlaceRegistry::new();
        let root = registry.create("root", null, None).unwrap();
        let a = registry.create("a", null, Some(&root)).unwrap();
        let b = registry.create("b", null, Some(&root)).unwrap();
        let app = Application::new(registry);
        let inner = &app.inner;

        let mut working = PresenterMap::new();
        for place in [&root, &a, &b] {
            let presenter = inner.registry.instantiate(place, inner.handle()).unwrap();
            working.insert(
                place.id(),
                Active {
                    place: place.clone(),
                    presenter,
                },
            );
        }
        let mut ctx = NavigationContext::open(None, NavigationIntent::new(a.clone()), working);
        ctx.redirect(NavigationIntent::new(b.clone())).unwrap();
        *inner.txn.lock() = Some(ctx);

        // The walk for generation 0 finished, but a redirect is now walking.
        assert!(inner.commit(&a, 0).unwrap().is_none());
        assert!(inner.commit(&b, 1).unwrap().is_none());
        assert!(inner.is_navigating());
        assert!(app.active_places().is_empty());

        inner.txn.lock().as_mut().unwrap().leave_nested();
        let outcome = inner.commit(&b, 1).unwrap();
        assert_eq!(outcome, Some(NavigationOutcome::Committed(b.clone())));
        assert!(!inner.is_navigating());
        assert_eq!(app.active_places(), vec![root, b]);
    }

    #[tokio::test]
    async fn test_abandon_only_closes_its_own_transaction() {
        let mut registry = PlaceRegistry::new();
        let root = registry.create("root", null, None).unwrap();
        let app = Application::new(registry);
        let inner = &app.inner;

        let ctx = NavigationContext::open(None, NavigationIntent::new(root), PresenterMap::new());
        let id = ctx.id;
        *inner.txn.lock() = Some(ctx);

        inner.abandon(uuid::Uuid::new_v4());
        assert!(inner.is_navigating());
        inner.abandon(id);
        assert!(!inner.is_navigating());
    }
}
