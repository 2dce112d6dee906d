//! Transaction state for one navigation.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use uuid::Uuid;

use crate::errors::CycleError;
use crate::intent::NavigationIntent;
use crate::place::{Place, PlaceId};
use crate::presenter::Presenter;

/// A presenter bound to the place it was created for.
#[derive(Clone)]
pub(crate) struct Active {
    pub place: Place,
    pub presenter: Arc<dyn Presenter>,
}

/// Presenters keyed by place id; iteration order is root to leaf.
pub(crate) type PresenterMap = BTreeMap<PlaceId, Active>;

/// Result of walking one target path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Step {
    /// Every presenter on the path accepted.
    Completed,
    /// The presenter at this place returned `false`.
    Vetoed(Place),
    /// A redirect replaced the target while this walk was in flight.
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Walking,
    RollingBack,
}

/// A presenter failure raised by a nested walk.
#[derive(Debug, Clone)]
pub(crate) struct Failure {
    pub place: String,
    pub message: String,
}

/// One open navigation transaction.
pub(crate) struct NavigationContext {
    pub id: Uuid,
    /// Canonical intent of the location the transaction started from.
    pub source: Option<NavigationIntent>,
    pub target: Arc<NavigationIntent>,
    /// Nesting depth of redirect requests currently walking.
    pub level: usize,
    /// Bumped whenever the target changes; walks compare against it.
    pub generation: u64,
    pub redirects: usize,
    /// Path names requested as targets, with request counts.
    visited: HashMap<String, usize>,
    /// Live presenters at open plus everything created since.
    pub working: PresenterMap,
    /// Places whose presenters were created by this transaction.
    pub created: Vec<PlaceId>,
    pub cycle: Option<CycleError>,
    pub failure: Option<Failure>,
    /// Outcome of the walk for the latest generation.
    pub outcome: Option<Step>,
    /// Nested walks still running.
    pub pending: usize,
    pub phase: Phase,
}

impl NavigationContext {
    pub fn open(
        source: Option<NavigationIntent>,
        target: NavigationIntent,
        working: PresenterMap,
    ) -> Self {
        let mut visited = HashMap::new();
        visited.insert(target.place().path_name().to_string(), 1);
        Self {
            id: Uuid::new_v4(),
            source,
            target: Arc::new(target),
            level: 0,
            generation: 0,
            redirects: 0,
            visited,
            working,
            created: Vec::new(),
            cycle: None,
            failure: None,
            outcome: None,
            pending: 0,
            phase: Phase::Walking,
        }
    }

    pub fn source_token(&self) -> String {
        self.source
            .as_ref()
            .map(NavigationIntent::to_token)
            .unwrap_or_default()
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.phase == Phase::Walking && self.generation == generation
    }

    /// Retarget the transaction for a nested request.
    ///
    /// Returns the new generation and the replaced target. A target already
    /// requested in this transaction is a cycle: the failure is recorded and
    /// the generation bumped so running walks stop at their next step.
    pub fn redirect(
        &mut self,
        target: NavigationIntent,
    ) -> std::result::Result<(u64, Arc<NavigationIntent>), CycleError> {
        let path_name = target.place().path_name().to_string();
        let seen = self.visited.entry(path_name).or_insert(0);
        *seen += 1;
        if *seen > 1 {
            let cycle = CycleError {
                source: self.source_token(),
                prior_target: self.target.to_token(),
                offending_target: target.to_token(),
            };
            self.generation += 1;
            if self.cycle.is_none() {
                self.cycle = Some(cycle.clone());
            }
            return Err(cycle);
        }

        let prior = std::mem::replace(&mut self.target, Arc::new(target));
        self.generation += 1;
        self.redirects += 1;
        self.level += 1;
        self.pending += 1;
        Ok((self.generation, prior))
    }

    /// Record the end of a walk.
    pub fn finish_walk(&mut self, generation: u64, step: &Step) {
        if self.generation == generation {
            self.outcome = Some(step.clone());
        }
    }

    pub fn record_failure(&mut self, place: &Place, message: String) {
        if self.failure.is_none() {
            self.failure = Some(Failure {
                place: place.path_name().to_string(),
                message,
            });
        }
    }

    /// Close a nested walk opened by [`redirect`](Self::redirect).
    pub fn leave_nested(&mut self) {
        self.level = self.level.saturating_sub(1);
        self.pending = self.pending.saturating_sub(1);
    }

    /// Presenters created by this transaction, deepest first.
    pub fn created_presenters(&self) -> Vec<Active> {
        let mut ids = self.created.clone();
        ids.sort_unstable_by(|a, b| b.cmp(a));
        ids.iter()
            .filter_map(|id| self.working.get(id).cloned())
            .collect()
    }
}

impl std::fmt::Debug for NavigationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NavigationContext")
            .field("id", &self.id)
            .field("target", &self.target.to_token())
            .field("level", &self.level)
            .field("generation", &self.generation)
            .field("working", &self.working.keys().collect::<Vec<_>>())
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::AppHandle;
    use crate::place::PlaceRegistry;
    use crate::presenter::tests::NullPresenter;

    fn places() -> (Place, Place, Place) {
        let factory = |app: AppHandle| -> anyhow::Result<Arc<dyn Presenter>> {
            Ok(Arc::new(NullPresenter::new(app)))
        };
        let mut registry = PlaceRegistry::new();
        let root = registry.create("root", factory, None).unwrap();
        let a = registry.create("a", factory, Some(&root)).unwrap();
        let b = registry.create("b", factory, Some(&root)).unwrap();
        (root, a, b)
    }

    #[test]
    fn test_redirect_back_to_start_is_cycle() {
        let (root, a, b) = places();
        let source = NavigationIntent::new(root);
        let mut ctx = NavigationContext::open(
            Some(source),
            NavigationIntent::new(a.clone()),
            PresenterMap::new(),
        );

        let (generation, prior) = ctx.redirect(NavigationIntent::new(b)).unwrap();
        assert_eq!(generation, 1);
        assert_eq!(prior.place(), &a);
        assert_eq!(ctx.level, 1);
        assert_eq!(ctx.pending, 1);

        let cycle = ctx.redirect(NavigationIntent::new(a)).unwrap_err();
        assert_eq!(cycle.source, "root");
        assert_eq!(cycle.prior_target, "b");
        assert_eq!(cycle.offending_target, "a");
        assert_eq!(ctx.cycle, Some(cycle));
        assert!(!ctx.is_current(1));
    }

    #[test]
    fn test_redirect_to_current_target_is_cycle() {
        let (_, a, _) = places();
        let mut ctx = NavigationContext::open(None, NavigationIntent::new(a.clone()), PresenterMap::new());
        let cycle = ctx.redirect(NavigationIntent::new(a)).unwrap_err();
        assert_eq!(cycle.source, "");
        assert_eq!(ctx.redirects, 0);
    }

    #[test]
    fn test_outcome_only_recorded_for_latest_generation() {
        let (_, a, b) = places();
        let mut ctx = NavigationContext::open(None, NavigationIntent::new(a.clone()), PresenterMap::new());
        let (generation, _) = ctx.redirect(NavigationIntent::new(b)).unwrap();

        ctx.finish_walk(generation, &Step::Completed);
        ctx.finish_walk(0, &Step::Superseded);
        assert_eq!(ctx.outcome, Some(Step::Completed));

        ctx.leave_nested();
        assert_eq!(ctx.level, 0);
        assert_eq!(ctx.pending, 0);
    }

    #[test]
    fn test_first_failure_wins() {
        let (_, a, b) = places();
        let mut ctx = NavigationContext::open(None, NavigationIntent::new(a.clone()), PresenterMap::new());
        ctx.record_failure(&a, "first".into());
        ctx.record_failure(&b, "second".into());
        let failure = ctx.failure.unwrap();
        assert_eq!(failure.place, "root/a");
        assert_eq!(failure.message, "first");
    }
}
