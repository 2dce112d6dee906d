//! Navigation transactions.
//!
//! A navigation runs as one transaction per application: the first request
//! opens a [`NavigationContext`](context::NavigationContext), walks the target
//! path root to leaf, and either commits the new presenter set or rolls back
//! to the source location. Requests arriving while a transaction is open
//! (typically a guard presenter redirecting from inside `apply_parameters`)
//! retarget that transaction instead of opening a second one.

pub(crate) mod context;
mod driver;

use std::collections::HashMap;

use crate::intent::{Attribute, NavigationIntent, ParamValue, Parameters};
use crate::place::Place;

/// What a navigation request resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationOutcome {
    /// The transaction committed with this place as the new location.
    Committed(Place),
    /// The request was folded into an open transaction as a redirect to
    /// this place; the outermost caller reports the final result.
    Redirected(Place),
    /// A presenter at this place declined the navigation and nothing
    /// redirected elsewhere.
    Vetoed(Place),
    /// The request was dropped (rollback in progress or engine shut down).
    Ignored,
}

impl NavigationOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, NavigationOutcome::Committed(_))
    }

    /// Place the outcome refers to, if any.
    pub fn place(&self) -> Option<&Place> {
        match self {
            NavigationOutcome::Committed(place)
            | NavigationOutcome::Redirected(place)
            | NavigationOutcome::Vetoed(place) => Some(place),
            NavigationOutcome::Ignored => None,
        }
    }
}

/// Navigation request: a structured intent or a raw location token.
#[derive(Debug, Clone)]
pub enum NavigationTarget {
    Intent(NavigationIntent),
    Token(String),
}

impl From<NavigationIntent> for NavigationTarget {
    fn from(intent: NavigationIntent) -> Self {
        NavigationTarget::Intent(intent)
    }
}

impl From<&str> for NavigationTarget {
    fn from(token: &str) -> Self {
        NavigationTarget::Token(token.to_string())
    }
}

impl From<String> for NavigationTarget {
    fn from(token: String) -> Self {
        NavigationTarget::Token(token)
    }
}

/// Overrides applied on top of the canonical intent in `flip`.
#[derive(Clone, Default)]
pub struct FlipOptions {
    pub params: Parameters,
    pub attrs: HashMap<String, Attribute>,
}

impl FlipOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.insert(name, value.into());
        self
    }

    pub fn attr(mut self, name: impl Into<String>, value: Attribute) -> Self {
        self.attrs.insert(name.into(), value);
        self
    }

    pub(crate) fn apply(self, intent: &mut NavigationIntent) {
        intent.merge_parameters(&self.params);
        for (name, value) in self.attrs {
            intent.insert_attribute(name, value);
        }
    }
}

impl std::fmt::Debug for FlipOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut attrs: Vec<_> = self.attrs.keys().collect();
        attrs.sort();
        f.debug_struct("FlipOptions")
            .field("params", &self.params)
            .field("attrs", &attrs)
            .finish()
    }
}
