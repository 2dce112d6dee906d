//! # placenav
//!
//! Hierarchical, place-based navigation for UIs built from nested presenters.
//!
//! Every addressable location is a [`Place`] in a static tree. Navigating to a
//! place walks its path root to leaf inside one transaction: presenters shared
//! with the previous location are kept and re-applied, missing ones are
//! created, and presenters that fall off the path are released, deepest first,
//! only once the whole walk succeeded. A presenter may veto the walk or
//! redirect it (a guard sending the user to `login`); redirects are folded
//! into the running transaction and redirect loops are reported as errors.
//!
//! The current location is mirrored into a [`History`] channel as a token
//! such as `cart?s=1&c=1234`, and external location changes (back/forward)
//! are applied as ordinary navigations.

pub mod application;
pub mod config;
pub mod errors;
pub mod history;
pub mod hooks;
pub mod intent;
pub mod navigation;
pub mod place;
pub mod presenter;

pub use application::{AppHandle, Application, ApplicationBuilder};
pub use config::EngineConfig;
pub use errors::{CycleError, NavigationError, Result};
pub use history::{DebouncedHistory, History, MemoryHistory};
pub use hooks::{CommitRecord, HookError, HookRegistry, NavigationHook, TraceHook};
pub use intent::{NavigationIntent, ParamValue, Parameters, Scalar};
pub use navigation::{FlipOptions, NavigationOutcome, NavigationTarget};
pub use place::{Place, PlaceId, PlaceRegistry, PlaceResolver};
pub use presenter::{ConstructPresenter, Presenter, PresenterCore, PresenterFactory, Scope, TypedFactory};
