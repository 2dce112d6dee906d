//! Hooks for observing navigation transactions.

pub mod lifecycle;

pub use lifecycle::{CommitRecord, HookError, HookRegistry, NavigationHook, TraceHook};
