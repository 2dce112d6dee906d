//! Location history channel.
//!
//! The engine talks to the outside world's notion of "current location"
//! (a browser address bar, an in-memory stack, a deep-link handler) only
//! through [`History`]:
//!
//! - [`History::location`] reads the current external token.
//! - [`History::update`] is called after every committed navigation with a
//!   producer of the current canonical token. Implementations may defer and
//!   coalesce calls; see [`DebouncedHistory`].
//! - [`History::set_on_change`] installs the listener the channel invokes
//!   when the location changes independently of the engine.

pub mod debounce;
pub mod memory;

use std::sync::Arc;

pub use debounce::DebouncedHistory;
pub use memory::MemoryHistory;

/// Produces the canonical token for the engine's current location, or
/// `None` once the engine is gone.
pub type TokenProducer = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// Receives externally changed location tokens.
pub type ChangeListener = Arc<dyn Fn(String) + Send + Sync>;

pub trait History: Send + Sync + 'static {
    /// Current external location token (empty when none).
    fn location(&self) -> String;

    /// Push the engine's current location.
    fn update(&self, producer: TokenProducer);

    /// Install or remove the external change listener.
    fn set_on_change(&self, listener: Option<ChangeListener>);
}

impl<H: History + ?Sized> History for Arc<H> {
    fn location(&self) -> String {
        (**self).location()
    }

    fn update(&self, producer: TokenProducer) {
        (**self).update(producer)
    }

    fn set_on_change(&self, listener: Option<ChangeListener>) {
        (**self).set_on_change(listener)
    }
}
