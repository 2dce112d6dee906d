//! Error types for the navigation engine.

use thiserror::Error;

/// Convenience alias used across the engine.
pub type Result<T> = std::result::Result<T, NavigationError>;

/// Details of a redirect loop detected inside one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleError {
    /// Location the transaction started from (empty on first navigation).
    pub source: String,
    /// Target the transaction was walking when the redirect was requested.
    pub prior_target: String,
    /// Redirect target that had already been visited.
    pub offending_target: String,
}

impl std::fmt::Display for CycleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "navigation cycle from '{}': redirect from '{}' to already visited '{}'",
            self.source, self.prior_target, self.offending_target
        )
    }
}

/// Errors raised by places, intents and the navigation engine.
#[derive(Debug, Error)]
pub enum NavigationError {
    /// A presenter redirected to a place already visited in the same transaction.
    #[error("{0}")]
    Cycle(CycleError),

    /// A detached (unbound) place was used as a navigation target.
    #[error("Place '{0}' is not bound to a presenter and cannot be navigated to")]
    UnboundPlace(String),

    /// A catalog lookup failed.
    #[error("Unknown place: {0}")]
    UnknownPlace(String),

    /// Two places were registered under the same catalog name.
    #[error("Place already registered: {0}")]
    DuplicatePlace(String),

    /// A place name cannot be used as a token path segment.
    #[error("Invalid place name '{0}'")]
    InvalidPlaceName(String),

    /// A presenter failed while applying parameters.
    #[error("Presenter for '{place}' failed: {source}")]
    Presenter {
        place: String,
        #[source]
        source: anyhow::Error,
    },

    /// A presenter factory failed to build its presenter.
    #[error("Failed to create presenter for '{place}': {source}")]
    Factory {
        place: String,
        #[source]
        source: anyhow::Error,
    },

    /// The working presenter set lost a presenter for a place on the committed path.
    #[error("No presenter available for '{0}' at commit")]
    MissingPresenter(String),

    /// A weak application handle outlived its engine.
    #[error("Application has been dropped")]
    ApplicationDropped,

    /// The runtime cancelled the task running the transaction.
    #[error("Navigation was cancelled before it finished")]
    Cancelled,

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl NavigationError {
    /// Whether this error signals a redirect loop.
    pub fn is_cycle(&self) -> bool {
        matches!(self, NavigationError::Cycle(_))
    }

    /// Rebuild a transferable copy of a cycle error.
    ///
    /// Cycle errors are recorded on the transaction and re-raised by the
    /// outermost walk even if a presenter swallowed the nested failure.
    pub(crate) fn cycle(details: &CycleError) -> Self {
        NavigationError::Cycle(details.clone())
    }
}

impl From<serde_yaml::Error> for NavigationError {
    fn from(err: serde_yaml::Error) -> Self {
        NavigationError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_names_all_targets() {
        let err = NavigationError::Cycle(CycleError {
            source: "home".into(),
            prior_target: "root/b".into(),
            offending_target: "root/a".into(),
        });
        let msg = err.to_string();
        assert!(msg.contains("home"));
        assert!(msg.contains("root/b"));
        assert!(msg.contains("root/a"));
        assert!(err.is_cycle());
    }

    #[test]
    fn test_presenter_error_keeps_source() {
        let err = NavigationError::Presenter {
            place: "root/cart".into(),
            source: anyhow::anyhow!("backend unavailable"),
        };
        assert_eq!(
            err.to_string(),
            "Presenter for 'root/cart' failed: backend unavailable"
        );
        assert!(std::error::Error::source(&err).is_some());
        assert!(!err.is_cycle());
    }
}
