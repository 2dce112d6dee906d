//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{NavigationError, Result};

/// Tunables for one [`Application`](crate::Application).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Window over which history pushes are coalesced.
    pub history_debounce_ms: u64,
    /// Catalog name navigated to when a history-driven navigation fails.
    pub fallback_place: Option<String>,
    /// Restore the pre-navigation location when a walk is vetoed and no
    /// presenter redirected.
    pub rollback_on_veto: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_debounce_ms: 16,
            fallback_place: None,
            rollback_on_veto: true,
        }
    }
}

impl EngineConfig {
    pub fn history_debounce(&self) -> Duration {
        Duration::from_millis(self.history_debounce_ms)
    }

    /// Parse an `EngineConfig` from a YAML string; missing keys keep defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load from a YAML file on disk.
    pub fn from_yaml_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| NavigationError::Config(format!("{}: {}", path, e)))?;
        Self::from_yaml(&content)
    }

    /// Defaults overlaid with `PLACENAV_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    fn overlay(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(raw) = lookup("PLACENAV_HISTORY_DEBOUNCE_MS") {
            self.history_debounce_ms = raw.trim().parse().map_err(|_| {
                NavigationError::Config(format!(
                    "PLACENAV_HISTORY_DEBOUNCE_MS must be an integer, got '{}'",
                    raw
                ))
            })?;
        }
        if let Some(place) = lookup("PLACENAV_FALLBACK_PLACE") {
            let place = place.trim();
            self.fallback_place = (!place.is_empty()).then(|| place.to_string());
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.history_debounce(), Duration::from_millis(16));
        assert!(config.fallback_place.is_none());
        assert!(config.rollback_on_veto);
    }

    #[test]
    fn test_from_yaml_partial() {
        let config = EngineConfig::from_yaml("fallback_place: notfound\n").unwrap();
        assert_eq!(config.fallback_place.as_deref(), Some("notfound"));
        assert_eq!(config.history_debounce_ms, 16);

        let config = EngineConfig::from_yaml(
            "history_debounce_ms: 50\nrollback_on_veto: false\n",
        )
        .unwrap();
        assert_eq!(config.history_debounce_ms, 50);
        assert!(!config.rollback_on_veto);
    }

    #[test]
    fn test_from_yaml_rejects_bad_types() {
        let err = EngineConfig::from_yaml("history_debounce_ms: soon\n").unwrap_err();
        assert!(matches!(err, NavigationError::Config(_)));
    }

    #[test]
    fn test_env_overlay() {
        let vars: HashMap<&str, &str> = [
            ("PLACENAV_HISTORY_DEBOUNCE_MS", "40"),
            ("PLACENAV_FALLBACK_PLACE", "home"),
        ]
        .into_iter()
        .collect();
        let config = EngineConfig::default()
            .overlay(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.history_debounce_ms, 40);
        assert_eq!(config.fallback_place.as_deref(), Some("home"));

        let err = EngineConfig::default()
            .overlay(|_| Some("x".to_string()))
            .unwrap_err();
        assert!(matches!(err, NavigationError::Config(_)));
    }
}
