//! Place catalog and presenter factory table.
//!
//! One registry is built at application wiring time and shared (behind an
//! `Arc`) by the engine and the token parser. Several registries may coexist,
//! e.g. one per test, because nothing here is process-global.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::{Place, PlaceId, PATH_SEPARATOR};
use crate::application::AppHandle;
use crate::errors::{NavigationError, Result};
use crate::presenter::{Presenter, PresenterFactory};

/// Resolves a token path segment to a place.
pub trait PlaceResolver {
    /// Look up a place by catalog name or canonical path name.
    fn resolve(&self, name: &str) -> Option<Place>;
}

/// Name-to-place catalog plus the id-keyed presenter factory table.
#[derive(Default)]
pub struct PlaceRegistry {
    /// Places in registration order.
    places: Vec<Place>,
    /// Catalog name -> index into `places`.
    by_name: HashMap<String, usize>,
    /// Canonical path name -> index into `places`.
    by_path: HashMap<String, usize>,
    factories: HashMap<PlaceId, Arc<dyn PresenterFactory>>,
    /// Next sequence number per depth bucket.
    sequences: HashMap<usize, i64>,
}

impl PlaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a bound place and register its presenter factory.
    ///
    /// `parent` must already belong to this registry. Catalog names are
    /// unique and may not contain the path separator or token delimiters.
    pub fn create(
        &mut self,
        name: &str,
        factory: impl PresenterFactory,
        parent: Option<&Place>,
    ) -> Result<Place> {
        if name.is_empty() || name.contains([PATH_SEPARATOR, '?', '&', '=', '#']) {
            return Err(NavigationError::InvalidPlaceName(name.to_string()));
        }
        if self.by_name.contains_key(name) {
            return Err(NavigationError::DuplicatePlace(name.to_string()));
        }
        if let Some(parent) = parent {
            if !self.by_path.contains_key(parent.path_name()) || parent.is_detached() {
                return Err(NavigationError::UnknownPlace(parent.path_name().to_string()));
            }
        }

        let depth = parent.map_or(0, |p| p.depth() + 1);
        let sequence = self.sequences.entry(depth).or_insert(0);
        *sequence += 1;
        if *sequence >= PlaceId::BUCKET {
            return Err(NavigationError::Config(format!(
                "more than {} places at depth {}",
                PlaceId::BUCKET - 1,
                depth
            )));
        }
        let id = PlaceId::for_depth(depth, *sequence);

        let place = Place::bound(name, id, parent);
        let index = self.places.len();
        self.by_name.insert(name.to_string(), index);
        self.by_path.insert(place.path_name().to_string(), index);
        self.factories.insert(id, Arc::new(factory));
        self.places.push(place.clone());

        log::debug!("Registered place {} with id {}", place, id);
        Ok(place)
    }

    /// Build an unbound placeholder (not added to the catalog).
    pub fn create_detached(&self, name: &str) -> Place {
        Place::detached(name)
    }

    /// Look up a place by catalog name or canonical path name.
    pub fn get(&self, name: &str) -> Option<&Place> {
        self.by_name
            .get(name)
            .or_else(|| self.by_path.get(name))
            .map(|&index| &self.places[index])
    }

    /// Look up a place, failing with `UnknownPlace`.
    pub fn require(&self, name: &str) -> Result<Place> {
        self.get(name)
            .cloned()
            .ok_or_else(|| NavigationError::UnknownPlace(name.to_string()))
    }

    /// All registered places in registration order.
    pub fn places(&self) -> impl Iterator<Item = &Place> {
        self.places.iter()
    }

    pub fn len(&self) -> usize {
        self.places.len()
    }

    pub fn is_empty(&self) -> bool {
        self.places.is_empty()
    }

    /// Run the factory registered for `place`.
    pub fn instantiate(&self, place: &Place, app: AppHandle) -> Result<Arc<dyn Presenter>> {
        if place.is_detached() {
            return Err(NavigationError::UnboundPlace(place.name().to_string()));
        }
        let factory = self
            .factories
            .get(&place.id())
            .ok_or_else(|| NavigationError::UnknownPlace(place.path_name().to_string()))?;
        factory
            .create(app)
            .map_err(|source| NavigationError::Factory {
                place: place.path_name().to_string(),
                source,
            })
    }
}

impl PlaceResolver for PlaceRegistry {
    fn resolve(&self, name: &str) -> Option<Place> {
        self.get(name).cloned()
    }
}

impl fmt::Debug for PlaceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaceRegistry")
            .field("places", &self.places)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presenter::tests::NullPresenter;

    fn factory() -> impl PresenterFactory {
        |app: AppHandle| -> anyhow::Result<Arc<dyn Presenter>> { Ok(Arc::new(NullPresenter::new(app))) }
    }

    #[test]
    fn test_ids_bucket_per_depth() {
        let mut registry = PlaceRegistry::new();
        let root = registry.create("root", factory(), None).unwrap();
        let a = registry.create("a", factory(), Some(&root)).unwrap();
        let b = registry.create("b", factory(), Some(&root)).unwrap();
        let leaf = registry.create("leaf", factory(), Some(&a)).unwrap();

        assert_eq!(root.id(), PlaceId(1));
        assert_eq!(a.id(), PlaceId(1001));
        assert_eq!(b.id(), PlaceId(1002));
        assert_eq!(leaf.id(), PlaceId(2001));
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn test_resolve_by_name_and_path() {
        let mut registry = PlaceRegistry::new();
        let root = registry.create("root", factory(), None).unwrap();
        let cart = registry.create("cart", factory(), Some(&root)).unwrap();

        assert_eq!(registry.resolve("cart"), Some(cart.clone()));
        assert_eq!(registry.resolve("root/cart"), Some(cart));
        assert_eq!(registry.resolve("missing"), None);
        assert!(matches!(
            registry.require("missing"),
            Err(NavigationError::UnknownPlace(_))
        ));
    }

    #[test]
    fn test_duplicate_and_invalid_names_rejected() {
        let mut registry = PlaceRegistry::new();
        let root = registry.create("root", factory(), None).unwrap();
        assert!(matches!(
            registry.create("root", factory(), None),
            Err(NavigationError::DuplicatePlace(_))
        ));
        assert!(matches!(
            registry.create("a/b", factory(), Some(&root)),
            Err(NavigationError::InvalidPlaceName(_))
        ));
        assert!(matches!(
            registry.create("", factory(), None),
            Err(NavigationError::InvalidPlaceName(_))
        ));
    }

    #[test]
    fn test_foreign_parent_rejected() {
        let mut first = PlaceRegistry::new();
        let foreign = first.create("foreign", factory(), None).unwrap();
        let mut second = PlaceRegistry::new();
        assert!(matches!(
            second.create("child", factory(), Some(&foreign)),
            Err(NavigationError::UnknownPlace(_))
        ));
    }

    #[test]
    fn test_detached_cannot_instantiate() {
        let registry = PlaceRegistry::new();
        let ghost = registry.create_detached("ghost");
        let result = registry.instantiate(&ghost, AppHandle::dangling());
        assert!(matches!(result, Err(NavigationError::UnboundPlace(name)) if name == "ghost"));
    }

    #[test]
    fn test_instantiate_runs_factory() {
        let mut registry = PlaceRegistry::new();
        let root = registry.create("root", factory(), None).unwrap();
        let presenter = registry.instantiate(&root, AppHandle::dangling()).unwrap();
        assert!(presenter.as_any().downcast_ref::<NullPresenter>().is_some());
    }
}
