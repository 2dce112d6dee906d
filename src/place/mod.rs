//! Places: the static navigation tree.
//!
//! A [`Place`] is an immutable node identifying one addressable location.
//! Its ancestor chain is captured once at construction, so the root-to-self
//! [`path`](Place::path) never changes. Places are cheap to clone (shared
//! via `Arc`) and compare by their canonical path name.
//!
//! Bound places are created through a [`PlaceRegistry`], which also owns the
//! presenter factory table keyed by [`PlaceId`]. Detached places (id `-1`) are
//! placeholders produced for unknown token paths; they cannot host a presenter.

pub mod registry;

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize, Serializer};

pub use registry::{PlaceRegistry, PlaceResolver};

/// Separator used in canonical path names.
pub const PATH_SEPARATOR: char = '/';

/// Registry-unique place identifier.
///
/// Bound ids are bucketed by depth (`depth * 1000 + sequence`), so a larger id
/// is always at least as deep as a smaller one. Releasing in reverse id order
/// therefore releases leaves before their ancestors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlaceId(pub i64);

impl PlaceId {
    /// Id carried by every detached place.
    pub const DETACHED: PlaceId = PlaceId(-1);

    /// Width of one depth bucket.
    pub const BUCKET: i64 = 1000;

    pub(crate) fn for_depth(depth: usize, sequence: i64) -> Self {
        PlaceId(depth as i64 * Self::BUCKET + sequence)
    }

    pub fn is_detached(self) -> bool {
        self == Self::DETACHED
    }
}

impl fmt::Display for PlaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct PlaceInner {
    name: String,
    id: PlaceId,
    /// Root-first ancestor chain, self excluded.
    ancestors: Vec<Place>,
    path_name: String,
}

/// An addressable location in the navigation tree.
#[derive(Clone)]
pub struct Place {
    inner: Arc<PlaceInner>,
}

impl Place {
    pub(crate) fn bound(name: &str, id: PlaceId, parent: Option<&Place>) -> Self {
        let ancestors = match parent {
            Some(parent) => {
                let mut chain = parent.inner.ancestors.clone();
                chain.push(parent.clone());
                chain
            }
            None => Vec::new(),
        };
        let path_name = match parent {
            Some(parent) => format!("{}{}{}", parent.path_name(), PATH_SEPARATOR, name),
            None => name.to_string(),
        };
        Self {
            inner: Arc::new(PlaceInner {
                name: name.to_string(),
                id,
                ancestors,
                path_name,
            }),
        }
    }

    /// Build an unbound placeholder place.
    ///
    /// Detached places resolve unknown token paths. They have an empty path
    /// and fail with `UnboundPlace` when used as a navigation target.
    pub fn detached(name: &str) -> Self {
        Self {
            inner: Arc::new(PlaceInner {
                name: name.to_string(),
                id: PlaceId::DETACHED,
                ancestors: Vec::new(),
                path_name: name.to_string(),
            }),
        }
    }

    /// Segment label; also the catalog key used in tokens.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn id(&self) -> PlaceId {
        self.inner.id
    }

    /// Canonical `/`-joined path name; the place's navigational identity.
    pub fn path_name(&self) -> &str {
        &self.inner.path_name
    }

    pub fn is_detached(&self) -> bool {
        self.inner.id.is_detached()
    }

    pub fn parent(&self) -> Option<&Place> {
        self.inner.ancestors.last()
    }

    /// Number of ancestors (roots have depth 0).
    pub fn depth(&self) -> usize {
        self.inner.ancestors.len()
    }

    /// Root-first chain of places ending with `self`.
    ///
    /// Empty for detached places.
    pub fn path(&self) -> Vec<Place> {
        if self.is_detached() {
            return Vec::new();
        }
        let mut path = self.inner.ancestors.clone();
        path.push(self.clone());
        path
    }

    /// Whether `self` is a strict ancestor of `other`.
    pub fn is_ancestor_of(&self, other: &Place) -> bool {
        other.inner.ancestors.iter().any(|a| a == self)
    }

    /// Whether `self` lies on the root-to-`target` path (ancestor or self).
    pub fn is_on_path_to(&self, target: &Place) -> bool {
        !target.is_detached() && (self == target || self.is_ancestor_of(target))
    }
}

impl PartialEq for Place {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner) || self.path_name() == other.path_name()
    }
}

impl Eq for Place {}

impl Hash for Place {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path_name().hash(state);
    }
}

impl fmt::Display for Place {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path_name())
    }
}

impl fmt::Debug for Place {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Place({}#{})", self.path_name(), self.id())
    }
}

impl Serialize for Place {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.path_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> (Place, Place, Place) {
        let root = Place::bound("root", PlaceId::for_depth(0, 1), None);
        let restricted = Place::bound("restricted", PlaceId::for_depth(1, 1), Some(&root));
        let cart = Place::bound("cart", PlaceId::for_depth(2, 1), Some(&restricted));
        (root, restricted, cart)
    }

    #[test]
    fn test_path_is_root_first_and_ends_with_self() {
        let (root, restricted, cart) = tree();
        let path = cart.path();
        assert_eq!(path, vec![root.clone(), restricted.clone(), cart.clone()]);
        assert_eq!(cart.path_name(), "root/restricted/cart");
        assert_eq!(cart.to_string(), "root/restricted/cart");
        assert_eq!(cart.depth(), 2);
        assert_eq!(cart.parent(), Some(&restricted));
        assert_eq!(root.path(), vec![root.clone()]);
    }

    #[test]
    fn test_ancestry() {
        let (root, restricted, cart) = tree();
        assert!(root.is_ancestor_of(&cart));
        assert!(restricted.is_ancestor_of(&cart));
        assert!(!cart.is_ancestor_of(&root));
        assert!(!cart.is_ancestor_of(&cart));
        assert!(cart.is_on_path_to(&cart));
        assert!(root.is_on_path_to(&cart));
    }

    #[test]
    fn test_detached_place() {
        let place = Place::detached("nowhere");
        assert!(place.is_detached());
        assert_eq!(place.id(), PlaceId::DETACHED);
        assert!(place.path().is_empty());
        assert_eq!(place.path_name(), "nowhere");
        assert!(place.parent().is_none());
    }

    #[test]
    fn test_identity_is_path_name() {
        let (root, _, _) = tree();
        let twin = Place::bound("root", PlaceId::for_depth(0, 7), None);
        assert_eq!(root, twin);
        let other = Place::bound("other", PlaceId::for_depth(0, 2), None);
        assert_ne!(root, other);
    }

    #[test]
    fn test_ids_are_bucketed_by_depth() {
        assert_eq!(PlaceId::for_depth(0, 1), PlaceId(1));
        assert_eq!(PlaceId::for_depth(2, 3), PlaceId(2003));
        assert!(PlaceId::for_depth(1, 999) < PlaceId::for_depth(2, 1));
    }

    #[test]
    fn test_place_serializes_as_path_name() {
        let (_, _, cart) = tree();
        let json = serde_json::to_string(&cart).unwrap();
        assert_eq!(json, "\"root/restricted/cart\"");
    }
}
