//! Navigation intents: where to go, with which state.
//!
//! An intent binds one target [`Place`] to serializable parameters and to
//! transient attributes. Parameters survive the token round trip; attributes
//! (typed handles such as a scope slot callback) never do.

pub mod params;
pub mod token;

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::place::{Place, PlaceResolver};

pub use params::{ParamValue, Parameters, Scalar, ScalarKind};

/// Shared transient value carried by an intent.
pub type Attribute = Arc<dyn Any + Send + Sync>;

/// Target place plus parameters and attributes.
#[derive(Clone, Serialize)]
pub struct NavigationIntent {
    place: Place,
    parameters: Parameters,
    #[serde(skip)]
    attributes: HashMap<String, Attribute>,
}

impl NavigationIntent {
    pub fn new(place: Place) -> Self {
        Self {
            place,
            parameters: Parameters::new(),
            attributes: HashMap::new(),
        }
    }

    /// Parse a location token.
    ///
    /// Unknown path segments resolve to a detached place, which fails only
    /// once the intent is used as a navigation target.
    pub fn parse(token: &str, resolver: &dyn PlaceResolver) -> Self {
        let (path, query) = token::split(token);
        let place = token::resolve_place(path, resolver);
        let parameters = query.map(token::decode_query).unwrap_or_default();
        Self {
            place,
            parameters,
            attributes: HashMap::new(),
        }
    }

    pub fn place(&self) -> &Place {
        &self.place
    }

    /// Copy parameters and attributes onto an intent for another place.
    pub fn redirect(&self, place: Place) -> Self {
        Self {
            place,
            parameters: self.parameters.clone(),
            attributes: self.attributes.clone(),
        }
    }

    // -----------------------------------------------------------------------
    // Parameters
    // -----------------------------------------------------------------------

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn set_param(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> &mut Self {
        self.parameters.insert(name, value.into());
        self
    }

    /// Assign or delete: `None` removes the key.
    pub fn set_optional<V: Into<ParamValue>>(&mut self, name: &str, value: Option<V>) -> &mut Self {
        match value {
            Some(value) => {
                self.parameters.insert(name, value.into());
            }
            None => {
                self.parameters.remove(name);
            }
        }
        self
    }

    /// Builder form of [`set_param`](Self::set_param).
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.parameters.insert(name, value.into());
        self
    }

    pub fn remove_param(&mut self, name: &str) -> Option<ParamValue> {
        self.parameters.remove(name)
    }

    /// Overlay every parameter of `other` onto this intent.
    pub fn merge_parameters(&mut self, other: &Parameters) -> &mut Self {
        for (name, value) in other.iter() {
            self.parameters.insert(name, value.clone());
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.parameters.get(name)
    }

    /// First value rendered as text.
    pub fn get_str(&self, name: &str) -> Option<String> {
        self.get(name)?.first().map(Scalar::encode)
    }

    pub fn get_number(&self, name: &str) -> Option<f64> {
        self.get(name)?.first()?.as_number()
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name)?.first()?.as_bool()
    }

    /// All values of a parameter; a scalar yields a single element.
    pub fn get_list(&self, name: &str) -> Vec<Scalar> {
        self.get(name)
            .map(|v| v.scalars().to_vec())
            .unwrap_or_default()
    }

    /// Read a parameter coerced into the shape and type of `template`.
    pub fn get_typed(&self, name: &str, template: &ParamValue) -> Option<ParamValue> {
        self.get(name)?.coerce_like(template)
    }

    // -----------------------------------------------------------------------
    // Attributes
    // -----------------------------------------------------------------------

    pub fn set_attribute<T: Any + Send + Sync>(&mut self, name: impl Into<String>, value: T) -> &mut Self {
        self.attributes.insert(name.into(), Arc::new(value));
        self
    }

    pub fn with_attribute<T: Any + Send + Sync>(mut self, name: impl Into<String>, value: T) -> Self {
        self.attributes.insert(name.into(), Arc::new(value));
        self
    }

    /// Store an already shared attribute handle.
    pub fn insert_attribute(&mut self, name: impl Into<String>, value: Attribute) -> &mut Self {
        self.attributes.insert(name.into(), value);
        self
    }

    /// Typed view of an attribute; `None` if absent or of another type.
    pub fn attribute<T: Any>(&self, name: &str) -> Option<&T> {
        self.attributes.get(name)?.downcast_ref::<T>()
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<Attribute> {
        self.attributes.remove(name)
    }

    /// Canonical location token (attributes are dropped).
    pub fn to_token(&self) -> String {
        token::encode(self.place.name(), &self.parameters)
    }
}

impl fmt::Display for NavigationIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_token())
    }
}

impl fmt::Debug for NavigationIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut attributes: Vec<_> = self.attributes.keys().collect();
        attributes.sort();
        f.debug_struct("NavigationIntent")
            .field("place", &self.place)
            .field("parameters", &self.parameters)
            .field("attributes", &attributes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::AppHandle;
    use crate::place::PlaceRegistry;
    use crate::presenter::tests::NullPresenter;
    use crate::presenter::Presenter;
    use proptest::prelude::*;

    fn registry() -> PlaceRegistry {
        let factory = |app: AppHandle| -> anyhow::Result<Arc<dyn Presenter>> {
            Ok(Arc::new(NullPresenter::new(app)))
        };
        let mut registry = PlaceRegistry::new();
        let root = registry.create("root", factory, None).unwrap();
        let restricted = registry.create("restricted", factory, Some(&root)).unwrap();
        registry.create("cart", factory, Some(&restricted)).unwrap();
        registry.create("product", factory, Some(&root)).unwrap();
        registry
    }

    #[test]
    fn test_parse_cart_token() {
        let registry = registry();
        let intent = NavigationIntent::parse("cart?s=1&c=1234", &registry);
        assert_eq!(intent.place().path_name(), "root/restricted/cart");
        assert_eq!(intent.get_number("s"), Some(1.0));
        assert_eq!(intent.get_number("c"), Some(1234.0));
        assert_eq!(intent.to_string(), "cart?s=1&c=1234");
    }

    #[test]
    fn test_unknown_path_is_detached() {
        let registry = registry();
        let intent = NavigationIntent::parse("nowhere?x=1", &registry);
        assert!(intent.place().is_detached());
        assert_eq!(intent.get_str("x").as_deref(), Some("1"));
        assert_eq!(intent.to_string(), "nowhere?x=1");
    }

    fn scalar() -> impl Strategy<Value = Scalar> {
        prop_oneof![
            any::<String>().prop_map(Scalar::Text),
            (-1.0e12f64..1.0e12).prop_map(Scalar::Number),
            any::<bool>().prop_map(Scalar::Bool),
        ]
    }

    fn param_value() -> impl Strategy<Value = ParamValue> {
        prop_oneof![
            scalar().prop_map(ParamValue::Scalar),
            prop::collection::vec(scalar(), 0..5).prop_map(ParamValue::List),
        ]
    }

    proptest! {
        #[test]
        fn test_token_reparses_to_same_token(
            target in prop::sample::select(vec!["root", "cart", "product"]),
            params in prop::collection::vec(("[a-z][a-z0-9_]{0,5}", param_value()), 0..6),
        ) {
            let registry = registry();
            let mut intent = NavigationIntent::new(registry.require(target).unwrap());
            for (key, value) in params {
                intent.set_param(key, value);
            }
            let token = intent.to_token();
            let reparsed = NavigationIntent::parse(&token, &registry);
            prop_assert_eq!(reparsed.place(), intent.place());
            prop_assert_eq!(reparsed.to_token(), token);
        }
    }

    #[test]
    fn test_round_trip_of_typed_parameters() {
        let registry = registry();
        let cart = registry.require("cart").unwrap();
        let intent = NavigationIntent::new(cart)
            .with_param("s", 1)
            .with_param("total", 12.5)
            .with_param("gift", true)
            .with_param("note", "for mum & dad")
            .with_param("ids", vec![3, 5, 8])
            .with_param("tags", vec!["a b", "c"])
            .with_param("flags", vec![true, false]);
        let token = intent.to_string();
        assert_eq!(
            token,
            "cart?s=1&total=12.5&gift=true&note=for+mum+%26+dad&ids=3&ids=5&ids=8&tags=a+b&tags=c&flags=true&flags=false"
        );
        let reparsed = NavigationIntent::parse(&token, &registry);
        assert_eq!(reparsed.to_string(), token);
        assert_eq!(
            reparsed.get_typed("ids", &ParamValue::from(vec![0])),
            Some(ParamValue::from(vec![3, 5, 8]))
        );
        assert_eq!(reparsed.get_bool("gift"), Some(true));
    }

    #[test]
    fn test_optional_assignment_deletes() {
        let registry = registry();
        let mut intent = NavigationIntent::new(registry.require("product").unwrap());
        intent.set_param("p", 9999);
        assert_eq!(intent.to_string(), "product?p=9999");
        intent.set_optional::<i32>("p", None);
        assert!(intent.get("p").is_none());
        assert_eq!(intent.to_string(), "product");
    }

    #[test]
    fn test_attributes_are_transient() {
        let registry = registry();
        let intent = NavigationIntent::new(registry.require("product").unwrap())
            .with_param("p", 1)
            .with_attribute("slot", String::from("main"));
        assert_eq!(intent.attribute::<String>("slot").map(String::as_str), Some("main"));
        assert!(intent.attribute::<u32>("slot").is_none());

        let reparsed = NavigationIntent::parse(&intent.to_string(), &registry);
        assert!(!reparsed.has_attribute("slot"));
        assert_eq!(reparsed.to_string(), intent.to_string());

        let json = serde_json::to_value(&intent).unwrap();
        assert_eq!(json, serde_json::json!({"place": "root/product", "parameters": {"p": 1.0}}));
    }

    #[test]
    fn test_redirect_copies_state() {
        let registry = registry();
        let original = NavigationIntent::new(registry.require("product").unwrap())
            .with_param("p", 7)
            .with_attribute("slot", 42u32);
        let redirected = original.redirect(registry.require("cart").unwrap());
        assert_eq!(redirected.place().name(), "cart");
        assert_eq!(redirected.get_number("p"), Some(7.0));
        assert_eq!(redirected.attribute::<u32>("slot"), Some(&42));
    }
}
