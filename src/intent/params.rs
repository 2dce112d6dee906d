//! Intent parameter values.
//!
//! Parameters are scalars (text, number, boolean) or homogeneous lists of
//! scalars. Decoded token values always arrive as text; typed accessors coerce
//! on request.

use std::fmt;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// Element type of a scalar parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Text,
    Number,
    Bool,
}

/// A single parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Scalar {
    pub fn kind(&self) -> ScalarKind {
        match self {
            Scalar::Text(_) => ScalarKind::Text,
            Scalar::Number(_) => ScalarKind::Number,
            Scalar::Bool(_) => ScalarKind::Bool,
        }
    }

    /// Only empty text is empty; numbers and booleans always carry a value.
    pub fn is_empty(&self) -> bool {
        matches!(self, Scalar::Text(s) if s.is_empty())
    }

    /// Literal string form used in tokens.
    pub fn encode(&self) -> String {
        match self {
            Scalar::Text(s) => s.clone(),
            Scalar::Number(n) => format_number(*n),
            Scalar::Bool(b) => b.to_string(),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Scalar::Number(n) => Some(*n),
            Scalar::Text(s) => s.trim().parse::<f64>().ok().filter(|n| !n.is_nan()),
            Scalar::Bool(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Scalar::Bool(b) => Some(*b),
            Scalar::Text(s) => match s.as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            Scalar::Number(_) => None,
        }
    }

    /// Convert into `kind`, or `None` when the value does not parse.
    pub fn coerce(&self, kind: ScalarKind) -> Option<Scalar> {
        match kind {
            ScalarKind::Text => Some(Scalar::Text(self.encode())),
            ScalarKind::Number => self.as_number().map(Scalar::Number),
            ScalarKind::Bool => self.as_bool().map(Scalar::Bool),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Integral values print without a fractional part, everything else uses
/// the shortest representation that parses back to the same `f64`.
fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

macro_rules! scalar_from {
    ($variant:ident: $($ty:ty => |$v:ident| $body:expr),+ $(,)?) => {
        $(
            impl From<$ty> for Scalar {
                fn from($v: $ty) -> Self {
                    Scalar::$variant($body)
                }
            }

            impl From<$ty> for ParamValue {
                fn from(value: $ty) -> Self {
                    ParamValue::Scalar(Scalar::from(value))
                }
            }
        )+
    };
}

scalar_from!(Text:
    String => |v| v,
    &str => |v| v.to_string(),
    &String => |v| v.clone(),
);
scalar_from!(Number:
    f64 => |v| v,
    f32 => |v| f64::from(v),
    i32 => |v| f64::from(v),
    u32 => |v| f64::from(v),
    i64 => |v| v as f64,
    u64 => |v| v as f64,
    usize => |v| v as f64,
);
scalar_from!(Bool: bool => |v| v);

/// A parameter: one scalar or a homogeneous list of scalars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Scalar(Scalar),
    List(Vec<Scalar>),
}

impl ParamValue {
    /// Lists mixing element kinds collapse to text lists.
    pub(crate) fn normalized(self) -> Self {
        match self {
            ParamValue::List(items) => {
                let mut kinds = items.iter().filter(|s| !s.is_empty()).map(Scalar::kind);
                let homogeneous = match kinds.next() {
                    Some(first) => kinds.all(|k| k == first),
                    None => true,
                };
                if homogeneous {
                    ParamValue::List(items)
                } else {
                    log::debug!("Normalizing mixed-type list parameter to text");
                    ParamValue::List(
                        items
                            .into_iter()
                            .map(|s| Scalar::Text(s.encode()))
                            .collect(),
                    )
                }
            }
            scalar => scalar,
        }
    }

    /// Scalars in order; a scalar parameter yields itself.
    pub fn scalars(&self) -> &[Scalar] {
        match self {
            ParamValue::Scalar(s) => std::slice::from_ref(s),
            ParamValue::List(items) => items,
        }
    }

    /// First non-empty scalar.
    pub fn first(&self) -> Option<&Scalar> {
        self.scalars().iter().find(|s| !s.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.scalars().iter().all(Scalar::is_empty)
    }

    pub fn is_list(&self) -> bool {
        matches!(self, ParamValue::List(_))
    }

    /// Token values for this parameter, empty ones dropped.
    pub fn encoded_values(&self) -> Vec<String> {
        self.scalars()
            .iter()
            .filter(|s| !s.is_empty())
            .map(Scalar::encode)
            .collect()
    }

    /// Coerce into the shape and element type of `template`.
    ///
    /// A scalar template takes the first non-empty value. A list template
    /// wraps scalars into a one-element list; its element type comes from
    /// the template's first non-empty element (text when it has none).
    pub fn coerce_like(&self, template: &ParamValue) -> Option<ParamValue> {
        match template {
            ParamValue::Scalar(t) => self.first()?.coerce(t.kind()).map(ParamValue::Scalar),
            ParamValue::List(items) => {
                let kind = items
                    .iter()
                    .find(|s| !s.is_empty())
                    .map_or(ScalarKind::Text, Scalar::kind);
                self.scalars()
                    .iter()
                    .filter(|s| !s.is_empty())
                    .map(|s| s.coerce(kind))
                    .collect::<Option<Vec<_>>>()
                    .map(ParamValue::List)
            }
        }
    }
}

impl From<Scalar> for ParamValue {
    fn from(value: Scalar) -> Self {
        ParamValue::Scalar(value)
    }
}

impl<T: Into<Scalar>> From<Vec<T>> for ParamValue {
    fn from(values: Vec<T>) -> Self {
        ParamValue::List(values.into_iter().map(Into::into).collect()).normalized()
    }
}

/// Insertion-ordered parameter map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters {
    entries: Vec<(String, ParamValue)>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.entries.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Insert or replace; a replaced key keeps its original position.
    pub fn insert(&mut self, name: impl Into<String>, value: ParamValue) {
        let name = name.into();
        let value = value.normalized();
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Append a decoded value, promoting a repeated key to a list.
    pub(crate) fn append(&mut self, name: &str, value: Scalar) {
        match self.entries.iter_mut().find(|(k, _)| k == name) {
            Some((_, existing)) => {
                let mut items = std::mem::replace(existing, ParamValue::List(Vec::new()))
                    .scalars()
                    .to_vec();
                items.push(value);
                *existing = ParamValue::List(items);
            }
            None => self.entries.push((name.to_string(), ParamValue::Scalar(value))),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<ParamValue> {
        let index = self.entries.iter().position(|(k, _)| k == name)?;
        Some(self.entries.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for Parameters {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_encoding() {
        assert_eq!(Scalar::from(1).encode(), "1");
        assert_eq!(Scalar::from(1234.0).encode(), "1234");
        assert_eq!(Scalar::from(-3).encode(), "-3");
        assert_eq!(Scalar::from(0.25).encode(), "0.25");
        assert_eq!(Scalar::from(true).encode(), "true");
    }

    #[test]
    fn test_text_coercion() {
        let s = Scalar::from("42");
        assert_eq!(s.as_number(), Some(42.0));
        assert_eq!(s.coerce(ScalarKind::Number), Some(Scalar::Number(42.0)));
        assert_eq!(s.coerce(ScalarKind::Bool), None);
        assert_eq!(Scalar::from("false").as_bool(), Some(false));
        assert_eq!(Scalar::from("abc").as_number(), None);
    }

    #[test]
    fn test_mixed_list_normalizes_to_text() {
        let value = ParamValue::List(vec![Scalar::from(1), Scalar::from("x")]).normalized();
        assert_eq!(
            value,
            ParamValue::List(vec![Scalar::from("1"), Scalar::from("x")])
        );

        let numbers = ParamValue::from(vec![1, 2, 3]);
        assert_eq!(numbers.scalars()[2], Scalar::Number(3.0));
    }

    #[test]
    fn test_coerce_like_list_uses_first_non_empty_template_element() {
        let decoded = ParamValue::List(vec![Scalar::from("3"), Scalar::from("4")]);
        let template = ParamValue::List(vec![Scalar::from(""), Scalar::from(0)]);
        assert_eq!(
            decoded.coerce_like(&template),
            Some(ParamValue::List(vec![Scalar::Number(3.0), Scalar::Number(4.0)]))
        );

        let empty_template = ParamValue::List(vec![]);
        assert_eq!(
            decoded.coerce_like(&empty_template),
            Some(ParamValue::List(vec![Scalar::from("3"), Scalar::from("4")]))
        );
    }

    #[test]
    fn test_coerce_like_shape_changes() {
        let scalar = ParamValue::from("7");
        let list_template = ParamValue::from(vec![0]);
        assert_eq!(
            scalar.coerce_like(&list_template),
            Some(ParamValue::List(vec![Scalar::Number(7.0)]))
        );

        let list = ParamValue::List(vec![Scalar::from("true"), Scalar::from("false")]);
        assert_eq!(
            list.coerce_like(&ParamValue::from(false)),
            Some(ParamValue::Scalar(Scalar::Bool(true)))
        );

        let bad = ParamValue::from("nope");
        assert_eq!(bad.coerce_like(&ParamValue::from(0)), None);
    }

    #[test]
    fn test_parameters_keep_insertion_order() {
        let mut params = Parameters::new();
        params.insert("b", ParamValue::from(1));
        params.insert("a", ParamValue::from(2));
        params.insert("b", ParamValue::from(3));
        let keys: Vec<_> = params.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(params.get("b"), Some(&ParamValue::from(3)));
        assert_eq!(params.remove("b"), Some(ParamValue::from(3)));
        assert!(!params.contains("b"));
    }

    #[test]
    fn test_append_promotes_to_list() {
        let mut params = Parameters::new();
        params.append("t", Scalar::from("a"));
        assert_eq!(params.get("t"), Some(&ParamValue::from("a")));
        params.append("t", Scalar::from("b"));
        params.append("t", Scalar::from("c"));
        assert_eq!(params.get("t"), Some(&ParamValue::from(vec!["a", "b", "c"])));
    }

    #[test]
    fn test_empty_values_are_not_encoded() {
        let value = ParamValue::List(vec![Scalar::from(""), Scalar::from("x")]);
        assert_eq!(value.encoded_values(), vec!["x".to_string()]);
        assert!(ParamValue::from("").is_empty());
        assert!(ParamValue::List(vec![]).is_empty());
    }
}
