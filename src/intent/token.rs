//! Location token codec.
//!
//! ```text
//! token = path-name [ "?" query ]
//! query = pair *( "&" pair )
//! pair  = key "=" value        ; "+" decodes to space, %XX escapes decoded
//! ```
//!
//! Repeated keys collapse into one list parameter in first-seen order.
//! Encoding emits parameters in insertion order, expands lists into repeated
//! pairs and never writes an empty value.

use url::form_urlencoded;

use super::params::{Parameters, Scalar};
use crate::place::{Place, PlaceResolver};

/// Separator between the path name and the query.
pub const QUERY_SEPARATOR: char = '?';

/// Split a token into its path segment and optional query.
pub fn split(token: &str) -> (&str, Option<&str>) {
    match token.split_once(QUERY_SEPARATOR) {
        Some((path, query)) => (path, Some(query)),
        None => (token, None),
    }
}

/// Resolve a path segment, falling back to a detached placeholder.
pub fn resolve_place(path: &str, resolver: &dyn PlaceResolver) -> Place {
    resolver.resolve(path).unwrap_or_else(|| {
        log::debug!("Token path '{}' is not in the catalog", path);
        Place::detached(path)
    })
}

/// Decode a query string into parameters. Pairs with empty values are dropped.
pub fn decode_query(query: &str) -> Parameters {
    let mut params = Parameters::new();
    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        if key.is_empty() || value.is_empty() {
            continue;
        }
        params.append(&key, Scalar::Text(value.into_owned()));
    }
    params
}

/// Encode parameters into a query string (without the leading `?`).
pub fn encode_query(params: &Parameters) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in params.iter() {
        if key.is_empty() {
            continue;
        }
        for encoded in value.encoded_values() {
            serializer.append_pair(key, &encoded);
        }
    }
    serializer.finish()
}

/// Join a path segment and encoded parameters into a token.
pub fn encode(path: &str, params: &Parameters) -> String {
    let query = encode_query(params);
    if query.is_empty() {
        path.to_string()
    } else {
        format!("{}{}{}", path, QUERY_SEPARATOR, query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::params::ParamValue;

    #[test]
    fn test_split() {
        assert_eq!(split("cart?s=1"), ("cart", Some("s=1")));
        assert_eq!(split("cart"), ("cart", None));
        assert_eq!(split("cart?"), ("cart", Some("")));
    }

    #[test]
    fn test_decode_plus_and_percent() {
        let params = decode_query("q=red+shoes&n=caf%C3%A9&x=a%2Bb");
        assert_eq!(params.get("q"), Some(&ParamValue::from("red shoes")));
        assert_eq!(params.get("n"), Some(&ParamValue::from("café")));
        assert_eq!(params.get("x"), Some(&ParamValue::from("a+b")));
    }

    #[test]
    fn test_repeated_key_becomes_list() {
        let params = decode_query("t=a&u=1&t=b");
        assert_eq!(params.get("t"), Some(&ParamValue::from(vec!["a", "b"])));
        assert_eq!(params.get("u"), Some(&ParamValue::from("1")));
        let keys: Vec<_> = params.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["t", "u"]);
    }

    #[test]
    fn test_empty_values_dropped() {
        let params = decode_query("a=&b=2&=3");
        assert!(!params.contains("a"));
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_encode_expands_lists_and_skips_empty() {
        let mut params = Parameters::new();
        params.insert("t", ParamValue::from(vec!["a", "", "b"]));
        params.insert("e", ParamValue::from(""));
        params.insert("q", ParamValue::from("red shoes"));
        assert_eq!(encode("search", &params), "search?t=a&t=b&q=red+shoes");
        assert_eq!(encode("home", &Parameters::new()), "home");
    }

    #[test]
    fn test_query_round_trip_is_byte_identical() {
        for query in ["s=1&c=1234", "q=red+shoes&t=a&t=b", "n=caf%C3%A9"] {
            assert_eq!(encode_query(&decode_query(query)), query);
        }
    }
}
