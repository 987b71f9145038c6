//! Raw request parameter sources.
//!
//! A [`ParameterSource`] hands out the raw, still-unparsed value of a
//! top-level request parameter. Bracket notation in query strings
//! (`filter[price][min]=10`) is expanded into nested JSON objects so every
//! source looks the same to the parser.

use std::collections::HashMap;
use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde_json::{Map, Value};

/// Something that yields raw request parameter values by name.
pub trait ParameterSource {
    fn get(&self, name: &str) -> Option<Value>;
}

impl ParameterSource for Map<String, Value> {
    fn get(&self, name: &str) -> Option<Value> {
        Map::get(self, name).cloned()
    }
}

impl ParameterSource for Value {
    fn get(&self, name: &str) -> Option<Value> {
        self.as_object().and_then(|map| map.get(name)).cloned()
    }
}

impl ParameterSource for HashMap<String, String> {
    fn get(&self, name: &str) -> Option<Value> {
        QueryString::from_pairs(self.iter().map(|(k, v)| (k.as_str(), v.as_str()))).get(name)
    }
}

/// A decoded query string with bracket keys expanded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryString {
    values: Map<String, Value>,
}

impl QueryString {
    /// Decode a raw (percent-encoded) query string.
    pub fn parse(query: &str) -> Self {
        let pairs: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();
        Self::from_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }

    /// Build from already-decoded key/value pairs.
    ///
    /// Later scalar values for the same key replace earlier ones; `key[]`
    /// appends to a list.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut root = Value::Object(Map::new());
        for (key, value) in pairs {
            let segments = split_key(key);
            if segments.first().is_none_or(|s| s.is_empty()) {
                continue;
            }
            insert(&mut root, &segments, Value::String(value.to_string()));
        }

        let values = match root {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self { values }
    }

    /// The expanded parameter tree.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }
}

impl ParameterSource for QueryString {
    fn get(&self, name: &str) -> Option<Value> {
        self.values.get(name).cloned()
    }
}

impl<S> FromRequestParts<S> for QueryString
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(QueryString::parse(parts.uri.query().unwrap_or("")))
    }
}

/// Split `filter[price][min]` into `["filter", "price", "min"]`.
///
/// Malformed bracket syntax keeps the whole key as a single segment.
fn split_key(key: &str) -> Vec<String> {
    let Some(open) = key.find('[') else {
        return vec![key.to_string()];
    };

    let mut segments = vec![key[..open].to_string()];
    let mut rest = &key[open..];
    while let Some(stripped) = rest.strip_prefix('[') {
        let Some(close) = stripped.find(']') else {
            return vec![key.to_string()];
        };
        segments.push(stripped[..close].to_string());
        rest = &stripped[close + 1..];
    }

    if !rest.is_empty() {
        return vec![key.to_string()];
    }
    segments
}

fn insert(node: &mut Value, segments: &[String], value: Value) {
    let Some((first, rest)) = segments.split_first() else {
        *node = value;
        return;
    };

    if first.is_empty() {
        if !node.is_array() {
            *node = Value::Array(Vec::new());
        }
        if let Value::Array(items) = node {
            let mut child = Value::Null;
            insert(&mut child, rest, value);
            items.push(child);
        }
        return;
    }

    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Value::Object(map) = node {
        let child = map.entry(first.clone()).or_insert(Value::Null);
        insert(child, rest, value);
    }
}
