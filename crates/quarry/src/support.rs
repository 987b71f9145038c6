//! Small helpers shared across modules: dot paths, value coercion, casing.

use heck::{ToLowerCamelCase, ToSnakeCase};
use serde_json::Value;

/// Split a dot path on its last dot: `"a.b.c"` → `("a.b", "c")`.
///
/// A path without a dot has an empty prefix.
pub fn split_last(path: &str) -> (&str, &str) {
    match path.rfind('.') {
        Some(pos) => (&path[..pos], &path[pos + 1..]),
        None => ("", path),
    }
}

/// Number of dot-separated segments in a path.
pub fn depth(path: &str) -> usize {
    if path.is_empty() {
        0
    } else {
        path.split('.').count()
    }
}

/// Every proper prefix of a dot path: `"a.b.c"` → `["a", "a.b"]`.
pub fn prefixes(path: &str) -> Vec<&str> {
    path.match_indices('.').map(|(pos, _)| &path[..pos]).collect()
}

/// Every prefix of a dot path including the path itself.
pub fn cumulative_paths(path: &str) -> Vec<&str> {
    let mut paths = prefixes(path);
    paths.push(path);
    paths
}

/// Join a parent path and a child segment.
pub fn join_path(parent: &str, child: &str) -> String {
    if parent.is_empty() {
        child.to_string()
    } else {
        format!("{parent}.{child}")
    }
}

/// Lenient boolean parsing: `true/1/yes/on` are truthy, everything else
/// (including `false/0/no/off` and the empty string) is falsy.
pub fn lenient_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f == 1.0),
        Value::String(s) => matches!(
            s.trim().to_lowercase().as_str(),
            "true" | "1" | "yes" | "on"
        ),
        _ => false,
    }
}

/// Wrap a scalar into a one-element array; arrays pass through.
pub fn wrap_array(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        Value::Null => Vec::new(),
        other => vec![other.clone()],
    }
}

/// `null` or a string that is empty after trimming.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Render a scalar as text for comparisons and error messages.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// snake_case a name segment by segment, keeping dots.
pub fn snake_path(path: &str) -> String {
    path.split('.')
        .map(|segment| {
            if segment == "*" {
                segment.to_string()
            } else {
                segment.to_snake_case()
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// camelCase form used for scope names.
pub fn camel(name: &str) -> String {
    name.to_lower_camel_case()
}

/// snake_case form used for aggregate attribute names (`postsCount` → `posts_count`).
pub fn snake(name: &str) -> String {
    name.to_snake_case()
}
