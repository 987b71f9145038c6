//! Normalization of raw parameter values.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::Separators;
use crate::subject::SortDirection;
use crate::support::{snake_path, split_last};

/// A requested sort: field plus direction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sort {
    pub field: String,
    pub direction: SortDirection,
}

impl Sort {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }

    /// Parse a single token: a leading `-` means descending.
    pub fn parse(token: &str) -> Self {
        match token.strip_prefix('-') {
            Some(field) => Self::new(field, SortDirection::Desc),
            None => Self::new(token, SortDirection::Asc),
        }
    }
}

/// Grouped sparse fields: resource key → ordered field names.
pub type FieldMap = IndexMap<String, IndexSet<String>>;

/// Turns raw parameter values into typed collections.
#[derive(Debug, Clone, Default)]
pub struct ParameterParser {
    separators: Separators,
    snake_case: bool,
}

impl ParameterParser {
    pub fn new(separators: Separators, snake_case: bool) -> Self {
        Self {
            separators,
            snake_case,
        }
    }

    pub fn separators(&self) -> &Separators {
        &self.separators
    }

    /// Split on `separator`, trim, drop empties, dedup keeping first.
    ///
    /// Arrays contribute each of their string elements (split again).
    pub fn parse_list(&self, value: &Value, separator: &str) -> IndexSet<String> {
        let mut out = IndexSet::new();
        collect_tokens(value, separator, &mut out);
        out
    }

    /// Parse a sort parameter; duplicate fields keep their first occurrence.
    pub fn parse_sorts(&self, value: &Value) -> Vec<Sort> {
        let mut seen = IndexMap::new();
        for token in self.parse_list(value, &self.separators.sort) {
            let mut sort = Sort::parse(&token);
            if sort.field.is_empty() {
                continue;
            }
            if self.snake_case {
                sort.field = snake_path(&sort.field);
            }
            seen.entry(sort.field.clone()).or_insert(sort);
        }
        seen.into_values().collect()
    }

    /// Parse a fields parameter into resource groups.
    ///
    /// Accepts `"posts.title,posts.body,id"`, a flat list of such tokens, or
    /// an already grouped object (`{"posts": "title,body"}`). Tokens are
    /// grouped by the part before their last dot; bare tokens land under the
    /// empty key, which the wizard later promotes to the root resource key.
    pub fn parse_fields(&self, value: &Value) -> FieldMap {
        let separator = &self.separators.fields;
        let mut groups = FieldMap::new();

        match value {
            Value::String(_) => self.group_tokens("", self.parse_list(value, separator), &mut groups),
            Value::Array(items) => {
                let joined = items
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join(separator);
                self.group_tokens("", self.parse_list(&Value::String(joined), separator), &mut groups);
            }
            Value::Object(map) => {
                for (resource, fields) in map {
                    let tokens = self.parse_list(fields, separator);
                    self.group_tokens(resource, tokens, &mut groups);
                }
            }
            _ => {}
        }

        groups
    }

    fn group_tokens(&self, resource: &str, tokens: IndexSet<String>, groups: &mut FieldMap) {
        for token in tokens {
            let qualified = crate::support::join_path(resource, &token);
            let (group, field) = split_last(&qualified);
            if field.is_empty() {
                continue;
            }
            let field = if self.snake_case && field != "*" {
                snake_path(field)
            } else {
                field.to_string()
            };
            groups.entry(group.to_string()).or_default().insert(field);
        }
    }

    /// Parse the filter parameter into a nested map with coerced values.
    ///
    /// Strings `"true"`/`"false"` become booleans and strings containing the
    /// filter separator become arrays. Non-object input yields no filters.
    pub fn parse_filters(&self, value: &Value) -> Map<String, Value> {
        let Value::Object(map) = value else {
            return Map::new();
        };
        self.coerce_object(map)
    }

    fn coerce_object(&self, map: &Map<String, Value>) -> Map<String, Value> {
        map.iter()
            .map(|(key, value)| {
                let key = if self.snake_case {
                    snake_path(key)
                } else {
                    key.clone()
                };
                (key, self.coerce_value(value))
            })
            .collect()
    }

    fn coerce_value(&self, value: &Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(self.coerce_object(map)),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.coerce_value(v)).collect()),
            Value::String(s) => self.coerce_string(s),
            other => other.clone(),
        }
    }

    fn coerce_string(&self, s: &str) -> Value {
        match s {
            "true" => return Value::Bool(true),
            "false" => return Value::Bool(false),
            _ => {}
        }

        let separator = self.separators.filter.as_str();
        if !separator.is_empty() && s.contains(separator) {
            return Value::Array(
                s.split(separator)
                    .map(|part| Value::String(part.to_string()))
                    .collect(),
            );
        }
        Value::String(s.to_string())
    }
}

fn collect_tokens(value: &Value, separator: &str, out: &mut IndexSet<String>) {
    match value {
        Value::String(s) => {
            let parts: Box<dyn Iterator<Item = &str>> = if separator.is_empty() {
                Box::new(std::iter::once(s.as_str()))
            } else {
                Box::new(s.split(separator))
            };
            for part in parts {
                let part = part.trim();
                if !part.is_empty() {
                    out.insert(part.to_string());
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_tokens(item, separator, out);
            }
        }
        Value::Number(n) => {
            out.insert(n.to_string());
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parser() -> ParameterParser {
        ParameterParser::default()
    }

    fn set(items: &[&str]) -> IndexSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn list_drops_empties_and_duplicates() {
        let list = parser().parse_list(&json!("a,b,,c,,"), ",");
        assert_eq!(list.into_iter().collect::<Vec<_>>(), vec!["a", "b", "c"]);

        let list = parser().parse_list(&json!(" b , a,b "), ",");
        assert_eq!(list.into_iter().collect::<Vec<_>>(), vec!["b", "a"]);
    }

    #[test]
    fn list_accepts_arrays() {
        let list = parser().parse_list(&json!(["posts", "comments,posts"]), ",");
        assert_eq!(list, set(&["posts", "comments"]));
    }

    #[test]
    fn custom_separator() {
        let parser = ParameterParser::new(
            Separators {
                include: "|".to_string(),
                ..Separators::default()
            },
            false,
        );
        let list = parser.parse_list(&json!("a|b,c"), &parser.separators().include.clone());
        assert_eq!(list, set(&["a", "b,c"]));
    }

    #[test]
    fn sort_direction_from_prefix() {
        let sorts = parser().parse_sorts(&json!("-name,created_at"));
        assert_eq!(
            sorts,
            vec![
                Sort::new("name", SortDirection::Desc),
                Sort::new("created_at", SortDirection::Asc),
            ]
        );
    }

    #[test]
    fn duplicate_sort_fields_keep_first() {
        let sorts = parser().parse_sorts(&json!("name,-name,-id"));
        assert_eq!(
            sorts,
            vec![
                Sort::new("name", SortDirection::Asc),
                Sort::new("id", SortDirection::Desc),
            ]
        );
    }

    #[test]
    fn bare_minus_is_ignored() {
        assert!(parser().parse_sorts(&json!("-")).is_empty());
    }

    #[test]
    fn fields_string_groups_on_last_dot() {
        let fields = parser().parse_fields(&json!("id,name,posts.title,posts.comments.body"));
        assert_eq!(fields.get(""), Some(&set(&["id", "name"])));
        assert_eq!(fields.get("posts"), Some(&set(&["title"])));
        assert_eq!(fields.get("posts.comments"), Some(&set(&["body"])));
    }

    #[test]
    fn fields_flat_array_is_joined() {
        let fields = parser().parse_fields(&json!(["id", "posts.title,posts.id"]));
        assert_eq!(fields.get(""), Some(&set(&["id"])));
        assert_eq!(fields.get("posts"), Some(&set(&["title", "id"])));
    }

    #[test]
    fn fields_grouped_object() {
        let fields = parser().parse_fields(&json!({"users": "id,name", "posts": ["title"], "": "id"}));
        assert_eq!(fields.get("users"), Some(&set(&["id", "name"])));
        assert_eq!(fields.get("posts"), Some(&set(&["title"])));
        assert_eq!(fields.get(""), Some(&set(&["id"])));
    }

    #[test]
    fn fields_snake_case_conversion() {
        let parser = ParameterParser::new(Separators::default(), true);
        let fields = parser.parse_fields(&json!({"posts": "createdAt,*"}));
        assert_eq!(fields.get("posts"), Some(&set(&["created_at", "*"])));
    }

    #[test]
    fn filters_coerce_booleans_and_lists() {
        let filters = parser().parse_filters(&json!({
            "status": "active,pending",
            "published": "true",
            "archived": "false",
            "name": "john",
            "price": {"min": "10"},
        }));
        assert_eq!(filters["status"], json!(["active", "pending"]));
        assert_eq!(filters["published"], json!(true));
        assert_eq!(filters["archived"], json!(false));
        assert_eq!(filters["name"], json!("john"));
        assert_eq!(filters["price"], json!({"min": "10"}));
    }

    #[test]
    fn scalar_filter_parameter_is_ignored() {
        assert!(parser().parse_filters(&json!("oops")).is_empty());
    }

    #[test]
    fn filter_keys_snake_cased() {
        let parser = ParameterParser::new(Separators::default(), true);
        let filters = parser.parse_filters(&json!({"firstName": "x", "author": {"lastName": "y"}}));
        assert!(filters.contains_key("first_name"));
        assert_eq!(filters["author"], json!({"last_name": "y"}));
    }
}
