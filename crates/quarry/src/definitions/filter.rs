//! Filter definitions.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::driver::FilterStrategy;
use crate::error::WizardResult;
use crate::subject::Subject;

/// User filter logic: `(subject, value, property)`.
pub type FilterCallback = Arc<dyn Fn(&mut dyn Subject, &Value, &str) -> WizardResult<()> + Send + Sync>;

/// Value transform run before a filter is applied.
pub type ValueTransform = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Gate deciding whether a filter applies for a given value.
pub type WhenGate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Resolves a raw scope argument into the bound value (e.g. a record key
/// looked up from a slug). `None` means the value could not be resolved.
pub type BindingResolver = Arc<dyn Fn(&Value) -> Option<Value> + Send + Sync>;

/// Creates a fresh strategy instance for every application.
pub type FilterStrategyFactory = Arc<dyn Fn() -> Box<dyn FilterStrategy> + Send + Sync>;

/// What a filter does, with the data each kind needs.
#[derive(Clone)]
pub enum FilterKind {
    /// Equality, or membership for arrays.
    Exact { relation_constraint: bool },
    /// Case-insensitive substring match.
    Partial { relation_constraint: bool },
    /// Inclusive bounds from `{min_key, max_key}` or `[min, max]`.
    Range { min_key: String, max_key: String },
    /// Range over dates, optionally reformatting bounds.
    DateRange {
        min_key: String,
        max_key: String,
        format: Option<String>,
    },
    /// IS NULL / IS NOT NULL from a lenient boolean.
    Null { invert: bool },
    /// JSON containment of each value.
    JsonContains { match_all: bool },
    /// Soft-delete visibility: `with`, `only`, anything else excludes.
    Trashed,
    /// Invoke a model scope with the value(s) as arguments.
    Scope { bindings: BTreeMap<usize, BindingResolver> },
    Callback(FilterCallback),
    /// Validated and captured, never applied to the subject.
    Passthrough,
    /// Strategy registered on the driver under this tag.
    Extension(String),
    /// Per-definition strategy, instantiated for each application.
    Custom(FilterStrategyFactory),
}

impl FilterKind {
    /// Tag used to look up the strategy.
    pub fn tag(&self) -> &str {
        match self {
            FilterKind::Exact { .. } => "exact",
            FilterKind::Partial { .. } => "partial",
            FilterKind::Range { .. } => "range",
            FilterKind::DateRange { .. } => "dateRange",
            FilterKind::Null { .. } => "null",
            FilterKind::JsonContains { .. } => "jsonContains",
            FilterKind::Trashed => "trashed",
            FilterKind::Scope { .. } => "scope",
            FilterKind::Callback(_) => "callback",
            FilterKind::Passthrough => "passthrough",
            FilterKind::Extension(tag) => tag,
            FilterKind::Custom(_) => "custom",
        }
    }
}

impl fmt::Debug for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterKind::Exact { relation_constraint } => f
                .debug_struct("Exact")
                .field("relation_constraint", relation_constraint)
                .finish(),
            FilterKind::Partial { relation_constraint } => f
                .debug_struct("Partial")
                .field("relation_constraint", relation_constraint)
                .finish(),
            FilterKind::Range { min_key, max_key } => f
                .debug_struct("Range")
                .field("min_key", min_key)
                .field("max_key", max_key)
                .finish(),
            FilterKind::DateRange {
                min_key,
                max_key,
                format,
            } => f
                .debug_struct("DateRange")
                .field("min_key", min_key)
                .field("max_key", max_key)
                .field("format", format)
                .finish(),
            FilterKind::Null { invert } => f.debug_struct("Null").field("invert", invert).finish(),
            FilterKind::JsonContains { match_all } => f
                .debug_struct("JsonContains")
                .field("match_all", match_all)
                .finish(),
            FilterKind::Scope { bindings } => f
                .debug_struct("Scope")
                .field("bindings", &bindings.keys().collect::<Vec<_>>())
                .finish(),
            FilterKind::Extension(tag) => f.debug_tuple("Extension").field(tag).finish(),
            other => f.write_str(other.tag()),
        }
    }
}

/// One allowed filter.
///
/// Definitions are values: every modifier consumes `self` and returns the
/// updated copy, so a definition can be cloned and shared across requests.
#[derive(Clone)]
pub struct FilterDefinition {
    property: String,
    alias: Option<String>,
    kind: FilterKind,
    default: Option<Value>,
    options: Map<String, Value>,
    transform: Option<ValueTransform>,
    when: Option<WhenGate>,
}

impl fmt::Debug for FilterDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterDefinition")
            .field("property", &self.property)
            .field("alias", &self.alias)
            .field("kind", &self.kind)
            .field("default", &self.default)
            .finish_non_exhaustive()
    }
}

impl FilterDefinition {
    pub fn new(property: impl Into<String>, kind: FilterKind) -> Self {
        Self {
            property: property.into(),
            alias: None,
            kind,
            default: None,
            options: Map::new(),
            transform: None,
            when: None,
        }
    }

    pub fn exact(property: impl Into<String>) -> Self {
        Self::new(property, FilterKind::Exact { relation_constraint: true })
    }

    pub fn partial(property: impl Into<String>) -> Self {
        Self::new(property, FilterKind::Partial { relation_constraint: true })
    }

    pub fn range(property: impl Into<String>) -> Self {
        Self::new(
            property,
            FilterKind::Range {
                min_key: "min".to_string(),
                max_key: "max".to_string(),
            },
        )
    }

    pub fn date_range(property: impl Into<String>) -> Self {
        Self::new(
            property,
            FilterKind::DateRange {
                min_key: "from".to_string(),
                max_key: "to".to_string(),
                format: None,
            },
        )
    }

    pub fn null(property: impl Into<String>) -> Self {
        Self::new(property, FilterKind::Null { invert: false })
    }

    pub fn json_contains(property: impl Into<String>) -> Self {
        Self::new(property, FilterKind::JsonContains { match_all: true })
    }

    /// Soft-delete filter, conventionally named `trashed`.
    pub fn trashed() -> Self {
        Self::new("trashed", FilterKind::Trashed)
    }

    pub fn scope(property: impl Into<String>) -> Self {
        Self::new(
            property,
            FilterKind::Scope {
                bindings: BTreeMap::new(),
            },
        )
    }

    pub fn callback<F>(property: impl Into<String>, callback: F) -> Self
    where
        F: Fn(&mut dyn Subject, &Value, &str) -> WizardResult<()> + Send + Sync + 'static,
    {
        Self::new(property, FilterKind::Callback(Arc::new(callback)))
    }

    pub fn passthrough(property: impl Into<String>) -> Self {
        Self::new(property, FilterKind::Passthrough)
    }

    /// Filter applied by the driver strategy registered under `tag`.
    pub fn extension(property: impl Into<String>, tag: impl Into<String>) -> Self {
        Self::new(property, FilterKind::Extension(tag.into()))
    }

    pub fn custom<F>(property: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn FilterStrategy> + Send + Sync + 'static,
    {
        Self::new(property, FilterKind::Custom(Arc::new(factory)))
    }

    /// Name the definition is requested by.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Value used when the request does not carry this filter.
    pub fn default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    /// Transform the value before it is applied.
    pub fn prepare_value_with<F>(mut self, transform: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(transform));
        self
    }

    /// Only apply when `gate` accepts the value.
    pub fn when<F>(mut self, gate: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.when = Some(Arc::new(gate));
        self
    }

    /// Treat dotted properties as plain (JSON) columns instead of relation
    /// paths. Only affects exact and partial filters.
    pub fn without_relation_constraint(mut self) -> Self {
        match &mut self.kind {
            FilterKind::Exact { relation_constraint } | FilterKind::Partial { relation_constraint } => {
                *relation_constraint = false;
            }
            _ => {}
        }
        self
    }

    /// Keys read from an object value by range and date range filters.
    pub fn bounds(mut self, min: impl Into<String>, max: impl Into<String>) -> Self {
        match &mut self.kind {
            FilterKind::Range { min_key, max_key } | FilterKind::DateRange { min_key, max_key, .. } => {
                *min_key = min.into();
                *max_key = max.into();
            }
            _ => {}
        }
        self
    }

    /// chrono format applied to date range bounds.
    pub fn date_format(mut self, pattern: impl Into<String>) -> Self {
        if let FilterKind::DateRange { format, .. } = &mut self.kind {
            *format = Some(pattern.into());
        }
        self
    }

    /// Swap IS NULL and IS NOT NULL.
    pub fn invert_logic(mut self) -> Self {
        if let FilterKind::Null { invert } = &mut self.kind {
            *invert = !*invert;
        }
        self
    }

    /// OR the containment checks instead of AND-ing them.
    pub fn match_any(mut self) -> Self {
        if let FilterKind::JsonContains { match_all } = &mut self.kind {
            *match_all = false;
        }
        self
    }

    /// Resolve the scope argument at `position` through `resolver`.
    pub fn bind<F>(mut self, position: usize, resolver: F) -> Self
    where
        F: Fn(&Value) -> Option<Value> + Send + Sync + 'static,
    {
        if let FilterKind::Scope { bindings } = &mut self.kind {
            bindings.insert(position, Arc::new(resolver));
        }
        self
    }

    /// Name used in the request: the alias, or the property.
    pub fn name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.property)
    }

    pub fn property(&self) -> &str {
        &self.property
    }

    pub fn get_alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn kind(&self) -> &FilterKind {
        &self.kind
    }

    pub fn type_name(&self) -> &str {
        self.kind.tag()
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn options(&self) -> &Map<String, Value> {
        &self.options
    }

    pub fn option(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }

    /// Run the `when` gate, then the transform. `None` suppresses the filter.
    pub fn prepare_value(&self, value: Value) -> Option<Value> {
        if let Some(gate) = &self.when
            && !gate(&value)
        {
            return None;
        }
        let value = match &self.transform {
            Some(transform) => transform(value),
            None => value,
        };
        if value.is_null() { None } else { Some(value) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn name_prefers_alias() {
        let filter = FilterDefinition::exact("user_id");
        assert_eq!(filter.name(), "user_id");

        let filter = filter.alias("user");
        assert_eq!(filter.name(), "user");
        assert_eq!(filter.property(), "user_id");
    }

    #[test]
    fn modifiers_return_new_values() {
        let base = FilterDefinition::null("deleted_at");
        let inverted = base.clone().invert_logic();
        assert!(matches!(base.kind(), FilterKind::Null { invert: false }));
        assert!(matches!(inverted.kind(), FilterKind::Null { invert: true }));
    }

    #[test]
    fn kind_specific_modifiers_ignore_other_kinds() {
        let filter = FilterDefinition::exact("status").date_format("%Y").match_any();
        assert!(matches!(filter.kind(), FilterKind::Exact { relation_constraint: true }));

        let filter = FilterDefinition::range("price").bounds("from", "to");
        assert!(matches!(filter.kind(), FilterKind::Range { min_key, .. } if min_key == "from"));
    }

    #[test]
    fn type_tags() {
        assert_eq!(FilterDefinition::date_range("created_at").type_name(), "dateRange");
        assert_eq!(FilterDefinition::json_contains("meta").type_name(), "jsonContains");
        assert_eq!(FilterDefinition::extension("near", "geo").type_name(), "geo");
        assert_eq!(FilterDefinition::trashed().name(), "trashed");
    }

    #[test]
    fn when_gate_and_transform() {
        let filter = FilterDefinition::exact("status")
            .when(|v| v != &json!("any"))
            .prepare_value_with(|v| match v {
                Value::String(s) => Value::String(s.to_uppercase()),
                other => other,
            });
        assert_eq!(filter.prepare_value(json!("any")), None);
        assert_eq!(filter.prepare_value(json!("draft")), Some(json!("DRAFT")));
    }

    #[test]
    fn transform_to_null_suppresses() {
        let filter = FilterDefinition::exact("status").prepare_value_with(|_| Value::Null);
        assert_eq!(filter.prepare_value(json!("x")), None);
    }
}
