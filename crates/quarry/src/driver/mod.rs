//! Drivers: definition normalization and strategy dispatch.
//!
//! A driver owns a registry of strategies per definition category. Built-in
//! strategies cover the standard definition types; additional ones are
//! registered under their own tag and reached through `Extension(tag)`
//! definitions. `Custom` definitions carry their own factory and bypass the
//! registry entirely.

mod filters;
mod includes;
mod relational;
mod sorts;
mod strategy;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::config::Suffixes;
use crate::definitions::{
    FilterDefinition, FilterKind, IncludeDefinition, IncludeKind, Rule, SortDefinition, SortKind,
};
use crate::error::{WizardError, WizardResult};
use crate::subject::{SortDirection, Subject};

pub use filters::{
    CallbackFilter, DateRangeFilter, ExactFilter, JsonContainsFilter, NullFilter, PartialFilter,
    PassthroughFilter, RangeFilter, ScopeFilter, TrashedFilter,
};
pub use includes::{CallbackInclude, CountInclude, ExistsInclude, RelationshipInclude};
pub use relational::RelationalDriver;
pub use sorts::{AggregateSort, CallbackSort, CountSort, FieldSort};
pub use strategy::{FilterStrategy, IncludeStrategy, SortStrategy, StrategyContext, StrategyRegistry};

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Operation category a driver may or may not support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Filters,
    Sorts,
    Includes,
    Fields,
    Appends,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Filters => "filters",
            Capability::Sorts => "sorts",
            Capability::Includes => "includes",
            Capability::Fields => "fields",
            Capability::Appends => "appends",
        }
    }
}

/// Which categories a driver handles. Unsupported categories are skipped
/// by the wizards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub filters: bool,
    pub sorts: bool,
    pub includes: bool,
    pub fields: bool,
    pub appends: bool,
}

impl Capabilities {
    pub fn all() -> Self {
        Self {
            filters: true,
            sorts: true,
            includes: true,
            fields: true,
            appends: true,
        }
    }

    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::Filters => self.filters,
            Capability::Sorts => self.sorts,
            Capability::Includes => self.includes,
            Capability::Fields => self.fields,
            Capability::Appends => self.appends,
        }
    }

    /// Copy with `capability` switched off.
    pub fn without(mut self, capability: Capability) -> Self {
        match capability {
            Capability::Filters => self.filters = false,
            Capability::Sorts => self.sorts = false,
            Capability::Includes => self.includes = false,
            Capability::Fields => self.fields = false,
            Capability::Appends => self.appends = false,
        }
        self
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::all()
    }
}

// ---------------------------------------------------------------------------
// Driver trait
// ---------------------------------------------------------------------------

/// Translates definitions into subject operations.
///
/// Implementors provide the strategy lookup; normalization of bare names
/// and dispatch of `Custom` definitions are shared.
pub trait Driver: Send + Sync {
    /// Registry key of the driver.
    fn name(&self) -> &str;

    fn capabilities(&self) -> Capabilities;

    fn filter_strategy(&self, tag: &str) -> Option<Arc<dyn FilterStrategy>>;

    fn sort_strategy(&self, tag: &str) -> Option<Arc<dyn SortStrategy>>;

    fn include_strategy(&self, tag: &str) -> Option<Arc<dyn IncludeStrategy>>;

    fn supports(&self, capability: Capability) -> bool {
        self.capabilities().supports(capability)
    }

    fn supports_filter_type(&self, filter: &FilterDefinition) -> bool {
        matches!(filter.kind(), FilterKind::Custom(_)) || self.filter_strategy(filter.type_name()).is_some()
    }

    fn supports_sort_type(&self, sort: &SortDefinition) -> bool {
        matches!(sort.kind(), SortKind::Custom(_)) || self.sort_strategy(sort.type_name()).is_some()
    }

    fn supports_include_type(&self, include: &IncludeDefinition) -> bool {
        matches!(include.kind(), IncludeKind::Custom(_)) || self.include_strategy(include.type_name()).is_some()
    }

    /// Bare names become exact filters.
    fn normalize_filter(&self, rule: Rule<FilterDefinition>) -> WizardResult<FilterDefinition> {
        let filter = match rule {
            Rule::Name(name) => FilterDefinition::exact(name),
            Rule::Definition(filter) => filter,
        };
        if filter.property().is_empty() {
            return Err(WizardError::EmptyDefinition { category: "filter" });
        }
        Ok(filter)
    }

    /// Bare names become field sorts. A leading `-` is not part of the name.
    fn normalize_sort(&self, rule: Rule<SortDefinition>) -> WizardResult<SortDefinition> {
        let sort = match rule {
            Rule::Name(name) => SortDefinition::field(name.trim_start_matches('-')),
            Rule::Definition(sort) => sort,
        };
        if sort.property().is_empty() {
            return Err(WizardError::EmptyDefinition { category: "sort" });
        }
        Ok(sort)
    }

    /// Bare names ending in the count or exists suffix become count or
    /// exists includes named after the full string; other names become
    /// relationship includes. Count and exists definitions without an alias
    /// are named `relation + suffix`.
    fn normalize_include(
        &self,
        rule: Rule<IncludeDefinition>,
        suffixes: &Suffixes,
    ) -> WizardResult<IncludeDefinition> {
        let include = match rule {
            Rule::Name(name) => {
                if let Some(relation) = strip_suffix(&name, &suffixes.count) {
                    IncludeDefinition::count(relation).alias(name.as_str())
                } else if let Some(relation) = strip_suffix(&name, &suffixes.exists) {
                    IncludeDefinition::exists(relation).alias(name.as_str())
                } else {
                    IncludeDefinition::relationship(name)
                }
            }
            Rule::Definition(include) => {
                let suffix = match include.kind() {
                    IncludeKind::Count => Some(&suffixes.count),
                    IncludeKind::Exists => Some(&suffixes.exists),
                    _ => None,
                };
                match suffix {
                    Some(suffix) if include.get_alias().is_none() => {
                        let alias = format!("{}{suffix}", include.relation());
                        include.alias(alias)
                    }
                    _ => include,
                }
            }
        };
        if include.relation().is_empty() {
            return Err(WizardError::EmptyDefinition { category: "include" });
        }
        Ok(include)
    }

    fn check_filter(
        &self,
        ctx: &StrategyContext<'_>,
        model: &str,
        filter: &FilterDefinition,
        value: &Value,
    ) -> WizardResult<()> {
        if let FilterKind::Custom(factory) = filter.kind() {
            return factory().check(ctx, model, filter, value);
        }
        let strategy = self
            .filter_strategy(filter.type_name())
            .ok_or_else(|| unsupported(self.name(), "filter", filter.type_name()))?;
        strategy.check(ctx, model, filter, value)
    }

    fn apply_filter(
        &self,
        ctx: &StrategyContext<'_>,
        subject: &mut dyn Subject,
        filter: &FilterDefinition,
        value: &Value,
    ) -> WizardResult<()> {
        if let FilterKind::Custom(factory) = filter.kind() {
            return factory().apply(ctx, subject, filter, value);
        }
        let strategy = self
            .filter_strategy(filter.type_name())
            .ok_or_else(|| unsupported(self.name(), "filter", filter.type_name()))?;
        strategy.apply(ctx, subject, filter, value)
    }

    fn apply_sort(
        &self,
        ctx: &StrategyContext<'_>,
        subject: &mut dyn Subject,
        sort: &SortDefinition,
        direction: SortDirection,
    ) -> WizardResult<()> {
        if let SortKind::Custom(factory) = sort.kind() {
            return factory().apply(ctx, subject, sort, direction);
        }
        let strategy = self
            .sort_strategy(sort.type_name())
            .ok_or_else(|| unsupported(self.name(), "sort", sort.type_name()))?;
        strategy.apply(ctx, subject, sort, direction)
    }

    fn apply_include(
        &self,
        ctx: &StrategyContext<'_>,
        subject: &mut dyn Subject,
        include: &IncludeDefinition,
        fields: Option<&[String]>,
    ) -> WizardResult<()> {
        if let IncludeKind::Custom(factory) = include.kind() {
            return factory().apply(ctx, subject, include, fields);
        }
        let strategy = self
            .include_strategy(include.type_name())
            .ok_or_else(|| unsupported(self.name(), "include", include.type_name()))?;
        strategy.apply(ctx, subject, include, fields)
    }

    /// Restrict the root select list.
    fn apply_fields(&self, subject: &mut dyn Subject, columns: &[String]) -> WizardResult<()> {
        if !self.supports(Capability::Fields) {
            return Err(WizardError::UnsupportedCapability {
                driver: self.name().to_string(),
                capability: Capability::Fields.as_str(),
            });
        }
        if !columns.is_empty() {
            subject.select(columns);
        }
        Ok(())
    }
}

fn strip_suffix<'a>(name: &'a str, suffix: &str) -> Option<&'a str> {
    if suffix.is_empty() {
        return None;
    }
    name.strip_suffix(suffix).filter(|relation| !relation.is_empty())
}

fn unsupported(driver: &str, category: &'static str, type_name: &str) -> WizardError {
    WizardError::UnsupportedType {
        driver: driver.to_string(),
        category,
        type_name: type_name.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Driver registry
// ---------------------------------------------------------------------------

/// Drivers by name. Starts with the relational driver registered.
#[derive(Clone)]
pub struct DriverRegistry {
    drivers: HashMap<String, Arc<dyn Driver>>,
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DriverRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            drivers: HashMap::new(),
        };
        registry.register(Arc::new(RelationalDriver::new()));
        registry
    }

    /// Register a driver under its own name, replacing any previous one.
    pub fn register(&mut self, driver: Arc<dyn Driver>) {
        let name = driver.name().to_string();
        if self.drivers.insert(name.clone(), driver).is_some() {
            tracing::debug!(driver = %name, "replaced registered driver");
        }
    }

    pub fn get(&self, name: &str) -> WizardResult<Arc<dyn Driver>> {
        self.drivers
            .get(name)
            .cloned()
            .ok_or_else(|| WizardError::UnknownDriver(name.to_string()))
    }

    /// Registered driver names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.drivers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn suffixes() -> Suffixes {
        Suffixes {
            count: "Count".to_string(),
            exists: "Exists".to_string(),
        }
    }

    #[test]
    fn bare_names_normalize_to_defaults() {
        let driver = RelationalDriver::new();

        let filter = driver.normalize_filter(Rule::from("status")).unwrap();
        assert_eq!(filter.type_name(), "exact");

        let sort = driver.normalize_sort(Rule::from("-created_at")).unwrap();
        assert_eq!(sort.type_name(), "field");
        assert_eq!(sort.property(), "created_at");

        let include = driver.normalize_include(Rule::from("posts.comments"), &suffixes()).unwrap();
        assert!(include.is_relationship());
    }

    #[test]
    fn suffixed_include_names() {
        let driver = RelationalDriver::new();

        let count = driver.normalize_include(Rule::from("postsCount"), &suffixes()).unwrap();
        assert_eq!(count.type_name(), "count");
        assert_eq!(count.relation(), "posts");
        assert_eq!(count.name(), "postsCount");

        let exists = driver.normalize_include(Rule::from("postsExists"), &suffixes()).unwrap();
        assert_eq!(exists.type_name(), "exists");
        assert_eq!(exists.relation(), "posts");

        // The suffix alone is a relation name.
        let bare = driver.normalize_include(Rule::from("Count"), &suffixes()).unwrap();
        assert!(bare.is_relationship());
    }

    #[test]
    fn values_are_checked_without_a_subject() {
        use serde_json::json;

        use crate::model::{ModelDescriptor, ModelRegistry};

        let models = ModelRegistry::new().with(ModelDescriptor::new("Post", "posts").scope("published", |_, _| Ok(())));
        let ctx = StrategyContext::new(&models);
        let driver = RelationalDriver::new();

        let dated = FilterDefinition::date_range("published_at").date_format("%Y-%m-%d");
        assert!(driver.check_filter(&ctx, "Post", &dated, &json!({"from": "2024-01-02"})).is_ok());
        assert!(matches!(
            driver.check_filter(&ctx, "Post", &dated, &json!({"from": "soon"})),
            Err(WizardError::InvalidFilterValue { .. })
        ));

        let range = FilterDefinition::range("views");
        assert!(driver.check_filter(&ctx, "Post", &range, &json!("10")).is_err());

        let exact = FilterDefinition::exact("status");
        assert!(driver.check_filter(&ctx, "Post", &exact, &json!({"a": "b"})).is_err());

        assert!(
            driver
                .check_filter(&ctx, "Post", &FilterDefinition::scope("published"), &json!(true))
                .is_ok()
        );
        assert!(matches!(
            driver.check_filter(&ctx, "Post", &FilterDefinition::scope("archived"), &json!(true)),
            Err(WizardError::UnknownScope { scope, .. }) if scope == "archived"
        ));
    }

    #[test]
    fn count_definition_gets_default_alias() {
        let driver = RelationalDriver::new();
        let include = driver
            .normalize_include(Rule::from(IncludeDefinition::count("comments")), &suffixes())
            .unwrap();
        assert_eq!(include.name(), "commentsCount");

        let aliased = driver
            .normalize_include(
                Rule::from(IncludeDefinition::count("comments").alias("replies")),
                &suffixes(),
            )
            .unwrap();
        assert_eq!(aliased.name(), "replies");
    }

    #[test]
    fn empty_targets_are_rejected() {
        let driver = RelationalDriver::new();
        let err = driver.normalize_filter(Rule::from("")).unwrap_err();
        assert!(matches!(err, WizardError::EmptyDefinition { category: "filter" }));
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        let driver = RelationalDriver::new();
        assert!(!driver.supports_filter_type(&FilterDefinition::extension("near", "geo")));
        assert!(driver.supports_filter_type(&FilterDefinition::date_range("created_at")));
    }

    #[test]
    fn registry_lookup() {
        let registry = DriverRegistry::new();
        assert_eq!(registry.names(), vec!["relational"]);
        assert!(registry.get("relational").is_ok());
        assert!(matches!(
            registry.get("scout"),
            Err(WizardError::UnknownDriver(name)) if name == "scout"
        ));
    }

    #[test]
    fn capabilities_toggle() {
        let caps = Capabilities::all().without(Capability::Appends);
        assert!(caps.supports(Capability::Filters));
        assert!(!caps.supports(Capability::Appends));
    }
}
