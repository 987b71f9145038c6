//! The default driver for relational subjects.

use std::sync::Arc;

use super::filters::{
    CallbackFilter, DateRangeFilter, ExactFilter, JsonContainsFilter, NullFilter, PartialFilter,
    PassthroughFilter, RangeFilter, ScopeFilter, TrashedFilter,
};
use super::includes::{CallbackInclude, CountInclude, ExistsInclude, RelationshipInclude};
use super::sorts::{AggregateSort, CallbackSort, CountSort, FieldSort};
use super::strategy::{FilterStrategy, IncludeStrategy, SortStrategy, StrategyRegistry};
use super::{Capabilities, Capability, Driver};

/// Driver backed by the built-in strategies, registered as `relational`.
///
/// Strategies are keyed by definition type tag. Registering a strategy
/// under a built-in tag replaces the built-in; any other tag becomes
/// reachable through extension definitions.
#[derive(Clone)]
pub struct RelationalDriver {
    name: String,
    capabilities: Capabilities,
    filters: StrategyRegistry<dyn FilterStrategy>,
    sorts: StrategyRegistry<dyn SortStrategy>,
    includes: StrategyRegistry<dyn IncludeStrategy>,
}

impl Default for RelationalDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl RelationalDriver {
    pub fn new() -> Self {
        let mut filters: StrategyRegistry<dyn FilterStrategy> = StrategyRegistry::new();
        filters.register("exact", Arc::new(ExactFilter));
        filters.register("partial", Arc::new(PartialFilter));
        filters.register("range", Arc::new(RangeFilter));
        filters.register("dateRange", Arc::new(DateRangeFilter));
        filters.register("null", Arc::new(NullFilter));
        filters.register("jsonContains", Arc::new(JsonContainsFilter));
        filters.register("trashed", Arc::new(TrashedFilter));
        filters.register("scope", Arc::new(ScopeFilter));
        filters.register("callback", Arc::new(CallbackFilter));
        filters.register("passthrough", Arc::new(PassthroughFilter));

        let mut sorts: StrategyRegistry<dyn SortStrategy> = StrategyRegistry::new();
        sorts.register("field", Arc::new(FieldSort));
        sorts.register("callback", Arc::new(CallbackSort));
        sorts.register("count", Arc::new(CountSort));
        sorts.register("aggregate", Arc::new(AggregateSort));

        let mut includes: StrategyRegistry<dyn IncludeStrategy> = StrategyRegistry::new();
        includes.register("relationship", Arc::new(RelationshipInclude));
        includes.register("count", Arc::new(CountInclude));
        includes.register("exists", Arc::new(ExistsInclude));
        includes.register("callback", Arc::new(CallbackInclude));

        Self {
            name: "relational".to_string(),
            capabilities: Capabilities::all(),
            filters,
            sorts,
            includes,
        }
    }

    /// Register the driver under a different name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn without(mut self, capability: Capability) -> Self {
        self.capabilities = self.capabilities.without(capability);
        self
    }

    pub fn register_filter_strategy(mut self, tag: &str, strategy: Arc<dyn FilterStrategy>) -> Self {
        self.filters.register(tag, strategy);
        self
    }

    pub fn register_sort_strategy(mut self, tag: &str, strategy: Arc<dyn SortStrategy>) -> Self {
        self.sorts.register(tag, strategy);
        self
    }

    pub fn register_include_strategy(mut self, tag: &str, strategy: Arc<dyn IncludeStrategy>) -> Self {
        self.includes.register(tag, strategy);
        self
    }

    /// Tags with a registered filter strategy.
    pub fn filter_types(&self) -> Vec<&str> {
        self.filters.tags()
    }

    pub fn sort_types(&self) -> Vec<&str> {
        self.sorts.tags()
    }

    pub fn include_types(&self) -> Vec<&str> {
        self.includes.tags()
    }
}

impl Driver for RelationalDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn filter_strategy(&self, tag: &str) -> Option<Arc<dyn FilterStrategy>> {
        self.filters.get(tag).cloned()
    }

    fn sort_strategy(&self, tag: &str) -> Option<Arc<dyn SortStrategy>> {
        self.sorts.get(tag).cloned()
    }

    fn include_strategy(&self, tag: &str) -> Option<Arc<dyn IncludeStrategy>> {
        self.includes.get(tag).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_tags() {
        let driver = RelationalDriver::new();
        assert_eq!(
            driver.filter_types(),
            vec![
                "callback",
                "dateRange",
                "exact",
                "jsonContains",
                "null",
                "partial",
                "passthrough",
                "range",
                "scope",
                "trashed"
            ]
        );
        assert_eq!(driver.sort_types(), vec!["aggregate", "callback", "count", "field"]);
        assert_eq!(driver.include_types(), vec!["callback", "count", "exists", "relationship"]);
    }

    #[test]
    fn renamed_driver_keeps_strategies() {
        let driver = RelationalDriver::new().named("archive").without(Capability::Sorts);
        assert_eq!(driver.name(), "archive");
        assert!(!driver.supports(Capability::Sorts));
        assert!(driver.filter_strategy("exact").is_some());
    }
}
