//! Strategy traits and the tag-keyed strategy registry.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::definitions::{FilterDefinition, IncludeDefinition, SortDefinition};
use crate::error::WizardResult;
use crate::model::ModelRegistry;
use crate::subject::{SortDirection, Subject};

/// What a strategy can see besides the subject and the definition.
#[derive(Clone, Copy)]
pub struct StrategyContext<'a> {
    /// Model metadata for relation routing and scopes.
    pub models: &'a ModelRegistry,
    relation_columns: Option<&'a IndexMap<String, Vec<String>>>,
}

impl<'a> StrategyContext<'a> {
    pub fn new(models: &'a ModelRegistry) -> Self {
        Self {
            models,
            relation_columns: None,
        }
    }

    /// Attach the per-path column lists used by relationship includes.
    pub fn with_relation_columns(mut self, columns: &'a IndexMap<String, Vec<String>>) -> Self {
        self.relation_columns = Some(columns);
        self
    }

    /// Columns to select when eager-loading `path`, if restricted.
    pub fn columns_for(&self, path: &str) -> Option<&'a [String]> {
        self.relation_columns
            .and_then(|columns| columns.get(path))
            .map(Vec::as_slice)
    }
}

/// Applies one filter definition to a subject.
pub trait FilterStrategy: Send + Sync {
    /// Reject a value before any filter touches the subject. `model` is the
    /// subject's model name.
    fn check(
        &self,
        _ctx: &StrategyContext<'_>,
        _model: &str,
        _filter: &FilterDefinition,
        _value: &Value,
    ) -> WizardResult<()> {
        Ok(())
    }

    fn apply(
        &self,
        ctx: &StrategyContext<'_>,
        subject: &mut dyn Subject,
        filter: &FilterDefinition,
        value: &Value,
    ) -> WizardResult<()>;
}

/// Applies one sort definition to a subject.
pub trait SortStrategy: Send + Sync {
    fn apply(
        &self,
        ctx: &StrategyContext<'_>,
        subject: &mut dyn Subject,
        sort: &SortDefinition,
        direction: SortDirection,
    ) -> WizardResult<()>;
}

/// Applies one include definition to a subject.
pub trait IncludeStrategy: Send + Sync {
    fn apply(
        &self,
        ctx: &StrategyContext<'_>,
        subject: &mut dyn Subject,
        include: &IncludeDefinition,
        fields: Option<&[String]>,
    ) -> WizardResult<()>;
}

/// Strategies keyed by definition type tag.
///
/// Registering under an existing tag replaces the previous strategy, which
/// is how a driver swaps out a built-in behavior.
pub struct StrategyRegistry<T: ?Sized> {
    strategies: HashMap<String, Arc<T>>,
}

impl<T: ?Sized> Default for StrategyRegistry<T> {
    fn default() -> Self {
        Self {
            strategies: HashMap::new(),
        }
    }
}

impl<T: ?Sized> Clone for StrategyRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            strategies: self.strategies.clone(),
        }
    }
}

impl<T: ?Sized> StrategyRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tag: &str, strategy: Arc<T>) {
        if self.strategies.insert(tag.to_string(), strategy).is_some() {
            tracing::debug!(tag, "replaced registered strategy");
        }
    }

    pub fn get(&self, tag: &str) -> Option<&Arc<T>> {
        self.strategies.get(tag)
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.strategies.contains_key(tag)
    }

    /// Registered tags, sorted.
    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.strategies.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    struct Noop;

    impl SortStrategy for Noop {
        fn apply(
            &self,
            _ctx: &StrategyContext<'_>,
            _subject: &mut dyn Subject,
            _sort: &SortDefinition,
            _direction: SortDirection,
        ) -> WizardResult<()> {
            Ok(())
        }
    }

    #[test]
    fn register_and_replace() {
        let mut registry: StrategyRegistry<dyn SortStrategy> = StrategyRegistry::new();
        assert!(!registry.contains("field"));

        registry.register("field", Arc::new(Noop));
        let first = registry.get("field").cloned().unwrap();
        registry.register("field", Arc::new(Noop));
        let second = registry.get("field").cloned().unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(registry.tags(), vec!["field"]);
    }

    #[test]
    fn context_columns() {
        let models = ModelRegistry::new();
        let ctx = StrategyContext::new(&models);
        assert!(ctx.columns_for("posts").is_none());

        let mut columns = IndexMap::new();
        columns.insert("posts".to_string(), vec!["id".to_string()]);
        let ctx = ctx.with_relation_columns(&columns);
        assert_eq!(ctx.columns_for("posts"), Some(&["id".to_string()][..]));
    }
}
