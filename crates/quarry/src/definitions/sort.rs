//! Sort definitions.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::driver::SortStrategy;
use crate::error::WizardResult;
use crate::subject::{Aggregate, SortDirection, Subject};

/// User sort logic: `(subject, direction, property)`.
pub type SortCallback = Arc<dyn Fn(&mut dyn Subject, SortDirection, &str) -> WizardResult<()> + Send + Sync>;

pub type SortStrategyFactory = Arc<dyn Fn() -> Box<dyn SortStrategy> + Send + Sync>;

#[derive(Clone)]
pub enum SortKind {
    /// Order by a qualified column.
    Field,
    Callback(SortCallback),
    /// Order by the number of related rows.
    Count { relation: String },
    /// Order by an aggregate over a related column.
    Aggregate {
        relation: String,
        column: String,
        function: Aggregate,
    },
    Extension(String),
    Custom(SortStrategyFactory),
}

impl SortKind {
    pub fn tag(&self) -> &str {
        match self {
            SortKind::Field => "field",
            SortKind::Callback(_) => "callback",
            SortKind::Count { .. } => "count",
            SortKind::Aggregate { .. } => "aggregate",
            SortKind::Extension(tag) => tag,
            SortKind::Custom(_) => "custom",
        }
    }
}

impl fmt::Debug for SortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortKind::Count { relation } => f.debug_struct("Count").field("relation", relation).finish(),
            SortKind::Aggregate {
                relation,
                column,
                function,
            } => f
                .debug_struct("Aggregate")
                .field("relation", relation)
                .field("column", column)
                .field("function", function)
                .finish(),
            SortKind::Extension(tag) => f.debug_tuple("Extension").field(tag).finish(),
            other => f.write_str(other.tag()),
        }
    }
}

/// One allowed sort.
#[derive(Clone)]
pub struct SortDefinition {
    property: String,
    alias: Option<String>,
    kind: SortKind,
    options: Map<String, Value>,
}

impl fmt::Debug for SortDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SortDefinition")
            .field("property", &self.property)
            .field("alias", &self.alias)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl SortDefinition {
    pub fn new(property: impl Into<String>, kind: SortKind) -> Self {
        Self {
            property: property.into(),
            alias: None,
            kind,
            options: Map::new(),
        }
    }

    pub fn field(property: impl Into<String>) -> Self {
        Self::new(property, SortKind::Field)
    }

    pub fn callback<F>(property: impl Into<String>, callback: F) -> Self
    where
        F: Fn(&mut dyn Subject, SortDirection, &str) -> WizardResult<()> + Send + Sync + 'static,
    {
        Self::new(property, SortKind::Callback(Arc::new(callback)))
    }

    /// Sort by related row count. The request name defaults to
    /// `{relation}_count`.
    pub fn count(relation: impl Into<String>) -> Self {
        let relation = relation.into();
        let name = format!("{}_count", crate::support::snake(&relation));
        Self::new(name, SortKind::Count { relation })
    }

    /// Sort by `function(relation.column)`. The request name defaults to
    /// `{relation}_{function}_{column}`.
    pub fn aggregate(relation: impl Into<String>, column: impl Into<String>, function: Aggregate) -> Self {
        let relation = relation.into();
        let column = column.into();
        let name = aggregate_attribute(&relation, &column, function);
        Self::new(
            name,
            SortKind::Aggregate {
                relation,
                column,
                function,
            },
        )
    }

    pub fn extension(property: impl Into<String>, tag: impl Into<String>) -> Self {
        Self::new(property, SortKind::Extension(tag.into()))
    }

    pub fn custom<F>(property: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn SortStrategy> + Send + Sync + 'static,
    {
        Self::new(property, SortKind::Custom(Arc::new(factory)))
    }

    /// Name the definition is requested by.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    pub fn name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.property)
    }

    pub fn property(&self) -> &str {
        &self.property
    }

    pub fn get_alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn kind(&self) -> &SortKind {
        &self.kind
    }

    pub fn type_name(&self) -> &str {
        self.kind.tag()
    }

    pub fn options(&self) -> &Map<String, Value> {
        &self.options
    }
}

/// Attribute name an aggregate is exposed under: `posts_sum_views`.
pub fn aggregate_attribute(relation: &str, column: &str, function: Aggregate) -> String {
    format!(
        "{}_{}_{}",
        crate::support::snake(relation),
        function.as_str(),
        crate::support::snake(column)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_sort_name() {
        let sort = SortDefinition::count("blogPosts");
        assert_eq!(sort.name(), "blog_posts_count");
        assert_eq!(sort.type_name(), "count");
        assert_eq!(sort.alias("popularity").name(), "popularity");
    }

    #[test]
    fn aggregate_sort_name() {
        let sort = SortDefinition::aggregate("posts", "views", Aggregate::Sum);
        assert_eq!(sort.name(), "posts_sum_views");
        assert!(matches!(sort.kind(), SortKind::Aggregate { function: Aggregate::Sum, .. }));
    }

    #[test]
    fn field_sort_defaults() {
        let sort = SortDefinition::field("created_at");
        assert_eq!(sort.name(), "created_at");
        assert_eq!(sort.type_name(), "field");
        assert!(sort.get_alias().is_none());
    }
}
