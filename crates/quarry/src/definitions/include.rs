//! Include definitions.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::driver::IncludeStrategy;
use crate::error::WizardResult;
use crate::subject::Subject;

/// User include logic: `(subject, relation, fields)`.
pub type IncludeCallback =
    Arc<dyn Fn(&mut dyn Subject, &str, Option<&[String]>) -> WizardResult<()> + Send + Sync>;

pub type IncludeStrategyFactory = Arc<dyn Fn() -> Box<dyn IncludeStrategy> + Send + Sync>;

#[derive(Clone)]
pub enum IncludeKind {
    /// Eager-load a (possibly nested) relation path.
    Relationship,
    /// Add a `{relation}_count` attribute.
    Count,
    /// Add a `{relation}_exists` attribute.
    Exists,
    Callback(IncludeCallback),
    Extension(String),
    Custom(IncludeStrategyFactory),
}

impl IncludeKind {
    pub fn tag(&self) -> &str {
        match self {
            IncludeKind::Relationship => "relationship",
            IncludeKind::Count => "count",
            IncludeKind::Exists => "exists",
            IncludeKind::Callback(_) => "callback",
            IncludeKind::Extension(tag) => tag,
            IncludeKind::Custom(_) => "custom",
        }
    }
}

impl fmt::Debug for IncludeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IncludeKind::Extension(tag) => f.debug_tuple("Extension").field(tag).finish(),
            other => f.write_str(other.tag()),
        }
    }
}

/// One allowed include.
#[derive(Clone)]
pub struct IncludeDefinition {
    relation: String,
    alias: Option<String>,
    kind: IncludeKind,
    options: Map<String, Value>,
}

impl fmt::Debug for IncludeDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncludeDefinition")
            .field("relation", &self.relation)
            .field("alias", &self.alias)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl IncludeDefinition {
    pub fn new(relation: impl Into<String>, kind: IncludeKind) -> Self {
        Self {
            relation: relation.into(),
            alias: None,
            kind,
            options: Map::new(),
        }
    }

    pub fn relationship(relation: impl Into<String>) -> Self {
        Self::new(relation, IncludeKind::Relationship)
    }

    /// Count include. Without an alias the driver names it
    /// `relation + count suffix` (`postsCount`).
    pub fn count(relation: impl Into<String>) -> Self {
        Self::new(relation, IncludeKind::Count)
    }

    pub fn exists(relation: impl Into<String>) -> Self {
        Self::new(relation, IncludeKind::Exists)
    }

    pub fn callback<F>(relation: impl Into<String>, callback: F) -> Self
    where
        F: Fn(&mut dyn Subject, &str, Option<&[String]>) -> WizardResult<()> + Send + Sync + 'static,
    {
        Self::new(relation, IncludeKind::Callback(Arc::new(callback)))
    }

    pub fn extension(relation: impl Into<String>, tag: impl Into<String>) -> Self {
        Self::new(relation, IncludeKind::Extension(tag.into()))
    }

    pub fn custom<F>(relation: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn IncludeStrategy> + Send + Sync + 'static,
    {
        Self::new(relation, IncludeKind::Custom(Arc::new(factory)))
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
        self.alias.as_deref().unwrap_or(&self.relation)
    }

    pub fn relation(&self) -> &str {
        &self.relation
    }

    pub fn get_alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn kind(&self) -> &IncludeKind {
        &self.kind
    }

    pub fn type_name(&self) -> &str {
        self.kind.tag()
    }

    pub fn options(&self) -> &Map<String, Value> {
        &self.options
    }

    pub fn is_relationship(&self) -> bool {
        matches!(self.kind, IncludeKind::Relationship)
    }
}

/// Attribute a count include adds: `posts_count`.
pub fn count_attribute(relation: &str) -> String {
    format!("{}_count", crate::support::snake(relation))
}

/// Attribute an exists include adds: `posts_exists`.
pub fn exists_attribute(relation: &str) -> String {
    format!("{}_exists", crate::support::snake(relation))
}
