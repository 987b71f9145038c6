//! Reusable resource rule sets.
//!
//! A [`ResourceSchema`] declares what a resource exposes once, so handlers
//! only pick the schema. Each mode may specialize it through a
//! [`SchemaContext`]: a context list set to `Some` replaces the schema's
//! list (an empty list included), `None` inherits it, and the disallowed
//! lists are subtracted afterwards.

use crate::definitions::{FilterDefinition, IncludeDefinition, Rule, SortDefinition};

/// Which wizard a context applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextMode {
    List,
    Item,
}

impl ContextMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextMode::List => "list",
            ContextMode::Item => "item",
        }
    }
}

/// Allowed and default operations of one resource.
///
/// Only [`model`](ResourceSchema::model) is required; every list defaults
/// to empty.
pub trait ResourceSchema: Send + Sync {
    /// Registered model name the schema describes.
    fn model(&self) -> &str;

    /// Resource key used for the root entry of `fields[...]`. Falls back to
    /// the model's resource key.
    fn type_name(&self) -> Option<&str> {
        None
    }

    fn filters(&self) -> Vec<Rule<FilterDefinition>> {
        Vec::new()
    }

    fn sorts(&self) -> Vec<Rule<SortDefinition>> {
        Vec::new()
    }

    fn includes(&self) -> Vec<Rule<IncludeDefinition>> {
        Vec::new()
    }

    /// Allowed fields: bare names for the root resource, `relation.field`
    /// for related resources.
    fn fields(&self) -> Vec<String> {
        Vec::new()
    }

    fn appends(&self) -> Vec<String> {
        Vec::new()
    }

    /// Sorts applied when the request carries none (`-created_at` style).
    fn default_sorts(&self) -> Vec<String> {
        Vec::new()
    }

    fn default_includes(&self) -> Vec<String> {
        Vec::new()
    }

    fn default_fields(&self) -> Vec<String> {
        Vec::new()
    }

    fn default_appends(&self) -> Vec<String> {
        Vec::new()
    }

    /// Mode-specific overrides.
    fn context(&self, mode: ContextMode) -> Option<SchemaContext> {
        let _ = mode;
        None
    }
}

/// Per-mode overrides of a [`ResourceSchema`].
#[derive(Debug, Clone, Default)]
pub struct SchemaContext {
    pub allowed_filters: Option<Vec<Rule<FilterDefinition>>>,
    pub allowed_sorts: Option<Vec<Rule<SortDefinition>>>,
    pub allowed_includes: Option<Vec<Rule<IncludeDefinition>>>,
    pub allowed_fields: Option<Vec<String>>,
    pub allowed_appends: Option<Vec<String>>,
    pub disallowed_filters: Vec<String>,
    pub disallowed_sorts: Vec<String>,
    pub disallowed_includes: Vec<String>,
    pub disallowed_fields: Vec<String>,
    pub disallowed_appends: Vec<String>,
    pub default_sorts: Option<Vec<String>>,
    pub default_includes: Option<Vec<String>>,
    pub default_fields: Option<Vec<String>>,
    pub default_appends: Option<Vec<String>>,
}

fn strings<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}

impl SchemaContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allowed_filters<I, R>(mut self, filters: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<Rule<FilterDefinition>>,
    {
        self.allowed_filters = Some(filters.into_iter().map(Into::into).collect());
        self
    }

    pub fn allowed_sorts<I, R>(mut self, sorts: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<Rule<SortDefinition>>,
    {
        self.allowed_sorts = Some(sorts.into_iter().map(Into::into).collect());
        self
    }

    pub fn allowed_includes<I, R>(mut self, includes: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<Rule<IncludeDefinition>>,
    {
        self.allowed_includes = Some(includes.into_iter().map(Into::into).collect());
        self
    }

    pub fn allowed_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_fields = Some(strings(fields));
        self
    }

    pub fn allowed_appends<I, S>(mut self, appends: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_appends = Some(strings(appends));
        self
    }

    pub fn disallowed_filters<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.disallowed_filters = strings(names);
        self
    }

    pub fn disallowed_sorts<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.disallowed_sorts = strings(names);
        self
    }

    pub fn disallowed_includes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.disallowed_includes = strings(names);
        self
    }

    pub fn disallowed_fields<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.disallowed_fields = strings(names);
        self
    }

    pub fn disallowed_appends<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.disallowed_appends = strings(names);
        self
    }

    pub fn default_sorts<I, S>(mut self, sorts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_sorts = Some(strings(sorts));
        self
    }

    pub fn default_includes<I, S>(mut self, includes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_includes = Some(strings(includes));
        self
    }

    pub fn default_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_fields = Some(strings(fields));
        self
    }

    pub fn default_appends<I, S>(mut self, appends: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_appends = Some(strings(appends));
        self
    }
}
