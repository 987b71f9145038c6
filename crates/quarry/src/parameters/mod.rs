//! Request parameter handling.
//!
//! [`QueryParameters`] is the parsed, request-scoped view of the five
//! wizard parameters. It is built once from a [`ParameterSource`] and read
//! by the wizard during validation and application.

mod parser;
mod source;

pub use parser::{FieldMap, ParameterParser, Sort};
pub use source::{ParameterSource, QueryString};

use indexmap::IndexSet;
use serde_json::{Map, Value};

use crate::config::WizardConfig;

/// Parsed request parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParameters {
    filters: Map<String, Value>,
    sorts: Vec<Sort>,
    includes: IndexSet<String>,
    fields: FieldMap,
    appends: IndexSet<String>,
}

impl QueryParameters {
    /// Read and parse every parameter from `source` using the configured
    /// names and separators.
    pub fn from_source(source: &dyn ParameterSource, config: &WizardConfig) -> Self {
        let parser = ParameterParser::new(
            config.separators.clone(),
            config.convert_parameters_to_snake_case,
        );
        let names = &config.parameters;
        let separators = &config.separators;

        let filters = source
            .get(&names.filter)
            .map(|v| parser.parse_filters(&v))
            .unwrap_or_default();
        let sorts = source
            .get(&names.sort)
            .map(|v| parser.parse_sorts(&v))
            .unwrap_or_default();
        let includes = source
            .get(&names.include)
            .map(|v| parser.parse_list(&v, &separators.include))
            .unwrap_or_default();
        let fields = source
            .get(&names.fields)
            .map(|v| parser.parse_fields(&v))
            .unwrap_or_default();
        let appends = source
            .get(&names.append)
            .map(|v| parser.parse_list(&v, &separators.append))
            .unwrap_or_default();

        tracing::trace!(
            filters = filters.len(),
            sorts = sorts.len(),
            includes = includes.len(),
            appends = appends.len(),
            "parsed query parameters"
        );

        Self {
            filters,
            sorts,
            includes,
            fields,
            appends,
        }
    }

    /// Raw nested filter map.
    pub fn filters(&self) -> &Map<String, Value> {
        &self.filters
    }

    /// Value for a dotted filter name.
    ///
    /// A flat key (`"author.name"` literally) takes precedence over the
    /// nested form (`{"author": {"name": ...}}`).
    pub fn filter_value(&self, name: &str) -> Option<&Value> {
        if let Some(value) = self.filters.get(name) {
            return Some(value);
        }

        let mut segments = name.split('.');
        let first = segments.next()?;
        let mut current = self.filters.get(first)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    pub fn sorts(&self) -> &[Sort] {
        &self.sorts
    }

    pub fn includes(&self) -> &IndexSet<String> {
        &self.includes
    }

    /// Grouped sparse fields. The root group is keyed `""`; see
    /// [`fields_under`](Self::fields_under).
    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    /// Sparse fields requested for one resource key.
    pub fn fields_for(&self, resource: &str) -> Option<&IndexSet<String>> {
        self.fields.get(resource)
    }

    pub fn appends(&self) -> &IndexSet<String> {
        &self.appends
    }

    pub fn has_fields(&self) -> bool {
        self.fields.values().any(|f| !f.is_empty())
    }

    /// Non-empty field groups with the unqualified (`""`) group merged into
    /// `root_key`.
    pub fn fields_under(&self, root_key: &str) -> FieldMap {
        let mut fields = self.fields.clone();
        if !root_key.is_empty()
            && let Some(bare) = fields.shift_remove("")
        {
            fields.entry(root_key.to_string()).or_default().extend(bare);
        }
        fields.retain(|_, names| !names.is_empty());
        fields
    }

    /// Replace the filter map.
    pub fn with_filters(mut self, filters: Map<String, Value>) -> Self {
        self.filters = filters;
        self
    }

    /// Set a single (possibly dotted) filter value as a flat key.
    pub fn with_filter(mut self, name: impl Into<String>, value: Value) -> Self {
        self.filters.insert(name.into(), value);
        self
    }

    pub fn with_sorts(mut self, sorts: Vec<Sort>) -> Self {
        self.sorts = sorts;
        self
    }

    pub fn with_includes<I, S>(mut self, includes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.includes = includes.into_iter().map(Into::into).collect();
        self
    }

    /// Set sparse fields for one resource key (`""` for the root).
    pub fn with_fields<I, S>(mut self, resource: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields
            .insert(resource.into(), fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_appends<I, S>(mut self, appends: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.appends = appends.into_iter().map(Into::into).collect();
        self
    }
}
