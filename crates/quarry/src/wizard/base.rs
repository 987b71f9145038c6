//! Shared wizard state and the apply phases.

use std::cell::OnceCell;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use serde_json::{Map, Value};

use super::rules::{EffectiveRules, ExplicitRules, is_disallowed};
use crate::config::{RelationSelectMode, WizardConfig};
use crate::definitions::{
    FilterDefinition, FilterKind, IncludeDefinition, IncludeKind, Rule, SortDefinition, SortKind,
    aggregate_attribute, count_attribute, exists_attribute, rules,
};
use crate::driver::{Capability, Driver, StrategyContext};
use crate::error::{QueryLimit, WizardError, WizardResult};
use crate::model::{ModelRegistry, RecordHandle};
use crate::parameters::{FieldMap, QueryParameters, Sort};
use crate::postprocess::{AttributeTree, RelationPostProcessor};
use crate::schema::{ContextMode, ResourceSchema};
use crate::select::{SafeRelationSelect, SelectPlan};
use crate::subject::{SortDirection, Subject};
use crate::support::{cumulative_paths, depth, join_path, prefixes, split_last};

/// Per-instance progress. Reset whenever a wizard is cloned.
#[derive(Debug, Default)]
struct AppliedState {
    filters: bool,
    sorts: bool,
    includes: bool,
    fields: bool,
    appends: bool,
    fields_resolved: Option<FieldMap>,
    appends_resolved: Option<IndexSet<String>>,
    plan: Option<SelectPlan>,
    /// Aggregate attributes added by includes and sorts; kept visible
    /// when sparse fields restrict the root.
    computed_attributes: IndexSet<String>,
    passthrough: Map<String, Value>,
}

/// Validates request parameters against the effective rules and applies
/// them to a subject.
///
/// Each phase runs at most once per instance; calling it again is a no-op.
/// A phase whose capability the driver lacks is marked applied without
/// touching the subject.
pub struct BaseQueryWizard<S> {
    subject: S,
    parameters: QueryParameters,
    config: Arc<WizardConfig>,
    driver: Arc<dyn Driver>,
    models: Arc<ModelRegistry>,
    schema: Option<Arc<dyn ResourceSchema>>,
    mode: ContextMode,
    explicit: ExplicitRules,
    rules: OnceCell<Arc<EffectiveRules>>,
    state: AppliedState,
}

impl<S: Clone> Clone for BaseQueryWizard<S> {
    /// Deep-copies the subject and the configured rules; applied flags and
    /// caches start over.
    fn clone(&self) -> Self {
        Self {
            subject: self.subject.clone(),
            parameters: self.parameters.clone(),
            config: Arc::clone(&self.config),
            driver: Arc::clone(&self.driver),
            models: Arc::clone(&self.models),
            schema: self.schema.clone(),
            mode: self.mode,
            explicit: self.explicit.clone(),
            rules: OnceCell::new(),
            state: AppliedState::default(),
        }
    }
}

impl<S: Subject> fmt::Debug for BaseQueryWizard<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaseQueryWizard")
            .field("model", &self.subject.model_name())
            .field("driver", &self.driver.name())
            .field("mode", &self.mode)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

fn check_limit(limit: QueryLimit, actual: usize, max: Option<usize>) -> WizardResult<()> {
    match max {
        Some(max) if actual > max => Err(WizardError::LimitExceeded { limit, actual, max }),
        _ => Ok(()),
    }
}

fn unsupported(driver: &dyn Driver, category: &'static str, type_name: &str) -> WizardError {
    WizardError::UnsupportedType {
        driver: driver.name().to_string(),
        category,
        type_name: type_name.to_string(),
    }
}

/// Collect dotted filter names from the nested request structure.
///
/// Descends into objects until the name is an allowed filter, so an
/// allowed filter can take an object value (range bounds).
fn collect_filter_names(
    filters: &Map<String, Value>,
    prefix: &str,
    allowed: &IndexSet<&str>,
    max_depth: Option<usize>,
    names: &mut IndexSet<String>,
) -> WizardResult<()> {
    for (key, value) in filters {
        let name = join_path(prefix, key);
        let level = depth(&name);
        if let Some(max) = max_depth
            && level > max
        {
            return Err(WizardError::LimitExceeded {
                limit: QueryLimit::FilterDepth,
                actual: level,
                max,
            });
        }
        match value {
            Value::Object(nested) if !nested.is_empty() && !allowed.contains(name.as_str()) => {
                collect_filter_names(nested, &name, allowed, max_depth, names)?;
            }
            _ => {
                names.insert(name);
            }
        }
    }
    Ok(())
}

/// Group `relation.field` entries by relation; bare names go to `root_key`.
fn group_fields(fields: &[String], root_key: &str) -> FieldMap {
    let mut grouped = FieldMap::new();
    for field in fields {
        let (resource, name) = split_last(field);
        let resource = if resource.is_empty() { root_key } else { resource };
        grouped
            .entry(resource.to_string())
            .or_default()
            .insert(name.to_string());
    }
    grouped
}

fn append_allowed(name: &str, allowed: &[String]) -> bool {
    allowed.iter().any(|entry| {
        entry == name
            || entry == "*"
            || entry
                .strip_suffix(".*")
                .is_some_and(|prefix| name.strip_prefix(prefix).is_some_and(|rest| rest.starts_with('.')))
    })
}

impl<S: Subject> BaseQueryWizard<S> {
    pub fn new(
        subject: S,
        parameters: QueryParameters,
        config: Arc<WizardConfig>,
        driver: Arc<dyn Driver>,
        models: Arc<ModelRegistry>,
        mode: ContextMode,
    ) -> Self {
        Self {
            subject,
            parameters,
            config,
            driver,
            models,
            schema: None,
            mode,
            explicit: ExplicitRules::default(),
            rules: OnceCell::new(),
            state: AppliedState::default(),
        }
    }

    pub fn with_schema(mut self, schema: Arc<dyn ResourceSchema>) -> Self {
        self.set_schema(schema);
        self
    }

    pub fn set_schema(&mut self, schema: Arc<dyn ResourceSchema>) -> &mut Self {
        self.schema = Some(schema);
        self.invalidate();
        self
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn subject(&self) -> &S {
        &self.subject
    }

    pub fn subject_mut(&mut self) -> &mut S {
        &mut self.subject
    }

    pub fn into_subject(self) -> S {
        self.subject
    }

    pub fn parameters(&self) -> &QueryParameters {
        &self.parameters
    }

    pub fn config(&self) -> &WizardConfig {
        &self.config
    }

    pub fn driver(&self) -> &dyn Driver {
        self.driver.as_ref()
    }

    pub fn mode(&self) -> ContextMode {
        self.mode
    }

    /// Relation column plan computed by the include phase, if any.
    pub fn select_plan(&self) -> Option<&SelectPlan> {
        self.state.plan.as_ref()
    }

    /// Validated values of passthrough filters, by filter name.
    pub fn passthrough_filters(&self) -> &Map<String, Value> {
        &self.state.passthrough
    }

    // -----------------------------------------------------------------------
    // Explicit rules
    // -----------------------------------------------------------------------

    fn invalidate(&mut self) {
        self.rules = OnceCell::new();
        self.state.fields_resolved = None;
        self.state.appends_resolved = None;
    }

    pub fn allowed_filters<I, R>(&mut self, filters: I) -> &mut Self
    where
        I: IntoIterator<Item = R>,
        R: Into<Rule<FilterDefinition>>,
    {
        self.explicit.filters = Some(rules(filters));
        self.invalidate();
        self
    }

    pub fn allowed_sorts<I, R>(&mut self, sorts: I) -> &mut Self
    where
        I: IntoIterator<Item = R>,
        R: Into<Rule<SortDefinition>>,
    {
        self.explicit.sorts = Some(rules(sorts));
        self.invalidate();
        self
    }

    pub fn allowed_includes<I, R>(&mut self, includes: I) -> &mut Self
    where
        I: IntoIterator<Item = R>,
        R: Into<Rule<IncludeDefinition>>,
    {
        self.explicit.includes = Some(rules(includes));
        self.invalidate();
        self
    }

    pub fn allowed_fields<I, T>(&mut self, fields: I) -> &mut Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.explicit.fields = Some(fields.into_iter().map(Into::into).collect());
        self.invalidate();
        self
    }

    pub fn allowed_appends<I, T>(&mut self, appends: I) -> &mut Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.explicit.appends = Some(appends.into_iter().map(Into::into).collect());
        self.invalidate();
        self
    }

    /// Sorts applied when the request has none; `-` prefix for descending.
    pub fn default_sorts<I, T>(&mut self, sorts: I) -> &mut Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.explicit.default_sorts = Some(sorts.into_iter().map(Into::into).collect());
        self.invalidate();
        self
    }

    pub fn default_includes<I, T>(&mut self, includes: I) -> &mut Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.explicit.default_includes = Some(includes.into_iter().map(Into::into).collect());
        self.invalidate();
        self
    }

    pub fn default_fields<I, T>(&mut self, fields: I) -> &mut Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.explicit.default_fields = Some(fields.into_iter().map(Into::into).collect());
        self.invalidate();
        self
    }

    pub fn default_appends<I, T>(&mut self, appends: I) -> &mut Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.explicit.default_appends = Some(appends.into_iter().map(Into::into).collect());
        self.invalidate();
        self
    }

    // -----------------------------------------------------------------------
    // Effective rules
    // -----------------------------------------------------------------------

    fn rules(&self) -> WizardResult<Arc<EffectiveRules>> {
        if let Some(rules) = self.rules.get() {
            return Ok(Arc::clone(rules));
        }
        let rules = Arc::new(EffectiveRules::resolve(
            &self.explicit,
            self.schema.as_deref(),
            self.mode,
            self.driver.as_ref(),
            &self.config.suffixes,
        )?);
        Ok(Arc::clone(self.rules.get_or_init(|| rules)))
    }

    pub fn effective_filters(&self) -> WizardResult<Vec<FilterDefinition>> {
        Ok(self.rules()?.filters.clone())
    }

    pub fn effective_sorts(&self) -> WizardResult<Vec<SortDefinition>> {
        Ok(self.rules()?.sorts.clone())
    }

    pub fn effective_includes(&self) -> WizardResult<Vec<IncludeDefinition>> {
        Ok(self.rules()?.includes.clone())
    }

    pub fn effective_fields(&self) -> WizardResult<Vec<String>> {
        Ok(self.rules()?.fields.clone())
    }

    pub fn effective_appends(&self) -> WizardResult<Vec<String>> {
        Ok(self.rules()?.appends.clone())
    }

    /// Resource key of the root entry in `fields[...]`: the schema's type
    /// name, else the model's resource key.
    pub fn root_fields_key(&self) -> WizardResult<String> {
        if let Some(key) = self.schema.as_ref().and_then(|schema| schema.type_name()) {
            return Ok(key.to_string());
        }
        let model = self.subject.model_name();
        self.models
            .get(model)
            .map(|descriptor| descriptor.fields_key().to_string())
            .ok_or_else(|| WizardError::RootFieldsKeyMissing {
                model: model.to_string(),
            })
    }

    fn skip_unsupported(&self, capability: Capability) -> bool {
        if self.driver.supports(capability) {
            return false;
        }
        tracing::debug!(
            driver = self.driver.name(),
            capability = capability.as_str(),
            "driver does not support capability, skipping"
        );
        true
    }

    // -----------------------------------------------------------------------
    // Filters
    // -----------------------------------------------------------------------

    pub fn apply_filters(&mut self) -> WizardResult<()> {
        if self.state.filters {
            return Ok(());
        }
        if self.skip_unsupported(Capability::Filters) {
            self.state.filters = true;
            return Ok(());
        }

        let rules = self.rules()?;
        if let Some(filter) = rules.filters.iter().find(|f| !self.driver.supports_filter_type(f)) {
            return Err(unsupported(self.driver.as_ref(), "filter", filter.type_name()));
        }

        let allowed: IndexSet<&str> = rules.filters.iter().map(FilterDefinition::name).collect();
        let valid_prefixes: IndexSet<&str> = allowed.iter().copied().flat_map(prefixes).collect();

        let limits = self.config.limits;
        let mut requested = IndexSet::new();
        collect_filter_names(
            self.parameters.filters(),
            "",
            &allowed,
            limits.max_filter_depth,
            &mut requested,
        )?;
        check_limit(QueryLimit::FiltersCount, requested.len(), limits.max_filters_count)?;

        let unknown: Vec<String> = requested
            .iter()
            .filter(|name| !allowed.contains(name.as_str()) && !valid_prefixes.contains(name.as_str()))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            if !self.config.exceptions.disable_invalid_filter_query {
                return Err(WizardError::InvalidFilterQuery {
                    unknown,
                    allowed: rules.filter_names(),
                });
            }
            tracing::warn!(filters = ?unknown, "ignoring filters that are not allowed");
        }

        let models = Arc::clone(&self.models);
        let ctx = StrategyContext::new(&models);

        // every value is resolved and checked before the subject changes
        let mut pending = Vec::new();
        for filter in &rules.filters {
            let raw = self
                .parameters
                .filter_value(filter.name())
                .or(filter.default_value())
                .cloned();
            let Some(raw) = raw.filter(|value| !value.is_null()) else {
                continue;
            };
            let Some(value) = filter.prepare_value(raw) else {
                tracing::debug!(filter = filter.name(), "filter suppressed by value preparation");
                continue;
            };
            self.driver
                .check_filter(&ctx, self.subject.model_name(), filter, &value)?;
            pending.push((filter, value));
        }

        for (filter, value) in pending {
            if matches!(filter.kind(), FilterKind::Passthrough) {
                self.state
                    .passthrough
                    .insert(filter.name().to_string(), value.clone());
            }
            self.driver.apply_filter(&ctx, &mut self.subject, filter, &value)?;
        }

        self.state.filters = true;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Sorts
    // -----------------------------------------------------------------------

    pub fn apply_sorts(&mut self) -> WizardResult<()> {
        if self.state.sorts {
            return Ok(());
        }
        if self.skip_unsupported(Capability::Sorts) {
            self.state.sorts = true;
            return Ok(());
        }

        let rules = self.rules()?;
        if let Some(sort) = rules.sorts.iter().find(|s| !self.driver.supports_sort_type(s)) {
            return Err(unsupported(self.driver.as_ref(), "sort", sort.type_name()));
        }

        let requested: Vec<Sort> = self.parameters.sorts().to_vec();
        check_limit(QueryLimit::SortsCount, requested.len(), self.config.limits.max_sorts_count)?;

        let allowed: IndexMap<&str, &SortDefinition> =
            rules.sorts.iter().map(|sort| (sort.name(), sort)).collect();

        let mut selected: Vec<(SortDefinition, SortDirection)> = Vec::new();
        if requested.is_empty() {
            for token in &rules.default_sorts {
                let sort = Sort::parse(token);
                let definition = match allowed.get(sort.field.as_str()) {
                    Some(definition) => (*definition).clone(),
                    None => self.driver.normalize_sort(Rule::Name(sort.field.clone()))?,
                };
                selected.push((definition, sort.direction));
            }
        } else {
            let unknown: Vec<String> = requested
                .iter()
                .filter(|sort| !allowed.contains_key(sort.field.as_str()))
                .map(|sort| sort.field.clone())
                .collect();
            if !unknown.is_empty() {
                if !self.config.exceptions.disable_invalid_sort_query {
                    return Err(WizardError::InvalidSortQuery {
                        unknown,
                        allowed: rules.sort_names(),
                    });
                }
                tracing::warn!(sorts = ?unknown, "ignoring sorts that are not allowed");
            }
            for sort in &requested {
                if let Some(definition) = allowed.get(sort.field.as_str()) {
                    selected.push(((*definition).clone(), sort.direction));
                }
            }
        }

        let models = Arc::clone(&self.models);
        let ctx = StrategyContext::new(&models);
        let mut seen = HashSet::new();
        for (sort, direction) in &selected {
            if !seen.insert(sort.name().to_string()) {
                continue;
            }
            match sort.kind() {
                SortKind::Count { relation } => {
                    self.state.computed_attributes.insert(count_attribute(relation));
                }
                SortKind::Aggregate {
                    relation,
                    column,
                    function,
                } => {
                    self.state
                        .computed_attributes
                        .insert(aggregate_attribute(relation, column, *function));
                }
                _ => {}
            }
            self.driver.apply_sort(&ctx, &mut self.subject, sort, *direction)?;
        }

        self.state.sorts = true;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Includes
    // -----------------------------------------------------------------------

    /// Allowed includes by name, plus the first segment of every
    /// relationship include and its count and exists aggregates.
    fn include_index(&self, rules: &EffectiveRules) -> WizardResult<IndexMap<String, IncludeDefinition>> {
        let suffixes = &self.config.suffixes;
        let mut index: IndexMap<String, IncludeDefinition> = IndexMap::new();
        for include in &rules.includes {
            index
                .entry(include.name().to_string())
                .or_insert_with(|| include.clone());
        }

        for include in rules.includes.iter().filter(|include| include.is_relationship()) {
            let first = match include.relation().split_once('.') {
                Some((first, _)) => first,
                None => include.relation(),
            };
            let derived = [
                first.to_string(),
                format!("{first}{}", suffixes.count),
                format!("{first}{}", suffixes.exists),
            ];
            for name in derived {
                if index.contains_key(&name) || is_disallowed(&name, &rules.disallowed_includes, suffixes) {
                    continue;
                }
                let definition = self.driver.normalize_include(Rule::Name(name.clone()), suffixes)?;
                index.insert(name, definition);
            }
        }
        Ok(index)
    }

    pub fn apply_includes(&mut self) -> WizardResult<()> {
        if self.state.includes {
            return Ok(());
        }
        if self.skip_unsupported(Capability::Includes) {
            self.state.includes = true;
            return Ok(());
        }

        let rules = self.rules()?;
        let index = self.include_index(&rules)?;
        if let Some(include) = index.values().find(|i| !self.driver.supports_include_type(i)) {
            return Err(unsupported(self.driver.as_ref(), "include", include.type_name()));
        }

        let requested = self.parameters.includes().clone();
        let limits = self.config.limits;
        check_limit(QueryLimit::IncludesCount, requested.len(), limits.max_includes_count)?;
        let deepest = requested.iter().map(|name| depth(name)).max().unwrap_or(0);
        check_limit(QueryLimit::IncludeDepth, deepest, limits.max_include_depth)?;

        let mut merged: IndexSet<String> = rules.default_includes.iter().cloned().collect();
        merged.extend(requested);

        let unknown: Vec<String> = merged
            .iter()
            .filter(|name| !index.contains_key(name.as_str()))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            if !self.config.exceptions.disable_invalid_include_query {
                return Err(WizardError::InvalidIncludeQuery {
                    unknown,
                    allowed: index.keys().cloned().collect(),
                });
            }
            tracing::warn!(includes = ?unknown, "ignoring includes that are not allowed");
        }

        let selected: Vec<IncludeDefinition> = merged
            .iter()
            .filter_map(|name| index.get(name).cloned())
            .collect();

        let fields = self.resolved_fields()?;
        let paths: IndexSet<String> = selected
            .iter()
            .filter(|include| include.is_relationship())
            .flat_map(|include| cumulative_paths(include.relation()))
            .map(str::to_string)
            .collect();

        let models = Arc::clone(&self.models);
        let relation_columns: IndexMap<String, Vec<String>> = if fields.is_empty() {
            IndexMap::new()
        } else {
            match self.config.relation_select {
                RelationSelectMode::Safe => {
                    let mut appends = self.parameters.appends().clone();
                    appends.extend(rules.default_appends.iter().cloned());
                    let plan = SafeRelationSelect::new(&models).plan(
                        self.subject.model_name(),
                        &paths,
                        &fields,
                        &appends,
                    );
                    let columns = plan.columns.clone();
                    self.state.plan = Some(plan);
                    columns
                }
                RelationSelectMode::Off => paths
                    .iter()
                    .filter_map(|path| {
                        fields
                            .get(path)
                            .filter(|names| !names.contains("*"))
                            .map(|names| (path.clone(), names.iter().cloned().collect()))
                    })
                    .collect(),
            }
        };

        let ctx = StrategyContext::new(&models).with_relation_columns(&relation_columns);
        for include in &selected {
            let include_fields: Option<Vec<String>> = fields
                .get(include.relation())
                .filter(|names| !names.contains("*"))
                .map(|names| names.iter().cloned().collect());
            match include.kind() {
                IncludeKind::Count => {
                    self.state
                        .computed_attributes
                        .insert(count_attribute(include.relation()));
                }
                IncludeKind::Exists => {
                    self.state
                        .computed_attributes
                        .insert(exists_attribute(include.relation()));
                }
                _ => {}
            }
            self.driver
                .apply_include(&ctx, &mut self.subject, include, include_fields.as_deref())?;
        }

        self.state.includes = true;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Fields
    // -----------------------------------------------------------------------

    /// Validated sparse fields keyed by resource, the root under
    /// [`root_fields_key`](Self::root_fields_key). Computed once.
    fn resolved_fields(&mut self) -> WizardResult<FieldMap> {
        if let Some(fields) = &self.state.fields_resolved {
            return Ok(fields.clone());
        }
        let fields = if self.driver.supports(Capability::Fields) {
            self.validate_fields()?
        } else {
            FieldMap::new()
        };
        self.state.fields_resolved = Some(fields.clone());
        Ok(fields)
    }

    fn validate_fields(&self) -> WizardResult<FieldMap> {
        let rules = self.rules()?;
        if !self.parameters.has_fields() && rules.default_fields.is_empty() {
            return Ok(FieldMap::new());
        }
        let root_key = self.root_fields_key()?;

        let requested = self.parameters.fields_under(&root_key);
        if requested.is_empty() {
            return Ok(group_fields(&rules.default_fields, &root_key));
        }

        let allowed = group_fields(&rules.fields, &root_key);
        if allowed.is_empty() {
            tracing::debug!(fields = ?requested, "no allowed fields configured, ignoring requested fields");
            return Ok(FieldMap::new());
        }

        let mut unknown = Vec::new();
        let mut resolved = FieldMap::new();
        for (resource, names) in requested {
            let permitted = allowed.get(&resource);
            let accepts_all = names.contains("*") || permitted.is_some_and(|p| p.contains("*"));
            let mut kept = IndexSet::new();
            for name in names {
                if accepts_all || permitted.is_some_and(|p| p.contains(&name)) {
                    kept.insert(name);
                } else if resource == root_key {
                    unknown.push(name);
                } else {
                    unknown.push(format!("{resource}.{name}"));
                }
            }
            if !kept.is_empty() {
                resolved.insert(resource, kept);
            }
        }

        if !unknown.is_empty() {
            if !self.config.exceptions.disable_invalid_field_query {
                return Err(WizardError::InvalidFieldQuery {
                    unknown,
                    allowed: rules.fields.clone(),
                });
            }
            tracing::warn!(fields = ?unknown, "ignoring fields that are not allowed");
        }
        Ok(resolved)
    }

    pub fn apply_fields(&mut self) -> WizardResult<()> {
        if self.state.fields {
            return Ok(());
        }
        if self.skip_unsupported(Capability::Fields) {
            self.state.fields = true;
            return Ok(());
        }

        let fields = self.resolved_fields()?;
        if fields.is_empty() {
            self.state.fields = true;
            return Ok(());
        }
        let root_key = self.root_fields_key()?;
        if let Some(root) = fields.get(&root_key)
            && !root.is_empty()
            && !root.contains("*")
        {
            let mut columns = root.clone();
            if let Some(plan) = &self.state.plan {
                columns.extend(plan.root_columns.iter().cloned());
            }
            let columns: Vec<String> = columns.into_iter().collect();
            self.driver.apply_fields(&mut self.subject, &columns)?;
        }

        self.state.fields = true;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Appends
    // -----------------------------------------------------------------------

    pub fn apply_appends(&mut self) -> WizardResult<()> {
        if self.state.appends {
            return Ok(());
        }
        if self.skip_unsupported(Capability::Appends) {
            self.state.appends = true;
            return Ok(());
        }

        let rules = self.rules()?;
        let requested = self.parameters.appends().clone();
        let limits = self.config.limits;
        check_limit(QueryLimit::AppendsCount, requested.len(), limits.max_appends_count)?;
        let deepest = requested.iter().map(|name| depth(name)).max().unwrap_or(0);
        check_limit(QueryLimit::AppendDepth, deepest, limits.max_append_depth)?;

        let (valid, unknown): (Vec<String>, Vec<String>) = requested
            .into_iter()
            .partition(|name| append_allowed(name, &rules.appends));
        if !unknown.is_empty() {
            if !self.config.exceptions.disable_invalid_append_query {
                return Err(WizardError::InvalidAppendQuery {
                    unknown,
                    allowed: rules.appends.clone(),
                });
            }
            tracing::warn!(appends = ?unknown, "ignoring appends that are not allowed");
        }

        let mut resolved: IndexSet<String> = rules.default_appends.iter().cloned().collect();
        resolved.extend(valid);
        self.state.appends_resolved = Some(resolved);

        self.state.appends = true;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Build and post-process
    // -----------------------------------------------------------------------

    /// Run every phase in order: filters, sorts, includes, fields, appends.
    pub fn build(&mut self) -> WizardResult<&mut S> {
        self.apply_filters()?;
        self.apply_sorts()?;
        self.apply_includes()?;
        self.apply_fields()?;
        self.apply_appends()?;
        Ok(&mut self.subject)
    }

    /// Hide unrequested attributes and attach appends on fetched records.
    pub fn process(&mut self, records: &[RecordHandle]) -> WizardResult<()> {
        let fields = self.resolved_fields()?;
        let mut field_tree = if fields.is_empty() {
            AttributeTree::default()
        } else {
            AttributeTree::from_fields(&fields, &self.root_fields_key()?)
        };
        if field_tree.restricts() {
            field_tree.add_leaves("", &self.state.computed_attributes);
        }
        let append_tree = AttributeTree::from_paths(self.state.appends_resolved.iter().flatten());

        RelationPostProcessor::new(field_tree, append_tree).process(records);
        Ok(())
    }
}
