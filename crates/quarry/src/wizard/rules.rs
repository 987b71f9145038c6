//! Effective rule resolution.
//!
//! Rules come from three layers: values set on the wizard instance win over
//! the resource schema, a mode context may replace either, and the
//! context's disallowed names are removed last.

use indexmap::IndexSet;

use crate::config::Suffixes;
use crate::definitions::{FilterDefinition, IncludeDefinition, Rule, SortDefinition};
use crate::driver::Driver;
use crate::error::WizardResult;
use crate::schema::{ContextMode, ResourceSchema, SchemaContext};

/// Rules set directly on a wizard. `None` falls back to the schema.
#[derive(Debug, Clone, Default)]
pub(crate) struct ExplicitRules {
    pub filters: Option<Vec<Rule<FilterDefinition>>>,
    pub sorts: Option<Vec<Rule<SortDefinition>>>,
    pub includes: Option<Vec<Rule<IncludeDefinition>>>,
    pub fields: Option<Vec<String>>,
    pub appends: Option<Vec<String>>,
    pub default_sorts: Option<Vec<String>>,
    pub default_includes: Option<Vec<String>>,
    pub default_fields: Option<Vec<String>>,
    pub default_appends: Option<Vec<String>>,
}

/// The merged, normalized rule set a wizard validates against.
#[derive(Debug, Clone, Default)]
pub struct EffectiveRules {
    pub filters: Vec<FilterDefinition>,
    pub sorts: Vec<SortDefinition>,
    pub includes: Vec<IncludeDefinition>,
    pub fields: Vec<String>,
    pub appends: Vec<String>,
    pub default_sorts: Vec<String>,
    pub default_includes: Vec<String>,
    pub default_fields: Vec<String>,
    pub default_appends: Vec<String>,
    /// Context-disallowed include names, kept to filter derived includes.
    pub disallowed_includes: Vec<String>,
}

/// Whether `name` is removed by any entry of `disallowed`: the name itself,
/// anything nested under it, or its count/exists aggregate.
pub fn is_disallowed(name: &str, disallowed: &[String], suffixes: &Suffixes) -> bool {
    disallowed.iter().any(|blocked| {
        name == blocked
            || name
                .strip_prefix(blocked.as_str())
                .is_some_and(|rest| rest.starts_with('.') || rest == suffixes.count || rest == suffixes.exists)
    })
}

fn pick<T: Clone>(explicit: &Option<Vec<T>>, schema: impl FnOnce() -> Vec<T>, context: Option<&Vec<T>>) -> Vec<T> {
    let base = match explicit {
        Some(items) => items.clone(),
        None => schema(),
    };
    match context {
        Some(items) => items.clone(),
        None => base,
    }
}

fn strings(items: Vec<String>, disallowed: &[String], suffixes: &Suffixes) -> Vec<String> {
    let mut seen = IndexSet::new();
    for item in items {
        if !is_disallowed(&item, disallowed, suffixes) {
            seen.insert(item);
        }
    }
    seen.into_iter().collect()
}

/// Drop disallowed definitions and later duplicates of a name.
fn definitions<D>(items: Vec<D>, name: impl Fn(&D) -> &str, disallowed: &[String], suffixes: &Suffixes) -> Vec<D> {
    let mut names = IndexSet::new();
    items
        .into_iter()
        .filter(|item| {
            let item_name = name(item);
            !is_disallowed(item_name, disallowed, suffixes) && names.insert(item_name.to_string())
        })
        .collect()
}

impl EffectiveRules {
    pub(crate) fn resolve(
        explicit: &ExplicitRules,
        schema: Option<&dyn ResourceSchema>,
        mode: ContextMode,
        driver: &dyn Driver,
        suffixes: &Suffixes,
    ) -> WizardResult<Self> {
        let context = schema.and_then(|schema| schema.context(mode)).unwrap_or_default();
        let SchemaContext {
            allowed_filters,
            allowed_sorts,
            allowed_includes,
            allowed_fields,
            allowed_appends,
            disallowed_filters,
            disallowed_sorts,
            disallowed_includes,
            disallowed_fields,
            disallowed_appends,
            default_sorts,
            default_includes,
            default_fields,
            default_appends,
        } = context;

        let filters = pick(
            &explicit.filters,
            || schema.map(|s| s.filters()).unwrap_or_default(),
            allowed_filters.as_ref(),
        )
        .into_iter()
        .map(|rule| driver.normalize_filter(rule))
        .collect::<WizardResult<Vec<_>>>()?;

        let sorts = pick(
            &explicit.sorts,
            || schema.map(|s| s.sorts()).unwrap_or_default(),
            allowed_sorts.as_ref(),
        )
        .into_iter()
        .map(|rule| driver.normalize_sort(rule))
        .collect::<WizardResult<Vec<_>>>()?;

        let includes = pick(
            &explicit.includes,
            || schema.map(|s| s.includes()).unwrap_or_default(),
            allowed_includes.as_ref(),
        )
        .into_iter()
        .map(|rule| driver.normalize_include(rule, suffixes))
        .collect::<WizardResult<Vec<_>>>()?;

        let fields = pick(
            &explicit.fields,
            || schema.map(|s| s.fields()).unwrap_or_default(),
            allowed_fields.as_ref(),
        );
        let appends = pick(
            &explicit.appends,
            || schema.map(|s| s.appends()).unwrap_or_default(),
            allowed_appends.as_ref(),
        );

        let default_sorts = pick(
            &explicit.default_sorts,
            || schema.map(|s| s.default_sorts()).unwrap_or_default(),
            default_sorts.as_ref(),
        );
        let default_includes = pick(
            &explicit.default_includes,
            || schema.map(|s| s.default_includes()).unwrap_or_default(),
            default_includes.as_ref(),
        );
        let default_fields = pick(
            &explicit.default_fields,
            || schema.map(|s| s.default_fields()).unwrap_or_default(),
            default_fields.as_ref(),
        );
        let default_appends = pick(
            &explicit.default_appends,
            || schema.map(|s| s.default_appends()).unwrap_or_default(),
            default_appends.as_ref(),
        );

        let rules = Self {
            filters: definitions(filters, FilterDefinition::name, &disallowed_filters, suffixes),
            sorts: definitions(sorts, SortDefinition::name, &disallowed_sorts, suffixes),
            includes: definitions(includes, IncludeDefinition::name, &disallowed_includes, suffixes),
            fields: strings(fields, &disallowed_fields, suffixes),
            appends: strings(appends, &disallowed_appends, suffixes),
            default_sorts: default_sorts
                .into_iter()
                .filter(|token| !is_disallowed(token.trim_start_matches('-'), &disallowed_sorts, suffixes))
                .collect(),
            default_includes: strings(default_includes, &disallowed_includes, suffixes),
            default_fields: strings(default_fields, &disallowed_fields, suffixes),
            default_appends: strings(default_appends, &disallowed_appends, suffixes),
            disallowed_includes,
        };

        tracing::trace!(
            mode = mode.as_str(),
            filters = rules.filters.len(),
            sorts = rules.sorts.len(),
            includes = rules.includes.len(),
            fields = rules.fields.len(),
            appends = rules.appends.len(),
            "resolved effective rules"
        );
        Ok(rules)
    }

    pub fn filter_names(&self) -> Vec<String> {
        self.filters.iter().map(|f| f.name().to_string()).collect()
    }

    pub fn sort_names(&self) -> Vec<String> {
        self.sorts.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn include_names(&self) -> Vec<String> {
        self.includes.iter().map(|i| i.name().to_string()).collect()
    }
}
