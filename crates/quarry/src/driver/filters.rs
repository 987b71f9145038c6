//! Built-in filter strategies.

use std::fmt::Write;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;

use super::strategy::{FilterStrategy, StrategyContext};
use crate::definitions::{FilterDefinition, FilterKind};
use crate::error::{WizardError, WizardResult};
use crate::subject::{Comparison, Subject, TrashedMode};
use crate::support::{camel, is_blank, lenient_bool, split_last, value_to_string, wrap_array};

fn mismatch(strategy: &str, filter: &FilterDefinition) -> WizardError {
    WizardError::StrategyMismatch {
        category: "filter",
        strategy: strategy.to_string(),
        name: filter.name().to_string(),
    }
}

fn invalid_value(filter: &FilterDefinition, value: &Value) -> WizardError {
    WizardError::InvalidFilterValue {
        filter: filter.name().to_string(),
        value: value_to_string(value),
    }
}

/// `meta.color` → `meta->color`.
fn json_column(property: &str) -> String {
    property.replace('.', "->")
}

/// Qualified column for a property that is not routed through relations.
fn column_for(subject: &dyn Subject, property: &str) -> String {
    subject.qualify_column(&json_column(property))
}

/// Route a dotted property through `where_has` while its leading segments
/// name relations, then hand the remaining column to `apply`.
///
/// `author.posts.title` on a model whose `author` relation leads to a model
/// with a `posts` relation nests two `where_has` calls and applies to
/// `title`. A leading segment that is not a relation turns the rest of the
/// path into a JSON column.
pub(crate) fn constrain_path(
    ctx: &StrategyContext<'_>,
    subject: &mut dyn Subject,
    property: &str,
    apply: &mut dyn FnMut(&mut dyn Subject, &str) -> WizardResult<()>,
) -> WizardResult<()> {
    if let Some((first, rest)) = property.split_once('.') {
        let is_relation = ctx
            .models
            .get(subject.model_name())
            .is_some_and(|model| model.get_relation(first).is_some());
        if is_relation {
            return subject.where_has(first, &mut |related| {
                constrain_path(ctx, related, rest, &mut *apply)
            });
        }
    }

    let column = column_for(subject, property);
    apply(subject, &column)
}

/// Equality, or `IN` for arrays.
pub struct ExactFilter;

impl FilterStrategy for ExactFilter {
    fn check(
        &self,
        _ctx: &StrategyContext<'_>,
        _model: &str,
        filter: &FilterDefinition,
        value: &Value,
    ) -> WizardResult<()> {
        if value.is_object() {
            return Err(invalid_value(filter, value));
        }
        Ok(())
    }

    fn apply(
        &self,
        ctx: &StrategyContext<'_>,
        subject: &mut dyn Subject,
        filter: &FilterDefinition,
        value: &Value,
    ) -> WizardResult<()> {
        let FilterKind::Exact { relation_constraint } = filter.kind() else {
            return Err(mismatch("exact", filter));
        };
        if value.is_object() {
            return Err(invalid_value(filter, value));
        }

        let mut apply = |subject: &mut dyn Subject, column: &str| -> WizardResult<()> {
            match value {
                Value::Array(items) => subject.where_in(column, items.clone()),
                scalar => subject.where_compare(column, Comparison::Eq, scalar.clone()),
            }
            Ok(())
        };

        if *relation_constraint {
            constrain_path(ctx, subject, filter.property(), &mut apply)
        } else {
            let column = column_for(subject, filter.property());
            apply(subject, &column)
        }
    }
}

/// Case-insensitive substring match; arrays OR their terms.
pub struct PartialFilter;

impl FilterStrategy for PartialFilter {
    fn apply(
        &self,
        ctx: &StrategyContext<'_>,
        subject: &mut dyn Subject,
        filter: &FilterDefinition,
        value: &Value,
    ) -> WizardResult<()> {
        let FilterKind::Partial { relation_constraint } = filter.kind() else {
            return Err(mismatch("partial", filter));
        };

        let needles: Vec<String> = wrap_array(value)
            .iter()
            .filter(|v| !is_blank(v))
            .map(value_to_string)
            .collect();
        if needles.is_empty() {
            tracing::debug!(filter = filter.name(), "partial filter without terms skipped");
            return Ok(());
        }

        let mut apply = |subject: &mut dyn Subject, column: &str| -> WizardResult<()> {
            subject.where_contains(column, &needles);
            Ok(())
        };

        if *relation_constraint {
            constrain_path(ctx, subject, filter.property(), &mut apply)
        } else {
            let column = column_for(subject, filter.property());
            apply(subject, &column)
        }
    }
}

/// Read `(min, max)` from `{min_key: .., max_key: ..}` or `[min, max]`.
/// Blank bounds come back as `None`.
fn bounds(value: &Value, min_key: &str, max_key: &str) -> Option<(Option<Value>, Option<Value>)> {
    let (min, max) = match value {
        Value::Object(map) => (map.get(min_key).cloned(), map.get(max_key).cloned()),
        Value::Array(items) => (items.first().cloned(), items.get(1).cloned()),
        _ => return None,
    };
    let keep = |v: Option<Value>| v.filter(|v| !is_blank(v));
    Some((keep(min), keep(max)))
}

/// Inclusive range; either bound may be omitted.
pub struct RangeFilter;

impl FilterStrategy for RangeFilter {
    fn check(
        &self,
        _ctx: &StrategyContext<'_>,
        _model: &str,
        filter: &FilterDefinition,
        value: &Value,
    ) -> WizardResult<()> {
        let FilterKind::Range { min_key, max_key } = filter.kind() else {
            return Err(mismatch("range", filter));
        };
        bounds(value, min_key, max_key)
            .map(|_| ())
            .ok_or_else(|| invalid_value(filter, value))
    }

    fn apply(
        &self,
        _ctx: &StrategyContext<'_>,
        subject: &mut dyn Subject,
        filter: &FilterDefinition,
        value: &Value,
    ) -> WizardResult<()> {
        let FilterKind::Range { min_key, max_key } = filter.kind() else {
            return Err(mismatch("range", filter));
        };
        let (min, max) = bounds(value, min_key, max_key).ok_or_else(|| invalid_value(filter, value))?;

        let column = column_for(subject, filter.property());
        if let Some(min) = min {
            subject.where_compare(&column, Comparison::Gte, min);
        }
        if let Some(max) = max {
            subject.where_compare(&column, Comparison::Lte, max);
        }
        Ok(())
    }
}

fn parse_date(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    for pattern in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, pattern) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Date range; with a format, bounds are parsed and reformatted first.
pub struct DateRangeFilter;

impl DateRangeFilter {
    fn format_bound(
        filter: &FilterDefinition,
        bound: Value,
        format: Option<&str>,
    ) -> WizardResult<Value> {
        let Some(format) = format else {
            return Ok(bound);
        };
        let raw = value_to_string(&bound);
        let parsed = parse_date(raw.trim()).ok_or_else(|| invalid_value(filter, &bound))?;
        let mut formatted = String::new();
        write!(formatted, "{}", parsed.format(format)).map_err(|_| invalid_value(filter, &bound))?;
        Ok(Value::String(formatted))
    }

    /// Both bounds, formatted when the definition carries a format.
    fn formatted_bounds(
        filter: &FilterDefinition,
        value: &Value,
    ) -> WizardResult<(Option<Value>, Option<Value>)> {
        let FilterKind::DateRange {
            min_key,
            max_key,
            format,
        } = filter.kind()
        else {
            return Err(mismatch("dateRange", filter));
        };
        let (min, max) = bounds(value, min_key, max_key).ok_or_else(|| invalid_value(filter, value))?;
        let min = min
            .map(|v| Self::format_bound(filter, v, format.as_deref()))
            .transpose()?;
        let max = max
            .map(|v| Self::format_bound(filter, v, format.as_deref()))
            .transpose()?;
        Ok((min, max))
    }
}

impl FilterStrategy for DateRangeFilter {
    fn check(
        &self,
        _ctx: &StrategyContext<'_>,
        _model: &str,
        filter: &FilterDefinition,
        value: &Value,
    ) -> WizardResult<()> {
        Self::formatted_bounds(filter, value).map(|_| ())
    }

    fn apply(
        &self,
        _ctx: &StrategyContext<'_>,
        subject: &mut dyn Subject,
        filter: &FilterDefinition,
        value: &Value,
    ) -> WizardResult<()> {
        let (min, max) = Self::formatted_bounds(filter, value)?;

        let column = column_for(subject, filter.property());
        if let Some(min) = min {
            subject.where_compare(&column, Comparison::Gte, min);
        }
        if let Some(max) = max {
            subject.where_compare(&column, Comparison::Lte, max);
        }
        Ok(())
    }
}

/// Truthy → IS NULL, falsy → IS NOT NULL (swapped when inverted).
pub struct NullFilter;

impl FilterStrategy for NullFilter {
    fn apply(
        &self,
        _ctx: &StrategyContext<'_>,
        subject: &mut dyn Subject,
        filter: &FilterDefinition,
        value: &Value,
    ) -> WizardResult<()> {
        let FilterKind::Null { invert } = filter.kind() else {
            return Err(mismatch("null", filter));
        };
        let wants_null = lenient_bool(value) != *invert;
        let column = column_for(subject, filter.property());
        subject.where_null(&column, !wants_null);
        Ok(())
    }
}

/// JSON containment on `column.path.to.key`.
pub struct JsonContainsFilter;

impl FilterStrategy for JsonContainsFilter {
    fn apply(
        &self,
        _ctx: &StrategyContext<'_>,
        subject: &mut dyn Subject,
        filter: &FilterDefinition,
        value: &Value,
    ) -> WizardResult<()> {
        let FilterKind::JsonContains { match_all } = filter.kind() else {
            return Err(mismatch("jsonContains", filter));
        };

        let mut segments = filter.property().split('.');
        let column = segments.next().unwrap_or_default();
        let path: Vec<String> = segments.map(str::to_string).collect();
        let values = wrap_array(value);
        if values.is_empty() {
            return Ok(());
        }

        let column = subject.qualify_column(column);
        subject.where_json_contains(&column, &path, &values, *match_all);
        Ok(())
    }
}

/// `with` / `only` / anything else.
pub struct TrashedFilter;

impl FilterStrategy for TrashedFilter {
    fn apply(
        &self,
        _ctx: &StrategyContext<'_>,
        subject: &mut dyn Subject,
        filter: &FilterDefinition,
        value: &Value,
    ) -> WizardResult<()> {
        if !matches!(filter.kind(), FilterKind::Trashed) {
            return Err(mismatch("trashed", filter));
        }
        let mode = match value.as_str().map(str::trim) {
            Some("with") => TrashedMode::With,
            Some("only") => TrashedMode::Only,
            _ => TrashedMode::Without,
        };
        subject.with_trashed(mode);
        Ok(())
    }
}

/// Calls a model scope named after the last path segment.
pub struct ScopeFilter;

impl ScopeFilter {
    /// Scope arguments with every declared binding resolved.
    fn arguments(filter: &FilterDefinition, value: &Value) -> WizardResult<Vec<Value>> {
        let FilterKind::Scope { bindings } = filter.kind() else {
            return Err(mismatch("scope", filter));
        };

        let mut args = wrap_array(value);
        for (position, resolver) in bindings {
            let Some(raw) = args.get(*position) else {
                continue;
            };
            let resolved = resolver(raw).ok_or_else(|| invalid_value(filter, raw))?;
            args[*position] = resolved;
        }
        Ok(args)
    }
}

impl FilterStrategy for ScopeFilter {
    fn check(
        &self,
        ctx: &StrategyContext<'_>,
        model: &str,
        filter: &FilterDefinition,
        value: &Value,
    ) -> WizardResult<()> {
        Self::arguments(filter, value)?;

        let (relation_path, scope) = split_last(filter.property());
        let scope = camel(scope);
        if let Some(target) = ctx.models.model_at_path(model, relation_path)
            && target.get_scope(&scope).is_none()
        {
            return Err(WizardError::UnknownScope {
                model: target.name().to_string(),
                scope,
            });
        }
        Ok(())
    }

    fn apply(
        &self,
        ctx: &StrategyContext<'_>,
        subject: &mut dyn Subject,
        filter: &FilterDefinition,
        value: &Value,
    ) -> WizardResult<()> {
        let args = Self::arguments(filter, value)?;
        let (relation_path, scope) = split_last(filter.property());
        let scope = camel(scope);
        call_scope(ctx, subject, relation_path, &scope, &args)
    }
}

fn call_scope(
    ctx: &StrategyContext<'_>,
    subject: &mut dyn Subject,
    relation_path: &str,
    scope: &str,
    args: &[Value],
) -> WizardResult<()> {
    if !relation_path.is_empty() {
        let (first, remaining) = relation_path.split_once('.').unwrap_or((relation_path, ""));
        ctx.models.relation(subject.model_name(), first)?;
        return subject.where_has(first, &mut |related| {
            call_scope(ctx, related, remaining, scope, args)
        });
    }

    let model = ctx.models.model(subject.model_name())?;
    let callable = model.get_scope(scope).ok_or_else(|| WizardError::UnknownScope {
        model: model.name().to_string(),
        scope: scope.to_string(),
    })?;
    callable(subject, args)
}

/// Invokes the definition's callback.
pub struct CallbackFilter;

impl FilterStrategy for CallbackFilter {
    fn apply(
        &self,
        _ctx: &StrategyContext<'_>,
        subject: &mut dyn Subject,
        filter: &FilterDefinition,
        value: &Value,
    ) -> WizardResult<()> {
        let FilterKind::Callback(callback) = filter.kind() else {
            return Err(mismatch("callback", filter));
        };
        callback(subject, value, filter.property())
    }
}

/// Validated only; the wizard captures the value.
pub struct PassthroughFilter;

impl FilterStrategy for PassthroughFilter {
    fn apply(
        &self,
        _ctx: &StrategyContext<'_>,
        _subject: &mut dyn Subject,
        filter: &FilterDefinition,
        _value: &Value,
    ) -> WizardResult<()> {
        if !matches!(filter.kind(), FilterKind::Passthrough) {
            return Err(mismatch("passthrough", filter));
        }
        Ok(())
    }
}
