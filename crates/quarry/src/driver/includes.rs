//! Built-in include strategies.

use super::strategy::{IncludeStrategy, StrategyContext};
use crate::definitions::{IncludeDefinition, IncludeKind, count_attribute, exists_attribute};
use crate::error::{WizardError, WizardResult};
use crate::subject::Subject;
use crate::support::cumulative_paths;

fn mismatch(strategy: &str, include: &IncludeDefinition) -> WizardError {
    WizardError::StrategyMismatch {
        category: "include",
        strategy: strategy.to_string(),
        name: include.name().to_string(),
    }
}

/// Eager-loads every segment of a relation path.
///
/// Each segment gets the column list registered for it in the strategy
/// context. Segments without one are registered with `None`, which keeps
/// whatever an earlier include already set up for that path.
pub struct RelationshipInclude;

impl IncludeStrategy for RelationshipInclude {
    fn apply(
        &self,
        ctx: &StrategyContext<'_>,
        subject: &mut dyn Subject,
        include: &IncludeDefinition,
        _fields: Option<&[String]>,
    ) -> WizardResult<()> {
        if !include.is_relationship() {
            return Err(mismatch("relationship", include));
        }

        for path in cumulative_paths(include.relation()) {
            let columns = ctx.columns_for(path).map(<[String]>::to_vec);
            subject.with_relation(path, columns);
        }
        Ok(())
    }
}

/// Adds a `{relation}_count` attribute.
pub struct CountInclude;

impl IncludeStrategy for CountInclude {
    fn apply(
        &self,
        _ctx: &StrategyContext<'_>,
        subject: &mut dyn Subject,
        include: &IncludeDefinition,
        _fields: Option<&[String]>,
    ) -> WizardResult<()> {
        if !matches!(include.kind(), IncludeKind::Count) {
            return Err(mismatch("count", include));
        }
        subject.with_count(include.relation(), &count_attribute(include.relation()));
        Ok(())
    }
}

/// Adds a `{relation}_exists` attribute.
pub struct ExistsInclude;

impl IncludeStrategy for ExistsInclude {
    fn apply(
        &self,
        _ctx: &StrategyContext<'_>,
        subject: &mut dyn Subject,
        include: &IncludeDefinition,
        _fields: Option<&[String]>,
    ) -> WizardResult<()> {
        if !matches!(include.kind(), IncludeKind::Exists) {
            return Err(mismatch("exists", include));
        }
        subject.with_exists(include.relation(), &exists_attribute(include.relation()));
        Ok(())
    }
}

pub struct CallbackInclude;

impl IncludeStrategy for CallbackInclude {
    fn apply(
        &self,
        _ctx: &StrategyContext<'_>,
        subject: &mut dyn Subject,
        include: &IncludeDefinition,
        fields: Option<&[String]>,
    ) -> WizardResult<()> {
        let IncludeKind::Callback(callback) = include.kind() else {
            return Err(mismatch("callback", include));
        };
        callback(subject, include.relation(), fields)
    }
}
