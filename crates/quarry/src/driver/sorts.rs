//! Built-in sort strategies.

use super::strategy::{SortStrategy, StrategyContext};
use crate::definitions::{SortDefinition, SortKind, aggregate_attribute, count_attribute};
use crate::error::{WizardError, WizardResult};
use crate::subject::{SortDirection, Subject};

fn mismatch(strategy: &str, sort: &SortDefinition) -> WizardError {
    WizardError::StrategyMismatch {
        category: "sort",
        strategy: strategy.to_string(),
        name: sort.name().to_string(),
    }
}

/// ORDER BY a qualified column.
pub struct FieldSort;

impl SortStrategy for FieldSort {
    fn apply(
        &self,
        _ctx: &StrategyContext<'_>,
        subject: &mut dyn Subject,
        sort: &SortDefinition,
        direction: SortDirection,
    ) -> WizardResult<()> {
        if !matches!(sort.kind(), SortKind::Field) {
            return Err(mismatch("field", sort));
        }
        let column = subject.qualify_column(sort.property());
        subject.order_by(&column, direction);
        Ok(())
    }
}

pub struct CallbackSort;

impl SortStrategy for CallbackSort {
    fn apply(
        &self,
        _ctx: &StrategyContext<'_>,
        subject: &mut dyn Subject,
        sort: &SortDefinition,
        direction: SortDirection,
    ) -> WizardResult<()> {
        let SortKind::Callback(callback) = sort.kind() else {
            return Err(mismatch("callback", sort));
        };
        callback(subject, direction, sort.property())
    }
}

/// Adds `{relation}_count` and orders by it.
pub struct CountSort;

impl SortStrategy for CountSort {
    fn apply(
        &self,
        ctx: &StrategyContext<'_>,
        subject: &mut dyn Subject,
        sort: &SortDefinition,
        direction: SortDirection,
    ) -> WizardResult<()> {
        let SortKind::Count { relation } = sort.kind() else {
            return Err(mismatch("count", sort));
        };
        ctx.models.relation(subject.model_name(), relation)?;

        let alias = count_attribute(relation);
        subject.with_count(relation, &alias);
        subject.order_by(&alias, direction);
        Ok(())
    }
}

/// Adds `{relation}_{function}_{column}` and orders by it.
pub struct AggregateSort;

impl SortStrategy for AggregateSort {
    fn apply(
        &self,
        ctx: &StrategyContext<'_>,
        subject: &mut dyn Subject,
        sort: &SortDefinition,
        direction: SortDirection,
    ) -> WizardResult<()> {
        let SortKind::Aggregate {
            relation,
            column,
            function,
        } = sort.kind()
        else {
            return Err(mismatch("aggregate", sort));
        };
        ctx.models.relation(subject.model_name(), relation)?;

        let alias = aggregate_attribute(relation, column, *function);
        subject.with_aggregate(relation, column, *function, &alias);
        subject.order_by(&alias, direction);
        Ok(())
    }
}
