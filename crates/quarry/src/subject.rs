//! The query object the wizard configures.
//!
//! A [`Subject`] is the ORM's query builder (or relation, or single-model
//! query) seen through the handful of operations the wizard needs. Strategies
//! only ever talk to `&mut dyn Subject`, so any backend that implements this
//! trait can be driven: the bundled [`SqlSubject`](crate::sql::SqlSubject)
//! renders SeaQuery statements, tests use a recording implementation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::WizardResult;
use crate::model::RecordHandle;

/// Sort direction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

/// Comparison operator for scalar constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Gte,
    Lte,
}

impl Comparison {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Gte => ">=",
            Comparison::Lte => "<=",
        }
    }
}

/// Soft-delete visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrashedMode {
    /// Exclude soft-deleted rows (the model's default).
    #[default]
    Without,
    /// Include soft-deleted rows.
    With,
    /// Only soft-deleted rows.
    Only,
}

/// Aggregate function for relation aggregates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Aggregate {
    Sum,
    Avg,
    Min,
    Max,
}

impl Aggregate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregate::Sum => "sum",
            Aggregate::Avg => "avg",
            Aggregate::Min => "min",
            Aggregate::Max => "max",
        }
    }
}

/// Constraint applied to a related query inside `where_has`.
pub type RelationConstraint<'a> = &'a mut dyn FnMut(&mut dyn Subject) -> WizardResult<()>;

/// Operations the wizard performs on a query object.
///
/// Column arguments are unqualified attribute names unless they contain a
/// dot, in which case they are already qualified. `->` separates a JSON
/// column from its path (`meta->color`).
pub trait Subject {
    /// Name of the model the subject queries (key into the model registry).
    fn model_name(&self) -> &str;

    /// Qualify a column with the subject's table.
    fn qualify_column(&self, column: &str) -> String;

    /// `column <op> value`.
    fn where_compare(&mut self, column: &str, op: Comparison, value: Value);

    /// `column IN (values)`.
    fn where_in(&mut self, column: &str, values: Vec<Value>);

    /// `column IS NULL`, or `IS NOT NULL` when `negate` is set.
    fn where_null(&mut self, column: &str, negate: bool);

    /// Case-insensitive substring match, OR-ed across `needles`.
    fn where_contains(&mut self, column: &str, needles: &[String]);

    /// JSON containment on `column` for each value; AND-ed when `match_all`,
    /// otherwise OR-ed.
    fn where_json_contains(&mut self, column: &str, path: &[String], values: &[Value], match_all: bool);

    /// Constrain to rows whose `relation` has at least one related row
    /// matching `constraint`.
    fn where_has(&mut self, relation: &str, constraint: RelationConstraint<'_>) -> WizardResult<()>;

    /// Soft-delete visibility.
    fn with_trashed(&mut self, mode: TrashedMode);

    /// Restrict the selected columns.
    fn select(&mut self, columns: &[String]);

    /// Register an eager load for a single relation path. `columns` of `None`
    /// keeps whatever column list was already registered for the path.
    fn with_relation(&mut self, path: &str, columns: Option<Vec<String>>);

    /// Add a related-row count attribute named `alias`.
    fn with_count(&mut self, relation: &str, alias: &str);

    /// Add a related-row existence flag named `alias`.
    fn with_exists(&mut self, relation: &str, alias: &str);

    /// Add an aggregate over a related column named `alias`.
    fn with_aggregate(&mut self, relation: &str, column: &str, function: Aggregate, alias: &str);

    /// Order by a column or a previously added aggregate alias.
    fn order_by(&mut self, column: &str, direction: SortDirection);
}

/// A subject that can execute itself and hand back records.
pub trait Executable: Subject {
    fn fetch(&mut self) -> WizardResult<Vec<RecordHandle>>;
}
