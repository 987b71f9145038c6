//! Filter, sort and include definitions.
//!
//! A definition describes one allowed operation. Wizards and schemas accept
//! either a full definition or a bare name; the driver turns bare names into
//! its default definition type (see [`Driver::normalize_filter`] and
//! friends).
//!
//! Factories take the target property or relation. The request name
//! defaults to it and is overridden with `alias`:
//!
//! ```
//! use quarry::FilterDefinition;
//!
//! let state = FilterDefinition::exact("state").alias("status");
//! assert_eq!(state.name(), "status");
//! assert_eq!(state.property(), "state");
//! ```
//!
//! [`Driver::normalize_filter`]: crate::driver::Driver::normalize_filter

mod filter;
mod include;
mod sort;

pub use filter::{
    BindingResolver, FilterCallback, FilterDefinition, FilterKind, FilterStrategyFactory,
    ValueTransform, WhenGate,
};
pub use include::{
    IncludeCallback, IncludeDefinition, IncludeKind, IncludeStrategyFactory, count_attribute,
    exists_attribute,
};
pub use sort::{SortCallback, SortDefinition, SortKind, SortStrategyFactory, aggregate_attribute};

/// A bare name or a typed definition.
#[derive(Debug, Clone)]
pub enum Rule<D> {
    Name(String),
    Definition(D),
}

impl<D> From<&str> for Rule<D> {
    fn from(name: &str) -> Self {
        Rule::Name(name.to_string())
    }
}

impl<D> From<String> for Rule<D> {
    fn from(name: String) -> Self {
        Rule::Name(name)
    }
}

impl From<FilterDefinition> for Rule<FilterDefinition> {
    fn from(definition: FilterDefinition) -> Self {
        Rule::Definition(definition)
    }
}

impl From<SortDefinition> for Rule<SortDefinition> {
    fn from(definition: SortDefinition) -> Self {
        Rule::Definition(definition)
    }
}

impl From<IncludeDefinition> for Rule<IncludeDefinition> {
    fn from(definition: IncludeDefinition) -> Self {
        Rule::Definition(definition)
    }
}

/// Collect anything convertible into rules.
pub fn rules<D, I, R>(items: I) -> Vec<Rule<D>>
where
    I: IntoIterator<Item = R>,
    R: Into<Rule<D>>,
{
    items.into_iter().map(Into::into).collect()
}
