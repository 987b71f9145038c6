//! Query wizards: merge rules, validate the request, apply it.
//!
//! Phases run in a fixed order (filters, sorts, includes, fields, appends).
//! The include phase runs before fields so the relation select plan can add
//! the root keys that eager loads need to the root column list.

mod base;
mod factory;
mod item;
mod list;
mod rules;

pub use base::BaseQueryWizard;
pub use factory::QueryWizards;
pub use item::ItemQueryWizard;
pub use list::ListQueryWizard;
pub use rules::{EffectiveRules, is_disallowed};
