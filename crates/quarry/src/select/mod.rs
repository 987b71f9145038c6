//! Safe relation select: sparse fields for eager-loaded relations.

mod planner;
mod resolver;

pub use planner::{SafeRelationSelect, SelectPlan, SkipReason};
pub use resolver::{RelationResolver, ResolvedRelation};
