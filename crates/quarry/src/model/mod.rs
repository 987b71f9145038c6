//! Model metadata and loaded records.

mod record;
mod registry;

pub use record::{Loaded, Record, RecordHandle};
pub use registry::{
    AccessorFn, ModelDescriptor, ModelRegistry, Pivot, RelationDescriptor, RelationKind, ScopeFn,
    Through,
};
