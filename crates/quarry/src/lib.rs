//! Quarry: request parameters to validated query-builder operations.
//!
//! Requests carry `filter[...]`, `sort`, `include`, `fields[...]` and
//! `append` parameters. A wizard merges the allowed rules (set on the
//! wizard, declared by a [`ResourceSchema`], specialized per mode), rejects
//! anything not allowed, applies the rest to a [`Subject`] through a
//! [`Driver`], then trims and decorates the fetched records.
//!
//! [`ResourceSchema`]: schema::ResourceSchema
//! [`Subject`]: subject::Subject
//! [`Driver`]: driver::Driver

pub mod config;
pub mod definitions;
pub mod driver;
pub mod error;
pub mod model;
pub mod parameters;
pub mod postprocess;
pub mod schema;
pub mod select;
pub mod sql;
pub mod subject;
pub mod support;
pub mod wizard;

pub use config::{RelationSelectMode, WizardConfig};
pub use definitions::{FilterDefinition, IncludeDefinition, Rule, SortDefinition};
pub use driver::{Driver, DriverRegistry, RelationalDriver};
pub use error::{WizardError, WizardResult};
pub use model::{ModelDescriptor, ModelRegistry, Record, RecordHandle, RelationDescriptor};
pub use parameters::{ParameterSource, QueryParameters, QueryString};
pub use schema::{ContextMode, ResourceSchema, SchemaContext};
pub use sql::SqlSubject;
pub use subject::{Executable, Subject};
pub use wizard::{BaseQueryWizard, ItemQueryWizard, ListQueryWizard, QueryWizards};
