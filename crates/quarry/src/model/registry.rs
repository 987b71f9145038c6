//! Model metadata: tables, keys, relations, scopes and accessors.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Record;
use crate::error::{WizardError, WizardResult};
use crate::subject::Subject;

/// A named query scope: receives the subject and positional arguments.
pub type ScopeFn = Arc<dyn Fn(&mut dyn Subject, &[Value]) -> WizardResult<()> + Send + Sync>;

/// A computed attribute.
pub type AccessorFn = Arc<dyn Fn(&Record) -> Value + Send + Sync>;

/// Relation kinds the registry understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    BelongsTo,
    HasOne,
    HasMany,
    BelongsToMany,
    HasManyThrough,
    MorphOne,
    MorphMany,
    MorphTo,
    MorphToMany,
}

impl RelationKind {
    /// Whether the relation yields at most one record.
    pub fn is_singular(&self) -> bool {
        matches!(
            self,
            RelationKind::BelongsTo | RelationKind::HasOne | RelationKind::MorphOne | RelationKind::MorphTo
        )
    }
}

/// Intermediate table of a many-to-many relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pivot {
    pub table: String,
    /// Pivot column pointing at the parent.
    pub foreign_pivot_key: String,
    /// Pivot column pointing at the related model.
    pub related_pivot_key: String,
}

/// Intermediate model of a has-many-through relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Through {
    pub table: String,
    /// Column on the intermediate table pointing at the parent.
    pub first_key: String,
    /// Column on the related table pointing at the intermediate row.
    pub second_key: String,
    /// Key on the intermediate table referenced by `second_key`.
    pub second_local_key: String,
}

/// How a relation connects its parent to the related model.
///
/// For `BelongsTo`, `foreign_key` lives on the parent and `local_key` is the
/// owner key on the related model. For the `Has*`/`Morph{One,Many}` kinds,
/// `local_key` lives on the parent and `foreign_key` on the related model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDescriptor {
    pub kind: RelationKind,
    /// Related model name. Empty for `MorphTo`, whose target varies per row.
    pub related: String,
    pub foreign_key: String,
    pub local_key: String,
    /// Morph type column (on the related model for `MorphOne`/`MorphMany`,
    /// on the parent for `MorphTo`).
    pub morph_type: Option<String>,
    /// Value stored in the morph type column for the parent model.
    pub morph_class: Option<String>,
    pub pivot: Option<Pivot>,
    pub through: Option<Through>,
}

impl RelationDescriptor {
    fn base(kind: RelationKind, related: &str, foreign_key: &str, local_key: &str) -> Self {
        Self {
            kind,
            related: related.to_string(),
            foreign_key: foreign_key.to_string(),
            local_key: local_key.to_string(),
            morph_type: None,
            morph_class: None,
            pivot: None,
            through: None,
        }
    }

    pub fn belongs_to(related: &str, foreign_key: &str, owner_key: &str) -> Self {
        Self::base(RelationKind::BelongsTo, related, foreign_key, owner_key)
    }

    pub fn has_one(related: &str, foreign_key: &str, local_key: &str) -> Self {
        Self::base(RelationKind::HasOne, related, foreign_key, local_key)
    }

    pub fn has_many(related: &str, foreign_key: &str, local_key: &str) -> Self {
        Self::base(RelationKind::HasMany, related, foreign_key, local_key)
    }

    pub fn belongs_to_many(related: &str, pivot: Pivot) -> Self {
        let mut relation = Self::base(RelationKind::BelongsToMany, related, "", "id");
        relation.pivot = Some(pivot);
        relation
    }

    pub fn has_many_through(related: &str, through: Through, local_key: &str) -> Self {
        let mut relation = Self::base(RelationKind::HasManyThrough, related, "", local_key);
        relation.through = Some(through);
        relation
    }

    /// `{name}_id` / `{name}_type` columns on the related model.
    pub fn morph_one(related: &str, name: &str, morph_class: &str) -> Self {
        Self::morph(RelationKind::MorphOne, related, name, morph_class)
    }

    pub fn morph_many(related: &str, name: &str, morph_class: &str) -> Self {
        Self::morph(RelationKind::MorphMany, related, name, morph_class)
    }

    fn morph(kind: RelationKind, related: &str, name: &str, morph_class: &str) -> Self {
        let mut relation = Self::base(kind, related, &format!("{name}_id"), "id");
        relation.morph_type = Some(format!("{name}_type"));
        relation.morph_class = Some(morph_class.to_string());
        relation
    }

    /// Inverse polymorphic relation; `{name}_id` / `{name}_type` live on the parent.
    pub fn morph_to(name: &str) -> Self {
        let mut relation = Self::base(RelationKind::MorphTo, "", &format!("{name}_id"), "id");
        relation.morph_type = Some(format!("{name}_type"));
        relation
    }

    pub fn morph_to_many(related: &str, pivot: Pivot, morph_type: &str, morph_class: &str) -> Self {
        let mut relation = Self::base(RelationKind::MorphToMany, related, "", "id");
        relation.pivot = Some(pivot);
        relation.morph_type = Some(morph_type.to_string());
        relation.morph_class = Some(morph_class.to_string());
        relation
    }
}

/// Everything the wizard needs to know about one model.
#[derive(Clone)]
pub struct ModelDescriptor {
    name: String,
    table: String,
    primary_key: String,
    resource_key: Option<String>,
    relations: IndexMap<String, RelationDescriptor>,
    scopes: HashMap<String, ScopeFn>,
    accessors: IndexMap<String, AccessorFn>,
    default_appends: Vec<String>,
    soft_delete: Option<String>,
}

impl fmt::Debug for ModelDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelDescriptor")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("primary_key", &self.primary_key)
            .field("relations", &self.relations.keys().collect::<Vec<_>>())
            .field("scopes", &self.scopes.keys().collect::<Vec<_>>())
            .field("accessors", &self.accessors.keys().collect::<Vec<_>>())
            .field("default_appends", &self.default_appends)
            .finish()
    }
}

impl ModelDescriptor {
    pub fn new(name: &str, table: &str) -> Self {
        Self {
            name: name.to_string(),
            table: table.to_string(),
            primary_key: "id".to_string(),
            resource_key: None,
            relations: IndexMap::new(),
            scopes: HashMap::new(),
            accessors: IndexMap::new(),
            default_appends: Vec::new(),
            soft_delete: None,
        }
    }

    pub fn primary_key(mut self, key: &str) -> Self {
        self.primary_key = key.to_string();
        self
    }

    /// Key used for this model in the `fields` parameter. Defaults to the
    /// table name.
    pub fn resource_key(mut self, key: &str) -> Self {
        self.resource_key = Some(key.to_string());
        self
    }

    pub fn relation(mut self, name: &str, relation: RelationDescriptor) -> Self {
        self.relations.insert(name.to_string(), relation);
        self
    }

    pub fn scope<F>(mut self, name: &str, scope: F) -> Self
    where
        F: Fn(&mut dyn Subject, &[Value]) -> WizardResult<()> + Send + Sync + 'static,
    {
        self.scopes.insert(name.to_string(), Arc::new(scope));
        self
    }

    pub fn accessor<F>(mut self, name: &str, accessor: F) -> Self
    where
        F: Fn(&Record) -> Value + Send + Sync + 'static,
    {
        self.accessors.insert(name.to_string(), Arc::new(accessor));
        self
    }

    /// Computed attributes attached to every serialized record.
    pub fn default_appends<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_appends = names.into_iter().map(Into::into).collect();
        self
    }

    /// Enable soft deletes on `column`.
    pub fn soft_deletes(mut self, column: &str) -> Self {
        self.soft_delete = Some(column.to_string());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn key_name(&self) -> &str {
        &self.primary_key
    }

    pub fn fields_key(&self) -> &str {
        self.resource_key.as_deref().unwrap_or(&self.table)
    }

    pub fn get_relation(&self, name: &str) -> Option<&RelationDescriptor> {
        self.relations.get(name)
    }

    pub fn relations(&self) -> impl Iterator<Item = (&String, &RelationDescriptor)> {
        self.relations.iter()
    }

    pub fn get_scope(&self, name: &str) -> Option<&ScopeFn> {
        self.scopes.get(name)
    }

    pub fn get_accessor(&self, name: &str) -> Option<&AccessorFn> {
        self.accessors.get(name)
    }

    pub fn appends(&self) -> &[String] {
        &self.default_appends
    }

    pub fn has_default_appends(&self) -> bool {
        !self.default_appends.is_empty()
    }

    pub fn soft_delete_column(&self) -> Option<&str> {
        self.soft_delete.as_deref()
    }
}

/// Registered models, keyed by model name.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: HashMap<String, Arc<ModelDescriptor>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model, replacing any previous one with the same name.
    pub fn register(&mut self, model: ModelDescriptor) {
        self.models.insert(model.name.clone(), Arc::new(model));
    }

    pub fn with(mut self, model: ModelDescriptor) -> Self {
        self.register(model);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ModelDescriptor> {
        self.models.get(name).map(Arc::as_ref)
    }

    pub fn model(&self, name: &str) -> WizardResult<&ModelDescriptor> {
        self.get(name)
            .ok_or_else(|| WizardError::UnknownModel(name.to_string()))
    }

    /// Relation `relation` on model `model`.
    pub fn relation(&self, model: &str, relation: &str) -> WizardResult<&RelationDescriptor> {
        self.model(model)?
            .get_relation(relation)
            .ok_or_else(|| WizardError::UnknownRelation {
                model: model.to_string(),
                relation: relation.to_string(),
            })
    }

    /// Model reached by following a dotted relation path from `model`.
    ///
    /// Returns `None` when any segment is unknown or passes through a
    /// `MorphTo`, whose target is not fixed.
    pub fn model_at_path(&self, model: &str, path: &str) -> Option<&ModelDescriptor> {
        let mut current = self.get(model)?;
        if path.is_empty() {
            return Some(current);
        }
        for segment in path.split('.') {
            let relation = current.get_relation(segment)?;
            if relation.kind == RelationKind::MorphTo {
                return None;
            }
            current = self.get(&relation.related)?;
        }
        Some(current)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ModelRegistry {
        ModelRegistry::new()
            .with(
                ModelDescriptor::new("User", "users")
                    .relation("posts", RelationDescriptor::has_many("Post", "user_id", "id")),
            )
            .with(
                ModelDescriptor::new("Post", "posts")
                    .relation("author", RelationDescriptor::belongs_to("User", "user_id", "id"))
                    .relation("commentable", RelationDescriptor::morph_to("commentable")),
            )
    }

    #[test]
    fn follows_relation_paths() {
        let registry = registry();
        assert_eq!(registry.model_at_path("User", "posts.author").map(|m| m.name()), Some("User"));
        assert_eq!(registry.model_at_path("User", "").map(|m| m.name()), Some("User"));
        assert!(registry.model_at_path("User", "posts.missing").is_none());
        assert!(registry.model_at_path("Post", "commentable").is_none());
    }

    #[test]
    fn unknown_lookups_are_errors() {
        let registry = registry();
        assert!(matches!(registry.model("Tag"), Err(WizardError::UnknownModel(_))));
        assert!(matches!(
            registry.relation("User", "likes"),
            Err(WizardError::UnknownRelation { .. })
        ));
    }

    #[test]
    fn morph_columns_follow_name() {
        let relation = RelationDescriptor::morph_many("Image", "imageable", "Post");
        assert_eq!(relation.foreign_key, "imageable_id");
        assert_eq!(relation.morph_type.as_deref(), Some("imageable_type"));
        assert!(!relation.kind.is_singular());
        assert!(RelationDescriptor::morph_to("imageable").kind.is_singular());
    }

    #[test]
    fn fields_key_defaults_to_table() {
        assert_eq!(ModelDescriptor::new("User", "users").fields_key(), "users");
        assert_eq!(
            ModelDescriptor::new("User", "users").resource_key("people").fields_key(),
            "people"
        );
    }
}
