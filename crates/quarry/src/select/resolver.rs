//! Relation path resolution and key discovery.

use crate::model::{ModelDescriptor, ModelRegistry, RelationDescriptor, RelationKind};
use crate::support::split_last;

/// A relation reached by walking a dotted path from a root model.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedRelation<'a> {
    /// Model declaring the relation.
    pub parent: &'a ModelDescriptor,
    pub relation: &'a RelationDescriptor,
    /// Related model, `None` for `MorphTo`.
    pub related: Option<&'a ModelDescriptor>,
}

impl ResolvedRelation<'_> {
    pub fn kind(&self) -> RelationKind {
        self.relation.kind
    }

    /// Columns the related rows must carry for the loaded rows to be matched
    /// back to their parents. `None` when the kind does not have a
    /// predictable set of such columns.
    pub fn related_keys(&self) -> Option<Vec<String>> {
        let relation = self.relation;
        match relation.kind {
            RelationKind::BelongsTo => Some(vec![relation.local_key.clone()]),
            RelationKind::HasOne | RelationKind::HasMany => Some(vec![relation.foreign_key.clone()]),
            RelationKind::MorphOne | RelationKind::MorphMany => {
                let mut keys = vec![relation.foreign_key.clone()];
                keys.extend(relation.morph_type.clone());
                Some(keys)
            }
            RelationKind::BelongsToMany
            | RelationKind::HasManyThrough
            | RelationKind::MorphTo
            | RelationKind::MorphToMany => None,
        }
    }

    /// Columns the parent rows must carry for the relation to be loaded.
    pub fn parent_keys(&self) -> Vec<String> {
        let relation = self.relation;
        match relation.kind {
            RelationKind::BelongsTo => vec![relation.foreign_key.clone()],
            RelationKind::HasOne
            | RelationKind::HasMany
            | RelationKind::HasManyThrough
            | RelationKind::MorphOne
            | RelationKind::MorphMany => vec![relation.local_key.clone()],
            RelationKind::MorphTo => {
                let mut keys = vec![relation.foreign_key.clone()];
                keys.extend(relation.morph_type.clone());
                keys
            }
            RelationKind::BelongsToMany | RelationKind::MorphToMany => {
                vec![self.parent.key_name().to_string()]
            }
        }
    }
}

/// Walks relation paths over the model registry.
#[derive(Debug, Clone, Copy)]
pub struct RelationResolver<'a> {
    models: &'a ModelRegistry,
}

impl<'a> RelationResolver<'a> {
    pub fn new(models: &'a ModelRegistry) -> Self {
        Self { models }
    }

    /// Resolve `path` (e.g. `posts.comments`) starting at `model`.
    ///
    /// Returns `None` when a segment is unknown or the path continues past a
    /// `MorphTo`.
    pub fn resolve(&self, model: &str, path: &str) -> Option<ResolvedRelation<'a>> {
        let (prefix, name) = split_last(path);
        let parent = self.models.model_at_path(model, prefix)?;
        let relation = parent.get_relation(name)?;
        let related = match relation.kind {
            RelationKind::MorphTo => None,
            _ => Some(self.models.get(&relation.related)?),
        };
        Some(ResolvedRelation {
            parent,
            relation,
            related,
        })
    }

    pub fn kind(&self, model: &str, path: &str) -> Option<RelationKind> {
        self.resolve(model, path).map(|resolved| resolved.kind())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn models() -> ModelRegistry {
        ModelRegistry::new()
            .with(
                ModelDescriptor::new("User", "users")
                    .relation("posts", RelationDescriptor::has_many("Post", "user_id", "id")),
            )
            .with(
                ModelDescriptor::new("Post", "posts")
                    .relation("author", RelationDescriptor::belongs_to("User", "user_id", "id"))
                    .relation("images", RelationDescriptor::morph_many("Image", "imageable", "post"))
                    .relation("subject", RelationDescriptor::morph_to("subject")),
            )
            .with(ModelDescriptor::new("Image", "images"))
    }

    #[test]
    fn resolves_nested_paths() {
        let models = models();
        let resolver = RelationResolver::new(&models);

        let resolved = resolver.resolve("User", "posts.author");
        assert!(resolved.is_some_and(|r| r.parent.name() == "Post" && r.kind() == RelationKind::BelongsTo));
        assert_eq!(resolver.kind("User", "posts.images"), Some(RelationKind::MorphMany));
        assert!(resolver.resolve("User", "posts.missing").is_none());
        assert!(resolver.resolve("Post", "subject.anything").is_none());
    }

    #[test]
    fn key_discovery() {
        let models = models();
        let resolver = RelationResolver::new(&models);

        let images = resolver.resolve("Post", "images");
        assert_eq!(
            images.and_then(|r| r.related_keys()),
            Some(vec!["imageable_id".to_string(), "imageable_type".to_string()])
        );

        let author = resolver.resolve("Post", "author");
        assert_eq!(author.map(|r| r.parent_keys()), Some(vec!["user_id".to_string()]));

        let subject = resolver.resolve("Post", "subject");
        assert!(subject.is_some_and(|r| r.related.is_none() && r.related_keys().is_none()));
        assert_eq!(
            subject.map(|r| r.parent_keys()),
            Some(vec!["subject_id".to_string(), "subject_type".to_string()])
        );
    }
}
