//! Minimal column sets for eager-loaded relations.

use indexmap::{IndexMap, IndexSet};

use super::resolver::RelationResolver;
use crate::model::{ModelRegistry, RelationKind};
use crate::parameters::FieldMap;
use crate::support::{depth, split_last};

/// Why a relation path keeps its full column list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// No sparse fields were requested for the path.
    NoFields,
    /// The requested fields contain `*`.
    Wildcard,
    /// Computed attributes were appended on the path.
    AppendTarget,
    /// The path does not resolve to a known relation.
    Unresolved,
    /// The relation kind has no predictable matching columns.
    UnpredictableKeys(RelationKind),
    /// The related model always appends computed attributes.
    ComputedAttributes,
    /// A nested relation could not be resolved, so its keys are unknown.
    ChildKeysUnknown(String),
}

/// Columns to select per eager-loaded path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectPlan {
    /// Restricted column list per relation path.
    pub columns: IndexMap<String, Vec<String>>,
    /// Columns the root query must select for its top-level relations.
    pub root_columns: Vec<String>,
    /// Paths left unrestricted, with the reason.
    pub skipped: IndexMap<String, SkipReason>,
}

impl SelectPlan {
    pub fn columns_for(&self, path: &str) -> Option<&[String]> {
        self.columns.get(path).map(Vec::as_slice)
    }
}

/// Plans relation column lists from sparse fields.
///
/// A path is restricted to its requested fields plus the keys needed to
/// match its rows to their parents and the keys its own nested relations
/// need. Whenever a path cannot be classified with confidence the planner
/// leaves it alone and the relation loads every column.
#[derive(Debug, Clone, Copy)]
pub struct SafeRelationSelect<'a> {
    resolver: RelationResolver<'a>,
}

impl<'a> SafeRelationSelect<'a> {
    pub fn new(models: &'a ModelRegistry) -> Self {
        Self {
            resolver: RelationResolver::new(models),
        }
    }

    /// Plan `paths` (every eager-loaded path, including intermediate
    /// segments) for a subject over `model`.
    ///
    /// `fields` is keyed by relation path; `appends` holds dotted append
    /// paths (`posts.summary`, `posts.*`).
    pub fn plan(
        &self,
        model: &str,
        paths: &IndexSet<String>,
        fields: &FieldMap,
        appends: &IndexSet<String>,
    ) -> SelectPlan {
        let mut plan = SelectPlan::default();

        let append_targets: IndexSet<&str> = appends
            .iter()
            .map(|append| split_last(append).0)
            .filter(|target| !target.is_empty())
            .collect();

        for path in paths {
            match self.plan_path(model, path, paths, fields, &append_targets) {
                Ok(columns) => {
                    tracing::debug!(path = %path, columns = ?columns, "restricted relation columns");
                    plan.columns.insert(path.clone(), columns);
                }
                Err(reason) => {
                    match &reason {
                        SkipReason::NoFields | SkipReason::Wildcard => {
                            tracing::debug!(path = %path, reason = ?reason, "relation keeps all columns");
                        }
                        _ => {
                            tracing::warn!(path = %path, reason = ?reason, "declined to restrict relation columns");
                        }
                    }
                    plan.skipped.insert(path.clone(), reason);
                }
            }
        }

        let mut root_columns = IndexSet::new();
        for path in paths.iter().filter(|path| depth(path) == 1) {
            if let Some(resolved) = self.resolver.resolve(model, path) {
                root_columns.extend(resolved.parent_keys());
            }
        }
        plan.root_columns = root_columns.into_iter().collect();

        plan
    }

    fn plan_path(
        &self,
        model: &str,
        path: &str,
        paths: &IndexSet<String>,
        fields: &FieldMap,
        append_targets: &IndexSet<&str>,
    ) -> Result<Vec<String>, SkipReason> {
        let requested = match fields.get(path) {
            Some(requested) if !requested.is_empty() => requested,
            _ => return Err(SkipReason::NoFields),
        };
        if requested.contains("*") {
            return Err(SkipReason::Wildcard);
        }
        if append_targets.contains(path) {
            return Err(SkipReason::AppendTarget);
        }

        let resolved = self
            .resolver
            .resolve(model, path)
            .ok_or(SkipReason::Unresolved)?;
        let own_keys = resolved
            .related_keys()
            .ok_or(SkipReason::UnpredictableKeys(resolved.kind()))?;
        if resolved.related.is_some_and(|related| related.has_default_appends()) {
            return Err(SkipReason::ComputedAttributes);
        }

        let mut columns: IndexSet<String> = requested.iter().cloned().collect();
        columns.extend(own_keys);

        let child_depth = depth(path) + 1;
        for child in paths
            .iter()
            .filter(|child| depth(child) == child_depth && split_last(child).0 == path)
        {
            let child_relation = self
                .resolver
                .resolve(model, child)
                .ok_or_else(|| SkipReason::ChildKeysUnknown(child.to_string()))?;
            columns.extend(child_relation.parent_keys());
        }

        Ok(columns.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelDescriptor, Pivot, RelationDescriptor};

    fn models() -> ModelRegistry {
        ModelRegistry::new()
            .with(
                ModelDescriptor::new("User", "users")
                    .relation("posts", RelationDescriptor::has_many("Post", "user_id", "id"))
                    .relation(
                        "roles",
                        RelationDescriptor::belongs_to_many(
                            "Role",
                            Pivot {
                                table: "role_user".to_string(),
                                foreign_pivot_key: "user_id".to_string(),
                                related_pivot_key: "role_id".to_string(),
                            },
                        ),
                    ),
            )
            .with(
                ModelDescriptor::new("Post", "posts")
                    .relation("author", RelationDescriptor::belongs_to("User", "user_id", "id"))
                    .relation("comments", RelationDescriptor::has_many("Comment", "post_id", "id")),
            )
            .with(ModelDescriptor::new("Comment", "comments").default_appends(["excerpt"]))
            .with(ModelDescriptor::new("Role", "roles"))
    }

    fn set(items: &[&str]) -> IndexSet<String> {
        items.iter().map(|item| (*item).to_string()).collect()
    }

    fn fields(entries: &[(&str, &str)]) -> FieldMap {
        entries
            .iter()
            .map(|(path, names)| ((*path).to_string(), names.split(',').map(str::to_string).collect()))
            .collect()
    }

    #[test]
    fn injects_matching_and_child_keys() {
        let models = models();
        let planner = SafeRelationSelect::new(&models);

        let plan = planner.plan(
            "User",
            &set(&["posts", "posts.author"]),
            &fields(&[("posts", "title"), ("posts.author", "name")]),
            &IndexSet::new(),
        );

        assert_eq!(plan.columns_for("posts"), Some(&["title".to_string(), "user_id".to_string()][..]));
        assert_eq!(plan.columns_for("posts.author"), Some(&["name".to_string(), "id".to_string()][..]));
        assert_eq!(plan.root_columns, vec!["id".to_string()]);
    }

    #[test]
    fn declines_unclassifiable_paths() {
        let models = models();
        let planner = SafeRelationSelect::new(&models);

        let plan = planner.plan(
            "User",
            &set(&["posts", "posts.comments", "roles"]),
            &fields(&[("posts", "*"), ("posts.comments", "body"), ("roles", "name")]),
            &IndexSet::new(),
        );

        assert!(plan.columns.is_empty());
        assert_eq!(plan.skipped.get("posts"), Some(&SkipReason::Wildcard));
        assert_eq!(plan.skipped.get("posts.comments"), Some(&SkipReason::ComputedAttributes));
        assert_eq!(
            plan.skipped.get("roles"),
            Some(&SkipReason::UnpredictableKeys(RelationKind::BelongsToMany))
        );
    }

    #[test]
    fn append_targets_keep_all_columns() {
        let models = models();
        let planner = SafeRelationSelect::new(&models);

        let plan = planner.plan(
            "User",
            &set(&["posts"]),
            &fields(&[("posts", "title")]),
            &set(&["posts.summary"]),
        );
        assert_eq!(plan.skipped.get("posts"), Some(&SkipReason::AppendTarget));
        assert_eq!(plan.root_columns, vec!["id".to_string()]);
    }

    #[test]
    fn unknown_child_blocks_parent() {
        let models = models();
        let planner = SafeRelationSelect::new(&models);

        let plan = planner.plan(
            "User",
            &set(&["posts", "posts.ghost"]),
            &fields(&[("posts", "title")]),
            &IndexSet::new(),
        );
        assert_eq!(
            plan.skipped.get("posts"),
            Some(&SkipReason::ChildKeysUnknown("posts.ghost".to_string()))
        );
    }
}
