//! Per-relation attribute trees.

use indexmap::{IndexMap, IndexSet};

use crate::parameters::FieldMap;
use crate::support::split_last;

/// Attribute names per relation level.
///
/// `leaves` are the attribute names at this level; `children` continue into
/// loaded relations by name. A `*` leaf means every attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeTree {
    leaves: IndexSet<String>,
    children: IndexMap<String, AttributeTree>,
}

impl AttributeTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from dotted paths: `summary`, `posts.excerpt`.
    pub fn from_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tree = Self::new();
        for path in paths {
            let (prefix, leaf) = split_last(path.as_ref());
            tree.add_leaves(prefix, [leaf]);
        }
        tree
    }

    /// Build from a grouped field map. Entries under `root_key` are root
    /// leaves; every other key is a relation path.
    pub fn from_fields(fields: &FieldMap, root_key: &str) -> Self {
        let mut tree = Self::new();
        for (resource, names) in fields {
            let path = if resource == root_key { "" } else { resource.as_str() };
            tree.add_leaves(path, names);
        }
        tree
    }

    /// Add leaves at a relation path, creating intermediate nodes. An empty
    /// path is the root.
    pub fn add_leaves<I, S>(&mut self, path: &str, leaves: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let node = self.node_mut(path);
        node.leaves.extend(leaves.into_iter().map(|leaf| leaf.as_ref().to_string()));
    }

    fn node_mut(&mut self, path: &str) -> &mut AttributeTree {
        if path.is_empty() {
            return self;
        }
        path.split('.')
            .fold(self, |node, segment| node.children.entry(segment.to_string()).or_default())
    }

    pub fn leaves(&self) -> &IndexSet<String> {
        &self.leaves
    }

    pub fn child(&self, relation: &str) -> Option<&AttributeTree> {
        self.children.get(relation)
    }

    /// Whether the leaves restrict visibility (non-empty, no `*`).
    pub fn restricts(&self) -> bool {
        !self.leaves.is_empty() && !self.leaves.contains("*")
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty() && self.children.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_build_nested_nodes() {
        let tree = AttributeTree::from_paths(["summary", "posts.excerpt", "posts.comments.preview"]);
        assert!(tree.leaves().contains("summary"));

        let posts = tree.child("posts");
        assert!(posts.is_some_and(|posts| posts.leaves().contains("excerpt")));
        assert!(
            posts
                .and_then(|posts| posts.child("comments"))
                .is_some_and(|comments| comments.leaves().contains("preview"))
        );
    }

    #[test]
    fn fields_promote_root_key() {
        let mut fields = FieldMap::new();
        fields.insert("users".to_string(), ["id", "name"].iter().map(|s| (*s).to_string()).collect());
        fields.insert("posts".to_string(), ["*"].iter().map(|s| (*s).to_string()).collect());

        let tree = AttributeTree::from_fields(&fields, "users");
        assert!(tree.restricts());
        assert!(tree.child("posts").is_some_and(|posts| !posts.restricts()));
    }
}
