//! Record post-processing after the subject has executed.
//!
//! Requested sparse fields hide every other attribute and requested appends
//! are attached, level by level through the loaded relations.

mod tree;

use std::collections::HashSet;

use crate::model::RecordHandle;

pub use tree::AttributeTree;

/// Walks loaded records with a field tree and an append tree in lockstep.
#[derive(Debug, Clone, Default)]
pub struct RelationPostProcessor {
    fields: AttributeTree,
    appends: AttributeTree,
}

impl RelationPostProcessor {
    pub fn new(fields: AttributeTree, appends: AttributeTree) -> Self {
        Self { fields, appends }
    }

    pub fn fields(&self) -> &AttributeTree {
        &self.fields
    }

    pub fn appends(&self) -> &AttributeTree {
        &self.appends
    }

    /// Apply visibility and appends to `records` and every loaded relation
    /// the trees reach.
    ///
    /// Each record is processed once, however many paths lead to it: the
    /// first path to reach a record decides its visibility.
    pub fn process(&self, records: &[RecordHandle]) {
        if self.fields.is_empty() && self.appends.is_empty() {
            return;
        }

        let mut visited: HashSet<usize> = HashSet::new();
        let mut stack: Vec<(RecordHandle, Option<&AttributeTree>, Option<&AttributeTree>)> = records
            .iter()
            .rev()
            .map(|record| (record.clone(), Some(&self.fields), Some(&self.appends)))
            .collect();

        while let Some((handle, fields, appends)) = stack.pop() {
            if !visited.insert(handle.id()) {
                continue;
            }

            let mut record = handle.borrow_mut();
            if let Some(appends) = appends {
                record.append(appends.leaves().iter().filter(|name| name.as_str() != "*"));
            }
            if let Some(fields) = fields
                && fields.restricts()
            {
                record.set_visible(fields.leaves());
            }

            let mut next = Vec::new();
            for (name, loaded) in record.relations() {
                let child_fields = fields.and_then(|tree| tree.child(name));
                let child_appends = appends.and_then(|tree| tree.child(name));
                if child_fields.is_none() && child_appends.is_none() {
                    continue;
                }
                for related in loaded.records() {
                    next.push((related, child_fields, child_appends));
                }
            }
            drop(record);

            stack.extend(next.into_iter().rev());
        }

        tracing::trace!(records = visited.len(), "post-processed records");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Loaded, Record};
    use serde_json::json;

    #[test]
    fn hides_unrequested_and_appends_per_level() {
        let comment = RecordHandle::new(Record::new("Comment").with("id", json!(7)).with("body", json!("hi")));
        let post = RecordHandle::new(
            Record::new("Post")
                .with("id", json!(1))
                .with("title", json!("T"))
                .with("user_id", json!(3)),
        );
        post.borrow_mut().set_relation("comments", Loaded::Many(vec![comment.clone()]));

        let mut fields = AttributeTree::new();
        fields.add_leaves("", ["id", "title"]);
        fields.add_leaves("comments", ["body"]);
        let appends = AttributeTree::from_paths(["comments.preview"]);

        RelationPostProcessor::new(fields, appends).process(std::slice::from_ref(&post));

        assert!(post.borrow().is_hidden("user_id"));
        assert!(!post.borrow().is_hidden("title"));
        assert!(comment.borrow().is_hidden("id"));
        assert!(comment.borrow().appends().contains("preview"));
        assert!(post.borrow().appends().is_empty());
    }

    #[test]
    fn shared_record_processed_once() {
        let author = RecordHandle::new(Record::new("User").with("id", json!(1)));
        let first = RecordHandle::new(Record::new("Post").with("id", json!(1)));
        let second = RecordHandle::new(Record::new("Post").with("id", json!(2)));
        first.borrow_mut().set_relation("author", Loaded::One(Some(author.clone())));
        second.borrow_mut().set_relation("author", Loaded::One(Some(author.clone())));

        let appends = AttributeTree::from_paths(["author.avatar"]);
        RelationPostProcessor::new(AttributeTree::new(), appends).process(&[first, second]);

        assert_eq!(author.borrow().appends().len(), 1);
    }

    #[test]
    fn wildcard_fields_keep_everything() {
        let post = RecordHandle::new(Record::new("Post").with("id", json!(1)).with("secret", json!("x")));
        let mut fields = AttributeTree::new();
        fields.add_leaves("", ["*"]);

        RelationPostProcessor::new(fields, AttributeTree::new()).process(std::slice::from_ref(&post));
        assert!(!post.borrow().is_hidden("secret"));
    }
}
