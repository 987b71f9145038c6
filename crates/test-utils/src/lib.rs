//! Quarry test utilities.
//!
//! Helpers for integration testing: a recording subject that logs every
//! builder call instead of rendering SQL, a small blog model registry,
//! record builders and assertion utilities.

use std::fmt;
use std::sync::Arc;

use quarry::error::{WizardError, WizardResult};
use quarry::model::{Loaded, ModelRegistry, Record, RecordHandle};
use quarry::subject::{
    Aggregate, Comparison, Executable, RelationConstraint, SortDirection, Subject, TrashedMode,
};
use serde_json::Value as JsonValue;

/// Install a test subscriber once; later calls are no-ops.
///
/// Honors `RUST_LOG`, so `RUST_LOG=quarry=trace cargo test` shows the
/// wizard's decisions for a failing test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// One operation performed on a [`RecordingSubject`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Compare {
        column: String,
        op: Comparison,
        value: JsonValue,
    },
    In {
        column: String,
        values: Vec<JsonValue>,
    },
    Null {
        column: String,
        negate: bool,
    },
    Contains {
        column: String,
        needles: Vec<String>,
    },
    JsonContains {
        column: String,
        path: Vec<String>,
        values: Vec<JsonValue>,
        match_all: bool,
    },
    /// A relation constraint with the calls made on the related query.
    Has {
        relation: String,
        calls: Vec<Call>,
    },
    Trashed(TrashedMode),
    Select(Vec<String>),
    Relation {
        path: String,
        columns: Option<Vec<String>>,
    },
    Count {
        relation: String,
        alias: String,
    },
    Exists {
        relation: String,
        alias: String,
    },
    Aggregate {
        relation: String,
        column: String,
        function: Aggregate,
        alias: String,
    },
    OrderBy {
        column: String,
        direction: SortDirection,
    },
}

/// A [`Subject`] that records calls and returns canned records.
///
/// Columns are qualified with the model's table, as a SQL backend would.
#[derive(Clone)]
pub struct RecordingSubject {
    models: Arc<ModelRegistry>,
    model: String,
    table: String,
    calls: Vec<Call>,
    records: Vec<RecordHandle>,
}

impl RecordingSubject {
    pub fn new(models: Arc<ModelRegistry>, model: &str) -> Self {
        let table = models
            .get(model)
            .map(|descriptor| descriptor.table().to_string())
            .unwrap_or_else(|| model.to_lowercase());
        Self {
            models,
            model: model.to_string(),
            table,
            calls: Vec::new(),
            records: Vec::new(),
        }
    }

    /// Records handed out by every `fetch`. Handles are shared, not copied.
    pub fn returning(mut self, records: Vec<RecordHandle>) -> Self {
        self.records = records;
        self
    }

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn has_call(&self, call: &Call) -> bool {
        self.calls.contains(call)
    }

    /// `(column, direction)` of every `order_by`, in order.
    pub fn orders(&self) -> Vec<(String, SortDirection)> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::OrderBy { column, direction } => Some((column.clone(), *direction)),
                _ => None,
            })
            .collect()
    }

    /// Eager-load paths with their column lists, in order.
    pub fn eager_loads(&self) -> Vec<(String, Option<Vec<String>>)> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::Relation { path, columns } => Some((path.clone(), columns.clone())),
                _ => None,
            })
            .collect()
    }

    /// Columns of the last `select`, if any.
    pub fn selected(&self) -> Option<&[String]> {
        self.calls.iter().rev().find_map(|call| match call {
            Call::Select(columns) => Some(columns.as_slice()),
            _ => None,
        })
    }
}

impl fmt::Debug for RecordingSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingSubject")
            .field("model", &self.model)
            .field("calls", &self.calls)
            .field("records", &self.records.len())
            .finish()
    }
}

impl Subject for RecordingSubject {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn qualify_column(&self, column: &str) -> String {
        if column.contains('.') {
            column.to_string()
        } else {
            format!("{}.{column}", self.table)
        }
    }

    fn where_compare(&mut self, column: &str, op: Comparison, value: JsonValue) {
        self.calls.push(Call::Compare {
            column: column.to_string(),
            op,
            value,
        });
    }

    fn where_in(&mut self, column: &str, values: Vec<JsonValue>) {
        self.calls.push(Call::In {
            column: column.to_string(),
            values,
        });
    }

    fn where_null(&mut self, column: &str, negate: bool) {
        self.calls.push(Call::Null {
            column: column.to_string(),
            negate,
        });
    }

    fn where_contains(&mut self, column: &str, needles: &[String]) {
        self.calls.push(Call::Contains {
            column: column.to_string(),
            needles: needles.to_vec(),
        });
    }

    fn where_json_contains(&mut self, column: &str, path: &[String], values: &[JsonValue], match_all: bool) {
        self.calls.push(Call::JsonContains {
            column: column.to_string(),
            path: path.to_vec(),
            values: values.to_vec(),
            match_all,
        });
    }

    fn where_has(&mut self, relation: &str, constraint: RelationConstraint<'_>) -> WizardResult<()> {
        let descriptor = self.models.relation(&self.model, relation)?;
        if descriptor.related.is_empty() {
            return Err(WizardError::Subject(format!(
                "cannot constrain polymorphic relation `{relation}`"
            )));
        }
        let mut related = RecordingSubject::new(Arc::clone(&self.models), &descriptor.related);
        constraint(&mut related)?;
        self.calls.push(Call::Has {
            relation: relation.to_string(),
            calls: related.calls,
        });
        Ok(())
    }

    fn with_trashed(&mut self, mode: TrashedMode) {
        self.calls.push(Call::Trashed(mode));
    }

    fn select(&mut self, columns: &[String]) {
        self.calls.push(Call::Select(columns.to_vec()));
    }

    fn with_relation(&mut self, path: &str, columns: Option<Vec<String>>) {
        self.calls.push(Call::Relation {
            path: path.to_string(),
            columns,
        });
    }

    fn with_count(&mut self, relation: &str, alias: &str) {
        self.calls.push(Call::Count {
            relation: relation.to_string(),
            alias: alias.to_string(),
        });
    }

    fn with_exists(&mut self, relation: &str, alias: &str) {
        self.calls.push(Call::Exists {
            relation: relation.to_string(),
            alias: alias.to_string(),
        });
    }

    fn with_aggregate(&mut self, relation: &str, column: &str, function: Aggregate, alias: &str) {
        self.calls.push(Call::Aggregate {
            relation: relation.to_string(),
            column: column.to_string(),
            function,
            alias: alias.to_string(),
        });
    }

    fn order_by(&mut self, column: &str, direction: SortDirection) {
        self.calls.push(Call::OrderBy {
            column: column.to_string(),
            direction,
        });
    }
}

impl Executable for RecordingSubject {
    fn fetch(&mut self) -> WizardResult<Vec<RecordHandle>> {
        Ok(self.records.clone())
    }
}

/// Blog model fixtures.
pub mod blog {
    use std::sync::Arc;

    use quarry::model::{ModelDescriptor, ModelRegistry, Pivot, RelationDescriptor};
    use quarry::subject::Comparison;
    use serde_json::{Value, json};

    /// Users, posts, comments, tags and polymorphic images.
    ///
    /// - `User` soft-deletes, has `posts`, `comments` and a morph-one `avatar`,
    ///   a `display_name` accessor and an `active` scope.
    /// - `Post` belongs to `author`, has `comments`, `tags` through `post_tag`
    ///   and morph-many `images`; scopes `published` and `popular(min_views)`;
    ///   accessor `excerpt`.
    /// - `Image` morphs to `imageable` and always appends `url`.
    pub fn models() -> ModelRegistry {
        ModelRegistry::new()
            .with(
                ModelDescriptor::new("User", "users")
                    .relation("posts", RelationDescriptor::has_many("Post", "user_id", "id"))
                    .relation("comments", RelationDescriptor::has_many("Comment", "user_id", "id"))
                    .relation("avatar", RelationDescriptor::morph_one("Image", "imageable", "User"))
                    .scope("active", |subject, _| {
                        let column = subject.qualify_column("active");
                        subject.where_compare(&column, Comparison::Eq, json!(true));
                        Ok(())
                    })
                    .accessor("display_name", |user| {
                        let name = user.attribute("name").and_then(Value::as_str).unwrap_or_default();
                        json!(format!("@{name}"))
                    })
                    .soft_deletes("deleted_at"),
            )
            .with(
                ModelDescriptor::new("Post", "posts")
                    .relation("author", RelationDescriptor::belongs_to("User", "user_id", "id"))
                    .relation("comments", RelationDescriptor::has_many("Comment", "post_id", "id"))
                    .relation(
                        "tags",
                        RelationDescriptor::belongs_to_many(
                            "Tag",
                            Pivot {
                                table: "post_tag".to_string(),
                                foreign_pivot_key: "post_id".to_string(),
                                related_pivot_key: "tag_id".to_string(),
                            },
                        ),
                    )
                    .relation("images", RelationDescriptor::morph_many("Image", "imageable", "Post"))
                    .scope("published", |subject, _| {
                        let column = subject.qualify_column("status");
                        subject.where_compare(&column, Comparison::Eq, json!("published"));
                        Ok(())
                    })
                    .scope("popular", |subject, args| {
                        let min = args.first().cloned().unwrap_or(json!(100));
                        let column = subject.qualify_column("views");
                        subject.where_compare(&column, Comparison::Gte, min);
                        Ok(())
                    })
                    .accessor("excerpt", |post| {
                        let body = post.attribute("body").and_then(Value::as_str).unwrap_or_default();
                        json!(body.chars().take(12).collect::<String>())
                    }),
            )
            .with(
                ModelDescriptor::new("Comment", "comments")
                    .relation("post", RelationDescriptor::belongs_to("Post", "post_id", "id"))
                    .relation("author", RelationDescriptor::belongs_to("User", "user_id", "id")),
            )
            .with(ModelDescriptor::new("Tag", "tags"))
            .with(
                ModelDescriptor::new("Image", "images")
                    .relation("imageable", RelationDescriptor::morph_to("imageable"))
                    .accessor("url", |image| {
                        let path = image.attribute("path").and_then(Value::as_str).unwrap_or_default();
                        json!(format!("/media/{path}"))
                    })
                    .default_appends(["url"]),
            )
    }

    pub fn shared_models() -> Arc<ModelRegistry> {
        Arc::new(models())
    }
}

/// Create a test record builder for `model` with JSON attributes.
pub fn test_record(model: &str, attributes: JsonValue) -> TestRecord {
    TestRecord {
        record: Record::from_json(model, attributes),
    }
}

/// A record builder for post-processing fixtures.
#[derive(Debug, Clone)]
pub struct TestRecord {
    record: Record,
}

impl TestRecord {
    /// Set a single attribute.
    pub fn with_attribute(mut self, name: &str, value: JsonValue) -> Self {
        self.record.set_attribute(name, value);
        self
    }

    /// Attach a singular relation.
    pub fn with_one(mut self, relation: &str, related: &RecordHandle) -> Self {
        self.record
            .set_relation(relation, Loaded::One(Some(related.clone())));
        self
    }

    /// Attach a singular relation that loaded nothing.
    pub fn with_none(mut self, relation: &str) -> Self {
        self.record.set_relation(relation, Loaded::One(None));
        self
    }

    /// Attach a collection relation.
    pub fn with_many(mut self, relation: &str, related: &[RecordHandle]) -> Self {
        self.record
            .set_relation(relation, Loaded::Many(related.to_vec()));
        self
    }

    pub fn build(self) -> RecordHandle {
        RecordHandle::new(self.record)
    }
}

/// Assertion helpers for JSON output and recorded calls.
pub mod assert {
    use serde_json::Value;

    use crate::{Call, RecordingSubject};

    /// Assert that a JSON value has a specific key.
    pub fn has_key(value: &Value, key: &str) {
        assert!(
            value.get(key).is_some(),
            "Expected JSON to have key '{key}', got: {value}"
        );
    }

    /// Assert that a JSON value does not have a specific key.
    pub fn lacks_key(value: &Value, key: &str) {
        assert!(
            value.get(key).is_none(),
            "Expected JSON to NOT have key '{key}', got: {value}"
        );
    }

    /// Assert that a JSON object has exactly these keys, in any order.
    pub fn keys(value: &Value, expected: &[&str]) {
        let mut actual: Vec<&str> = value
            .as_object()
            .map(|map| map.keys().map(String::as_str).collect())
            .unwrap_or_default();
        actual.sort_unstable();
        let mut expected = expected.to_vec();
        expected.sort_unstable();
        assert_eq!(actual, expected, "key mismatch in {value}");
    }

    /// Assert that a JSON value equals expected.
    pub fn json_eq(actual: &Value, expected: &Value) {
        assert_eq!(
            actual, expected,
            "JSON mismatch:\nactual: {actual:#}\nexpected: {expected:#}"
        );
    }

    /// Assert that a string contains a substring.
    pub fn contains(haystack: &str, needle: &str) {
        assert!(
            haystack.contains(needle),
            "Expected string to contain '{needle}'\nActual: {haystack}"
        );
    }

    /// Assert that a string does not contain a substring.
    pub fn not_contains(haystack: &str, needle: &str) {
        assert!(
            !haystack.contains(needle),
            "Expected string to NOT contain '{needle}'\nActual: {haystack}"
        );
    }

    /// Assert that the subject recorded a call.
    pub fn called(subject: &RecordingSubject, call: &Call) {
        assert!(
            subject.has_call(call),
            "Expected call {call:?}\nRecorded: {:#?}",
            subject.calls()
        );
    }

    /// Assert that the subject did not record a call.
    pub fn not_called(subject: &RecordingSubject, call: &Call) {
        assert!(
            !subject.has_call(call),
            "Did not expect call {call:?}\nRecorded: {:#?}",
            subject.calls()
        );
    }
}
