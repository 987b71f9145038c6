#![allow(clippy::unwrap_used, clippy::expect_used)]
//! End-to-end list wizard behavior against a recording subject.

use std::sync::Arc;

use quarry::error::QueryLimit;
use quarry::subject::{Comparison, SortDirection, TrashedMode};
use quarry::{
    FilterDefinition, IncludeDefinition, ListQueryWizard, QueryString, QueryWizards, SortDefinition, WizardConfig,
    WizardError,
};
use quarry_test_utils::{Call, RecordingSubject, assert, blog, init_tracing, test_record};
use serde_json::json;

fn wizards() -> QueryWizards {
    init_tracing();
    QueryWizards::new(WizardConfig::default(), blog::models())
}

fn list(wizards: &QueryWizards, model: &str, query: &str) -> ListQueryWizard<RecordingSubject> {
    let subject = RecordingSubject::new(Arc::clone(wizards.models()), model);
    wizards.list(subject, &QueryString::parse(query)).unwrap()
}

fn compare(column: &str, op: Comparison, value: serde_json::Value) -> Call {
    Call::Compare {
        column: column.to_string(),
        op,
        value,
    }
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

#[test]
fn alias_is_the_request_name() {
    let wizards = wizards();
    let mut wizard = list(&wizards, "Post", "filter[status]=draft");
    wizard.allowed_filters([FilterDefinition::exact("state").alias("status")]);
    let subject = wizard.build().unwrap();
    assert::called(subject, &compare("posts.state", Comparison::Eq, json!("draft")));

    let mut wizard = list(&wizards, "Post", "filter[state]=draft");
    wizard.allowed_filters([FilterDefinition::exact("state").alias("status")]);
    match wizard.build() {
        Err(WizardError::InvalidFilterQuery { unknown, allowed }) => {
            assert_eq!(unknown, vec!["state"]);
            assert_eq!(allowed, vec!["status"]);
        }
        other => panic!("expected invalid filter, got {other:?}"),
    }
}

#[test]
fn comma_separated_filter_becomes_membership() {
    let wizards = wizards();
    let mut wizard = list(&wizards, "Post", "filter[id]=1,2,3");
    wizard.allowed_filters(["id"]);
    let subject = wizard.build().unwrap();
    assert::called(
        subject,
        &Call::In {
            column: "posts.id".to_string(),
            values: vec![json!("1"), json!("2"), json!("3")],
        },
    );
}

#[test]
fn range_with_only_a_minimum() {
    let wizards = wizards();
    let mut wizard = list(&wizards, "Post", "filter[views][min]=10");
    wizard.allowed_filters([FilterDefinition::range("views")]);
    let subject = wizard.build().unwrap();
    assert_eq!(
        subject.calls(),
        &[compare("posts.views", Comparison::Gte, json!("10"))]
    );
}

#[test]
fn null_filter_follows_the_boolean() {
    let wizards = wizards();
    for (query, negate) in [
        ("filter[published_at]=true", false),
        ("filter[published_at]=false", true),
        ("filter[published_at]=", true),
    ] {
        let mut wizard = list(&wizards, "Post", query);
        wizard.allowed_filters([FilterDefinition::null("published_at")]);
        let subject = wizard.build().unwrap();
        assert_eq!(
            subject.calls(),
            &[Call::Null {
                column: "posts.published_at".to_string(),
                negate,
            }],
            "{query}"
        );
    }
}

#[test]
fn inverted_null_filter_swaps_the_outcomes() {
    let wizards = wizards();
    for (query, negate) in [
        ("filter[draft]=true", true),
        ("filter[draft]=false", false),
        ("filter[draft]=", false),
    ] {
        let mut wizard = list(&wizards, "Post", query);
        wizard.allowed_filters([FilterDefinition::null("published_at").alias("draft").invert_logic()]);
        let subject = wizard.build().unwrap();
        assert_eq!(
            subject.calls(),
            &[Call::Null {
                column: "posts.published_at".to_string(),
                negate,
            }],
            "{query}"
        );
    }
}

#[test]
fn rejected_value_leaves_the_query_untouched() {
    let wizards = wizards();
    let mut wizard = list(&wizards, "Post", "filter[title]=x&filter[published][from]=soon");
    wizard.allowed_filters([
        FilterDefinition::exact("title"),
        FilterDefinition::date_range("published_at")
            .alias("published")
            .date_format("%Y-%m-%d"),
    ]);

    for _ in 0..2 {
        assert!(matches!(
            wizard.build(),
            Err(WizardError::InvalidFilterValue { filter, value }) if filter == "published" && value == "soon"
        ));
        assert!(wizard.subject().calls().is_empty());
    }
}

#[test]
fn unbound_scope_argument_leaves_the_query_untouched() {
    let wizards = wizards();
    let mut wizard = list(&wizards, "Post", "filter[title]=x&filter[popular]=lots");
    wizard.allowed_filters([
        FilterDefinition::exact("title"),
        FilterDefinition::scope("popular").bind(0, |value| value.as_str()?.parse::<i64>().ok().map(|n| json!(n))),
    ]);
    assert!(matches!(
        wizard.build(),
        Err(WizardError::InvalidFilterValue { filter, .. }) if filter == "popular"
    ));
    assert!(wizard.subject().calls().is_empty());
}

#[test]
fn dotted_filter_constrains_the_relation() {
    let wizards = wizards();
    let mut wizard = list(&wizards, "Post", "filter[author][name]=ada");
    wizard.allowed_filters(["author.name"]);
    let subject = wizard.build().unwrap();
    assert::called(
        subject,
        &Call::Has {
            relation: "author".to_string(),
            calls: vec![compare("users.name", Comparison::Eq, json!("ada"))],
        },
    );
}

#[test]
fn intermediate_filter_prefix_is_accepted_but_not_applied() {
    let wizards = wizards();
    let mut wizard = list(&wizards, "Post", "filter[author]=ada");
    wizard.allowed_filters(["author.name"]);
    let subject = wizard.build().unwrap();
    assert!(subject.calls().is_empty());
}

#[test]
fn scope_filter_passes_arguments() {
    let wizards = wizards();
    let mut wizard = list(&wizards, "Post", "filter[popular]=50");
    wizard.allowed_filters([FilterDefinition::scope("popular")]);
    let subject = wizard.build().unwrap();
    assert::called(subject, &compare("posts.views", Comparison::Gte, json!("50")));
}

#[test]
fn trashed_filter_switches_visibility() {
    let wizards = wizards();
    let mut wizard = list(&wizards, "User", "filter[trashed]=only");
    wizard.allowed_filters([FilterDefinition::trashed()]);
    let subject = wizard.build().unwrap();
    assert::called(subject, &Call::Trashed(TrashedMode::Only));
}

#[test]
fn default_value_applies_when_absent() {
    let wizards = wizards();
    let mut wizard = list(&wizards, "Post", "");
    wizard.allowed_filters([FilterDefinition::exact("status").default(json!("published"))]);
    let subject = wizard.build().unwrap();
    assert::called(subject, &compare("posts.status", Comparison::Eq, json!("published")));
}

#[test]
fn passthrough_values_are_captured_not_applied() {
    let wizards = wizards();
    let mut wizard = list(&wizards, "Post", "filter[near]=berlin");
    wizard.allowed_filters([FilterDefinition::passthrough("near")]);
    wizard.build().unwrap();
    assert_eq!(wizard.passthrough_filters().get("near"), Some(&json!("berlin")));
    assert!(wizard.subject().calls().is_empty());
}

#[test]
fn filter_count_limit() {
    let mut config = WizardConfig::default();
    config.limits.max_filters_count = Some(2);
    let wizards = QueryWizards::new(config, blog::models());

    let mut wizard = list(&wizards, "Post", "filter[a]=1&filter[b]=2&filter[c]=3");
    wizard.allowed_filters(["a", "b", "c"]);
    assert!(matches!(
        wizard.build(),
        Err(WizardError::LimitExceeded {
            limit: QueryLimit::FiltersCount,
            actual: 3,
            max: 2,
        })
    ));
}

#[test]
fn invalid_filters_can_be_ignored() {
    let mut config = WizardConfig::default();
    config.exceptions.disable_invalid_filter_query = true;
    let wizards = QueryWizards::new(config, blog::models());

    let mut wizard = list(&wizards, "Post", "filter[secret]=1&filter[title]=x");
    wizard.allowed_filters(["title"]);
    let subject = wizard.build().unwrap();
    assert_eq!(subject.calls(), &[compare("posts.title", Comparison::Eq, json!("x"))]);
}

// ---------------------------------------------------------------------------
// Sorts
// ---------------------------------------------------------------------------

#[test]
fn sort_direction_from_prefix() {
    let wizards = wizards();
    let mut wizard = list(&wizards, "Post", "sort=-created_at,title");
    wizard.allowed_sorts(["created_at", "title"]);
    let subject = wizard.build().unwrap();
    assert_eq!(
        subject.orders(),
        vec![
            ("posts.created_at".to_string(), SortDirection::Desc),
            ("posts.title".to_string(), SortDirection::Asc),
        ]
    );
}

#[test]
fn default_sort_only_without_request() {
    let wizards = wizards();
    let mut wizard = list(&wizards, "Post", "");
    wizard.allowed_sorts(["title"]).default_sorts(["-created_at"]);
    let subject = wizard.build().unwrap();
    assert_eq!(
        subject.orders(),
        vec![("posts.created_at".to_string(), SortDirection::Desc)]
    );

    let mut wizard = list(&wizards, "Post", "sort=title");
    wizard.allowed_sorts(["title"]).default_sorts(["-created_at"]);
    let subject = wizard.build().unwrap();
    assert_eq!(subject.orders(), vec![("posts.title".to_string(), SortDirection::Asc)]);
}

#[test]
fn unknown_sort_is_rejected() {
    let wizards = wizards();
    let mut wizard = list(&wizards, "Post", "sort=password");
    wizard.allowed_sorts(["title"]);
    match wizard.build() {
        Err(WizardError::InvalidSortQuery { unknown, .. }) => assert_eq!(unknown, vec!["password"]),
        other => panic!("expected invalid sort, got {other:?}"),
    }
}

#[test]
fn count_sort_orders_by_the_aggregate() {
    let wizards = wizards();
    let mut wizard = list(&wizards, "User", "sort=-posts_count");
    wizard.allowed_sorts([SortDefinition::count("posts")]);
    let subject = wizard.build().unwrap();
    assert::called(
        subject,
        &Call::Count {
            relation: "posts".to_string(),
            alias: "posts_count".to_string(),
        },
    );
    assert_eq!(subject.orders(), vec![("posts_count".to_string(), SortDirection::Desc)]);
}

// ---------------------------------------------------------------------------
// Includes and fields
// ---------------------------------------------------------------------------

#[test]
fn count_suffix_derives_an_aggregate_include() {
    let wizards = wizards();
    let mut wizard = list(&wizards, "User", "include=postsCount");
    wizard.allowed_includes(["posts"]);
    let subject = wizard.build().unwrap();
    assert_eq!(
        subject.calls(),
        &[Call::Count {
            relation: "posts".to_string(),
            alias: "posts_count".to_string(),
        }]
    );
}

#[test]
fn exists_include_by_definition() {
    let wizards = wizards();
    let mut wizard = list(&wizards, "User", "include=hasPosts");
    wizard.allowed_includes([IncludeDefinition::exists("posts").alias("hasPosts")]);
    let subject = wizard.build().unwrap();
    assert::called(
        subject,
        &Call::Exists {
            relation: "posts".to_string(),
            alias: "posts_exists".to_string(),
        },
    );
}

#[test]
fn nested_include_loads_every_segment() {
    let wizards = wizards();
    let mut wizard = list(&wizards, "User", "include=posts.comments");
    wizard.allowed_includes(["posts.comments"]);
    let subject = wizard.build().unwrap();
    assert_eq!(
        subject.eager_loads(),
        vec![("posts".to_string(), None), ("posts.comments".to_string(), None)]
    );
}

#[test]
fn first_segment_of_allowed_path_is_includable() {
    let wizards = wizards();
    let mut wizard = list(&wizards, "User", "include=posts");
    wizard.allowed_includes(["posts.comments"]);
    let subject = wizard.build().unwrap();
    assert_eq!(subject.eager_loads(), vec![("posts".to_string(), None)]);
}

#[test]
fn unknown_include_is_rejected() {
    let wizards = wizards();
    let mut wizard = list(&wizards, "User", "include=secrets");
    wizard.allowed_includes(["posts"]);
    match wizard.build() {
        Err(WizardError::InvalidIncludeQuery { unknown, allowed }) => {
            assert_eq!(unknown, vec!["secrets"]);
            assert!(allowed.contains(&"postsCount".to_string()));
        }
        other => panic!("expected invalid include, got {other:?}"),
    }
}

#[test]
fn include_depth_limit() {
    let mut config = WizardConfig::default();
    config.limits.max_include_depth = Some(1);
    let wizards = QueryWizards::new(config, blog::models());

    let mut wizard = list(&wizards, "User", "include=posts.comments");
    wizard.allowed_includes(["posts.comments"]);
    assert!(matches!(
        wizard.build(),
        Err(WizardError::LimitExceeded {
            limit: QueryLimit::IncludeDepth,
            actual: 2,
            max: 1,
        })
    ));
}

#[test]
fn unknown_field_is_reported_by_name() {
    let wizards = wizards();
    let mut wizard = list(&wizards, "Post", "fields[posts]=id,secret");
    wizard.allowed_fields(["id", "title"]);
    match wizard.build() {
        Err(WizardError::InvalidFieldQuery { unknown, allowed }) => {
            assert_eq!(unknown, vec!["secret"]);
            assert_eq!(allowed, vec!["id", "title"]);
        }
        other => panic!("expected invalid field, got {other:?}"),
    }
}

#[test]
fn bare_fields_select_root_columns() {
    let wizards = wizards();
    let mut wizard = list(&wizards, "Post", "fields=id,title");
    wizard.allowed_fields(["id", "title", "body"]);
    let subject = wizard.build().unwrap();
    assert_eq!(subject.selected(), Some(&["id".to_string(), "title".to_string()][..]));
}

#[test]
fn relation_fields_restrict_eager_loads_with_keys() {
    let wizards = wizards();
    let mut wizard = list(
        &wizards,
        "Post",
        "include=author,comments&fields[posts]=title&fields[author]=name&fields[comments]=body",
    );
    wizard
        .allowed_includes(["author", "comments"])
        .allowed_fields(["id", "title", "author.name", "comments.body"]);
    let subject = wizard.build().unwrap();

    assert_eq!(
        subject.eager_loads(),
        vec![
            ("author".to_string(), Some(vec!["name".to_string(), "id".to_string()])),
            ("comments".to_string(), Some(vec!["body".to_string(), "post_id".to_string()])),
        ]
    );
    assert_eq!(
        subject.selected(),
        Some(&["title".to_string(), "user_id".to_string(), "id".to_string()][..])
    );
}

#[test]
fn polymorphic_targets_keep_all_columns() {
    let wizards = wizards();
    let mut wizard = list(&wizards, "Post", "include=images&fields[images]=path");
    wizard
        .allowed_includes(["images"])
        .allowed_fields(["images.path"]);
    let subject = wizard.build().unwrap();
    // images always append `url`, whose accessor may read any column
    assert_eq!(subject.eager_loads(), vec![("images".to_string(), None)]);
}

// ---------------------------------------------------------------------------
// Build lifecycle
// ---------------------------------------------------------------------------

#[test]
fn building_twice_applies_once() {
    let wizards = wizards();
    let mut wizard = list(&wizards, "Post", "filter[title]=x&sort=title&include=author");
    wizard
        .allowed_filters(["title"])
        .allowed_sorts(["title"])
        .allowed_includes(["author"]);
    let first = wizard.build().unwrap().calls().len();
    let second = wizard.build().unwrap().calls().len();
    assert_eq!(first, 3);
    assert_eq!(first, second);
}

#[test]
fn clones_build_independently() {
    let wizards = wizards();
    let mut original = list(&wizards, "Post", "filter[title]=x");
    original.allowed_filters(["title"]);

    let mut copy = original.clone();
    copy.build().unwrap();
    assert_eq!(copy.subject().calls().len(), 1);
    assert!(original.subject().calls().is_empty());

    original.build().unwrap();
    assert_eq!(original.subject().calls().len(), 1);
}

#[test]
fn clone_rules_do_not_leak_into_the_original() {
    let wizards = wizards();
    let mut original = list(&wizards, "Post", "filter[title]=x&filter[status]=draft");
    original.allowed_filters(["title"]);
    let names = |filters: Vec<FilterDefinition>| -> Vec<String> {
        filters.iter().map(|filter| filter.name().to_string()).collect()
    };
    assert_eq!(names(original.effective_filters().unwrap()), vec!["title"]);

    let mut copy = original.clone();
    copy.allowed_filters(["title", "status"]);
    assert_eq!(names(copy.effective_filters().unwrap()), vec!["title", "status"]);
    assert_eq!(copy.build().unwrap().calls().len(), 2);

    assert_eq!(names(original.effective_filters().unwrap()), vec!["title"]);
    assert!(original.subject().calls().is_empty());
    assert!(matches!(
        original.build(),
        Err(WizardError::InvalidFilterQuery { unknown, .. }) if unknown == vec!["status".to_string()]
    ));
    assert!(original.subject().calls().is_empty());
}

#[test]
fn clone_of_a_built_wizard_applies_again() {
    let wizards = wizards();
    let mut original = list(&wizards, "Post", "sort=title");
    original.allowed_sorts(["title"]);
    original.build().unwrap();

    let mut copy = original.clone();
    copy.allowed_sorts(["title", "created_at"]);
    // the copied subject already carries the original's order
    assert_eq!(copy.build().unwrap().orders().len(), 2);
    assert_eq!(original.build().unwrap().orders().len(), 1);
}

#[test]
fn unregistered_model_builds_without_parameters() {
    let wizards = wizards();
    let subject = RecordingSubject::new(Arc::clone(wizards.models()), "Widget")
        .returning(vec![test_record("Widget", json!({"id": 1, "name": "gear"})).build()]);
    let mut wizard = wizards.list(subject, &QueryString::parse("")).unwrap();

    let records = wizard.get().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].borrow().attribute("name"), Some(&json!("gear")));
    assert!(wizard.subject().calls().is_empty());
}

#[test]
fn unregistered_model_needs_a_key_for_fields() {
    let wizards = wizards();
    let mut wizard = list(&wizards, "Widget", "fields=name");
    wizard.allowed_fields(["name"]);
    assert!(matches!(
        wizard.build(),
        Err(WizardError::RootFieldsKeyMissing { model }) if model == "Widget"
    ));
}

#[test]
fn changing_rules_after_build_reresolves_them() {
    let wizards = wizards();
    let mut wizard = list(&wizards, "Post", "filter[title]=x");
    wizard.allowed_filters(["title"]);
    assert_eq!(wizard.effective_filters().unwrap().len(), 1);

    wizard.allowed_filters(["title", "status"]);
    let names: Vec<String> = wizard
        .effective_filters()
        .unwrap()
        .iter()
        .map(|filter| filter.name().to_string())
        .collect();
    assert_eq!(names, vec!["title", "status"]);
}
