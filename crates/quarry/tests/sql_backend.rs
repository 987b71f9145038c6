#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Wizards driving the SeaQuery subject.

use std::sync::Arc;

use quarry::definitions::{FilterDefinition, Rule, SortDefinition};
use quarry::{QueryString, QueryWizards, SqlSubject, WizardConfig};
use quarry_test_utils::{assert, blog, init_tracing};

fn wizards() -> QueryWizards {
    init_tracing();
    QueryWizards::new(WizardConfig::default(), blog::models())
}

fn posts(wizards: &QueryWizards) -> SqlSubject {
    SqlSubject::new(Arc::clone(wizards.models()), "Post").unwrap()
}

#[test]
fn filters_sorts_and_fields_render_one_statement() {
    let wizards = wizards();
    let query = QueryString::parse("filter[status]=draft&filter[title]=rust&sort=-created_at&fields[posts]=id,title");
    let mut wizard = wizards.list(posts(&wizards), &query).unwrap();
    wizard
        .allowed_filters([Rule::from("status"), FilterDefinition::partial("title").into()])
        .allowed_sorts(["created_at"])
        .allowed_fields(["id", "title"]);

    let sql = wizard.build().unwrap().to_sql();
    assert::contains(&sql, r#"SELECT "posts"."id", "posts"."title" FROM "posts""#);
    assert::contains(&sql, r#""posts"."status" = 'draft'"#);
    assert::contains(&sql, "LIKE");
    assert::contains(&sql, r#"ORDER BY "posts"."created_at" DESC"#);
}

#[test]
fn relation_filter_renders_exists() {
    let wizards = wizards();
    let query = QueryString::parse("filter[author][name]=ada");
    let mut wizard = wizards.list(posts(&wizards), &query).unwrap();
    wizard.allowed_filters(["author.name"]);

    let sql = wizard.build().unwrap().to_sql();
    assert::contains(&sql, r#"EXISTS (SELECT 1 FROM "users""#);
    assert::contains(&sql, r#""users"."name" = 'ada'"#);
}

#[test]
fn count_sort_orders_by_alias() {
    let wizards = wizards();
    let users = SqlSubject::new(Arc::clone(wizards.models()), "User").unwrap();
    let mut wizard = wizards.list(users, &QueryString::parse("sort=-posts_count")).unwrap();
    wizard.allowed_sorts([SortDefinition::count("posts")]);

    let sql = wizard.build().unwrap().to_sql();
    assert::contains(&sql, r#"AS "posts_count""#);
    assert::contains(&sql, r#"ORDER BY "posts_count" DESC"#);
}

#[test]
fn eager_loads_carry_planned_columns() {
    let wizards = wizards();
    let query = QueryString::parse("include=author&fields[posts]=title&fields[author]=name");
    let mut wizard = wizards.list(posts(&wizards), &query).unwrap();
    wizard
        .allowed_includes(["author"])
        .allowed_fields(["title", "author.name"]);

    let subject = wizard.build().unwrap();
    assert::contains(
        &subject.to_sql(),
        r#"SELECT "posts"."title", "posts"."user_id" FROM "posts""#,
    );
    let eager = subject.eager_sql("author").unwrap();
    assert::contains(&eager, r#"SELECT "users"."name", "users"."id" FROM "users""#);
    assert::contains(&eager, r#""users"."deleted_at" IS NULL"#);
}

#[test]
fn safe_select_can_be_turned_off() {
    let mut config = WizardConfig::default();
    config.relation_select = quarry::RelationSelectMode::Off;
    let wizards = QueryWizards::new(config, blog::models());

    let query = QueryString::parse("include=author&fields[posts]=title&fields[author]=name");
    let mut wizard = wizards.list(posts(&wizards), &query).unwrap();
    wizard
        .allowed_includes(["author"])
        .allowed_fields(["title", "author.name"]);

    let subject = wizard.build().unwrap();
    assert_eq!(
        subject.eager_loads().get("author"),
        Some(&Some(vec!["name".to_string()]))
    );
    assert::contains(&subject.to_sql(), r#"SELECT "posts"."title" FROM "posts""#);
}
