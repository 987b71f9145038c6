#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Custom strategies, capability gating and definition modifiers.

use std::sync::Arc;

use quarry::config::DriverName;
use quarry::definitions::{FilterDefinition, SortDefinition};
use quarry::driver::{Capability, FilterStrategy, StrategyContext};
use quarry::subject::{Comparison, SortDirection, Subject};
use quarry::{
    Driver, ListQueryWizard, QueryString, QueryWizards, RelationalDriver, WizardConfig, WizardError, WizardResult,
};
use quarry_test_utils::{Call, RecordingSubject, assert, blog, init_tracing};
use serde_json::{Value, json};

/// Compares the lowercased city name.
struct NearFilter;

impl FilterStrategy for NearFilter {
    fn apply(
        &self,
        _ctx: &StrategyContext<'_>,
        subject: &mut dyn Subject,
        filter: &FilterDefinition,
        value: &Value,
    ) -> WizardResult<()> {
        let city = value.as_str().unwrap_or_default().to_lowercase();
        let column = subject.qualify_column(filter.property());
        subject.where_compare(&column, Comparison::Eq, json!(city));
        Ok(())
    }
}

fn wizards_with(driver: RelationalDriver) -> QueryWizards {
    init_tracing();
    let mut config = WizardConfig::default();
    config.driver = DriverName(driver.name().to_string());
    QueryWizards::new(config, blog::models()).with_driver(Arc::new(driver))
}

fn list(wizards: &QueryWizards, query: &str) -> ListQueryWizard<RecordingSubject> {
    let subject = RecordingSubject::new(Arc::clone(wizards.models()), "Post");
    wizards.list(subject, &QueryString::parse(query)).unwrap()
}

fn city(value: &str) -> Call {
    Call::Compare {
        column: "posts.city".to_string(),
        op: Comparison::Eq,
        value: json!(value),
    }
}

#[test]
fn extension_strategy_registered_on_a_driver() {
    let driver = RelationalDriver::new()
        .named("geo")
        .register_filter_strategy("near", Arc::new(NearFilter));
    let wizards = wizards_with(driver);

    let mut wizard = list(&wizards, "filter[city]=Berlin");
    wizard.allowed_filters([FilterDefinition::extension("city", "near")]);
    assert::called(wizard.build().unwrap(), &city("berlin"));
}

#[test]
fn extension_without_strategy_is_unsupported() {
    let wizards = wizards_with(RelationalDriver::new());
    let mut wizard = list(&wizards, "filter[city]=Berlin");
    wizard.allowed_filters([FilterDefinition::extension("city", "near")]);
    match wizard.build() {
        Err(WizardError::UnsupportedType {
            driver,
            category,
            type_name,
        }) => {
            assert_eq!(driver, "relational");
            assert_eq!(category, "filter");
            assert_eq!(type_name, "near");
        }
        other => panic!("expected unsupported type, got {other:?}"),
    }
}

#[test]
fn custom_factory_needs_no_registration() {
    let wizards = wizards_with(RelationalDriver::new());
    let mut wizard = list(&wizards, "filter[city]=Paris");
    wizard.allowed_filters([FilterDefinition::custom("city", || Box::new(NearFilter))]);
    assert::called(wizard.build().unwrap(), &city("paris"));
}

#[test]
fn missing_capability_skips_the_phase() {
    let driver = RelationalDriver::new()
        .named("flat")
        .without(Capability::Sorts)
        .without(Capability::Fields);
    let wizards = wizards_with(driver);

    let mut wizard = list(&wizards, "sort=anything&fields=secret&filter[title]=x");
    wizard.allowed_filters(["title"]);
    let subject = wizard.build().unwrap();
    assert!(subject.orders().is_empty());
    assert!(subject.selected().is_none());
    assert_eq!(subject.calls().len(), 1);
}

#[test]
fn callback_filter_and_sort() {
    let wizards = wizards_with(RelationalDriver::new());
    let mut wizard = list(&wizards, "filter[mine]=7&sort=-popularity");
    wizard
        .allowed_filters([FilterDefinition::callback("mine", |subject, value, _| {
            let column = subject.qualify_column("user_id");
            subject.where_compare(&column, Comparison::Eq, value.clone());
            Ok(())
        })])
        .allowed_sorts([SortDefinition::callback("popularity", |subject, direction, _| {
            subject.order_by("views", direction);
            Ok(())
        })]);

    let subject = wizard.build().unwrap();
    assert::called(
        subject,
        &Call::Compare {
            column: "posts.user_id".to_string(),
            op: Comparison::Eq,
            value: json!("7"),
        },
    );
    assert_eq!(subject.orders(), vec![("views".to_string(), SortDirection::Desc)]);
}

#[test]
fn value_preparation_and_gates() {
    let wizards = wizards_with(RelationalDriver::new());
    let mut wizard = list(&wizards, "filter[status]=DRAFT&filter[category]=all");
    wizard.allowed_filters([
        FilterDefinition::exact("status")
            .prepare_value_with(|value| json!(value.as_str().unwrap_or_default().to_lowercase())),
        FilterDefinition::exact("category").when(|value| value != "all"),
    ]);

    let subject = wizard.build().unwrap();
    assert_eq!(
        subject.calls(),
        &[Call::Compare {
            column: "posts.status".to_string(),
            op: Comparison::Eq,
            value: json!("draft"),
        }]
    );
}

#[test]
fn unparsable_date_bound_is_rejected() {
    let wizards = wizards_with(RelationalDriver::new());
    let mut wizard = list(&wizards, "filter[published][from]=soon");
    wizard.allowed_filters([FilterDefinition::date_range("published_at")
        .alias("published")
        .date_format("%Y-%m-%d")]);
    assert!(matches!(
        wizard.build(),
        Err(WizardError::InvalidFilterValue { filter, value }) if filter == "published" && value == "soon"
    ));
}

#[test]
fn date_bounds_are_reformatted() {
    let wizards = wizards_with(RelationalDriver::new());
    let mut wizard = list(&wizards, "filter[published][from]=2024-03-01T10:00:00Z");
    wizard.allowed_filters([FilterDefinition::date_range("published_at")
        .alias("published")
        .date_format("%Y-%m-%d")]);
    let subject = wizard.build().unwrap();
    assert::called(
        subject,
        &Call::Compare {
            column: "posts.published_at".to_string(),
            op: Comparison::Gte,
            value: json!("2024-03-01"),
        },
    );
}
