//! Wizard error types.
//!
//! Validation failures carry the rejected names together with the allowed
//! set so they can be serialized straight into an API error body.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Structural limit that a request exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryLimit {
    FiltersCount,
    FilterDepth,
    SortsCount,
    IncludesCount,
    IncludeDepth,
    AppendsCount,
    AppendDepth,
}

impl QueryLimit {
    /// Configuration key of the limit.
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryLimit::FiltersCount => "max_filters_count",
            QueryLimit::FilterDepth => "max_filter_depth",
            QueryLimit::SortsCount => "max_sorts_count",
            QueryLimit::IncludesCount => "max_includes_count",
            QueryLimit::IncludeDepth => "max_include_depth",
            QueryLimit::AppendsCount => "max_appends_count",
            QueryLimit::AppendDepth => "max_append_depth",
        }
    }
}

impl std::fmt::Display for QueryLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while validating and applying query parameters.
#[derive(Debug, Error)]
pub enum WizardError {
    /// Requested filters are not in the effective allowed set.
    #[error("requested filter(s) `{}` are not allowed. Allowed filter(s) are `{}`", .unknown.join(", "), .allowed.join(", "))]
    InvalidFilterQuery {
        unknown: Vec<String>,
        allowed: Vec<String>,
    },

    /// Requested sorts are not in the effective allowed set.
    #[error("requested sort(s) `{}` are not allowed. Allowed sort(s) are `{}`", .unknown.join(", "), .allowed.join(", "))]
    InvalidSortQuery {
        unknown: Vec<String>,
        allowed: Vec<String>,
    },

    /// Requested includes are not in the effective allowed set.
    #[error("requested include(s) `{}` are not allowed. Allowed include(s) are `{}`", .unknown.join(", "), .allowed.join(", "))]
    InvalidIncludeQuery {
        unknown: Vec<String>,
        allowed: Vec<String>,
    },

    /// Requested sparse fields are not in the effective allowed set.
    #[error("requested field(s) `{}` are not allowed. Allowed field(s) are `{}`", .unknown.join(", "), .allowed.join(", "))]
    InvalidFieldQuery {
        unknown: Vec<String>,
        allowed: Vec<String>,
    },

    /// Requested appends are not in the effective allowed set.
    #[error("requested append(s) `{}` are not allowed. Allowed append(s) are `{}`", .unknown.join(", "), .allowed.join(", "))]
    InvalidAppendQuery {
        unknown: Vec<String>,
        allowed: Vec<String>,
    },

    /// A structural limit was exceeded. Never suppressible.
    #[error("query limit `{limit}` exceeded: {actual} requested, maximum is {max}")]
    LimitExceeded {
        limit: QueryLimit,
        actual: usize,
        max: usize,
    },

    /// A filter value could not be resolved (e.g. a scope binding failed).
    #[error("invalid value `{value}` for filter `{filter}`")]
    InvalidFilterValue { filter: String, value: String },

    /// No fields key can be derived for the primary resource.
    #[error("root fields key is not defined for model `{model}`")]
    RootFieldsKeyMissing { model: String },

    /// The subject's model is not registered.
    #[error("model `{0}` is not registered")]
    UnknownModel(String),

    /// A relation name does not exist on the model.
    #[error("model `{model}` has no relation `{relation}`")]
    UnknownRelation { model: String, relation: String },

    /// A scope filter names a scope the model does not declare.
    #[error("model `{model}` has no scope `{scope}`")]
    UnknownScope { model: String, scope: String },

    /// No driver registered under the configured name.
    #[error("driver `{0}` is not registered")]
    UnknownDriver(String),

    /// The driver has no strategy for a definition type.
    #[error("driver `{driver}` has no {category} strategy for type `{type_name}`")]
    UnsupportedType {
        driver: String,
        category: &'static str,
        type_name: String,
    },

    /// A capability was requested on a driver that lacks it.
    #[error("driver `{driver}` does not support {capability}")]
    UnsupportedCapability {
        driver: String,
        capability: &'static str,
    },

    /// A strategy received a definition of the wrong kind.
    #[error("{category} strategy `{strategy}` cannot apply definition `{name}`")]
    StrategyMismatch {
        category: &'static str,
        strategy: String,
        name: String,
    },

    /// A definition was declared without a target property or relation.
    #[error("{category} definition has an empty target")]
    EmptyDefinition { category: &'static str },

    /// The subject cannot perform the requested operation.
    #[error("subject error: {0}")]
    Subject(String),
}

impl WizardError {
    /// HTTP status the error maps to.
    ///
    /// Invalid queries, limits and bad values are client errors; everything
    /// else is a configuration or programming error.
    pub fn status(&self) -> StatusCode {
        if self.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }

    /// Whether the error was caused by the request rather than the setup.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            WizardError::InvalidFilterQuery { .. }
                | WizardError::InvalidSortQuery { .. }
                | WizardError::InvalidIncludeQuery { .. }
                | WizardError::InvalidFieldQuery { .. }
                | WizardError::InvalidAppendQuery { .. }
                | WizardError::LimitExceeded { .. }
                | WizardError::InvalidFilterValue { .. }
        )
    }

    /// JSON body suitable for an API error response.
    pub fn to_body(&self) -> serde_json::Value {
        match self {
            WizardError::InvalidFilterQuery { unknown, allowed }
            | WizardError::InvalidSortQuery { unknown, allowed }
            | WizardError::InvalidIncludeQuery { unknown, allowed }
            | WizardError::InvalidFieldQuery { unknown, allowed }
            | WizardError::InvalidAppendQuery { unknown, allowed } => json!({
                "message": self.to_string(),
                "unknown": unknown,
                "allowed": allowed,
            }),
            WizardError::LimitExceeded { limit, actual, max } => json!({
                "message": self.to_string(),
                "limit": limit.as_str(),
                "actual": actual,
                "max": max,
            }),
            WizardError::InvalidFilterValue { filter, value } => json!({
                "message": self.to_string(),
                "filter": filter,
                "value": value,
            }),
            _ => json!({ "message": "internal server error" }),
        }
    }
}

impl IntoResponse for WizardError {
    fn into_response(self) -> Response {
        if !self.is_client_error() {
            tracing::error!(error = %self, "query wizard misconfiguration");
        }
        (self.status(), Json(self.to_body())).into_response()
    }
}

/// Result type alias using WizardError.
pub type WizardResult<T> = Result<T, WizardError>;
