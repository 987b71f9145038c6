//! Wizard configuration.
//!
//! Loaded from a TOML file (every section optional, missing keys fall back to
//! defaults) and optionally overridden from environment variables.

use std::env;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Complete wizard configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WizardConfig {
    /// Name of the driver resolved from the driver registry.
    pub driver: DriverName,

    /// Request parameter names.
    pub parameters: ParameterNames,

    /// List separators per parameter type.
    pub separators: Separators,

    /// Suffixes that turn a relation name into an aggregate include.
    pub suffixes: Suffixes,

    /// Convert incoming filter, sort and field names to snake_case.
    pub convert_parameters_to_snake_case: bool,

    /// Eager-load column optimization.
    pub relation_select: RelationSelectMode,

    /// Per-type suppression of invalid-query errors.
    pub exceptions: ExceptionToggles,

    /// Structural limits.
    pub limits: Limits,
}

/// Driver name wrapper so the default lives next to the type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct DriverName(pub String);

impl Default for DriverName {
    fn default() -> Self {
        Self("relational".to_string())
    }
}

impl DriverName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Names of the request parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ParameterNames {
    pub include: String,
    pub filter: String,
    pub sort: String,
    pub fields: String,
    pub append: String,
}

impl Default for ParameterNames {
    fn default() -> Self {
        Self {
            include: "include".to_string(),
            filter: "filter".to_string(),
            sort: "sort".to_string(),
            fields: "fields".to_string(),
            append: "append".to_string(),
        }
    }
}

/// List separators. Filter values are split into arrays on `filter`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Separators {
    pub include: String,
    pub filter: String,
    pub sort: String,
    pub fields: String,
    pub append: String,
}

impl Default for Separators {
    fn default() -> Self {
        Self {
            include: ",".to_string(),
            filter: ",".to_string(),
            sort: ",".to_string(),
            fields: ",".to_string(),
            append: ",".to_string(),
        }
    }
}

/// Aggregate include suffixes (`postsCount`, `postsExists`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Suffixes {
    pub count: String,
    pub exists: String,
}

impl Default for Suffixes {
    fn default() -> Self {
        Self {
            count: "Count".to_string(),
            exists: "Exists".to_string(),
        }
    }
}

/// Relation select optimization mode.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RelationSelectMode {
    /// Compute minimal column lists and inject relation keys.
    #[default]
    Safe,
    /// Pass requested sparse fields through untouched.
    Off,
}

impl std::str::FromStr for RelationSelectMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "safe" => Ok(RelationSelectMode::Safe),
            "off" => Ok(RelationSelectMode::Off),
            other => anyhow::bail!("unknown relation select mode '{other}' (expected safe|off)"),
        }
    }
}

/// When a toggle is `true`, the matching invalid-query error is suppressed
/// and the offending item is dropped instead.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ExceptionToggles {
    pub disable_invalid_filter_query: bool,
    pub disable_invalid_sort_query: bool,
    pub disable_invalid_include_query: bool,
    pub disable_invalid_field_query: bool,
    pub disable_invalid_append_query: bool,
}

/// Structural limits. `None` disables a limit.
///
/// TOML has no null, so a limit is disabled with `false` or `"none"`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Limits {
    #[serde(deserialize_with = "nullable_limit")]
    pub max_include_depth: Option<usize>,
    #[serde(deserialize_with = "nullable_limit")]
    pub max_includes_count: Option<usize>,
    #[serde(deserialize_with = "nullable_limit")]
    pub max_filter_depth: Option<usize>,
    #[serde(deserialize_with = "nullable_limit")]
    pub max_filters_count: Option<usize>,
    #[serde(deserialize_with = "nullable_limit")]
    pub max_sorts_count: Option<usize>,
    #[serde(deserialize_with = "nullable_limit")]
    pub max_appends_count: Option<usize>,
    #[serde(deserialize_with = "nullable_limit")]
    pub max_append_depth: Option<usize>,
}

fn nullable_limit<'de, D>(deserializer: D) -> std::result::Result<Option<usize>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Count(usize),
        Flag(bool),
        Word(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Count(n) => Ok(Some(n)),
        Raw::Flag(false) => Ok(None),
        Raw::Word(w) if matches!(w.as_str(), "none" | "off" | "null") => Ok(None),
        Raw::Flag(true) => Err(serde::de::Error::custom(
            "limit must be a number, false or \"none\"",
        )),
        Raw::Word(w) => Err(serde::de::Error::custom(format!(
            "limit must be a number, false or \"none\", got \"{w}\""
        ))),
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_include_depth: Some(5),
            max_includes_count: Some(10),
            max_filter_depth: Some(5),
            max_filters_count: Some(15),
            max_sorts_count: Some(5),
            max_appends_count: Some(10),
            max_append_depth: Some(5),
        }
    }
}

impl Limits {
    /// Limits with every check disabled.
    pub fn unlimited() -> Self {
        Self {
            max_include_depth: None,
            max_includes_count: None,
            max_filter_depth: None,
            max_filters_count: None,
            max_sorts_count: None,
            max_appends_count: None,
            max_append_depth: None,
        }
    }
}

impl WizardConfig {
    /// Parse configuration from TOML text.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source).context("failed to parse wizard configuration")
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read wizard configuration {}", path.display()))?;
        Self::from_toml_str(&source)
    }

    /// Apply environment overrides on top of the loaded values.
    ///
    /// - `QUARRY_DRIVER`: driver name
    /// - `QUARRY_RELATION_SELECT`: `safe` or `off`
    /// - `QUARRY_SNAKE_CASE`: `true`/`false`
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(driver) = env::var("QUARRY_DRIVER") {
            self.driver = DriverName(driver);
        }

        if let Ok(mode) = env::var("QUARRY_RELATION_SELECT") {
            self.relation_select = mode
                .parse()
                .context("QUARRY_RELATION_SELECT must be 'safe' or 'off'")?;
        }

        if let Ok(flag) = env::var("QUARRY_SNAKE_CASE") {
            self.convert_parameters_to_snake_case = flag
                .parse()
                .context("QUARRY_SNAKE_CASE must be 'true' or 'false'")?;
        }

        Ok(self)
    }
}
