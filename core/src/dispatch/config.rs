use serde::Deserialize;
use thiserror::Error;

use super::patterns::PatternCache;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid dot config: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("dot config names no operation")]
    MissingOperation,

    #[error("dot config names more than one operation")]
    MultipleOperations,

    #[error("invalid filter pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },
}

/// The operation a dot performs on every request passing through it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DotConfig {
    Query(QuerySet),
    Construct(ConstructSet),
    Destroy(DestroySet),
}

/// Parameters read from a request and written as one row.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuerySet {
    pub q: Vec<QueryParam>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryParam {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: ParamKind,
    #[serde(default)]
    pub filter: Option<Filter>,
    #[serde(default)]
    pub cdest: Option<Destination>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    Required,
    #[default]
    Optional,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Filter {
    #[serde(rename = "type")]
    pub kind: FilterKind,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum FilterKind {
    /// The parameter value must match the regular expression, if present.
    #[serde(rename = "regex.gate")]
    RegexGate,
}

/// Table and data source a parameter is written to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Destination {
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub ds: Option<String>,
}

/// A table to create, from `name`/`type` field definitions.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConstructSet {
    pub d: Vec<FieldDefinition>,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub ds: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldDefinition {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// Reserved for table teardown. Accepts any settings and does nothing yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DestroySet {}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigDocument {
    dot: Operations,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Operations {
    #[serde(default)]
    query: Option<QuerySet>,
    #[serde(default)]
    construct: Option<ConstructSet>,
    #[serde(default)]
    destroy: Option<DestroySet>,
}

impl DotConfig {
    /// Parses the JSON configuration stored as a dot's value.
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        let document: ConfigDocument = serde_json::from_str(value)?;
        let Operations {
            query,
            construct,
            destroy,
        } = document.dot;

        match (query, construct, destroy) {
            (Some(query), None, None) => Ok(DotConfig::Query(query)),
            (None, Some(construct), None) => Ok(DotConfig::Construct(construct)),
            (None, None, Some(destroy)) => Ok(DotConfig::Destroy(destroy)),
            (None, None, None) => Err(ConfigError::MissingOperation),
            _ => Err(ConfigError::MultipleOperations),
        }
    }

    /// Compiles every filter pattern this config refers to into `cache`.
    pub fn compile_patterns(&self, cache: &mut PatternCache) -> Result<(), ConfigError> {
        let DotConfig::Query(query) = self else {
            return Ok(());
        };
        for filter in query.q.iter().filter_map(|p| p.filter.as_ref()) {
            cache
                .compile(&filter.value)
                .map_err(|source| ConfigError::InvalidPattern {
                    pattern: filter.value.clone(),
                    source,
                })?;
        }
        Ok(())
    }
}
