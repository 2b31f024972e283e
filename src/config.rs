//! Query configuration
//!
//! Every knob the passes consume, loadable from JSON:
//!
//! ```json
//! {
//!   "max_terms_to_print": 3,
//!   "strict_fields": ["NUM"],
//!   "composites": [{ "name": "GEO", "components": ["GEO", "WKT"], "separator": "," }],
//!   "fixed_length_fields": { "GEO": "hex" }
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::composite::{Alphabet, CompositeMapping};
use crate::errors::Severity;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid configuration JSON: {0}")]
    Json(String),

    #[error("Failed to access configuration file: {0}")]
    Io(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::Json(_) => "SHARDQUERY_CONFIG_JSON",
            ConfigError::Io(_) => "SHARDQUERY_CONFIG_IO",
            ConfigError::Invalid(_) => "SHARDQUERY_CONFIG_INVALID",
        }
    }

    pub fn severity(&self) -> Severity {
        Severity::Reject
    }
}

fn default_max_terms_to_print() -> usize {
    3
}

/// Configuration shared by the rewrite and compile passes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Contributing terms printed per state in classification summaries
    #[serde(default = "default_max_terms_to_print")]
    pub max_terms_to_print: usize,
    /// Fields whose failed normalization keeps the original clause
    pub lenient_fields: BTreeSet<String>,
    /// Fields whose failed normalization demotes the clause to evaluation
    pub strict_fields: BTreeSet<String>,
    pub composites: Vec<CompositeMapping>,
    /// Fixed-length fields and their value alphabets
    pub fixed_length_fields: BTreeMap<String, Alphabet>,
    pub begin_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub index_only_fields: BTreeSet<String>,
    pub term_frequency_fields: BTreeSet<String>,
    pub aggregation_fields: BTreeSet<String>,
    /// Datatypes the query is restricted to, empty for all
    pub datatype_filter: BTreeSet<String>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_terms_to_print: default_max_terms_to_print(),
            lenient_fields: BTreeSet::new(),
            strict_fields: BTreeSet::new(),
            composites: Vec::new(),
            fixed_length_fields: BTreeMap::new(),
            begin_date: None,
            end_date: None,
            index_only_fields: BTreeSet::new(),
            term_frequency_fields: BTreeSet::new(),
            aggregation_fields: BTreeSet::new(),
            datatype_filter: BTreeSet::new(),
        }
    }
}

fn to_set<I, S>(fields: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    fields.into_iter().map(Into::into).collect()
}

impl QueryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_terms_to_print(mut self, max: usize) -> Self {
        self.max_terms_to_print = max;
        self
    }

    pub fn with_lenient_fields<I: IntoIterator<Item = S>, S: Into<String>>(mut self, fields: I) -> Self {
        self.lenient_fields = to_set(fields);
        self
    }

    pub fn with_strict_fields<I: IntoIterator<Item = S>, S: Into<String>>(mut self, fields: I) -> Self {
        self.strict_fields = to_set(fields);
        self
    }

    pub fn with_composite(mut self, mapping: CompositeMapping) -> Self {
        self.composites.push(mapping);
        self
    }

    pub fn with_fixed_length_field(mut self, field: impl Into<String>, alphabet: Alphabet) -> Self {
        self.fixed_length_fields.insert(field.into(), alphabet);
        self
    }

    pub fn with_date_range(mut self, begin: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.begin_date = Some(begin);
        self.end_date = Some(end);
        self
    }

    pub fn with_index_only_fields<I: IntoIterator<Item = S>, S: Into<String>>(mut self, fields: I) -> Self {
        self.index_only_fields = to_set(fields);
        self
    }

    pub fn with_term_frequency_fields<I: IntoIterator<Item = S>, S: Into<String>>(
        mut self,
        fields: I,
    ) -> Self {
        self.term_frequency_fields = to_set(fields);
        self
    }

    pub fn with_aggregation_fields<I: IntoIterator<Item = S>, S: Into<String>>(mut self, fields: I) -> Self {
        self.aggregation_fields = to_set(fields);
        self
    }

    pub fn with_datatype_filter<I: IntoIterator<Item = S>, S: Into<String>>(mut self, datatypes: I) -> Self {
        self.datatype_filter = to_set(datatypes);
        self
    }

    pub fn is_lenient(&self, field: &str) -> bool {
        self.lenient_fields.contains(field)
    }

    pub fn is_strict(&self, field: &str) -> bool {
        self.strict_fields.contains(field)
    }

    /// Alphabet of a fixed-length field
    pub fn alphabet(&self, field: &str) -> Option<Alphabet> {
        self.fixed_length_fields.get(field).copied()
    }

    /// Checks cross-field consistency
    pub fn validate(&self) -> ConfigResult<()> {
        if let (Some(begin), Some(end)) = (self.begin_date, self.end_date) {
            if begin > end {
                return Err(ConfigError::Invalid(format!(
                    "begin date {} is after end date {}",
                    begin, end
                )));
            }
        }

        if let Some(field) = self.lenient_fields.intersection(&self.strict_fields).next() {
            return Err(ConfigError::Invalid(format!(
                "field '{}' cannot be both lenient and strict",
                field
            )));
        }

        let mut names = BTreeSet::new();
        for mapping in &self.composites {
            if mapping.components.len() < 2 {
                return Err(ConfigError::Invalid(format!(
                    "composite '{}' needs at least two components",
                    mapping.name
                )));
            }
            if !names.insert(mapping.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "composite '{}' is defined more than once",
                    mapping.name
                )));
            }
            let distinct: BTreeSet<&String> = mapping.components.iter().collect();
            if distinct.len() != mapping.components.len() {
                return Err(ConfigError::Invalid(format!(
                    "composite '{}' repeats a component",
                    mapping.name
                )));
            }
        }

        Ok(())
    }

    pub fn to_json(&self) -> ConfigResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Json(e.to_string()))
    }

    /// Parses and validates a configuration
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: QueryConfig = serde_json::from_str(json).map_err(|e| ConfigError::Json(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn write_to_file(&self, path: &Path) -> ConfigResult<()> {
        let json = self.to_json()?;
        fs::write(path, json).map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))
    }

    /// Reads, parses and validates a configuration file
    pub fn read_from_file(path: &Path) -> ConfigResult<Self> {
        let json =
            fs::read_to_string(path).map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_default_config() {
        let config = QueryConfig::default();
        assert_eq!(config.max_terms_to_print, 3);
        assert!(config.composites.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_partial() {
        let config = QueryConfig::from_json(
            r#"{
                "strict_fields": ["NUM"],
                "composites": [{ "name": "GEO", "components": ["GEO", "WKT"], "separator": "," }],
                "fixed_length_fields": { "GEO": "hex" }
            }"#,
        )
        .unwrap();
        assert_eq!(config.max_terms_to_print, 3);
        assert!(config.is_strict("NUM"));
        assert_eq!(config.composites[0].separator, ',');
        assert_eq!(config.alphabet("GEO"), Some(Alphabet::Hex));
    }

    #[test]
    fn test_default_separator_from_json() {
        let config =
            QueryConfig::from_json(r#"{ "composites": [{ "name": "C", "components": ["A", "B"] }] }"#).unwrap();
        assert_eq!(config.composites[0].separator, crate::composite::DEFAULT_SEPARATOR);
    }

    #[test]
    fn test_invalid_json() {
        let err = QueryConfig::from_json("{ not json").unwrap_err();
        assert_eq!(err.code(), "SHARDQUERY_CONFIG_JSON");
    }

    #[test]
    fn test_validate_dates() {
        let begin = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let config = QueryConfig::new().with_date_range(begin, end);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_lenient_and_strict() {
        let config = QueryConfig::new()
            .with_lenient_fields(["A"])
            .with_strict_fields(["A"]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_composites() {
        let single = QueryConfig::new().with_composite(CompositeMapping::new("C", ["A"]));
        assert!(single.validate().is_err());

        let dup = QueryConfig::new()
            .with_composite(CompositeMapping::new("C", ["A", "B"]))
            .with_composite(CompositeMapping::new("C", ["A", "D"]));
        assert!(dup.validate().is_err());

        let repeated = QueryConfig::new().with_composite(CompositeMapping::new("C", ["A", "A"]));
        assert!(repeated.validate().is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let config = QueryConfig::new()
            .with_max_terms_to_print(5)
            .with_composite(CompositeMapping::new("C", ["A", "B"]).with_separator(','))
            .with_fixed_length_field("A", Alphabet::Decimal);
        let json = config.to_json().unwrap();
        assert_eq!(QueryConfig::from_json(&json).unwrap(), config);
    }
}
