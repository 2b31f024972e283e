//! Configuration File Tests
//!
//! Tests for file-backed configuration:
//! - A saved configuration loads back unchanged
//! - Loading validates before returning
//! - A loaded configuration drives the rewrite passes

use chrono::{TimeZone, Utc};
use shardquery::ast::parse;
use shardquery::composite::{fold, Alphabet, CompositeMapping};
use shardquery::config::{ConfigError, QueryConfig};
use shardquery::errors::Severity;
use shardquery::plan::{PlanOptions, TimeFilter};
use std::fs;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn write_config(dir: &TempDir, json: &str) -> std::path::PathBuf {
    let path = dir.path().join("query.json");
    fs::write(&path, json).unwrap();
    path
}

// =============================================================================
// Round Trip
// =============================================================================

#[test]
fn test_saved_config_loads_unchanged() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("saved.json");

    let config = QueryConfig::new()
        .with_max_terms_to_print(7)
        .with_lenient_fields(["NAME"])
        .with_composite(CompositeMapping::new("GEO", ["GEO", "WKT_BYTE_LENGTH"]).with_separator(','))
        .with_fixed_length_field("GEO", Alphabet::Hex)
        .with_date_range(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
        )
        .with_term_frequency_fields(["BODY"]);
    config.write_to_file(&path).unwrap();

    let loaded = QueryConfig::read_from_file(&path).unwrap();
    assert_eq!(loaded, config);
}

// =============================================================================
// Validation on Load
// =============================================================================

#[test]
fn test_missing_file_is_io_error() {
    let dir = TempDir::new().unwrap();
    let err = QueryConfig::read_from_file(&dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
    assert_eq!(err.code(), "SHARDQUERY_CONFIG_IO");
    assert_eq!(err.severity(), Severity::Reject);
}

#[test]
fn test_inconsistent_file_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"{ "lenient_fields": ["NUM"], "strict_fields": ["NUM"] }"#,
    );
    let err = QueryConfig::read_from_file(&path).unwrap_err();
    assert_eq!(err.code(), "SHARDQUERY_CONFIG_INVALID");
}

#[test]
fn test_malformed_file_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, r#"{ "composites": "GEO" }"#);
    let err = QueryConfig::read_from_file(&path).unwrap_err();
    assert_eq!(err.code(), "SHARDQUERY_CONFIG_JSON");
}

// =============================================================================
// Loaded Configuration Drives Passes
// =============================================================================

#[test]
fn test_loaded_composites_fold() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"{
            "composites": [{ "name": "COLOR_WHEELS", "components": ["COLOR", "WHEELS"], "separator": "," }]
        }"#,
    );
    let config = QueryConfig::read_from_file(&path).unwrap();
    let folded = fold(&parse("COLOR == 'red' && WHEELS == '4'").unwrap(), &config);
    assert_eq!(folded.to_query(), "COLOR_WHEELS == 'red,4'");
}

#[test]
fn test_loaded_dates_become_time_filter() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"{
            "begin_date": "2024-01-01T00:00:00Z",
            "end_date": "2024-01-02T00:00:00Z",
            "aggregation_fields": ["NAME"]
        }"#,
    );
    let config = QueryConfig::read_from_file(&path).unwrap();
    let options = PlanOptions::from_config(&config);

    let begin = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap().timestamp_millis();
    let end = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap().timestamp_millis();
    assert_eq!(options.time_filter, Some(TimeFilter::new(begin, end)));
    assert!(options.aggregation_fields.contains("NAME"));
}
