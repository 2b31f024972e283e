//! Query Pipeline Tests
//!
//! Runs every pass in order over realistic queries:
//! - normalization expansion feeds composite folding
//! - classification decides whether the rewritten tree is index-resolvable
//! - the plan compiled from it matches the right records

use chrono::{TimeZone, Utc};
use shardquery::ast::{parse, ExprNode};
use shardquery::composite::{fold, Alphabet, CompositeMapping};
use shardquery::config::QueryConfig;
use shardquery::executable::{classify, push_down, ClassificationMode, ExecutabilityState};
use shardquery::metadata::{FieldMetadata, LowerCaseNormalizer, MetadataSnapshot, NoOpNormalizer, NumberNormalizer};
use shardquery::normalize::expand;
use shardquery::plan::{compile, InMemorySource, Plan, PlanError, PlanOptions, RecordRange};

// =============================================================================
// Helper Functions
// =============================================================================

fn metadata() -> MetadataSnapshot {
    MetadataSnapshot::new()
        .with_field("NAME", FieldMetadata::indexed().with_normalizer(LowerCaseNormalizer))
        .with_field("AGE", FieldMetadata::indexed().with_normalizer(NumberNormalizer))
        .with_field("CITY", FieldMetadata::indexed().with_normalizer(NoOpNormalizer))
        .with_field("COLOR", FieldMetadata::indexed().with_normalizer(LowerCaseNormalizer))
        .with_field("WHEELS", FieldMetadata::indexed().with_normalizer(NumberNormalizer))
        .with_field("NOTES", FieldMetadata::unindexed())
}

fn alice() -> RecordRange {
    RecordRange::new("20240101_0", "person", "uid.alice")
}

fn bob() -> RecordRange {
    RecordRange::new("20240101_0", "person", "uid.bob")
}

fn people() -> InMemorySource {
    InMemorySource::builder()
        .field_index(&alice(), "NAME", "alice", 10)
        .field_index(&alice(), "AGE", "+bE3.1", 10)
        .field_index(&alice(), "CITY", "london", 10)
        .field_index(&bob(), "NAME", "bob", 10)
        .field_index(&bob(), "AGE", "+bE5.5", 10)
        .field_index(&bob(), "CITY", "paris", 10)
        .build()
}

/// Expands then folds, the order the rewrite passes run in
fn rewrite(query: &str, config: &QueryConfig) -> ExprNode {
    let tree = parse(query).unwrap();
    let expanded = expand(&tree, &metadata(), config);
    fold(&expanded, config)
}

fn matches(tree: &ExprNode, record: &RecordRange, options: &PlanOptions, source: &InMemorySource) -> bool {
    compile(tree, record, options, source).unwrap().evaluate().matched
}

// =============================================================================
// Normalize, Classify, Compile
// =============================================================================

#[test]
fn test_normalized_literals_reach_the_index() {
    let config = QueryConfig::default();
    let tree = rewrite("NAME == 'Bob' && AGE == '55'", &config);
    assert_eq!(tree.to_query(), "NAME == 'bob' && AGE == '+bE5.5'");

    let options = PlanOptions::from_config(&config);
    assert!(matches(&tree, &bob(), &options, &people()));
    assert!(!matches(&tree, &alice(), &options, &people()));
}

#[test]
fn test_negation_anchored_by_positive_term() {
    let config = QueryConfig::default();
    let tree = rewrite("AGE == '55' && CITY != 'london'", &config);

    let global = classify(&tree, &metadata(), &config, ClassificationMode::Global);
    assert_eq!(global.state, ExecutabilityState::Executable);

    let options = PlanOptions::from_config(&config);
    let plan = compile(&tree, &bob(), &options, &people()).unwrap();
    assert_eq!(plan.to_string(), "Intersect(Leaf(AGE == '+bE5.5'), Negated(Leaf(CITY == 'london')))");
    assert!(matches(&tree, &bob(), &options, &people()));
}

#[test]
fn test_unindexed_disjunct_is_partial_and_unanchored() {
    let config = QueryConfig::default();
    let tree = rewrite("NAME == 'alice' || NOTES == 'vip'", &config);

    let report = classify(&tree, &metadata(), &config, ClassificationMode::Global);
    assert_eq!(report.state, ExecutabilityState::Partial);
    assert_eq!(report.summary, "Summary: NON_EXECUTABLE:[NOTES == 'vip']");

    let options = PlanOptions::from_config(&config).with_indexed_fields(["NAME", "AGE", "CITY"]);
    let err = compile(&tree, &alice(), &options, &people()).unwrap_err();
    assert!(matches!(err, PlanError::Unanchored { .. }));
}

#[test]
fn test_field_index_mode_resolves_negated_disjunct() {
    let config = QueryConfig::default();
    let tree = rewrite("NAME == 'alice' || CITY != 'paris'", &config);

    assert_eq!(
        classify(&tree, &metadata(), &config, ClassificationMode::Global).state,
        ExecutabilityState::Partial
    );
    assert_eq!(
        classify(&tree, &metadata(), &config, ClassificationMode::FieldIndex).state,
        ExecutabilityState::NegatedExecutable
    );
}

#[test]
fn test_dropped_clause_is_false_with_reason() {
    let config = QueryConfig::default();
    let tree = rewrite("AGE == 'old' || NAME == 'Alice'", &config);
    let query = tree.to_query();
    assert!(query.starts_with("((_Drop_ = "), "{}", query);
    assert!(query.contains("NAME == 'alice'"));

    let options = PlanOptions::from_config(&config);
    let mut plan = compile(&tree, &alice(), &options, &people()).unwrap();
    match &plan {
        Plan::Union(children) => {
            assert!(matches!(&children[0], Plan::Dropped { reason } if reason.contains("AGE")));
        }
        other => panic!("expected union, got {}", other),
    }
    assert!(plan.evaluate().matched);

    let drop_only = rewrite("AGE == 'old' && NAME == 'bob'", &config);
    assert!(!matches(&drop_only, &bob(), &options, &people()));
}

#[test]
fn test_strict_field_demotes_to_evaluation() {
    let config = QueryConfig::new().with_strict_fields(["AGE"]);
    let tree = rewrite("NAME == 'bob' && AGE == 'old'", &config);
    assert_eq!(tree.to_query(), "NAME == 'bob' && ((_Eval_ = true) && (AGE == 'old'))");

    let options = PlanOptions::from_config(&config);
    let plan = compile(&tree, &bob(), &options, &people()).unwrap();
    assert_eq!(plan.to_string(), "Leaf(NAME == 'bob')");
}

#[test]
fn test_negated_conjunction_with_unindexed_term_keeps_record() {
    let config = QueryConfig::default();
    let tree = rewrite("CITY == 'paris' && !(NAME == 'bob' && NOTES == 'vip')", &config);

    // NOTES is unknown to the index, so bob may still pass the negation
    let options = PlanOptions::from_config(&config).with_indexed_fields(["NAME", "AGE", "CITY"]);
    let plan = compile(&tree, &bob(), &options, &people()).unwrap();
    assert_eq!(plan.to_string(), "Leaf(CITY == 'paris')");
    assert!(matches(&tree, &bob(), &options, &people()));
}

#[test]
fn test_extreme_exponent_dropped_without_failing() {
    let config = QueryConfig::default();
    let tree = rewrite("AGE == '10e2147483647' || NAME == 'Alice'", &config);
    let query = tree.to_query();
    assert!(query.starts_with("((_Drop_ = "), "{}", query);
    assert!(query.contains("NAME == 'alice'"));

    let options = PlanOptions::from_config(&config);
    assert!(matches(&tree, &alice(), &options, &people()));
    assert!(!matches(&tree, &bob(), &options, &people()));
}

#[test]
fn test_partial_branch_delayed_then_compiled() {
    let config = QueryConfig::default();
    let tree = rewrite("NAME == 'alice' && (CITY == 'london' || NOTES == 'vip')", &config);
    assert_eq!(
        classify(&tree, &metadata(), &config, ClassificationMode::Global).state,
        ExecutabilityState::Partial
    );

    let delayed = push_down(&tree, &metadata(), &config, ClassificationMode::Global);
    assert_eq!(
        delayed.to_query(),
        "NAME == 'alice' && ((_Delayed_ = true) && (CITY == 'london' || NOTES == 'vip'))"
    );
    let report = classify(&delayed, &metadata(), &config, ClassificationMode::Global);
    assert!(report.is_executable());

    let options = PlanOptions::from_config(&config).with_indexed_fields(["NAME", "AGE", "CITY"]);
    let mut plan = compile(&delayed, &alice(), &options, &people()).unwrap();
    assert_eq!(plan.to_string(), "Leaf(NAME == 'alice')");
    assert!(plan.evaluate().matched);
}

// =============================================================================
// Function Arguments
// =============================================================================

#[test]
fn test_fieldless_phrase_normalized_by_query_fields() {
    let config = QueryConfig::default();
    let tree = rewrite("AGE == '31' && content:phrase(termOffsetMap, '1', '2')", &config);
    assert_eq!(tree.to_query(), "AGE == '+bE3.1' && content:phrase(termOffsetMap, '+aE1', '+aE2')");
}

#[test]
fn test_filter_arguments_reach_evaluation_raw() {
    let config = QueryConfig::default();
    let tree = rewrite("AGE == '31' && filter:includeRegex(AGE, '3.*')", &config);
    assert_eq!(tree.to_query(), "AGE == '+bE3.1' && filter:includeRegex(AGE, '3.*')");
}

// =============================================================================
// Aggregation and Time Filtering
// =============================================================================

#[test]
fn test_aggregated_values_collected_for_matching_record() {
    let config = QueryConfig::new().with_aggregation_fields(["NAME", "CITY"]);
    let tree = rewrite("NAME =~ 'b.*' && CITY == 'paris'", &config);

    let options = PlanOptions::from_config(&config);
    let eval = compile(&tree, &bob(), &options, &people()).unwrap().evaluate();
    assert!(eval.matched);
    assert_eq!(eval.document.values("NAME").collect::<Vec<_>>(), vec!["bob"]);
    assert_eq!(eval.document.values("CITY").collect::<Vec<_>>(), vec!["paris"]);

    let eval = compile(&tree, &alice(), &options, &people()).unwrap().evaluate();
    assert!(!eval.matched);
    assert!(eval.document.is_empty());
}

#[test]
fn test_time_range_excludes_entries() {
    let jan = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
    let source = InMemorySource::builder()
        .field_index(&alice(), "NAME", "alice", jan.timestamp_millis())
        .build();

    let inside = QueryConfig::new().with_date_range(
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
    );
    let outside = QueryConfig::new().with_date_range(
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap(),
    );

    let tree = parse("NAME == 'alice'").unwrap();
    assert!(matches(&tree, &alice(), &PlanOptions::from_config(&inside), &source));
    assert!(!matches(&tree, &alice(), &PlanOptions::from_config(&outside), &source));
}

// =============================================================================
// Composite Lookups
// =============================================================================

#[test]
fn test_equalities_fold_into_composite_lookup() {
    let config = QueryConfig::new()
        .with_composite(CompositeMapping::new("COLOR_WHEELS", ["COLOR", "WHEELS"]).with_separator(','));
    let tree = rewrite("COLOR == 'Red' && WHEELS == '4'", &config);
    assert_eq!(tree.to_query(), "COLOR_WHEELS == 'red,+aE4'");

    let car = RecordRange::new("20240101_0", "vehicle", "uid.car");
    let source = InMemorySource::builder()
        .field_index(&car, "COLOR", "red", 1)
        .field_index(&car, "WHEELS", "+aE4", 1)
        .field_index(&car, "COLOR_WHEELS", "red,+aE4", 1)
        .build();
    assert!(matches(&tree, &car, &PlanOptions::from_config(&config), &source));
}

#[test]
fn test_folded_range_compiles_to_range_leaf() {
    let config = QueryConfig::new()
        .with_composite(CompositeMapping::new("GEO", ["GEO", "WKT_BYTE_LENGTH"]).with_separator(','))
        .with_fixed_length_field("GEO", Alphabet::Hex);
    let tree = fold(
        &parse("(GEO >= '0100' && GEO <= '0103') && WKT_BYTE_LENGTH >= '+AE0'").unwrap(),
        &config,
    );

    let inside = RecordRange::new("row", "geo", "uid.in");
    let beyond = RecordRange::new("row", "geo", "uid.out");
    let source = InMemorySource::builder()
        .field_index(&inside, "GEO", "0102,+bE5.5", 1)
        .field_index(&beyond, "GEO", "0104,+AE0", 1)
        .build();

    let options = PlanOptions::from_config(&config);
    let plan = compile(&tree, &inside, &options, &source).unwrap();
    assert_eq!(plan.to_string(), "Leaf(GEO ['0100,+AE0', '0104'))");
    assert!(matches(&tree, &inside, &options, &source));
    assert!(!matches(&tree, &beyond, &options, &source));

    let geo = MetadataSnapshot::new().with_field("GEO", FieldMetadata::indexed());
    let report = classify(&tree, &geo, &config, ClassificationMode::Global);
    assert_eq!(report.state, ExecutabilityState::Executable);
}
