//! Plan leaves
//!
//! A leaf scans the field index of one record for the values its predicate
//! accepts. When its field is aggregated it also collects the matching
//! values into the document, from term frequency entries when the field has
//! them.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use regex::Regex;

use super::document::Document;
use super::key::{
    field_index_family, parse_term_frequency, FieldIndexEntry, KeyRange, RecordRange, TimeFilter,
    MAX_VALUE, TERM_FREQUENCY_FAMILY,
};
use super::source::KeyValueSource;

/// Full-match regex with a per-value result cache
///
/// Clones start with an empty cache, so concurrent copies never share
/// match state.
pub struct RegexMatcher {
    pattern: String,
    compiled: Regex,
    cache: BTreeMap<String, bool>,
}

impl RegexMatcher {
    pub fn new(pattern: impl Into<String>) -> Result<Self, regex::Error> {
        let pattern = pattern.into();
        let compiled = Regex::new(&format!("^(?:{})$", pattern))?;
        Ok(Self {
            pattern,
            compiled,
            cache: BTreeMap::new(),
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn is_match(&mut self, value: &str) -> bool {
        if let Some(hit) = self.cache.get(value) {
            return *hit;
        }
        let hit = self.compiled.is_match(value);
        self.cache.insert(value.to_string(), hit);
        hit
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    pub fn reset(&mut self) {
        self.cache.clear();
    }

    /// Literal prefix and whether the pattern is nothing but that literal
    pub fn literal_prefix(&self) -> (String, bool) {
        literal_prefix(&self.pattern)
    }

    /// Inclusive value bounds that contain every match
    ///
    /// Without a usable prefix the scan covers every value.
    pub fn scan_bounds(&self) -> (String, String) {
        let (prefix, complete) = self.literal_prefix();
        if prefix.is_empty() && !complete {
            (String::new(), MAX_VALUE.to_string())
        } else if complete {
            (prefix.clone(), prefix)
        } else {
            (prefix.clone(), format!("{}{}", prefix, MAX_VALUE))
        }
    }
}

impl Clone for RegexMatcher {
    fn clone(&self) -> Self {
        Self {
            pattern: self.pattern.clone(),
            compiled: self.compiled.clone(),
            cache: BTreeMap::new(),
        }
    }
}

impl fmt::Debug for RegexMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegexMatcher")
            .field("pattern", &self.pattern)
            .field("cached", &self.cache.len())
            .finish()
    }
}

fn literal_prefix(pattern: &str) -> (String, bool) {
    if pattern.contains('|') {
        return (String::new(), false);
    }
    let body = pattern.strip_prefix('^').unwrap_or(pattern);
    let mut prefix = String::new();
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        let literal = match c {
            '\\' => match chars.peek() {
                Some(next) if !next.is_alphanumeric() => {
                    let next = *next;
                    chars.next();
                    next
                }
                _ => return (prefix, false),
            },
            '.' | '^' | '$' | '*' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}' => {
                return (prefix, c == '$' && chars.peek().is_none());
            }
            other => other,
        };
        // a quantifier makes the preceding character optional
        if matches!(chars.peek(), Some('*') | Some('?') | Some('{')) {
            return (prefix, false);
        }
        prefix.push(literal);
    }
    (prefix, true)
}

/// What a leaf matches
#[derive(Debug, Clone)]
pub enum LeafKind {
    Point(String),
    Range {
        lower: String,
        lower_inclusive: bool,
        upper: String,
        upper_inclusive: bool,
    },
    Regex(RegexMatcher),
}

impl LeafKind {
    pub fn matches(&mut self, value: &str) -> bool {
        match self {
            LeafKind::Point(expected) => value == expected,
            LeafKind::Range {
                lower,
                lower_inclusive,
                upper,
                upper_inclusive,
            } => {
                let above = if *lower_inclusive { value >= lower.as_str() } else { value > lower.as_str() };
                let below = if *upper_inclusive { value <= upper.as_str() } else { value < upper.as_str() };
                above && below
            }
            LeafKind::Regex(matcher) => matcher.is_match(value),
        }
    }

    /// Inclusive value bounds to scan
    fn value_bounds(&self) -> (String, String) {
        match self {
            LeafKind::Point(value) => (value.clone(), value.clone()),
            LeafKind::Range { lower, upper, .. } => (lower.clone(), upper.clone()),
            LeafKind::Regex(matcher) => matcher.scan_bounds(),
        }
    }
}

impl PartialEq for LeafKind {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (LeafKind::Point(a), LeafKind::Point(b)) => a == b,
            (
                LeafKind::Range {
                    lower: l1,
                    lower_inclusive: li1,
                    upper: u1,
                    upper_inclusive: ui1,
                },
                LeafKind::Range {
                    lower: l2,
                    lower_inclusive: li2,
                    upper: u2,
                    upper_inclusive: ui2,
                },
            ) => l1 == l2 && li1 == li2 && u1 == u2 && ui1 == ui2,
            (LeafKind::Regex(a), LeafKind::Regex(b)) => a.pattern == b.pattern,
            _ => false,
        }
    }
}

impl fmt::Display for LeafKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeafKind::Point(value) => write!(f, "== '{}'", value),
            LeafKind::Range {
                lower,
                lower_inclusive,
                upper,
                upper_inclusive,
            } => write!(
                f,
                "{}'{}', '{}'{}",
                if *lower_inclusive { '[' } else { '(' },
                lower,
                upper,
                if *upper_inclusive { ']' } else { ')' }
            ),
            LeafKind::Regex(matcher) => write!(f, "=~ '{}'", matcher.pattern),
        }
    }
}

/// A field index lookup against one record
#[derive(Debug)]
pub struct Leaf {
    pub field: String,
    pub kind: LeafKind,
    /// Matching values are collected into the document
    pub aggregate: bool,
    /// Values are collected from term frequency entries
    pub term_frequency: bool,
    record: RecordRange,
    time_filter: Option<TimeFilter>,
    source: Box<dyn KeyValueSource>,
}

impl Leaf {
    pub fn new(field: impl Into<String>, kind: LeafKind, record: RecordRange, source: Box<dyn KeyValueSource>) -> Self {
        Self {
            field: field.into(),
            kind,
            aggregate: false,
            term_frequency: false,
            record,
            time_filter: None,
            source,
        }
    }

    pub fn with_aggregation(mut self, aggregate: bool, term_frequency: bool) -> Self {
        self.aggregate = aggregate;
        self.term_frequency = term_frequency;
        self
    }

    pub fn with_time_filter(mut self, filter: Option<TimeFilter>) -> Self {
        self.time_filter = filter;
        self
    }

    pub fn record(&self) -> &RecordRange {
        &self.record
    }

    /// Field index range holding every candidate entry
    pub fn scan_range(&self) -> KeyRange {
        let (lower, upper) = self.kind.value_bounds();
        KeyRange::qualifiers(
            &self.record.row,
            &field_index_family(&self.field),
            &lower,
            &format!("{}\u{1}", upper),
        )
    }

    fn accepts_time(&self, timestamp: i64) -> bool {
        self.time_filter.map_or(true, |f| f.accepts(timestamp))
    }

    /// Returns true if the record has a matching value, collecting values
    /// into the document when aggregating
    pub fn evaluate(&mut self, document: &mut Document) -> bool {
        let range = self.scan_range();
        self.source.seek(&range);

        let mut matched = BTreeSet::new();
        loop {
            let Some((qualifier, timestamp)) = self
                .source
                .top_key()
                .map(|k| (k.column_qualifier.clone(), k.timestamp))
            else {
                break;
            };
            if self.accepts_time(timestamp) {
                if let Some(entry) = FieldIndexEntry::parse(&qualifier) {
                    if self.record.owns(&entry) && self.kind.matches(entry.value) {
                        matched.insert(entry.value.to_string());
                        if !self.aggregate {
                            break;
                        }
                    }
                }
            }
            self.source.advance();
        }

        if matched.is_empty() {
            return false;
        }
        if self.aggregate {
            if self.term_frequency {
                self.collect_term_frequencies(document);
            } else {
                for value in matched {
                    document.insert(&self.field, value);
                }
            }
        }
        true
    }

    /// Adds every term frequency value of this field that satisfies the
    /// predicate
    fn collect_term_frequencies(&mut self, document: &mut Document) {
        let prefix = self.record.term_frequency_prefix();
        let range = KeyRange::qualifiers(
            &self.record.row,
            TERM_FREQUENCY_FAMILY,
            &prefix,
            &format!("{}\u{1}", prefix.trim_end_matches('\0')),
        );
        self.source.seek(&range);
        loop {
            let Some((qualifier, timestamp)) = self
                .source
                .top_key()
                .map(|k| (k.column_qualifier.clone(), k.timestamp))
            else {
                break;
            };
            if self.accepts_time(timestamp) {
                if let Some((value, field)) = parse_term_frequency(&qualifier, &prefix) {
                    if field == self.field && self.kind.matches(value) {
                        document.insert(&self.field, value);
                    }
                }
            }
            self.source.advance();
        }
    }

    /// Drops cached regex results
    pub fn reset(&mut self) {
        if let LeafKind::Regex(matcher) = &mut self.kind {
            matcher.reset();
        }
    }
}

impl Clone for Leaf {
    fn clone(&self) -> Self {
        Self {
            field: self.field.clone(),
            kind: self.kind.clone(),
            aggregate: self.aggregate,
            term_frequency: self.term_frequency,
            record: self.record.clone(),
            time_filter: self.time_filter,
            source: self.source.deep_copy(),
        }
    }
}

impl PartialEq for Leaf {
    fn eq(&self, other: &Self) -> bool {
        self.field == other.field
            && self.kind == other.kind
            && self.aggregate == other.aggregate
            && self.term_frequency == other.term_frequency
            && self.record == other.record
            && self.time_filter == other.time_filter
    }
}

impl fmt::Display for Leaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field, self.kind)?;
        if self.aggregate {
            write!(f, " +agg")?;
        }
        Ok(())
    }
}
