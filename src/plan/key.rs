//! Sorted key model
//!
//! Keys order by row, column family, column qualifier and visibility, then
//! by timestamp descending so the newest version of a cell comes first.
//!
//! Reserved column families:
//! - `fi\0FIELD`: field index, qualifier `value\0datatype\0uid`
//! - `tf`: term frequency, qualifier `datatype\0uid\0value\0FIELD`

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};

/// Column family prefix of field index entries
pub const FIELD_INDEX_PREFIX: &str = "fi\0";

/// Column family of term frequency entries
pub const TERM_FREQUENCY_FAMILY: &str = "tf";

/// Largest value a scan can reach
pub const MAX_VALUE: &str = "\u{10FFFF}";

/// A sorted key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Key {
    pub row: String,
    pub column_family: String,
    pub column_qualifier: String,
    pub visibility: String,
    pub timestamp: i64,
}

impl Key {
    pub fn new(
        row: impl Into<String>,
        column_family: impl Into<String>,
        column_qualifier: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            row: row.into(),
            column_family: column_family.into(),
            column_qualifier: column_qualifier.into(),
            visibility: String::new(),
            timestamp,
        }
    }

    pub fn with_visibility(mut self, visibility: impl Into<String>) -> Self {
        self.visibility = visibility.into();
        self
    }

    /// The smallest key of a cell, before every version of it
    pub fn first_of(
        row: impl Into<String>,
        column_family: impl Into<String>,
        column_qualifier: impl Into<String>,
    ) -> Self {
        Self::new(row, column_family, column_qualifier, i64::MAX)
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        self.row
            .cmp(&other.row)
            .then_with(|| self.column_family.cmp(&other.column_family))
            .then_with(|| self.column_qualifier.cmp(&other.column_qualifier))
            .then_with(|| self.visibility.cmp(&other.visibility))
            .then_with(|| other.timestamp.cmp(&self.timestamp))
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A range of keys to scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    pub start: Key,
    pub start_inclusive: bool,
    pub end: Key,
    pub end_inclusive: bool,
}

impl KeyRange {
    pub fn new(start: Key, start_inclusive: bool, end: Key, end_inclusive: bool) -> Self {
        Self {
            start,
            start_inclusive,
            end,
            end_inclusive,
        }
    }

    /// Every version of qualifiers in `[lower, upper)` of one column family
    pub fn qualifiers(row: &str, column_family: &str, lower: &str, upper: &str) -> Self {
        Self::new(
            Key::first_of(row, column_family, lower),
            true,
            Key::first_of(row, column_family, upper),
            false,
        )
    }

    pub fn is_after_start(&self, key: &Key) -> bool {
        match key.cmp(&self.start) {
            Ordering::Greater => true,
            Ordering::Equal => self.start_inclusive,
            Ordering::Less => false,
        }
    }

    pub fn is_before_end(&self, key: &Key) -> bool {
        match key.cmp(&self.end) {
            Ordering::Less => true,
            Ordering::Equal => self.end_inclusive,
            Ordering::Greater => false,
        }
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.is_after_start(key) && self.is_before_end(key)
    }
}

/// Location of one record: the shard row plus datatype and uid
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordRange {
    pub row: String,
    pub datatype: String,
    pub uid: String,
}

impl RecordRange {
    pub fn new(row: impl Into<String>, datatype: impl Into<String>, uid: impl Into<String>) -> Self {
        Self {
            row: row.into(),
            datatype: datatype.into(),
            uid: uid.into(),
        }
    }

    /// Key of a field index entry for this record
    pub fn field_index_key(&self, field: &str, value: &str, timestamp: i64) -> Key {
        Key::new(
            self.row.clone(),
            field_index_family(field),
            format!("{}\0{}\0{}", value, self.datatype, self.uid),
            timestamp,
        )
    }

    /// Key of a term frequency entry for this record
    pub fn term_frequency_key(&self, field: &str, value: &str, timestamp: i64) -> Key {
        Key::new(
            self.row.clone(),
            TERM_FREQUENCY_FAMILY,
            format!("{}{}\0{}", self.term_frequency_prefix(), value, field),
            timestamp,
        )
    }

    /// Qualifier prefix shared by all of this record's term frequency entries
    pub fn term_frequency_prefix(&self) -> String {
        format!("{}\0{}\0", self.datatype, self.uid)
    }

    /// Returns true if a field index qualifier belongs to this record
    pub fn owns(&self, entry: &FieldIndexEntry<'_>) -> bool {
        entry.datatype == self.datatype && entry.uid == self.uid
    }
}

impl fmt::Display for RecordRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.row, self.datatype, self.uid)
    }
}

pub fn field_index_family(field: &str) -> String {
    format!("{}{}", FIELD_INDEX_PREFIX, field)
}

/// Parsed field index qualifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldIndexEntry<'k> {
    pub value: &'k str,
    pub datatype: &'k str,
    pub uid: &'k str,
}

impl<'k> FieldIndexEntry<'k> {
    /// Splits `value\0datatype\0uid` from the right, so values may hold `\0`
    pub fn parse(qualifier: &'k str) -> Option<Self> {
        let mut parts = qualifier.rsplitn(3, '\0');
        let uid = parts.next()?;
        let datatype = parts.next()?;
        let value = parts.next()?;
        Some(Self { value, datatype, uid })
    }
}

/// Parses the `value\0FIELD` remainder of a term frequency qualifier
pub fn parse_term_frequency<'k>(qualifier: &'k str, record_prefix: &str) -> Option<(&'k str, &'k str)> {
    qualifier.strip_prefix(record_prefix)?.rsplit_once('\0')
}

/// Inclusive window of key timestamps, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeFilter {
    pub start_ms: i64,
    pub end_ms: i64,
}

impl TimeFilter {
    pub fn new(start_ms: i64, end_ms: i64) -> Self {
        Self { start_ms, end_ms }
    }

    /// Window covering a date range; open ends extend to the extremes
    pub fn from_dates(begin: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Option<Self> {
        if begin.is_none() && end.is_none() {
            return None;
        }
        Some(Self {
            start_ms: begin.map_or(i64::MIN, |d| d.timestamp_millis()),
            end_ms: end.map_or(i64::MAX, |d| d.timestamp_millis()),
        })
    }

    pub fn accepts(&self, timestamp: i64) -> bool {
        (self.start_ms..=self.end_ms).contains(&timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_newest_version_first() {
        let old = Key::new("r", "cf", "cq", 10);
        let new = Key::new("r", "cf", "cq", 20);
        assert!(new < old);
        assert!(Key::first_of("r", "cf", "cq") < new);
    }

    #[test]
    fn test_key_ordering_by_component() {
        assert!(Key::new("a", "z", "z", 0) < Key::new("b", "a", "a", 0));
        assert!(Key::new("a", "a", "z", 0) < Key::new("a", "b", "a", 0));
        assert!(Key::new("a", "a", "a", 0) < Key::new("a", "a", "a", 0).with_visibility("X"));
    }

    #[test]
    fn test_range_contains() {
        let range = KeyRange::qualifiers("r", "cf", "b", "d");
        assert!(range.contains(&Key::new("r", "cf", "b", 5)));
        assert!(range.contains(&Key::new("r", "cf", "c\0x", 5)));
        assert!(!range.contains(&Key::new("r", "cf", "d", 5)));
        assert!(!range.contains(&Key::new("r", "cf", "a", 5)));
    }

    #[test]
    fn test_field_index_round_trip() {
        let record = RecordRange::new("20240101_0", "event", "uid.1");
        let key = record.field_index_key("NAME", "bob", 1);
        assert_eq!(key.column_family, "fi\0NAME");
        let entry = FieldIndexEntry::parse(&key.column_qualifier).unwrap();
        assert_eq!(entry.value, "bob");
        assert!(record.owns(&entry));
    }

    #[test]
    fn test_term_frequency_parse() {
        let record = RecordRange::new("row", "event", "uid.1");
        let key = record.term_frequency_key("BODY", "quick", 1);
        let parsed = parse_term_frequency(&key.column_qualifier, &record.term_frequency_prefix());
        assert_eq!(parsed, Some(("quick", "BODY")));
        assert_eq!(parse_term_frequency(&key.column_qualifier, "other\0uid\0"), None);
    }

    #[test]
    fn test_time_filter() {
        let filter = TimeFilter::new(10, 20);
        assert!(filter.accepts(10));
        assert!(filter.accepts(20));
        assert!(!filter.accepts(21));

        let begin = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let open = TimeFilter::from_dates(Some(begin), None).unwrap();
        assert!(open.accepts(i64::MAX));
        assert!(!open.accepts(0));
        assert_eq!(TimeFilter::from_dates(None, None), None);
    }
}
