//! Seekable key-value sources
//!
//! Every compiled leaf owns its own cursor. A [`SourceFactory`] hands out
//! cursors that share the underlying data but never share position.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound;
use std::sync::Arc;

use super::key::{Key, KeyRange, RecordRange};

/// A cursor over sorted key-value pairs
pub trait KeyValueSource: Send + fmt::Debug {
    /// Positions the cursor at the first key of the range
    fn seek(&mut self, range: &KeyRange);

    /// Current key, or `None` once the range is exhausted
    fn top_key(&self) -> Option<&Key>;

    fn top_value(&self) -> Option<&[u8]>;

    fn advance(&mut self);

    fn has_top(&self) -> bool {
        self.top_key().is_some()
    }

    /// An independent cursor over the same data
    fn deep_copy(&self) -> Box<dyn KeyValueSource>;
}

/// Hands out isolated cursors to compiled leaves
pub trait SourceFactory: Send + Sync + fmt::Debug {
    fn deep_copy(&self) -> Box<dyn KeyValueSource>;
}

/// In-memory sorted key-value data with its own cursor
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    entries: Arc<BTreeMap<Key, Vec<u8>>>,
    range: Option<KeyRange>,
    top: Option<Key>,
}

impl InMemorySource {
    pub fn new(entries: BTreeMap<Key, Vec<u8>>) -> Self {
        Self {
            entries: Arc::new(entries),
            range: None,
            top: None,
        }
    }

    pub fn builder() -> InMemorySourceBuilder {
        InMemorySourceBuilder::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn locate(&self, from: Bound<&Key>) -> Option<Key> {
        let range = self.range.as_ref()?;
        self.entries
            .range((from, Bound::Unbounded))
            .next()
            .map(|(key, _)| key)
            .filter(|key| range.is_before_end(key))
            .cloned()
    }
}

impl KeyValueSource for InMemorySource {
    fn seek(&mut self, range: &KeyRange) {
        self.range = Some(range.clone());
        let from = if range.start_inclusive {
            Bound::Included(&range.start)
        } else {
            Bound::Excluded(&range.start)
        };
        self.top = self.locate(from);
    }

    fn top_key(&self) -> Option<&Key> {
        self.top.as_ref()
    }

    fn top_value(&self) -> Option<&[u8]> {
        self.top
            .as_ref()
            .and_then(|key| self.entries.get(key))
            .map(Vec::as_slice)
    }

    fn advance(&mut self) {
        if let Some(current) = self.top.take() {
            self.top = self.locate(Bound::Excluded(&current));
        }
    }

    fn deep_copy(&self) -> Box<dyn KeyValueSource> {
        Box::new(Self {
            entries: Arc::clone(&self.entries),
            range: None,
            top: None,
        })
    }
}

impl SourceFactory for InMemorySource {
    fn deep_copy(&self) -> Box<dyn KeyValueSource> {
        KeyValueSource::deep_copy(self)
    }
}

/// Builds an [`InMemorySource`] from record-level index entries
#[derive(Debug, Default)]
pub struct InMemorySourceBuilder {
    entries: BTreeMap<Key, Vec<u8>>,
}

impl InMemorySourceBuilder {
    pub fn entry(mut self, key: Key, value: impl Into<Vec<u8>>) -> Self {
        self.entries.insert(key, value.into());
        self
    }

    /// Adds a field index entry for a record
    pub fn field_index(self, record: &RecordRange, field: &str, value: &str, timestamp: i64) -> Self {
        let key = record.field_index_key(field, value, timestamp);
        self.entry(key, Vec::new())
    }

    /// Adds a term frequency entry for a record
    pub fn term_frequency(self, record: &RecordRange, field: &str, value: &str, timestamp: i64) -> Self {
        let key = record.term_frequency_key(field, value, timestamp);
        self.entry(key, Vec::new())
    }

    /// Adds both index entries for an indexed term frequency value
    pub fn indexed_term(self, record: &RecordRange, field: &str, value: &str, timestamp: i64) -> Self {
        self.field_index(record, field, value, timestamp)
            .term_frequency(record, field, value, timestamp)
    }

    pub fn build(self) -> InMemorySource {
        InMemorySource::new(self.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> InMemorySource {
        InMemorySource::builder()
            .entry(Key::new("r", "cf", "a", 1), b"1".to_vec())
            .entry(Key::new("r", "cf", "b", 1), b"2".to_vec())
            .entry(Key::new("r", "cf", "c", 1), b"3".to_vec())
            .entry(Key::new("r", "cf", "d", 1), b"4".to_vec())
            .build()
    }

    fn scan(source: &mut dyn KeyValueSource, range: &KeyRange) -> Vec<String> {
        source.seek(range);
        let mut out = Vec::new();
        while let Some(key) = source.top_key() {
            out.push(key.column_qualifier.clone());
            source.advance();
        }
        out
    }

    #[test]
    fn test_seek_and_advance() {
        let mut src = source();
        let range = KeyRange::qualifiers("r", "cf", "b", "d");
        assert_eq!(scan(&mut src, &range), vec!["b", "c"]);
    }

    #[test]
    fn test_top_value() {
        let mut src = source();
        src.seek(&KeyRange::qualifiers("r", "cf", "c", "z"));
        assert_eq!(src.top_value(), Some(&b"3"[..]));
    }

    #[test]
    fn test_exclusive_start() {
        let mut src = source();
        let range = KeyRange::new(Key::new("r", "cf", "a", 1), false, Key::first_of("r", "cf", "c"), false);
        assert_eq!(scan(&mut src, &range), vec!["b"]);
    }

    #[test]
    fn test_deep_copy_has_independent_cursor() {
        let mut src = source();
        src.seek(&KeyRange::qualifiers("r", "cf", "a", "z"));
        src.advance();

        let mut copy = KeyValueSource::deep_copy(&src);
        assert!(!copy.has_top());
        copy.seek(&KeyRange::qualifiers("r", "cf", "a", "z"));
        assert_eq!(copy.top_key().map(|k| k.column_qualifier.as_str()), Some("a"));
        assert_eq!(src.top_key().map(|k| k.column_qualifier.as_str()), Some("b"));
    }

    #[test]
    fn test_empty_range() {
        let mut src = source();
        assert!(scan(&mut src, &KeyRange::qualifiers("r", "cf", "x", "z")).is_empty());
        assert!(scan(&mut src, &KeyRange::qualifiers("other", "cf", "a", "z")).is_empty());
    }
}
