//! Field metadata and the service that exposes it
//!
//! Passes never reach for ambient registries; they receive an immutable
//! [`FieldMetadataService`] and read everything they need from it.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use super::normalizer::Normalizer;

/// Metadata for a single field
#[derive(Clone, Default)]
pub struct FieldMetadata {
    /// Normalizers in registration order
    pub normalizers: Vec<Arc<dyn Normalizer>>,
    /// Field has a global and field index
    pub indexed: bool,
    /// Field value exists only in the index and term frequency entries
    pub index_only: bool,
    /// Field has no event-stored value
    pub non_event: bool,
    /// Field has term frequency entries
    pub term_frequency: bool,
    /// Datatypes the field occurs in, empty for all
    pub datatypes: BTreeSet<String>,
}

impl FieldMetadata {
    /// An indexed field with no normalizers yet
    pub fn indexed() -> Self {
        Self {
            indexed: true,
            ..Default::default()
        }
    }

    /// A field stored only in events
    pub fn unindexed() -> Self {
        Self::default()
    }

    pub fn with_normalizer(mut self, normalizer: impl Normalizer + 'static) -> Self {
        self.normalizers.push(Arc::new(normalizer));
        self
    }

    /// Marks the field index-only, which also makes it indexed and non-event
    pub fn as_index_only(mut self) -> Self {
        self.indexed = true;
        self.index_only = true;
        self.non_event = true;
        self
    }

    pub fn as_non_event(mut self) -> Self {
        self.non_event = true;
        self
    }

    pub fn with_term_frequency(mut self) -> Self {
        self.term_frequency = true;
        self
    }

    pub fn with_datatype(mut self, datatype: impl Into<String>) -> Self {
        self.datatypes.insert(datatype.into());
        self
    }

    /// Returns true if the field occurs in any of the filtered datatypes
    pub fn matches_datatypes(&self, filter: &BTreeSet<String>) -> bool {
        filter.is_empty() || self.datatypes.is_empty() || !self.datatypes.is_disjoint(filter)
    }
}

impl fmt::Debug for FieldMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.normalizers.iter().map(|n| n.name()).collect();
        f.debug_struct("FieldMetadata")
            .field("normalizers", &names)
            .field("indexed", &self.indexed)
            .field("index_only", &self.index_only)
            .field("non_event", &self.non_event)
            .field("term_frequency", &self.term_frequency)
            .field("datatypes", &self.datatypes)
            .finish()
    }
}

/// Read-only view of field metadata consumed by every pass
pub trait FieldMetadataService {
    /// All indexed fields
    fn indexed_fields(&self) -> BTreeSet<String>;

    /// Index-only fields occurring in the filtered datatypes
    fn index_only_fields(&self, datatype_filter: &BTreeSet<String>) -> BTreeSet<String>;

    /// Normalizers registered for a field, in registration order
    fn normalizers_for(&self, field: &str) -> Vec<Arc<dyn Normalizer>>;

    /// Fields without event-stored values in the filtered datatypes
    fn non_event_fields(&self, datatype_filter: &BTreeSet<String>) -> BTreeSet<String>;

    /// Fields with term frequency entries
    fn term_frequency_fields(&self) -> BTreeSet<String> {
        BTreeSet::new()
    }
}

/// Immutable snapshot of field metadata
#[derive(Debug, Clone, Default)]
pub struct MetadataSnapshot {
    fields: BTreeMap<String, FieldMetadata>,
}

impl MetadataSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, name: impl Into<String>, metadata: FieldMetadata) -> Self {
        self.fields.insert(name.into(), metadata);
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldMetadata> {
        self.fields.get(name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    fn select(&self, predicate: impl Fn(&FieldMetadata) -> bool) -> BTreeSet<String> {
        self.fields
            .iter()
            .filter(|(_, m)| predicate(m))
            .map(|(name, _)| name.clone())
            .collect()
    }
}

impl FieldMetadataService for MetadataSnapshot {
    fn indexed_fields(&self) -> BTreeSet<String> {
        self.select(|m| m.indexed)
    }

    fn index_only_fields(&self, datatype_filter: &BTreeSet<String>) -> BTreeSet<String> {
        self.select(|m| m.index_only && m.matches_datatypes(datatype_filter))
    }

    fn normalizers_for(&self, field: &str) -> Vec<Arc<dyn Normalizer>> {
        self.fields
            .get(field)
            .map(|m| m.normalizers.clone())
            .unwrap_or_default()
    }

    fn non_event_fields(&self, datatype_filter: &BTreeSet<String>) -> BTreeSet<String> {
        self.select(|m| m.non_event && m.matches_datatypes(datatype_filter))
    }

    fn term_frequency_fields(&self) -> BTreeSet<String> {
        self.select(|m| m.term_frequency)
    }
}

/// Field sets resolved once per pass
#[derive(Debug, Clone, Default)]
pub struct FieldSets {
    pub indexed: BTreeSet<String>,
    pub index_only: BTreeSet<String>,
    pub non_event: BTreeSet<String>,
}

impl FieldSets {
    pub fn resolve(service: &dyn FieldMetadataService, datatype_filter: &BTreeSet<String>) -> Self {
        let index_only = service.index_only_fields(datatype_filter);
        let mut non_event = service.non_event_fields(datatype_filter);
        non_event.extend(index_only.iter().cloned());
        Self {
            indexed: service.indexed_fields(),
            index_only,
            non_event,
        }
    }

    pub fn is_indexed(&self, field: &str) -> bool {
        self.indexed.contains(field)
    }

    pub fn is_index_only(&self, field: &str) -> bool {
        self.index_only.contains(field)
    }

    pub fn is_non_event(&self, field: &str) -> bool {
        self.non_event.contains(field)
    }
}
