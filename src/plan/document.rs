//! Field values assembled while evaluating a plan

use std::collections::{BTreeMap, BTreeSet};

/// Ordered field to value-set map
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    fields: BTreeMap<String, BTreeSet<String>>,
}

impl Document {
    pub fn insert(&mut self, field: &str, value: impl Into<String>) {
        self.fields.entry(field.to_string()).or_default().insert(value.into());
    }

    pub fn extend(&mut self, other: Document) {
        for (field, values) in other.fields {
            self.fields.entry(field).or_default().extend(values);
        }
    }

    /// Values of a field in ascending order
    pub fn values(&self, field: &str) -> impl Iterator<Item = &str> {
        self.fields.get(field).into_iter().flatten().map(String::as_str)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Outcome of evaluating a plan against one record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Evaluation {
    pub matched: bool,
    /// Values collected by aggregating leaves, empty when not matched
    pub document: Document,
}
