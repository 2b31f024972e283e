//! Iterator-plan compilation and evaluation
//!
//! Compiles a rewritten query tree into a nested plan of field index
//! lookups scoped to one record:
//! - Key model for the field index and term frequency layouts
//! - Seekable key-value sources with per-leaf cursors
//! - Point, range and regex leaves with optional value aggregation
//! - Intersect, union and negation over leaves
//!
//! A plan is evaluated once per record and yields whether the record
//! matched, along with the values its aggregating leaves collected.

mod compiler;
mod document;
mod errors;
mod key;
mod leaf;
mod source;
mod tree;

pub use compiler::{compile, PlanCompiler, PlanOptions};
pub use document::{Document, Evaluation};
pub use errors::{PlanError, PlanResult};
pub use key::{
    field_index_family, parse_term_frequency, FieldIndexEntry, Key, KeyRange, RecordRange, TimeFilter,
    FIELD_INDEX_PREFIX, MAX_VALUE, TERM_FREQUENCY_FAMILY,
};
pub use leaf::{Leaf, LeafKind, RegexMatcher};
pub use source::{InMemorySource, InMemorySourceBuilder, KeyValueSource, SourceFactory};
pub use tree::Plan;
