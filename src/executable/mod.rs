//! Executability classification
//!
//! Answers whether each subtree can be resolved from index lookups alone:
//! - Global mode: only the global index is available
//! - Field index mode: a per-record field index also resolves negations
//!
//! The classifier never rewrites the tree. States are returned in a side
//! map keyed by [`crate::ast::NodeId`]. [`push_down`] uses them to move the
//! partial branches of anchored conjunctions under a `Delayed` marker.

mod classifier;
mod pushdown;
mod state;
mod summary;

pub use classifier::{classify, ClassificationReport, ExecutabilityClassifier};
pub use pushdown::push_down;
pub use state::{ClassificationMode, ExecutabilityState};
pub use summary::Contributors;
