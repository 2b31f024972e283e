//! Type-normalization expansion
//!
//! Expands literal comparisons across each field's registered normalizers.
//! Per-normalizer failure only removes that variant; total failure is
//! encoded in the tree as a `Drop`, an `EvaluationOnly` demotion, or the
//! untouched original for lenient fields.

mod expander;

pub use expander::{expand, NormalizationExpander};
