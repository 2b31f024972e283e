//! Composite field support
//!
//! A composite field concatenates the values of several component fields
//! into one indexed value. This module provides:
//! - Mapping definitions and fixed-length alphabets
//! - Composite range construction from per-component bounds
//! - The folding pass that rewrites conjunctions into composite lookups

mod bounds;
mod folder;
mod mapping;

pub use bounds::{composite_term, ComponentBound, CompositeTerm, FoldSkip};
pub use folder::{fold, CompositeFolder};
pub use mapping::{Alphabet, CompositeMapping, DEFAULT_SEPARATOR};
