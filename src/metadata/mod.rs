//! Field metadata
//!
//! - [`Normalizer`]: per-field literal normalization
//! - [`FieldMetadataService`]: indexed, index-only and non-event field sets
//! - [`MetadataSnapshot`]: the in-memory service implementation

mod field;
mod normalizer;

pub use field::{FieldMetadata, FieldMetadataService, FieldSets, MetadataSnapshot};
pub use normalizer::{
    regex_literal, IpAddressNormalizer, LowerCaseNormalizer, NoOpNormalizer, NormalizationError,
    NormalizationResult, Normalizer, NumberNormalizer,
};
