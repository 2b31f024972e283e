//! Plan compilation errors
//!
//! Error codes:
//! - SHARDQUERY_PLAN_NULL_INDEX_ONLY (FATAL)
//! - SHARDQUERY_PLAN_TOP_LEVEL_NEGATION (FATAL)
//! - SHARDQUERY_PLAN_UNANCHORED_NEGATION (FATAL)
//! - SHARDQUERY_PLAN_UNANCHORED (REJECT)
//! - SHARDQUERY_PLAN_INVALID_REGEX (REJECT)
//! - SHARDQUERY_PLAN_UNRESOLVABLE (FATAL)

use thiserror::Error;

use crate::errors::Severity;

/// Result type for plan compilation
pub type PlanResult<T> = Result<T, PlanError>;

/// Structurally impossible plan requests
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("Null comparison on index-only field {field} has no lookup to compile")]
    NullIndexOnlyField { field: String },

    #[error("Negated lookup cannot be the whole plan: {query}")]
    TopLevelNegation { query: String },

    #[error("Negated lookup has no positive anchor in its conjunction: {query}")]
    UnanchoredNegation { query: String },

    #[error("Nothing in the query can be looked up in the index: {query}")]
    Unanchored { query: String },

    #[error("Invalid regex '{pattern}' on {field}: {message}")]
    InvalidRegex {
        field: String,
        pattern: String,
        message: String,
    },

    #[error("Expansion of {field} cannot be resolved: {reason}")]
    Unresolvable { field: String, reason: String },
}

impl PlanError {
    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            PlanError::NullIndexOnlyField { .. } => "SHARDQUERY_PLAN_NULL_INDEX_ONLY",
            PlanError::TopLevelNegation { .. } => "SHARDQUERY_PLAN_TOP_LEVEL_NEGATION",
            PlanError::UnanchoredNegation { .. } => "SHARDQUERY_PLAN_UNANCHORED_NEGATION",
            PlanError::Unanchored { .. } => "SHARDQUERY_PLAN_UNANCHORED",
            PlanError::InvalidRegex { .. } => "SHARDQUERY_PLAN_INVALID_REGEX",
            PlanError::Unresolvable { .. } => "SHARDQUERY_PLAN_UNRESOLVABLE",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            PlanError::Unanchored { .. } | PlanError::InvalidRegex { .. } => Severity::Reject,
            _ => Severity::Fatal,
        }
    }

    /// Returns true if the error must not be retried with the same tree
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}
