//! Query text parse errors
//!
//! Error codes:
//! - SHARDQUERY_PARSE_EMPTY (REJECT)
//! - SHARDQUERY_PARSE_UNEXPECTED_END (REJECT)
//! - SHARDQUERY_PARSE_UNEXPECTED_TOKEN (REJECT)
//! - SHARDQUERY_PARSE_UNTERMINATED_STRING (REJECT)
//! - SHARDQUERY_PARSE_INVALID_MARKER (REJECT)

use thiserror::Error;

use crate::errors::Severity;

/// Result type for parsing
pub type ParseResult<T> = Result<T, ParseError>;

/// Failures turning query text into a tree
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Query text is empty")]
    Empty,

    #[error("Unexpected end of query text, expected {0}")]
    UnexpectedEnd(String),

    #[error("Unexpected '{found}' at position {position}, expected {expected}")]
    UnexpectedToken {
        position: usize,
        found: String,
        expected: String,
    },

    #[error("Unterminated string starting at position {0}")]
    UnterminatedString(usize),

    #[error("Invalid marker: {0}")]
    InvalidMarker(String),
}

impl ParseError {
    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            ParseError::Empty => "SHARDQUERY_PARSE_EMPTY",
            ParseError::UnexpectedEnd(_) => "SHARDQUERY_PARSE_UNEXPECTED_END",
            ParseError::UnexpectedToken { .. } => "SHARDQUERY_PARSE_UNEXPECTED_TOKEN",
            ParseError::UnterminatedString(_) => "SHARDQUERY_PARSE_UNTERMINATED_STRING",
            ParseError::InvalidMarker(_) => "SHARDQUERY_PARSE_INVALID_MARKER",
        }
    }

    pub fn severity(&self) -> Severity {
        Severity::Reject
    }
}
