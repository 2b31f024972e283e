//! Severity shared by every error type in the crate
//!
//! - REJECT: the caller asked for something this core cannot do with the given input
//! - FATAL: the request is structurally impossible and must not be retried as-is

use std::fmt;

/// Severity levels for crate errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Request rejected, input should be corrected
    Reject,
    /// Structurally impossible request
    Fatal,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Reject => "REJECT",
            Severity::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
