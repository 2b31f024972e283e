//! Marker kinds and payloads
//!
//! Markers annotate a subtree with a processing directive. In query text a
//! marker is written as an assignment conjoined with its child:
//!
//! ```text
//! ((_Delayed_ = true) && (FOO == 'bar'))
//! ((_Drop_ = 'reason') && (FOO == 'bar'))
//! ```

use std::fmt;

/// Directive attached to a marked subtree
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MarkerKind {
    /// A lower/upper pair on one field forming a single range
    Bounded,
    /// Evaluate against the document, not the index
    Delayed,
    /// Never look up against the index
    EvaluationOnly,
    /// A value expansion exceeded its threshold
    ExceededValue,
    /// A term expansion exceeded its threshold
    ExceededTerm,
    /// An `Or` of values exceeded its threshold
    ExceededOr,
    /// The index is known to be missing data for this term
    IndexHole,
    /// Normalization failures keep the original clause
    Lenient,
    /// Normalization failures demote the clause to evaluation
    Strict,
    List,
    Term,
    /// Excluded clause, always false
    Drop,
}

impl MarkerKind {
    /// All marker kinds
    pub const ALL: [MarkerKind; 12] = [
        MarkerKind::Bounded,
        MarkerKind::Delayed,
        MarkerKind::EvaluationOnly,
        MarkerKind::ExceededValue,
        MarkerKind::ExceededTerm,
        MarkerKind::ExceededOr,
        MarkerKind::IndexHole,
        MarkerKind::Lenient,
        MarkerKind::Strict,
        MarkerKind::List,
        MarkerKind::Term,
        MarkerKind::Drop,
    ];

    /// Assignment label used in query text
    pub fn label(&self) -> &'static str {
        match self {
            MarkerKind::Bounded => "_Bounded_",
            MarkerKind::Delayed => "_Delayed_",
            MarkerKind::EvaluationOnly => "_Eval_",
            MarkerKind::ExceededValue => "_Value_",
            MarkerKind::ExceededTerm => "_ExceededTerm_",
            MarkerKind::ExceededOr => "_ExceededOr_",
            MarkerKind::IndexHole => "_Hole_",
            MarkerKind::Lenient => "_Lenient_",
            MarkerKind::Strict => "_Strict_",
            MarkerKind::List => "_List_",
            MarkerKind::Term => "_Term_",
            MarkerKind::Drop => "_Drop_",
        }
    }

    /// Looks up a marker kind by its assignment label
    pub fn from_label(label: &str) -> Option<MarkerKind> {
        Self::ALL.iter().copied().find(|k| k.label() == label)
    }

    /// Returns true for markers that keep their subtree away from index lookups
    pub fn is_evaluation_directive(&self) -> bool {
        matches!(
            self,
            MarkerKind::Delayed | MarkerKind::EvaluationOnly | MarkerKind::ExceededTerm | MarkerKind::IndexHole
        )
    }

    /// Returns true for markers whose payload is an already-resolved term set
    pub fn is_exceeded(&self) -> bool {
        matches!(
            self,
            MarkerKind::ExceededValue | MarkerKind::ExceededTerm | MarkerKind::ExceededOr
        )
    }
}

impl fmt::Display for MarkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Extra data carried by a marker
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum MarkerPayload {
    #[default]
    None,
    /// Why a clause was dropped, and its query text at the time
    Dropped { reason: String, query: String },
}

impl MarkerPayload {
    /// Drop reason, if any
    pub fn reason(&self) -> Option<&str> {
        match self {
            MarkerPayload::Dropped { reason, .. } => Some(reason),
            MarkerPayload::None => None,
        }
    }
}
