//! Executability states and how child states combine

use std::collections::BTreeSet;
use std::fmt;

/// Whether a subtree can be resolved from indexes alone
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExecutabilityState {
    /// Resolvable from index lookups
    Executable,
    /// Resolvable as the negation of index lookups against the field index
    NegatedExecutable,
    /// Requires evaluation against the full record
    NonExecutable,
    /// Some branches resolvable, others not
    Partial,
    /// Contributes nothing to the query
    Ignorable,
    /// Contradictory request, such as a null test on an index-only field
    Error,
}

impl ExecutabilityState {
    /// Label used in classification summaries
    pub fn label(&self) -> &'static str {
        match self {
            ExecutabilityState::Executable => "EXECUTABLE",
            ExecutabilityState::NegatedExecutable => "NEGATED_EXECUTABLE",
            ExecutabilityState::NonExecutable => "NON_EXECUTABLE",
            ExecutabilityState::Partial => "PARTIAL",
            ExecutabilityState::Ignorable => "IGNORABLE",
            ExecutabilityState::Error => "ERROR",
        }
    }
}

impl fmt::Display for ExecutabilityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Evaluation context for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassificationMode {
    /// Global index lookups only
    Global,
    /// A per-record field index is available
    FieldIndex,
}

/// How the states of a junction's children combine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Combine {
    /// Every child must be executable: unions, and intersections under negation
    AllOrNone,
    /// One executable child anchors the rest: intersections, and unions under negation
    AllOrSome,
}

use ExecutabilityState::*;

impl Combine {
    pub(crate) fn for_and(negated: bool) -> Self {
        if negated {
            Combine::AllOrNone
        } else {
            Combine::AllOrSome
        }
    }

    pub(crate) fn for_or(negated: bool) -> Self {
        if negated {
            Combine::AllOrSome
        } else {
            Combine::AllOrNone
        }
    }

    pub(crate) fn apply(&self, states: &BTreeSet<ExecutabilityState>) -> ExecutabilityState {
        if states.is_empty() {
            return Ignorable;
        }
        let relevant: Vec<ExecutabilityState> = states.iter().copied().filter(|s| *s != Ignorable).collect();
        match relevant.as_slice() {
            [] => return Ignorable,
            [only] => return *only,
            _ => {}
        }
        let has = |s: ExecutabilityState| relevant.contains(&s);

        match self {
            Combine::AllOrNone => {
                if has(Error) {
                    Error
                } else if has(Partial) || has(NonExecutable) {
                    Partial
                } else {
                    NegatedExecutable
                }
            }
            Combine::AllOrSome => [Error, Partial, Executable, NegatedExecutable]
                .into_iter()
                .find(|s| has(*s))
                .unwrap_or(NonExecutable),
        }
    }

    /// States whose contributing terms are reported for a combined state
    pub(crate) fn reported(&self, state: ExecutabilityState) -> Vec<ExecutabilityState> {
        match (self, state) {
            (Combine::AllOrNone, Partial) => vec![Partial, NonExecutable],
            (Combine::AllOrNone, NegatedExecutable) => vec![Executable, NegatedExecutable],
            _ => vec![state],
        }
    }
}
