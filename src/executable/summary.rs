//! Contributing terms grouped by state, and the summary line built from them

use std::collections::{BTreeMap, BTreeSet};

use super::state::ExecutabilityState;

/// Query text of the subtrees that produced each state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Contributors {
    terms: BTreeMap<ExecutabilityState, BTreeSet<String>>,
}

impl Contributors {
    pub fn single(state: ExecutabilityState, term: impl Into<String>) -> Self {
        let mut contributors = Self::default();
        contributors.terms.entry(state).or_default().insert(term.into());
        contributors
    }

    pub fn is_empty(&self) -> bool {
        self.terms.values().all(BTreeSet::is_empty)
    }

    /// Terms recorded for a state
    pub fn terms(&self, state: ExecutabilityState) -> impl Iterator<Item = &str> {
        self.terms.get(&state).into_iter().flatten().map(String::as_str)
    }

    /// Copies the terms of the given states from another set
    pub(crate) fn absorb(&mut self, other: &Contributors, states: &[ExecutabilityState]) {
        for state in states {
            if let Some(terms) = other.terms.get(state) {
                self.terms.entry(*state).or_default().extend(terms.iter().cloned());
            }
        }
    }

    /// Exchanges the terms of two states
    pub(crate) fn swap(mut self, a: ExecutabilityState, b: ExecutabilityState) -> Self {
        let first = self.terms.remove(&a);
        let second = self.terms.remove(&b);
        if let Some(terms) = first {
            self.terms.insert(b, terms);
        }
        if let Some(terms) = second {
            self.terms.insert(a, terms);
        }
        self
    }

    /// Moves every term not already in `keep` under `target`
    pub(crate) fn collapse_into(self, target: ExecutabilityState, keep: &[ExecutabilityState]) -> Self {
        let mut out = Self::default();
        for (state, terms) in self.terms {
            let state = if keep.contains(&state) { state } else { target };
            out.terms.entry(state).or_default().extend(terms);
        }
        out
    }

    /// Renders `Summary: STATE:[term, ...]; ...`
    ///
    /// States with more than `max_terms` terms print the count and the first
    /// `max_terms` terms only.
    pub fn summary(&self, max_terms: usize) -> String {
        let parts: Vec<String> = self
            .terms
            .iter()
            .filter(|(_, terms)| !terms.is_empty())
            .map(|(state, terms)| {
                let shown: Vec<&str> = terms.iter().take(max_terms).map(String::as_str).collect();
                if terms.len() > max_terms {
                    format!("{}:{} terms [{}]", state.label(), terms.len(), shown.join(", "))
                } else {
                    format!("{}:[{}]", state.label(), shown.join(", "))
                }
            })
            .collect();
        format!("Summary: {}", parts.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::ExecutabilityState::*;

    #[test]
    fn test_empty_summary() {
        assert_eq!(Contributors::default().summary(3), "Summary: ");
    }

    #[test]
    fn test_single_state() {
        let c = Contributors::single(NonExecutable, "A == 'x'");
        assert_eq!(c.summary(3), "Summary: NON_EXECUTABLE:[A == 'x']");
    }

    #[test]
    fn test_states_separated_and_deduplicated() {
        let mut c = Contributors::single(Executable, "A == 'a'");
        c.absorb(&Contributors::single(Executable, "A == 'a'"), &[Executable]);
        c.absorb(&Contributors::single(NegatedExecutable, "B == 'b'"), &[NegatedExecutable]);
        assert_eq!(c.summary(3), "Summary: EXECUTABLE:[A == 'a']; NEGATED_EXECUTABLE:[B == 'b']");
    }

    #[test]
    fn test_capped_terms() {
        let mut c = Contributors::default();
        for term in ["A == '1'", "A == '2'", "A == '3'", "A == '4'"] {
            c.absorb(&Contributors::single(NonExecutable, term), &[NonExecutable]);
        }
        assert_eq!(
            c.summary(2),
            "Summary: NON_EXECUTABLE:4 terms [A == '1', A == '2']"
        );
    }

    #[test]
    fn test_absorb_filters_states() {
        let mut c = Contributors::default();
        c.absorb(&Contributors::single(Executable, "A == 'a'"), &[NonExecutable]);
        assert!(c.is_empty());
    }

    #[test]
    fn test_swap_and_collapse() {
        let c = Contributors::single(Executable, "A == 'a'").swap(Executable, NegatedExecutable);
        assert_eq!(c.terms(NegatedExecutable).collect::<Vec<_>>(), vec!["A == 'a'"]);

        let c = c.collapse_into(NonExecutable, &[Error]);
        assert_eq!(c.terms(NonExecutable).count(), 1);
        assert_eq!(c.terms(NegatedExecutable).count(), 0);
    }
}
