//! Compiled plan tree and per-record evaluation

use std::fmt;

use super::document::{Document, Evaluation};
use super::leaf::Leaf;

/// A nested iterator plan for one record
///
/// Children evaluate in the order of the tree they were compiled from.
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    /// All children match; stops at the first child that does not
    Intersect(Vec<Plan>),
    /// Any child matches; every child is evaluated to collect values
    Union(Vec<Plan>),
    Leaf(Box<Leaf>),
    /// Matches when the inner plan does not
    Negated(Box<Plan>),
    /// An excluded clause, never matches
    Dropped { reason: String },
}

impl Plan {
    pub fn leaf(leaf: Leaf) -> Plan {
        Plan::Leaf(Box::new(leaf))
    }

    pub fn negated(inner: Plan) -> Plan {
        match inner {
            Plan::Negated(plan) => *plan,
            other => Plan::Negated(Box::new(other)),
        }
    }

    /// Evaluates against the record the plan was compiled for
    pub fn evaluate(&mut self) -> Evaluation {
        let mut document = Document::default();
        let matched = self.evaluate_into(&mut document);
        Evaluation {
            matched,
            document: if matched { document } else { Document::default() },
        }
    }

    fn evaluate_into(&mut self, document: &mut Document) -> bool {
        match self {
            Plan::Intersect(children) => {
                for child in children.iter_mut() {
                    if !child.evaluate_into(document) {
                        return false;
                    }
                }
                true
            }
            Plan::Union(children) => {
                let mut any = false;
                for child in children.iter_mut() {
                    any |= child.evaluate_into(document);
                }
                any
            }
            Plan::Leaf(leaf) => leaf.evaluate(document),
            Plan::Negated(inner) => {
                // values behind a negation never describe the match
                let mut scratch = Document::default();
                !inner.evaluate_into(&mut scratch)
            }
            Plan::Dropped { .. } => false,
        }
    }

    /// An independent copy with empty match caches
    pub fn snapshot(&self) -> Plan {
        let mut copy = self.clone();
        copy.reset();
        copy
    }

    /// Clears every leaf's match cache
    pub fn reset(&mut self) {
        match self {
            Plan::Intersect(children) | Plan::Union(children) => children.iter_mut().for_each(Plan::reset),
            Plan::Leaf(leaf) => leaf.reset(),
            Plan::Negated(inner) => inner.reset(),
            Plan::Dropped { .. } => {}
        }
    }

    /// Leaves in evaluation order
    pub fn leaves(&self) -> Vec<&Leaf> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'p>(&'p self, out: &mut Vec<&'p Leaf>) {
        match self {
            Plan::Intersect(children) | Plan::Union(children) => {
                for child in children {
                    child.collect_leaves(out);
                }
            }
            Plan::Leaf(leaf) => out.push(leaf),
            Plan::Negated(inner) => inner.collect_leaves(out),
            Plan::Dropped { .. } => {}
        }
    }

    pub fn is_negated(&self) -> bool {
        matches!(self, Plan::Negated(_))
    }
}

fn write_children(f: &mut fmt::Formatter<'_>, name: &str, children: &[Plan]) -> fmt::Result {
    write!(f, "{}(", name)?;
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", child)?;
    }
    write!(f, ")")
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Plan::Intersect(children) => write_children(f, "Intersect", children),
            Plan::Union(children) => write_children(f, "Union", children),
            Plan::Leaf(leaf) => write!(f, "Leaf({})", leaf),
            Plan::Negated(inner) => write!(f, "Negated({})", inner),
            Plan::Dropped { reason } => write!(f, "Dropped('{}')", reason),
        }
    }
}
