//! Executability classification
//!
//! A single read-only walk that assigns every node an
//! [`ExecutabilityState`]. Leaves are judged against the resolved field
//! sets, junctions combine their children's states, and negation either
//! swaps executable and negated-executable (field index mode) or demotes
//! to non-executable (global mode).

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::ast::{CompareOp, Comparison, ExprNode, MarkerKind, NodeId, ANY_FIELD, NO_FIELD};
use crate::config::QueryConfig;
use crate::metadata::{FieldMetadataService, FieldSets};

use super::state::{ClassificationMode, Combine, ExecutabilityState};
use super::summary::Contributors;

/// Classifies a tree in the given mode
pub fn classify(
    tree: &ExprNode,
    metadata: &dyn FieldMetadataService,
    config: &QueryConfig,
    mode: ClassificationMode,
) -> ClassificationReport {
    ExecutabilityClassifier::new(metadata, config, mode).classify(tree)
}

/// Outcome of classifying one tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationReport {
    pub mode: ClassificationMode,
    /// State of the root
    pub state: ExecutabilityState,
    /// `Summary: STATE:[term, ...]` over the root's contributing terms
    pub summary: String,
    pub contributors: Contributors,
    /// State of every node, keyed by pre-order position
    pub states: BTreeMap<NodeId, ExecutabilityState>,
    /// Size-capped expansions, reported for diagnostics
    pub exceeded: Vec<String>,
}

impl ClassificationReport {
    /// Returns true when the query can be answered from indexes in this mode
    pub fn is_executable(&self) -> bool {
        match self.state {
            ExecutabilityState::Executable => true,
            ExecutabilityState::NegatedExecutable => self.mode == ClassificationMode::FieldIndex,
            _ => false,
        }
    }

    pub fn state_of(&self, id: NodeId) -> Option<ExecutabilityState> {
        self.states.get(&id).copied()
    }
}

/// State and contributing terms of one subtree
#[derive(Debug, Clone)]
struct Classified {
    state: ExecutabilityState,
    contributors: Contributors,
}

impl Classified {
    fn ignorable() -> Self {
        Self {
            state: ExecutabilityState::Ignorable,
            contributors: Contributors::default(),
        }
    }

    fn term(state: ExecutabilityState, node: &ExprNode) -> Self {
        Self {
            state,
            contributors: Contributors::single(state, node.to_query()),
        }
    }
}

/// Executability classifier over resolved field sets
pub struct ExecutabilityClassifier<'a> {
    fields: FieldSets,
    config: &'a QueryConfig,
    mode: ClassificationMode,
}

impl<'a> ExecutabilityClassifier<'a> {
    pub fn new(metadata: &dyn FieldMetadataService, config: &'a QueryConfig, mode: ClassificationMode) -> Self {
        let mut fields = FieldSets::resolve(metadata, &config.datatype_filter);
        fields.index_only.extend(config.index_only_fields.iter().cloned());
        fields.non_event.extend(config.index_only_fields.iter().cloned());
        fields.indexed.extend(config.index_only_fields.iter().cloned());
        Self { fields, config, mode }
    }

    pub fn classify(&self, tree: &ExprNode) -> ClassificationReport {
        let mut walk = Walk {
            classifier: self,
            next_id: 0,
            states: BTreeMap::new(),
            exceeded: Vec::new(),
        };
        let root = walk.visit(tree, false);
        let summary = root.contributors.summary(self.config.max_terms_to_print);
        debug!(mode = ?self.mode, state = %root.state, summary = %summary, "classified query");

        ClassificationReport {
            mode: self.mode,
            state: root.state,
            summary,
            contributors: root.contributors,
            states: walk.states,
            exceeded: walk.exceeded,
        }
    }

    /// A node that can only be answered by evaluating the record; impossible
    /// when one of its fields has no event value
    fn needs_evaluation(&self, fields: &[String]) -> ExecutabilityState {
        if fields.iter().any(|f| self.fields.is_non_event(f)) {
            ExecutabilityState::Error
        } else {
            ExecutabilityState::NonExecutable
        }
    }

    /// An equality or not-equal the index cannot answer, which only leaves
    /// a null test; impossible when the field exists only in the index
    fn unanswerable_match(&self, field: &str) -> ExecutabilityState {
        if self.fields.is_index_only(field) {
            ExecutabilityState::Error
        } else {
            ExecutabilityState::NonExecutable
        }
    }

    fn leaf_state(&self, c: &Comparison) -> ExecutabilityState {
        use ExecutabilityState::*;

        if c.field == ANY_FIELD {
            return match c.op {
                CompareOp::Eq | CompareOp::Regex if !c.literal.is_null() => Executable,
                _ => NonExecutable,
            };
        }

        let indexed = self.fields.is_indexed(&c.field);
        let state = match c.op {
            _ if c.literal.is_null() => NonExecutable,
            CompareOp::Eq | CompareOp::Regex if indexed => Executable,
            CompareOp::Ne if indexed && self.mode == ClassificationMode::FieldIndex => NegatedExecutable,
            _ => NonExecutable,
        };
        match (state, c.op) {
            (NonExecutable, CompareOp::Eq | CompareOp::Ne | CompareOp::Regex) => self.unanswerable_match(&c.field),
            (NonExecutable, _) => self.needs_evaluation(std::slice::from_ref(&c.field)),
            _ => state,
        }
    }

    fn negate(&self, inner: Classified) -> Classified {
        use ExecutabilityState::*;

        match (self.mode, inner.state) {
            (ClassificationMode::FieldIndex, Executable) => Classified {
                state: NegatedExecutable,
                contributors: inner.contributors.swap(Executable, NegatedExecutable),
            },
            (ClassificationMode::FieldIndex, NegatedExecutable) => Classified {
                state: Executable,
                contributors: inner.contributors.swap(Executable, NegatedExecutable),
            },
            (ClassificationMode::FieldIndex, _) | (_, Error) | (_, Ignorable) => inner,
            (ClassificationMode::Global, _) => Classified {
                state: NonExecutable,
                contributors: inner.contributors.collapse_into(NonExecutable, &[Error]),
            },
        }
    }
}

/// Per-call traversal state
struct Walk<'c, 'a> {
    classifier: &'c ExecutabilityClassifier<'a>,
    next_id: usize,
    states: BTreeMap<NodeId, ExecutabilityState>,
    exceeded: Vec<String>,
}

impl Walk<'_, '_> {
    fn allocate(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    fn record(&mut self, id: NodeId, state: ExecutabilityState) {
        self.states.insert(id, state);
    }

    /// Assigns one state to a node classified as a unit and to everything below it
    fn record_unit(&mut self, id: NodeId, node: &ExprNode, state: ExecutabilityState) {
        self.record(id, state);
        for _ in 1..node.node_count() {
            let descendant = self.allocate();
            self.record(descendant, state);
        }
    }

    fn visit(&mut self, node: &ExprNode, negated: bool) -> Classified {
        let id = self.allocate();
        let result = match node {
            ExprNode::And(children) => self.junction(children, Combine::for_and(negated), negated),
            ExprNode::Or(children) => self.junction(children, Combine::for_or(negated), negated),
            ExprNode::Reference(child) => self.visit(child, negated),
            ExprNode::Not(child) => return self.negation(id, child, negated),
            ExprNode::Compare(c) => {
                if c.field == NO_FIELD {
                    Classified::ignorable()
                } else {
                    Classified::term(self.classifier.leaf_state(c), node)
                }
            }
            ExprNode::Function { .. } => {
                Classified::term(ExecutabilityState::NonExecutable, node)
            }
            ExprNode::Marker { kind, child, .. } => return self.marker(id, node, *kind, child, negated),
        };
        self.record(id, result.state);
        result
    }

    fn junction(&mut self, children: &[ExprNode], combine: Combine, negated: bool) -> Classified {
        let results: Vec<Classified> = children.iter().map(|c| self.visit(c, negated)).collect();
        let states: BTreeSet<ExecutabilityState> = results.iter().map(|r| r.state).collect();
        let state = combine.apply(&states);
        let reported = combine.reported(state);
        let mut contributors = Contributors::default();
        for result in &results {
            contributors.absorb(&result.contributors, &reported);
        }
        Classified { state, contributors }
    }

    /// Peels a chain of negations; an even count cancels
    fn negation(&mut self, id: NodeId, first: &ExprNode, negated: bool) -> Classified {
        let mut chain = vec![id];
        let mut count = 1usize;
        let mut inner = first;
        loop {
            match inner {
                ExprNode::Not(child) => {
                    chain.push(self.allocate());
                    count += 1;
                    inner = child;
                }
                ExprNode::Reference(child) => {
                    chain.push(self.allocate());
                    inner = child;
                }
                _ => break,
            }
        }

        let odd = count % 2 == 1;
        let result = self.visit(inner, negated ^ odd);
        let result = if odd { self.classifier.negate(result) } else { result };
        for link in chain {
            self.record(link, result.state);
        }
        result
    }

    fn marker(
        &mut self,
        id: NodeId,
        node: &ExprNode,
        kind: MarkerKind,
        child: &ExprNode,
        negated: bool,
    ) -> Classified {
        use ExecutabilityState::*;

        let unit = match kind {
            MarkerKind::Bounded => match node.bounded_parts() {
                Some((lower, _)) if lower.field == NO_FIELD => Some(Classified::ignorable()),
                Some((lower, _)) if self.classifier.fields.is_indexed(&lower.field) => {
                    Some(Classified::term(Executable, node))
                }
                Some((lower, _)) => Some(Classified::term(
                    self.classifier.needs_evaluation(std::slice::from_ref(&lower.field)),
                    node,
                )),
                None => None,
            },
            MarkerKind::List | MarkerKind::Term | MarkerKind::Lenient | MarkerKind::Strict => None,
            MarkerKind::Delayed | MarkerKind::ExceededTerm | MarkerKind::IndexHole => {
                Some(Classified::term(NonExecutable, child))
            }
            MarkerKind::EvaluationOnly => Some(Classified::term(
                self.classifier.needs_evaluation(&child.fields()),
                child,
            )),
            MarkerKind::ExceededValue | MarkerKind::ExceededOr => {
                self.exceeded.push(node.to_query());
                Some(Classified::term(Executable, node))
            }
            MarkerKind::Drop => Some(Classified::ignorable()),
        };

        match unit {
            Some(result) => {
                self.record_unit(id, node, result.state);
                result
            }
            None => {
                let result = self.visit(child, negated);
                self.record(id, result.state);
                result
            }
        }
    }
}
