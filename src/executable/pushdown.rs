//! Delaying partially executable branches
//!
//! A conjunction is classified `Partial` when one of its children mixes
//! index-resolvable and unresolvable branches. If a sibling already anchors
//! the conjunction, that child can be moved under a `Delayed` marker: the
//! anchor drives the index lookups and the delayed branch is checked when
//! the record is evaluated. Negated subtrees are left as they are.

use tracing::debug;

use crate::ast::{ExprNode, MarkerKind};
use crate::config::QueryConfig;
use crate::metadata::FieldMetadataService;

use super::classifier::ExecutabilityClassifier;
use super::state::{ClassificationMode, ExecutabilityState};

/// Delays the partial branches of anchored conjunctions
pub fn push_down(
    tree: &ExprNode,
    metadata: &dyn FieldMetadataService,
    config: &QueryConfig,
    mode: ClassificationMode,
) -> ExprNode {
    ExecutabilityClassifier::new(metadata, config, mode).push_down(tree)
}

impl ExecutabilityClassifier<'_> {
    /// Returns the rewritten tree; the input is not modified
    pub fn push_down(&self, tree: &ExprNode) -> ExprNode {
        match tree {
            ExprNode::And(children) => self.push_down_and(children),
            ExprNode::Or(children) => ExprNode::or(children.iter().map(|c| self.push_down(c)).collect()),
            ExprNode::Reference(child) => ExprNode::reference(self.push_down(child)),
            ExprNode::Marker {
                kind: kind @ (MarkerKind::Lenient | MarkerKind::Strict | MarkerKind::List | MarkerKind::Term),
                payload,
                child,
            } => ExprNode::Marker {
                kind: *kind,
                payload: payload.clone(),
                child: Box::new(self.push_down(child)),
            },
            _ => tree.clone(),
        }
    }

    fn push_down_and(&self, children: &[ExprNode]) -> ExprNode {
        let children: Vec<ExprNode> = children.iter().map(|c| self.push_down(c)).collect();
        let reports: Vec<_> = children.iter().map(|c| self.classify(c)).collect();
        if !reports.iter().any(|r| r.is_executable()) {
            return ExprNode::and(children);
        }

        let out = children
            .into_iter()
            .zip(&reports)
            .map(|(child, report)| {
                if report.state == ExecutabilityState::Partial {
                    debug!(query = %child, summary = %report.summary, "partial branch delayed");
                    ExprNode::marker(MarkerKind::Delayed, child.unwrap_references().clone())
                } else {
                    child
                }
            })
            .collect();
        ExprNode::and(out)
    }
}
