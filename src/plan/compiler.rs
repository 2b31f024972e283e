//! Iterator-plan compilation
//!
//! Turns a rewritten tree into a [`Plan`] for one record:
//! - `And`/`Or` become `Intersect`/`Union` in child order
//! - equality, regex and bounded ranges on indexed fields become leaves
//! - `!=`, `!~` and `!` become negated leaves, which need a positive
//!   sibling in some enclosing conjunction
//! - subtrees that must be evaluated against the record compile to nothing
//!
//! An `Intersect` simply omits children with no lookup, which widens it. A
//! `Union` with such a child cannot bound its matches, so the whole union
//! compiles to nothing. Beneath a negation widening would narrow the result,
//! so there an `Intersect` missing any child compiles to nothing as well.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::ast::{CompareOp, Comparison, ExprNode, MarkerKind, ANY_FIELD, NO_FIELD};
use crate::config::QueryConfig;

use super::errors::{PlanError, PlanResult};
use super::key::{RecordRange, TimeFilter};
use super::leaf::{Leaf, LeafKind, RegexMatcher};
use super::source::SourceFactory;
use super::tree::Plan;

/// Field sets and filters the compiler consults
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanOptions {
    pub term_frequency_fields: BTreeSet<String>,
    pub aggregation_fields: BTreeSet<String>,
    pub index_only_fields: BTreeSet<String>,
    /// Fields with field index entries; `None` treats every field as indexed
    pub indexed_fields: Option<BTreeSet<String>>,
    pub time_filter: Option<TimeFilter>,
    /// Rejects regex leaves without a literal prefix instead of scanning
    /// every value of the field
    pub full_scan_disabled: bool,
}

impl PlanOptions {
    pub fn from_config(config: &QueryConfig) -> Self {
        Self {
            term_frequency_fields: config.term_frequency_fields.clone(),
            aggregation_fields: config.aggregation_fields.clone(),
            index_only_fields: config.index_only_fields.clone(),
            indexed_fields: None,
            time_filter: TimeFilter::from_dates(config.begin_date, config.end_date),
            full_scan_disabled: false,
        }
    }

    pub fn with_indexed_fields<I: IntoIterator<Item = S>, S: Into<String>>(mut self, fields: I) -> Self {
        self.indexed_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_time_filter(mut self, filter: TimeFilter) -> Self {
        self.time_filter = Some(filter);
        self
    }

    pub fn with_full_scan_disabled(mut self) -> Self {
        self.full_scan_disabled = true;
        self
    }

    fn is_indexed(&self, field: &str) -> bool {
        self.indexed_fields.as_ref().map_or(true, |f| f.contains(field)) || self.index_only_fields.contains(field)
    }

    /// Index-only fields can only be recovered by aggregation
    fn aggregates(&self, field: &str) -> bool {
        self.aggregation_fields.contains(field) || self.index_only_fields.contains(field)
    }
}

/// Compiles a tree into a plan scoped to one record
pub fn compile(
    tree: &ExprNode,
    record: &RecordRange,
    options: &PlanOptions,
    sources: &dyn SourceFactory,
) -> PlanResult<Plan> {
    PlanCompiler::new(record, options, sources).compile(tree)
}

/// Plan compiler for one record
pub struct PlanCompiler<'a> {
    record: &'a RecordRange,
    options: &'a PlanOptions,
    sources: &'a dyn SourceFactory,
}

impl<'a> PlanCompiler<'a> {
    pub fn new(record: &'a RecordRange, options: &'a PlanOptions, sources: &'a dyn SourceFactory) -> Self {
        Self {
            record,
            options,
            sources,
        }
    }

    pub fn compile(&self, tree: &ExprNode) -> PlanResult<Plan> {
        let plan = self.compile_node(tree, false)?.ok_or_else(|| PlanError::Unanchored {
            query: tree.to_query(),
        })?;
        if plan.is_negated() {
            return Err(PlanError::TopLevelNegation {
                query: tree.to_query(),
            });
        }
        check_anchored(&plan, false)?;
        debug!(record = %self.record, plan = %plan, "compiled plan");
        Ok(plan)
    }

    fn compile_node(&self, node: &ExprNode, negated: bool) -> PlanResult<Option<Plan>> {
        match node {
            ExprNode::And(children) => {
                let mut plans = Vec::with_capacity(children.len());
                for child in children {
                    match self.compile_node(child, negated)? {
                        Some(plan) => plans.push(plan),
                        None if negated => return Ok(None),
                        None => {}
                    }
                }
                Ok(match plans.len() {
                    0 => None,
                    1 => plans.pop(),
                    _ => Some(Plan::Intersect(plans)),
                })
            }
            ExprNode::Or(children) => {
                let mut plans = Vec::with_capacity(children.len());
                for child in children {
                    match self.compile_node(child, negated)? {
                        Some(plan) => plans.push(plan),
                        None => return Ok(None),
                    }
                }
                Ok(match plans.len() {
                    0 => None,
                    1 => plans.pop(),
                    _ => Some(Plan::Union(plans)),
                })
            }
            ExprNode::Not(child) => Ok(self.compile_node(child, !negated)?.map(Plan::negated)),
            ExprNode::Reference(child) => self.compile_node(child, negated),
            ExprNode::Compare(c) => self.compile_comparison(c),
            ExprNode::Function { .. } => Ok(None),
            ExprNode::Marker {
                kind,
                payload,
                child,
            } => match kind {
                MarkerKind::Bounded => match node.bounded_parts() {
                    Some((lower, upper)) => self.compile_range(lower, upper),
                    None => self.compile_node(child, negated),
                },
                MarkerKind::Drop => Ok(Some(Plan::Dropped {
                    reason: payload.reason().unwrap_or_default().to_string(),
                })),
                MarkerKind::ExceededValue
                | MarkerKind::ExceededOr
                | MarkerKind::List
                | MarkerKind::Term
                | MarkerKind::Lenient
                | MarkerKind::Strict => self.compile_node(child, negated),
                MarkerKind::Delayed
                | MarkerKind::EvaluationOnly
                | MarkerKind::ExceededTerm
                | MarkerKind::IndexHole => Ok(None),
            },
        }
    }

    fn new_leaf(&self, field: &str, kind: LeafKind) -> Leaf {
        Leaf::new(field, kind, self.record.clone(), self.sources.deep_copy())
            .with_aggregation(
                self.options.aggregates(field),
                self.options.term_frequency_fields.contains(field),
            )
            .with_time_filter(self.options.time_filter)
    }

    fn compile_comparison(&self, c: &Comparison) -> PlanResult<Option<Plan>> {
        if c.field == ANY_FIELD || c.field == NO_FIELD {
            return Ok(None);
        }
        let Some(value) = c.literal.text() else {
            if self.options.index_only_fields.contains(&c.field) {
                return Err(PlanError::NullIndexOnlyField { field: c.field.clone() });
            }
            warn!(field = %c.field, "null comparison left to record evaluation");
            return Ok(None);
        };
        if !self.options.is_indexed(&c.field) {
            return Ok(None);
        }

        let plan = match c.op {
            CompareOp::Eq => Plan::leaf(self.new_leaf(&c.field, LeafKind::Point(value.to_string()))),
            CompareOp::Ne => Plan::negated(Plan::leaf(self.new_leaf(&c.field, LeafKind::Point(value.to_string())))),
            CompareOp::Regex => Plan::leaf(self.regex_leaf(&c.field, value)?),
            CompareOp::NotRegex => Plan::negated(Plan::leaf(self.regex_leaf(&c.field, value)?)),
            CompareOp::Lt | CompareOp::Le | CompareOp::Gt | CompareOp::Ge => return Ok(None),
        };
        Ok(Some(plan))
    }

    fn regex_leaf(&self, field: &str, pattern: &str) -> PlanResult<Leaf> {
        let matcher = RegexMatcher::new(pattern).map_err(|e| PlanError::InvalidRegex {
            field: field.to_string(),
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        let (prefix, complete) = matcher.literal_prefix();
        if prefix.is_empty() && !complete && self.options.full_scan_disabled {
            return Err(PlanError::Unresolvable {
                field: field.to_string(),
                reason: format!("regex '{}' has no literal prefix and full scans are disabled", pattern),
            });
        }
        Ok(self.new_leaf(field, LeafKind::Regex(matcher)))
    }

    fn compile_range(&self, lower: &Comparison, upper: &Comparison) -> PlanResult<Option<Plan>> {
        if !self.options.is_indexed(&lower.field) {
            return Ok(None);
        }
        let (Some(lo), Some(hi)) = (lower.literal.text(), upper.literal.text()) else {
            return Ok(None);
        };
        let kind = LeafKind::Range {
            lower: lo.to_string(),
            lower_inclusive: lower.op == CompareOp::Ge,
            upper: hi.to_string(),
            upper_inclusive: upper.op == CompareOp::Le,
        };
        Ok(Some(Plan::leaf(self.new_leaf(&lower.field, kind))))
    }
}

/// Every negated plan needs a positive sibling in an enclosing intersection
fn check_anchored(plan: &Plan, anchored: bool) -> PlanResult<()> {
    match plan {
        Plan::Intersect(children) => {
            let anchored = anchored || children.iter().any(|c| !c.is_negated());
            children.iter().try_for_each(|c| check_anchored(c, anchored))
        }
        Plan::Union(children) => children.iter().try_for_each(|c| check_anchored(c, anchored)),
        Plan::Negated(inner) => {
            if !anchored {
                return Err(PlanError::UnanchoredNegation {
                    query: plan.to_string(),
                });
            }
            check_anchored(inner, true)
        }
        Plan::Leaf(_) | Plan::Dropped { .. } => Ok(()),
    }
}
