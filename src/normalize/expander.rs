//! Type-normalization expansion
//!
//! Rewrites every literal comparison on a field into the forms produced by
//! the field's registered normalizers:
//!
//! - `Eq`, regex include and bare ranges become an `Or` of variants
//! - `Ne` and regex exclude become an `And` of variants
//! - `Bounded` ranges become an `Or` of `Bounded` ranges, one per normalizer
//! - literal function arguments are normalized in place, against the
//!   fields the call names or, for a call naming none, every field the
//!   query references plus the term-frequency fields; `filter` calls are
//!   left alone
//!
//! A group of sibling comparisons whose variants are already all present is
//! left alone, which makes the pass idempotent.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::ast::{CompareOp, Comparison, ExprNode, FunctionArg, Literal, MarkerKind};
use crate::config::QueryConfig;
use crate::metadata::{FieldMetadataService, Normalizer};

/// Expands literal comparisons across their field's normalizers
pub fn expand(tree: &ExprNode, metadata: &dyn FieldMetadataService, config: &QueryConfig) -> ExprNode {
    NormalizationExpander::new(metadata, config).expand(tree)
}

/// Failure policy in effect for a subtree
#[derive(Debug, Clone, Copy, Default)]
struct Policy {
    lenient: bool,
    strict: bool,
    evaluation_only: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Junction {
    And,
    Or,
}

impl Junction {
    fn build(self, children: Vec<ExprNode>) -> ExprNode {
        let flat = match self {
            Junction::And => ExprNode::and(children),
            Junction::Or => ExprNode::or(children),
        };
        match flat {
            ExprNode::And(children) => ExprNode::and(dedup(children)),
            ExprNode::Or(children) => ExprNode::or(dedup(children)),
            other => other,
        }
    }
}

/// Removes structurally equal siblings, keeping the first occurrence
fn dedup(children: Vec<ExprNode>) -> Vec<ExprNode> {
    let mut seen = BTreeSet::new();
    children
        .into_iter()
        .filter(|child| seen.insert(child.clone()))
        .collect()
}

/// An expandable comparison: a single leaf or a bounded range
#[derive(Debug, Clone, Copy)]
enum Unit<'n> {
    Leaf(&'n Comparison),
    Range(&'n Comparison, &'n Comparison),
}

type UnitKey = (String, Vec<CompareOp>);

impl<'n> Unit<'n> {
    fn field(&self) -> &'n str {
        match self {
            Unit::Leaf(c) => &c.field,
            Unit::Range(lower, _) => &lower.field,
        }
    }

    fn key(&self) -> UnitKey {
        match self {
            Unit::Leaf(c) => (c.field.clone(), vec![c.op]),
            Unit::Range(lower, upper) => (lower.field.clone(), vec![lower.op, upper.op]),
        }
    }

    fn values(&self) -> Vec<String> {
        match self {
            Unit::Leaf(c) => vec![c.literal.text().unwrap_or_default().to_string()],
            Unit::Range(lower, upper) => vec![
                lower.literal.text().unwrap_or_default().to_string(),
                upper.literal.text().unwrap_or_default().to_string(),
            ],
        }
    }

    /// Junction that combines this unit's variants
    fn junction(&self) -> Junction {
        match self {
            Unit::Leaf(c) if c.op.is_negative() => Junction::And,
            _ => Junction::Or,
        }
    }

    fn rebuild(&self, values: &[String]) -> ExprNode {
        match (self, values) {
            (Unit::Leaf(c), [value]) => ExprNode::Compare(c.with_value(value.clone())),
            (Unit::Range(lower, upper), [lo, hi]) => {
                ExprNode::bounded_range(lower.with_value(lo.clone()), upper.with_value(hi.clone()))
            }
            (Unit::Leaf(c), _) => ExprNode::Compare((*c).clone()),
            (Unit::Range(lower, upper), _) => ExprNode::bounded_range((*lower).clone(), (*upper).clone()),
        }
    }
}

fn push_unique(out: &mut Vec<Vec<String>>, values: Vec<String>) {
    if !out.contains(&values) {
        out.push(values);
    }
}

/// Normalization expander over an immutable metadata snapshot
pub struct NormalizationExpander<'a> {
    metadata: &'a dyn FieldMetadataService,
    config: &'a QueryConfig,
    /// Fields whose normalizers apply to field-less function arguments
    query_fields: Vec<String>,
}

impl<'a> NormalizationExpander<'a> {
    pub fn new(metadata: &'a dyn FieldMetadataService, config: &'a QueryConfig) -> Self {
        Self {
            metadata,
            config,
            query_fields: Vec::new(),
        }
    }

    /// Returns the expanded tree; the input is not modified
    pub fn expand(&self, tree: &ExprNode) -> ExprNode {
        let mut query_fields = tree.fields();
        for field in &self.config.term_frequency_fields {
            if !query_fields.contains(field) {
                query_fields.push(field.clone());
            }
        }
        let scoped = NormalizationExpander {
            metadata: self.metadata,
            config: self.config,
            query_fields,
        };
        scoped.expand_node(tree, Policy::default())
    }

    fn expand_node(&self, node: &ExprNode, policy: Policy) -> ExprNode {
        match node {
            ExprNode::And(children) => self.expand_junction(children, Junction::And, policy),
            ExprNode::Or(children) => self.expand_junction(children, Junction::Or, policy),
            ExprNode::Not(child) => ExprNode::not(self.expand_node(child, policy)),
            ExprNode::Reference(child) => ExprNode::reference(self.expand_node(child, policy)),
            ExprNode::Compare(_) => match self.unit_of(node) {
                Some(unit) => self.expand_unit(node, unit, policy),
                None => node.clone(),
            },
            ExprNode::Function {
                namespace,
                name,
                args,
            } => self.expand_function(namespace, name, args),
            ExprNode::Marker {
                kind,
                payload,
                child,
            } => {
                let inner = match kind {
                    MarkerKind::ExceededTerm | MarkerKind::ExceededValue | MarkerKind::Drop => {
                        return node.clone();
                    }
                    MarkerKind::Bounded => {
                        if let Some(unit) = self.unit_of(node) {
                            return self.expand_unit(node, unit, policy);
                        }
                        self.expand_node(child, policy)
                    }
                    MarkerKind::Lenient => self.expand_node(
                        child,
                        Policy {
                            lenient: true,
                            ..policy
                        },
                    ),
                    MarkerKind::Strict => self.expand_node(
                        child,
                        Policy {
                            strict: true,
                            ..policy
                        },
                    ),
                    MarkerKind::EvaluationOnly => self.expand_node(
                        child,
                        Policy {
                            evaluation_only: true,
                            ..policy
                        },
                    ),
                    MarkerKind::Delayed
                    | MarkerKind::IndexHole
                    | MarkerKind::ExceededOr
                    | MarkerKind::List
                    | MarkerKind::Term => self.expand_node(child, policy),
                };
                ExprNode::Marker {
                    kind: *kind,
                    payload: payload.clone(),
                    child: Box::new(inner),
                }
            }
        }
    }

    /// Returns the expandable unit for a node, if its field has normalizers
    fn unit_of<'n>(&self, node: &'n ExprNode) -> Option<Unit<'n>> {
        let unit = match node {
            ExprNode::Compare(c) if !c.literal.is_null() => Unit::Leaf(c),
            ExprNode::Marker {
                kind: MarkerKind::Bounded,
                ..
            } => {
                let (lower, upper) = node.bounded_parts()?;
                Unit::Range(lower, upper)
            }
            _ => return None,
        };
        if self.metadata.normalizers_for(unit.field()).is_empty() {
            return None;
        }
        Some(unit)
    }

    /// Every form of a unit across the field's normalizers
    ///
    /// `None` when no normalizer succeeds.
    fn variants(&self, unit: Unit<'_>) -> Option<Vec<Vec<String>>> {
        let normalizers = self.metadata.normalizers_for(unit.field());
        let original = unit.values();
        let mut out: Vec<Vec<String>> = Vec::new();

        match unit {
            Unit::Leaf(c) => {
                for n in &normalizers {
                    let result = if c.op.is_regex() {
                        n.normalize_regex(&original[0])
                    } else {
                        n.normalize(&original[0])
                    };
                    match result {
                        Ok(value) => push_unique(&mut out, vec![value]),
                        Err(e) => trace!(field = %c.field, error = %e, "normalizer skipped"),
                    }
                }
                if out.is_empty() {
                    return None;
                }
                // a regex is always kept as written alongside its translations
                if c.op.is_regex() || out.len() > 1 {
                    push_unique(&mut out, original);
                }
            }
            Unit::Range(lower, _) => {
                let mut any = false;
                for n in &normalizers {
                    match (n.normalize(&original[0]), n.normalize(&original[1])) {
                        (Ok(lo), Ok(hi)) => {
                            any = true;
                            push_unique(&mut out, vec![lo, hi]);
                        }
                        _ => {
                            trace!(field = %lower.field, normalizer = n.name(), "range falls back to original bounds");
                            push_unique(&mut out, original.clone());
                        }
                    }
                }
                if !any {
                    return None;
                }
                if out.len() > 1 {
                    push_unique(&mut out, original);
                }
            }
        }
        Some(out)
    }

    fn expand_unit(&self, node: &ExprNode, unit: Unit<'_>, policy: Policy) -> ExprNode {
        match self.variants(unit) {
            None => self.on_failure(node, unit, policy),
            Some(variants) if variants.len() == 1 => {
                if variants[0] == unit.values() {
                    node.clone()
                } else {
                    unit.rebuild(&variants[0])
                }
            }
            Some(variants) => unit
                .junction()
                .build(variants.iter().map(|v| unit.rebuild(v)).collect()),
        }
    }

    fn expand_junction(&self, children: &[ExprNode], junction: Junction, policy: Policy) -> ExprNode {
        let units: Vec<Option<Unit<'_>>> = children
            .iter()
            .map(|c| self.unit_of(c).filter(|u| u.junction() == junction))
            .collect();

        let mut present: BTreeMap<UnitKey, BTreeSet<Vec<String>>> = BTreeMap::new();
        for unit in units.iter().flatten() {
            present.entry(unit.key()).or_default().insert(unit.values());
        }

        // a unit whose every variant is already a sibling was expanded before
        let mut covered: BTreeMap<UnitKey, BTreeSet<Vec<String>>> = BTreeMap::new();
        for unit in units.iter().flatten() {
            let key = unit.key();
            let Some(variants) = self.variants(*unit) else {
                continue;
            };
            let Some(siblings) = present.get(&key) else {
                continue;
            };
            if variants.iter().all(|v| siblings.contains(v)) {
                covered.entry(key).or_default().extend(variants);
            }
        }

        let mut out = Vec::with_capacity(children.len());
        for (child, unit) in children.iter().zip(units) {
            match unit {
                Some(u) if covered.get(&u.key()).is_some_and(|c| c.contains(&u.values())) => {
                    out.push(child.clone())
                }
                Some(u) => out.push(self.expand_unit(child, u, policy)),
                None => out.push(self.expand_node(child, policy)),
            }
        }
        junction.build(out)
    }

    fn on_failure(&self, node: &ExprNode, unit: Unit<'_>, policy: Policy) -> ExprNode {
        let field = unit.field();
        if policy.evaluation_only {
            return node.clone();
        }
        if policy.strict || self.config.is_strict(field) {
            debug!(field, query = %node, "normalization failed, clause demoted to evaluation");
            return ExprNode::marker(MarkerKind::EvaluationOnly, node.clone());
        }
        if policy.lenient || self.config.is_lenient(field) {
            debug!(field, query = %node, "normalization failed, lenient clause kept");
            return node.clone();
        }
        let reason = format!(
            "no normalizer for {} accepts '{}'",
            field,
            unit.values().join("' and '")
        );
        debug!(field, query = %node, reason = %reason, "normalization failed, clause dropped");
        ExprNode::dropped(reason, node.clone())
    }

    fn expand_function(&self, namespace: &str, name: &str, args: &[FunctionArg]) -> ExprNode {
        let unchanged = || ExprNode::Function {
            namespace: namespace.to_string(),
            name: name.to_string(),
            args: args.to_vec(),
        };
        // filter arguments are matched against raw event values
        if namespace == "filter" {
            return unchanged();
        }

        let targeted: Vec<&str> = args
            .iter()
            .filter_map(|arg| match arg {
                FunctionArg::Field(field) => Some(field.as_str()),
                _ => None,
            })
            .collect();
        let scope: Vec<&str> = if targeted.is_empty() {
            self.query_fields.iter().map(String::as_str).collect()
        } else {
            targeted
        };

        let mut normalizers: Vec<Arc<dyn Normalizer>> = Vec::new();
        for field in scope {
            for n in self.metadata.normalizers_for(field) {
                if !normalizers.iter().any(|existing| existing.name() == n.name()) {
                    normalizers.push(n);
                }
            }
        }
        if normalizers.is_empty() {
            return unchanged();
        }

        let args = args
            .iter()
            .map(|arg| match arg {
                FunctionArg::Literal(lit) if !lit.is_null() => {
                    let raw = lit.text().unwrap_or_default();
                    match normalize_argument(&normalizers, raw) {
                        Some(value) if value != raw => {
                            trace!(namespace, name, raw, normalized = %value, "function argument normalized");
                            FunctionArg::Literal(Literal::String(value))
                        }
                        _ => arg.clone(),
                    }
                }
                _ => arg.clone(),
            })
            .collect();

        ExprNode::Function {
            namespace: namespace.to_string(),
            name: name.to_string(),
            args,
        }
    }
}

/// Normalizes one function argument against the unioned normalizers
///
/// A value some normalizer already leaves unchanged is kept; otherwise the
/// first successful normalization wins.
fn normalize_argument(normalizers: &[Arc<dyn Normalizer>], raw: &str) -> Option<String> {
    let results: Vec<String> = normalizers.iter().filter_map(|n| n.normalize(raw).ok()).collect();
    if results.iter().any(|r| r == raw) {
        return Some(raw.to_string());
    }
    results.into_iter().next()
}
