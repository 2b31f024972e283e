//! Composite range folding
//!
//! Within each conjunction, bounds on the components of a composite mapping
//! are replaced by one lookup on the composite field:
//!
//! - all components equal: a single `Eq` on the composite
//! - otherwise: a `Bounded` composite range plus the original predicates
//!   under a `Delayed` marker, which keeps evaluation exact
//!
//! Mappings are tried longest first and a predicate is consumed by at most
//! one mapping. Component siblings of a disjunction are distributed into
//! its disjuncts when that lets a disjunct fold. Negations and
//! evaluation-only subtrees are left untouched.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, trace};

use crate::ast::{CompareOp, Comparison, ExprNode, Literal, MarkerKind};
use crate::config::QueryConfig;

use super::bounds::{composite_term, ComponentBound, CompositeTerm};
use super::mapping::{Alphabet, CompositeMapping};

/// Folds component predicates into composite lookups
pub fn fold(tree: &ExprNode, config: &QueryConfig) -> ExprNode {
    CompositeFolder::new(config).fold(tree)
}

/// Bounds on one field gathered from the children of a conjunction
#[derive(Debug, Default)]
struct Candidate {
    bound: ComponentBound,
    indices: Vec<usize>,
    conflict: bool,
}

impl Candidate {
    fn add(&mut self, lower: Option<(CompareOp, String)>, upper: Option<(CompareOp, String)>, index: usize) {
        if (lower.is_some() && self.bound.lower.is_some()) || (upper.is_some() && self.bound.upper.is_some()) {
            self.conflict = true;
        }
        if lower.is_some() {
            self.bound.lower = lower;
        }
        if upper.is_some() {
            self.bound.upper = upper;
        }
        self.indices.push(index);
    }
}

fn bound_of(c: &Comparison) -> Option<(CompareOp, String)> {
    c.literal.text().map(|v| (c.op, v.to_string()))
}

/// Collects usable per-field bounds from conjunction children
fn collect_candidates(children: &[ExprNode]) -> BTreeMap<String, Candidate> {
    let mut candidates: BTreeMap<String, Candidate> = BTreeMap::new();
    for (index, child) in children.iter().enumerate() {
        let node = child.unwrap_references();
        if let Some((lower, upper)) = node.bounded_parts() {
            candidates
                .entry(lower.field.clone())
                .or_default()
                .add(bound_of(lower), bound_of(upper), index);
            continue;
        }
        let Some(c) = node.as_comparison() else {
            continue;
        };
        let Some(bound) = bound_of(c) else {
            continue;
        };
        let entry = candidates.entry(c.field.clone()).or_default();
        match c.op {
            CompareOp::Eq => entry.add(Some(bound.clone()), Some(bound), index),
            CompareOp::Gt | CompareOp::Ge => entry.add(Some(bound), None, index),
            CompareOp::Lt | CompareOp::Le => entry.add(None, Some(bound), index),
            _ => {}
        }
    }
    candidates.retain(|_, c| !c.conflict && !c.indices.is_empty());
    candidates
}

/// Composite folder over a fixed configuration
pub struct CompositeFolder<'a> {
    config: &'a QueryConfig,
    mappings: Vec<&'a CompositeMapping>,
}

impl<'a> CompositeFolder<'a> {
    pub fn new(config: &'a QueryConfig) -> Self {
        let mut mappings: Vec<&CompositeMapping> = config.composites.iter().collect();
        mappings.sort_by_key(|m| (Reverse(m.components.len()), m.name.clone()));
        Self { config, mappings }
    }

    /// Returns the folded tree; the input is not modified
    pub fn fold(&self, tree: &ExprNode) -> ExprNode {
        if self.mappings.is_empty() {
            return tree.clone();
        }
        self.fold_node(tree)
    }

    fn fold_node(&self, node: &ExprNode) -> ExprNode {
        match node {
            ExprNode::And(children) => self.fold_and(children),
            ExprNode::Or(children) => ExprNode::or(children.iter().map(|c| self.fold_node(c)).collect()),
            ExprNode::Reference(child) => ExprNode::reference(self.fold_node(child)),
            ExprNode::Compare(_) => self.rewrite_overloaded(node).unwrap_or_else(|| node.clone()),
            ExprNode::Marker {
                kind,
                payload,
                child,
            } => match kind {
                MarkerKind::Bounded => self.rewrite_overloaded(node).unwrap_or_else(|| node.clone()),
                MarkerKind::Lenient | MarkerKind::Strict | MarkerKind::List | MarkerKind::Term => {
                    ExprNode::Marker {
                        kind: *kind,
                        payload: payload.clone(),
                        child: Box::new(self.fold_node(child)),
                    }
                }
                _ => node.clone(),
            },
            ExprNode::Not(_) | ExprNode::Function { .. } => node.clone(),
        }
    }

    fn fold_and(&self, children: &[ExprNode]) -> ExprNode {
        if let Some(distributed) = self.distribute(children) {
            return distributed;
        }
        self.compose(children).0
    }

    /// True for a bound on a field that is a component of some mapping
    fn is_component_bound(&self, node: &ExprNode) -> bool {
        let node = node.unwrap_references();
        let field = match node.bounded_parts() {
            Some((lower, _)) => &lower.field,
            None => match node.as_comparison() {
                Some(c) if !c.literal.is_null() && (c.op == CompareOp::Eq || c.op.is_range()) => &c.field,
                _ => return false,
            },
        };
        self.mappings.iter().any(|m| m.position(field).is_some())
    }

    /// Distributes component siblings into the disjuncts of an `Or` child
    ///
    /// `A && (B || C && D)` folds as `(A && B) || (A && C && D)` when some
    /// disjunct folds a distributed sibling together with its own bounds.
    /// Siblings that are not components of any mapping stay outside.
    fn distribute(&self, children: &[ExprNode]) -> Option<ExprNode> {
        for (i, child) in children.iter().enumerate() {
            let ExprNode::Or(disjuncts) = child.unwrap_references() else {
                continue;
            };
            let anchors: Vec<usize> = (0..children.len())
                .filter(|&j| j != i && self.is_component_bound(&children[j]))
                .collect();
            if anchors.is_empty() {
                continue;
            }

            let mut folded = Vec::with_capacity(disjuncts.len());
            let mut joined = false;
            for disjunct in disjuncts {
                let mut conjunction: Vec<ExprNode> = anchors.iter().map(|&j| children[j].clone()).collect();
                let start = conjunction.len();
                match disjunct.unwrap_references() {
                    ExprNode::And(conjuncts) => conjunction.extend(conjuncts.iter().cloned()),
                    _ => conjunction.push(disjunct.clone()),
                }
                let (node, consumed) = self.compose(&conjunction);
                joined |= consumed.iter().any(|&k| k < start) && consumed.iter().any(|&k| k >= start);
                folded.push(node);
            }
            if !joined {
                continue;
            }

            debug!(
                anchors = anchors.len(),
                disjuncts = disjuncts.len(),
                "distributed composite fold over disjunction"
            );
            let mut distributed = Some(ExprNode::or(folded));
            let mut out = Vec::with_capacity(children.len() - anchors.len());
            for (j, sibling) in children.iter().enumerate() {
                if j == i {
                    out.extend(distributed.take());
                } else if !anchors.contains(&j) {
                    out.push(self.fold_node(sibling));
                }
            }
            return Some(ExprNode::and(out));
        }
        None
    }

    /// Folds the children of one conjunction, returning the new conjunction
    /// and the indices of the children it consumed
    fn compose(&self, children: &[ExprNode]) -> (ExprNode, BTreeSet<usize>) {
        let candidates = collect_candidates(children);
        let mut consumed: BTreeSet<usize> = BTreeSet::new();
        let mut replacements: BTreeMap<usize, Vec<ExprNode>> = BTreeMap::new();

        for mapping in &self.mappings {
            let prefix: Vec<&Candidate> = mapping
                .components
                .iter()
                .map_while(|component| {
                    candidates
                        .get(component)
                        .filter(|c| c.indices.iter().all(|i| !consumed.contains(i)))
                })
                .collect();
            if prefix.len() < 2 {
                continue;
            }

            let bounds: Vec<Option<ComponentBound>> = (0..mapping.components.len())
                .map(|i| prefix.get(i).map(|c| c.bound.clone()))
                .collect();
            let legacy = mapping.includes_legacy_data(self.config.begin_date);
            let term = match composite_term(mapping, &bounds, |f| self.config.alphabet(f), legacy) {
                Ok(term) => term,
                Err(skip) => {
                    trace!(composite = %mapping.name, reason = %skip, "composite fold skipped");
                    continue;
                }
            };

            let indices: BTreeSet<usize> = prefix.iter().flat_map(|c| c.indices.iter().copied()).collect();
            let Some(&first) = indices.iter().next() else {
                continue;
            };
            let nodes = composite_nodes(mapping, term, children, &indices);
            debug!(
                composite = %mapping.name,
                components = prefix.len(),
                folded = %ExprNode::and(nodes.clone()),
                "folded composite range"
            );
            consumed.extend(indices);
            replacements.insert(first, nodes);
        }

        let mut out = Vec::with_capacity(children.len());
        for (i, child) in children.iter().enumerate() {
            if let Some(nodes) = replacements.remove(&i) {
                out.extend(nodes);
            }
            if !consumed.contains(&i) {
                out.push(self.fold_node(child));
            }
        }
        (ExprNode::and(out), consumed)
    }

    fn overloaded_alphabet(&self, field: &str) -> Option<Alphabet> {
        if self.mappings.iter().any(|m| m.is_overloaded() && m.name == field) {
            self.config.alphabet(field)
        } else {
            None
        }
    }

    /// Widens a lone bound on an overloaded composite field so that it also
    /// covers composite values sharing the first component
    fn rewrite_overloaded(&self, node: &ExprNode) -> Option<ExprNode> {
        if let Some((lower, upper)) = node.bounded_parts() {
            let alphabet = self.overloaded_alphabet(&lower.field)?;
            let new_lower = step_past(lower, alphabet);
            let new_upper = step_past(upper, alphabet);
            if new_lower.is_none() && new_upper.is_none() {
                return None;
            }
            return Some(ExprNode::bounded_range(
                new_lower.unwrap_or_else(|| lower.clone()),
                new_upper.unwrap_or_else(|| upper.clone()),
            ));
        }

        let c = node.as_comparison()?;
        let alphabet = self.overloaded_alphabet(&c.field)?;
        if c.op == CompareOp::Eq {
            let next = alphabet.increment(c.literal.text()?)?;
            return Some(ExprNode::bounded_range(
                c.with_op(CompareOp::Ge),
                Comparison::new(CompareOp::Lt, c.field.clone(), Literal::String(next)),
            ));
        }
        step_past(c, alphabet).map(ExprNode::Compare)
    }
}

/// `> v` becomes `>= v+1` and `<= v` becomes `< v+1`
fn step_past(c: &Comparison, alphabet: Alphabet) -> Option<Comparison> {
    let op = match c.op {
        CompareOp::Gt => CompareOp::Ge,
        CompareOp::Le => CompareOp::Lt,
        _ => return None,
    };
    let next = alphabet.increment(c.literal.text()?)?;
    Some(Comparison::new(op, c.field.clone(), Literal::String(next)))
}

fn composite_nodes(
    mapping: &CompositeMapping,
    term: CompositeTerm,
    children: &[ExprNode],
    consumed: &BTreeSet<usize>,
) -> Vec<ExprNode> {
    match term {
        CompositeTerm::Exact(value) => vec![ExprNode::eq(mapping.name.clone(), value)],
        CompositeTerm::Range { lower, upper } => {
            let range = ExprNode::bounded_range(
                Comparison::new(lower.0, mapping.name.clone(), Literal::String(lower.1)),
                Comparison::new(upper.0, mapping.name.clone(), Literal::String(upper.1)),
            );
            let retained = consumed
                .iter()
                .filter_map(|i| children.get(*i).cloned())
                .collect();
            vec![range, ExprNode::marker(MarkerKind::Delayed, ExprNode::and(retained))]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::parse;
    use chrono::{TimeZone, Utc};

    fn geo_config() -> QueryConfig {
        QueryConfig::new()
            .with_composite(CompositeMapping::new("GEO", ["GEO", "WKT_BYTE_LENGTH"]).with_separator(','))
            .with_fixed_length_field("GEO", Alphabet::Hex)
    }

    fn assert_folds(config: &QueryConfig, query: &str, expected: &str) {
        let folded = fold(&parse(query).unwrap(), config);
        assert_eq!(folded.to_query(), expected);
    }

    #[test]
    fn test_range_folds_with_retained_predicates() {
        assert_folds(
            &geo_config(),
            "(GEO >= '0100' && GEO <= '0103') && WKT_BYTE_LENGTH >= '+AE0'",
            "((_Bounded_ = true) && (GEO >= '0100,+AE0' && GEO < '0104')) && \
             ((_Delayed_ = true) && (GEO >= '0100' && GEO <= '0103' && WKT_BYTE_LENGTH >= '+AE0'))",
        );
    }

    #[test]
    fn test_bounded_marker_is_a_candidate() {
        assert_folds(
            &geo_config(),
            "((_Bounded_ = true) && (GEO >= '0100' && GEO <= '0103')) && WKT_BYTE_LENGTH <= '+eE1.2345'",
            "((_Bounded_ = true) && (GEO >= '0100' && GEO <= '0103,+eE1.2345')) && \
             ((_Delayed_ = true) && (((_Bounded_ = true) && (GEO >= '0100' && GEO <= '0103')) && \
             WKT_BYTE_LENGTH <= '+eE1.2345'))",
        );
    }

    #[test]
    fn test_gap_left_unchanged() {
        assert_folds(
            &geo_config(),
            "GEO >= '0100' && WKT_BYTE_LENGTH <= '+AE0'",
            "GEO >= '0100' && WKT_BYTE_LENGTH <= '+AE0'",
        );
    }

    #[test]
    fn test_equalities_fold_exactly() {
        let config = QueryConfig::new()
            .with_composite(CompositeMapping::new("COLOR_WHEELS", ["COLOR", "WHEELS"]).with_separator(','));
        assert_folds(
            &config,
            "MAKE == 'ford' && COLOR == 'red' && WHEELS == '4'",
            "MAKE == 'ford' && COLOR_WHEELS == 'red,4'",
        );
    }

    #[test]
    fn test_longest_mapping_first() {
        let config = QueryConfig::new()
            .with_composite(CompositeMapping::new("AB", ["A", "B"]).with_separator(','))
            .with_composite(CompositeMapping::new("ABC", ["A", "B", "C"]).with_separator(','));
        assert_folds(&config, "A == '1' && B == '2' && C == '3'", "ABC == '1,2,3'");
    }

    #[test]
    fn test_conflicting_bounds_not_folded() {
        let config = QueryConfig::new()
            .with_composite(CompositeMapping::new("COLOR_WHEELS", ["COLOR", "WHEELS"]).with_separator(','));
        assert_folds(
            &config,
            "COLOR == 'red' && COLOR == 'blue' && WHEELS == '4'",
            "COLOR == 'red' && COLOR == 'blue' && WHEELS == '4'",
        );
    }

    #[test]
    fn test_overloaded_single_component() {
        assert_folds(&geo_config(), "GEO <= '020d'", "GEO < '020e'");
        assert_folds(&geo_config(), "GEO > '020d'", "GEO >= '020e'");
        assert_folds(&geo_config(), "GEO < '020d'", "GEO < '020d'");
        assert_folds(
            &geo_config(),
            "GEO == '0202'",
            "((_Bounded_ = true) && (GEO >= '0202' && GEO < '0203'))",
        );
    }

    #[test]
    fn test_transition_date_overloaded() {
        let transition = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let config = QueryConfig::new()
            .with_composite(
                CompositeMapping::new("GEO", ["GEO", "WKT_BYTE_LENGTH"])
                    .with_separator(',')
                    .with_transition_date(transition),
            )
            .with_fixed_length_field("GEO", Alphabet::Hex)
            .with_date_range(
                Utc.with_ymd_and_hms(2019, 6, 1, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2020, 6, 1, 0, 0, 0).unwrap(),
            );
        assert_folds(
            &config,
            "GEO == '0202' && WKT_BYTE_LENGTH == '+bE5.5'",
            "((_Bounded_ = true) && (GEO >= '0202' && GEO <= '0202,+bE5.5')) && \
             ((_Delayed_ = true) && (GEO == '0202' && WKT_BYTE_LENGTH == '+bE5.5'))",
        );
    }

    #[test]
    fn test_transition_date_plain_mapping_skipped() {
        let transition = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let config = QueryConfig::new()
            .with_composite(
                CompositeMapping::new("COLOR_WHEELS", ["COLOR", "WHEELS"]).with_transition_date(transition),
            )
            .with_date_range(
                Utc.with_ymd_and_hms(2019, 6, 1, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2020, 6, 1, 0, 0, 0).unwrap(),
            );
        assert_folds(&config, "COLOR == 'red' && WHEELS == '4'", "COLOR == 'red' && WHEELS == '4'");
    }

    #[test]
    fn test_distributes_over_leading_disjunction() {
        assert_folds(
            &geo_config(),
            "(GEO == '0100' || GEO == '0200') && WKT_BYTE_LENGTH == '+AE0'",
            "GEO == '0100,+AE0' || GEO == '0200,+AE0'",
        );
    }

    fn team_config() -> QueryConfig {
        QueryConfig::new()
            .with_composite(CompositeMapping::new("TEAM_NAME_POINTS", ["TEAM", "NAME", "POINTS"]).with_separator(','))
    }

    #[test]
    fn test_distributes_into_conjunctive_disjunct() {
        assert_folds(
            &team_config(),
            "WINNER == 'blue' && TEAM == 'gold' && \
             (NAME == 'gold-1' || NAME == 'gold-2' && ((_Bounded_ = true) && (POINTS > '10' && POINTS <= '11')))",
            "WINNER == 'blue' && ((TEAM == 'gold' && NAME == 'gold-1') || \
             (((_Bounded_ = true) && (TEAM_NAME_POINTS > 'gold,gold-2,10' && TEAM_NAME_POINTS <= 'gold,gold-2,11')) && \
             ((_Delayed_ = true) && (TEAM == 'gold' && NAME == 'gold-2' && \
             ((_Bounded_ = true) && (POINTS > '10' && POINTS <= '11'))))))",
        );
    }

    #[test]
    fn test_distributes_into_every_foldable_disjunct() {
        assert_folds(
            &team_config(),
            "TEAM == 'gold' && (NAME == 'gold-1' && POINTS == '4' || NAME == 'gold-2' && POINTS == '5')",
            "TEAM_NAME_POINTS == 'gold,gold-1,4' || TEAM_NAME_POINTS == 'gold,gold-2,5'",
        );
    }

    #[test]
    fn test_no_component_sibling_not_distributed() {
        assert_folds(
            &team_config(),
            "WINNER == 'blue' && (TEAM == 'gold' || NAME == 'gold-1' || \
             ((_Bounded_ = true) && (POINTS > '10' && POINTS <= '11')))",
            "WINNER == 'blue' && (TEAM == 'gold' || NAME == 'gold-1' || \
             ((_Bounded_ = true) && (POINTS > '10' && POINTS <= '11')))",
        );
    }

    #[test]
    fn test_negation_not_folded() {
        let config = QueryConfig::new()
            .with_composite(CompositeMapping::new("COLOR_WHEELS", ["COLOR", "WHEELS"]).with_separator(','));
        assert_folds(
            &config,
            "!(COLOR == 'red' && WHEELS == '4')",
            "!(COLOR == 'red' && WHEELS == '4')",
        );
    }

    #[test]
    fn test_folding_is_stable() {
        let config = geo_config();
        let once = fold(
            &parse("(GEO >= '0100' && GEO <= '0103') && WKT_BYTE_LENGTH >= '+AE0'").unwrap(),
            &config,
        );
        assert_eq!(fold(&once, &config), once);
    }
}
