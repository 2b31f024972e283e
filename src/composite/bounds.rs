//! Composite range construction
//!
//! Builds one composite-field range from per-component bounds. A component
//! may only be followed by another component's value when its own value is
//! exact, or when the field is fixed-length so that ranges over it compare
//! position by position. Every bound that needs increment or decrement also
//! needs a fixed-length alphabet.

use std::fmt;

use crate::ast::CompareOp;

use super::mapping::{Alphabet, CompositeMapping};

/// Constraint on one component collected from a conjunction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComponentBound {
    /// `Eq`, `Gt` or `Ge`
    pub lower: Option<(CompareOp, String)>,
    /// `Eq`, `Lt` or `Le`
    pub upper: Option<(CompareOp, String)>,
}

impl ComponentBound {
    pub fn equality(value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            lower: Some((CompareOp::Eq, value.clone())),
            upper: Some((CompareOp::Eq, value)),
        }
    }

    pub fn is_equality(&self) -> bool {
        matches!(
            (&self.lower, &self.upper),
            (Some((CompareOp::Eq, _)), Some((CompareOp::Eq, _)))
        )
    }
}

/// Result of folding component bounds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompositeTerm {
    /// Every component is an equality: a single exact value
    Exact(String),
    /// A range that contains every match of the component predicates
    Range {
        lower: (CompareOp, String),
        upper: (CompareOp, String),
    },
}

/// Why component bounds could not be folded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FoldSkip {
    /// No component has a lower bound, or none has an upper bound
    Unbounded,
    /// A bounded component follows an unbounded one
    Gap,
    /// A range on a variable-length component precedes another value
    VariableLength(String),
    /// Increment or decrement of a component value is not possible
    Infeasible(String),
    /// Queried data predates the composite encoding
    LegacyData,
}

impl fmt::Display for FoldSkip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FoldSkip::Unbounded => write!(f, "composite range is unbounded"),
            FoldSkip::Gap => write!(f, "bounded component follows an unbounded one"),
            FoldSkip::VariableLength(field) => write!(f, "range on variable-length component {}", field),
            FoldSkip::Infeasible(field) => write!(f, "cannot step value of component {}", field),
            FoldSkip::LegacyData => write!(f, "query reaches data from before the composite transition"),
        }
    }
}

fn has_gap<T>(items: &[Option<T>]) -> bool {
    let mut seen_none = false;
    for item in items {
        match item {
            None => seen_none = true,
            Some(_) if seen_none => return true,
            Some(_) => {}
        }
    }
    false
}

/// Folds per-component bounds into a single composite term
///
/// `bounds` has one entry per mapping component. `legacy` is set when the
/// queried period reaches back before the mapping's transition date.
pub fn composite_term(
    mapping: &CompositeMapping,
    bounds: &[Option<ComponentBound>],
    alphabet: impl Fn(&str) -> Option<Alphabet>,
    legacy: bool,
) -> Result<CompositeTerm, FoldSkip> {
    let n = mapping.components.len();
    let lowers: Vec<Option<&(CompareOp, String)>> = (0..n)
        .map(|i| bounds.get(i).and_then(|b| b.as_ref()).and_then(|b| b.lower.as_ref()))
        .collect();
    let uppers: Vec<Option<&(CompareOp, String)>> = (0..n)
        .map(|i| bounds.get(i).and_then(|b| b.as_ref()).and_then(|b| b.upper.as_ref()))
        .collect();

    if lowers.iter().all(Option::is_none) || uppers.iter().all(Option::is_none) {
        return Err(FoldSkip::Unbounded);
    }
    if has_gap(&lowers) || has_gap(&uppers) {
        return Err(FoldSkip::Gap);
    }
    if legacy && !mapping.is_overloaded() {
        return Err(FoldSkip::LegacyData);
    }

    let all_equal = (0..n).all(|i| bounds.get(i).and_then(|b| b.as_ref()).is_some_and(ComponentBound::is_equality));
    if all_equal && !legacy {
        let values: Vec<&str> = lowers.iter().flatten().map(|(_, v)| v.as_str()).collect();
        return Ok(CompositeTerm::Exact(mapping.join(&values)));
    }

    let step = |field: &str, value: &str, up: bool| -> Result<String, FoldSkip> {
        let alphabet = alphabet(field).ok_or_else(|| FoldSkip::VariableLength(field.to_string()))?;
        let stepped = if up {
            alphabet.increment(value)
        } else {
            alphabet.decrement(value)
        };
        stepped.ok_or_else(|| FoldSkip::Infeasible(field.to_string()))
    };
    let require_fixed = |field: &str| -> Result<(), FoldSkip> {
        alphabet(field)
            .map(|_| ())
            .ok_or_else(|| FoldSkip::VariableLength(field.to_string()))
    };

    let lower = if legacy {
        // legacy values are the bare first component, which sorts first
        let Some((op, value)) = lowers[0] else {
            return Err(FoldSkip::Unbounded);
        };
        let field = &mapping.components[0];
        match op {
            CompareOp::Gt => match alphabet(field) {
                Some(_) => (CompareOp::Ge, step(field, value, true)?),
                None => (CompareOp::Gt, value.clone()),
            },
            _ => (CompareOp::Ge, value.clone()),
        }
    } else {
        let count = lowers.iter().take_while(|l| l.is_some()).count();
        let mut values = Vec::with_capacity(count);
        let mut op = CompareOp::Ge;
        for (i, (bound_op, value)) in lowers.iter().take(count).flatten().enumerate() {
            let field = &mapping.components[i];
            let followed = i + 1 < count;
            let last_component = i + 1 == n;
            match bound_op {
                CompareOp::Gt if last_component => {
                    values.push(value.clone());
                    op = CompareOp::Gt;
                }
                CompareOp::Gt => values.push(step(field, value, true)?),
                CompareOp::Ge if followed => {
                    require_fixed(field)?;
                    values.push(value.clone());
                }
                _ => values.push(value.clone()),
            }
        }
        (op, mapping.join(&values))
    };

    let count = uppers.iter().take_while(|u| u.is_some()).count();
    let mut values = Vec::with_capacity(count);
    let mut op = CompareOp::Le;
    for (i, (bound_op, value)) in uppers.iter().take(count).flatten().enumerate() {
        let field = &mapping.components[i];
        let followed = i + 1 < count;
        let last_component = i + 1 == n;
        match bound_op {
            CompareOp::Lt if followed => values.push(step(field, value, false)?),
            CompareOp::Lt => {
                values.push(value.clone());
                op = CompareOp::Lt;
            }
            CompareOp::Le if followed => {
                require_fixed(field)?;
                values.push(value.clone());
            }
            _ if followed || last_component => values.push(value.clone()),
            // the next component is open, so step past every value with this prefix
            _ => {
                values.push(step(field, value, true)?);
                op = CompareOp::Lt;
            }
        }
    }
    let upper = (op, mapping.join(&values));

    Ok(CompositeTerm::Range { lower, upper })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geo() -> CompositeMapping {
        CompositeMapping::new("GEO", ["GEO", "WKT_BYTE_LENGTH"]).with_separator(',')
    }

    fn hex_geo(field: &str) -> Option<Alphabet> {
        (field == "GEO").then_some(Alphabet::Hex)
    }

    fn bound(lower: Option<(CompareOp, &str)>, upper: Option<(CompareOp, &str)>) -> Option<ComponentBound> {
        Some(ComponentBound {
            lower: lower.map(|(op, v)| (op, v.to_string())),
            upper: upper.map(|(op, v)| (op, v.to_string())),
        })
    }

    #[test]
    fn test_exact_when_all_equal() {
        let mapping = CompositeMapping::new("TEAM_POINTS", ["TEAM", "POINTS"]).with_separator(',');
        let term = composite_term(
            &mapping,
            &[Some(ComponentBound::equality("gold")), Some(ComponentBound::equality("11"))],
            |_| None,
            false,
        )
        .unwrap();
        assert_eq!(term, CompositeTerm::Exact("gold,11".into()));
    }

    #[test]
    fn test_range_with_open_trailing_upper() {
        let term = composite_term(
            &geo(),
            &[
                bound(Some((CompareOp::Ge, "0100")), Some((CompareOp::Le, "0103"))),
                bound(Some((CompareOp::Ge, "+AE0")), None),
            ],
            hex_geo,
            false,
        )
        .unwrap();
        assert_eq!(
            term,
            CompositeTerm::Range {
                lower: (CompareOp::Ge, "0100,+AE0".into()),
                upper: (CompareOp::Lt, "0104".into()),
            }
        );
    }

    #[test]
    fn test_range_with_open_trailing_lower() {
        let term = composite_term(
            &geo(),
            &[
                bound(Some((CompareOp::Ge, "0100")), Some((CompareOp::Le, "0103"))),
                bound(None, Some((CompareOp::Le, "+eE1.2345"))),
            ],
            hex_geo,
            false,
        )
        .unwrap();
        assert_eq!(
            term,
            CompositeTerm::Range {
                lower: (CompareOp::Ge, "0100".into()),
                upper: (CompareOp::Le, "0103,+eE1.2345".into()),
            }
        );
    }

    #[test]
    fn test_gap_is_skipped() {
        let result = composite_term(
            &geo(),
            &[
                bound(Some((CompareOp::Ge, "0100")), None),
                bound(None, Some((CompareOp::Le, "+AE0"))),
            ],
            hex_geo,
            false,
        );
        assert_eq!(result, Err(FoldSkip::Gap));
    }

    #[test]
    fn test_only_upper_bounds_is_unbounded() {
        let result = composite_term(
            &geo(),
            &[
                bound(None, Some((CompareOp::Le, "0100"))),
                bound(None, Some((CompareOp::Le, "+AE0"))),
            ],
            hex_geo,
            false,
        );
        assert_eq!(result, Err(FoldSkip::Unbounded));
    }

    #[test]
    fn test_variable_length_range_prefix_skipped() {
        let result = composite_term(
            &geo(),
            &[
                bound(Some((CompareOp::Ge, "0100")), Some((CompareOp::Le, "0103"))),
                bound(Some((CompareOp::Ge, "+AE0")), None),
            ],
            |_| None,
            false,
        );
        assert_eq!(result, Err(FoldSkip::VariableLength("GEO".into())));
    }

    #[test]
    fn test_gt_on_leading_component_increments() {
        let term = composite_term(
            &geo(),
            &[
                bound(Some((CompareOp::Gt, "0100")), Some((CompareOp::Lt, "0103"))),
                bound(Some((CompareOp::Ge, "+AE0")), Some((CompareOp::Le, "+bE1"))),
            ],
            hex_geo,
            false,
        )
        .unwrap();
        assert_eq!(
            term,
            CompositeTerm::Range {
                lower: (CompareOp::Ge, "0101,+AE0".into()),
                upper: (CompareOp::Le, "0102,+bE1".into()),
            }
        );
    }

    #[test]
    fn test_gt_on_last_component_stays_exclusive() {
        let term = composite_term(
            &geo(),
            &[
                Some(ComponentBound::equality("0100")),
                bound(Some((CompareOp::Gt, "+AE0")), Some((CompareOp::Lt, "+bE1"))),
            ],
            hex_geo,
            false,
        )
        .unwrap();
        assert_eq!(
            term,
            CompositeTerm::Range {
                lower: (CompareOp::Gt, "0100,+AE0".into()),
                upper: (CompareOp::Lt, "0100,+bE1".into()),
            }
        );
    }

    #[test]
    fn test_overflow_is_infeasible() {
        let result = composite_term(
            &geo(),
            &[
                bound(Some((CompareOp::Ge, "0100")), Some((CompareOp::Le, "ffff"))),
                bound(Some((CompareOp::Ge, "+AE0")), None),
            ],
            hex_geo,
            false,
        );
        assert_eq!(result, Err(FoldSkip::Infeasible("GEO".into())));
    }

    #[test]
    fn test_legacy_overloaded_uses_plain_lower_bound() {
        let term = composite_term(
            &geo(),
            &[Some(ComponentBound::equality("0202")), Some(ComponentBound::equality("+bE5.5"))],
            hex_geo,
            true,
        )
        .unwrap();
        assert_eq!(
            term,
            CompositeTerm::Range {
                lower: (CompareOp::Ge, "0202".into()),
                upper: (CompareOp::Le, "0202,+bE5.5".into()),
            }
        );
    }

    #[test]
    fn test_legacy_plain_mapping_skipped() {
        let mapping = CompositeMapping::new("COLOR_WHEELS", ["COLOR", "WHEELS"]);
        let result = composite_term(
            &mapping,
            &[Some(ComponentBound::equality("red")), Some(ComponentBound::equality("4"))],
            |_| None,
            true,
        );
        assert_eq!(result, Err(FoldSkip::LegacyData));
    }
}
