//! Expression tree structures
//!
//! Every pass consumes a borrowed tree and returns a freshly built one.
//! Children are owned, so a subtree reused under a new parent is always a
//! clone and never an alias.

use std::fmt;

use super::marker::{MarkerKind, MarkerPayload};

/// Field name used for unfielded terms
pub const ANY_FIELD: &str = "_ANYFIELD_";

/// Field name for a term whose field was pruned away
pub const NO_FIELD: &str = "_NOFIELD_";

/// Literal operand of a comparison
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Literal {
    /// Quoted string value
    String(String),
    /// Unquoted numeric value, kept in its source form
    Number(String),
    /// The `null` keyword
    Null,
}

impl Literal {
    /// Create a string literal
    pub fn string(value: impl Into<String>) -> Self {
        Literal::String(value.into())
    }

    /// Returns true if this is the `null` literal
    pub fn is_null(&self) -> bool {
        matches!(self, Literal::Null)
    }

    /// Returns the literal's text, or `None` for `null`
    pub fn text(&self) -> Option<&str> {
        match self {
            Literal::String(s) | Literal::Number(s) => Some(s),
            Literal::Null => None,
        }
    }
}

/// Comparison operators that appear in leaf nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Regex include (`=~`)
    Regex,
    /// Regex exclude (`!~`)
    NotRegex,
}

impl CompareOp {
    /// Operator symbol as written in query text
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Regex => "=~",
            CompareOp::NotRegex => "!~",
        }
    }

    /// Returns true for `<`, `<=`, `>` and `>=`
    pub fn is_range(&self) -> bool {
        matches!(self, CompareOp::Lt | CompareOp::Le | CompareOp::Gt | CompareOp::Ge)
    }

    /// Returns true for `>` and `>=`
    pub fn is_lower_bound(&self) -> bool {
        matches!(self, CompareOp::Gt | CompareOp::Ge)
    }

    /// Returns true for `<` and `<=`
    pub fn is_upper_bound(&self) -> bool {
        matches!(self, CompareOp::Lt | CompareOp::Le)
    }

    /// Returns true for `=~` and `!~`
    pub fn is_regex(&self) -> bool {
        matches!(self, CompareOp::Regex | CompareOp::NotRegex)
    }

    /// Returns true for operators whose match is a logical negation
    pub fn is_negative(&self) -> bool {
        matches!(self, CompareOp::Ne | CompareOp::NotRegex)
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// A single `FIELD op literal` comparison
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Comparison {
    pub op: CompareOp,
    pub field: String,
    pub literal: Literal,
}

impl Comparison {
    pub fn new(op: CompareOp, field: impl Into<String>, literal: Literal) -> Self {
        Self {
            op,
            field: field.into(),
            literal,
        }
    }

    /// Copy of this comparison with a different operator
    pub fn with_op(&self, op: CompareOp) -> Self {
        Self {
            op,
            field: self.field.clone(),
            literal: self.literal.clone(),
        }
    }

    /// Copy of this comparison with a normalized string literal
    pub fn with_value(&self, value: impl Into<String>) -> Self {
        Self {
            op: self.op,
            field: self.field.clone(),
            literal: Literal::String(value.into()),
        }
    }
}

/// Argument of a function call
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FunctionArg {
    /// A field reference
    Field(String),
    /// A non-field identifier such as `termOffsetMap`
    Identifier(String),
    /// A literal argument
    Literal(Literal),
}

/// Expression tree node
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExprNode {
    And(Vec<ExprNode>),
    Or(Vec<ExprNode>),
    Not(Box<ExprNode>),
    Compare(Comparison),
    Function {
        namespace: String,
        name: String,
        args: Vec<FunctionArg>,
    },
    /// Transparent single-child grouping
    Reference(Box<ExprNode>),
    Marker {
        kind: MarkerKind,
        payload: MarkerPayload,
        child: Box<ExprNode>,
    },
}

impl ExprNode {
    /// Conjunction of the given nodes, flattening nested conjunctions
    ///
    /// A single node is returned as-is rather than wrapped.
    pub fn and(children: Vec<ExprNode>) -> ExprNode {
        let mut flat = Vec::with_capacity(children.len());
        for child in children {
            match child {
                ExprNode::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        if flat.len() == 1 {
            flat.pop().unwrap_or(ExprNode::And(Vec::new()))
        } else {
            ExprNode::And(flat)
        }
    }

    /// Disjunction of the given nodes, flattening nested disjunctions
    pub fn or(children: Vec<ExprNode>) -> ExprNode {
        let mut flat = Vec::with_capacity(children.len());
        for child in children {
            match child {
                ExprNode::Or(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        if flat.len() == 1 {
            flat.pop().unwrap_or(ExprNode::Or(Vec::new()))
        } else {
            ExprNode::Or(flat)
        }
    }

    pub fn not(child: ExprNode) -> ExprNode {
        ExprNode::Not(Box::new(child))
    }

    pub fn reference(child: ExprNode) -> ExprNode {
        ExprNode::Reference(Box::new(child))
    }

    pub fn compare(op: CompareOp, field: impl Into<String>, literal: Literal) -> ExprNode {
        ExprNode::Compare(Comparison::new(op, field, literal))
    }

    pub fn eq(field: impl Into<String>, value: impl Into<String>) -> ExprNode {
        Self::compare(CompareOp::Eq, field, Literal::String(value.into()))
    }

    pub fn ne(field: impl Into<String>, value: impl Into<String>) -> ExprNode {
        Self::compare(CompareOp::Ne, field, Literal::String(value.into()))
    }

    pub fn lt(field: impl Into<String>, value: impl Into<String>) -> ExprNode {
        Self::compare(CompareOp::Lt, field, Literal::String(value.into()))
    }

    pub fn le(field: impl Into<String>, value: impl Into<String>) -> ExprNode {
        Self::compare(CompareOp::Le, field, Literal::String(value.into()))
    }

    pub fn gt(field: impl Into<String>, value: impl Into<String>) -> ExprNode {
        Self::compare(CompareOp::Gt, field, Literal::String(value.into()))
    }

    pub fn ge(field: impl Into<String>, value: impl Into<String>) -> ExprNode {
        Self::compare(CompareOp::Ge, field, Literal::String(value.into()))
    }

    pub fn regex(field: impl Into<String>, pattern: impl Into<String>) -> ExprNode {
        Self::compare(CompareOp::Regex, field, Literal::String(pattern.into()))
    }

    pub fn not_regex(field: impl Into<String>, pattern: impl Into<String>) -> ExprNode {
        Self::compare(CompareOp::NotRegex, field, Literal::String(pattern.into()))
    }

    pub fn is_null(field: impl Into<String>) -> ExprNode {
        Self::compare(CompareOp::Eq, field, Literal::Null)
    }

    /// Wrap a node in a marker with no payload
    pub fn marker(kind: MarkerKind, child: ExprNode) -> ExprNode {
        ExprNode::Marker {
            kind,
            payload: MarkerPayload::None,
            child: Box::new(child),
        }
    }

    /// Wrap a node in a `Drop` marker carrying the reason and the dropped query text
    pub fn dropped(reason: impl Into<String>, child: ExprNode) -> ExprNode {
        let query = child.to_query();
        ExprNode::Marker {
            kind: MarkerKind::Drop,
            payload: MarkerPayload::Dropped {
                reason: reason.into(),
                query,
            },
            child: Box::new(child),
        }
    }

    /// A `Bounded` range `lower && upper` on a single field
    pub fn bounded_range(lower: Comparison, upper: Comparison) -> ExprNode {
        Self::marker(
            MarkerKind::Bounded,
            ExprNode::And(vec![ExprNode::Compare(lower), ExprNode::Compare(upper)]),
        )
    }

    /// Returns the comparison if this node is a leaf comparison
    pub fn as_comparison(&self) -> Option<&Comparison> {
        match self {
            ExprNode::Compare(c) => Some(c),
            _ => None,
        }
    }

    /// Returns the marker kind if this node is a marker
    pub fn marker_kind(&self) -> Option<MarkerKind> {
        match self {
            ExprNode::Marker { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Strips any `Reference` wrappers
    pub fn unwrap_references(&self) -> &ExprNode {
        let mut node = self;
        while let ExprNode::Reference(inner) = node {
            node = inner;
        }
        node
    }

    /// Decomposes a `Bounded` marker into its lower and upper comparisons
    ///
    /// Returns `None` unless the marker wraps exactly one lower and one upper
    /// bound on the same field.
    pub fn bounded_parts(&self) -> Option<(&Comparison, &Comparison)> {
        let ExprNode::Marker {
            kind: MarkerKind::Bounded,
            child,
            ..
        } = self
        else {
            return None;
        };
        let ExprNode::And(children) = child.unwrap_references() else {
            return None;
        };
        if children.len() != 2 {
            return None;
        }
        let a = children[0].unwrap_references().as_comparison()?;
        let b = children[1].unwrap_references().as_comparison()?;
        if a.field != b.field || a.literal.is_null() || b.literal.is_null() {
            return None;
        }
        match (a.op.is_lower_bound(), b.op.is_upper_bound()) {
            (true, true) => Some((a, b)),
            _ if b.op.is_lower_bound() && a.op.is_upper_bound() => Some((b, a)),
            _ => None,
        }
    }

    /// Children of this node in evaluation order
    pub fn children(&self) -> Vec<&ExprNode> {
        match self {
            ExprNode::And(children) | ExprNode::Or(children) => children.iter().collect(),
            ExprNode::Not(child) | ExprNode::Reference(child) => vec![child.as_ref()],
            ExprNode::Marker { child, .. } => vec![child.as_ref()],
            ExprNode::Compare(_) | ExprNode::Function { .. } => Vec::new(),
        }
    }

    /// Returns true for nodes without children
    pub fn is_leaf(&self) -> bool {
        matches!(self, ExprNode::Compare(_) | ExprNode::Function { .. })
    }

    /// Fields referenced anywhere below this node, in first-seen order
    pub fn fields(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields(&self, out: &mut Vec<String>) {
        match self {
            ExprNode::Compare(c) => {
                if !out.contains(&c.field) {
                    out.push(c.field.clone());
                }
            }
            ExprNode::Function { args, .. } => {
                for arg in args {
                    if let FunctionArg::Field(f) = arg {
                        if !out.contains(f) {
                            out.push(f.clone());
                        }
                    }
                }
            }
            other => {
                for child in other.children() {
                    child.collect_fields(out);
                }
            }
        }
    }

    /// Total number of nodes in this subtree
    pub fn node_count(&self) -> usize {
        1 + self.children().iter().map(|c| c.node_count()).sum::<usize>()
    }
}

impl fmt::Display for ExprNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_query())
    }
}
