//! Query text rendering
//!
//! Output re-parses to an equal tree, except that `Reference` grouping is
//! rendered as parentheses and therefore not preserved.

use super::marker::MarkerPayload;
use super::node::{Comparison, ExprNode, FunctionArg, Literal};

impl ExprNode {
    /// Renders this tree as query text
    pub fn to_query(&self) -> String {
        let mut out = String::new();
        write_node(self, &mut out);
        out
    }
}

impl Comparison {
    /// Renders this comparison as query text
    pub fn to_query(&self) -> String {
        let mut out = String::new();
        write_comparison(self, &mut out);
        out
    }
}

fn write_node(node: &ExprNode, out: &mut String) {
    match node {
        ExprNode::And(children) => write_junction(children, " && ", out),
        ExprNode::Or(children) => write_junction(children, " || ", out),
        ExprNode::Not(child) => {
            out.push_str("!(");
            write_node(child.unwrap_references(), out);
            out.push(')');
        }
        ExprNode::Compare(c) => write_comparison(c, out),
        ExprNode::Function {
            namespace,
            name,
            args,
        } => {
            out.push_str(namespace);
            out.push(':');
            out.push_str(name);
            out.push('(');
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                match arg {
                    FunctionArg::Field(f) | FunctionArg::Identifier(f) => out.push_str(f),
                    FunctionArg::Literal(lit) => write_literal(lit, out),
                }
            }
            out.push(')');
        }
        ExprNode::Reference(child) => {
            out.push('(');
            write_node(child, out);
            out.push(')');
        }
        ExprNode::Marker {
            kind,
            payload,
            child,
        } => {
            out.push_str("((");
            out.push_str(kind.label());
            out.push_str(" = ");
            match payload {
                MarkerPayload::Dropped { reason, .. } => write_quoted(reason, out),
                MarkerPayload::None => out.push_str("true"),
            }
            out.push_str(") && (");
            write_node(child.unwrap_references(), out);
            out.push_str("))");
        }
    }
}

fn write_junction(children: &[ExprNode], separator: &str, out: &mut String) {
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            out.push_str(separator);
        }
        if matches!(child, ExprNode::And(_) | ExprNode::Or(_)) {
            out.push('(');
            write_node(child, out);
            out.push(')');
        } else {
            write_node(child, out);
        }
    }
}

fn write_comparison(c: &Comparison, out: &mut String) {
    out.push_str(&c.field);
    out.push(' ');
    out.push_str(c.op.symbol());
    out.push(' ');
    write_literal(&c.literal, out);
}

fn write_literal(lit: &Literal, out: &mut String) {
    match lit {
        Literal::String(s) => write_quoted(s, out),
        Literal::Number(n) => out.push_str(n),
        Literal::Null => out.push_str("null"),
    }
}

/// Single-quotes a value, escaping only what the parser would otherwise consume
fn write_quoted(value: &str, out: &mut String) {
    out.push('\'');
    let chars: Vec<char> = value.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        match c {
            '\'' => out.push_str("\\'"),
            '\\' if matches!(chars.get(i + 1), None | Some('\\') | Some('\'')) => out.push_str("\\\\"),
            _ => out.push(c),
        }
    }
    out.push('\'');
}
