//! Expression tree model
//!
//! The shared representation every pass operates on.
//!
//! # Invariants
//!
//! - Children are owned: no subtree is shared by two parents
//! - `And`/`Or` built through [`ExprNode::and`]/[`ExprNode::or`] are flattened
//! - A marker has exactly one child and only `Drop` changes its truth value

mod errors;
mod lineage;
mod marker;
mod node;
mod parser;
mod printer;

pub use errors::{ParseError, ParseResult};
pub use lineage::{Lineage, LineageViolation, NodeId};
pub use marker::{MarkerKind, MarkerPayload};
pub use node::{CompareOp, Comparison, ExprNode, FunctionArg, Literal, ANY_FIELD, NO_FIELD};
pub use parser::parse;
