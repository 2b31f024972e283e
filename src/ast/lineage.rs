//! Arena view of a tree
//!
//! Nodes are numbered in pre-order. Passes that need per-node side data
//! (the executability classifier) key it by [`NodeId`] using the same order.

use std::collections::BTreeSet;
use std::fmt;

use super::node::ExprNode;

/// Pre-order position of a node in a tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone)]
struct Slot {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    depth: usize,
}

/// Parent/child relationships of every node in a tree
#[derive(Debug, Clone)]
pub struct Lineage {
    slots: Vec<Slot>,
}

/// A broken parent/child relationship
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineageViolation {
    pub node: NodeId,
    pub message: String,
}

impl Lineage {
    /// Builds the arena for a tree
    pub fn build(root: &ExprNode) -> Self {
        let mut lineage = Lineage { slots: Vec::new() };
        lineage.visit(root, None, 0);
        lineage
    }

    fn visit(&mut self, node: &ExprNode, parent: Option<NodeId>, depth: usize) -> NodeId {
        let id = NodeId(self.slots.len());
        self.slots.push(Slot {
            parent,
            children: Vec::new(),
            depth,
        });
        for child in node.children() {
            let child_id = self.visit(child, Some(id), depth + 1);
            self.slots[id.0].children.push(child_id);
        }
        id
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.slots.get(id.0).and_then(|s| s.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.slots.get(id.0).map(|s| s.children.as_slice()).unwrap_or(&[])
    }

    pub fn depth(&self, id: NodeId) -> usize {
        self.slots.get(id.0).map(|s| s.depth).unwrap_or(0)
    }

    /// Checks that every recorded parent lists the node exactly once, and that
    /// every node except the root has exactly one parent
    pub fn validate(&self) -> Result<(), LineageViolation> {
        let mut seen = BTreeSet::new();
        for (index, slot) in self.slots.iter().enumerate() {
            let id = NodeId(index);
            match slot.parent {
                None if index != 0 => {
                    return Err(LineageViolation {
                        node: id,
                        message: "non-root node has no parent".into(),
                    })
                }
                Some(_) if index == 0 => {
                    return Err(LineageViolation {
                        node: id,
                        message: "root node has a parent".into(),
                    })
                }
                Some(parent) => {
                    let listed = self
                        .children(parent)
                        .iter()
                        .filter(|c| **c == id)
                        .count();
                    if listed != 1 {
                        return Err(LineageViolation {
                            node: id,
                            message: format!("parent {} lists node {} times", parent, listed),
                        });
                    }
                }
                None => {}
            }
            for child in &slot.children {
                if !seen.insert(*child) {
                    return Err(LineageViolation {
                        node: *child,
                        message: "node is claimed by more than one parent".into(),
                    });
                }
                if self.parent(*child) != Some(id) {
                    return Err(LineageViolation {
                        node: *child,
                        message: format!("child does not point back to {}", id),
                    });
                }
            }
        }
        Ok(())
    }
}
