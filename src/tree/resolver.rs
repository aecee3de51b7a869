//! Name lookup inside assembled trees.
//!
//! Lookup is depth-first and pre-order, visiting children in insertion
//! order. The first leaf whose attaching token equals the target wins; a name
//! that occurs under several branches always resolves to the one met first.

use crate::types::{Branch, LeafRecord, VariableNode};
use std::slice;

/// A leaf found by the resolver together with its token path.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<'a> {
    pub path: Vec<&'a str>,
    pub leaf: &'a LeafRecord,
}

impl Resolved<'_> {
    /// Dotted token path, e.g. `Tower.Base.Fx`.
    pub fn dotted(&self) -> String {
        self.path.join(".")
    }
}

/// First leaf attached under `name`, or `None`.
pub fn resolve<'a>(root: &'a Branch, name: &str) -> Option<Resolved<'a>> {
    leaves(root).find(|r| r.path.last() == Some(&name))
}

/// Leaf at an exact token path.
pub fn resolve_path<'a, S: AsRef<str>>(root: &'a Branch, path: &[S]) -> Option<&'a LeafRecord> {
    let (last, ancestors) = path.split_last()?;
    let mut cursor = root;
    for token in ancestors {
        cursor = cursor.get(token.as_ref())?.as_branch()?;
    }
    cursor.get(last.as_ref())?.as_leaf()
}

/// Pre-order iterator over every leaf below `root`.
pub fn leaves(root: &Branch) -> LeafIter<'_> {
    LeafIter {
        stack: vec![root.entries()],
        path: Vec::new(),
    }
}

/// Iterator returned by [`leaves`].
pub struct LeafIter<'a> {
    stack: Vec<slice::Iter<'a, (String, VariableNode)>>,
    /// Tokens of the branches currently on the stack (root excluded)
    path: Vec<&'a str>,
}

impl<'a> Iterator for LeafIter<'a> {
    type Item = Resolved<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let top = self.stack.last_mut()?;
            match top.next() {
                None => {
                    self.stack.pop();
                    self.path.pop();
                }
                Some((token, VariableNode::Leaf(leaf))) => {
                    let mut path = self.path.clone();
                    path.push(token.as_str());
                    return Some(Resolved { path, leaf });
                }
                Some((token, VariableNode::Branch(branch))) => {
                    self.path.push(token.as_str());
                    self.stack.push(branch.entries());
                }
            }
        }
    }
}
