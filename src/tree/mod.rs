//! Variable tree assembly.
//!
//! Leaves are inserted along a token path with an explicit iterative walk.
//! Missing intermediate tokens become branches.
//!
//! ## Collisions
//!
//! Insertion is last-write-wins:
//!
//! ```text
//! insert [A, B]     -> A { B: leaf }
//! insert [A, B, C]  -> A { B { C: leaf } }     leaf B replaced by a branch
//! insert [A, B]     -> A { B: leaf }           branch B replaced by the leaf
//! ```
//!
//! A replaced node keeps its position among its siblings.

pub mod resolver;

pub use resolver::{leaves, resolve, resolve_path, LeafIter, Resolved};

use crate::error::{ForceBridgeError, Result};
use crate::types::{Branch, LeafRecord, VariableNode};

/// Insert `leaf` at the end of `path` below `root`.
///
/// Returns the node previously stored at the full path, if any.
pub fn insert_leaf(
    root: &mut Branch,
    path: &[String],
    leaf: LeafRecord,
) -> Result<Option<VariableNode>> {
    let Some((leaf_token, ancestors)) = path.split_last() else {
        return Err(ForceBridgeError::Tree("empty token path".to_string()));
    };

    let mut cursor = root;
    for token in ancestors {
        cursor = cursor.branch_mut(token);
    }

    let previous = cursor.insert(leaf_token.clone(), VariableNode::Leaf(leaf));
    if let Some(prev) = &previous {
        tracing::debug!(
            "Overwrote existing {} at {}",
            if prev.is_leaf() { "leaf" } else { "branch" },
            path.join(".")
        );
    }
    Ok(previous)
}

/// Builds one source file's tree and keeps insertion counters.
#[derive(Debug, Default)]
pub struct TreeAssembler {
    root: Branch,
    inserted: usize,
    overwritten: usize,
}

impl TreeAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: &[String], leaf: LeafRecord) -> Result<()> {
        if insert_leaf(&mut self.root, path, leaf)?.is_some() {
            self.overwritten += 1;
        }
        self.inserted += 1;
        Ok(())
    }

    /// Successful insertions, including overwrites.
    pub fn inserted(&self) -> usize {
        self.inserted
    }

    pub fn overwritten(&self) -> usize {
        self.overwritten
    }

    /// Leaves currently in the tree.
    pub fn leaf_count(&self) -> usize {
        self.root.iter().map(|(_, n)| n.leaf_count()).sum()
    }

    pub fn root(&self) -> &Branch {
        &self.root
    }

    pub fn finish(self) -> Branch {
        self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|t| t.to_string()).collect()
    }

    fn leaf(v: f64) -> LeafRecord {
        LeafRecord::new("s", "N", 1.0, 0.1, 0.0, vec![v])
    }

    fn leaf_value(root: &Branch, tokens: &[&str]) -> Option<f64> {
        resolve_path(root, tokens).map(|l| l.values()[0])
    }

    #[test]
    fn test_creates_intermediate_branches() {
        let mut root = Branch::new();
        insert_leaf(&mut root, &path(&["Root", "Sub", "Foo"]), leaf(1.0)).unwrap();

        let sub = root
            .get("Root")
            .and_then(|n| n.as_branch())
            .and_then(|b| b.get("Sub"))
            .and_then(|n| n.as_branch())
            .unwrap();
        assert!(sub.get("Foo").unwrap().is_leaf());
    }

    #[test]
    fn test_siblings_share_branch() {
        let mut root = Branch::new();
        insert_leaf(&mut root, &path(&["A", "x"]), leaf(1.0)).unwrap();
        insert_leaf(&mut root, &path(&["A", "y"]), leaf(2.0)).unwrap();

        assert_eq!(root.len(), 1);
        let a = root.get("A").and_then(|n| n.as_branch()).unwrap();
        assert_eq!(a.keys().collect::<Vec<_>>(), vec!["x", "y"]);
    }

    #[test]
    fn test_duplicate_leaf_overwrites() {
        let mut root = Branch::new();
        assert!(insert_leaf(&mut root, &path(&["A", "x"]), leaf(1.0))
            .unwrap()
            .is_none());
        let prev = insert_leaf(&mut root, &path(&["A", "x"]), leaf(2.0)).unwrap();

        assert!(prev.unwrap().is_leaf());
        assert_eq!(leaf_value(&root, &["A", "x"]), Some(2.0));
    }

    #[test]
    fn test_leaf_replaced_by_branch() {
        let mut root = Branch::new();
        insert_leaf(&mut root, &path(&["A", "B"]), leaf(1.0)).unwrap();
        insert_leaf(&mut root, &path(&["A", "B", "C"]), leaf(2.0)).unwrap();

        assert_eq!(leaf_value(&root, &["A", "B", "C"]), Some(2.0));
        assert!(resolve_path(&root, &["A", "B"]).is_none());
    }

    #[test]
    fn test_branch_replaced_by_leaf() {
        let mut root = Branch::new();
        insert_leaf(&mut root, &path(&["A", "B", "C"]), leaf(1.0)).unwrap();
        let prev = insert_leaf(&mut root, &path(&["A", "B"]), leaf(2.0)).unwrap();

        assert!(!prev.unwrap().is_leaf());
        assert_eq!(leaf_value(&root, &["A", "B"]), Some(2.0));
    }

    #[test]
    fn test_empty_path_rejected() {
        let mut root = Branch::new();
        let err = insert_leaf(&mut root, &[], leaf(1.0)).unwrap_err();
        assert!(matches!(err, ForceBridgeError::Tree(_)));
        assert!(root.is_empty());
    }

    #[test]
    fn test_assembler_counters() {
        let mut assembler = TreeAssembler::new();
        assembler.insert(&path(&["A", "x"]), leaf(1.0)).unwrap();
        assembler.insert(&path(&["A", "y"]), leaf(2.0)).unwrap();
        assembler.insert(&path(&["A", "x"]), leaf(3.0)).unwrap();
        assembler.insert(&path(&["z"]), leaf(4.0)).unwrap();

        assert_eq!(assembler.inserted(), 4);
        assert_eq!(assembler.overwritten(), 1);
        assert_eq!(assembler.leaf_count(), 3);

        let root = assembler.finish();
        assert_eq!(root.keys().collect::<Vec<_>>(), vec!["A", "z"]);
    }
}
