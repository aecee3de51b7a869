//! Core data types for forcebridge-rs
//!
//! This module contains the data structures shared by the parser, the
//! caches, the resolver and the writer.
//!
//! # Main Types
//!
//! - [`LeafRecord`] - One variable's units, declared sample count, sampling
//!   interval, start offset and value series
//! - [`VariableNode`] - Tagged tree node: either a [`LeafRecord`] or a [`Branch`]
//! - [`Branch`] - Insertion-ordered mapping from token to child node
//! - [`SourceFileResult`] - The tree reconstructed from one source file
//! - [`SeriesStats`] - NaN-skipping summary statistics over a series
//!
//! # Equality
//!
//! Float fields compare bitwise-or-equal, so two records holding NaN at the
//! same positions are equal. This is what the cache round trip is checked
//! against.

use crate::error::{ForceBridgeError, Result};
use serde::{Deserialize, Serialize};

/// Terminal tree node holding one variable's series.
///
/// Created once per table row. Values are never edited in place; a
/// transformation produces a new record through [`LeafRecord::with_values`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeafRecord {
    xunit: String,
    yunit: String,
    /// Declared sample count as parsed (NaN when unparsable).
    ten: f64,
    dx: f64,
    x0: f64,
    values: Vec<f64>,
}

impl LeafRecord {
    pub fn new(
        xunit: impl Into<String>,
        yunit: impl Into<String>,
        ten: f64,
        dx: f64,
        x0: f64,
        values: Vec<f64>,
    ) -> Self {
        Self {
            xunit: xunit.into(),
            yunit: yunit.into(),
            ten,
            dx,
            x0,
            values,
        }
    }

    pub fn xunit(&self) -> &str {
        &self.xunit
    }

    pub fn yunit(&self) -> &str {
        &self.yunit
    }

    /// Declared sample count exactly as parsed from the `ten=` descriptor.
    pub fn ten(&self) -> f64 {
        self.ten
    }

    /// Declared sample count, if it is a valid non-negative integer.
    pub fn sample_count(&self) -> Option<usize> {
        declared_count(self.ten)
    }

    /// Sampling interval.
    pub fn dx(&self) -> f64 {
        self.dx
    }

    /// Start offset of the x axis.
    pub fn x0(&self) -> f64 {
        self.x0
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Copy of this record with the series replaced wholesale.
    pub fn with_values(&self, values: Vec<f64>) -> Self {
        Self {
            values,
            ..self.clone()
        }
    }

    /// x coordinate of every sample: `x0 + i * dx`.
    pub fn x_axis(&self) -> Vec<f64> {
        (0..self.values.len())
            .map(|i| self.x0 + i as f64 * self.dx)
            .collect()
    }
}

impl PartialEq for LeafRecord {
    fn eq(&self, other: &Self) -> bool {
        self.xunit == other.xunit
            && self.yunit == other.yunit
            && same_f64(self.ten, other.ten)
            && same_f64(self.dx, other.dx)
            && same_f64(self.x0, other.x0)
            && self.values.len() == other.values.len()
            && self
                .values
                .iter()
                .zip(&other.values)
                .all(|(a, b)| same_f64(*a, *b))
    }
}

/// Float equality that treats identical NaN payloads as equal.
#[inline]
fn same_f64(a: f64, b: f64) -> bool {
    a == b || a.to_bits() == b.to_bits()
}

/// Largest declared sample count honoured when padding a series.
pub const MAX_SAMPLE_COUNT: usize = 1 << 24;

/// Interpret a parsed `ten` value as a sample count.
///
/// `Ok(None)` for NaN, negative or fractional values. A whole count above
/// [`MAX_SAMPLE_COUNT`] is a [`ForceBridgeError::Parse`] error.
pub fn check_declared_count(ten: f64) -> Result<Option<usize>> {
    if !(ten.is_finite() && ten >= 0.0 && ten.fract() == 0.0) {
        return Ok(None);
    }
    if ten > MAX_SAMPLE_COUNT as f64 {
        return Err(ForceBridgeError::Parse(format!(
            "declared sample count {} exceeds the limit of {}",
            ten, MAX_SAMPLE_COUNT
        )));
    }
    Ok(Some(ten as usize))
}

/// Interpret a parsed `ten` value as a sample count, treating an
/// oversized count like an unparsable one.
pub fn declared_count(ten: f64) -> Option<usize> {
    check_declared_count(ten).ok().flatten()
}

/// A node in the reconstructed variable tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VariableNode {
    Leaf(LeafRecord),
    Branch(Branch),
}

impl VariableNode {
    pub fn is_leaf(&self) -> bool {
        matches!(self, VariableNode::Leaf(_))
    }

    pub fn as_leaf(&self) -> Option<&LeafRecord> {
        match self {
            VariableNode::Leaf(leaf) => Some(leaf),
            VariableNode::Branch(_) => None,
        }
    }

    pub fn as_branch(&self) -> Option<&Branch> {
        match self {
            VariableNode::Branch(branch) => Some(branch),
            VariableNode::Leaf(_) => None,
        }
    }

    /// Number of leaves below (and including) this node.
    pub fn leaf_count(&self) -> usize {
        match self {
            VariableNode::Leaf(_) => 1,
            VariableNode::Branch(branch) => branch.iter().map(|(_, n)| n.leaf_count()).sum(),
        }
    }
}

impl Default for VariableNode {
    fn default() -> Self {
        VariableNode::Branch(Branch::new())
    }
}

/// Internal node: child tokens mapped to nodes, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    children: Vec<(String, VariableNode)>,
}

impl Branch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    fn position(&self, token: &str) -> Option<usize> {
        self.children.iter().position(|(t, _)| t == token)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.position(token).is_some()
    }

    pub fn get(&self, token: &str) -> Option<&VariableNode> {
        self.position(token).map(|i| &self.children[i].1)
    }

    pub fn get_mut(&mut self, token: &str) -> Option<&mut VariableNode> {
        self.position(token).map(move |i| &mut self.children[i].1)
    }

    /// Insert or replace a child. A replaced child keeps its original
    /// position; the previous node is returned.
    pub fn insert(&mut self, token: impl Into<String>, node: VariableNode) -> Option<VariableNode> {
        let token = token.into();
        match self.position(&token) {
            Some(i) => Some(std::mem::replace(&mut self.children[i].1, node)),
            None => {
                self.children.push((token, node));
                None
            }
        }
    }

    /// Remove a child by token.
    pub fn remove(&mut self, token: &str) -> Option<VariableNode> {
        self.position(token).map(|i| self.children.remove(i).1)
    }

    /// Children in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &VariableNode)> {
        self.children.iter().map(|(t, n)| (t.as_str(), n))
    }

    pub(crate) fn entries(&self) -> std::slice::Iter<'_, (String, VariableNode)> {
        self.children.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.children.iter().map(|(t, _)| t.as_str())
    }

    /// Child `token` as a mutable branch, creating it (or replacing a leaf
    /// that sits there) when necessary.
    pub fn branch_mut(&mut self, token: &str) -> &mut Branch {
        let index = match self.position(token) {
            Some(i) => {
                if self.children[i].1.is_leaf() {
                    tracing::debug!("Replacing leaf '{}' with a branch", token);
                    self.children[i].1 = VariableNode::Branch(Branch::new());
                }
                i
            }
            None => {
                self.children
                    .push((token.to_string(), VariableNode::Branch(Branch::new())));
                self.children.len() - 1
            }
        };
        match &mut self.children[index].1 {
            VariableNode::Branch(branch) => branch,
            VariableNode::Leaf(_) => unreachable!("child was just made a branch"),
        }
    }
}

/// The tree reconstructed from one source file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceFileResult {
    /// Root of the file's tree; always a branch.
    pub root: Branch,
    /// Rows that produced a leaf.
    pub rows_parsed: usize,
    /// Rows skipped (blank short name, empty token path).
    pub rows_skipped: usize,
}

impl SourceFileResult {
    pub fn new(root: Branch) -> Self {
        Self {
            root,
            rows_parsed: 0,
            rows_skipped: 0,
        }
    }

    pub fn leaf_count(&self) -> usize {
        self.root.iter().map(|(_, n)| n.leaf_count()).sum()
    }
}

/// Summary statistics over a series, skipping NaN entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeriesStats {
    /// Count of non-NaN values
    pub count: u64,
    pub sum: f64,
    pub sum_sq: f64,
    pub min: f64,
    pub max: f64,
}

impl SeriesStats {
    /// Create a new empty stats tracker
    pub fn new() -> Self {
        Self {
            count: 0,
            sum: 0.0,
            sum_sq: 0.0,
            min: f64::MAX,
            max: f64::MIN,
        }
    }

    pub fn from_values(values: &[f64]) -> Self {
        let mut stats = Self::new();
        for &v in values {
            stats.push(v);
        }
        stats
    }

    /// Add a value; NaN is ignored
    #[inline]
    pub fn push(&mut self, value: f64) {
        if value.is_nan() {
            return;
        }
        self.count += 1;
        self.sum += value;
        self.sum_sq += value * value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    /// Mean of the non-NaN values (NaN when there are none)
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            self.sum / self.count as f64
        }
    }

    /// Sample standard deviation (n - 1 denominator)
    pub fn std(&self) -> f64 {
        if self.count < 2 {
            return f64::NAN;
        }
        let n = self.count as f64;
        let var = (self.sum_sq - self.sum * self.sum / n) / (n - 1.0);
        var.max(0.0).sqrt()
    }

    pub fn rms(&self) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            (self.sum_sq / self.count as f64).sqrt()
        }
    }

    pub fn min(&self) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            self.min
        }
    }

    pub fn max(&self) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            self.max
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(values: Vec<f64>) -> LeafRecord {
        LeafRecord::new("s", "N", values.len() as f64, 0.1, 0.0, values)
    }

    #[test]
    fn test_leaf_equality_with_nan() {
        let a = leaf(vec![1.0, f64::NAN, 3.0]);
        let b = leaf(vec![1.0, f64::NAN, 3.0]);
        let c = leaf(vec![1.0, 2.0, 3.0]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_with_values_keeps_descriptors() {
        let a = leaf(vec![1.0, 2.0]);
        let b = a.with_values(vec![5.0, 6.0]);
        assert_eq!(b.values(), &[5.0, 6.0]);
        assert_eq!(b.dx(), a.dx());
        assert_eq!(b.yunit(), "N");
        assert_eq!(a.values(), &[1.0, 2.0]);
    }

    #[test]
    fn test_declared_count() {
        assert_eq!(declared_count(5.0), Some(5));
        assert_eq!(declared_count(0.0), Some(0));
        assert_eq!(declared_count(f64::NAN), None);
        assert_eq!(declared_count(-1.0), None);
        assert_eq!(declared_count(2.5), None);
    }

    #[test]
    fn test_oversized_declared_count_rejected() {
        assert_eq!(declared_count(MAX_SAMPLE_COUNT as f64), Some(MAX_SAMPLE_COUNT));
        assert_eq!(declared_count(1e20), None);
        assert_eq!(declared_count(f64::MAX), None);

        let err = check_declared_count(1e12).unwrap_err();
        assert!(matches!(err, ForceBridgeError::Parse(_)));
        assert!(err.to_string().contains("1000000000000"));
        assert!(check_declared_count(f64::INFINITY).unwrap().is_none());
    }

    #[test]
    fn test_x_axis() {
        let l = LeafRecord::new("s", "N", 3.0, 0.5, 1.0, vec![0.0; 3]);
        assert_eq!(l.x_axis(), vec![1.0, 1.5, 2.0]);
    }

    #[test]
    fn test_branch_insert_keeps_order_and_position() {
        let mut b = Branch::new();
        b.insert("b", VariableNode::Leaf(leaf(vec![1.0])));
        b.insert("a", VariableNode::Leaf(leaf(vec![2.0])));
        let prev = b.insert("b", VariableNode::Leaf(leaf(vec![3.0])));

        assert!(prev.is_some());
        assert_eq!(b.keys().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(b.get("b").and_then(|n| n.as_leaf()).unwrap().values(), &[3.0]);
    }

    #[test]
    fn test_branch_mut_replaces_leaf() {
        let mut b = Branch::new();
        b.insert("x", VariableNode::Leaf(leaf(vec![1.0])));
        b.branch_mut("x").insert("y", VariableNode::Leaf(leaf(vec![2.0])));

        let x = b.get("x").unwrap();
        assert!(!x.is_leaf());
        assert_eq!(x.leaf_count(), 1);
    }

    #[test]
    fn test_series_stats_skip_nan() {
        let stats = SeriesStats::from_values(&[1.0, f64::NAN, 3.0]);
        assert_eq!(stats.count, 2);
        assert_eq!(stats.mean(), 2.0);
        assert_eq!(stats.min(), 1.0);
        assert_eq!(stats.max(), 3.0);
        assert!((stats.std() - std::f64::consts::SQRT_2).abs() < 1e-12);
    }

    #[test]
    fn test_series_stats_empty() {
        let stats = SeriesStats::from_values(&[f64::NAN]);
        assert!(stats.mean().is_nan());
        assert!(stats.min().is_nan());
        assert!(stats.rms().is_nan());
    }
}
