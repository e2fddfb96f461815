// src/core/index.rs

use crate::error::{MTError, Result};

/// Largest supported tree height. Node indices go up to `2^(height+1) - 2`,
/// which has to fit in a `u64`.
pub const MAX_TREE_HEIGHT: u8 = 62;

/// Index arithmetic for a complete binary tree stored in level order.
///
/// Positions are indexed level-order (BFS): root=0, left child=2i+1, right
/// child=2i+2. A tree of height `h` has `2^h` leaves, and leaf `k` sits at
/// node index `k + 2^h - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathResolver {
    height: u8,
}

impl PathResolver {
    /// Create a resolver for a tree of the given height (1..=62).
    pub fn new(height: u8) -> Result<Self> {
        if height == 0 || height > MAX_TREE_HEIGHT {
            return Err(MTError::validation(format!(
                "tree height must be between 1 and {}, got {}",
                MAX_TREE_HEIGHT, height
            )));
        }
        Ok(Self { height })
    }

    /// Height of the tree.
    pub fn height(&self) -> u8 {
        self.height
    }

    /// Number of leaf slots, `2^height`.
    pub fn leaf_capacity(&self) -> u64 {
        1u64 << self.height
    }

    /// Node index of leaf 0.
    pub fn first_leaf_node(&self) -> u64 {
        self.leaf_capacity() - 1
    }

    /// Largest valid node index, `2^(height+1) - 2`.
    pub fn max_node_index(&self) -> u64 {
        (1u64 << (self.height + 1)) - 2
    }

    /// Fail with `OutOfRange` unless `leaf_index < 2^height`.
    pub fn check_leaf(&self, leaf_index: u64) -> Result<()> {
        if leaf_index >= self.leaf_capacity() {
            return Err(MTError::leaf_out_of_range(leaf_index, self.leaf_capacity()));
        }
        Ok(())
    }

    /// Fail with `OutOfRange` unless the node index is inside the tree.
    pub fn check_node(&self, node_index: u64) -> Result<()> {
        if node_index > self.max_node_index() {
            return Err(MTError::node_out_of_range(node_index, self.max_node_index() + 1));
        }
        Ok(())
    }

    /// `leafIndex + 2^height - 1`
    pub fn leaf_to_node(&self, leaf_index: u64) -> Result<u64> {
        self.check_leaf(leaf_index)?;
        Ok(leaf_index + self.first_leaf_node())
    }

    /// Inverse of [`leaf_to_node`](Self::leaf_to_node); fails for nodes above the leaf level.
    pub fn node_to_leaf(&self, node_index: u64) -> Result<u64> {
        self.check_node(node_index)?;
        if node_index < self.first_leaf_node() {
            return Err(MTError::validation(format!(
                "node {} is not on the leaf level",
                node_index
            )));
        }
        Ok(node_index - self.first_leaf_node())
    }

    /// Whether the node lies on the leaf level. Assumes an in-range index.
    pub fn is_leaf_node(&self, node_index: u64) -> bool {
        node_index >= self.first_leaf_node() && node_index <= self.max_node_index()
    }

    /// Depth of a node: 0 for the root, `height` for leaves.
    pub fn level(node_index: u64) -> u8 {
        (63 - (node_index + 1).leading_zeros()) as u8
    }

    /// `⌊(i-1)/2⌋`, or `None` for the root.
    pub fn parent(node_index: u64) -> Option<u64> {
        if node_index == 0 {
            None
        } else {
            Some((node_index - 1) / 2)
        }
    }

    /// Left child is odd, right child is even; the root is neither.
    pub fn is_left(node_index: u64) -> bool {
        node_index % 2 == 1
    }

    /// The other child of the same parent, or `None` for the root.
    pub fn sibling(node_index: u64) -> Option<u64> {
        match node_index {
            0 => None,
            i if Self::is_left(i) => Some(i + 1),
            i => Some(i - 1),
        }
    }

    /// `(left, right)` children of a node.
    pub fn children(node_index: u64) -> (u64, u64) {
        (2 * node_index + 1, 2 * node_index + 2)
    }

    /// Strict ancestors of a node, parent first, ending with the root.
    pub fn ancestor_path(&self, node_index: u64) -> Result<Vec<u64>> {
        self.check_node(node_index)?;
        let mut path = Vec::with_capacity(Self::level(node_index) as usize);
        let mut current = node_index;
        while let Some(parent) = Self::parent(current) {
            path.push(parent);
            current = parent;
        }
        Ok(path)
    }

    /// Sibling node index at every level from the leaf up to (excluding) the root.
    ///
    /// This is the read set needed to recompute the leaf's ancestor chain.
    pub fn sibling_path(&self, leaf_index: u64) -> Result<Vec<u64>> {
        let mut current = self.leaf_to_node(leaf_index)?;
        let mut path = Vec::with_capacity(self.height as usize);
        while let Some(sibling) = Self::sibling(current) {
            path.push(sibling);
            current = (current - 1) / 2;
        }
        Ok(path)
    }

    /// Inclusive span `(first, last)` of leaf indices beneath a node.
    pub fn leaf_span(&self, node_index: u64) -> Result<(u64, u64)> {
        self.check_node(node_index)?;
        let level = Self::level(node_index);
        let level_start = (1u64 << level) - 1;
        let width = 1u64 << (self.height - level);
        let first = (node_index - level_start) * width;
        Ok((first, first + width - 1))
    }
}
