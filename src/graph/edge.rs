//! Edge type and validation.
//!
//! Edges are `(source, target)` pairs of node slots. Pairs that reference a
//! slot outside the dataset are dropped at load time with a warning; they
//! never reach the force kernel.

use tracing::warn;

use super::node::NodeId;

/// A validated link between two node slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub source: NodeId,
    pub target: NodeId,
}

impl Edge {
    pub fn new(source: u32, target: u32) -> Self {
        Self {
            source: NodeId(source),
            target: NodeId(target),
        }
    }
}

/// Which end of an edge a node sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeRole {
    Source,
    Target,
}

/// Keep the pairs whose endpoints both fall inside `0..node_count`.
///
/// `pairs` is a flat `[src0, tgt0, src1, tgt1, ...]` array. A trailing odd
/// element is ignored.
pub fn validate_pairs(pairs: &[u32], node_count: usize) -> Vec<Edge> {
    let mut edges = Vec::with_capacity(pairs.len() / 2);
    let mut dropped = 0usize;

    for pair in pairs.chunks_exact(2) {
        let (source, target) = (pair[0], pair[1]);
        if source as usize >= node_count || target as usize >= node_count {
            warn!(source, target, node_count, "dropping link with out-of-range endpoint");
            dropped += 1;
            continue;
        }
        edges.push(Edge::new(source, target));
    }

    if dropped > 0 {
        warn!(dropped, kept = edges.len(), "invalid links removed");
    }
    edges
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_drops_out_of_range_target() {
        let edges = validate_pairs(&[0, 1, 1, 5, 2, 0], 3);
        assert_eq!(edges, vec![Edge::new(0, 1), Edge::new(2, 0)]);
    }

    #[test]
    fn test_validate_drops_out_of_range_source() {
        let edges = validate_pairs(&[3, 0], 3);
        assert!(edges.is_empty());
    }

    #[test]
    fn test_validate_ignores_odd_tail() {
        let edges = validate_pairs(&[0, 1, 2], 3);
        assert_eq!(edges.len(), 1);
    }
}
