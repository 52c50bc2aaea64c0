//! R-tree over node positions for radius queries.
//!
//! Used by incremental index updates to find every node inside the
//! influence radius of a moved node without scanning the whole graph.

use rstar::{AABB, PointDistance, RTree, RTreeObject};

use super::grid::is_finite;
use crate::graph::NodeId;

/// A node position stored in the tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodePoint {
    pub id: NodeId,
    pub position: [f32; 3],
}

impl RTreeObject for NodePoint {
    type Envelope = AABB<[f32; 3]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.position)
    }
}

impl PointDistance for NodePoint {
    fn distance_2(&self, point: &[f32; 3]) -> f32 {
        let dx = self.position[0] - point[0];
        let dy = self.position[1] - point[1];
        let dz = self.position[2] - point[2];
        dx * dx + dy * dy + dz * dz
    }

    fn contains_point(&self, point: &[f32; 3]) -> bool {
        self.distance_2(point) < f32::EPSILON
    }
}

/// Bulk-loaded R*-tree snapshot of finite node positions.
pub struct InfluenceTree {
    tree: RTree<NodePoint>,
}

impl InfluenceTree {
    /// Bulk-load every finite position. Non-finite nodes are left out.
    pub fn from_positions(positions: &[[f32; 3]]) -> Self {
        let points: Vec<_> = positions
            .iter()
            .enumerate()
            .filter(|(_, p)| is_finite(p))
            .map(|(i, &position)| NodePoint {
                id: NodeId(i as u32),
                position,
            })
            .collect();

        Self {
            tree: RTree::bulk_load(points),
        }
    }

    /// Nodes within `radius` of `center`, inclusive.
    pub fn within(&self, center: [f32; 3], radius: f32) -> impl Iterator<Item = NodeId> + '_ {
        self.tree
            .locate_within_distance(center, radius * radius)
            .map(|point| point.id)
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}
