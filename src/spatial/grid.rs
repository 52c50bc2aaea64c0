//! Uniform hash grids over padded node bounds.
//!
//! A grid quantizes positions into integer cell triples at a fixed
//! resolution per axis. Cells are sparse: only occupied keys are stored.

use std::collections::HashMap;

use serde::Serialize;

/// Padding added on every side of the node bounds.
pub const BOUNDS_PADDING: f32 = 1.0;

/// Integer cell coordinates at some grid resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellKey {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl CellKey {
    #[inline]
    fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            z: self.z + dz,
        }
    }
}

/// A node as stored in a grid cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeRef {
    pub index: u32,
    pub position: [f32; 3],
}

/// Occupancy class of a node's standard-resolution cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DensityClass {
    /// Crowded cell: indexed in the fine grid.
    Dense,
    Medium,
    /// Near-empty cell: indexed in the coarse grid.
    Sparse,
}

impl DensityClass {
    /// Classify from standard-cell occupancy. `dense` wins if the thresholds overlap.
    pub fn from_occupancy(occupancy: usize, dense: usize, sparse: usize) -> Self {
        if occupancy >= dense {
            DensityClass::Dense
        } else if occupancy <= sparse {
            DensityClass::Sparse
        } else {
            DensityClass::Medium
        }
    }
}

/// Padded axis-aligned box around all finite positions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl Bounds {
    /// Bounds over finite positions plus [`BOUNDS_PADDING`]. None if no
    /// position is finite.
    pub fn from_positions(positions: &[[f32; 3]]) -> Option<Self> {
        let mut min = [f32::INFINITY; 3];
        let mut max = [f32::NEG_INFINITY; 3];
        let mut any = false;

        for p in positions.iter().filter(|p| is_finite(p)) {
            any = true;
            for axis in 0..3 {
                min[axis] = min[axis].min(p[axis]);
                max[axis] = max[axis].max(p[axis]);
            }
        }

        if !any {
            return None;
        }
        for axis in 0..3 {
            min[axis] -= BOUNDS_PADDING;
            max[axis] += BOUNDS_PADDING;
        }
        Some(Self { min, max })
    }

    /// Per-axis cell size at `resolution` cells per axis.
    pub fn cell_size(&self, resolution: u32) -> [f32; 3] {
        let r = resolution.max(1) as f32;
        [
            (self.max[0] - self.min[0]) / r,
            (self.max[1] - self.min[1]) / r,
            (self.max[2] - self.min[2]) / r,
        ]
    }
}

/// Sparse uniform grid at one resolution.
#[derive(Debug, Clone)]
pub struct Grid {
    resolution: u32,
    origin: [f32; 3],
    cell_size: [f32; 3],
    cells: HashMap<CellKey, Vec<NodeRef>>,
}

impl Grid {
    pub fn new(bounds: &Bounds, resolution: u32) -> Self {
        Self {
            resolution: resolution.max(1),
            origin: bounds.min,
            cell_size: bounds.cell_size(resolution),
            cells: HashMap::new(),
        }
    }

    /// Cell containing `position`. Positions outside the bounds land in the
    /// nearest edge cell.
    pub fn key_for(&self, position: [f32; 3]) -> CellKey {
        let last = self.resolution as i32 - 1;
        let quantize = |axis: usize| -> i32 {
            let cell = ((position[axis] - self.origin[axis]) / self.cell_size[axis]).floor();
            (cell as i32).clamp(0, last)
        };
        CellKey {
            x: quantize(0),
            y: quantize(1),
            z: quantize(2),
        }
    }

    pub fn insert(&mut self, node: NodeRef) -> CellKey {
        let key = self.key_for(node.position);
        self.cells.entry(key).or_default().push(node);
        key
    }

    /// Number of nodes in the cell.
    pub fn occupancy(&self, key: CellKey) -> usize {
        self.cells.get(&key).map_or(0, Vec::len)
    }

    /// Nodes in the 3x3x3 block of cells around `position`.
    pub fn neighborhood(&self, position: [f32; 3]) -> impl Iterator<Item = &NodeRef> + '_ {
        let center = self.key_for(position);
        (-1..=1)
            .flat_map(move |dx| {
                (-1..=1).flat_map(move |dy| (-1..=1).map(move |dz| center.offset(dx, dy, dz)))
            })
            .filter_map(move |key| self.cells.get(&key))
            .flatten()
    }

    /// Number of occupied cells.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Number of nodes stored.
    pub fn len(&self) -> usize {
        self.cells.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

#[inline]
pub fn is_finite(position: &[f32; 3]) -> bool {
    position.iter().all(|c| c.is_finite())
}

#[inline]
pub fn distance(a: [f32; 3], b: [f32; 3]) -> f32 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    (dx * dx + dy * dy + dz * dz).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_bounds() -> Bounds {
        // Padding of 1 around [0, 8] gives a 10-unit cube from -1 to 9.
        Bounds::from_positions(&[[0.0, 0.0, 0.0], [8.0, 8.0, 8.0]]).unwrap()
    }

    #[test]
    fn test_bounds_are_padded_and_skip_non_finite() {
        let bounds =
            Bounds::from_positions(&[[0.0, 0.0, 0.0], [f32::NAN, 50.0, 0.0], [2.0, 4.0, 0.0]])
                .unwrap();
        assert_eq!(bounds.min, [-1.0, -1.0, -1.0]);
        assert_eq!(bounds.max, [3.0, 5.0, 1.0]);

        assert!(Bounds::from_positions(&[[f32::INFINITY, 0.0, 0.0]]).is_none());
    }

    #[test]
    fn test_cell_size() {
        assert_eq!(unit_bounds().cell_size(5), [2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_key_for_clamps_to_grid() {
        let grid = Grid::new(&unit_bounds(), 5);
        assert_eq!(grid.key_for([0.0, 0.0, 0.0]), CellKey { x: 0, y: 0, z: 0 });
        assert_eq!(grid.key_for([4.5, 0.0, 8.9]), CellKey { x: 2, y: 0, z: 4 });
        assert_eq!(grid.key_for([-100.0, 100.0, 4.0]), CellKey { x: 0, y: 4, z: 2 });
    }

    #[test]
    fn test_insert_and_occupancy() {
        let mut grid = Grid::new(&unit_bounds(), 5);
        let key = grid.insert(NodeRef { index: 0, position: [0.0; 3] });
        grid.insert(NodeRef { index: 1, position: [0.5, 0.5, 0.5] });
        grid.insert(NodeRef { index: 2, position: [8.0, 8.0, 8.0] });

        assert_eq!(grid.occupancy(key), 2);
        assert_eq!(grid.cell_count(), 2);
        assert_eq!(grid.len(), 3);
    }

    #[test]
    fn test_neighborhood_covers_adjacent_cells_only() {
        let mut grid = Grid::new(&unit_bounds(), 5);
        grid.insert(NodeRef { index: 0, position: [0.0; 3] });
        grid.insert(NodeRef { index: 1, position: [2.0, 2.0, 2.0] });
        grid.insert(NodeRef { index: 2, position: [8.0, 8.0, 8.0] });

        let found: Vec<u32> = grid.neighborhood([0.0; 3]).map(|n| n.index).collect();
        assert!(found.contains(&0));
        assert!(found.contains(&1));
        assert!(!found.contains(&2));
    }

    #[test]
    fn test_density_class() {
        assert_eq!(DensityClass::from_occupancy(20, 16, 2), DensityClass::Dense);
        assert_eq!(DensityClass::from_occupancy(2, 16, 2), DensityClass::Sparse);
        assert_eq!(DensityClass::from_occupancy(5, 16, 2), DensityClass::Medium);
        assert_eq!(DensityClass::from_occupancy(3, 3, 3), DensityClass::Dense);
    }

    #[test]
    fn test_distance() {
        assert_eq!(distance([0.0; 3], [3.0, 4.0, 0.0]), 5.0);
    }
}
