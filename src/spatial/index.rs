//! Multi-resolution grid index producing capped neighbor lists.
//!
//! # Full rebuild
//!
//! 1. Compute padded bounds over finite positions.
//! 2. Count occupancy of every standard-resolution cell.
//! 3. Route each node by its cell's occupancy: crowded cells go to the fine
//!    grid, near-empty ones to the coarse grid, the rest to the standard grid.
//! 4. For each node, search the 3x3x3 block around it in its home grid (plus
//!    the standard grid for fine/coarse nodes), dedupe, sort by distance and
//!    keep the closest `max_neighbors`.
//!
//! # Incremental patch
//!
//! Grids are rebuilt against the bounds of the last full rebuild, then only
//! nodes within the influence radius of a moved node (at its old or new
//! position) get their lists recomputed. The radius is at least twice the
//! standard cell size and grows to the widest search reach in use, so every
//! other node keeps a cached list identical to what a rebuild would give.

use tracing::debug;

use super::grid::{Bounds, DensityClass, Grid, NodeRef, distance, is_finite};
use super::neighbors::{NeighborBuffer, NeighborRecord};
use super::rtree::InfluenceTree;
use crate::config::SimulationConfig;
use crate::error::IndexError;

/// Search reach of a 3x3x3 block, in cell diagonals.
const INFLUENCE_CELLS: f32 = 2.0;

/// Slack for cell quantization rounding at the block edge.
const REACH_MARGIN: f32 = 1.001;

/// Parameters read by the index on every pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexParams {
    pub grid_resolution: u32,
    pub fine_grid_resolution: u32,
    pub coarse_grid_resolution: u32,
    pub dense_threshold: usize,
    pub sparse_threshold: usize,
    pub max_neighbors: usize,
    pub use_multi_resolution: bool,
}

impl IndexParams {
    /// Grid settings from `config` with the current neighbor cap.
    pub fn from_config(config: &SimulationConfig, max_neighbors: usize) -> Self {
        Self {
            grid_resolution: config.grid_resolution,
            fine_grid_resolution: config.fine_grid_resolution,
            coarse_grid_resolution: config.coarse_grid_resolution,
            dense_threshold: config.dense_threshold,
            sparse_threshold: config.sparse_threshold,
            max_neighbors,
            use_multi_resolution: config.use_multi_resolution,
        }
    }

    fn check(&self) -> Result<(), IndexError> {
        for resolution in [
            self.grid_resolution,
            self.fine_grid_resolution,
            self.coarse_grid_resolution,
        ] {
            if resolution == 0 {
                return Err(IndexError::Resolution(resolution));
            }
        }
        Ok(())
    }
}

impl Default for IndexParams {
    fn default() -> Self {
        Self::from_config(&SimulationConfig::default(), SimulationConfig::default().max_neighbors)
    }
}

/// What an index pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexPass {
    Full { indexed: usize },
    Incremental { moved: usize, recomputed: usize },
}

/// A source of per-node neighbor lists.
///
/// [`SpatialIndex`] is the default backend; hosts may supply another one.
pub trait NeighborIndex {
    /// Recompute every node's neighbors from scratch.
    fn build(&mut self, positions: &[[f32; 3]], params: &IndexParams) -> Result<IndexPass, IndexError>;

    /// Refresh the lists affected by `moved` nodes.
    fn patch(
        &mut self,
        positions: &[[f32; 3]],
        moved: &[u32],
        params: &IndexParams,
    ) -> Result<IndexPass, IndexError>;

    /// Neighbor lists from the last successful pass.
    fn neighbors(&self) -> Option<&NeighborBuffer>;

    /// Drop all cached state.
    fn clear(&mut self);
}

/// Grids plus the cached neighbor buffer.
#[derive(Debug, Default)]
pub struct SpatialIndex {
    bounds: Option<Bounds>,
    standard: Option<Grid>,
    fine: Option<Grid>,
    coarse: Option<Grid>,
    /// Home class per node; None for non-finite positions.
    classes: Vec<Option<DensityClass>>,
    /// Positions seen by the last pass.
    indexed_positions: Vec<[f32; 3]>,
    buffer: Option<NeighborBuffer>,
}

impl SpatialIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Density class assigned to `node` by the last pass.
    pub fn density_class(&self, node: usize) -> Option<DensityClass> {
        self.classes.get(node).copied().flatten()
    }

    /// Bounds used for quantization, fixed since the last full rebuild.
    pub fn bounds(&self) -> Option<Bounds> {
        self.bounds
    }

    /// Rebuild the grids against the cached bounds.
    fn populate_grids(&mut self, positions: &[[f32; 3]], params: &IndexParams) {
        self.classes = vec![None; positions.len()];
        let Some(bounds) = self.bounds else {
            self.standard = None;
            self.fine = None;
            self.coarse = None;
            return;
        };

        let mut standard = Grid::new(&bounds, params.grid_resolution);
        let nodes = positions
            .iter()
            .enumerate()
            .filter(|(_, p)| is_finite(p))
            .map(|(i, &position)| NodeRef {
                index: i as u32,
                position,
            });

        if !params.use_multi_resolution {
            for node in nodes {
                standard.insert(node);
                self.classes[node.index as usize] = Some(DensityClass::Medium);
            }
            self.standard = Some(standard);
            self.fine = None;
            self.coarse = None;
            return;
        }

        // First pass: occupancy at the standard resolution.
        let mut density = Grid::new(&bounds, params.grid_resolution);
        for node in nodes.clone() {
            density.insert(node);
        }

        // Second pass: route by occupancy.
        let mut fine = Grid::new(&bounds, params.fine_grid_resolution);
        let mut coarse = Grid::new(&bounds, params.coarse_grid_resolution);
        for node in nodes {
            let occupancy = density.occupancy(density.key_for(node.position));
            let class = DensityClass::from_occupancy(
                occupancy,
                params.dense_threshold,
                params.sparse_threshold,
            );
            match class {
                DensityClass::Dense => fine.insert(node),
                DensityClass::Sparse => coarse.insert(node),
                DensityClass::Medium => standard.insert(node),
            };
            self.classes[node.index as usize] = Some(class);
        }

        self.standard = Some(standard);
        self.fine = Some(fine);
        self.coarse = Some(coarse);
    }

    /// Closest neighbors of `node`, sorted ascending and capped at
    /// `max_neighbors`.
    fn search(&self, node: usize, positions: &[[f32; 3]], max_neighbors: usize) -> Vec<NeighborRecord> {
        let Some(class) = self.density_class(node) else {
            return Vec::new();
        };
        let position = positions[node];

        let home = match class {
            DensityClass::Dense => self.fine.as_ref(),
            DensityClass::Sparse => self.coarse.as_ref(),
            DensityClass::Medium => self.standard.as_ref(),
        };
        // Fine and coarse nodes also look across into the standard grid.
        let cross = match class {
            DensityClass::Medium => None,
            _ => self.standard.as_ref(),
        };

        let mut candidates: Vec<NeighborRecord> = home
            .into_iter()
            .chain(cross)
            .flat_map(|grid| grid.neighborhood(position))
            .filter(|other| other.index as usize != node)
            .map(|other| NeighborRecord {
                index: other.index,
                distance: distance(position, other.position),
            })
            .collect();

        // Dedupe by index, keeping the smallest distance.
        candidates.sort_unstable_by(|a, b| {
            a.index
                .cmp(&b.index)
                .then(a.distance.total_cmp(&b.distance))
        });
        candidates.dedup_by_key(|record| record.index);

        candidates.sort_unstable_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.index.cmp(&b.index))
        });

        // Working set, then the exposed cap.
        candidates.truncate(2 * max_neighbors);
        candidates.truncate(max_neighbors);
        candidates
    }

    /// Distance from a moved node beyond which no cached list can change.
    ///
    /// Two nodes in one 3x3x3 block are less than two cell diagonals apart,
    /// so the flat grid needs twice the standard diagonal. With multiple
    /// resolutions the widest grid sets the reach, and a mover can also
    /// reclassify nodes sharing its standard cell, which pushes the radius
    /// out by one more standard diagonal. Either way it covers twice the
    /// standard cell size.
    pub fn influence_radius(&self, params: &IndexParams) -> f32 {
        let Some(bounds) = self.bounds else {
            return 0.0;
        };
        let diagonal = |resolution: u32| {
            let [x, y, z] = bounds.cell_size(resolution);
            (x * x + y * y + z * z).sqrt()
        };

        let standard = diagonal(params.grid_resolution);
        let radius = if params.use_multi_resolution {
            let reach = standard
                .max(diagonal(params.fine_grid_resolution))
                .max(diagonal(params.coarse_grid_resolution));
            INFLUENCE_CELLS * reach + standard
        } else {
            INFLUENCE_CELLS * standard
        };
        radius * REACH_MARGIN
    }
}

impl NeighborIndex for SpatialIndex {
    fn build(&mut self, positions: &[[f32; 3]], params: &IndexParams) -> Result<IndexPass, IndexError> {
        params.check()?;
        let mut buffer = NeighborBuffer::new(positions.len(), params.max_neighbors)?;

        self.bounds = Bounds::from_positions(positions);
        self.populate_grids(positions, params);

        let mut indexed = 0;
        for node in 0..positions.len() {
            let records = self.search(node, positions, params.max_neighbors);
            if self.classes[node].is_some() {
                indexed += 1;
            }
            buffer.write(node, &records);
        }

        self.indexed_positions = positions.to_vec();
        self.buffer = Some(buffer);

        debug!(nodes = positions.len(), indexed, "spatial index rebuilt");
        Ok(IndexPass::Full { indexed })
    }

    fn patch(
        &mut self,
        positions: &[[f32; 3]],
        moved: &[u32],
        params: &IndexParams,
    ) -> Result<IndexPass, IndexError> {
        let reusable = self.bounds.is_some()
            && self.indexed_positions.len() == positions.len()
            && self.buffer.as_ref().is_some_and(|buffer| {
                buffer.node_count() == positions.len() && buffer.max_neighbors() == params.max_neighbors
            });
        if !reusable {
            debug!("no reusable neighbor cache, falling back to full rebuild");
            return self.build(positions, params);
        }
        params.check()?;

        self.populate_grids(positions, params);

        let tree = InfluenceTree::from_positions(positions);
        let radius = self.influence_radius(params);
        let mut affected = vec![false; positions.len()];

        for &node in moved {
            let node = node as usize;
            if node >= positions.len() {
                continue;
            }
            affected[node] = true;
            for center in [positions[node], self.indexed_positions[node]] {
                if !is_finite(&center) {
                    continue;
                }
                for other in tree.within(center, radius) {
                    affected[other.index()] = true;
                }
            }
        }

        let mut recomputed = 0;
        for node in (0..positions.len()).filter(|&node| affected[node]) {
            let records = self.search(node, positions, params.max_neighbors);
            if let Some(buffer) = self.buffer.as_mut() {
                buffer.write(node, &records);
            }
            recomputed += 1;
        }

        self.indexed_positions.copy_from_slice(positions);

        debug!(moved = moved.len(), recomputed, radius, "spatial index patched");
        Ok(IndexPass::Incremental {
            moved: moved.len(),
            recomputed,
        })
    }

    fn neighbors(&self) -> Option<&NeighborBuffer> {
        self.buffer.as_ref()
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}
