//! Spatial neighbor index.
//!
//! A multi-resolution hash grid bounds repulsion cost per node by handing
//! the force kernel a capped, distance-sorted neighbor list. A movement
//! tracker decides each pass whether the index is skipped, patched, or
//! rebuilt.

mod grid;
mod index;
mod movement;
mod neighbors;
mod rtree;

pub use grid::{BOUNDS_PADDING, Bounds, CellKey, DensityClass, Grid, NodeRef};
pub use index::{IndexParams, IndexPass, NeighborIndex, SpatialIndex};
pub use movement::{IndexUpdate, MovementTracker};
pub use neighbors::{NeighborBuffer, NeighborRecord, SENTINEL_DISTANCE, SENTINEL_INDEX};
pub use rtree::InfluenceTree;
