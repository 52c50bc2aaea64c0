//! Force-directed layout.
//!
//! `force` holds the per-node kernel that integrates link, repulsion and
//! center forces. `repulsion` describes where each node's repulsion comes
//! from: the spatial index, a strided sample, or every other node.

pub mod force;
pub mod repulsion;

pub use force::{CENTER_SCALE, ForceKernel, ForceParams};
pub use repulsion::{Repulsion, RepulsionStrategy};
