//! Repulsion strategies and the fallback ladder.
//!
//! In order of preference: the spatial index's neighbor lists, a strided
//! sample of all nodes scaled by the stride, and brute-force all pairs.

use serde::Serialize;

use crate::config::SimulationConfig;
use crate::spatial::NeighborBuffer;

/// Which repulsion path a tick used. Reported to hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RepulsionStrategy {
    Indexed,
    Sampled { stride: usize },
    BruteForce,
}

impl RepulsionStrategy {
    /// Ladder step to use when no neighbor buffer is available.
    pub fn unindexed(node_count: usize, config: &SimulationConfig) -> Self {
        if node_count > config.sampling_threshold {
            let stride = node_count.div_ceil(config.max_repulsion_samples.max(1));
            if stride > 1 {
                return RepulsionStrategy::Sampled { stride };
            }
        }
        RepulsionStrategy::BruteForce
    }
}

/// Repulsion input handed to the kernel for one tick.
#[derive(Debug, Clone, Copy)]
pub enum Repulsion<'a> {
    /// Each node is repelled only by its indexed neighbors.
    Indexed(&'a NeighborBuffer),
    /// Each node visits `offset, offset + stride, ...`; contributions are
    /// scaled by `stride`.
    Sampled { stride: usize, offset: usize },
    BruteForce,
}

impl Repulsion<'_> {
    pub fn strategy(&self) -> RepulsionStrategy {
        match *self {
            Repulsion::Indexed(_) => RepulsionStrategy::Indexed,
            Repulsion::Sampled { stride, .. } => RepulsionStrategy::Sampled { stride },
            Repulsion::BruteForce => RepulsionStrategy::BruteForce,
        }
    }
}
