//! Movement-based gate for index work.
//!
//! Compares current positions to the snapshot taken at the last index pass
//! and picks one of three outcomes: skip, patch the moved nodes, or rebuild.

use tracing::debug;

/// Fraction of nodes below which a moved set is patched instead of rebuilt.
const INCREMENTAL_FRACTION: f64 = 0.1;

/// Decision for the next index pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexUpdate {
    /// Nothing moved far enough to matter.
    Skip,
    /// Recompute around these nodes only.
    Patch(Vec<u32>),
    Rebuild,
}

impl IndexUpdate {
    pub fn label(&self) -> &'static str {
        match self {
            IndexUpdate::Skip => "skip",
            IndexUpdate::Patch(_) => "patch",
            IndexUpdate::Rebuild => "rebuild",
        }
    }
}

/// Holds the position snapshot of the last index pass.
#[derive(Debug, Default)]
pub struct MovementTracker {
    snapshot: Option<Vec<[f32; 3]>>,
}

impl MovementTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide what the index needs given `current` positions.
    pub fn assess(&self, current: &[[f32; 3]], threshold: f64) -> IndexUpdate {
        let Some(previous) = self.snapshot.as_ref() else {
            return IndexUpdate::Rebuild;
        };
        if previous.len() != current.len() {
            return IndexUpdate::Rebuild;
        }

        let mut max_displacement = 0.0f64;
        let mut moved = Vec::new();
        for (i, (before, after)) in previous.iter().zip(current).enumerate() {
            let displacement = displacement(before, after);
            max_displacement = max_displacement.max(displacement);
            if displacement > threshold {
                moved.push(i as u32);
            }
        }

        let node_count = current.len();
        let incremental = (moved.len() as f64) < node_count as f64 * INCREMENTAL_FRACTION;
        let update = if !moved.is_empty() && incremental {
            IndexUpdate::Patch(moved)
        } else if max_displacement > threshold {
            IndexUpdate::Rebuild
        } else {
            IndexUpdate::Skip
        };

        debug!(
            node_count,
            max_displacement,
            threshold,
            decision = update.label(),
            "movement assessed"
        );
        update
    }

    /// Record `current` as the positions the index now reflects.
    pub fn commit(&mut self, current: &[[f32; 3]]) {
        match self.snapshot.as_mut() {
            Some(snapshot) if snapshot.len() == current.len() => snapshot.copy_from_slice(current),
            _ => self.snapshot = Some(current.to_vec()),
        }
    }

    pub fn has_snapshot(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Forget the snapshot so the next assessment forces a rebuild.
    pub fn reset(&mut self) {
        self.snapshot = None;
    }
}

/// Euclidean displacement. A node gaining or losing a finite position counts
/// as moving infinitely far; staying non-finite counts as not moving.
fn displacement(before: &[f32; 3], after: &[f32; 3]) -> f64 {
    let finite_before = before.iter().all(|c| c.is_finite());
    let finite_after = after.iter().all(|c| c.is_finite());
    match (finite_before, finite_after) {
        (true, true) => {
            let dx = (after[0] - before[0]) as f64;
            let dy = (after[1] - before[1]) as f64;
            let dz = (after[2] - before[2]) as f64;
            (dx * dx + dy * dy + dz * dz).sqrt()
        }
        (false, false) => 0.0,
        _ => f64::INFINITY,
    }
}
