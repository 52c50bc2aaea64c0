//! SimulationLoop - drives one simulation tick at a time.
//!
//! Per tick:
//!
//! 1. Advance the tick counter.
//! 2. Every `update_interval` ticks, ask the movement tracker whether the
//!    index should be skipped, patched, or rebuilt, and run that pass. The
//!    position snapshot is only committed when a pass actually ran.
//! 3. Run the force kernel with the indexed neighbor lists, or the next
//!    step down the fallback ladder when there are none.
//! 4. Cool `alpha` and feed the tick duration to the performance controller.
//!
//! Index failures never escape `tick`. The last good neighbor buffer stays
//! in use while failures are below `max_index_failures`; at the limit the
//! buffer is dropped and indexing stays off for the rest of the session.

use std::time::Duration;
#[cfg(not(target_arch = "wasm32"))]
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::SimulationConfig;
use crate::error::{ConfigError, IndexError, SimulationResult};
use crate::graph::{Dataset, GraphState};
use crate::layout::{ForceKernel, ForceParams, Repulsion, RepulsionStrategy};
use crate::perf::{PerformanceBand, PerformanceController, TuningRecord};
use crate::spatial::{
    IndexParams, IndexPass, IndexUpdate, MovementTracker, NeighborBuffer, NeighborIndex,
    SpatialIndex,
};

/// Whether indexed repulsion is available.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum IndexStatus {
    Active,
    /// Not used for this graph under the current configuration.
    Inactive { reason: String },
    /// Recent passes failed; the last good buffer is still served.
    Degraded { consecutive_failures: u32 },
    /// Permanently off for this session.
    Disabled { reason: String },
}

impl IndexStatus {
    pub fn is_disabled(&self) -> bool {
        matches!(self, IndexStatus::Disabled { .. })
    }

    fn serves_neighbors(&self) -> bool {
        matches!(self, IndexStatus::Active | IndexStatus::Degraded { .. })
    }
}

/// What a scheduled index pass did.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexOutcome {
    Skipped,
    Updated(IndexPass),
    Failed(IndexError),
}

/// Summary of one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutcome {
    pub tick: u64,
    /// Present on ticks where an index pass was scheduled.
    pub index: Option<IndexOutcome>,
    pub strategy: RepulsionStrategy,
    /// Present on ticks where the controller evaluated performance.
    pub tuning: Option<TuningRecord>,
}

/// Read-only diagnostics for hosts.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceReport {
    pub tick: u64,
    pub current_fps: f64,
    pub average_fps: f64,
    pub min_fps: f64,
    pub max_fps: f64,
    pub node_count: usize,
    pub edge_count: usize,
    pub band: Option<PerformanceBand>,
    pub history: Vec<TuningRecord>,
    pub max_neighbors: usize,
    pub update_interval: usize,
    pub movement_threshold: f64,
    pub tuning_version: u64,
    pub index_status: IndexStatus,
    pub strategy: RepulsionStrategy,
    pub fallback_reason: Option<String>,
    pub alpha: f32,
}

pub struct SimulationLoop {
    config: SimulationConfig,
    state: GraphState,
    index: Box<dyn NeighborIndex>,
    tracker: MovementTracker,
    kernel: ForceKernel,
    controller: PerformanceController,

    tick: u64,
    alpha: f32,
    status: IndexStatus,
    consecutive_failures: u32,
    last_error: Option<String>,
    strategy: RepulsionStrategy,
    /// Set by reconfiguration; the next pass ignores the tracker.
    force_rebuild: bool,
}

impl SimulationLoop {
    pub fn new(state: GraphState, config: SimulationConfig) -> SimulationResult<Self> {
        config.validate()?;

        let node_count = state.node_count();
        let status = match inactive_reason(&config, node_count) {
            Some(reason) => IndexStatus::Inactive { reason },
            None => IndexStatus::Active,
        };

        Ok(Self {
            index: Box::new(SpatialIndex::new()),
            tracker: MovementTracker::new(),
            kernel: ForceKernel::new(config.parallel_chunk_size),
            controller: PerformanceController::new(&config),
            tick: 0,
            alpha: config.alpha,
            status,
            consecutive_failures: 0,
            last_error: None,
            strategy: RepulsionStrategy::unindexed(node_count, &config),
            force_rebuild: false,
            state,
            config,
        })
    }

    /// Resolve ids, seed missing coordinates, and build the loop.
    pub fn from_dataset(dataset: &Dataset, config: SimulationConfig) -> SimulationResult<Self> {
        let state = GraphState::from_dataset(dataset, config.dimensions)?;
        Self::new(state, config)
    }

    /// Replace the neighbor index backend.
    pub fn with_index(mut self, index: impl NeighborIndex + 'static) -> Self {
        self.index = Box::new(index);
        self.tracker.reset();
        self
    }

    // =========================================================================
    // Ticking
    // =========================================================================

    /// Advance one tick; `elapsed` is the host-measured frame time.
    pub fn tick(&mut self, elapsed: Duration) -> TickOutcome {
        let mut outcome = self.advance();
        outcome.tuning = self
            .controller
            .record(elapsed, self.state.node_count(), self.state.edge_count());
        outcome
    }

    /// Advance one tick, timing it with the system clock.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn step(&mut self) -> TickOutcome {
        let started = Instant::now();
        let mut outcome = self.advance();
        outcome.tuning = self.controller.record(
            started.elapsed(),
            self.state.node_count(),
            self.state.edge_count(),
        );
        outcome
    }

    fn advance(&mut self) -> TickOutcome {
        self.tick += 1;

        let interval = self.controller.tuning().update_interval() as u64;
        let index = (self.tick % interval == 0).then(|| self.update_index());

        let repulsion = select_repulsion(
            &*self.index,
            &self.status,
            &self.config,
            self.state.node_count(),
            self.tick,
        );
        self.strategy = repulsion.strategy();

        let params = ForceParams::from_config(&self.config, self.alpha);
        self.kernel.step(&mut self.state, &params, repulsion);
        self.alpha *= self.config.decay;

        TickOutcome {
            tick: self.tick,
            index,
            strategy: self.strategy,
            tuning: None,
        }
    }

    fn update_index(&mut self) -> IndexOutcome {
        if self.status.is_disabled() {
            return IndexOutcome::Skipped;
        }

        let node_count = self.state.node_count();
        if let Some(reason) = inactive_reason(&self.config, node_count) {
            if !matches!(self.status, IndexStatus::Inactive { .. }) {
                debug!(reason = reason.as_str(), "spatial index deactivated");
                self.index.clear();
                self.tracker.reset();
            }
            self.status = IndexStatus::Inactive { reason };
            return IndexOutcome::Skipped;
        }
        if matches!(self.status, IndexStatus::Inactive { .. }) {
            self.status = IndexStatus::Active;
        }

        let tuning = self.controller.tuning();
        let params = IndexParams::from_config(&self.config, tuning.max_neighbors());
        let positions = self.state.positions();

        // A buffer with a different cap cannot be patched in place.
        let cap_changed =
            self.index.neighbors().map(NeighborBuffer::max_neighbors) != Some(params.max_neighbors);
        let update = if self.force_rebuild || cap_changed {
            IndexUpdate::Rebuild
        } else {
            self.tracker.assess(positions, tuning.movement_threshold())
        };

        let result = match &update {
            IndexUpdate::Skip => return IndexOutcome::Skipped,
            IndexUpdate::Patch(moved) => self.index.patch(positions, moved, &params),
            IndexUpdate::Rebuild => self.index.build(positions, &params),
        };

        match result {
            Ok(pass) => {
                self.tracker.commit(positions);
                if self.consecutive_failures > 0 {
                    info!(
                        failures = self.consecutive_failures,
                        "spatial index recovered"
                    );
                }
                self.consecutive_failures = 0;
                self.last_error = None;
                self.status = IndexStatus::Active;
                self.force_rebuild = false;
                IndexOutcome::Updated(pass)
            }
            Err(err) => {
                self.record_failure(&err);
                IndexOutcome::Failed(err)
            }
        }
    }

    fn record_failure(&mut self, err: &IndexError) {
        self.consecutive_failures += 1;
        let failures = self.consecutive_failures;
        let limit = self.config.max_index_failures;

        if failures >= limit {
            let reason = format!("index failed {failures} consecutive times: {err}");
            error!(failures, %err, "spatial indexing disabled for this session");
            self.index.clear();
            self.tracker.reset();
            self.status = IndexStatus::Disabled { reason };
        } else {
            warn!(failures, limit, %err, "index pass failed, keeping last neighbor buffer");
            self.status = IndexStatus::Degraded {
                consecutive_failures: failures,
            };
        }
        self.last_error = Some(err.to_string());
    }

    // =========================================================================
    // Host interaction
    // =========================================================================

    /// Replace the configuration. Tuning restarts from the new values and
    /// the next index pass is a full rebuild. A disabled index stays off.
    pub fn set_config(&mut self, config: SimulationConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.kernel.set_chunk_size(config.parallel_chunk_size);
        self.controller = PerformanceController::new(&config);
        self.config = config;
        self.force_rebuild = true;
        Ok(())
    }

    /// Restart motion after cooling. Non-finite or negative values are ignored.
    pub fn reheat(&mut self, alpha: f32) -> bool {
        if !alpha.is_finite() || alpha < 0.0 {
            warn!(alpha, "ignoring invalid reheat value");
            return false;
        }
        self.alpha = alpha;
        true
    }

    pub fn set_static(&mut self, slot: usize, is_static: bool) -> bool {
        self.state.set_static(slot, is_static)
    }

    pub fn set_position(&mut self, slot: usize, position: [f32; 3]) -> bool {
        self.state.set_position(slot, position)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn state(&self) -> &GraphState {
        &self.state
    }

    pub fn positions(&self) -> &[[f32; 3]] {
        self.state.positions()
    }

    pub fn velocities(&self) -> &[[f32; 3]] {
        self.state.velocities()
    }

    /// Neighbor lists from the last successful index pass.
    pub fn neighbors(&self) -> Option<&NeighborBuffer> {
        self.index.neighbors()
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn controller(&self) -> &PerformanceController {
        &self.controller
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn index_status(&self) -> &IndexStatus {
        &self.status
    }

    /// Repulsion strategy used by the most recent tick.
    pub fn strategy(&self) -> RepulsionStrategy {
        self.strategy
    }

    pub fn report(&self) -> PerformanceReport {
        let window = self.controller.window();
        let tuning = self.controller.tuning();
        let fallback_reason = match &self.status {
            IndexStatus::Active => None,
            IndexStatus::Inactive { reason } | IndexStatus::Disabled { reason } => Some(reason.clone()),
            IndexStatus::Degraded { .. } => self.last_error.clone(),
        };

        PerformanceReport {
            tick: self.tick,
            current_fps: window.current_fps(),
            average_fps: window.average_fps(),
            min_fps: window.min_fps(),
            max_fps: window.max_fps(),
            node_count: self.state.node_count(),
            edge_count: self.state.edge_count(),
            band: self.controller.band(),
            history: self.controller.history().cloned().collect(),
            max_neighbors: tuning.max_neighbors(),
            update_interval: tuning.update_interval(),
            movement_threshold: tuning.movement_threshold(),
            tuning_version: tuning.version(),
            index_status: self.status.clone(),
            strategy: self.strategy,
            fallback_reason,
            alpha: self.alpha,
        }
    }
}

/// Why indexing does not apply to this graph, if it doesn't.
fn inactive_reason(config: &SimulationConfig, node_count: usize) -> Option<String> {
    if !config.use_spatial_index {
        Some("spatial index disabled by configuration".to_string())
    } else if node_count < config.index_activation_threshold {
        Some(format!(
            "{node_count} nodes is below the activation threshold of {}",
            config.index_activation_threshold
        ))
    } else {
        None
    }
}

fn select_repulsion<'a>(
    index: &'a dyn NeighborIndex,
    status: &IndexStatus,
    config: &SimulationConfig,
    node_count: usize,
    tick: u64,
) -> Repulsion<'a> {
    if status.serves_neighbors() {
        if let Some(buffer) = index.neighbors().filter(|b| b.node_count() == node_count) {
            return Repulsion::Indexed(buffer);
        }
    }

    match RepulsionStrategy::unindexed(node_count, config) {
        RepulsionStrategy::Sampled { stride } => Repulsion::Sampled {
            stride,
            offset: (tick % stride as u64) as usize,
        },
        _ => Repulsion::BruteForce,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ops::Range;

    const FRAME: Duration = Duration::from_millis(16);

    /// Fails the calls whose ordinal falls in `failing`.
    struct FlakyIndex {
        inner: SpatialIndex,
        calls: usize,
        failing: Range<usize>,
    }

    impl FlakyIndex {
        fn new(failing: Range<usize>) -> Self {
            Self {
                inner: SpatialIndex::new(),
                calls: 0,
                failing,
            }
        }

        fn next_call_fails(&mut self) -> bool {
            let fails = self.failing.contains(&self.calls);
            self.calls += 1;
            fails
        }
    }

    impl NeighborIndex for FlakyIndex {
        fn build(&mut self, positions: &[[f32; 3]], params: &IndexParams) -> Result<IndexPass, IndexError> {
            if self.next_call_fails() {
                return Err(IndexError::Unavailable("flaky backend".into()));
            }
            self.inner.build(positions, params)
        }

        fn patch(
            &mut self,
            positions: &[[f32; 3]],
            moved: &[u32],
            params: &IndexParams,
        ) -> Result<IndexPass, IndexError> {
            if self.next_call_fails() {
                return Err(IndexError::Unavailable("flaky backend".into()));
            }
            self.inner.patch(positions, moved, params)
        }

        fn neighbors(&self) -> Option<&NeighborBuffer> {
            self.inner.neighbors()
        }

        fn clear(&mut self) {
            self.inner.clear();
        }
    }

    fn ring(count: usize) -> GraphState {
        let mut positions = Vec::with_capacity(count * 3);
        let mut pairs = Vec::with_capacity(count * 2);
        for i in 0..count {
            let angle = i as f32 / count as f32 * std::f32::consts::TAU;
            positions.extend([angle.cos() * 10.0, angle.sin() * 10.0, 0.0]);
            pairs.extend([i as u32, ((i + 1) % count) as u32]);
        }
        GraphState::from_positions(&positions, &pairs).unwrap()
    }

    fn indexed_config() -> SimulationConfig {
        SimulationConfig {
            index_activation_threshold: 0,
            update_interval: 1,
            auto_tune: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_small_graph_stays_unindexed() {
        let mut sim = SimulationLoop::new(ring(20), SimulationConfig::default()).unwrap();
        for _ in 0..20 {
            let outcome = sim.tick(FRAME);
            assert_eq!(outcome.strategy, RepulsionStrategy::BruteForce);
        }
        assert!(matches!(sim.index_status(), IndexStatus::Inactive { .. }));
        assert!(sim.neighbors().is_none());
        assert!(sim.report().fallback_reason.is_some());
    }

    #[test]
    fn test_index_passes_follow_update_interval() {
        let config = SimulationConfig {
            update_interval: 4,
            ..indexed_config()
        };
        let mut sim = SimulationLoop::new(ring(20), config).unwrap();

        let scheduled: Vec<u64> = (0..12)
            .map(|_| sim.tick(FRAME))
            .filter(|outcome| outcome.index.is_some())
            .map(|outcome| outcome.tick)
            .collect();
        assert_eq!(scheduled, vec![4, 8, 12]);
    }

    #[test]
    fn test_first_pass_builds_and_indexes() {
        let mut sim = SimulationLoop::new(ring(20), indexed_config()).unwrap();
        let outcome = sim.tick(FRAME);

        assert!(matches!(
            outcome.index,
            Some(IndexOutcome::Updated(IndexPass::Full { indexed: 20 }))
        ));
        assert_eq!(outcome.strategy, RepulsionStrategy::Indexed);
        assert_eq!(sim.index_status(), &IndexStatus::Active);
    }

    #[test]
    fn test_degraded_keeps_buffer_then_recovers() {
        let mut sim = SimulationLoop::new(ring(20), indexed_config())
            .unwrap()
            .with_index(FlakyIndex::new(1..2));

        sim.tick(FRAME);
        assert_eq!(sim.index_status(), &IndexStatus::Active);

        sim.set_position(0, [50.0, 0.0, 0.0]);
        let outcome = sim.tick(FRAME);
        assert!(matches!(outcome.index, Some(IndexOutcome::Failed(_))));
        assert_eq!(
            sim.index_status(),
            &IndexStatus::Degraded {
                consecutive_failures: 1
            }
        );
        assert_eq!(outcome.strategy, RepulsionStrategy::Indexed);
        assert!(sim.report().fallback_reason.is_some());

        sim.set_position(0, [80.0, 0.0, 0.0]);
        let outcome = sim.tick(FRAME);
        assert!(matches!(outcome.index, Some(IndexOutcome::Updated(_))));
        assert_eq!(sim.index_status(), &IndexStatus::Active);
        assert_eq!(sim.report().fallback_reason, None);
    }

    #[test]
    fn test_alpha_decay_and_reheat() {
        let config = SimulationConfig {
            decay: 0.5,
            ..Default::default()
        };
        let mut sim = SimulationLoop::new(ring(5), config).unwrap();
        sim.tick(FRAME);
        sim.tick(FRAME);
        assert_eq!(sim.alpha(), 0.25);

        assert!(sim.reheat(1.0));
        assert_eq!(sim.alpha(), 1.0);
        assert!(!sim.reheat(f32::NAN));
        assert_eq!(sim.alpha(), 1.0);
    }

    #[test]
    fn test_cold_simulation_stops_moving() {
        let config = SimulationConfig {
            alpha: 0.0,
            ..Default::default()
        };
        let mut sim = SimulationLoop::new(ring(8), config).unwrap();
        let before = sim.positions().to_vec();
        sim.tick(FRAME);
        assert_eq!(sim.positions(), &before[..]);
    }

    #[test]
    fn test_set_config_validates_and_forces_rebuild() {
        let mut sim = SimulationLoop::new(ring(20), indexed_config()).unwrap();
        sim.tick(FRAME);

        let bad = SimulationConfig {
            target_fps: 0.0,
            ..indexed_config()
        };
        assert!(sim.set_config(bad).is_err());

        sim.set_config(indexed_config()).unwrap();
        let outcome = sim.tick(FRAME);
        assert!(matches!(
            outcome.index,
            Some(IndexOutcome::Updated(IndexPass::Full { .. }))
        ));
    }

    #[test]
    fn test_disabling_index_by_config() {
        let mut sim = SimulationLoop::new(ring(20), indexed_config()).unwrap();
        sim.tick(FRAME);
        assert!(sim.neighbors().is_some());

        sim.set_config(SimulationConfig {
            use_spatial_index: false,
            ..indexed_config()
        })
        .unwrap();
        let outcome = sim.tick(FRAME);
        assert_eq!(outcome.index, Some(IndexOutcome::Skipped));
        assert_eq!(outcome.strategy, RepulsionStrategy::BruteForce);
        assert!(sim.neighbors().is_none());
    }

    #[test]
    fn test_large_unindexed_graph_is_sampled() {
        let config = SimulationConfig {
            use_spatial_index: false,
            sampling_threshold: 10,
            max_repulsion_samples: 5,
            ..Default::default()
        };
        let mut sim = SimulationLoop::new(ring(20), config).unwrap();
        let outcome = sim.tick(FRAME);
        assert_eq!(outcome.strategy, RepulsionStrategy::Sampled { stride: 4 });
    }

    #[test]
    fn test_report_serializes() {
        let mut sim = SimulationLoop::new(ring(20), indexed_config()).unwrap();
        sim.tick(FRAME);

        let json = serde_json::to_value(sim.report()).unwrap();
        assert_eq!(json["tick"], 1);
        assert_eq!(json["nodeCount"], 20);
        assert_eq!(json["indexStatus"]["state"], "active");
        assert_eq!(json["strategy"]["kind"], "indexed");
        assert_eq!(json["maxNeighbors"], 32);
    }

    #[test]
    fn test_degraded_status_serializes_camel_case() {
        let status = IndexStatus::Degraded {
            consecutive_failures: 2,
        };
        let json = serde_json::to_string(&status).unwrap();
        assert_eq!(json, r#"{"state":"degraded","consecutiveFailures":2}"#);
    }

    #[test]
    fn test_step_measures_time() {
        let mut sim = SimulationLoop::new(ring(10), SimulationConfig::default()).unwrap();
        sim.step();
        assert_eq!(sim.controller().window().len(), 1);
        assert_eq!(sim.tick_count(), 1);
    }

    #[test]
    fn test_huge_frame_times_do_not_overflow() {
        let mut sim = SimulationLoop::new(ring(10), SimulationConfig::default()).unwrap();
        sim.tick(Duration::MAX);
        sim.tick(Duration::MAX);

        let report = sim.report();
        assert_eq!(report.tick, 2);
        assert!(report.average_fps > 0.0);
        assert!(report.average_fps.is_finite());
    }
}
