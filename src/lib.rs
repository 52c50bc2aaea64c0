//! Force Graph - WASM Module
//!
//! Force-directed layout core for large graphs. Repulsion cost is bounded by
//! a multi-resolution spatial index that hands each node a capped,
//! distance-sorted neighbor list, and a performance controller trades
//! neighbor count against index frequency to hold a frame-rate target.
//!
//! # Architecture
//!
//! - `graph`: dataset loading, petgraph topology, and per-node SoA buffers
//! - `spatial`: hash grids, neighbor buffer, R-tree, movement tracking
//! - `layout`: force kernel and the repulsion fallback ladder
//! - `perf`: frame-time window, tuning knobs, and the controller
//! - `simulation`: the per-tick state machine tying them together
//!
//! The crate builds natively (`rlib`) and for WebAssembly (`cdylib`), where
//! [`ForceGraphWasm`] is the JavaScript-facing API.

use std::time::Duration;

use js_sys::{Float32Array, Int32Array};
use wasm_bindgen::prelude::*;

pub mod config;
pub mod error;
pub mod graph;
pub mod layout;
pub mod perf;
pub mod simulation;
pub mod spatial;

pub use config::{Dimensions, SimulationConfig};
pub use error::{ConfigError, DatasetError, IndexError, SimulationError, SimulationResult};
pub use simulation::{IndexOutcome, IndexStatus, PerformanceReport, SimulationLoop, TickOutcome};

use graph::{Dataset, GraphState};

/// Initialize the WASM module.
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
}

/// Main entry point for JavaScript hosts.
///
/// Wraps a [`SimulationLoop`] and exposes its buffers as typed-array views.
#[wasm_bindgen]
pub struct ForceGraphWasm {
    sim: SimulationLoop,
}

#[wasm_bindgen]
impl ForceGraphWasm {
    /// Create a simulation from a `{ nodes, links }` dataset object and an
    /// optional partial config object.
    #[wasm_bindgen(constructor)]
    pub fn new(dataset: JsValue, config: JsValue) -> Result<ForceGraphWasm, JsError> {
        let dataset: Dataset = serde_wasm_bindgen::from_value(dataset)?;
        let sim = SimulationLoop::from_dataset(&dataset, parse_config(config)?)?;
        Ok(Self { sim })
    }

    /// Create a simulation from flat buffers.
    ///
    /// `positions` is `[x0, y0, z0, x1, ...]`, `edges` is
    /// `[source0, target0, source1, ...]`.
    #[wasm_bindgen(js_name = fromPositions)]
    pub fn from_positions(
        positions: &[f32],
        edges: &[u32],
        config: JsValue,
    ) -> Result<ForceGraphWasm, JsError> {
        let state = GraphState::from_positions(positions, edges)?;
        let sim = SimulationLoop::new(state, parse_config(config)?)?;
        Ok(Self { sim })
    }

    // =========================================================================
    // Simulation
    // =========================================================================

    /// Advance one tick. `elapsed_ms` is the host's frame time.
    pub fn tick(&mut self, elapsed_ms: f64) {
        let elapsed = Duration::try_from_secs_f64(elapsed_ms / 1000.0).unwrap_or(Duration::ZERO);
        self.sim.tick(elapsed);
    }

    /// Restart motion after the simulation has cooled.
    pub fn reheat(&mut self, alpha: f32) -> bool {
        self.sim.reheat(alpha)
    }

    /// Replace the configuration with a new (partial) config object.
    #[wasm_bindgen(js_name = setConfig)]
    pub fn set_config(&mut self, config: JsValue) -> Result<(), JsError> {
        self.sim.set_config(parse_config(config)?)?;
        Ok(())
    }

    /// Pin or release a node. Returns false for an unknown index.
    #[wasm_bindgen(js_name = setStatic)]
    pub fn set_static(&mut self, index: u32, is_static: bool) -> bool {
        self.sim.set_static(index as usize, is_static)
    }

    /// Move a node directly, e.g. while it is dragged.
    #[wasm_bindgen(js_name = setPosition)]
    pub fn set_position(&mut self, index: u32, x: f32, y: f32, z: f32) -> bool {
        self.sim.set_position(index as usize, [x, y, z])
    }

    // =========================================================================
    // Buffer Access (Zero-Copy)
    // =========================================================================

    /// Zero-copy view of positions `[x0, y0, z0, x1, ...]`.
    ///
    /// # Safety
    ///
    /// The returned view is invalidated if any Rust allocation occurs.
    /// Use immediately for GPU upload, do not store.
    #[wasm_bindgen(js_name = getPositionsView)]
    pub fn get_positions_view(&self) -> Float32Array {
        unsafe { Float32Array::view(self.sim.positions().as_flattened()) }
    }

    /// Zero-copy view of velocities, laid out like positions.
    #[wasm_bindgen(js_name = getVelocitiesView)]
    pub fn get_velocities_view(&self) -> Float32Array {
        unsafe { Float32Array::view(self.sim.velocities().as_flattened()) }
    }

    /// Zero-copy view of neighbor indices, `maxNeighbors` slots per node.
    /// Unused slots hold -1. Empty while no index is built.
    #[wasm_bindgen(js_name = getNeighborIndicesView)]
    pub fn get_neighbor_indices_view(&self) -> Int32Array {
        match self.sim.neighbors() {
            Some(buffer) => unsafe { Int32Array::view(buffer.indices()) },
            None => Int32Array::new_with_length(0),
        }
    }

    /// Zero-copy view of neighbor distances. Unused slots hold `Infinity`.
    #[wasm_bindgen(js_name = getNeighborDistancesView)]
    pub fn get_neighbor_distances_view(&self) -> Float32Array {
        match self.sim.neighbors() {
            Some(buffer) => unsafe { Float32Array::view(buffer.distances()) },
            None => Float32Array::new_with_length(0),
        }
    }

    /// Slots per node in the neighbor views, or 0 while no index is built.
    #[wasm_bindgen(js_name = neighborStride)]
    pub fn neighbor_stride(&self) -> usize {
        self.sim.neighbors().map_or(0, |buffer| buffer.max_neighbors())
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    /// Performance report as a plain object.
    pub fn report(&self) -> Result<JsValue, JsError> {
        Ok(serde_wasm_bindgen::to_value(&self.sim.report())?)
    }

    #[wasm_bindgen(js_name = nodeCount)]
    pub fn node_count(&self) -> usize {
        self.sim.state().node_count()
    }

    #[wasm_bindgen(js_name = edgeCount)]
    pub fn edge_count(&self) -> usize {
        self.sim.state().edge_count()
    }

    #[wasm_bindgen(js_name = tickCount)]
    pub fn tick_count(&self) -> f64 {
        self.sim.tick_count() as f64
    }

    pub fn alpha(&self) -> f32 {
        self.sim.alpha()
    }
}

/// `undefined` or `null` selects the defaults.
fn parse_config(config: JsValue) -> Result<SimulationConfig, JsError> {
    if config.is_undefined() || config.is_null() {
        return Ok(SimulationConfig::default());
    }
    Ok(serde_wasm_bindgen::from_value(config)?)
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::graph::{LinkInput, NodeInput};
    use crate::layout::RepulsionStrategy;
    use crate::spatial::{IndexParams, IndexPass, NeighborBuffer, NeighborIndex, NeighborRecord};

    const FRAME: Duration = Duration::from_millis(16);

    fn distance(a: [f32; 3], b: [f32; 3]) -> f32 {
        ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)).sqrt()
    }

    /// Deterministic point cloud in a 40-unit cube.
    fn cloud(count: usize, seed: u64) -> Vec<f32> {
        let mut state = seed;
        (0..count * 3)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                ((state >> 33) as f32 / (1u64 << 31) as f32) * 40.0 - 20.0
            })
            .collect()
    }

    /// Backend that never produces neighbors.
    struct UnavailableIndex;

    impl NeighborIndex for UnavailableIndex {
        fn build(&mut self, _: &[[f32; 3]], _: &IndexParams) -> Result<IndexPass, IndexError> {
            Err(IndexError::Unavailable("no acceleration support".into()))
        }

        fn patch(&mut self, _: &[[f32; 3]], _: &[u32], _: &IndexParams) -> Result<IndexPass, IndexError> {
            Err(IndexError::Unavailable("no acceleration support".into()))
        }

        fn neighbors(&self) -> Option<&NeighborBuffer> {
            None
        }

        fn clear(&mut self) {}
    }

    #[test]
    fn test_nearest_neighbor_through_loop() {
        let state = GraphState::from_positions(&[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 10.0, 0.0, 0.0], &[]).unwrap();
        let config = SimulationConfig {
            index_activation_threshold: 0,
            update_interval: 1,
            max_neighbors: 1,
            max_neighbors_min: 1,
            use_multi_resolution: false,
            grid_resolution: 4,
            auto_tune: false,
            ..Default::default()
        };
        let mut sim = SimulationLoop::new(state, config).unwrap();
        sim.tick(FRAME);

        let neighbors: Vec<_> = sim.neighbors().unwrap().neighbors(0).collect();
        assert_eq!(neighbors, vec![NeighborRecord { index: 1, distance: 1.0 }]);
    }

    #[test]
    fn test_stretched_link_pulls_endpoints_together() {
        let state = GraphState::from_positions(&[0.0, 0.0, 0.0, 5.0, 0.0, 0.0], &[0, 1]).unwrap();
        let config = SimulationConfig {
            spring_length: 2.0,
            stiffness: 1.0,
            repulsion: 0.0,
            gravity: 0.0,
            ..Default::default()
        };
        let mut sim = SimulationLoop::new(state, config).unwrap();

        let before = distance(sim.positions()[0], sim.positions()[1]);
        sim.tick(FRAME);
        let after = distance(sim.positions()[0], sim.positions()[1]);
        assert!(after < before);
    }

    #[test]
    fn test_slow_frames_shed_index_work() {
        let state = GraphState::from_positions(&cloud(50, 7), &[]).unwrap();
        let config = SimulationConfig::default();
        let mut sim = SimulationLoop::new(state, config.clone()).unwrap();

        // About half the 30 fps target.
        let mut tuned = Vec::new();
        for _ in 0..config.tune_interval {
            tuned.extend(sim.tick(Duration::from_millis(66)).tuning);
        }
        assert_eq!(tuned.len(), 1);

        let report = sim.report();
        assert!(report.max_neighbors < config.max_neighbors);
        assert!(report.max_neighbors >= config.max_neighbors_min);
        assert!(report.update_interval > config.update_interval);
        assert!(report.update_interval <= config.update_interval_max);
        assert_eq!(report.history.len(), 1);
        assert!(report.tuning_version > 0);
    }

    #[test]
    fn test_repeated_index_failures_disable_indexing() {
        let state = GraphState::from_positions(&cloud(30, 11), &[]).unwrap();
        let config = SimulationConfig {
            index_activation_threshold: 0,
            update_interval: 1,
            max_index_failures: 3,
            auto_tune: false,
            ..Default::default()
        };
        let mut sim = SimulationLoop::new(state, config)
            .unwrap()
            .with_index(UnavailableIndex);

        for failures in 1..=2 {
            let outcome = sim.tick(FRAME);
            assert!(matches!(outcome.index, Some(IndexOutcome::Failed(_))));
            assert_eq!(
                sim.index_status(),
                &IndexStatus::Degraded {
                    consecutive_failures: failures
                }
            );
        }

        sim.tick(FRAME);
        assert!(sim.index_status().is_disabled());

        for _ in 0..10 {
            let outcome = sim.tick(FRAME);
            assert_eq!(outcome.index, Some(IndexOutcome::Skipped));
            assert_eq!(outcome.strategy, RepulsionStrategy::BruteForce);
        }

        let report = sim.report();
        assert!(matches!(report.index_status, IndexStatus::Disabled { .. }));
        assert_eq!(report.strategy, RepulsionStrategy::BruteForce);
        assert!(report.fallback_reason.unwrap().contains("no acceleration support"));
        assert!(sim.positions().iter().flatten().all(|c| c.is_finite()));
    }

    #[test]
    fn test_out_of_range_links_exert_no_force() {
        let positions = [0.0, 0.0, 0.0, 4.0, 0.0, 0.0, 0.0, 4.0, 0.0];
        let with_bad_links = GraphState::from_positions(&positions, &[0, 3, 2, 99]).unwrap();
        let without_links = GraphState::from_positions(&positions, &[]).unwrap();
        assert_eq!(with_bad_links.edge_count(), 0);

        let mut a = SimulationLoop::new(with_bad_links, SimulationConfig::default()).unwrap();
        let mut b = SimulationLoop::new(without_links, SimulationConfig::default()).unwrap();
        for _ in 0..5 {
            a.tick(FRAME);
            b.tick(FRAME);
        }
        assert_eq!(a.positions(), b.positions());
    }

    #[test]
    fn test_neighbor_lists_stay_capped_while_simulating() {
        let state = GraphState::from_positions(&cloud(400, 3), &[]).unwrap();
        let config = SimulationConfig {
            index_activation_threshold: 0,
            update_interval: 1,
            max_neighbors: 8,
            grid_resolution: 8,
            fine_grid_resolution: 16,
            coarse_grid_resolution: 4,
            auto_tune: false,
            ..Default::default()
        };
        let mut sim = SimulationLoop::new(state, config).unwrap();

        for _ in 0..6 {
            sim.tick(FRAME);
            let buffer = sim.neighbors().unwrap();
            assert_eq!(buffer.max_neighbors(), 8);
            for node in 0..400 {
                let list: Vec<_> = buffer.neighbors(node).collect();
                assert!(list.len() <= 8);
                assert!(list.iter().all(|r| r.index as usize != node));
                assert!(list.windows(2).all(|w| w[0].distance <= w[1].distance));
            }
        }
    }

    #[test]
    fn test_pinned_nodes_hold_position() {
        let json = r#"{
            "nodes": [
                { "id": "hub", "x": 1.0, "y": 2.0, "z": 3.0, "isStatic": true },
                { "id": "a" },
                { "id": "b" },
                { "id": 7, "x": -4.0, "y": 0.0, "z": 0.0 }
            ],
            "links": [
                { "source": "hub", "target": "a" },
                { "source": "hub", "target": "b" },
                { "source": 7, "target": "hub" }
            ]
        }"#;
        let dataset: Dataset = serde_json::from_str(json).unwrap();
        let config = SimulationConfig {
            repulsion: -5.0,
            gravity: 1.0,
            ..Default::default()
        };
        let mut sim = SimulationLoop::from_dataset(&dataset, config).unwrap();
        assert_eq!(sim.state().edge_count(), 3);

        for _ in 0..200 {
            sim.tick(FRAME);
            assert_eq!(sim.positions()[0], [1.0, 2.0, 3.0]);
        }
    }

    #[test]
    fn test_pinning_at_runtime() {
        let dataset = Dataset {
            nodes: vec![NodeInput::new(1i64), NodeInput::new(2i64), NodeInput::new(3i64)],
            links: vec![LinkInput::new(1i64, 2i64), LinkInput::new(2i64, 3i64)],
        };
        let mut sim = SimulationLoop::from_dataset(&dataset, SimulationConfig::default()).unwrap();
        sim.tick(FRAME);

        assert!(sim.set_static(1, true));
        assert!(sim.set_position(1, [0.0, 0.0, 0.0]));
        for _ in 0..50 {
            sim.tick(FRAME);
        }
        assert_eq!(sim.positions()[1], [0.0, 0.0, 0.0]);
        assert_eq!(sim.velocities()[1], [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_two_dimensional_layout_stays_planar() {
        let dataset = Dataset {
            nodes: (0..12i64).map(NodeInput::new).collect(),
            links: (0..11i64).map(|i| LinkInput::new(i, i + 1)).collect(),
        };
        let config = SimulationConfig {
            dimensions: Dimensions::Two,
            ..Default::default()
        };
        let mut sim = SimulationLoop::from_dataset(&dataset, config).unwrap();
        for _ in 0..30 {
            sim.tick(FRAME);
        }
        assert!(sim.positions().iter().all(|p| p[2] == 0.0));
    }

    #[test]
    fn test_empty_dataset_is_rejected() {
        let result = SimulationLoop::from_dataset(&Dataset::default(), SimulationConfig::default());
        assert!(matches!(
            result,
            Err(SimulationError::Dataset(DatasetError::Empty))
        ));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let state = GraphState::from_positions(&[0.0; 3], &[]).unwrap();
        let config = SimulationConfig {
            max_neighbors_min: 64,
            max_neighbors_max: 16,
            ..Default::default()
        };
        assert!(matches!(
            SimulationLoop::new(state, config),
            Err(SimulationError::Config(ConfigError::InvertedBounds { .. }))
        ));
    }
}
