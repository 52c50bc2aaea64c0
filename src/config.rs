//! Simulation configuration surface.
//!
//! Every option has a default, so hosts may pass any subset as a JSON or JS
//! object. Field names are camelCase on the wire.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Number of spatial axes the integrator moves nodes along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Dimensions {
    /// Planar layout: the z axis is zeroed after every integration step.
    #[serde(rename = "2d")]
    Two,
    #[default]
    #[serde(rename = "3d")]
    Three,
}

/// Options recognized by the simulation core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SimulationConfig {
    // -- forces and integration ------------------------------------------
    /// Charge strength; negative values push nodes apart.
    pub repulsion: f32,
    /// Rest length of every link.
    pub spring_length: f32,
    /// Link spring strength.
    pub stiffness: f32,
    /// Pull toward the origin.
    pub gravity: f32,
    /// Velocity multiplier applied every tick.
    pub damping: f32,
    /// Per-axis velocity clamp.
    pub max_speed: f32,
    pub time_step: f32,
    /// Multiplier applied to `alpha` after every tick.
    pub decay: f32,
    /// Initial cooling factor.
    pub alpha: f32,
    pub dimensions: Dimensions,

    // -- tuning knobs (initial value and bounds) -------------------------
    pub max_neighbors: usize,
    pub max_neighbors_min: usize,
    pub max_neighbors_max: usize,
    /// Ticks between index passes.
    pub update_interval: usize,
    pub update_interval_min: usize,
    pub update_interval_max: usize,
    /// Displacement a node must exceed to count as moved.
    pub movement_threshold: f64,
    pub movement_threshold_min: f64,
    pub movement_threshold_max: f64,

    // -- spatial index ---------------------------------------------------
    pub use_spatial_index: bool,
    /// Graphs with fewer nodes use brute-force repulsion and never build an index.
    pub index_activation_threshold: usize,
    pub use_multi_resolution: bool,
    pub grid_resolution: u32,
    pub fine_grid_resolution: u32,
    pub coarse_grid_resolution: u32,
    /// Standard-cell occupancy at or above which a node is routed to the fine grid.
    pub dense_threshold: usize,
    /// Standard-cell occupancy at or below which a node is routed to the coarse grid.
    pub sparse_threshold: usize,
    /// Consecutive failed index passes before indexing is disabled for the session.
    pub max_index_failures: u32,

    // -- fallback ladder -------------------------------------------------
    /// Above this node count an unindexed simulation samples repulsion.
    pub sampling_threshold: usize,
    pub max_repulsion_samples: usize,

    // -- performance controller ------------------------------------------
    #[serde(rename = "targetFPS", alias = "targetFps")]
    pub target_fps: f64,
    pub auto_tune: bool,
    pub tune_interval: u64,
    pub sample_window: usize,

    /// Nodes per work item when the kernel runs in parallel.
    pub parallel_chunk_size: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            repulsion: -0.3,
            spring_length: 2.0,
            stiffness: 0.1,
            gravity: 0.1,
            damping: 0.7,
            max_speed: 10.0,
            time_step: 1.0,
            decay: 1.0,
            alpha: 1.0,
            dimensions: Dimensions::Three,

            max_neighbors: 32,
            max_neighbors_min: 8,
            max_neighbors_max: 128,
            update_interval: 10,
            update_interval_min: 1,
            update_interval_max: 30,
            movement_threshold: 0.1,
            movement_threshold_min: 0.01,
            movement_threshold_max: 1.0,

            use_spatial_index: true,
            index_activation_threshold: 1000,
            use_multi_resolution: true,
            grid_resolution: 32,
            fine_grid_resolution: 64,
            coarse_grid_resolution: 16,
            dense_threshold: 16,
            sparse_threshold: 2,
            max_index_failures: 3,

            sampling_threshold: 5000,
            max_repulsion_samples: 1024,

            target_fps: 30.0,
            auto_tune: true,
            tune_interval: 120,
            sample_window: 60,

            parallel_chunk_size: 1024,
        }
    }
}

impl SimulationConfig {
    /// Check every option for values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let floats = [
            ("repulsion", self.repulsion as f64),
            ("springLength", self.spring_length as f64),
            ("stiffness", self.stiffness as f64),
            ("gravity", self.gravity as f64),
            ("damping", self.damping as f64),
            ("maxSpeed", self.max_speed as f64),
            ("timeStep", self.time_step as f64),
            ("decay", self.decay as f64),
            ("alpha", self.alpha as f64),
            ("movementThreshold", self.movement_threshold),
            ("movementThresholdMin", self.movement_threshold_min),
            ("movementThresholdMax", self.movement_threshold_max),
            ("targetFPS", self.target_fps),
        ];
        for (name, value) in floats {
            if !value.is_finite() {
                return Err(ConfigError::NonFinite { name, value });
            }
        }

        if self.max_speed < 0.0 {
            return Err(out_of_range("maxSpeed", "must not be negative"));
        }
        if self.target_fps <= 0.0 {
            return Err(out_of_range("targetFPS", "must be positive"));
        }

        let resolutions = [
            ("gridResolution", self.grid_resolution),
            ("fineGridResolution", self.fine_grid_resolution),
            ("coarseGridResolution", self.coarse_grid_resolution),
        ];
        for (name, value) in resolutions {
            if value == 0 {
                return Err(out_of_range(name, "must be at least 1"));
            }
        }

        let counts = [
            ("maxNeighborsMin", self.max_neighbors_min),
            ("updateIntervalMin", self.update_interval_min),
            ("sampleWindow", self.sample_window),
            ("maxRepulsionSamples", self.max_repulsion_samples),
            ("parallelChunkSize", self.parallel_chunk_size),
        ];
        for (name, value) in counts {
            if value == 0 {
                return Err(out_of_range(name, "must be at least 1"));
            }
        }
        if self.tune_interval == 0 {
            return Err(out_of_range("tuneInterval", "must be at least 1"));
        }
        if self.max_index_failures == 0 {
            return Err(out_of_range("maxIndexFailures", "must be at least 1"));
        }

        check_bounds(
            "maxNeighbors",
            self.max_neighbors_min as f64,
            self.max_neighbors_max as f64,
        )?;
        check_bounds(
            "updateInterval",
            self.update_interval_min as f64,
            self.update_interval_max as f64,
        )?;
        check_bounds(
            "movementThreshold",
            self.movement_threshold_min,
            self.movement_threshold_max,
        )?;
        if self.movement_threshold_min < 0.0 {
            return Err(out_of_range("movementThresholdMin", "must not be negative"));
        }

        Ok(())
    }
}

fn out_of_range(name: &'static str, reason: &str) -> ConfigError {
    ConfigError::OutOfRange {
        name,
        reason: reason.to_string(),
    }
}

fn check_bounds(name: &'static str, min: f64, max: f64) -> Result<(), ConfigError> {
    if min > max {
        Err(ConfigError::InvertedBounds { name, min, max })
    } else {
        Ok(())
    }
}
