//! Bounded knobs rewritten by the performance controller.
//!
//! The controller never calls into the index or the kernel. It rewrites a
//! [`TuningSet`], whose version is bumped on every effective change, and the
//! simulation loop reads the current values at the start of each pass.

use serde::Serialize;

use crate::config::SimulationConfig;

/// A bounded, steppable value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TuningParameter {
    pub min: f64,
    pub max: f64,
    current: f64,
    /// Nominal adjustment size; scaled by the controller.
    pub step: f64,
    /// Whether values are rounded to whole numbers.
    pub integral: bool,
}

impl TuningParameter {
    /// `current` is clamped into `[min, max]`. Bounds given in the wrong
    /// order are swapped.
    pub fn new(min: f64, max: f64, current: f64, step: f64) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        let mut parameter = Self {
            min,
            max,
            current: min,
            step,
            integral: false,
        };
        parameter.set(current);
        parameter
    }

    pub fn integral(min: f64, max: f64, current: f64, step: f64) -> Self {
        let mut parameter = Self::new(min, max, current, step);
        parameter.integral = true;
        parameter.set(current);
        parameter
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    /// Set the value, clamped into bounds. Non-finite values are ignored.
    pub fn set(&mut self, value: f64) -> f64 {
        if value.is_finite() {
            let value = if self.integral { value.round() } else { value };
            self.current = value.clamp(self.min, self.max);
        }
        self.current
    }

    /// Move by `delta` and return the new value.
    pub fn adjust(&mut self, delta: f64) -> f64 {
        self.set(self.current + delta)
    }
}

/// The knobs the controller may turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Knob {
    MaxNeighbors,
    UpdateInterval,
    MovementThreshold,
}

impl Knob {
    pub fn name(self) -> &'static str {
        match self {
            Knob::MaxNeighbors => "maxNeighbors",
            Knob::UpdateInterval => "updateInterval",
            Knob::MovementThreshold => "movementThreshold",
        }
    }
}

/// One effective change to a knob.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterChange {
    pub knob: Knob,
    pub from: f64,
    pub to: f64,
}

/// The shared, versioned tuning state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TuningSet {
    pub max_neighbors: TuningParameter,
    pub update_interval: TuningParameter,
    pub movement_threshold: TuningParameter,
    version: u64,
}

impl TuningSet {
    pub fn from_config(config: &SimulationConfig) -> Self {
        Self {
            max_neighbors: TuningParameter::integral(
                config.max_neighbors_min as f64,
                config.max_neighbors_max as f64,
                config.max_neighbors as f64,
                4.0,
            ),
            update_interval: TuningParameter::integral(
                config.update_interval_min as f64,
                config.update_interval_max as f64,
                config.update_interval as f64,
                1.0,
            ),
            movement_threshold: TuningParameter::new(
                config.movement_threshold_min,
                config.movement_threshold_max,
                config.movement_threshold,
                0.05,
            ),
            version: 0,
        }
    }

    pub fn get(&self, knob: Knob) -> &TuningParameter {
        match knob {
            Knob::MaxNeighbors => &self.max_neighbors,
            Knob::UpdateInterval => &self.update_interval,
            Knob::MovementThreshold => &self.movement_threshold,
        }
    }

    fn get_mut(&mut self, knob: Knob) -> &mut TuningParameter {
        match knob {
            Knob::MaxNeighbors => &mut self.max_neighbors,
            Knob::UpdateInterval => &mut self.update_interval,
            Knob::MovementThreshold => &mut self.movement_threshold,
        }
    }

    /// Move `knob` by `delta`, clamped. Returns the change if the value
    /// actually moved.
    pub fn adjust(&mut self, knob: Knob, delta: f64) -> Option<ParameterChange> {
        let parameter = self.get_mut(knob);
        let from = parameter.current();
        let to = parameter.adjust(delta);
        if to == from {
            return None;
        }
        self.version += 1;
        Some(ParameterChange { knob, from, to })
    }

    /// Bumped on every effective change.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn max_neighbors(&self) -> usize {
        self.max_neighbors.current() as usize
    }

    pub fn update_interval(&self) -> usize {
        (self.update_interval.current() as usize).max(1)
    }

    pub fn movement_threshold(&self) -> f64 {
        self.movement_threshold.current()
    }
}
