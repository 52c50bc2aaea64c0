//! Frame-budget controller.
//!
//! Every `tune_interval` ticks, once the sample window is full, the average
//! frame rate is classified against the target:
//!
//! | band       | fps / target |
//! |------------|--------------|
//! | `critical` | < 0.50       |
//! | `warning`  | < 0.75       |
//! | `optimal`  | > 1.10       |
//! | `good`     | otherwise    |
//!
//! Slow bands shed index work (fewer neighbors, rarer passes; `critical`
//! also raises the movement threshold). `optimal` gives quality back, but
//! only when the three evaluations before it were `good` or `optimal`.

use std::collections::VecDeque;
use std::time::Duration;

use serde::Serialize;
use tracing::info;

use super::samples::SampleWindow;
use super::tuning::{Knob, ParameterChange, TuningSet};
use crate::config::SimulationConfig;

/// Tuning records kept for diagnostics.
pub const HISTORY_LIMIT: usize = 32;

/// Evaluations that must precede an `optimal` one before quality is raised.
const HYSTERESIS: usize = 3;

/// Upper bound on the deviation-scaled step multiplier.
const MAX_STEP_SCALE: f64 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceBand {
    Critical,
    Warning,
    Good,
    Optimal,
}

impl PerformanceBand {
    pub fn classify(fps: f64, target_fps: f64) -> Self {
        let ratio = fps / target_fps;
        if ratio < 0.5 {
            PerformanceBand::Critical
        } else if ratio < 0.75 {
            PerformanceBand::Warning
        } else if ratio > 1.1 {
            PerformanceBand::Optimal
        } else {
            PerformanceBand::Good
        }
    }

    pub fn is_healthy(self) -> bool {
        matches!(self, PerformanceBand::Good | PerformanceBand::Optimal)
    }
}

/// One evaluation, with whatever it changed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TuningRecord {
    pub tick: u64,
    pub fps: f64,
    pub band: PerformanceBand,
    pub node_count: usize,
    pub edge_count: usize,
    pub changes: Vec<ParameterChange>,
}

pub struct PerformanceController {
    window: SampleWindow,
    tuning: TuningSet,
    target_fps: f64,
    tune_interval: u64,
    auto_tune: bool,
    ticks: u64,
    history: VecDeque<TuningRecord>,
}

impl PerformanceController {
    pub fn new(config: &SimulationConfig) -> Self {
        Self {
            window: SampleWindow::new(config.sample_window),
            tuning: TuningSet::from_config(config),
            target_fps: config.target_fps,
            tune_interval: config.tune_interval.max(1),
            auto_tune: config.auto_tune,
            ticks: 0,
            history: VecDeque::with_capacity(HISTORY_LIMIT),
        }
    }

    /// Feed one tick. Returns the evaluation if this tick triggered one.
    pub fn record(&mut self, duration: Duration, node_count: usize, edge_count: usize) -> Option<TuningRecord> {
        self.ticks += 1;
        self.window.push(duration);

        if !self.auto_tune || self.ticks % self.tune_interval != 0 || !self.window.is_full() {
            return None;
        }
        Some(self.evaluate(node_count, edge_count))
    }

    fn evaluate(&mut self, node_count: usize, edge_count: usize) -> TuningRecord {
        let fps = self.window.average_fps();
        let band = PerformanceBand::classify(fps, self.target_fps);
        let scale = self.step_scale(fps);

        let mut changes = Vec::new();
        match band {
            PerformanceBand::Critical | PerformanceBand::Warning => {
                changes.extend(self.nudge(Knob::MaxNeighbors, -scale));
                changes.extend(self.nudge(Knob::UpdateInterval, scale));
                if band == PerformanceBand::Critical {
                    changes.extend(self.nudge(Knob::MovementThreshold, scale));
                }
            }
            PerformanceBand::Optimal if self.settled() => {
                changes.extend(self.nudge(Knob::MaxNeighbors, scale));
                changes.extend(self.nudge(Knob::UpdateInterval, -scale));
            }
            PerformanceBand::Optimal | PerformanceBand::Good => {}
        }

        let record = TuningRecord {
            tick: self.ticks,
            fps,
            band,
            node_count,
            edge_count,
            changes,
        };
        for change in &record.changes {
            info!(
                tick = record.tick,
                fps = record.fps,
                band = ?record.band,
                knob = change.knob.name(),
                from = change.from,
                to = change.to,
                "performance tuning applied"
            );
        }

        if self.history.len() == HISTORY_LIMIT {
            self.history.pop_front();
        }
        self.history.push_back(record.clone());
        record
    }

    /// Step multiplier in `[1, MAX_STEP_SCALE]`, growing with the relative
    /// distance from the target.
    fn step_scale(&self, fps: f64) -> f64 {
        let deviation = ((fps - self.target_fps).abs() / self.target_fps).min(1.0);
        1.0 + deviation * (MAX_STEP_SCALE - 1.0)
    }

    /// The last `HYSTERESIS` evaluations were all healthy.
    fn settled(&self) -> bool {
        self.history.len() >= HYSTERESIS
            && self
                .history
                .iter()
                .rev()
                .take(HYSTERESIS)
                .all(|record| record.band.is_healthy())
    }

    fn nudge(&mut self, knob: Knob, steps: f64) -> Option<ParameterChange> {
        let delta = self.tuning.get(knob).step * steps;
        self.tuning.adjust(knob, delta)
    }

    /// Move a knob by `delta`, clamped into its bounds.
    pub fn adjust_parameter(&mut self, knob: Knob, delta: f64) -> f64 {
        self.tuning.adjust(knob, delta);
        self.tuning.get(knob).current()
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn tuning(&self) -> &TuningSet {
        &self.tuning
    }

    pub fn window(&self) -> &SampleWindow {
        &self.window
    }

    /// Band of the current window, or None before any sample arrived.
    pub fn band(&self) -> Option<PerformanceBand> {
        (!self.window.is_empty()).then(|| PerformanceBand::classify(self.window.average_fps(), self.target_fps))
    }

    pub fn history(&self) -> impl Iterator<Item = &TuningRecord> {
        self.history.iter()
    }
}
