//! Rolling window of tick durations.

use std::time::Duration;

/// Durations shorter than this are measured as this long, so a window of
/// near-instant ticks still reports a finite frame rate.
const MIN_FRAME_SECONDS: f64 = 1e-6;

/// Longest sample kept; longer ticks are recorded at this length.
pub const MAX_SAMPLE: Duration = Duration::from_secs(60);

pub struct SampleWindow {
    samples: Vec<Duration>,
    capacity: usize,
    index: usize,
}

impl SampleWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: Vec::with_capacity(capacity),
            capacity,
            index: 0,
        }
    }

    pub fn push(&mut self, sample: Duration) {
        let sample = sample.min(MAX_SAMPLE);
        if self.samples.len() < self.capacity {
            self.samples.push(sample);
        } else {
            self.samples[self.index] = sample;
        }
        self.index = (self.index + 1) % self.capacity;
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Most recently pushed sample.
    pub fn latest(&self) -> Option<Duration> {
        if self.samples.is_empty() {
            return None;
        }
        let last = (self.index + self.capacity - 1) % self.capacity;
        self.samples.get(last).copied()
    }

    pub fn average(&self) -> Option<Duration> {
        if self.samples.is_empty() {
            return None;
        }
        let sum = self
            .samples
            .iter()
            .fold(Duration::ZERO, |sum, sample| sum.saturating_add(*sample));
        Some(sum / self.samples.len() as u32)
    }

    pub fn min_max(&self) -> Option<(Duration, Duration)> {
        let min = self.samples.iter().min()?;
        let max = self.samples.iter().max()?;
        Some((*min, *max))
    }

    // =========================================================================
    // Frame rates (0.0 for an empty window)
    // =========================================================================

    pub fn current_fps(&self) -> f64 {
        self.latest().map_or(0.0, fps)
    }

    pub fn average_fps(&self) -> f64 {
        self.average().map_or(0.0, fps)
    }

    /// Frame rate of the slowest tick in the window.
    pub fn min_fps(&self) -> f64 {
        self.min_max().map_or(0.0, |(_, slowest)| fps(slowest))
    }

    /// Frame rate of the fastest tick in the window.
    pub fn max_fps(&self) -> f64 {
        self.min_max().map_or(0.0, |(fastest, _)| fps(fastest))
    }
}

fn fps(duration: Duration) -> f64 {
    1.0 / duration.as_secs_f64().max(MIN_FRAME_SECONDS)
}
