//! Frame-time sampling and automatic tuning.

pub mod controller;
pub mod samples;
pub mod tuning;

pub use controller::{HISTORY_LIMIT, PerformanceBand, PerformanceController, TuningRecord};
pub use samples::SampleWindow;
pub use tuning::{Knob, ParameterChange, TuningParameter, TuningSet};
