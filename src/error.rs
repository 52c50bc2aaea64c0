//! Error types.
//!
//! Data problems (bad links, non-finite coordinates) are recovered where they
//! occur and only logged. The enums here cover the cases a caller has to act on.

use thiserror::Error;

/// Problems with the dataset handed to the engine.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DatasetError {
    /// A simulation needs at least one node.
    #[error("dataset contains no nodes")]
    Empty,

    /// A flat position buffer was not a multiple of three floats.
    #[error("position buffer length {len} is not a multiple of 3")]
    PositionLength { len: usize },
}

/// Invalid configuration values.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("option `{name}` must be finite, got {value}")]
    NonFinite { name: &'static str, value: f64 },

    #[error("option `{name}` is out of range: {reason}")]
    OutOfRange { name: &'static str, reason: String },

    #[error("bounds for `{name}` are inverted: min {min} > max {max}")]
    InvertedBounds { name: &'static str, min: f64, max: f64 },
}

/// Failures raised while building or patching the neighbor index.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum IndexError {
    #[error("neighbor buffer for {nodes} nodes x {max_neighbors} slots overflows")]
    CapacityOverflow { nodes: usize, max_neighbors: usize },

    #[error("grid resolution must be at least 1, got {0}")]
    Resolution(u32),

    #[error("neighbor index unavailable: {0}")]
    Unavailable(String),
}

/// Top-level error for constructing or reconfiguring a simulation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimulationError {
    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Result type for simulation setup.
pub type SimulationResult<T> = Result<T, SimulationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = IndexError::CapacityOverflow {
            nodes: 10,
            max_neighbors: 4,
        };
        assert_eq!(
            err.to_string(),
            "neighbor buffer for 10 nodes x 4 slots overflows"
        );

        let wrapped: SimulationError = DatasetError::Empty.into();
        assert_eq!(wrapped.to_string(), "dataset contains no nodes");
    }
}
