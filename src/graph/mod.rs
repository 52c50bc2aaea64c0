//! Graph data structures.
//!
//! Topology is held in petgraph's StableGraph; positions, velocities and
//! flags are flat per-node buffers so the kernel and index read them
//! directly and hosts can upload them without copying.

pub mod dataset;
mod edge;
mod node;
mod state;

pub use dataset::{Dataset, LinkInput, NodeInput, NodeKey};
pub use edge::{Edge, EdgeRole, validate_pairs};
pub use node::{NodeId, NodeState};
pub use state::{GraphState, Incidence};
