//! GraphState - per-dataset simulation state.
//!
//! Topology lives in petgraph's StableGraph. Positions, velocities and node
//! flags are kept in flat per-node buffers so the force kernel and the
//! spatial index can read them without touching the graph, and so hosts can
//! upload them without copying. Incident edges are flattened into a CSR
//! table once per load.

use petgraph::Directed;
use petgraph::stable_graph::{NodeIndex, StableGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use tracing::info;

use super::dataset::Dataset;
use super::edge::{Edge, EdgeRole, validate_pairs};
use super::node::{NodeId, NodeState};
use crate::config::Dimensions;
use crate::error::DatasetError;

/// One entry in a node's incident-edge list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Incidence {
    /// The node at the other end of the edge.
    pub other: u32,
    /// The role of the owning node on this edge.
    pub role: EdgeRole,
}

/// Node and edge buffers for one loaded dataset.
pub struct GraphState {
    graph: StableGraph<NodeId, (), Directed>,
    edges: Vec<Edge>,

    positions: Vec<[f32; 3]>,
    velocities: Vec<[f32; 3]>,
    states: Vec<NodeState>,

    /// CSR offsets into `incidence`, `node_count + 1` entries.
    incidence_offsets: Vec<u32>,
    incidence: Vec<Incidence>,
}

impl GraphState {
    /// Prepare the initial state for a host dataset.
    ///
    /// This is the synchronous preparation path: ids are resolved, missing
    /// coordinates seeded, and links validated before the first tick.
    pub fn from_dataset(dataset: &Dataset, dimensions: Dimensions) -> Result<Self, DatasetError> {
        if dataset.nodes.is_empty() {
            return Err(DatasetError::Empty);
        }

        let registry = dataset.registry();
        let pairs = dataset.resolve_links(&registry);

        let positions = (0..dataset.nodes.len())
            .map(|slot| dataset.initial_position(slot, dimensions))
            .collect();
        let states = dataset
            .nodes
            .iter()
            .map(|node| NodeState::with_static(node.is_static))
            .collect();

        let state = Self::assemble(positions, states, &pairs);
        info!(
            nodes = state.node_count(),
            edges = state.edge_count(),
            dropped_links = dataset.links.len() - state.edge_count(),
            "dataset loaded"
        );
        Ok(state)
    }

    /// Build from a flat `[x0, y0, z0, x1, ...]` buffer and index pairs
    /// `[src0, tgt0, ...]`. Pairs referencing a missing slot are dropped.
    pub fn from_positions(positions: &[f32], pairs: &[u32]) -> Result<Self, DatasetError> {
        if positions.len() % 3 != 0 {
            return Err(DatasetError::PositionLength {
                len: positions.len(),
            });
        }
        if positions.is_empty() {
            return Err(DatasetError::Empty);
        }

        let positions: Vec<[f32; 3]> = positions
            .chunks_exact(3)
            .map(|p| [p[0], p[1], p[2]])
            .collect();
        let states = vec![NodeState::new(); positions.len()];
        Ok(Self::assemble(positions, states, pairs))
    }

    fn assemble(positions: Vec<[f32; 3]>, states: Vec<NodeState>, pairs: &[u32]) -> Self {
        let node_count = positions.len();
        let edges = validate_pairs(pairs, node_count);

        let mut graph = StableGraph::with_capacity(node_count, edges.len());
        for slot in 0..node_count {
            graph.add_node(NodeId(slot as u32));
        }
        for edge in &edges {
            graph.add_edge(
                NodeIndex::new(edge.source.index()),
                NodeIndex::new(edge.target.index()),
                (),
            );
        }

        let (incidence_offsets, incidence) = build_incidence(&graph, node_count);

        Self {
            graph,
            edges,
            velocities: vec![[0.0; 3]; node_count],
            positions,
            states,
            incidence_offsets,
            incidence,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn node_count(&self) -> usize {
        self.positions.len()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn positions(&self) -> &[[f32; 3]] {
        &self.positions
    }

    pub fn velocities(&self) -> &[[f32; 3]] {
        &self.velocities
    }

    pub fn states(&self) -> &[NodeState] {
        &self.states
    }

    /// Edges touching `slot`, each tagged with the node's role on it.
    pub fn incident(&self, slot: usize) -> &[Incidence] {
        let start = self.incidence_offsets[slot] as usize;
        let end = self.incidence_offsets[slot + 1] as usize;
        &self.incidence[start..end]
    }

    /// Split borrow used by the integrator: read-only flags and topology,
    /// writable kinematic buffers.
    pub(crate) fn kinematics_mut(&mut self) -> (&mut [[f32; 3]], &mut [[f32; 3]]) {
        (&mut self.positions, &mut self.velocities)
    }

    // =========================================================================
    // Host interaction
    // =========================================================================

    /// Pin or release a node. Returns false for an unknown slot.
    pub fn set_static(&mut self, slot: usize, is_static: bool) -> bool {
        match self.states.get_mut(slot) {
            Some(state) => {
                state.set_static(is_static);
                if is_static {
                    self.velocities[slot] = [0.0; 3];
                }
                true
            }
            None => false,
        }
    }

    /// Move a node directly (e.g. while the host drags it).
    pub fn set_position(&mut self, slot: usize, position: [f32; 3]) -> bool {
        match self.positions.get_mut(slot) {
            Some(current) => {
                *current = position;
                true
            }
            None => false,
        }
    }
}

/// Flatten incoming and outgoing edges per node into CSR form.
fn build_incidence(
    graph: &StableGraph<NodeId, (), Directed>,
    node_count: usize,
) -> (Vec<u32>, Vec<Incidence>) {
    let mut offsets = vec![0u32; node_count + 1];

    // Count edge ends per node
    for edge in graph.edge_references() {
        offsets[edge.source().index() + 1] += 1;
        offsets[edge.target().index() + 1] += 1;
    }

    // Prefix sum
    for i in 1..=node_count {
        offsets[i] += offsets[i - 1];
    }

    let placeholder = Incidence {
        other: 0,
        role: EdgeRole::Source,
    };
    let mut incidence = vec![placeholder; offsets[node_count] as usize];
    let mut cursor = offsets[..node_count].to_vec();

    for edge in graph.edge_references() {
        let source = edge.source().index();
        let target = edge.target().index();

        incidence[cursor[source] as usize] = Incidence {
            other: target as u32,
            role: EdgeRole::Source,
        };
        cursor[source] += 1;

        incidence[cursor[target] as usize] = Incidence {
            other: source as u32,
            role: EdgeRole::Target,
        };
        cursor[target] += 1;
    }

    (offsets, incidence)
}
