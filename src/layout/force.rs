//! Force kernel: link springs, repulsion, center pull, and integration.
//!
//! Every node's step reads only the previous tick's buffers and writes only
//! its own output slot, so node order never affects the result and the loop
//! can be chunked across threads (`parallel` feature).
//!
//! Per node `i`:
//!
//! 1. **Link force**: for each incident edge, with
//!    `diff = (target + target_vel) - (source + source_vel)`, apply
//!    `diff * stiffness * (|diff| - spring_length) / |diff|`, added on the
//!    source and subtracted on the target.
//! 2. **Repulsion**: `diff = (other + other_vel) - (pos + vel)`,
//!    `force += normalize(diff) * repulsion / |diff|`.
//! 3. **Center**: `-pos * gravity * CENTER_SCALE`.
//! 4. **Integrate**: `vel = (vel + acc * dt) * damping * alpha`, clamp each
//!    axis to `max_speed`, zero z in 2D, `pos += vel * dt`.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::repulsion::Repulsion;
use crate::config::{Dimensions, SimulationConfig};
use crate::graph::{EdgeRole, GraphState, Incidence, NodeState};

/// Fraction of `gravity` applied as the pull toward the origin.
pub const CENTER_SCALE: f32 = 0.1;

/// Pairs closer than this exert no force on each other.
const MIN_DISTANCE: f32 = 1e-6;

/// Parameters for one kernel invocation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForceParams {
    pub repulsion: f32,
    pub spring_length: f32,
    pub stiffness: f32,
    pub gravity: f32,
    pub damping: f32,
    pub max_speed: f32,
    pub time_step: f32,
    pub alpha: f32,
    pub dimensions: Dimensions,
}

impl ForceParams {
    pub fn from_config(config: &SimulationConfig, alpha: f32) -> Self {
        Self {
            repulsion: config.repulsion,
            spring_length: config.spring_length,
            stiffness: config.stiffness,
            gravity: config.gravity,
            damping: config.damping,
            max_speed: config.max_speed,
            time_step: config.time_step,
            alpha,
            dimensions: config.dimensions,
        }
    }
}

/// New velocity and position of one node.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct NodeStep {
    velocity: [f32; 3],
    position: [f32; 3],
}

/// Read-only view of the previous tick.
struct Frame<'a> {
    positions: &'a [[f32; 3]],
    velocities: &'a [[f32; 3]],
    states: &'a [NodeState],
    graph: &'a GraphState,
    repulsion: Repulsion<'a>,
    params: &'a ForceParams,
}

/// Integrator with its own scratch buffer, one per simulation.
#[derive(Debug)]
pub struct ForceKernel {
    scratch: Vec<NodeStep>,
    #[cfg_attr(not(feature = "parallel"), allow(dead_code))]
    chunk_size: usize,
}

impl ForceKernel {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            scratch: Vec::new(),
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn set_chunk_size(&mut self, chunk_size: usize) {
        self.chunk_size = chunk_size.max(1);
    }

    /// Advance every node by one step.
    pub fn step(&mut self, state: &mut GraphState, params: &ForceParams, repulsion: Repulsion<'_>) {
        let node_count = state.node_count();
        self.scratch.resize(node_count, NodeStep::default());

        let frame = Frame {
            positions: state.positions(),
            velocities: state.velocities(),
            states: state.states(),
            graph: state,
            repulsion,
            params,
        };
        self.compute(&frame);

        let (positions, velocities) = state.kinematics_mut();
        for (i, step) in self.scratch.iter().enumerate() {
            velocities[i] = step.velocity;
            positions[i] = step.position;
        }
    }

    #[cfg(not(feature = "parallel"))]
    fn compute(&mut self, frame: &Frame<'_>) {
        for (i, out) in self.scratch.iter_mut().enumerate() {
            *out = node_step(i, frame);
        }
    }

    #[cfg(feature = "parallel")]
    fn compute(&mut self, frame: &Frame<'_>) {
        let chunk_size = self.chunk_size;
        self.scratch
            .par_chunks_mut(chunk_size)
            .enumerate()
            .for_each(|(chunk_index, chunk)| {
                let base = chunk_index * chunk_size;
                for (k, out) in chunk.iter_mut().enumerate() {
                    *out = node_step(base + k, frame);
                }
            });
    }
}

impl Default for ForceKernel {
    fn default() -> Self {
        Self::new(SimulationConfig::default().parallel_chunk_size)
    }
}

fn node_step(i: usize, frame: &Frame<'_>) -> NodeStep {
    let position = frame.positions[i];
    let velocity = frame.velocities[i];

    if frame.states[i].is_static() {
        return NodeStep {
            velocity: [0.0; 3],
            position,
        };
    }
    // No valid position yet: leave the node untouched.
    if !finite(position) || !finite(velocity) {
        return NodeStep { velocity, position };
    }

    let params = frame.params;
    let here = add(position, velocity);
    let mut force = [0.0f32; 3];

    for incidence in frame.graph.incident(i) {
        link_force(&mut force, i, incidence, here, frame);
    }

    match frame.repulsion {
        Repulsion::Indexed(buffer) => {
            for record in buffer.neighbors(i) {
                repel(&mut force, i, record.index as usize, here, 1.0, frame);
            }
        }
        Repulsion::Sampled { stride, offset } => {
            let stride = stride.max(1);
            let start = offset % stride;
            for other in (start..frame.positions.len()).step_by(stride) {
                repel(&mut force, i, other, here, stride as f32, frame);
            }
        }
        Repulsion::BruteForce => {
            for other in 0..frame.positions.len() {
                repel(&mut force, i, other, here, 1.0, frame);
            }
        }
    }

    let pull = params.gravity * CENTER_SCALE;
    for axis in 0..3 {
        force[axis] -= position[axis] * pull;
    }

    // Unit mass: acceleration equals force.
    let mut next_velocity = [0.0f32; 3];
    for axis in 0..3 {
        let v = (velocity[axis] + force[axis] * params.time_step) * params.damping * params.alpha;
        next_velocity[axis] = v.clamp(-params.max_speed, params.max_speed);
    }
    if params.dimensions == Dimensions::Two {
        next_velocity[2] = 0.0;
    }

    let mut next_position = position;
    for axis in 0..3 {
        next_position[axis] += next_velocity[axis] * params.time_step;
    }

    NodeStep {
        velocity: next_velocity,
        position: next_position,
    }
}

fn link_force(force: &mut [f32; 3], i: usize, incidence: &Incidence, here: [f32; 3], frame: &Frame<'_>) {
    let other = incidence.other as usize;
    if other == i {
        return;
    }
    let other_position = frame.positions[other];
    let other_velocity = frame.velocities[other];
    if !finite(other_position) || !finite(other_velocity) {
        return;
    }
    let there = add(other_position, other_velocity);

    let (source, target) = match incidence.role {
        EdgeRole::Source => (here, there),
        EdgeRole::Target => (there, here),
    };
    let diff = sub(target, source);
    let dist = length(diff);
    if dist < MIN_DISTANCE {
        return;
    }

    let magnitude = frame.params.stiffness * (dist - frame.params.spring_length) / dist;
    let sign = match incidence.role {
        EdgeRole::Source => 1.0,
        EdgeRole::Target => -1.0,
    };
    for axis in 0..3 {
        force[axis] += sign * diff[axis] * magnitude;
    }
}

fn repel(force: &mut [f32; 3], i: usize, other: usize, here: [f32; 3], scale: f32, frame: &Frame<'_>) {
    if other == i {
        return;
    }
    let other_position = frame.positions[other];
    let other_velocity = frame.velocities[other];
    if !finite(other_position) || !finite(other_velocity) {
        return;
    }

    let diff = sub(add(other_position, other_velocity), here);
    let dist = length(diff);
    if dist < MIN_DISTANCE {
        return;
    }

    let magnitude = frame.params.repulsion / dist * scale;
    for axis in 0..3 {
        force[axis] += diff[axis] / dist * magnitude;
    }
}

#[inline]
fn add(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

#[inline]
fn sub(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

#[inline]
fn length(v: [f32; 3]) -> f32 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

#[inline]
fn finite(v: [f32; 3]) -> bool {
    v.iter().all(|c| c.is_finite())
}
