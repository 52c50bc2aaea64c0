//! Dataset input format and id registry.
//!
//! The host hands over `{ nodes: [...], links: [...] }` where links refer to
//! node ids. Ids are resolved to slot indices once per load; links whose
//! endpoints cannot be resolved are dropped with a warning.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::Dimensions;

/// Node identifier as supplied by the host: a number or a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeKey {
    Int(i64),
    Str(String),
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKey::Int(id) => write!(f, "{id}"),
            NodeKey::Str(id) => write!(f, "{id}"),
        }
    }
}

impl From<i64> for NodeKey {
    fn from(id: i64) -> Self {
        NodeKey::Int(id)
    }
}

impl From<&str> for NodeKey {
    fn from(id: &str) -> Self {
        NodeKey::Str(id.to_string())
    }
}

/// One node entry. Coordinates are optional; missing ones are seeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInput {
    pub id: NodeKey,
    #[serde(default)]
    pub x: Option<f32>,
    #[serde(default)]
    pub y: Option<f32>,
    #[serde(default)]
    pub z: Option<f32>,
    #[serde(default)]
    pub is_static: bool,
    /// Presentation hints, carried for renderers and ignored by the core.
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

impl NodeInput {
    pub fn new(id: impl Into<NodeKey>) -> Self {
        Self {
            id: id.into(),
            x: None,
            y: None,
            z: None,
            is_static: false,
            color: None,
            image: None,
        }
    }

    pub fn at(mut self, x: f32, y: f32, z: f32) -> Self {
        self.x = Some(x);
        self.y = Some(y);
        self.z = Some(z);
        self
    }

    pub fn fixed(mut self) -> Self {
        self.is_static = true;
        self
    }
}

/// One link entry, referring to node ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkInput {
    pub source: NodeKey,
    pub target: NodeKey,
}

impl LinkInput {
    pub fn new(source: impl Into<NodeKey>, target: impl Into<NodeKey>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

/// A complete dataset as loaded from the host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub nodes: Vec<NodeInput>,
    #[serde(default)]
    pub links: Vec<LinkInput>,
}

impl Dataset {
    /// Map every node id to its slot. A repeated id keeps its first slot.
    pub fn registry(&self) -> HashMap<&NodeKey, u32> {
        let mut registry = HashMap::with_capacity(self.nodes.len());
        for (slot, node) in self.nodes.iter().enumerate() {
            if registry.contains_key(&node.id) {
                warn!(id = %node.id, slot, "duplicate node id, keeping first occurrence");
                continue;
            }
            registry.insert(&node.id, slot as u32);
        }
        registry
    }

    /// Resolve links to flat `[src0, tgt0, ...]` slot pairs, dropping the
    /// ones whose endpoints are unknown.
    pub fn resolve_links(&self, registry: &HashMap<&NodeKey, u32>) -> Vec<u32> {
        let mut pairs = Vec::with_capacity(self.links.len() * 2);
        for link in &self.links {
            match (registry.get(&link.source), registry.get(&link.target)) {
                (Some(&source), Some(&target)) => {
                    pairs.push(source);
                    pairs.push(target);
                }
                _ => {
                    warn!(
                        source = %link.source,
                        target = %link.target,
                        "dropping link with unknown endpoint"
                    );
                }
            }
        }
        pairs
    }

    /// Initial position of node `slot`, seeding any missing coordinate.
    pub fn initial_position(&self, slot: usize, dimensions: Dimensions) -> [f32; 3] {
        let seeded = seed_position(slot, dimensions);
        let node = &self.nodes[slot];
        let z = match dimensions {
            Dimensions::Two => 0.0,
            Dimensions::Three => node.z.unwrap_or(seeded[2]),
        };
        [node.x.unwrap_or(seeded[0]), node.y.unwrap_or(seeded[1]), z]
    }
}

const INITIAL_RADIUS: f32 = 10.0;

/// Deterministic phyllotaxis placement for nodes without coordinates.
pub fn seed_position(slot: usize, dimensions: Dimensions) -> [f32; 3] {
    let golden_angle = std::f32::consts::PI * (3.0 - 5.0_f32.sqrt());
    let i = slot as f32;
    let radius = INITIAL_RADIUS * (0.5 + i).sqrt();
    let angle = i * golden_angle;

    match dimensions {
        Dimensions::Two => [radius * angle.cos(), radius * angle.sin(), 0.0],
        Dimensions::Three => {
            // Second low-discrepancy sequence spreads the spiral over a sphere.
            let golden_ratio = (1.0 + 5.0_f32.sqrt()) / 2.0;
            let inclination = (1.0 - 2.0 * ((i * golden_ratio).fract())).acos();
            [
                radius * inclination.sin() * angle.cos(),
                radius * inclination.sin() * angle.sin(),
                radius * inclination.cos(),
            ]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mixed_ids() {
        let json = r#"{
            "nodes": [
                { "id": 1, "x": 0.5, "y": 1.0, "z": 2.0 },
                { "id": "b", "isStatic": true, "color": "red" }
            ],
            "links": [ { "source": 1, "target": "b" } ]
        }"#;
        let dataset: Dataset = serde_json::from_str(json).unwrap();

        assert_eq!(dataset.nodes.len(), 2);
        assert_eq!(dataset.nodes[0].id, NodeKey::Int(1));
        assert_eq!(dataset.nodes[1].id, NodeKey::Str("b".into()));
        assert!(dataset.nodes[1].is_static);
        assert_eq!(dataset.nodes[1].color.as_deref(), Some("red"));
        assert_eq!(dataset.links[0].target, NodeKey::Str("b".into()));
    }

    #[test]
    fn test_resolve_drops_unknown_links() {
        let dataset = Dataset {
            nodes: vec![NodeInput::new("a"), NodeInput::new("b")],
            links: vec![
                LinkInput::new("a", "b"),
                LinkInput::new("a", "missing"),
                LinkInput::new("b", "a"),
            ],
        };
        let registry = dataset.registry();
        assert_eq!(dataset.resolve_links(&registry), vec![0, 1, 1, 0]);
    }

    #[test]
    fn test_duplicate_id_keeps_first() {
        let dataset = Dataset {
            nodes: vec![NodeInput::new(7i64), NodeInput::new(7i64), NodeInput::new(8i64)],
            links: vec![LinkInput::new(7i64, 8i64)],
        };
        let registry = dataset.registry();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry[&NodeKey::Int(7)], 0);
        assert_eq!(dataset.resolve_links(&registry), vec![0, 2]);
    }

    #[test]
    fn test_initial_position_prefers_supplied_coordinates() {
        let dataset = Dataset {
            nodes: vec![NodeInput::new(0i64).at(1.0, 2.0, 3.0), NodeInput::new(1i64)],
            links: Vec::new(),
        };
        assert_eq!(dataset.initial_position(0, Dimensions::Three), [1.0, 2.0, 3.0]);
        assert_eq!(dataset.initial_position(0, Dimensions::Two), [1.0, 2.0, 0.0]);

        let seeded = dataset.initial_position(1, Dimensions::Three);
        assert!(seeded.iter().all(|c| c.is_finite()));
    }

    #[test]
    fn test_seed_positions_are_distinct() {
        let a = seed_position(0, Dimensions::Three);
        let b = seed_position(1, Dimensions::Three);
        let c = seed_position(2, Dimensions::Two);
        assert_ne!(a, b);
        assert_eq!(c[2], 0.0);
    }
}
