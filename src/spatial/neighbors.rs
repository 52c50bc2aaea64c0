//! Fixed-capacity neighbor buffer.
//!
//! Parallel arrays `indices[node * max_neighbors + k]` and `distances[...]`.
//! Each node's run is sorted ascending by distance; unused slots hold
//! [`SENTINEL_INDEX`] and `+inf`.

use serde::Serialize;

use crate::error::IndexError;

pub const SENTINEL_INDEX: i32 = -1;
pub const SENTINEL_DISTANCE: f32 = f32::INFINITY;

/// One neighbor of a node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NeighborRecord {
    pub index: u32,
    pub distance: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NeighborBuffer {
    node_count: usize,
    max_neighbors: usize,
    indices: Vec<i32>,
    distances: Vec<f32>,
}

impl NeighborBuffer {
    /// Allocate a buffer with every slot set to the sentinel.
    pub fn new(node_count: usize, max_neighbors: usize) -> Result<Self, IndexError> {
        let overflow = IndexError::CapacityOverflow {
            nodes: node_count,
            max_neighbors,
        };
        if node_count > i32::MAX as usize {
            return Err(overflow);
        }
        let len = node_count.checked_mul(max_neighbors).ok_or(overflow)?;

        Ok(Self {
            node_count,
            max_neighbors,
            indices: vec![SENTINEL_INDEX; len],
            distances: vec![SENTINEL_DISTANCE; len],
        })
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn max_neighbors(&self) -> usize {
        self.max_neighbors
    }

    /// Overwrite a node's run. `records` must already be sorted; anything
    /// past `max_neighbors` is discarded.
    pub fn write(&mut self, node: usize, records: &[NeighborRecord]) {
        let start = node * self.max_neighbors;
        let slots = start..start + self.max_neighbors;
        let indices = &mut self.indices[slots.clone()];
        let distances = &mut self.distances[slots];

        for k in 0..self.max_neighbors {
            match records.get(k) {
                Some(record) => {
                    indices[k] = record.index as i32;
                    distances[k] = record.distance;
                }
                None => {
                    indices[k] = SENTINEL_INDEX;
                    distances[k] = SENTINEL_DISTANCE;
                }
            }
        }
    }

    /// Valid neighbors of `node`, nearest first.
    pub fn neighbors(&self, node: usize) -> impl Iterator<Item = NeighborRecord> + '_ {
        let start = node * self.max_neighbors;
        let end = start + self.max_neighbors;
        self.indices[start..end]
            .iter()
            .zip(&self.distances[start..end])
            .take_while(|(index, _)| **index >= 0)
            .map(|(&index, &distance)| NeighborRecord {
                index: index as u32,
                distance,
            })
    }

    /// Number of valid neighbors stored for `node`.
    pub fn len_of(&self, node: usize) -> usize {
        self.neighbors(node).count()
    }

    /// Flat index array, for upload to renderers and diagnostics.
    pub fn indices(&self) -> &[i32] {
        &self.indices
    }

    pub fn distances(&self) -> &[f32] {
        &self.distances
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(index: u32, distance: f32) -> NeighborRecord {
        NeighborRecord { index, distance }
    }

    #[test]
    fn test_new_is_all_sentinel() {
        let buffer = NeighborBuffer::new(3, 4).unwrap();
        assert_eq!(buffer.indices().len(), 12);
        assert!(buffer.indices().iter().all(|&i| i == SENTINEL_INDEX));
        assert!(buffer.distances().iter().all(|d| d.is_infinite()));
        assert_eq!(buffer.len_of(1), 0);
    }

    #[test]
    fn test_write_truncates_and_pads() {
        let mut buffer = NeighborBuffer::new(2, 2).unwrap();
        buffer.write(1, &[record(0, 1.0), record(5, 2.0), record(9, 3.0)]);

        let stored: Vec<_> = buffer.neighbors(1).collect();
        assert_eq!(stored, vec![record(0, 1.0), record(5, 2.0)]);

        buffer.write(1, &[record(3, 0.5)]);
        assert_eq!(buffer.len_of(1), 1);
        assert_eq!(buffer.indices()[3], SENTINEL_INDEX);
        assert_eq!(buffer.len_of(0), 0);
    }

    #[test]
    fn test_capacity_overflow() {
        assert!(matches!(
            NeighborBuffer::new(usize::MAX / 2, 4),
            Err(IndexError::CapacityOverflow { .. })
        ));
    }
}
