//! Node identity and per-node flags.
//!
//! A node is a slot in the simulation's SoA buffers. Its index is fixed for
//! the lifetime of a dataset; loading a new dataset replaces every slot.

use std::fmt;

/// Index of a node slot in the simulation buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u32);

impl NodeId {
    #[inline]
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Slot index into position/velocity buffers.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({})", self.0)
    }
}

impl From<u32> for NodeId {
    #[inline]
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl From<NodeId> for u32 {
    #[inline]
    fn from(id: NodeId) -> Self {
        id.0
    }
}

/// Node flags packed into a single byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeState {
    flags: u8,
}

impl NodeState {
    const STATIC: u8 = 0b0000_0001;

    #[inline]
    pub fn new() -> Self {
        Self { flags: 0 }
    }

    /// State for a node loaded with `isStatic`.
    #[inline]
    pub fn with_static(is_static: bool) -> Self {
        let mut state = Self::new();
        state.set_static(is_static);
        state
    }

    /// Static nodes are excluded from integration and never move.
    #[inline]
    pub fn is_static(self) -> bool {
        self.flags & Self::STATIC != 0
    }

    #[inline]
    pub fn set_static(&mut self, is_static: bool) {
        if is_static {
            self.flags |= Self::STATIC;
        } else {
            self.flags &= !Self::STATIC;
        }
    }
}
