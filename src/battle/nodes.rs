//! Authored map nodes used for patrols and ambushes
//!
//! A node may be claimed by at most one patrol plan at a time.

use serde::{Deserialize, Serialize};

use crate::core::error::{AiError, Result};
use crate::core::types::{NodeId, Position};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeFlags {
    /// Fits only single-tile units
    pub small: bool,
    /// Placeholder node, never a destination
    pub dummy: bool,
    /// Objective area (base defence targets)
    pub target: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub position: Position,
    /// Preferred rank of patrolling units
    pub rank: u8,
    pub flags: NodeFlags,
    pub links: Vec<NodeId>,
    allocated: bool,
}

impl Node {
    pub fn new(id: NodeId, position: Position) -> Self {
        Self {
            id,
            position,
            rank: 0,
            flags: NodeFlags::default(),
            links: Vec::new(),
            allocated: false,
        }
    }

    pub fn with_rank(mut self, rank: u8) -> Self {
        self.rank = rank;
        self
    }

    pub fn with_flags(mut self, flags: NodeFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn is_allocated(&self) -> bool {
        self.allocated
    }

    /// Whether a unit of the given footprint fits on this node
    pub fn fits(&self, size: i32) -> bool {
        !self.flags.small || size == 1
    }
}

/// All nodes of the current map
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeGraph {
    nodes: Vec<Node>,
}

impl NodeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node at `position`; ids are assigned in insertion order
    pub fn add(&mut self, position: Position) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node::new(id, position));
        id
    }

    /// Add a pre-built node, reassigning its id to the next slot
    pub fn push(&mut self, mut node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        node.id = id;
        self.nodes.push(node);
        id
    }

    /// Link two nodes both ways
    pub fn link(&mut self, a: NodeId, b: NodeId) -> Result<()> {
        if !self.contains(a) {
            return Err(AiError::NodeNotFound(a));
        }
        if !self.contains(b) {
            return Err(AiError::NodeNotFound(b));
        }
        self.nodes[a.index()].links.push(b);
        self.nodes[b.index()].links.push(a);
        Ok(())
    }

    pub fn contains(&self, id: NodeId) -> bool {
        id.index() < self.nodes.len()
    }

    /// Resolve a raw persisted id; out-of-range ids yield `None`
    pub fn resolve(&self, raw: i64) -> Option<NodeId> {
        if raw < 0 || raw >= self.nodes.len() as i64 {
            return None;
        }
        Some(NodeId(raw as u32))
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.index())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Claim a node for a patrol plan
    pub fn allocate(&mut self, id: NodeId) -> Result<()> {
        let node = self.get_mut(id).ok_or(AiError::NodeNotFound(id))?;
        if node.allocated {
            return Err(AiError::NodeAlreadyAllocated(id));
        }
        node.allocated = true;
        Ok(())
    }

    /// Release a claim; freeing a free node is a no-op
    pub fn free(&mut self, id: NodeId) -> Result<()> {
        let node = self.get_mut(id).ok_or(AiError::NodeNotFound(id))?;
        node.allocated = false;
        Ok(())
    }

    pub fn is_allocated(&self, id: NodeId) -> bool {
        self.get(id).map_or(false, |n| n.allocated)
    }

    /// Node standing exactly on `pos`
    pub fn at(&self, pos: Position) -> Option<&Node> {
        self.nodes.iter().find(|n| n.position == pos)
    }
}
