//! Selection addresses into the graph.
//!
//! Cursors name nodes by [`NodeId`] rather than by position, so that a
//! cursor taken before a removal cannot silently land on whichever node
//! moved into the old position. They carry no authority to mutate.

use crate::core::error::{NodeId, NodeIndex};
use crate::graph::structure::Graph;
use serde::{Deserialize, Serialize};

/// A selectable position: a node, or one input slot of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorAddress {
    /// On a node.
    Node(NodeId),
    /// On the connector of input `slot` of `node`.
    Edge { node: NodeId, slot: usize },
}

/// A cursor address mapped to current graph positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolvedCursor {
    /// A node at its current index.
    Node(NodeIndex),
    /// A connected slot and the node it currently reads from.
    Edge {
        node: NodeIndex,
        slot: usize,
        target: NodeIndex,
    },
}

impl CursorAddress {
    /// Address of a node.
    pub fn node(id: NodeId) -> Self {
        CursorAddress::Node(id)
    }

    /// Address of an input slot.
    pub fn edge(node: NodeId, slot: usize) -> Self {
        CursorAddress::Edge { node, slot }
    }

    /// The node this address lies on.
    pub fn node_id(&self) -> NodeId {
        match self {
            CursorAddress::Node(id) | CursorAddress::Edge { node: id, .. } => *id,
        }
    }

    /// Map to current positions; `None` when the address no longer exists.
    ///
    /// An edge address exists while its slot is connected.
    pub fn resolve(&self, graph: &Graph) -> Option<ResolvedCursor> {
        let index = graph.index_of(self.node_id())?;
        match self {
            CursorAddress::Node(_) => Some(ResolvedCursor::Node(index)),
            CursorAddress::Edge { slot, .. } => {
                let edge = graph.nodes()[index].input(*slot)?;
                Some(ResolvedCursor::Edge {
                    node: index,
                    slot: *slot,
                    target: edge.target,
                })
            }
        }
    }

    /// Check if the address still exists in `graph`.
    pub fn is_valid(&self, graph: &Graph) -> bool {
        self.resolve(graph).is_some()
    }
}

/// A primary address and a paired secondary one, for range or
/// connection selection. A single selection repeats the primary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CursorPair {
    /// Where the selection started.
    pub primary: CursorAddress,
    /// Where the selection ends.
    pub secondary: CursorAddress,
}

/// Validity of both halves of a [`CursorPair`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorValidity {
    pub primary: bool,
    pub secondary: bool,
}

impl CursorValidity {
    /// Check if both addresses exist.
    pub fn is_valid(&self) -> bool {
        self.primary && self.secondary
    }
}

impl CursorPair {
    /// Create a pair from two addresses.
    pub fn new(primary: CursorAddress, secondary: CursorAddress) -> Self {
        Self { primary, secondary }
    }

    /// A selection of one address.
    pub fn single(address: CursorAddress) -> Self {
        Self::new(address, address)
    }

    /// Check if both addresses are the same.
    pub fn is_single(&self) -> bool {
        self.primary == self.secondary
    }

    /// Same pair with the roles swapped.
    pub fn swapped(&self) -> Self {
        Self::new(self.secondary, self.primary)
    }

    /// Check each address against `graph`.
    pub fn validity(&self, graph: &Graph) -> CursorValidity {
        CursorValidity {
            primary: self.primary.is_valid(graph),
            secondary: self.secondary.is_valid(graph),
        }
    }

    /// Map both addresses to current positions, if both still exist.
    pub fn resolve(&self, graph: &Graph) -> Option<(ResolvedCursor, ResolvedCursor)> {
        Some((self.primary.resolve(graph)?, self.secondary.resolve(graph)?))
    }
}
