//! Edge types for the graph.

use crate::core::error::NodeIndex;
use serde::{Deserialize, Serialize};

/// The content of a connected input slot: the node the slot reads from.
///
/// Edges are addressed by position only. They are rewritten whenever the
/// node sequence is compacted or a subgraph is copied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    /// Index of the node whose output feeds the slot.
    pub target: NodeIndex,
}

impl Edge {
    /// Create a new edge.
    pub const fn new(target: NodeIndex) -> Self {
        Self { target }
    }

    /// The edge after node `removed` left the sequence.
    ///
    /// Returns `None` when the edge pointed at the removed node.
    pub fn after_removal(self, removed: NodeIndex) -> Option<Edge> {
        match self.target {
            t if t == removed => None,
            t if t > removed => Some(Edge::new(t - 1)),
            _ => Some(self),
        }
    }
}

/// What `remove_node` does with edges pointing at the removed node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalPolicy {
    /// Refuse to remove a node that still has consumers.
    #[default]
    Reject,
    /// Empty every slot reading from the node, then remove it.
    Detach,
}
