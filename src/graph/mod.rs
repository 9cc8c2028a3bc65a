//! Graph module for the dataflow graph.
//!
//! A graph is an ordered sequence of nodes. Each node is parameterized by
//! expressions and reads its inputs from other nodes through index-addressed
//! edges. The graph stays acyclic under every edit.

pub mod cursor;
pub mod edge;
pub mod serialization;
pub mod structure;
pub mod topology;

// Re-export commonly used types
pub use cursor::{CursorAddress, CursorPair, CursorValidity, ResolvedCursor};
pub use edge::{Edge, RemovalPolicy};
pub use serialization::{SerializedGraph, SerializedNode};
pub use structure::{Graph, Node, Parameters};
pub use topology::TopologyAnalyzer;
