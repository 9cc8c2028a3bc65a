//! # ImageFlow - Typed dataflow graphs of expressions
//!
//! ImageFlow is the core of a node-based visual programming environment.
//! Each node of a graph is parameterized by expressions of a small
//! functional language; edges feed node outputs into the inputs other
//! nodes read. Every edit is type checked before it is accepted and
//! nodes are evaluated on demand, with cached and parallel evaluation.
//!
//! ## Features
//!
//! - **Expressions**: constants, variables, arguments, primitives, application, map and lambdas
//! - **Type inference**: Hindley-Milner style unification with failures attributed to their origin
//! - **Graph edits**: index-addressed edges, cycle rejection, node removal with reindexing
//! - **Evaluation**: errors are values, results are cached per node revision
//! - **Background work**: evaluation plans run off the editing thread; stale results are discarded
//! - **Foreign bridge**: values and expressions convert to a foreign runtime's representation
//!
//! ## Quick Start
//!
//! ```rust
//! use imageflow::prelude::*;
//!
//! let mut session = EditorSession::new();
//! let two = session.add_output_node(Expression::constant(2.0)).unwrap();
//! let three = session.add_output_node(Expression::constant(3.0)).unwrap();
//! let sum = session
//!     .add_output_node(Expression::primitive(
//!         "add",
//!         vec![Expression::input(0), Expression::input(1)],
//!     ))
//!     .unwrap();
//! session.add_edge(sum, 0, two).unwrap();
//! session.add_edge(sum, 1, three).unwrap();
//!
//! assert_eq!(session.evaluate(sum).unwrap(), Value::Number(5.0));
//! ```
//!
//! ## Architecture
//!
//! - [`core`]: values and error types
//! - [`expr`]: the expression language, its visitor and evaluator
//! - [`typing`]: types, unification and inference
//! - [`primitives`]: the primitive registry and built-in primitives
//! - [`graph`]: graph structure, edits, topology, cursors and serialization
//! - [`validation`]: whole-graph validation pipeline
//! - [`execution`]: planning, caching, parallel and background evaluation
//! - [`bridge`]: conversion to and from a foreign numeric runtime
//! - [`session`]: the editing session owning all of the above

#![warn(clippy::all)]

pub mod bridge;
pub mod core;
pub mod execution;
pub mod expr;
pub mod graph;
pub mod primitives;
pub mod session;
pub mod typing;
pub mod validation;

/// Prelude module for convenient imports.
///
/// ```rust
/// use imageflow::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use crate::core::types::{Color, ImageHandle, Point, Rect, Size, Value, ValueKind};

    // Errors
    pub use crate::core::error::{
        BridgeError, Culprit, FlowError, FlowResult, GraphError, GraphResult, NodeId, NodeIndex,
        NodeTypeError, TypeError, ValidationError, ValidationReport, ValidationWarning, ValueError,
    };

    // Expressions
    pub use crate::expr::eval::evaluate;
    pub use crate::expr::{Evaluator, Expression, ExpressionVisitor, OUTPUT_PARAMETER};

    // Types
    pub use crate::typing::{infer_expression, BaseType, Type, TypeScheme};

    // Primitives
    pub use crate::primitives::{Category, PrimitiveOp, PrimitiveRegistry, PrimitiveSignature};

    // Graph
    pub use crate::graph::{
        CursorAddress, CursorPair, CursorValidity, Edge, Graph, Node, Parameters, RemovalPolicy,
        SerializedGraph, TopologyAnalyzer,
    };

    // Validation
    pub use crate::validation::{ValidationPipeline, ValidationStage};

    // Execution
    pub use crate::execution::{
        BackgroundEvaluator, CacheStats, EvaluationOutcome, ExecutionEngine, ExecutionOptions,
    };

    // Bridge
    pub use crate::bridge::{ForeignFunction, ForeignPrimitive, ForeignValue};

    // Session
    pub use crate::session::EditorSession;
}

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
        assert_eq!(super::NAME, "imageflow");
    }

    #[test]
    fn test_registry_with_builtins() {
        let registry = PrimitiveRegistry::with_builtins();
        for name in ["add", "array_flatten", "point", "rgb", "if"] {
            assert!(registry.contains(name), "missing {}", name);
        }
    }

    #[test]
    fn test_empty_graph_validates_with_warning() {
        let report = ValidationPipeline::default().validate(&Graph::new());
        assert!(report.is_usable());
        assert_eq!(report.warnings.len(), 1);
    }
}
