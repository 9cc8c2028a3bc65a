//! Error types for ImageFlow.
//!
//! Uses thiserror for structured errors with context. Two regimes coexist:
//! - Evaluation failures are values ([`crate::core::types::Value::Error`]) and never appear here
//! - Structural and type failures are returned to the caller of an edit,
//!   and the edit is rejected in full

use crate::core::types::ValueKind;
use crate::typing::ty::Type;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Position of a node in the graph's node sequence.
///
/// Indices are structural: they change when an earlier node is removed.
pub type NodeIndex = usize;

/// Stable identity of a node, independent of its position.
///
/// Used for selection and cursors only; edges are always index-addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Create a new random node ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Top-level error type for ImageFlow.
#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Type error: {0}")]
    Type(#[from] TypeError),

    #[error("Value error: {0}")]
    Value(#[from] ValueError),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("{0}")]
    Other(String),
}

/// A typed view was requested on a value of another kind.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValueError {
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: ValueKind, found: ValueKind },

    #[error("{0}")]
    Domain(String),
}

/// The operand a type failure is attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Culprit {
    /// A node input slot, read through `in{slot}` or a top-level argument.
    Input(usize),
    /// Any other sub-expression, pretty-printed.
    Expression(String),
}

impl fmt::Display for Culprit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Culprit::Input(slot) => write!(f, "input {}", slot),
            Culprit::Expression(text) => write!(f, "`{}`", text),
        }
    }
}

/// Failures of type inference over a single expression tree.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypeError {
    #[error("cannot unify {expected} with {found} (in {culprit})")]
    UnificationFailure {
        expected: Type,
        found: Type,
        culprit: Culprit,
    },

    #[error("infinite type: {var} occurs in {ty} (in {culprit})")]
    InfiniteType { var: Type, ty: Type, culprit: Culprit },

    #[error("arity mismatch in `{expression}`: expected {expected} operand(s), found {found}")]
    ArityMismatch {
        expected: usize,
        found: usize,
        expression: String,
    },

    #[error("unbound variable '{0}'")]
    UnboundVariable(String),

    #[error("argument #{index} is out of range ({available} available)")]
    ArgumentOutOfRange { index: usize, available: usize },

    #[error("unknown primitive '{0}'")]
    UnknownPrimitive(String),
}

impl TypeError {
    /// The operand this failure is attributed to, when known.
    pub fn culprit(&self) -> Option<&Culprit> {
        match self {
            TypeError::UnificationFailure { culprit, .. }
            | TypeError::InfiniteType { culprit, .. } => Some(culprit),
            _ => None,
        }
    }
}

/// A type failure located in the graph.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("type error in node {node} (caused by node {origin}): {error}")]
pub struct NodeTypeError {
    /// The node whose expressions failed to type.
    pub node: NodeIndex,
    /// The node responsible: an upstream node feeding the offending input, or `node` itself.
    pub origin: NodeIndex,
    /// Parameter whose expression failed.
    pub parameter: String,
    /// The underlying failure.
    pub error: TypeError,
}

/// Errors related to graph structure and edits.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GraphError {
    #[error("Node index {index} is out of range ({len} nodes)")]
    NodeOutOfRange { index: NodeIndex, len: usize },

    #[error("Input slot {slot} of node {node} is out of range ({len} slots)")]
    SlotOutOfRange { node: NodeIndex, slot: usize, len: usize },

    #[error("Edge from node {from} to node {to} would create a cycle")]
    CycleDetected { from: NodeIndex, to: NodeIndex },

    #[error("Cannot remove node {node}: consumed by nodes {consumers:?}")]
    NodeHasConsumers {
        node: NodeIndex,
        consumers: Vec<NodeIndex>,
    },

    #[error("Node is missing its '{0}' parameter")]
    MissingOutput(String),

    #[error("Parameter name '{0}' is reserved for inputs")]
    InvalidParameterName(String),

    #[error("Parameter '{name}' not found on node {node}")]
    ParameterNotFound { node: NodeIndex, name: String },

    #[error("Edge in slot {slot} of node {node} targets missing node {target}")]
    DanglingEdge {
        node: NodeIndex,
        slot: usize,
        target: NodeIndex,
    },

    #[error("Parameter '{name}' of node {node} holds a non-finite number and cannot be stored")]
    NonFiniteConstant { node: NodeIndex, name: String },

    #[error("Graph format version {found} is not compatible with {expected}")]
    IncompatibleVersion { found: String, expected: String },

    #[error(transparent)]
    Type(#[from] NodeTypeError),
}

/// Failures crossing the foreign value bridge.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BridgeError {
    #[error("{0} values cannot be represented in the foreign runtime")]
    Unrepresentable(ValueKind),

    #[error("unknown foreign block tag {0}")]
    UnknownTag(u8),

    #[error("malformed foreign block (tag {tag}): {reason}")]
    Malformed { tag: u8, reason: String },

    #[error("foreign primitive '{name}' failed: {message}")]
    Foreign { name: String, message: String },
}

/// Errors from the validation pipeline.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValidationError {
    #[error("Graph contains a cycle through nodes {0:?}")]
    CycleDetected(Vec<NodeIndex>),

    #[error("Edge in slot {slot} of node {node} targets missing node {target}")]
    DanglingEdge {
        node: NodeIndex,
        slot: usize,
        target: NodeIndex,
    },

    #[error("Node {0} has no output expression")]
    MissingOutput(NodeIndex),

    #[error("Node {node} uses unknown primitive '{name}'")]
    UnknownPrimitive { node: NodeIndex, name: String },

    #[error("{0}")]
    Type(NodeTypeError),
}

// ============================================================================
// Error Utilities
// ============================================================================

impl ValidationError {
    /// Check if this is a fatal error that should stop validation.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ValidationError::CycleDetected(_) | ValidationError::DanglingEdge { .. }
        )
    }

    /// Get suggestion for fixing this error.
    pub fn suggested_fix(&self) -> Option<String> {
        match self {
            ValidationError::DanglingEdge { node, slot, .. } => {
                Some(format!("Reconnect or clear input {} of node {}", slot, node))
            }
            ValidationError::MissingOutput(_) => {
                Some("Add an 'output' parameter expression".to_string())
            }
            ValidationError::Type(error) if error.origin != error.node => Some(format!(
                "Check the value produced by node {}",
                error.origin
            )),
            _ => None,
        }
    }

    /// Get list of affected node indices.
    pub fn affected_nodes(&self) -> Vec<NodeIndex> {
        match self {
            ValidationError::CycleDetected(nodes) => nodes.clone(),
            ValidationError::DanglingEdge { node, .. }
            | ValidationError::MissingOutput(node)
            | ValidationError::UnknownPrimitive { node, .. } => vec![*node],
            ValidationError::Type(error) => vec![error.node],
        }
    }
}

impl GraphError {
    /// Check if this error rejected an edit for typing reasons.
    pub fn is_type_error(&self) -> bool {
        matches!(self, GraphError::Type(_))
    }
}

/// Result type alias for ImageFlow operations.
pub type FlowResult<T> = Result<T, FlowError>;

/// Result type alias for graph operations.
pub type GraphResult<T> = Result<T, GraphError>;

/// Result type alias for type inference.
pub type TypeResult<T> = Result<T, TypeError>;

// ============================================================================
// Validation Report
// ============================================================================

/// Comprehensive validation report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Whether validation passed without errors.
    pub success: bool,
    /// List of errors found.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<ValidationWarning>,
    /// Time taken for validation in milliseconds.
    pub duration_ms: u64,
}

/// Non-fatal validation warning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationWarning {
    /// Warning message.
    pub message: String,
    /// Node that triggered the warning, if applicable.
    pub node: Option<NodeIndex>,
    /// Suggestion for addressing the warning.
    pub suggestion: Option<String>,
}

impl ValidationReport {
    /// Create a new empty report (success).
    pub fn new() -> Self {
        Self {
            success: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            duration_ms: 0,
        }
    }

    /// Add an error to the report.
    pub fn add_error(&mut self, error: ValidationError) {
        self.success = false;
        self.errors.push(error);
    }

    /// Add a warning to the report.
    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// Check if the graph is usable.
    pub fn is_usable(&self) -> bool {
        self.success
    }

    /// Get a human-readable summary.
    pub fn summary(&self) -> String {
        if self.success {
            if self.warnings.is_empty() {
                "Graph is valid".to_string()
            } else {
                format!("Graph is valid with {} warning(s)", self.warnings.len())
            }
        } else {
            format!("Validation failed with {} error(s)", self.errors.len())
        }
    }

    /// Get detailed error messages with suggestions.
    pub fn detailed_errors(&self) -> Vec<String> {
        self.errors
            .iter()
            .enumerate()
            .map(|(i, error)| {
                let mut msg = format!("{}. {}", i + 1, error);
                if let Some(fix) = error.suggested_fix() {
                    msg.push_str(&format!("\n   -> Suggestion: {}", fix));
                }
                msg
            })
            .collect()
    }
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typing::ty::BaseType;

    #[test]
    fn test_node_id_display() {
        let id = NodeId::new();
        assert_eq!(format!("{}", id).len(), 8);
    }

    #[test]
    fn test_node_type_error_display() {
        let error = NodeTypeError {
            node: 2,
            origin: 0,
            parameter: "output".to_string(),
            error: TypeError::UnificationFailure {
                expected: Type::Base(BaseType::Number),
                found: Type::Base(BaseType::String),
                culprit: Culprit::Input(0),
            },
        };
        let text = error.to_string();
        assert!(text.contains("node 2"));
        assert!(text.contains("caused by node 0"));
        assert!(text.contains("Number"));
        assert!(text.contains("String"));
    }

    #[test]
    fn test_validation_suggestions() {
        let error = ValidationError::DanglingEdge {
            node: 3,
            slot: 1,
            target: 9,
        };
        assert!(error.is_fatal());
        assert!(error.suggested_fix().unwrap().contains("node 3"));
        assert_eq!(error.affected_nodes(), vec![3]);
    }

    #[test]
    fn test_validation_report() {
        let mut report = ValidationReport::new();
        assert!(report.is_usable());

        report.add_error(ValidationError::CycleDetected(vec![0, 1]));
        assert!(!report.is_usable());
        assert_eq!(report.errors.len(), 1);
        assert!(report.detailed_errors()[0].starts_with("1."));
    }
}
