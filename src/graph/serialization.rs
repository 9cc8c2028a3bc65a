//! Graph serialization for saving and loading.
//!
//! Stored graphs keep expressions and edges only. Identities, revisions and
//! types are rebuilt on load, after the structure has been validated.

use crate::core::error::{FlowError, FlowResult, GraphError, ValidationError};
use crate::expr::ast::Expression;
use crate::graph::edge::Edge;
use crate::graph::structure::{check_parameter_names, Graph, NodeParts, Parameters};
use crate::primitives::PrimitiveRegistry;
use crate::validation::stages::StructuralValidation;
use indexmap::IndexMap;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Serializable representation of a graph node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedNode {
    /// Optional display label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Parameter expressions, output included
    pub params: IndexMap<String, Arc<Expression>>,
    /// Target of each input slot
    #[serde(default)]
    pub edges: Vec<Option<usize>>,
}

/// Serializable representation of a complete graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedGraph {
    /// Graph format version
    pub version: String,
    /// Graph name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// All nodes, in graph order
    pub nodes: Vec<SerializedNode>,
}

impl SerializedGraph {
    /// Current format version.
    pub const VERSION: &'static str = "1.0.0";

    /// Create an empty serialized graph.
    pub fn new() -> Self {
        Self {
            version: Self::VERSION.to_string(),
            name: None,
            nodes: Vec::new(),
        }
    }

    /// Capture the storable content of `graph`.
    pub fn from_graph(graph: &Graph) -> Self {
        Self {
            version: Self::VERSION.to_string(),
            name: graph.name.clone(),
            nodes: graph
                .nodes()
                .iter()
                .map(|node| SerializedNode {
                    label: node.label().map(str::to_string),
                    params: node.params().clone(),
                    edges: node
                        .inputs()
                        .iter()
                        .map(|slot| slot.map(|edge| edge.target))
                        .collect(),
                })
                .collect(),
        }
    }

    /// Check that every constant has a JSON spelling.
    ///
    /// Infinite and NaN numbers would be written as `null` and fail to load.
    pub fn check_finite(&self) -> Result<(), GraphError> {
        for (index, node) in self.nodes.iter().enumerate() {
            if let Some((name, _)) = node.params.iter().find(|(_, e)| !e.constants_finite()) {
                return Err(GraphError::NonFiniteConstant {
                    node: index,
                    name: name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Check that the stored format can be read by this version.
    ///
    /// Versions are compatible when they share the major component.
    pub fn check_version(&self) -> Result<(), GraphError> {
        let incompatible = || GraphError::IncompatibleVersion {
            found: self.version.clone(),
            expected: Self::VERSION.to_string(),
        };
        let found = Version::parse(&self.version).map_err(|_| incompatible())?;
        let expected = Version::parse(Self::VERSION).map_err(|_| incompatible())?;
        if found.major == expected.major {
            Ok(())
        } else {
            Err(incompatible())
        }
    }

    /// Rebuild a graph typing against `registry`.
    ///
    /// Fails on an incompatible version, a node without output, a reserved
    /// parameter name, an edge to a missing node, or a cycle. Nodes that no
    /// longer type are loaded with their failure stored.
    pub fn into_graph(self, registry: Arc<PrimitiveRegistry>) -> FlowResult<Graph> {
        self.check_version()?;
        for node in &self.nodes {
            check_parameter_names(&node.params)?;
        }

        let edges: Vec<Vec<Option<usize>>> = self.nodes.iter().map(|n| n.edges.clone()).collect();
        if let Err(mut errors) = StructuralValidation::check_edges(&edges) {
            let error = errors.remove(0);
            return Err(match error {
                ValidationError::DanglingEdge { node, slot, target } => {
                    GraphError::DanglingEdge { node, slot, target }.into()
                }
                other => FlowError::Validation(other),
            });
        }

        let parts = self
            .nodes
            .into_iter()
            .map(|node| NodeParts {
                label: node.label,
                params: node.params,
                inputs: trimmed(node.edges.into_iter().map(|t| t.map(Edge::new)).collect()),
            })
            .collect();
        let graph = Graph::from_parts(self.name, registry, parts);
        log::info!("Loaded graph with {} node(s)", graph.node_count());
        Ok(graph)
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize to compact JSON (no whitespace).
    pub fn to_json_compact(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl Default for SerializedGraph {
    fn default() -> Self {
        Self::new()
    }
}

fn trimmed(mut inputs: Vec<Option<Edge>>) -> Vec<Option<Edge>> {
    while matches!(inputs.last(), Some(None)) {
        inputs.pop();
    }
    inputs
}

impl Graph {
    /// Serialize the graph to pretty JSON.
    ///
    /// Fails when a constant holds an infinite or NaN number.
    pub fn to_json(&self) -> FlowResult<String> {
        let stored = SerializedGraph::from_graph(self);
        stored.check_finite()?;
        Ok(stored.to_json()?)
    }

    /// Load a graph from JSON, typing against `registry`.
    pub fn from_json(json: &str, registry: Arc<PrimitiveRegistry>) -> FlowResult<Graph> {
        SerializedGraph::from_json(json)?.into_graph(registry)
    }

    /// Write the graph to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> FlowResult<()> {
        std::fs::write(path.as_ref(), self.to_json()?)?;
        log::info!("Saved graph to {}", path.as_ref().display());
        Ok(())
    }

    /// Read a graph from a JSON file.
    pub fn load(path: impl AsRef<Path>, registry: Arc<PrimitiveRegistry>) -> FlowResult<Graph> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&json, registry)
    }
}

/// Parameters of a stored node, for building [`SerializedNode`]s by hand.
pub fn output_only(output: Arc<Expression>) -> Parameters {
    let mut params = Parameters::new();
    params.insert(crate::expr::ast::OUTPUT_PARAMETER.to_string(), output);
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::NodeTypeError;
    use crate::core::types::Value;
    use crate::typing::ty::{BaseType, Type};

    fn registry() -> Arc<PrimitiveRegistry> {
        Arc::new(PrimitiveRegistry::with_builtins())
    }

    fn node(output: Arc<Expression>, edges: Vec<Option<usize>>) -> SerializedNode {
        SerializedNode {
            label: None,
            params: output_only(output),
            edges,
        }
    }

    fn sum() -> SerializedGraph {
        let mut stored = SerializedGraph::new();
        stored.name = Some("sum".to_string());
        stored.nodes.push(node(Expression::constant(2.0), vec![]));
        stored.nodes.push(node(Expression::constant(3.0), vec![]));
        stored.nodes.push(node(
            Expression::primitive("add", vec![Expression::input(0), Expression::input(1)]),
            vec![Some(0), Some(1)],
        ));
        stored
    }

    #[test]
    fn test_json_roundtrip_through_graph() {
        let graph = sum().into_graph(registry()).unwrap();
        assert_eq!(graph.name.as_deref(), Some("sum"));
        assert_eq!(graph.type_of(2).unwrap(), Type::Base(BaseType::Number));

        let json = graph.to_json().unwrap();
        assert!(json.contains("\"version\""));
        let back = Graph::from_json(&json, registry()).unwrap();
        assert_eq!(SerializedGraph::from_graph(&back), sum());
    }

    #[test]
    fn test_version_check() {
        let mut stored = sum();
        stored.version = "1.4.2".to_string();
        assert!(stored.check_version().is_ok());

        stored.version = "2.0.0".to_string();
        assert!(matches!(
            stored.clone().into_graph(registry()),
            Err(FlowError::Graph(GraphError::IncompatibleVersion { .. }))
        ));

        stored.version = "not a version".to_string();
        assert!(stored.check_version().is_err());
    }

    #[test]
    fn test_structure_checked_on_load() {
        let mut dangling = sum();
        dangling.nodes[2].edges[1] = Some(7);
        assert!(matches!(
            dangling.into_graph(registry()),
            Err(FlowError::Graph(GraphError::DanglingEdge {
                node: 2,
                slot: 1,
                target: 7
            }))
        ));

        let mut cyclic = sum();
        cyclic.nodes[0].edges.push(Some(2));
        assert!(matches!(
            cyclic.into_graph(registry()),
            Err(FlowError::Validation(ValidationError::CycleDetected(_)))
        ));

        let mut unnamed = sum();
        unnamed.nodes[1].params = IndexMap::new();
        assert!(matches!(
            unnamed.into_graph(registry()),
            Err(FlowError::Graph(GraphError::MissingOutput(_)))
        ));
    }

    #[test]
    fn test_ill_typed_node_loads_with_stored_failure() {
        let mut stored = sum();
        stored.nodes[0] = node(Expression::constant(Value::string("x")), vec![]);
        let graph = stored.into_graph(registry()).unwrap();
        match graph.type_of(2) {
            Err(GraphError::Type(NodeTypeError { node, origin, .. })) => {
                assert_eq!((node, origin), (2, 0));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");
        let graph = sum().into_graph(registry()).unwrap();
        graph.save(&path).unwrap();

        let loaded = Graph::load(&path, registry()).unwrap();
        assert_eq!(loaded.node_count(), 3);
        assert_eq!(loaded.edges_of(2).unwrap(), graph.edges_of(2).unwrap());
        assert!(Graph::load(dir.path().join("missing.json"), registry()).is_err());
    }

    #[test]
    fn test_non_finite_constant_not_saved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");

        let mut stored = sum();
        stored.nodes[1] = node(Expression::constant(f64::INFINITY), vec![]);
        let graph = stored.into_graph(registry()).unwrap();
        assert!(matches!(
            graph.save(&path),
            Err(FlowError::Graph(GraphError::NonFiniteConstant { node: 1, ref name }))
                if name == "output"
        ));
        assert!(!path.exists());

        let mut nested = sum();
        nested.nodes[0] = node(
            Expression::constant(Value::Array(vec![Value::point(0.0, f64::NAN)])),
            vec![],
        );
        assert!(nested.check_finite().is_err());

        let mut finite = sum();
        finite.nodes[1] = node(Expression::constant(-1.5e10), vec![]);
        finite.into_graph(registry()).unwrap().save(&path).unwrap();
        let loaded = Graph::load(&path, registry()).unwrap();
        assert_eq!(
            loaded.node(1).unwrap().output().unwrap().as_ref(),
            &Expression::Constant { value: Value::Number(-1.5e10) }
        );
    }
}
