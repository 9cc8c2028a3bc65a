//! Individual validation stages.
//!
//! Each stage checks for a specific category of errors.

use crate::core::error::{NodeIndex, ValidationError, ValidationWarning};
use crate::core::types::Value;
use crate::expr::ast::{input_slot, input_variable, Expression, OUTPUT_PARAMETER};
use crate::expr::visitor::ExpressionVisitor;
use crate::graph::structure::Graph;
use crate::graph::topology::TopologyAnalyzer;
use std::collections::HashSet;
use std::sync::Arc;

/// Trait for validation stages.
pub trait ValidationStage: Send + Sync {
    /// Name of this validation stage.
    fn name(&self) -> &str;

    /// Validate the graph.
    ///
    /// Returns Ok with warnings, or Err with errors.
    fn validate(&self, graph: &Graph) -> Result<Vec<ValidationWarning>, Vec<ValidationError>>;
}

/// Structural validation - checks graph structure.
///
/// Verifies:
/// - Every node has an output expression
/// - All edges reference existing nodes
/// - Graph is a DAG (no cycles)
pub struct StructuralValidation;

impl StructuralValidation {
    /// Check raw slot targets, one list per node.
    ///
    /// Used on stored graphs before they are admitted. Dangling edges are
    /// reported before cycles, since a cycle check over them is meaningless.
    pub fn check_edges(edges: &[Vec<Option<NodeIndex>>]) -> Result<(), Vec<ValidationError>> {
        let count = edges.len();
        let dangling: Vec<ValidationError> = edges
            .iter()
            .enumerate()
            .flat_map(|(node, slots)| {
                slots.iter().enumerate().filter_map(move |(slot, target)| match target {
                    Some(target) if *target >= count => Some(ValidationError::DanglingEdge {
                        node,
                        slot,
                        target: *target,
                    }),
                    _ => None,
                })
            })
            .collect();
        if !dangling.is_empty() {
            return Err(dangling);
        }

        let dependencies = edges
            .iter()
            .map(|slots| slots.iter().flatten().copied().collect())
            .collect();
        TopologyAnalyzer::from_dependencies(dependencies)
            .topological_sort()
            .map(|_| ())
            .map_err(|error| vec![error])
    }
}

impl ValidationStage for StructuralValidation {
    fn name(&self) -> &str {
        "Structural Validation"
    }

    fn validate(&self, graph: &Graph) -> Result<Vec<ValidationWarning>, Vec<ValidationError>> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        // Empty graph warning (not error - might be intentional)
        if graph.is_empty() {
            warnings.push(ValidationWarning {
                message: "Graph is empty".to_string(),
                node: None,
                suggestion: Some("Add nodes to build a pipeline".to_string()),
            });
            return Ok(warnings);
        }

        for (index, node) in graph.nodes().iter().enumerate() {
            if node.output().is_none() {
                errors.push(ValidationError::MissingOutput(index));
            }
        }

        let edges: Vec<Vec<Option<NodeIndex>>> = graph
            .nodes()
            .iter()
            .map(|node| node.inputs().iter().map(|slot| slot.map(|e| e.target)).collect())
            .collect();
        if let Err(structural) = Self::check_edges(&edges) {
            errors.extend(structural);
        }

        // Check for disconnected subgraphs (warning)
        let subgraphs = TopologyAnalyzer::new(graph).find_subgraphs();
        if subgraphs.len() > 1 {
            warnings.push(ValidationWarning {
                message: format!("Graph contains {} disconnected subgraphs", subgraphs.len()),
                node: None,
                suggestion: Some("Consider connecting all parts or removing unused nodes".to_string()),
            });
        }

        if errors.is_empty() {
            Ok(warnings)
        } else {
            Err(errors)
        }
    }
}

/// Expression validation - checks the parameter expressions themselves.
///
/// Verifies:
/// - Every primitive used is registered
///
/// Warns about parameters nothing reads and input variables read from
/// unconnected slots.
pub struct ExpressionValidation;

impl ValidationStage for ExpressionValidation {
    fn name(&self) -> &str {
        "Expression Validation"
    }

    fn validate(&self, graph: &Graph) -> Result<Vec<ValidationWarning>, Vec<ValidationError>> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let registry = graph.registry();

        for (index, node) in graph.nodes().iter().enumerate() {
            let mut seen = HashSet::new();
            for expression in node.params().values() {
                for name in expression.primitive_names() {
                    if !registry.contains(name) && seen.insert(name.to_string()) {
                        errors.push(ValidationError::UnknownPrimitive {
                            node: index,
                            name: name.to_string(),
                        });
                    }
                }
            }

            let mut collector = FreeVariables::default();
            for expression in node.params().values() {
                expression.accept(&mut collector);
            }

            for name in node.params().keys() {
                if name.as_str() != OUTPUT_PARAMETER && !collector.names.contains(name) {
                    warnings.push(ValidationWarning {
                        message: format!("Parameter '{}' of node {} is never read", name, index),
                        node: Some(index),
                        suggestion: Some(format!("Remove '{}' or use it in the output", name)),
                    });
                }
            }

            let mut unconnected: Vec<usize> = collector
                .names
                .iter()
                .filter_map(|name| input_slot(name))
                .filter(|&slot| node.input(slot).is_none())
                .collect();
            unconnected.sort_unstable();
            for slot in unconnected {
                warnings.push(ValidationWarning {
                    message: format!("Node {} reads input {} which is not connected", index, slot),
                    node: Some(index),
                    suggestion: Some(format!("Connect input {} of node {}", slot, index)),
                });
            }
        }

        if errors.is_empty() {
            Ok(warnings)
        } else {
            Err(errors)
        }
    }
}

/// Collects the free variable names of expressions.
#[derive(Default)]
struct FreeVariables {
    names: HashSet<String>,
    bound: Vec<Vec<String>>,
}

impl ExpressionVisitor for FreeVariables {
    type Output = ();

    fn visit_constant(&mut self, _value: &Value) {}

    fn visit_variable(&mut self, name: &str) {
        if !self.bound.iter().any(|scope| scope.iter().any(|b| b == name)) {
            self.names.insert(name.to_string());
        }
    }

    fn visit_argument(&mut self, index: usize) {
        // Top-level arguments read node inputs.
        if self.bound.is_empty() {
            self.names.insert(input_variable(index));
        }
    }

    fn visit_primitive(&mut self, _name: &str, operands: &[Arc<Expression>]) {
        operands.iter().for_each(|e| e.accept(self));
    }

    fn visit_apply(&mut self, operator: &Arc<Expression>, operands: &[Arc<Expression>]) {
        operator.accept(self);
        operands.iter().for_each(|e| e.accept(self));
    }

    fn visit_map(&mut self, array: &Arc<Expression>, lambda: &Arc<Expression>) {
        array.accept(self);
        lambda.accept(self);
    }

    fn visit_lambda(&mut self, params: &[String], body: &Arc<Expression>) {
        self.bound.push(params.to_vec());
        body.accept(self);
        self.bound.pop();
    }
}

/// Type validation - reports nodes whose expressions fail to type.
///
/// Warns about nodes whose output type is still polymorphic.
pub struct TypeValidation;

impl ValidationStage for TypeValidation {
    fn name(&self) -> &str {
        "Type Validation"
    }

    fn validate(&self, graph: &Graph) -> Result<Vec<ValidationWarning>, Vec<ValidationError>> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        for (index, node) in graph.nodes().iter().enumerate() {
            match node.output_type() {
                Ok(ty) if !ty.is_ground() => warnings.push(ValidationWarning {
                    message: format!("Output type of node {} is not fully determined: {}", index, ty),
                    node: Some(index),
                    suggestion: Some("Connect the inputs it reads".to_string()),
                }),
                Ok(_) => {}
                Err(error) => errors.push(ValidationError::Type(error.clone())),
            }
        }

        if errors.is_empty() {
            Ok(warnings)
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::structure::Parameters;

    #[test]
    fn test_check_edges() {
        assert!(StructuralValidation::check_edges(&[vec![], vec![Some(0), None]]).is_ok());
        assert_eq!(
            StructuralValidation::check_edges(&[vec![Some(4)]]).unwrap_err(),
            vec![ValidationError::DanglingEdge {
                node: 0,
                slot: 0,
                target: 4
            }]
        );
        assert_eq!(
            StructuralValidation::check_edges(&[vec![Some(1)], vec![Some(0)]]).unwrap_err(),
            vec![ValidationError::CycleDetected(vec![0, 1])]
        );
    }

    #[test]
    fn test_empty_graph_warns() {
        let warnings = StructuralValidation.validate(&Graph::new()).unwrap();
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_expression_warnings() {
        let mut graph = Graph::new();
        let mut params = Parameters::new();
        params.insert("unused".to_string(), Expression::constant(1.0));
        params.insert(
            OUTPUT_PARAMETER.to_string(),
            Expression::map(
                Expression::input(1),
                Expression::lambda(vec!["x"], Expression::variable("x")),
            ),
        );
        graph.add_node(params).unwrap();

        let warnings = ExpressionValidation.validate(&graph).unwrap();
        let messages: Vec<&str> = warnings.iter().map(|w| w.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "Parameter 'unused' of node 0 is never read",
                "Node 0 reads input 1 which is not connected",
            ]
        );
    }

    #[test]
    fn test_type_stage_reports_stored_failures() {
        let mut graph = Graph::new();
        graph.add_output_node(Expression::constant(1.0)).unwrap();
        graph
            .add_output_node(Expression::primitive("not", vec![Expression::input(0)]))
            .unwrap();
        graph.add_edge(1, 0, 0).unwrap_err();
        assert!(TypeValidation.validate(&graph).unwrap().is_empty());

        let pass = graph.add_output_node(Expression::input(0)).unwrap();
        graph.add_edge(1, 0, pass).unwrap();
        // The pass-through node is still generic.
        assert_eq!(TypeValidation.validate(&graph).unwrap().len(), 1);

        graph.add_edge(pass, 0, 0).unwrap();
        let errors = TypeValidation.validate(&graph).unwrap_err();
        assert!(matches!(&errors[0], ValidationError::Type(e) if e.node == 1 && e.origin == pass));
    }
}
