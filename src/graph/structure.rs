//! Graph structure and node management.
//!
//! The [`Graph`] owns an ordered sequence of nodes. Each node carries named
//! parameter expressions (one of them the output) and an ordered list of
//! input slots, each optionally connected to another node by index.
//!
//! Every edit either commits in full or is rejected with the graph left
//! untouched. An edit is rejected when it breaks the structure (range,
//! cycles) or when the mutated node itself no longer types. Nodes further
//! downstream are re-typed afterwards and keep their failure as state.

use crate::core::error::{GraphError, GraphResult, NodeId, NodeIndex, NodeTypeError};
use crate::expr::ast::{input_slot, Expression, OUTPUT_PARAMETER};
use crate::graph::cursor::{CursorPair, CursorValidity};
use crate::graph::edge::{Edge, RemovalPolicy};
use crate::graph::topology::TopologyAnalyzer;
use crate::primitives::PrimitiveRegistry;
use crate::typing::infer::{infer_node, InputType};
use crate::typing::ty::Type;
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Named parameter expressions of a node.
pub type Parameters = IndexMap<String, Arc<Expression>>;

/// A node of the graph.
///
/// Nodes are only mutated through [`Graph`] edits, which keep the stored
/// output type and revision consistent with the rest of the graph.
#[derive(Debug, Clone)]
pub struct Node {
    id: NodeId,
    label: Option<String>,
    params: Parameters,
    inputs: Vec<Option<Edge>>,
    output_type: Result<Type, NodeTypeError>,
    revision: u64,
}

impl Node {
    /// Stable identity of the node.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Optional display label.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Get the display name (label or short identifier).
    pub fn display_name(&self) -> String {
        self.label
            .clone()
            .unwrap_or_else(|| format!("node {}", self.id))
    }

    /// All parameter expressions, in insertion order.
    pub fn params(&self) -> &Parameters {
        &self.params
    }

    /// The expression of parameter `name`.
    pub fn expression(&self, name: &str) -> Option<&Arc<Expression>> {
        self.params.get(name)
    }

    /// The output expression.
    pub fn output(&self) -> Option<&Arc<Expression>> {
        self.params.get(OUTPUT_PARAMETER)
    }

    /// Input slots; `None` marks an unconnected slot.
    pub fn inputs(&self) -> &[Option<Edge>] {
        &self.inputs
    }

    /// The edge in `slot`, if connected.
    pub fn input(&self, slot: usize) -> Option<Edge> {
        self.inputs.get(slot).copied().flatten()
    }

    /// Number of slots, connected or not.
    pub fn slot_count(&self) -> usize {
        self.inputs.len()
    }

    /// The inferred output type, or the failure that prevented it.
    pub fn output_type(&self) -> Result<&Type, &NodeTypeError> {
        self.output_type.as_ref()
    }

    /// Revision stamp; changes whenever the node or anything upstream changes.
    pub fn revision(&self) -> u64 {
        self.revision
    }
}

/// Raw node content used to rebuild a graph from storage.
#[derive(Debug, Clone)]
pub(crate) struct NodeParts {
    pub label: Option<String>,
    pub params: Parameters,
    pub inputs: Vec<Option<Edge>>,
}

/// The dataflow graph.
#[derive(Debug, Clone)]
pub struct Graph {
    nodes: Vec<Node>,
    registry: Arc<PrimitiveRegistry>,
    next_revision: u64,
    /// Optional graph name, kept by serialization.
    pub name: Option<String>,
}

impl Graph {
    /// Create an empty graph using the built-in primitives.
    pub fn new() -> Self {
        Self::with_registry(Arc::new(PrimitiveRegistry::with_builtins()))
    }

    /// Create an empty graph typing against `registry`.
    pub fn with_registry(registry: Arc<PrimitiveRegistry>) -> Self {
        Self {
            nodes: Vec::new(),
            registry,
            next_revision: 0,
            name: None,
        }
    }

    /// Set the graph name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The primitive registry used for typing.
    pub fn registry(&self) -> &Arc<PrimitiveRegistry> {
        &self.registry
    }

    // ========================================================================
    // Node Operations
    // ========================================================================

    /// Append a node with the given parameters and no inputs.
    ///
    /// `params` must contain the output parameter and may not use input
    /// variable names. The node must type on its own.
    pub fn add_node(&mut self, params: Parameters) -> GraphResult<NodeIndex> {
        check_parameter_names(&params)?;
        let index = self.nodes.len();
        let ty = self.infer(index, &params, &[])?;
        let revision = self.bump();
        self.nodes.push(Node {
            id: NodeId::new(),
            label: None,
            params,
            inputs: Vec::new(),
            output_type: Ok(ty),
            revision,
        });
        log::debug!("Added node {}", index);
        Ok(index)
    }

    /// Append a node whose only parameter is its output expression.
    pub fn add_output_node(&mut self, output: Arc<Expression>) -> GraphResult<NodeIndex> {
        let mut params = Parameters::new();
        params.insert(OUTPUT_PARAMETER.to_string(), output);
        self.add_node(params)
    }

    /// Set or clear the display label of a node.
    pub fn set_label(&mut self, index: NodeIndex, label: Option<String>) -> GraphResult<()> {
        self.check_index(index)?;
        self.nodes[index].label = label;
        Ok(())
    }

    /// Remove a node, compacting the sequence.
    ///
    /// Every edge is rewritten so that it keeps pointing at the same node.
    /// With [`RemovalPolicy::Reject`] a node that still has consumers is
    /// kept; with [`RemovalPolicy::Detach`] the consuming slots are emptied.
    pub fn remove_node(&mut self, index: NodeIndex, policy: RemovalPolicy) -> GraphResult<Node> {
        self.check_index(index)?;
        let consumers = TopologyAnalyzer::new(self).consumers_of(index).to_vec();
        if !consumers.is_empty() && policy == RemovalPolicy::Reject {
            return Err(GraphError::NodeHasConsumers {
                node: index,
                consumers,
            });
        }

        let removed = self.nodes.remove(index);
        for node in &mut self.nodes {
            for slot in node.inputs.iter_mut() {
                *slot = slot.and_then(|edge| edge.after_removal(index));
            }
            trim_slots(&mut node.inputs);
        }

        // Stored failures name node positions, so every node is re-typed.
        self.retype_all();
        let detached: Vec<NodeIndex> = consumers
            .into_iter()
            .map(|c| if c > index { c - 1 } else { c })
            .collect();
        for node in self.affected_by(&detached) {
            self.nodes[node].revision = self.bump();
        }

        log::debug!(
            "Removed node {} ({} consumer(s) detached)",
            index,
            detached.len()
        );
        Ok(removed)
    }

    /// Append a copy of `root` and everything it depends on.
    ///
    /// Copies get fresh identities and deep-copied expressions, and their
    /// edges point at the corresponding copies. Returns the indices of the
    /// new nodes, the copy of `root` first.
    pub fn clone_subgraph(&mut self, root: NodeIndex) -> GraphResult<Vec<NodeIndex>> {
        self.check_index(root)?;
        let closure = TopologyAnalyzer::new(self).upstream_closure(root);
        let base = self.nodes.len();
        let position: HashMap<NodeIndex, NodeIndex> = closure
            .iter()
            .enumerate()
            .map(|(offset, &old)| (old, base + offset))
            .collect();

        let copies: Vec<Node> = closure
            .iter()
            .map(|&old| {
                let source = &self.nodes[old];
                Node {
                    id: NodeId::new(),
                    label: source.label.clone(),
                    params: source
                        .params
                        .iter()
                        .map(|(name, expr)| (name.clone(), expr.deep_clone()))
                        .collect(),
                    inputs: source
                        .inputs
                        .iter()
                        .map(|slot| slot.and_then(|e| position.get(&e.target).map(|&t| Edge::new(t))))
                        .collect(),
                    output_type: source.output_type.clone(),
                    revision: 0,
                }
            })
            .collect();
        self.nodes.extend(copies);

        let added: Vec<NodeIndex> = (base..self.nodes.len()).collect();
        for node in self.affected_by(&added) {
            self.retype(node);
            self.nodes[node].revision = self.bump();
        }

        log::debug!("Cloned subgraph of node {} ({} node(s))", root, added.len());
        Ok(added)
    }

    // ========================================================================
    // Expression Operations
    // ========================================================================

    /// Set (insert or replace) parameter `name` of a node.
    pub fn set_node_expression(
        &mut self,
        index: NodeIndex,
        name: impl Into<String>,
        expression: Arc<Expression>,
    ) -> GraphResult<()> {
        self.check_index(index)?;
        let name = name.into();
        if input_slot(&name).is_some() {
            return Err(GraphError::InvalidParameterName(name));
        }

        let mut params = self.nodes[index].params.clone();
        params.insert(name.clone(), expression);
        let ty = self.infer(index, &params, &self.nodes[index].inputs)?;

        let node = &mut self.nodes[index];
        node.params = params;
        node.output_type = Ok(ty);
        self.invalidate(&[index]);
        log::debug!("Set parameter '{}' of node {}", name, index);
        Ok(())
    }

    /// Remove parameter `name` of a node; the output cannot be removed.
    pub fn remove_node_expression(
        &mut self,
        index: NodeIndex,
        name: &str,
    ) -> GraphResult<Arc<Expression>> {
        self.check_index(index)?;
        if name == OUTPUT_PARAMETER {
            return Err(GraphError::MissingOutput(name.to_string()));
        }

        let mut params = self.nodes[index].params.clone();
        let removed = params
            .shift_remove(name)
            .ok_or_else(|| GraphError::ParameterNotFound {
                node: index,
                name: name.to_string(),
            })?;
        let ty = self.infer(index, &params, &self.nodes[index].inputs)?;

        let node = &mut self.nodes[index];
        node.params = params;
        node.output_type = Ok(ty);
        self.invalidate(&[index]);
        log::debug!("Removed parameter '{}' of node {}", name, index);
        Ok(removed)
    }

    // ========================================================================
    // Edge Operations
    // ========================================================================

    /// Connect input `slot` of node `from` to the output of node `to`.
    ///
    /// `slot` may replace an existing slot or append one right after the
    /// last. The edit is rejected if it would close a cycle or if `from`
    /// no longer types with the new input.
    pub fn add_edge(&mut self, from: NodeIndex, slot: usize, to: NodeIndex) -> GraphResult<()> {
        self.check_index(from)?;
        self.check_index(to)?;
        let len = self.nodes[from].inputs.len();
        if slot > len {
            return Err(GraphError::SlotOutOfRange {
                node: from,
                slot,
                len,
            });
        }
        if TopologyAnalyzer::new(self).depends_on(to, from) {
            return Err(GraphError::CycleDetected { from, to });
        }

        let mut inputs = self.nodes[from].inputs.clone();
        if slot == len {
            inputs.push(Some(Edge::new(to)));
        } else {
            inputs[slot] = Some(Edge::new(to));
        }
        let ty = self.infer(from, &self.nodes[from].params, &inputs)?;

        let node = &mut self.nodes[from];
        node.inputs = inputs;
        node.output_type = Ok(ty);
        self.invalidate(&[from]);
        log::debug!("Connected node {} slot {} to node {}", from, slot, to);
        Ok(())
    }

    /// Empty input `slot` of node `from`.
    ///
    /// Trailing empty slots are dropped. The node may fail to type
    /// afterwards; the failure is kept as its state.
    pub fn disconnect(&mut self, from: NodeIndex, slot: usize) -> GraphResult<Option<Edge>> {
        self.check_index(from)?;
        let len = self.nodes[from].inputs.len();
        if slot >= len {
            return Err(GraphError::SlotOutOfRange {
                node: from,
                slot,
                len,
            });
        }

        let node = &mut self.nodes[from];
        let removed = node.inputs[slot].take();
        trim_slots(&mut node.inputs);
        if removed.is_some() {
            self.invalidate(&[from]);
            log::debug!("Disconnected node {} slot {}", from, slot);
        }
        Ok(removed)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Get a node by index.
    pub fn node(&self, index: NodeIndex) -> GraphResult<&Node> {
        self.nodes.get(index).ok_or(GraphError::NodeOutOfRange {
            index,
            len: self.nodes.len(),
        })
    }

    /// All nodes, in order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Input slots of a node.
    pub fn edges_of(&self, index: NodeIndex) -> GraphResult<&[Option<Edge>]> {
        Ok(self.node(index)?.inputs())
    }

    /// Output type of a node.
    ///
    /// A node that failed to type reports its stored failure.
    pub fn type_of(&self, index: NodeIndex) -> GraphResult<Type> {
        self.node(index)?
            .output_type
            .clone()
            .map_err(GraphError::from)
    }

    /// Revision stamp of a node.
    pub fn revision_of(&self, index: NodeIndex) -> GraphResult<u64> {
        Ok(self.node(index)?.revision)
    }

    /// Nodes reading directly from `index`.
    pub fn consumers_of(&self, index: NodeIndex) -> GraphResult<Vec<NodeIndex>> {
        self.check_index(index)?;
        Ok(TopologyAnalyzer::new(self).consumers_of(index).to_vec())
    }

    /// Every node depending on `index`.
    pub fn downstream_of(&self, index: NodeIndex) -> GraphResult<Vec<NodeIndex>> {
        self.check_index(index)?;
        Ok(TopologyAnalyzer::new(self).downstream_of(index))
    }

    /// Every node `index` depends on.
    pub fn upstream_of(&self, index: NodeIndex) -> GraphResult<Vec<NodeIndex>> {
        self.check_index(index)?;
        Ok(TopologyAnalyzer::new(self).upstream_of(index))
    }

    /// Current index of the node with identity `id`.
    pub fn index_of(&self, id: NodeId) -> Option<NodeIndex> {
        self.nodes.iter().position(|node| node.id == id)
    }

    /// Check both halves of a cursor pair against the current graph.
    pub fn cursor_validity(&self, cursor: &CursorPair) -> CursorValidity {
        cursor.validity(self)
    }

    /// Remove all nodes.
    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Rebuild a graph from raw parts whose structure was already checked.
    pub(crate) fn from_parts(
        name: Option<String>,
        registry: Arc<PrimitiveRegistry>,
        parts: Vec<NodeParts>,
    ) -> Self {
        let mut graph = Self::with_registry(registry);
        graph.name = name;
        for part in parts {
            let revision = graph.bump();
            graph.nodes.push(Node {
                id: NodeId::new(),
                label: part.label,
                params: part.params,
                inputs: part.inputs,
                output_type: Ok(Type::Generic(0)),
                revision,
            });
        }
        graph.retype_all();
        graph
    }

    fn check_index(&self, index: NodeIndex) -> GraphResult<()> {
        if index < self.nodes.len() {
            Ok(())
        } else {
            Err(GraphError::NodeOutOfRange {
                index,
                len: self.nodes.len(),
            })
        }
    }

    fn bump(&mut self) -> u64 {
        self.next_revision += 1;
        self.next_revision
    }

    fn input_types(&self, inputs: &[Option<Edge>]) -> Vec<InputType> {
        inputs
            .iter()
            .map(|slot| match slot {
                Some(edge) => InputType::connected(
                    edge.target,
                    self.nodes
                        .get(edge.target)
                        .and_then(|n| n.output_type.as_ref().ok().cloned()),
                ),
                None => InputType::default(),
            })
            .collect()
    }

    fn infer(
        &self,
        index: NodeIndex,
        params: &Parameters,
        inputs: &[Option<Edge>],
    ) -> Result<Type, NodeTypeError> {
        infer_node(&self.registry, index, params, &self.input_types(inputs))
    }

    /// Re-type a node from its current state, storing any failure.
    fn retype(&mut self, index: NodeIndex) {
        let node = &self.nodes[index];
        let result = self.infer(index, &node.params, &node.inputs);
        if let Err(error) = &result {
            log::warn!("{}", error);
        }
        self.nodes[index].output_type = result;
    }

    /// Re-type every node in dependency order.
    pub(crate) fn retype_all(&mut self) {
        for node in self.evaluation_order() {
            self.retype(node);
        }
    }

    /// `roots` and everything downstream of them, in dependency order.
    fn affected_by(&self, roots: &[NodeIndex]) -> Vec<NodeIndex> {
        let analyzer = TopologyAnalyzer::new(self);
        let mut affected: HashSet<NodeIndex> = roots.iter().copied().collect();
        for &root in roots {
            affected.extend(analyzer.downstream_of(root));
        }
        self.evaluation_order()
            .into_iter()
            .filter(|node| affected.contains(node))
            .collect()
    }

    /// Re-type and restamp `roots` and everything downstream.
    fn invalidate(&mut self, roots: &[NodeIndex]) {
        for node in self.affected_by(roots) {
            self.retype(node);
            self.nodes[node].revision = self.bump();
        }
    }

    fn evaluation_order(&self) -> Vec<NodeIndex> {
        match TopologyAnalyzer::new(self).topological_sort() {
            Ok(order) => order,
            Err(error) => {
                log::error!("Graph lost acyclicity: {}", error);
                (0..self.nodes.len()).collect()
            }
        }
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn check_parameter_names(params: &Parameters) -> GraphResult<()> {
    if !params.contains_key(OUTPUT_PARAMETER) {
        return Err(GraphError::MissingOutput(OUTPUT_PARAMETER.to_string()));
    }
    match params.keys().find(|name| input_slot(name).is_some()) {
        Some(name) => Err(GraphError::InvalidParameterName(name.clone())),
        None => Ok(()),
    }
}

fn trim_slots(inputs: &mut Vec<Option<Edge>>) {
    while matches!(inputs.last(), Some(None)) {
        inputs.pop();
    }
}
