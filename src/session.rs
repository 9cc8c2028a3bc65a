//! The interactive editing session.
//!
//! [`EditorSession`] is the only writer of its graph. It forwards edits and
//! queries to the [`Graph`], evaluates through the [`ExecutionEngine`] and
//! optionally hands evaluations to a [`BackgroundEvaluator`] while edits
//! keep coming in. Background outcomes are checked against the current
//! revisions when polled; anything an edit has invalidated meanwhile is
//! dropped instead of cached.

use crate::core::error::{FlowResult, GraphResult, NodeIndex, ValidationReport};
use crate::core::types::Value;
use crate::execution::{
    BackgroundEvaluator, CacheStats, EvaluationOutcome, ExecutionEngine, ExecutionOptions,
};
use crate::expr::ast::Expression;
use crate::graph::{CursorPair, CursorValidity, Edge, Graph, Node, Parameters, RemovalPolicy};
use crate::primitives::PrimitiveRegistry;
use crate::typing::Type;
use crate::validation::ValidationPipeline;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Owner of a graph, its evaluation engine and its background worker.
pub struct EditorSession {
    graph: Graph,
    engine: ExecutionEngine,
    worker: Option<BackgroundEvaluator>,
}

impl EditorSession {
    /// Session over an empty graph with the built-in primitives.
    pub fn new() -> Self {
        Self::with_engine(Graph::new(), ExecutionEngine::default())
    }

    /// Session over an existing graph.
    ///
    /// The worker thread is started right away when the options ask for
    /// one; otherwise it is started on the first background request.
    pub fn with_options(graph: Graph, options: ExecutionOptions) -> FlowResult<Self> {
        let worker = if options.background_worker {
            Some(BackgroundEvaluator::spawn()?)
        } else {
            None
        };
        Ok(Self {
            graph,
            engine: ExecutionEngine::new(options),
            worker,
        })
    }

    /// Session over an existing graph and engine.
    pub fn with_engine(graph: Graph, engine: ExecutionEngine) -> Self {
        Self {
            graph,
            engine,
            worker: None,
        }
    }

    /// Load a graph file into a new session.
    pub fn open(
        path: impl AsRef<Path>,
        registry: Arc<PrimitiveRegistry>,
        options: ExecutionOptions,
    ) -> FlowResult<Self> {
        let graph = Graph::load(path, registry)?;
        Self::with_options(graph, options)
    }

    /// Save the graph.
    pub fn save(&self, path: impl AsRef<Path>) -> FlowResult<()> {
        self.graph.save(path)
    }

    /// The graph, read-only.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// The evaluation engine.
    pub fn engine(&self) -> &ExecutionEngine {
        &self.engine
    }

    // ========================================================================
    // Edits
    // ========================================================================

    pub fn add_node(&mut self, params: Parameters) -> GraphResult<NodeIndex> {
        self.graph.add_node(params)
    }

    pub fn add_output_node(&mut self, output: Arc<Expression>) -> GraphResult<NodeIndex> {
        self.graph.add_output_node(output)
    }

    pub fn set_label(&mut self, index: NodeIndex, label: Option<String>) -> GraphResult<()> {
        self.graph.set_label(index, label)
    }

    pub fn remove_node(&mut self, index: NodeIndex, policy: RemovalPolicy) -> GraphResult<Node> {
        self.graph.remove_node(index, policy)
    }

    pub fn clone_subgraph(&mut self, root: NodeIndex) -> GraphResult<Vec<NodeIndex>> {
        self.graph.clone_subgraph(root)
    }

    pub fn set_node_expression(
        &mut self,
        index: NodeIndex,
        name: impl Into<String>,
        expression: Arc<Expression>,
    ) -> GraphResult<()> {
        self.graph.set_node_expression(index, name, expression)
    }

    pub fn remove_node_expression(
        &mut self,
        index: NodeIndex,
        name: &str,
    ) -> GraphResult<Arc<Expression>> {
        self.graph.remove_node_expression(index, name)
    }

    pub fn add_edge(&mut self, from: NodeIndex, slot: usize, to: NodeIndex) -> GraphResult<()> {
        self.graph.add_edge(from, slot, to)
    }

    pub fn disconnect(&mut self, from: NodeIndex, slot: usize) -> GraphResult<Option<Edge>> {
        self.graph.disconnect(from, slot)
    }

    /// Drop every node and cached value.
    pub fn clear(&mut self) {
        self.graph.clear();
        self.engine.clear_cache();
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn type_of(&self, index: NodeIndex) -> GraphResult<Type> {
        self.graph.type_of(index)
    }

    pub fn edges_of(&self, index: NodeIndex) -> GraphResult<&[Option<Edge>]> {
        self.graph.edges_of(index)
    }

    pub fn cursor_validity(&self, cursor: &CursorPair) -> CursorValidity {
        self.graph.cursor_validity(cursor)
    }

    /// Run the default validation pipeline.
    pub fn validate(&self) -> ValidationReport {
        ValidationPipeline::default_pipeline().validate(&self.graph)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.engine.cache_stats()
    }

    // ========================================================================
    // Evaluation
    // ========================================================================

    /// Value of node `index`, computed now.
    pub fn evaluate(&self, index: NodeIndex) -> GraphResult<Value> {
        self.engine.evaluate(&self.graph, index)
    }

    /// Values of every node, in node order.
    pub fn evaluate_all(&self) -> FlowResult<Vec<Value>> {
        self.engine.evaluate_all(&self.graph)
    }

    /// Queue node `index` for evaluation on the worker thread.
    pub fn request_background(&mut self, index: NodeIndex) -> FlowResult<()> {
        let plan = self.engine.plan(&self.graph, index)?;
        if self.worker.is_none() {
            self.worker = Some(BackgroundEvaluator::spawn()?);
        }
        let submitted = self.worker.as_ref().is_some_and(|worker| worker.submit(plan));
        if !submitted {
            log::warn!("Background evaluator unavailable; node {} not queued", index);
        }
        Ok(())
    }

    /// Number of background evaluations not yet polled.
    pub fn pending_background(&self) -> usize {
        self.worker.as_ref().map_or(0, BackgroundEvaluator::pending)
    }

    /// Collect finished background evaluations without blocking.
    ///
    /// Returns the outcomes whose target is still at the planned revision.
    pub fn poll_background(&mut self) -> Vec<EvaluationOutcome> {
        let outcomes = match &self.worker {
            Some(worker) => worker.drain(),
            None => return Vec::new(),
        };
        outcomes
            .into_iter()
            .filter_map(|outcome| self.accept(outcome))
            .collect()
    }

    /// Wait up to `timeout` for one background evaluation.
    ///
    /// A finished but stale outcome is discarded and reported as `None`.
    pub fn wait_background(&mut self, timeout: Duration) -> Option<EvaluationOutcome> {
        let outcome = self.worker.as_ref()?.recv_timeout(timeout)?;
        self.accept(outcome)
    }

    fn accept(&self, outcome: EvaluationOutcome) -> Option<EvaluationOutcome> {
        self.engine.commit(&self.graph, &outcome);
        let current = self.graph.revision_of(outcome.target).ok();
        if current == Some(outcome.revision) {
            Some(outcome)
        } else {
            log::warn!(
                "Discarding stale background result for node {} (revision {}, now {:?})",
                outcome.target,
                outcome.revision,
                current
            );
            None
        }
    }
}

impl Default for EditorSession {
    fn default() -> Self {
        Self::new()
    }
}
