//! Execution engine implementation.
//!
//! Evaluation is split in three steps so that the expensive middle one can
//! run away from the graph owner:
//! - [`ExecutionEngine::plan`] snapshots what a node needs (on the owner)
//! - [`EvaluationPlan::run`] evaluates the snapshot (on any thread)
//! - [`ExecutionEngine::commit`] publishes the results that are still current

use crate::core::error::{FlowResult, GraphResult, NodeIndex};
use crate::core::types::Value;
use crate::execution::cache::{CacheKey, CacheStats, SharedCache, ValueCache, DEFAULT_CAPACITY};
use crate::expr::ast::OUTPUT_PARAMETER;
use crate::expr::eval::Evaluator;
use crate::graph::structure::{Graph, Parameters};
use crate::graph::topology::TopologyAnalyzer;
use crate::primitives::PrimitiveRegistry;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Execution options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionOptions {
    /// Whether to evaluate independent nodes in parallel.
    pub parallel: bool,
    /// Whether to use caching.
    pub use_cache: bool,
    /// Maximum number of cached values.
    pub cache_capacity: usize,
    /// Whether the session evaluates on a background worker thread.
    pub background_worker: bool,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            parallel: true,
            use_cache: true,
            cache_capacity: DEFAULT_CAPACITY,
            background_worker: false,
        }
    }
}

impl ExecutionOptions {
    /// Create a new options builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable/disable parallel execution.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Enable/disable caching.
    pub fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    /// Set the cache capacity (entries).
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Enable/disable the background worker.
    pub fn with_background_worker(mut self, enabled: bool) -> Self {
        self.background_worker = enabled;
        self
    }

    /// Parse options from TOML. Missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> FlowResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load options from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> FlowResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let options = Self::from_toml_str(&text)?;
        log::info!("Loaded execution options from {}", path.as_ref().display());
        Ok(options)
    }
}

/// Immutable copy of what evaluating one node requires.
#[derive(Debug, Clone)]
pub struct NodeSnapshot {
    /// Position of the node when the snapshot was taken.
    pub index: NodeIndex,
    /// Revision of the node when the snapshot was taken.
    pub revision: u64,
    /// Parameter expressions (shared, not copied).
    pub params: Parameters,
    /// Target of each input slot.
    pub inputs: Vec<Option<NodeIndex>>,
}

impl NodeSnapshot {
    /// Snapshot node `index` of `graph`.
    pub fn capture(graph: &Graph, index: NodeIndex) -> GraphResult<Self> {
        let node = graph.node(index)?;
        Ok(Self {
            index,
            revision: node.revision(),
            params: node.params().clone(),
            inputs: node.inputs().iter().map(|slot| slot.map(|e| e.target)).collect(),
        })
    }

    /// Evaluate the node given the values of its input slots.
    ///
    /// Non-output parameters are evaluated in order and bound by name, so
    /// the output (and later parameters) can read them.
    pub fn evaluate(&self, registry: &PrimitiveRegistry, inputs: Vec<Option<Value>>) -> Value {
        let mut evaluator = Evaluator::for_inputs(registry, inputs);
        for (name, expression) in self.params.iter().filter(|(name, _)| name.as_str() != OUTPUT_PARAMETER) {
            let value = evaluator.evaluate(expression);
            evaluator.bind(name.clone(), value);
        }
        match self.params.get(OUTPUT_PARAMETER) {
            Some(output) => evaluator.evaluate(output),
            None => Value::error(format!("node {} has no output", self.index)),
        }
    }

    fn input_values(&self, values: &HashMap<NodeIndex, Value>) -> Vec<Option<Value>> {
        self.inputs
            .iter()
            .map(|slot| slot.and_then(|target| values.get(&target).cloned()))
            .collect()
    }
}

/// A value computed by a plan, tagged with the revision it belongs to.
#[derive(Debug, Clone)]
pub struct ComputedValue {
    pub index: NodeIndex,
    pub revision: u64,
    pub value: Value,
    pub elapsed: Duration,
}

/// Result of running an [`EvaluationPlan`].
#[derive(Debug, Clone)]
pub struct EvaluationOutcome {
    /// The node the plan was made for.
    pub target: NodeIndex,
    /// Revision of the target when the plan was made.
    pub revision: u64,
    /// Value of the target.
    pub value: Value,
    /// Every value computed along the way, target included.
    pub computed: Vec<ComputedValue>,
}

/// Everything needed to evaluate one node, detached from the graph.
#[derive(Debug, Clone)]
pub struct EvaluationPlan {
    /// The node to evaluate.
    pub target: NodeIndex,
    /// Revision of the target when planned.
    pub revision: u64,
    /// Nodes to evaluate, dependencies first.
    pub steps: Vec<NodeSnapshot>,
    /// Values already available (cached) for nodes the steps read.
    pub published: HashMap<NodeIndex, Value>,
    registry: Arc<PrimitiveRegistry>,
}

impl EvaluationPlan {
    /// Check if the target is already available.
    pub fn is_resolved(&self) -> bool {
        self.steps.is_empty()
    }

    /// Evaluate every step in order.
    pub fn run(&self) -> EvaluationOutcome {
        let mut values = self.published.clone();
        let mut computed = Vec::with_capacity(self.steps.len());

        for step in &self.steps {
            let start = Instant::now();
            let value = step.evaluate(&self.registry, step.input_values(&values));
            computed.push(ComputedValue {
                index: step.index,
                revision: step.revision,
                value: value.clone(),
                elapsed: start.elapsed(),
            });
            values.insert(step.index, value);
        }

        let value = values
            .remove(&self.target)
            .unwrap_or_else(|| Value::error(format!("node {} was not evaluated", self.target)));
        EvaluationOutcome {
            target: self.target,
            revision: self.revision,
            value,
            computed,
        }
    }
}

/// The execution engine.
pub struct ExecutionEngine {
    /// Value cache.
    cache: SharedCache,
    /// Execution options.
    options: ExecutionOptions,
}

impl ExecutionEngine {
    /// Create a new execution engine.
    pub fn new(options: ExecutionOptions) -> Self {
        Self {
            cache: Arc::new(ValueCache::new(options.cache_capacity)),
            options,
        }
    }

    /// Create with a shared cache.
    pub fn with_cache(cache: SharedCache, options: ExecutionOptions) -> Self {
        Self { cache, options }
    }

    /// The options in effect.
    pub fn options(&self) -> &ExecutionOptions {
        &self.options
    }

    /// The value cache.
    pub fn cache(&self) -> &SharedCache {
        &self.cache
    }

    /// Cached value of a node at its current revision.
    pub fn cached(&self, graph: &Graph, index: NodeIndex) -> Option<Value> {
        if !self.options.use_cache {
            return None;
        }
        let revision = graph.node(index).ok()?.revision();
        self.cache.get(&CacheKey::new(index, revision))
    }

    /// Snapshot what evaluating node `index` requires.
    ///
    /// Walks upstream from the target and stops at nodes whose current
    /// value is cached.
    pub fn plan(&self, graph: &Graph, index: NodeIndex) -> GraphResult<EvaluationPlan> {
        let revision = graph.revision_of(index)?;
        let analyzer = TopologyAnalyzer::new(graph);
        let mut published = HashMap::new();
        let mut needed = HashSet::new();
        let mut queue = VecDeque::from([index]);

        while let Some(node) = queue.pop_front() {
            if needed.contains(&node) || published.contains_key(&node) {
                continue;
            }
            if let Some(value) = self.cached(graph, node) {
                published.insert(node, value);
                continue;
            }
            needed.insert(node);
            queue.extend(analyzer.dependencies_of(node).iter().copied());
        }

        let order = analyzer.topological_sort().unwrap_or_default();
        let steps = order
            .into_iter()
            .filter(|node| needed.contains(node))
            .map(|node| NodeSnapshot::capture(graph, node))
            .collect::<GraphResult<Vec<_>>>()?;

        log::debug!(
            "Planned node {}: {} step(s), {} cached input(s)",
            index,
            steps.len(),
            published.len()
        );
        Ok(EvaluationPlan {
            target: index,
            revision,
            steps,
            published,
            registry: graph.registry().clone(),
        })
    }

    /// Store the computed values that are still current.
    ///
    /// A value is current when its node still carries the revision it was
    /// computed at. Returns the number of values stored.
    pub fn commit(&self, graph: &Graph, outcome: &EvaluationOutcome) -> usize {
        let mut stored = 0;
        for computed in &outcome.computed {
            let current = graph.revision_of(computed.index).ok();
            if current != Some(computed.revision) {
                log::warn!(
                    "Discarding stale value of node {} (revision {}, now {:?})",
                    computed.index,
                    computed.revision,
                    current
                );
                continue;
            }
            if self.options.use_cache {
                self.cache.put(
                    CacheKey::new(computed.index, computed.revision),
                    computed.value.clone(),
                    computed.elapsed,
                );
            }
            stored += 1;
        }
        stored
    }

    /// Evaluate node `index` synchronously.
    pub fn evaluate(&self, graph: &Graph, index: NodeIndex) -> GraphResult<Value> {
        let plan = self.plan(graph, index)?;
        let outcome = plan.run();
        self.commit(graph, &outcome);
        Ok(outcome.value)
    }

    /// Evaluate every node, batch by batch.
    ///
    /// Nodes of one batch do not depend on each other and run in parallel
    /// when enabled. Returns the values in node order.
    pub fn evaluate_all(&self, graph: &Graph) -> FlowResult<Vec<Value>> {
        let start = Instant::now();
        let batches = TopologyAnalyzer::new(graph).parallel_batches()?;
        let registry = graph.registry();
        let mut values: HashMap<NodeIndex, Value> = HashMap::with_capacity(graph.node_count());

        for batch in &batches {
            let snapshots = batch
                .iter()
                .map(|&node| NodeSnapshot::capture(graph, node))
                .collect::<GraphResult<Vec<_>>>()?;

            let evaluate_one = |snapshot: &NodeSnapshot| -> (NodeIndex, Value) {
                let key = CacheKey::new(snapshot.index, snapshot.revision);
                if self.options.use_cache {
                    if let Some(value) = self.cache.get(&key) {
                        return (snapshot.index, value);
                    }
                }
                let started = Instant::now();
                let value = snapshot.evaluate(registry, snapshot.input_values(&values));
                if self.options.use_cache {
                    self.cache.put(key, value.clone(), started.elapsed());
                }
                (snapshot.index, value)
            };

            let results: Vec<(NodeIndex, Value)> = if self.options.parallel {
                snapshots.par_iter().map(evaluate_one).collect()
            } else {
                snapshots.iter().map(evaluate_one).collect()
            };
            values.extend(results);
        }

        log::info!(
            "Evaluated {} node(s) in {} batch(es) in {:?}",
            graph.node_count(),
            batches.len(),
            start.elapsed()
        );
        Ok((0..graph.node_count())
            .map(|node| {
                values
                    .remove(&node)
                    .unwrap_or_else(|| Value::error(format!("node {} was not evaluated", node)))
            })
            .collect())
    }

    /// Clear the value cache.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Get cache statistics.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

impl Default for ExecutionEngine {
    fn default() -> Self {
        Self::new(ExecutionOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::ast::Expression;

    /// Node0 = 2, Node1 = 3, Node2 = add(in0, in1) reading both.
    fn sum_graph() -> Graph {
        let mut graph = Graph::new();
        graph.add_output_node(Expression::constant(2.0)).unwrap();
        graph.add_output_node(Expression::constant(3.0)).unwrap();
        graph
            .add_output_node(Expression::apply(
                Expression::primitive_ref("add"),
                vec![Expression::input(0), Expression::input(1)],
            ))
            .unwrap();
        graph.add_edge(2, 0, 0).unwrap();
        graph.add_edge(2, 1, 1).unwrap();
        graph
    }

    #[test]
    fn test_evaluate_sum() {
        let engine = ExecutionEngine::default();
        let graph = sum_graph();
        assert_eq!(engine.evaluate(&graph, 2).unwrap(), Value::Number(5.0));
    }

    #[test]
    fn test_evaluate_after_upstream_change() {
        let engine = ExecutionEngine::default();
        let mut graph = sum_graph();
        engine.evaluate(&graph, 2).unwrap();

        graph
            .set_node_expression(0, OUTPUT_PARAMETER, Expression::constant(Value::string("x")))
            .unwrap();
        assert_eq!(
            engine.evaluate(&graph, 2).unwrap(),
            Value::error("type mismatch: expected Number, found String")
        );
    }

    #[test]
    fn test_plan_stops_at_cached_values() {
        let engine = ExecutionEngine::default();
        let mut graph = sum_graph();
        engine.evaluate(&graph, 2).unwrap();
        assert!(engine.plan(&graph, 2).unwrap().is_resolved());

        graph
            .set_node_expression(1, OUTPUT_PARAMETER, Expression::constant(10.0))
            .unwrap();
        let plan = engine.plan(&graph, 2).unwrap();
        let steps: Vec<NodeIndex> = plan.steps.iter().map(|s| s.index).collect();
        assert_eq!(steps, vec![1, 2]);
        assert_eq!(plan.published.get(&0), Some(&Value::Number(2.0)));
        assert_eq!(plan.run().value, Value::Number(12.0));
    }

    #[test]
    fn test_commit_discards_stale_values() {
        let engine = ExecutionEngine::default();
        let mut graph = sum_graph();
        let outcome = engine.plan(&graph, 2).unwrap().run();

        graph
            .set_node_expression(1, OUTPUT_PARAMETER, Expression::constant(10.0))
            .unwrap();
        // Node 0 is unchanged; nodes 1 and 2 moved on.
        assert_eq!(engine.commit(&graph, &outcome), 1);
        assert_eq!(engine.evaluate(&graph, 2).unwrap(), Value::Number(12.0));
    }

    #[test]
    fn test_parameters_evaluated_before_output() {
        let engine = ExecutionEngine::new(ExecutionOptions::new().with_cache(false));
        let mut graph = Graph::new();
        let mut params = Parameters::new();
        params.insert("base".to_string(), Expression::constant(4.0));
        params.insert(
            "scaled".to_string(),
            Expression::primitive("mul", vec![Expression::variable("base"), Expression::constant(2.0)]),
        );
        params.insert(
            OUTPUT_PARAMETER.to_string(),
            Expression::primitive("add", vec![Expression::variable("scaled"), Expression::constant(1.0)]),
        );
        let node = graph.add_node(params).unwrap();
        assert_eq!(engine.evaluate(&graph, node).unwrap(), Value::Number(9.0));
        assert!(engine.cache().is_empty());
    }

    #[test]
    fn test_evaluate_all_parallel_and_sequential() {
        let graph = sum_graph();
        let expected = vec![Value::Number(2.0), Value::Number(3.0), Value::Number(5.0)];

        let parallel = ExecutionEngine::default();
        assert_eq!(parallel.evaluate_all(&graph).unwrap(), expected);
        // Second pass is served from the cache.
        assert_eq!(parallel.evaluate_all(&graph).unwrap(), expected);
        assert_eq!(parallel.cache_stats().hits, 3);

        let sequential = ExecutionEngine::new(ExecutionOptions::new().with_parallel(false));
        assert_eq!(sequential.evaluate_all(&graph).unwrap(), expected);
    }

    #[test]
    fn test_unconnected_input_is_an_error_value() {
        let engine = ExecutionEngine::default();
        let mut graph = Graph::new();
        let node = graph
            .add_output_node(Expression::primitive("neg", vec![Expression::input(0)]))
            .unwrap();
        assert_eq!(
            engine.evaluate(&graph, node).unwrap(),
            Value::error("unbound variable 'in0'")
        );
    }

    #[test]
    fn test_options_from_toml() {
        let options = ExecutionOptions::from_toml_str("parallel = false\ncache_capacity = 16\n").unwrap();
        assert_eq!(
            options,
            ExecutionOptions::new().with_parallel(false).with_cache_capacity(16)
        );
        assert!(ExecutionOptions::from_toml_str("parallel = 3").is_err());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exec.toml");
        std::fs::write(&path, "background_worker = true\n").unwrap();
        assert!(ExecutionOptions::load(&path).unwrap().background_worker);
    }
}
