//! Topological analysis and sorting of graphs.
//!
//! Provides algorithms for:
//! - Topological sorting (evaluation order)
//! - Parallel batch identification
//! - Reachability and dependency closures

use crate::core::error::{NodeIndex, ValidationError};
use crate::graph::structure::Graph;
use std::collections::{HashSet, VecDeque};

/// Analyzer for graph topology.
///
/// Works on a snapshot of the dependency lists, so it can also inspect
/// node sequences that have not been admitted into a [`Graph`] yet.
#[derive(Debug, Clone)]
pub struct TopologyAnalyzer {
    /// Distinct in-range targets read by each node, in slot order.
    dependencies: Vec<Vec<NodeIndex>>,
    /// Distinct nodes reading from each node, ascending.
    consumers: Vec<Vec<NodeIndex>>,
}

impl TopologyAnalyzer {
    /// Create a new analyzer for the given graph.
    pub fn new(graph: &Graph) -> Self {
        Self::from_dependencies(
            graph
                .nodes()
                .iter()
                .map(|node| node.inputs().iter().flatten().map(|edge| edge.target).collect())
                .collect(),
        )
    }

    /// Create an analyzer from the targets read by each node.
    ///
    /// Out-of-range targets are ignored.
    pub fn from_dependencies(raw: Vec<Vec<NodeIndex>>) -> Self {
        let count = raw.len();
        let mut dependencies = Vec::with_capacity(count);
        let mut consumers = vec![Vec::new(); count];

        for (node, targets) in raw.into_iter().enumerate() {
            let mut seen = HashSet::new();
            let targets: Vec<NodeIndex> = targets
                .into_iter()
                .filter(|&t| t < count && seen.insert(t))
                .collect();
            for &target in &targets {
                consumers[target].push(node);
            }
            dependencies.push(targets);
        }

        Self {
            dependencies,
            consumers,
        }
    }

    /// Number of nodes analyzed.
    pub fn node_count(&self) -> usize {
        self.dependencies.len()
    }

    /// Get the topological sort order (Kahn's algorithm).
    ///
    /// Dependencies come before their consumers; ties are broken by index.
    pub fn topological_sort(&self) -> Result<Vec<NodeIndex>, ValidationError> {
        let mut in_degree: Vec<usize> = self.dependencies.iter().map(Vec::len).collect();
        let mut queue: VecDeque<NodeIndex> = (0..self.node_count())
            .filter(|&node| in_degree[node] == 0)
            .collect();
        let mut result = Vec::with_capacity(self.node_count());

        while let Some(node) = queue.pop_front() {
            result.push(node);
            for &consumer in &self.consumers[node] {
                in_degree[consumer] -= 1;
                if in_degree[consumer] == 0 {
                    queue.push_back(consumer);
                }
            }
        }

        // If we haven't visited all nodes, there's a cycle
        if result.len() != self.node_count() {
            let remaining = (0..self.node_count())
                .filter(|&node| in_degree[node] > 0)
                .collect();
            return Err(ValidationError::CycleDetected(remaining));
        }

        Ok(result)
    }

    /// Check if the dependencies contain a cycle.
    pub fn has_cycle(&self) -> bool {
        self.topological_sort().is_err()
    }

    /// Group nodes into parallel evaluation batches.
    ///
    /// Nodes in the same batch do not depend on each other; every batch
    /// only depends on earlier batches.
    pub fn parallel_batches(&self) -> Result<Vec<Vec<NodeIndex>>, ValidationError> {
        let sorted = self.topological_sort()?;

        // Longest path from a source
        let mut depth = vec![0usize; self.node_count()];
        for &node in &sorted {
            depth[node] = self.dependencies[node]
                .iter()
                .map(|&dep| depth[dep] + 1)
                .max()
                .unwrap_or(0);
        }

        let batch_count = depth.iter().max().map_or(0, |d| d + 1);
        let mut batches = vec![Vec::new(); batch_count];
        for (node, d) in depth.into_iter().enumerate() {
            batches[d].push(node);
        }
        Ok(batches)
    }

    /// Check if `target` is reachable from `start` following edges
    /// (that is, whether `start` depends on `target`).
    pub fn depends_on(&self, start: NodeIndex, target: NodeIndex) -> bool {
        if start == target {
            return true;
        }
        self.bfs(start, &self.dependencies).contains(&target)
    }

    /// Every node `index` depends on, closest first.
    pub fn upstream_of(&self, index: NodeIndex) -> Vec<NodeIndex> {
        self.bfs(index, &self.dependencies)
    }

    /// Every node depending on `index`, closest first.
    pub fn downstream_of(&self, index: NodeIndex) -> Vec<NodeIndex> {
        self.bfs(index, &self.consumers)
    }

    /// `root` followed by every node it depends on, in breadth-first order.
    pub fn upstream_closure(&self, root: NodeIndex) -> Vec<NodeIndex> {
        if root >= self.node_count() {
            return Vec::new();
        }
        let mut closure = vec![root];
        closure.extend(self.upstream_of(root));
        closure
    }

    /// Nodes reading directly from `index`.
    pub fn consumers_of(&self, index: NodeIndex) -> &[NodeIndex] {
        self.consumers.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Nodes `index` reads from directly.
    pub fn dependencies_of(&self, index: NodeIndex) -> &[NodeIndex] {
        self.dependencies.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    fn bfs(&self, start: NodeIndex, adjacency: &[Vec<NodeIndex>]) -> Vec<NodeIndex> {
        let mut result = Vec::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        visited.insert(start);

        if let Some(next) = adjacency.get(start) {
            queue.extend(next.iter().copied());
        }
        while let Some(current) = queue.pop_front() {
            if visited.insert(current) {
                result.push(current);
                queue.extend(adjacency[current].iter().copied());
            }
        }
        result
    }

    /// Get the evaluation depth of a node.
    ///
    /// Depth 0 = source nodes (no dependencies)
    /// Higher depth = longer dependency chains
    pub fn node_depth(&self, index: NodeIndex) -> usize {
        let mut memo = vec![None; self.node_count()];
        self.depth_of(index, &mut memo, &mut HashSet::new())
    }

    fn depth_of(
        &self,
        index: NodeIndex,
        memo: &mut Vec<Option<usize>>,
        visiting: &mut HashSet<NodeIndex>,
    ) -> usize {
        if let Some(Some(depth)) = memo.get(index) {
            return *depth;
        }
        // Guard against cyclic input.
        if index >= self.node_count() || !visiting.insert(index) {
            return 0;
        }
        let depth = self.dependencies[index]
            .iter()
            .map(|&dep| self.depth_of(dep, memo, visiting) + 1)
            .max()
            .unwrap_or(0);
        visiting.remove(&index);
        memo[index] = Some(depth);
        depth
    }

    /// Find all nodes whose dependencies are all in `done`.
    pub fn ready_to_evaluate(&self, done: &HashSet<NodeIndex>) -> Vec<NodeIndex> {
        (0..self.node_count())
            .filter(|node| !done.contains(node))
            .filter(|&node| self.dependencies[node].iter().all(|dep| done.contains(dep)))
            .collect()
    }

    /// Nodes reading from no other node.
    pub fn sources(&self) -> Vec<NodeIndex> {
        (0..self.node_count())
            .filter(|&node| self.dependencies[node].is_empty())
            .collect()
    }

    /// Nodes no other node reads from.
    pub fn sinks(&self) -> Vec<NodeIndex> {
        (0..self.node_count())
            .filter(|&node| self.consumers[node].is_empty())
            .collect()
    }

    /// Find all weakly connected components.
    pub fn find_subgraphs(&self) -> Vec<Vec<NodeIndex>> {
        let mut visited = vec![false; self.node_count()];
        let mut subgraphs = Vec::new();

        for start in 0..self.node_count() {
            if visited[start] {
                continue;
            }
            let mut component = Vec::new();
            let mut queue = VecDeque::from([start]);
            visited[start] = true;
            while let Some(current) = queue.pop_front() {
                component.push(current);
                for &next in self.dependencies[current].iter().chain(&self.consumers[current]) {
                    if !visited[next] {
                        visited[next] = true;
                        queue.push_back(next);
                    }
                }
            }
            component.sort_unstable();
            subgraphs.push(component);
        }

        subgraphs
    }
}
