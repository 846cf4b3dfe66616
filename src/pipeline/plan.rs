//! Structural analysis of a wired graph.
//!
//! The engine is push driven, so the plan is not used to schedule
//! anything. It proves the graph acyclic (a cycle would make a signal
//! cascade recurse forever), orders nodes topologically for arming and
//! reporting, and flags nodes that no source can ever reach.

use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::graph::Connection;
use crate::pipeline::id::NodeId;
use crate::pipeline::node::Node;
use crate::pipeline::port::GROUP_PROCEED;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

/// Result of compiling a graph.
#[derive(Debug, Clone, Default)]
pub struct GraphPlan {
    /// All nodes in topological order.
    pub order: Vec<NodeId>,

    /// Nodes with inputs that no source node can reach.
    pub unreachable: Vec<NodeId>,

    pub stats: PlanStats,
}

/// Statistics about the compiled plan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlanStats {
    pub total_nodes: usize,

    /// Nodes without input ports
    pub source_nodes: usize,

    /// Nodes without output ports
    pub sink_nodes: usize,

    pub connections: usize,

    /// Distinct (node, group) joins with at least one wired input
    pub join_groups: usize,

    pub unreachable_nodes: usize,

    /// Compilation time in microseconds
    pub compile_time_us: u64,
}

impl GraphPlan {
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Compiles a wired graph into a [`GraphPlan`]
pub struct PlanCompiler;

impl PlanCompiler {
    /// Fails with [`PipelineError::CycleDetected`] if the connections form a cycle.
    pub fn compile(nodes: &[Arc<Node>], connections: &[Connection]) -> PipelineResult<GraphPlan> {
        let start_time = std::time::Instant::now();
        let n = nodes.len();

        let index: HashMap<NodeId, usize> =
            nodes.iter().enumerate().map(|(i, node)| (node.id(), i)).collect();
        let adjacency = Self::build_adjacency(&index, connections, n);

        let sources: Vec<usize> = (0..n)
            .filter(|&i| nodes[i].input_ports().next().is_none())
            .collect();
        let sink_count = nodes
            .iter()
            .filter(|node| node.output_ports().next().is_none())
            .count();

        let order = Self::topological_sort(&adjacency, n).map_err(|remaining| {
            PipelineError::CycleDetected {
                nodes: remaining
                    .into_iter()
                    .map(|i| nodes[i].name().to_string())
                    .collect(),
            }
        })?;

        let reachable = Self::forward_reachability(&sources, &adjacency, n);
        let unreachable: Vec<NodeId> = (0..n)
            .filter(|&i| !reachable[i])
            .map(|i| nodes[i].id())
            .collect();

        let join_groups: BTreeSet<(usize, u32)> = connections
            .iter()
            .filter(|c| c.group != GROUP_PROCEED)
            .filter_map(|c| index.get(&c.receiver).map(|&i| (i, c.group)))
            .collect();

        let stats = PlanStats {
            total_nodes: n,
            source_nodes: sources.len(),
            sink_nodes: sink_count,
            connections: connections.len(),
            join_groups: join_groups.len(),
            unreachable_nodes: unreachable.len(),
            compile_time_us: start_time.elapsed().as_micros() as u64,
        };

        Ok(GraphPlan {
            order: order.into_iter().map(|i| nodes[i].id()).collect(),
            unreachable,
            stats,
        })
    }

    /// Forward adjacency, one entry per connection
    fn build_adjacency(
        index: &HashMap<NodeId, usize>,
        connections: &[Connection],
        n: usize,
    ) -> Vec<Vec<usize>> {
        let mut adjacency = vec![Vec::new(); n];
        for connection in connections {
            if let (Some(&from), Some(&to)) =
                (index.get(&connection.sender), index.get(&connection.receiver))
            {
                adjacency[from].push(to);
            }
        }
        adjacency
    }

    /// Perform forward reachability analysis from sources using DFS
    fn forward_reachability(sources: &[usize], adjacency: &[Vec<usize>], n: usize) -> Vec<bool> {
        let mut reachable = vec![false; n];
        let mut stack = Vec::new();

        for &src in sources {
            reachable[src] = true;
            stack.push(src);
        }

        while let Some(node) = stack.pop() {
            for &neighbor in &adjacency[node] {
                if !reachable[neighbor] {
                    reachable[neighbor] = true;
                    stack.push(neighbor);
                }
            }
        }

        reachable
    }

    /// Kahn's algorithm. On a cycle, returns the nodes left with incoming edges.
    fn topological_sort(adjacency: &[Vec<usize>], n: usize) -> Result<Vec<usize>, Vec<usize>> {
        let mut in_degree = vec![0usize; n];
        for targets in adjacency {
            for &to in targets {
                in_degree[to] += 1;
            }
        }

        let mut queue: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut result = Vec::with_capacity(n);

        while let Some(node) = queue.pop_front() {
            result.push(node);
            for &neighbor in &adjacency[node] {
                in_degree[neighbor] -= 1;
                if in_degree[neighbor] == 0 {
                    queue.push_back(neighbor);
                }
            }
        }

        if result.len() == n {
            Ok(result)
        } else {
            Err((0..n).filter(|&i| in_degree[i] > 0).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topological_sort_chain() {
        // 2 -> 0 -> 1
        let adjacency = vec![vec![1], vec![], vec![0]];
        assert_eq!(
            PlanCompiler::topological_sort(&adjacency, 3),
            Ok(vec![2, 0, 1])
        );
    }

    #[test]
    fn test_topological_sort_cycle() {
        // 0 -> 1 -> 2 -> 1, 3 isolated
        let adjacency = vec![vec![1], vec![2], vec![1], vec![]];
        assert_eq!(
            PlanCompiler::topological_sort(&adjacency, 4),
            Err(vec![1, 2])
        );
    }

    #[test]
    fn test_forward_reachability() {
        // 0 -> 1, 2 -> 3 (2 is not a source)
        let adjacency = vec![vec![1], vec![], vec![3], vec![]];
        let reachable = PlanCompiler::forward_reachability(&[0], &adjacency, 4);
        assert_eq!(reachable, vec![true, true, false, false]);
    }

    #[test]
    fn test_empty_graph() {
        let plan = PlanCompiler::compile(&[], &[]).unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.stats.total_nodes, 0);
    }
}
