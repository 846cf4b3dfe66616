//! Graph assembly and validation.
//!
//! [`GraphBuilder`] places filter instances and wires output pipes into
//! inputs. Wiring is type-checked immediately; `build` then validates the
//! whole graph (mandatory ports, capacities, cycles) and returns a
//! [`Graph`] ready to be driven by producers.

use crate::config::GraphConfig;
use crate::pipeline::channel::{Pipe, PipeStats};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::id::{NodeId, SequenceNumber};
use crate::pipeline::node::{Filter, Node, NodeStats};
use crate::pipeline::plan::{GraphPlan, PlanCompiler};
use crate::pipeline::port::{ConnectorInfo, PortDirection};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// One wired pipe: output `output` of `sender` into input `input` of `receiver`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Connection {
    pub sender: NodeId,
    pub output: String,
    pub receiver: NodeId,
    pub input: String,
    pub group: u32,
}

/// Connector catalog entry of one node, for graph tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConnectors {
    pub node: NodeId,
    pub name: String,
    pub filter: String,
    pub connectors: Vec<ConnectorInfo>,
}

/// Counters of one output pipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipeReport {
    pub node: String,
    pub output: String,
    pub stats: PipeStats,
}

#[derive(Default)]
struct NodeTable {
    nodes: Vec<Arc<Node>>,
    index: HashMap<NodeId, usize>,
}

impl NodeTable {
    fn get(&self, id: NodeId) -> Option<&Arc<Node>> {
        self.index.get(&id).map(|&i| &self.nodes[i])
    }

    fn by_name(&self, name: &str) -> Option<&Arc<Node>> {
        self.nodes.iter().find(|n| n.name() == name)
    }

    fn require(&self, id: NodeId) -> PipelineResult<&Arc<Node>> {
        self.get(id)
            .ok_or_else(|| PipelineError::UnknownNode(id.to_string()))
    }
}

/// Assembles a graph.
pub struct GraphBuilder {
    name: String,
    config: GraphConfig,
    table: NodeTable,
    connections: Vec<Connection>,
}

impl GraphBuilder {
    pub fn new(name: impl Into<String>, config: GraphConfig) -> PipelineResult<Self> {
        if config.max_in_flight == 0 {
            return Err(PipelineError::InvalidConfig(
                "max_in_flight must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            name: name.into(),
            config,
            table: NodeTable::default(),
            connections: Vec::new(),
        })
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Place a filter under a fresh random id.
    pub fn add_filter(
        &mut self,
        name: impl Into<String>,
        filter: Box<dyn Filter>,
    ) -> PipelineResult<NodeId> {
        self.add_filter_with_id(NodeId::new_random(), name, filter)
    }

    pub fn add_filter_with_id(
        &mut self,
        id: NodeId,
        name: impl Into<String>,
        filter: Box<dyn Filter>,
    ) -> PipelineResult<NodeId> {
        let node = Node::new(id, name, filter, &self.config)?;
        self.add_node(node)
    }

    /// Place an already constructed node. Ids and names must be unique.
    pub fn add_node(&mut self, node: Arc<Node>) -> PipelineResult<NodeId> {
        let id = node.id();
        if self.table.index.contains_key(&id) {
            return Err(PipelineError::DuplicateNode(format!("{} ({})", node.name(), id)));
        }
        if self.table.by_name(node.name()).is_some() {
            return Err(PipelineError::DuplicateNode(node.name().to_string()));
        }

        tracing::debug!(graph = %self.name, node = node.name(), id = %id, "Node added");
        self.table.index.insert(id, self.table.nodes.len());
        self.table.nodes.push(node);
        Ok(id)
    }

    pub fn node(&self, id: NodeId) -> Option<&Arc<Node>> {
        self.table.get(id)
    }

    pub fn node_by_name(&self, name: &str) -> Option<&Arc<Node>> {
        self.table.by_name(name)
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Wire using the group declared by the input port.
    pub fn connect(
        &mut self,
        sender: NodeId,
        output: &str,
        receiver: NodeId,
        input: &str,
    ) -> PipelineResult<()> {
        let receiver_node = self.table.require(receiver)?;
        let group = receiver_node
            .input_port(input)
            .map(|p| p.group())
            .ok_or_else(|| PipelineError::UnknownPort {
                node: receiver_node.name().to_string(),
                port: input.to_string(),
                direction: PortDirection::Input,
            })?;
        self.connect_in_group(sender, output, receiver, input, group)
    }

    /// Wire with an explicit dispatch group, overriding the declared one.
    pub fn connect_in_group(
        &mut self,
        sender: NodeId,
        output: &str,
        receiver: NodeId,
        input: &str,
        group: u32,
    ) -> PipelineResult<()> {
        let sender_node = self.table.require(sender)?;
        let receiver_node = self.table.require(receiver)?;
        let pipe = sender_node
            .output_pipe(output)
            .ok_or_else(|| PipelineError::UnknownPort {
                node: sender_node.name().to_string(),
                port: output.to_string(),
                direction: PortDirection::Output,
            })?;

        receiver_node.try_subscribe(pipe, input, group)?;
        tracing::debug!(
            graph = %self.name,
            "Connected {}.{} -> {}.{} (group {})",
            sender_node.name(),
            output,
            receiver_node.name(),
            input,
            group
        );

        self.connections.push(Connection {
            sender,
            output: output.to_string(),
            receiver,
            input: input.to_string(),
            group,
        });
        Ok(())
    }

    /// Every problem that would prevent the graph from running.
    fn problems(&self) -> Vec<PipelineError> {
        let mut problems = Vec::new();
        for node in &self.table.nodes {
            for port in node.missing_mandatory_inputs() {
                problems.push(PipelineError::MissingMandatoryPort {
                    node: node.name().to_string(),
                    port: port.key().to_string(),
                    direction: PortDirection::Input,
                });
            }
            for (port, pipe) in node.outputs() {
                if port.is_required() && !pipe.linked() {
                    problems.push(PipelineError::MissingMandatoryPort {
                        node: node.name().to_string(),
                        port: port.name().to_string(),
                        direction: PortDirection::Output,
                    });
                }
                if pipe.capacity() != self.config.max_in_flight {
                    problems.push(PipelineError::CapacityMismatch {
                        node: node.name().to_string(),
                        pipe: port.name().to_string(),
                        expected: self.config.max_in_flight,
                        actual: pipe.capacity(),
                    });
                }
            }
        }
        problems
    }

    /// Validate and finish the graph.
    pub fn build(self) -> PipelineResult<Graph> {
        let mut problems = self.problems();
        let plan = match PlanCompiler::compile(&self.table.nodes, &self.connections) {
            Ok(plan) => Some(plan),
            Err(e) => {
                problems.push(e);
                None
            }
        };

        if let Err(err) = PipelineError::from_problems(problems) {
            for problem in err.problems() {
                tracing::warn!(graph = %self.name, "{}", problem);
            }
            return Err(err);
        }
        let plan = plan.unwrap_or_default();

        for id in &plan.unreachable {
            if let Some(node) = self.table.get(*id) {
                tracing::warn!(graph = %self.name, node = node.name(), "Node is not reachable from any source");
            }
        }
        tracing::info!(
            graph = %self.name,
            nodes = plan.stats.total_nodes,
            connections = plan.stats.connections,
            joins = plan.stats.join_groups,
            max_in_flight = self.config.max_in_flight,
            "Graph built in {}us",
            plan.stats.compile_time_us
        );

        Ok(Graph {
            name: self.name,
            config: self.config,
            table: self.table,
            connections: self.connections,
            plan,
        })
    }
}

/// A validated graph.
pub struct Graph {
    name: String,
    config: GraphConfig,
    table: NodeTable,
    connections: Vec<Connection>,
    plan: GraphPlan,
}

impl Graph {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn nodes(&self) -> &[Arc<Node>] {
        &self.table.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&Arc<Node>> {
        self.table.get(id)
    }

    pub fn node_by_name(&self, name: &str) -> Option<&Arc<Node>> {
        self.table.by_name(name)
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn plan(&self) -> &GraphPlan {
        &self.plan
    }

    /// Typed handle to an output pipe, for producers feeding the graph.
    pub fn source<T: Send + Sync + 'static>(
        &self,
        node: NodeId,
        output: &str,
    ) -> PipelineResult<Arc<Pipe<T>>> {
        self.table.require(node)?.output::<T>(output)
    }

    /// Reset every node for a new run, in topological order.
    pub fn arm(&self) {
        for id in &self.plan.order {
            if let Some(node) = self.table.get(*id) {
                node.arm();
            }
        }
        tracing::info!(graph = %self.name, "Graph armed");
    }

    /// Drop the group arrivals of an abandoned sequence number.
    pub fn reset_sequence(&self, sequence: SequenceNumber) {
        for node in &self.table.nodes {
            node.reset_group_records(sequence);
        }
    }

    /// Port metadata of every node.
    pub fn connector_catalog(&self) -> Vec<NodeConnectors> {
        self.table
            .nodes
            .iter()
            .map(|node| NodeConnectors {
                node: node.id(),
                name: node.name().to_string(),
                filter: node.type_name().to_string(),
                connectors: node.ports().iter().map(ConnectorInfo::from).collect(),
            })
            .collect()
    }

    pub fn pipe_stats(&self) -> Vec<PipeReport> {
        self.table
            .nodes
            .iter()
            .flat_map(|node| {
                node.outputs().map(move |(port, pipe)| PipeReport {
                    node: node.name().to_string(),
                    output: port.name().to_string(),
                    stats: pipe.stats(),
                })
            })
            .collect()
    }

    pub fn node_stats(&self) -> Vec<(String, NodeStats)> {
        self.table
            .nodes
            .iter()
            .map(|node| (node.name().to_string(), node.stats()))
            .collect()
    }

    /// Log processing times and hazard counters of every node and pipe.
    pub fn log_statistics(&self) {
        for (name, stats) in self.node_stats() {
            tracing::info!(
                graph = %self.name,
                node = %name,
                proceeded = stats.proceeded,
                failures = stats.failures,
                mean_us = stats.mean_processing.as_micros() as u64,
                max_us = stats.max_processing.as_micros() as u64,
                "Node statistics"
            );
            if stats.evicted_groups > 0 {
                tracing::warn!(
                    graph = %self.name,
                    node = %name,
                    evicted = stats.evicted_groups,
                    "Incomplete groups were evicted"
                );
            }
        }
        for report in self.pipe_stats() {
            if report.stats.overwrites > 0 || report.stats.stale_reads > 0 {
                tracing::warn!(
                    graph = %self.name,
                    node = %report.node,
                    output = %report.output,
                    overwrites = report.stats.overwrites,
                    stale_reads = report.stats.stale_reads,
                    "Pipe hazards observed"
                );
            }
        }
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("name", &self.name)
            .field("nodes", &self.table.nodes.len())
            .field("connections", &self.connections.len())
            .finish()
    }
}
