//! Serializable graph descriptions.
//!
//! A [`GraphDescription`] lists filter instances (by registered filter type)
//! and the pipes between them. It is stored as TOML or JSON and turned into
//! a running [`Graph`] with a [`FilterRegistry`] that knows how to create
//! each filter type.
//!
//! Instance ids are UUIDs. Ids that do not parse as UUIDs are mapped to
//! name-based UUIDs, so hand-written files may use readable ids.

use crate::config::{is_toml, GraphConfig};
use crate::error::{Error, Result, ResultExt};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::filters::{builtin_type_name, ForwardFilter, PairFilter, SourceFilter};
use crate::pipeline::graph::{Graph, GraphBuilder};
use crate::pipeline::id::NodeId;
use crate::pipeline::node::{Filter, Node};
use crate::pipeline::parameter::ParameterValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// One filter instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterInstance {
    pub id: String,
    #[serde(rename = "type")]
    pub filter_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, ParameterValue>,
}

impl FilterInstance {
    pub fn new(id: impl Into<String>, filter_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            filter_type: filter_type.into(),
            name: None,
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: ParameterValue) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    /// Display name: the explicit name, or the id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// One pipe between two filter instances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipeDescription {
    pub sender: String,
    pub output: String,
    pub receiver: String,
    /// Input key on the receiver (port tag, or name when untagged).
    pub input: String,
    /// Overrides the group declared by the input port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<u32>,
}

/// A whole graph as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDescription {
    pub name: String,
    #[serde(default)]
    pub config: GraphConfig,
    #[serde(default)]
    pub filters: Vec<FilterInstance>,
    #[serde(default)]
    pub pipes: Vec<PipeDescription>,
}

impl GraphDescription {
    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load a description, choosing the format by extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Reading graph description {:?}", path))?;
        let parsed = if is_toml(path) {
            Self::from_toml_str(&content)
        } else {
            Self::from_json_str(&content)
        };
        parsed.with_context(|| format!("Parsing graph description {:?}", path))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = if is_toml(path) {
            toml::to_string_pretty(self)?
        } else {
            serde_json::to_string_pretty(self)?
        };
        std::fs::write(path, content)
            .with_context(|| format!("Writing graph description {:?}", path))
    }

    /// Describe a built graph, including the parameters applied to each node.
    pub fn from_graph(graph: &Graph) -> Self {
        let filters = graph
            .nodes()
            .iter()
            .map(|node| FilterInstance {
                id: node.id().to_string(),
                filter_type: node.type_name().to_string(),
                name: Some(node.name().to_string()),
                parameters: node.parameters(),
            })
            .collect();

        let pipes = graph
            .connections()
            .iter()
            .map(|c| PipeDescription {
                sender: c.sender.to_string(),
                output: c.output.clone(),
                receiver: c.receiver.to_string(),
                input: c.input.clone(),
                group: Some(c.group),
            })
            .collect();

        Self {
            name: graph.name().to_string(),
            config: graph.config().clone(),
            filters,
            pipes,
        }
    }

    /// Create, parameterize and wire every filter, then validate the graph.
    pub fn instantiate(&self, registry: &FilterRegistry) -> Result<Graph> {
        self.config.validate()?;
        let mut builder = GraphBuilder::new(&self.name, self.config.clone())?;

        for instance in &self.filters {
            let filter = registry.create(&instance.filter_type)?;
            let node = Node::new(
                NodeId::parse_lenient(&instance.id),
                instance.display_name(),
                filter,
                &self.config,
            )?;
            for (key, value) in &instance.parameters {
                node.set_parameter(key, value)?;
            }
            builder.add_node(node)?;
        }

        for pipe in &self.pipes {
            let wired = Self::wire(&mut builder, pipe);
            wired.map_err(Error::from).with_context(|| {
                format!(
                    "Pipe {}.{} -> {}.{}",
                    pipe.sender, pipe.output, pipe.receiver, pipe.input
                )
            })?;
        }

        Ok(builder.build()?)
    }

    fn wire(builder: &mut GraphBuilder, pipe: &PipeDescription) -> PipelineResult<()> {
        let sender = Self::resolve(builder, &pipe.sender)?;
        let receiver = Self::resolve(builder, &pipe.receiver)?;
        match pipe.group {
            Some(group) => {
                builder.connect_in_group(sender, &pipe.output, receiver, &pipe.input, group)
            }
            None => builder.connect(sender, &pipe.output, receiver, &pipe.input),
        }
    }

    fn resolve(builder: &GraphBuilder, id: &str) -> PipelineResult<NodeId> {
        let node_id = NodeId::parse_lenient(id);
        builder
            .node(node_id)
            .map(|node| node.id())
            .ok_or_else(|| PipelineError::UnknownNode(id.to_string()))
    }
}

impl Graph {
    /// Description that recreates this graph's topology.
    pub fn describe(&self) -> GraphDescription {
        GraphDescription::from_graph(self)
    }
}

/// Creates a filter instance.
pub type FilterFactory = Box<dyn Fn() -> Box<dyn Filter> + Send + Sync>;

/// Maps filter type names to factories.
#[derive(Default)]
pub struct FilterRegistry {
    factories: BTreeMap<String, FilterFactory>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in filters for `i64`, `f64`, `bool` and `String`.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register_builtin::<i64>();
        registry.register_builtin::<f64>();
        registry.register_builtin::<bool>();
        registry.register_builtin::<String>();
        registry
    }

    /// Register `source`, `forward` and `pair` for `T`, under the same type
    /// names the filters report when built directly (see
    /// [`payload_label`](crate::pipeline::filters::payload_label)).
    pub fn register_builtin<T: Send + Sync + 'static>(&mut self) {
        let source = builtin_type_name::<T>("source");
        let forward = builtin_type_name::<T>("forward");
        let pair = builtin_type_name::<T>("pair");

        let name = source.clone();
        self.register(source, move || -> Box<dyn Filter> {
            Box::new(SourceFilter::<T>::with_type_name(name.clone()))
        });
        let name = forward.clone();
        self.register(forward, move || -> Box<dyn Filter> {
            Box::new(ForwardFilter::<T>::with_type_name(name.clone()))
        });
        let name = pair.clone();
        self.register(pair, move || -> Box<dyn Filter> {
            Box::new(PairFilter::<T, T>::with_type_name(name.clone()))
        });
    }

    /// Register a factory, replacing any previous one for `type_name`.
    pub fn register<F>(&mut self, type_name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Filter> + Send + Sync + 'static,
    {
        let type_name = type_name.into();
        if self
            .factories
            .insert(type_name.clone(), Box::new(factory))
            .is_some()
        {
            tracing::debug!(filter = %type_name, "Filter factory replaced");
        }
    }

    pub fn create(&self, type_name: &str) -> PipelineResult<Box<dyn Filter>> {
        self.factories
            .get(type_name)
            .map(|factory| factory())
            .ok_or_else(|| PipelineError::UnknownFilterType(type_name.to_string()))
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}
