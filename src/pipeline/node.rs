//! Filters and the nodes that host them.
//!
//! A [`Filter`] is user processing logic: it declares ports and implements
//! the two entry points, `proceed` (per signal, group 0) and
//! `proceed_group` (once per completed join, groups ≥ 1).
//!
//! A [`Node`] wraps a filter instance in a graph. It owns one output
//! [`Pipe`] per declared output port, holds non-owning references to the
//! upstream pipes wired into its inputs, and dispatches their signals to
//! the filter. Processing always happens on the thread that signaled.

use crate::config::GraphConfig;
use crate::pipeline::channel::{downcast_pipe, AnyPipe, Pipe, PipeEvent, PipeHandler, PipeSpec};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::group::{Arrival, GroupCoordinator, GroupEvent};
use crate::pipeline::id::{NodeId, PipeId, SequenceNumber, SubscriptionId};
use crate::pipeline::parameter::{ParameterError, ParameterValue};
use crate::pipeline::port::{PortDescriptor, PortDirection, GROUP_PROCEED};
use crate::pipeline::slot::SlotError;
use crate::pipeline::{lock, read_lock, write_lock};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::{Duration, Instant};

/// Processing logic of a node.
pub trait Filter: Send {
    /// Filter type name, as referenced by graph descriptions.
    fn type_name(&self) -> &str;

    /// Declared input and output ports.
    fn ports(&self) -> &[PortDescriptor];

    /// Called for every signal on an input of group 0.
    fn proceed(&mut self, ctx: &mut FilterContext<'_>, event: &PipeEvent) -> PipelineResult<()> {
        let _ = event;
        Err(ctx.error("proceed is not implemented"))
    }

    /// Called once all inputs of a group ≥ 1 signaled the same sequence number.
    fn proceed_group(
        &mut self,
        ctx: &mut FilterContext<'_>,
        event: &GroupEvent,
    ) -> PipelineResult<()> {
        let _ = event;
        Err(ctx.error("proceed_group is not implemented"))
    }

    /// Apply a parameter from a graph description.
    fn set_parameter(&mut self, key: &str, value: &ParameterValue) -> Result<(), ParameterError> {
        let _ = (key, value);
        Err(ParameterError::Unknown)
    }

    /// Called when the graph is armed for a new run.
    fn on_arm(&mut self) {}
}

/// View of the node handed to a filter while it processes one sequence number.
pub struct FilterContext<'a> {
    node: &'a Node,
    sequence: SequenceNumber,
}

impl<'a> FilterContext<'a> {
    /// Sequence number being processed. Every output signal uses it.
    pub fn sequence(&self) -> SequenceNumber {
        self.sequence
    }

    pub fn node_name(&self) -> &str {
        &self.node.name
    }

    /// Consume the value of input `key` for the current sequence number.
    pub fn read<T: Send + Sync + 'static>(&self, key: &str) -> PipelineResult<Arc<T>> {
        self.node.read_input(key, self.sequence, true)
    }

    /// Like [`FilterContext::read`], but an unconnected input, or one that
    /// holds nothing for the current sequence number, yields `None`.
    pub fn read_optional<T: Send + Sync + 'static>(
        &self,
        key: &str,
    ) -> PipelineResult<Option<Arc<T>>> {
        if self.node.input_port(key).is_some() && !self.node.is_connected(key) {
            return Ok(None);
        }
        match self.read(key) {
            Ok(value) => Ok(Some(value)),
            Err(PipelineError::Slot {
                source: SlotError::NeverWritten { .. } | SlotError::Overwritten { .. },
                ..
            }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn is_connected(&self, key: &str) -> bool {
        self.node.is_connected(key)
    }

    /// True if output `name` has subscribers. Producers skip work otherwise.
    pub fn is_linked(&self, name: &str) -> bool {
        self.node.output_pipe(name).is_some_and(|p| p.linked())
    }

    /// Write and signal `value` on output `name`. Returns false when the
    /// output has no subscribers (nothing is written).
    pub fn signal<T: Send + Sync + 'static>(&self, name: &str, value: T) -> PipelineResult<bool> {
        let pipe = self.node.typed_output::<T>(name)?;
        Ok(pipe.signal_value(self.sequence, value))
    }

    pub fn signal_shared<T: Send + Sync + 'static>(
        &self,
        name: &str,
        value: Arc<T>,
    ) -> PipelineResult<bool> {
        let pipe = self.node.typed_output::<T>(name)?;
        Ok(pipe.signal_shared(self.sequence, value))
    }

    /// Error attributed to this node.
    pub fn error(&self, message: impl Into<String>) -> PipelineError {
        PipelineError::Filter {
            node: self.node.name.clone(),
            message: message.into(),
        }
    }
}

struct OutputSlot {
    port: usize,
    pipe: Arc<dyn AnyPipe>,
}

struct InputBinding {
    key: String,
    pipe: Weak<dyn AnyPipe>,
    pipe_id: PipeId,
    group: u32,
    subscription: SubscriptionId,
}

/// Read-only view of one wired input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputConnection {
    pub key: String,
    pub pipe: PipeId,
    pub group: u32,
}

#[derive(Debug, Default)]
struct NodeCounters {
    proceeded: AtomicU64,
    groups_fired: AtomicU64,
    failures: AtomicU64,
    busy_nanos: AtomicU64,
    max_nanos: AtomicU64,
}

/// Processing statistics of a node.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NodeStats {
    /// Entry point invocations, both kinds.
    pub proceeded: u64,
    pub groups_fired: u64,
    pub failures: u64,
    pub pending_groups: usize,
    pub evicted_groups: u64,
    pub mean_processing: Duration,
    pub max_processing: Duration,
}

/// A filter instance placed in a graph.
pub struct Node {
    id: NodeId,
    name: String,
    type_name: String,
    ports: Vec<PortDescriptor>,
    outputs: Vec<OutputSlot>,
    inputs: RwLock<Vec<InputBinding>>,
    groups: Mutex<GroupCoordinator>,
    filter: Mutex<Box<dyn Filter>>,
    parameters: Mutex<BTreeMap<String, ParameterValue>>,
    counters: NodeCounters,
    this: Weak<Node>,
}

impl Node {
    /// Create a node and its output pipes.
    pub fn new(
        id: NodeId,
        name: impl Into<String>,
        filter: Box<dyn Filter>,
        config: &GraphConfig,
    ) -> PipelineResult<Arc<Self>> {
        let name = name.into();
        if config.max_in_flight == 0 {
            return Err(PipelineError::InvalidConfig(
                "max_in_flight must be at least 1".to_string(),
            ));
        }

        let ports = filter.ports().to_vec();
        for (i, port) in ports.iter().enumerate() {
            let duplicate = ports[..i].iter().any(|other| {
                other.id() == port.id()
                    || (other.direction() == port.direction() && other.key() == port.key())
            });
            if duplicate {
                return Err(PipelineError::DuplicatePort {
                    node: name.clone(),
                    port: port.key().to_string(),
                });
            }
        }

        let outputs = ports
            .iter()
            .enumerate()
            .filter(|(_, port)| !port.is_input())
            .map(|(index, port)| OutputSlot {
                port: index,
                pipe: port
                    .payload_type()
                    .create_pipe(PipeSpec::from_config(format!("{}.{}", name, port.name()), config)),
            })
            .collect();

        let type_name = filter.type_name().to_string();
        tracing::debug!(node = %name, filter = %type_name, ports = ports.len(), "Node created");

        Ok(Arc::new_cyclic(|this| Node {
            id,
            groups: Mutex::new(GroupCoordinator::new(name.clone(), config.max_in_flight)),
            name,
            type_name,
            ports,
            outputs,
            inputs: RwLock::new(Vec::new()),
            filter: Mutex::new(filter),
            parameters: Mutex::new(BTreeMap::new()),
            counters: NodeCounters::default(),
            this: this.clone(),
        }))
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn ports(&self) -> &[PortDescriptor] {
        &self.ports
    }

    pub fn input_ports(&self) -> impl Iterator<Item = &PortDescriptor> {
        self.ports.iter().filter(|p| p.is_input())
    }

    pub fn output_ports(&self) -> impl Iterator<Item = &PortDescriptor> {
        self.ports.iter().filter(|p| !p.is_input())
    }

    /// Input port addressed by `key` (tag, or name for untagged ports).
    pub fn input_port(&self, key: &str) -> Option<&PortDescriptor> {
        self.input_ports().find(|p| p.key() == key)
    }

    pub fn output_port(&self, name: &str) -> Option<&PortDescriptor> {
        self.output_ports().find(|p| p.name() == name)
    }

    /// Output pipes paired with their descriptors.
    pub fn outputs(&self) -> impl Iterator<Item = (&PortDescriptor, &Arc<dyn AnyPipe>)> {
        self.outputs.iter().map(|o| (&self.ports[o.port], &o.pipe))
    }

    pub fn output_pipe(&self, name: &str) -> Option<&Arc<dyn AnyPipe>> {
        self.outputs
            .iter()
            .find(|o| self.ports[o.port].name() == name)
            .map(|o| &o.pipe)
    }

    /// Typed handle to output `name`.
    pub fn output<T: Send + Sync + 'static>(&self, name: &str) -> PipelineResult<Arc<Pipe<T>>> {
        self.typed_output::<T>(name)?;
        let pipe = self.output_pipe(name).map(Arc::clone);
        pipe.and_then(downcast_pipe::<T>)
            .ok_or_else(|| self.unknown_port(name, PortDirection::Output))
    }

    fn typed_output<T: Send + Sync + 'static>(&self, name: &str) -> PipelineResult<&Pipe<T>> {
        let pipe = self
            .output_pipe(name)
            .ok_or_else(|| self.unknown_port(name, PortDirection::Output))?;
        pipe.downcast_ref::<T>()
            .ok_or_else(|| PipelineError::WiringTypeMismatch {
                node: self.name.clone(),
                port: name.to_string(),
                expected: pipe.payload_type().name(),
                actual: std::any::type_name::<T>(),
            })
    }

    fn unknown_port(&self, port: &str, direction: PortDirection) -> PipelineError {
        PipelineError::UnknownPort {
            node: self.name.clone(),
            port: port.to_string(),
            direction,
        }
    }

    // ── Wiring ──

    /// Wire `candidate` into input `key`, dispatching its signals per `group`.
    ///
    /// The payload type is checked before anything is installed.
    pub fn try_subscribe(
        &self,
        candidate: &Arc<dyn AnyPipe>,
        key: &str,
        group: u32,
    ) -> PipelineResult<SubscriptionId> {
        let port = self
            .input_port(key)
            .ok_or_else(|| self.unknown_port(key, PortDirection::Input))?;
        if port.payload_type() != candidate.payload_type() {
            return Err(PipelineError::WiringTypeMismatch {
                node: self.name.clone(),
                port: key.to_string(),
                expected: port.payload_type().name(),
                actual: candidate.payload_type().name(),
            });
        }

        let mut inputs = write_lock(&self.inputs);
        if inputs.iter().any(|b| b.key == key) {
            return Err(PipelineError::AlreadyConnected {
                node: self.name.clone(),
                port: key.to_string(),
            });
        }
        if group != GROUP_PROCEED {
            lock(&self.groups).add_member(group, key, port.is_required())?;
        }

        let this = self.this.clone();
        let input = key.to_string();
        let handler: PipeHandler = Arc::new(move |event: &PipeEvent| {
            if let Some(node) = this.upgrade() {
                node.on_signal(event, &input, group);
            }
        });
        let subscription = candidate.install(handler);

        inputs.push(InputBinding {
            key: key.to_string(),
            pipe: Arc::downgrade(candidate),
            pipe_id: candidate.id(),
            group,
            subscription,
        });
        tracing::debug!(
            node = %self.name,
            input = key,
            pipe = candidate.name(),
            group,
            "Input wired"
        );
        Ok(subscription)
    }

    /// Boolean form of [`Node::try_subscribe`]; failures are logged.
    pub fn subscribe(&self, candidate: &Arc<dyn AnyPipe>, key: &str, group: u32) -> bool {
        match self.try_subscribe(candidate, key, group) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("Subscribe failed: {}", e);
                false
            }
        }
    }

    /// Remove the wiring of input `key`. Returns false if it was not wired.
    pub fn unsubscribe(&self, key: &str) -> bool {
        let binding = {
            let mut inputs = write_lock(&self.inputs);
            let Some(index) = inputs.iter().position(|b| b.key == key) else {
                return false;
            };
            inputs.remove(index)
        };

        if binding.group != GROUP_PROCEED {
            lock(&self.groups).remove_member(key);
        }
        if let Some(pipe) = binding.pipe.upgrade() {
            pipe.uninstall(binding.subscription);
        }
        tracing::debug!(node = %self.name, input = key, "Input unwired");
        true
    }

    pub fn is_connected(&self, key: &str) -> bool {
        read_lock(&self.inputs).iter().any(|b| b.key == key)
    }

    pub fn connected_inputs(&self) -> Vec<InputConnection> {
        read_lock(&self.inputs)
            .iter()
            .map(|b| InputConnection {
                key: b.key.clone(),
                pipe: b.pipe_id,
                group: b.group,
            })
            .collect()
    }

    /// Mandatory inputs with nothing wired to them.
    pub fn missing_mandatory_inputs(&self) -> Vec<&PortDescriptor> {
        let inputs = read_lock(&self.inputs);
        self.input_ports()
            .filter(|p| p.is_required() && !inputs.iter().any(|b| b.key == p.key()))
            .collect()
    }

    // ── Dispatch ──

    fn on_signal(&self, event: &PipeEvent, key: &str, group: u32) {
        if group == GROUP_PROCEED {
            self.run(event.sequence, |filter, ctx| filter.proceed(ctx, event));
            return;
        }

        let arrival = lock(&self.groups).arrive(group, key, event.sender, event.sequence);
        match arrival {
            Arrival::Fired(group_event) => {
                self.counters.groups_fired.fetch_add(1, Ordering::Relaxed);
                self.run(group_event.sequence, |filter, ctx| {
                    filter.proceed_group(ctx, &group_event)
                });
            }
            Arrival::Collecting { arrived, required } => {
                tracing::trace!(
                    node = %self.name,
                    group,
                    seq = %event.sequence,
                    arrived,
                    required,
                    "Waiting for group"
                );
            }
            Arrival::Completed => {
                tracing::trace!(
                    node = %self.name,
                    group,
                    input = key,
                    seq = %event.sequence,
                    "Group already fired"
                );
            }
            Arrival::Stale { current } => {
                tracing::debug!(
                    node = %self.name,
                    group,
                    seq = %event.sequence,
                    current = %current,
                    "Late group arrival ignored"
                );
            }
            Arrival::Ignored => {
                tracing::debug!(node = %self.name, group, input = key, "Signal from non-member ignored");
            }
        }
    }

    fn run<F>(&self, sequence: SequenceNumber, f: F)
    where
        F: FnOnce(&mut Box<dyn Filter>, &mut FilterContext<'_>) -> PipelineResult<()>,
    {
        let mut filter = lock(&self.filter);
        let mut ctx = FilterContext {
            node: self,
            sequence,
        };

        let started = Instant::now();
        let result = f(&mut *filter, &mut ctx);
        let elapsed = started.elapsed().as_nanos() as u64;

        self.counters.proceeded.fetch_add(1, Ordering::Relaxed);
        self.counters.busy_nanos.fetch_add(elapsed, Ordering::Relaxed);
        self.counters.max_nanos.fetch_max(elapsed, Ordering::Relaxed);

        if let Err(e) = result {
            self.counters.failures.fetch_add(1, Ordering::Relaxed);
            tracing::error!(node = %self.name, seq = %sequence, "Processing failed: {}", e);
        }
    }

    fn read_input<T: Send + Sync + 'static>(
        &self,
        key: &str,
        sequence: SequenceNumber,
        consume: bool,
    ) -> PipelineResult<Arc<T>> {
        let (pipe, subscription) = {
            let inputs = read_lock(&self.inputs);
            let binding = inputs.iter().find(|b| b.key == key);
            match binding {
                Some(b) => (b.pipe.upgrade(), b.subscription),
                None if self.input_port(key).is_some() => (None, SubscriptionId(0)),
                None => return Err(self.unknown_port(key, PortDirection::Input)),
            }
        };
        let pipe = pipe.ok_or_else(|| PipelineError::NotConnected {
            node: self.name.clone(),
            port: key.to_string(),
        })?;

        let typed = pipe
            .downcast_ref::<T>()
            .ok_or_else(|| PipelineError::WiringTypeMismatch {
                node: self.name.clone(),
                port: key.to_string(),
                expected: pipe.payload_type().name(),
                actual: std::any::type_name::<T>(),
            })?;

        let result = if consume {
            typed.read_as(subscription, sequence)
        } else {
            typed.peek(sequence)
        };
        result.map_err(|source| PipelineError::Slot {
            node: self.name.clone(),
            port: key.to_string(),
            source,
        })
    }

    /// Value of input `key` for `sequence`, without consuming it.
    pub fn read<T: Send + Sync + 'static>(
        &self,
        key: &str,
        sequence: SequenceNumber,
    ) -> PipelineResult<Arc<T>> {
        self.read_input(key, sequence, false)
    }

    // ── Lifecycle ──

    /// Apply a parameter to the filter. Accepted values are remembered and
    /// reported by [`Node::parameters`].
    pub fn set_parameter(&self, key: &str, value: &ParameterValue) -> PipelineResult<()> {
        lock(&self.filter)
            .set_parameter(key, value)
            .map_err(|e| PipelineError::InvalidParameter {
                node: self.name.clone(),
                key: key.to_string(),
                message: e.to_string(),
            })?;
        lock(&self.parameters).insert(key.to_string(), value.clone());
        Ok(())
    }

    /// Parameters applied so far, latest value per key.
    pub fn parameters(&self) -> BTreeMap<String, ParameterValue> {
        lock(&self.parameters).clone()
    }

    /// Forget all pending group arrivals and let the filter reset itself.
    pub fn arm(&self) {
        lock(&self.groups).reset_all();
        lock(&self.filter).on_arm();
    }

    /// Forget the group arrivals recorded for one sequence number.
    pub fn reset_group_records(&self, sequence: SequenceNumber) {
        lock(&self.groups).reset(sequence);
    }

    pub fn stats(&self) -> NodeStats {
        let proceeded = self.counters.proceeded.load(Ordering::Relaxed);
        let busy = self.counters.busy_nanos.load(Ordering::Relaxed);
        let groups = lock(&self.groups);
        NodeStats {
            proceeded,
            groups_fired: self.counters.groups_fired.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
            pending_groups: groups.pending(),
            evicted_groups: groups.evicted(),
            mean_processing: Duration::from_nanos(busy.checked_div(proceeded).unwrap_or(0)),
            max_processing: Duration::from_nanos(self.counters.max_nanos.load(Ordering::Relaxed)),
        }
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        let inputs = match self.inputs.get_mut() {
            Ok(inputs) => inputs,
            Err(poisoned) => poisoned.into_inner(),
        };
        for binding in inputs.drain(..) {
            if let Some(pipe) = binding.pipe.upgrade() {
                pipe.uninstall(binding.subscription);
            }
        }
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .field("ports", &self.ports.len())
            .finish_non_exhaustive()
    }
}
