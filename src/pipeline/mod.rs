//! Typed push pipeline.
//!
//! Filters are hosted by nodes. Every node output is a [`Pipe`]: a ring of
//! sequence-numbered slots plus a list of subscribers. A producer writes a
//! value for sequence number `n` and signals; each subscribed node then runs
//! its filter synchronously on the signaling thread, and the filter's own
//! outputs carry `n` onward.
//!
//! # Architecture
//!
//! ```text
//! [source] ──out──► [forward] ──out──► [pair]
//!                                        ▲  group 1 (join)
//! [source] ──out─────────────────────────┘
//! ```
//!
//! Inputs in group 0 run the filter once per signal. Inputs in a group ≥ 1
//! are joined: the filter runs once all of them have signaled the same
//! sequence number.
//!
//! Several sequence numbers may be in flight at once, up to the configured
//! `max_in_flight`; pipes and join records hold that many slots.

pub mod channel;
pub mod description;
pub mod error;
pub mod filters;
pub mod graph;
pub mod group;
pub mod id;
pub mod node;
pub mod parameter;
pub mod payload;
pub mod plan;
pub mod port;
pub mod slot;

pub use channel::{AnyPipe, Pipe, PipeEvent, PipeHandler, PipeSpec, PipeStats};
pub use description::{FilterInstance, FilterRegistry, GraphDescription, PipeDescription};
pub use error::{PipelineError, PipelineResult};
pub use filters::{Collected, CollectorFilter, ForwardFilter, Pair, PairFilter, SourceFilter};
pub use graph::{Connection, Graph, GraphBuilder, NodeConnectors, PipeReport};
pub use group::{GroupEvent, MAX_GROUP_MEMBERS};
pub use id::{NodeId, PipeId, PortId, SequenceNumber, SubscriptionId};
pub use node::{Filter, FilterContext, InputConnection, Node, NodeStats};
pub use parameter::{ParameterError, ParameterValue};
pub use payload::PayloadType;
pub use plan::{GraphPlan, PlanStats};
pub use port::{ConnectionKind, ConnectorInfo, PortDescriptor, PortDirection, GROUP_JOIN, GROUP_PROCEED};
pub use slot::SlotError;

use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

// Lock helpers. Poisoned locks are recovered so a panicking filter leaves
// the graph usable.

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn read_lock<T>(rw: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    rw.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write_lock<T>(rw: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    rw.write().unwrap_or_else(PoisonError::into_inner)
}
