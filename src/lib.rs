//! # fliplib: typed pipes and push dispatch for processing graphs
//!
//! A processing graph is a set of filters connected by typed pipes. Each
//! datum travels with a sequence number; producers write and signal it, and
//! every downstream filter runs synchronously on the producer's thread. A
//! filter that needs several inputs declares them in a join group and runs
//! once per sequence number, after all of them arrived.
//!
//! ## Architecture
//!
//! - **Pipes**: ring of `max_in_flight` slots addressed by
//!   `sequence_number mod max_in_flight`, plus an ordered subscriber list
//! - **Nodes**: host a [`Filter`], own its output pipes and dispatch input
//!   signals (per signal, or per completed join group)
//! - **Graphs**: built and validated by [`GraphBuilder`], or instantiated
//!   from a TOML/JSON [`GraphDescription`](pipeline::GraphDescription)
//!
//! ## Example
//!
//! ```
//! use fliplib::pipeline::{CollectorFilter, ForwardFilter, SourceFilter};
//! use fliplib::{GraphBuilder, GraphConfig, SequenceNumber};
//!
//! # fn main() -> fliplib::Result<()> {
//! let mut builder = GraphBuilder::new("example", GraphConfig::default())?;
//! let camera = builder.add_filter("camera", Box::new(SourceFilter::<u32>::new()))?;
//! let relay = builder.add_filter("relay", Box::new(ForwardFilter::<u32>::new()))?;
//! let (collector, results) = CollectorFilter::<u32>::new();
//! let sink = builder.add_filter("sink", Box::new(collector))?;
//! builder.connect(camera, "out", relay, "in")?;
//! builder.connect(relay, "out", sink, "in")?;
//! let graph = builder.build()?;
//!
//! graph.source::<u32>(camera, "out")?.signal_value(SequenceNumber(7), 42);
//!
//! let (seq, value) = results.recv().expect("value");
//! assert_eq!((seq, *value), (SequenceNumber(7), 42));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod pipeline;

// Re-export commonly used types
pub use config::{GraphConfig, OverwritePolicy};
pub use error::{Error, Result, ResultExt};
pub use pipeline::{
    Filter, FilterContext, Graph, GraphBuilder, Node, NodeId, Pipe, PipeEvent, PipelineError,
    PipelineResult, PortDescriptor, PortId, SequenceNumber,
};
