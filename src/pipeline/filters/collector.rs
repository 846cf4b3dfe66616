//! CollectorFilter: sink that forwards every received value over a
//! crossbeam channel.
//!
//! Useful at the end of a graph when results are consumed on another
//! thread.

use super::{builtin_port_id, builtin_type_name};
use crate::pipeline::channel::PipeEvent;
use crate::pipeline::error::PipelineResult;
use crate::pipeline::group::GroupEvent;
use crate::pipeline::id::SequenceNumber;
use crate::pipeline::node::{Filter, FilterContext};
use crate::pipeline::port::PortDescriptor;
use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;

/// Item delivered by a [`CollectorFilter`].
pub type Collected<T> = (SequenceNumber, Arc<T>);

pub struct CollectorFilter<T> {
    type_name: String,
    ports: Vec<PortDescriptor>,
    sender: Sender<Collected<T>>,
}

impl<T: Send + Sync + 'static> CollectorFilter<T> {
    /// Collector with an unbounded channel.
    pub fn new() -> (Self, Receiver<Collected<T>>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self::with_sender(tx), rx)
    }

    pub fn with_sender(sender: Sender<Collected<T>>) -> Self {
        Self {
            type_name: builtin_type_name::<T>("collector"),
            ports: vec![PortDescriptor::input::<T>(
                builtin_port_id::<T>("collector", "in"),
                "in",
            )],
            sender,
        }
    }

    /// Place the input in `group`. A collector in group 1 waits for the
    /// signal like a single-member join.
    pub fn with_group(mut self, group: u32) -> Self {
        self.ports = self
            .ports
            .drain(..)
            .map(|port| port.with_group(group))
            .collect();
        self
    }

    fn collect(&self, ctx: &FilterContext<'_>) -> PipelineResult<()> {
        let value = ctx.read::<T>("in")?;
        self.sender
            .send((ctx.sequence(), value))
            .map_err(|_| ctx.error("collector receiver disconnected"))
    }
}

impl<T: Send + Sync + 'static> Filter for CollectorFilter<T> {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn ports(&self) -> &[PortDescriptor] {
        &self.ports
    }

    fn proceed(&mut self, ctx: &mut FilterContext<'_>, _event: &PipeEvent) -> PipelineResult<()> {
        self.collect(ctx)
    }

    fn proceed_group(
        &mut self,
        ctx: &mut FilterContext<'_>,
        _event: &GroupEvent,
    ) -> PipelineResult<()> {
        self.collect(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GraphConfig;
    use crate::pipeline::filters::SourceFilter;
    use crate::pipeline::graph::GraphBuilder;
    use crate::pipeline::port::GROUP_JOIN;

    #[test]
    fn test_collects_in_signal_order() {
        let mut b = GraphBuilder::new("collect", GraphConfig::default()).unwrap();
        let src = b.add_filter("src", Box::new(SourceFilter::<f64>::new())).unwrap();
        let (collector, rx) = CollectorFilter::<f64>::new();
        let sink = b.add_filter("sink", Box::new(collector)).unwrap();
        b.connect(src, "out", sink, "in").unwrap();
        let graph = b.build().unwrap();

        let out = graph.source::<f64>(src, "out").unwrap();
        out.signal_value(SequenceNumber(1), 0.5);
        out.signal_value(SequenceNumber(2), 1.5);

        let got: Vec<(u64, f64)> = rx.try_iter().map(|(seq, v)| (seq.value(), *v)).collect();
        assert_eq!(got, vec![(1, 0.5), (2, 1.5)]);
    }

    #[test]
    fn test_group_collector() {
        let (collector, _rx) = CollectorFilter::<u8>::new();
        let collector = collector.with_group(GROUP_JOIN);
        assert_eq!(collector.ports()[0].group(), GROUP_JOIN);
    }

    #[test]
    fn test_disconnected_receiver_counts_failure() {
        let mut b = GraphBuilder::new("collect", GraphConfig::default()).unwrap();
        let src = b.add_filter("src", Box::new(SourceFilter::<u8>::new())).unwrap();
        let (collector, rx) = CollectorFilter::<u8>::new();
        let sink = b.add_filter("sink", Box::new(collector)).unwrap();
        b.connect(src, "out", sink, "in").unwrap();
        let graph = b.build().unwrap();
        drop(rx);

        graph
            .source::<u8>(src, "out")
            .unwrap()
            .signal_value(SequenceNumber(0), 1);
        assert_eq!(graph.node(sink).unwrap().stats().failures, 1);
    }
}
