//! Test data builders for creating graphs and pipes

use super::{Log, RecordingSink};
use fliplib::pipeline::{AnyPipe, SourceFilter, GROUP_JOIN};
use fliplib::{Graph, GraphBuilder, GraphConfig, NodeId, Pipe, PipeEvent};
use std::sync::{Arc, Mutex};

pub fn graph_builder(max_in_flight: usize) -> GraphBuilder {
    GraphBuilder::new("test", GraphConfig::new(max_in_flight)).unwrap()
}

/// A standalone pipe plus its type-erased handle, for wiring nodes by hand.
pub fn pipe<T: Send + Sync + 'static>(
    name: &str,
    capacity: usize,
) -> (Arc<Pipe<T>>, Arc<dyn AnyPipe>) {
    let pipe = Arc::new(Pipe::<T>::new(name, capacity));
    let erased: Arc<dyn AnyPipe> = pipe.clone();
    (pipe, erased)
}

/// Install a subscriber that appends `(label, sequence)` to `calls`.
pub fn spy<T: Send + Sync + 'static>(
    pipe: &Pipe<T>,
    label: usize,
    calls: &Arc<Mutex<Vec<(usize, u64)>>>,
) {
    let calls = Arc::clone(calls);
    pipe.install(Arc::new(move |event: &PipeEvent| {
        calls.lock().unwrap().push((label, event.sequence.value()));
    }));
}

/// `inputs` sources, each wired into one input of a recording sink that
/// joins all of them in group 1.
pub struct JoinFixture {
    pub graph: Graph,
    pub sink: NodeId,
    pub sources: Vec<Arc<Pipe<i32>>>,
    pub log: Log<i32>,
}

impl JoinFixture {
    pub fn new(keys: &[&str], max_in_flight: usize) -> Self {
        let mut builder = graph_builder(max_in_flight);
        let (sink_filter, log) = RecordingSink::<i32>::join(keys, GROUP_JOIN);
        let sink = builder.add_filter("join", Box::new(sink_filter)).unwrap();

        let mut source_ids = Vec::new();
        for key in keys {
            let id = builder
                .add_filter(format!("source_{}", key), Box::new(SourceFilter::<i32>::new()))
                .unwrap();
            builder.connect(id, "out", sink, key).unwrap();
            source_ids.push(id);
        }

        let graph = builder.build().unwrap();
        let sources = source_ids
            .iter()
            .map(|id| graph.source::<i32>(*id, "out").unwrap())
            .collect();
        Self {
            graph,
            sink,
            sources,
            log,
        }
    }

    pub fn fired(&self) -> usize {
        self.log.lock().unwrap().len()
    }
}
