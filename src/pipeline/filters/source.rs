//! SourceFilter: graph entry point.
//!
//! Has a single output and no inputs. Producers obtain the output pipe with
//! [`Graph::source`](crate::pipeline::Graph::source) and drive it directly.

use super::{builtin_port_id, builtin_type_name};
use crate::pipeline::node::Filter;
use crate::pipeline::port::PortDescriptor;
use std::marker::PhantomData;

pub struct SourceFilter<T> {
    type_name: String,
    ports: Vec<PortDescriptor>,
    _payload: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> SourceFilter<T> {
    pub fn new() -> Self {
        Self::with_type_name(builtin_type_name::<T>("source"))
    }

    pub fn with_type_name(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            ports: vec![PortDescriptor::output::<T>(
                builtin_port_id::<T>("source", "out"),
                "out",
            )],
            _payload: PhantomData,
        }
    }
}

impl<T: Send + Sync + 'static> Default for SourceFilter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + Sync + 'static> Filter for SourceFilter<T> {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn ports(&self) -> &[PortDescriptor] {
        &self.ports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GraphConfig;
    use crate::pipeline::channel::PipeEvent;
    use crate::pipeline::id::{NodeId, SequenceNumber};
    use crate::pipeline::node::Node;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_single_output() {
        let filter = SourceFilter::<u16>::new();
        assert_eq!(filter.type_name(), "source<u16>");
        assert_eq!(filter.ports().len(), 1);
        assert_eq!(filter.ports()[0].name(), "out");
        assert!(!filter.ports()[0].is_input());
        assert_eq!(
            filter.ports()[0].id(),
            SourceFilter::<u16>::default().ports()[0].id()
        );
    }

    #[test]
    fn test_driven_by_producer() {
        let node = Node::new(
            NodeId::new_random(),
            "src",
            Box::new(SourceFilter::<u16>::new()),
            &GraphConfig::default(),
        )
        .unwrap();
        let out = node.output::<u16>("out").unwrap();

        // Unlinked: nothing is written.
        assert!(!out.signal_value(SequenceNumber(0), 1));

        let last = Arc::new(AtomicU64::new(u64::MAX));
        let last_clone = Arc::clone(&last);
        out.install(Arc::new(move |event: &PipeEvent| {
            last_clone.store(event.sequence.value(), Ordering::SeqCst);
        }));
        assert!(out.signal_value(SequenceNumber(9), 3));
        assert_eq!(last.load(Ordering::SeqCst), 9);
        assert_eq!(out.peek(SequenceNumber(9)).as_deref(), Ok(&3));
    }
}
