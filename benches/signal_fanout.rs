//! Benchmarks for signal dispatch
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use fliplib::pipeline::{CollectorFilter, ForwardFilter, PairFilter, SourceFilter};
use fliplib::{GraphBuilder, GraphConfig, Pipe, PipeEvent, SequenceNumber};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

fn bench_pipe_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipe_fanout");

    for subscribers in [1usize, 4, 16].iter() {
        group.throughput(Throughput::Elements(*subscribers as u64));
        group.bench_with_input(
            BenchmarkId::new("signal_value", subscribers),
            subscribers,
            |b, &subscribers| {
                let pipe = Arc::new(Pipe::<u64>::new("bench", 4));
                let hits = Arc::new(AtomicU64::new(0));
                for _ in 0..subscribers {
                    let hits = Arc::clone(&hits);
                    let reader = Arc::downgrade(&pipe);
                    pipe.install(Arc::new(move |event: &PipeEvent| {
                        if let Some(value) = reader.upgrade().and_then(|p| p.read(event.sequence)) {
                            hits.fetch_add(*value, Ordering::Relaxed);
                        }
                    }));
                }

                let mut seq = 0u64;
                b.iter(|| {
                    pipe.signal_value(SequenceNumber(seq), black_box(1));
                    seq = seq.wrapping_add(1);
                });
            },
        );
    }

    group.finish();
}

fn bench_forward_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("forward_chain");

    for depth in [1usize, 4, 16].iter() {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("depth", depth), depth, |b, &depth| {
            let mut builder = GraphBuilder::new("bench", GraphConfig::default()).unwrap();
            let src = builder
                .add_filter("src", Box::new(SourceFilter::<u64>::new()))
                .unwrap();
            let mut last = src;
            for i in 0..depth {
                let next = builder
                    .add_filter(format!("fwd{}", i), Box::new(ForwardFilter::<u64>::new()))
                    .unwrap();
                builder.connect(last, "out", next, "in").unwrap();
                last = next;
            }
            let (collector, results) = CollectorFilter::<u64>::new();
            let sink = builder.add_filter("sink", Box::new(collector)).unwrap();
            builder.connect(last, "out", sink, "in").unwrap();
            let graph = builder.build().unwrap();
            let out = graph.source::<u64>(src, "out").unwrap();

            let mut seq = 0u64;
            b.iter(|| {
                out.signal_value(SequenceNumber(seq), black_box(seq));
                seq = seq.wrapping_add(1);
                results.try_recv().ok()
            });
        });
    }

    group.finish();
}

fn bench_group_join(c: &mut Criterion) {
    c.bench_function("group_join_pair", |b| {
        let mut builder = GraphBuilder::new("bench", GraphConfig::default()).unwrap();
        let left = builder
            .add_filter("left", Box::new(SourceFilter::<u64>::new()))
            .unwrap();
        let right = builder
            .add_filter("right", Box::new(SourceFilter::<u64>::new()))
            .unwrap();
        let pair = builder
            .add_filter("pair", Box::new(PairFilter::<u64, u64>::new()))
            .unwrap();
        builder.connect(left, "out", pair, "first").unwrap();
        builder.connect(right, "out", pair, "second").unwrap();
        let graph = builder.build().unwrap();
        let left = graph.source::<u64>(left, "out").unwrap();
        let right = graph.source::<u64>(right, "out").unwrap();

        let mut seq = 0u64;
        b.iter(|| {
            left.signal_value(SequenceNumber(seq), black_box(1));
            right.signal_value(SequenceNumber(seq), black_box(2));
            seq = seq.wrapping_add(1);
        });
    });
}

criterion_group!(benches, bench_pipe_fanout, bench_forward_chain, bench_group_join);
criterion_main!(benches);
