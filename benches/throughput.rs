use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::time::Duration;
use streamgraph::{
    filters, int_map, CountingSink, FilterOperator, NullSink, Runtime, RuntimeConfig,
    SchedulingPolicy, SequenceConfig, SequenceSource, StreamGraphBuilder,
};

fn run_to_completion(mut runtime: Runtime, builder: StreamGraphBuilder) {
    runtime.init(builder).expect("init failed");
    runtime.start().expect("start failed");
    runtime.await_completion();
    runtime.stop();
}

fn source(count: u64) -> SequenceSource {
    SequenceSource::new(
        "source",
        SequenceConfig {
            start: 1,
            step: 1,
            count,
            delay: Duration::ZERO,
        },
    )
}

fn benchmark_source_to_sink(c: &mut Criterion) {
    c.bench_function("source_to_sink_10k_events", |b| {
        b.iter(|| {
            let builder = StreamGraphBuilder::new()
                .add_source(source(black_box(10_000)))
                .add_sink(NullSink::new("sink"))
                .connect("source", "sink");

            let runtime = Runtime::new(RuntimeConfig {
                num_workers: 2,
                ..RuntimeConfig::default()
            });
            run_to_completion(runtime, builder);
        });
    });
}

fn benchmark_map_filter_chain(c: &mut Criterion) {
    c.bench_function("map_filter_chain_10k_events", |b| {
        b.iter(|| {
            let sink = CountingSink::new("sink");
            let counter = sink.counter();

            let builder = StreamGraphBuilder::new()
                .add_source(source(black_box(10_000)))
                .add_operator(int_map("square", |x| x * x))
                .add_operator(FilterOperator::new("even", filters::even()))
                .add_sink(sink)
                .connect("source", "square")
                .connect("square", "even")
                .connect("even", "sink");

            let runtime = Runtime::new(RuntimeConfig {
                num_workers: 2,
                ..RuntimeConfig::default()
            });
            run_to_completion(runtime, builder);
            black_box(counter.count());
        });
    });
}

fn benchmark_work_stealing(c: &mut Criterion) {
    c.bench_function("work_stealing_10k_events", |b| {
        b.iter(|| {
            let builder = StreamGraphBuilder::new()
                .add_source(source(black_box(10_000)))
                .add_operator(int_map("double", |x| x * 2))
                .add_sink(NullSink::new("sink"))
                .connect("source", "double")
                .connect("double", "sink");

            let runtime = Runtime::new(RuntimeConfig {
                num_workers: 4,
                scheduling_policy: SchedulingPolicy::WorkStealing,
                ..RuntimeConfig::default()
            });
            run_to_completion(runtime, builder);
        });
    });
}

criterion_group!(
    name = benches;
    config = Criterion::default().measurement_time(Duration::from_secs(10));
    targets = benchmark_source_to_sink, benchmark_map_filter_chain, benchmark_work_stealing
);
criterion_main!(benches);
