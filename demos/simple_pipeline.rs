//! Source → Map(square) → Filter(even) → AggregatingSink
//!
//! Usage: cargo run --example simple_pipeline --release

use std::time::Duration;

use streamgraph::{
    filters, int_map, AggregatingSink, FilterOperator, Runtime, RuntimeConfig, SchedulingPolicy,
    SequenceConfig, SequenceSource, StreamGraphBuilder,
};

fn main() -> streamgraph::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    println!("streamgraph {} example pipeline", streamgraph::VERSION);

    let config = RuntimeConfig {
        num_workers: 4,
        scheduling_policy: SchedulingPolicy::RoundRobin,
        ..RuntimeConfig::default()
    };

    // Generate 1..=100_000 with a small delay for rate limiting.
    let source = SequenceSource::new(
        "source",
        SequenceConfig {
            start: 1,
            step: 1,
            count: 100_000,
            delay: Duration::from_micros(10),
        },
    );

    let sink = AggregatingSink::new("aggregate");
    let aggregates = sink.handle();

    let builder = StreamGraphBuilder::new()
        .add_source(source)
        .add_operator(int_map("square", |x| x * x))
        .add_operator(FilterOperator::new("even_filter", filters::even()))
        .add_sink(sink)
        .connect("source", "square")
        .connect("square", "even_filter")
        .connect("even_filter", "aggregate");

    let mut runtime = Runtime::new(config);
    runtime.init(builder)?;
    runtime.start()?;

    runtime.await_completion();
    runtime.stop();

    println!("{}", runtime.metrics().format());
    println!(
        "aggregate: count={} sum={} mean={:.2} min={:?} max={:?}",
        aggregates.count(),
        aggregates.sum(),
        aggregates.mean(),
        aggregates.min(),
        aggregates.max()
    );

    for (i, stats) in runtime.queue_stats().iter().enumerate() {
        println!(
            "queue {i}: pushed={} popped={} high_watermark={} blocked_pushes={}",
            stats.push_count, stats.pop_count, stats.high_watermark, stats.push_blocked_count
        );
    }

    Ok(())
}
