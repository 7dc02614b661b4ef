//! One source fanning out to a console sink and a counting sink.
//!
//! Usage: cargo run --example fanout_pipeline --release

use std::time::Duration;

use streamgraph::{
    ConsoleConfig, ConsoleSink, CountingSink, Runtime, RuntimeConfig, SchedulingPolicy,
    SequenceConfig, SequenceSource, StreamGraphBuilder,
};

fn main() -> streamgraph::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".into()),
        )
        .init();

    let source = SequenceSource::new(
        "ticker",
        SequenceConfig {
            start: 0,
            step: 5,
            count: 20,
            delay: Duration::from_millis(10),
        },
    );

    let console = ConsoleSink::new(
        "console",
        ConsoleConfig {
            prefix: "tick".to_string(),
            show_key: true,
            show_timestamp: false,
        },
    );

    let counting = CountingSink::new("count");
    let counter = counting.counter();

    let builder = StreamGraphBuilder::new()
        .add_source(source)
        .add_sink(console)
        .add_sink(counting)
        .connect("ticker", "console")
        .connect("ticker", "count");

    let mut runtime = Runtime::new(RuntimeConfig {
        num_workers: 2,
        scheduling_policy: SchedulingPolicy::WorkStealing,
        ..RuntimeConfig::default()
    });
    runtime.init(builder)?;
    runtime.start()?;
    runtime.await_completion();
    runtime.stop();

    println!("counting sink saw {} events", counter.count());
    println!("{}", runtime.metrics().format());

    Ok(())
}
