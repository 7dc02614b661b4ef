use std::time::{Duration, Instant};

use streamgraph::{
    filters, int_map, AggregatingSink, CountingSink, FilterOperator, FunctionOperator, Runtime,
    RuntimeConfig, RuntimeState, SchedulingPolicy, SequenceConfig, SequenceSource,
    StreamGraphBuilder,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn finite_source(name: &str, start: i64, count: u64) -> SequenceSource {
    SequenceSource::new(
        name,
        SequenceConfig {
            start,
            step: 1,
            count,
            delay: Duration::ZERO,
        },
    )
}

/// Spin until the condition holds or the deadline passes.
fn wait_for(mut condition: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}

#[test]
fn test_simple_pipeline_delivers_every_event() {
    init_tracing();

    let sink = CountingSink::new("sink");
    let counter = sink.counter();

    let builder = StreamGraphBuilder::new()
        .add_source(finite_source("source", 1, 100))
        .add_sink(sink)
        .connect("source", "sink");

    let mut runtime = Runtime::new(RuntimeConfig {
        num_workers: 2,
        ..RuntimeConfig::default()
    });
    runtime.init(builder).unwrap();
    runtime.start().unwrap();
    runtime.await_completion();
    assert!(wait_for(|| counter.count() == 100, Duration::from_secs(5)));
    runtime.stop();

    assert_eq!(counter.count(), 100);
    assert_eq!(runtime.state(), RuntimeState::Stopped);
}

#[test]
fn test_map_filter_pipeline() {
    init_tracing();

    let sink = AggregatingSink::new("sink");
    let aggregates = sink.handle();

    let builder = StreamGraphBuilder::new()
        .add_source(finite_source("source", 1, 20))
        .add_operator(int_map("square", |x| x * x))
        .add_operator(FilterOperator::new("even", filters::even()))
        .add_sink(sink)
        .connect("source", "square")
        .connect("square", "even")
        .connect("even", "sink");

    let mut runtime = Runtime::new(RuntimeConfig {
        num_workers: 2,
        ..RuntimeConfig::default()
    });
    runtime.init(builder).unwrap();
    runtime.start().unwrap();
    runtime.await_completion();
    assert!(wait_for(|| aggregates.count() == 10, Duration::from_secs(5)));
    runtime.stop();

    // Squares of 1..=20, keeping the even ones:
    // 4 + 16 + 36 + 64 + 100 + 144 + 196 + 256 + 324 + 400 = 1540
    assert_eq!(aggregates.count(), 10);
    assert_eq!(aggregates.sum(), 1540);
}

#[test]
fn test_map_filter_pipeline_with_work_stealing() {
    init_tracing();

    let sink = AggregatingSink::new("sink");
    let aggregates = sink.handle();

    let builder = StreamGraphBuilder::new()
        .add_source(finite_source("source", 1, 20))
        .add_operator(int_map("square", |x| x * x))
        .add_operator(FilterOperator::new("even", filters::even()))
        .add_sink(sink)
        .connect("source", "square")
        .connect("square", "even")
        .connect("even", "sink");

    let mut runtime = Runtime::new(RuntimeConfig {
        num_workers: 4,
        scheduling_policy: SchedulingPolicy::WorkStealing,
        ..RuntimeConfig::default()
    });
    runtime.init(builder).unwrap();
    runtime.start().unwrap();
    runtime.await_completion();
    assert!(wait_for(|| aggregates.count() == 10, Duration::from_secs(5)));
    runtime.stop();

    assert_eq!(aggregates.sum(), 1540);
    let stats = runtime.scheduler_stats().expect("scheduler present");
    assert!(stats.total_scheduled > 0);
}

#[test]
fn test_fan_out_duplicates_stream() {
    init_tracing();

    let left = CountingSink::new("left");
    let left_counter = left.counter();
    let right = CountingSink::new("right");
    let right_counter = right.counter();

    let builder = StreamGraphBuilder::new()
        .add_source(finite_source("source", 0, 50))
        .add_sink(left)
        .add_sink(right)
        .connect("source", "left")
        .connect("source", "right");

    let mut runtime = Runtime::new(RuntimeConfig {
        num_workers: 2,
        ..RuntimeConfig::default()
    });
    runtime.init(builder).unwrap();
    runtime.start().unwrap();
    runtime.await_completion();
    assert!(wait_for(
        || left_counter.count() == 50 && right_counter.count() == 50,
        Duration::from_secs(5)
    ));
    runtime.stop();

    assert_eq!(left_counter.count(), 50);
    assert_eq!(right_counter.count(), 50);
}

// A fast source against a deliberately slow operator on a single worker:
// memory stays bounded by the queue capacities and every event that was
// emitted before the stop flows through.
#[test]
fn test_backpressure_with_slow_operator() {
    init_tracing();

    let sink = CountingSink::new("sink");
    let counter = sink.counter();

    let slow = FunctionOperator::emitting("slow", |event, ctx| {
        std::thread::sleep(Duration::from_micros(100));
        ctx.emit(event);
    });

    let builder = StreamGraphBuilder::new()
        .add_source(finite_source("source", 1, 10_000))
        .add_operator(slow)
        .add_sink(sink)
        .connect_with_capacity("source", "slow", 256)
        .connect_with_capacity("slow", "sink", 256);

    let mut runtime = Runtime::new(RuntimeConfig {
        num_workers: 1,
        ..RuntimeConfig::default()
    });
    runtime.init(builder).unwrap();
    runtime.start().unwrap();

    std::thread::sleep(Duration::from_millis(500));
    runtime.stop();

    let processed = runtime.metrics().events_processed().value();
    let count = counter.count();
    assert!(count > 0, "nothing flowed through the pipeline");
    assert!(count <= processed, "sink saw more events than were emitted");

    for stats in runtime.queue_stats() {
        assert!(stats.high_watermark <= stats.capacity);
    }
}

#[test]
fn test_shutdown_timeout_bounds_stop() {
    init_tracing();

    let sink = CountingSink::new("sink");
    let counter = sink.counter();

    let slow = FunctionOperator::emitting("slow", |event, ctx| {
        std::thread::sleep(Duration::from_millis(2));
        ctx.emit(event);
    });

    let builder = StreamGraphBuilder::new()
        .add_source(finite_source("source", 1, 5_000))
        .add_operator(slow)
        .add_sink(sink)
        .connect_with_capacity("source", "slow", 1024)
        .connect_with_capacity("slow", "sink", 1024);

    let mut runtime = Runtime::new(RuntimeConfig {
        num_workers: 1,
        shutdown_timeout: Some(Duration::from_millis(100)),
        ..RuntimeConfig::default()
    });
    runtime.init(builder).unwrap();
    runtime.start().unwrap();

    std::thread::sleep(Duration::from_millis(100));
    let stop_started = Instant::now();
    runtime.stop();

    // Draining 5k events at 2 ms each would take ~10 s; the deadline must
    // cut that short.
    assert!(stop_started.elapsed() < Duration::from_secs(5));
    assert!(counter.count() < 5_000);
    assert_eq!(runtime.state(), RuntimeState::Stopped);
}

#[test]
fn test_metrics_are_collected() {
    init_tracing();

    let sink = CountingSink::new("sink");
    let counter = sink.counter();

    let builder = StreamGraphBuilder::new()
        .add_source(finite_source("source", 1, 1000))
        .add_sink(sink)
        .connect("source", "sink");

    let mut runtime = Runtime::new(RuntimeConfig {
        num_workers: 2,
        ..RuntimeConfig::default()
    });
    runtime.init(builder).unwrap();
    runtime.start().unwrap();
    runtime.await_completion();
    assert!(wait_for(|| counter.count() == 1000, Duration::from_secs(5)));
    runtime.stop();

    let snapshot = runtime.metrics().snapshot();
    assert_eq!(snapshot.total_events_processed, 1000);
    assert!(runtime.metrics().uptime() > Duration::ZERO);

    let worker_events: u64 = runtime
        .worker_stats()
        .iter()
        .map(|s| s.events_processed)
        .sum();
    assert_eq!(worker_events, 1000);

    for stats in runtime.queue_stats() {
        assert_eq!(stats.push_count, 1000);
        assert_eq!(stats.pop_count, 1000);
        assert_eq!(stats.current_size, 0);
    }
}

#[test]
fn test_disabled_metrics_skip_global_counter() {
    init_tracing();

    let sink = CountingSink::new("sink");
    let counter = sink.counter();

    let builder = StreamGraphBuilder::new()
        .add_source(finite_source("source", 1, 100))
        .add_sink(sink)
        .connect("source", "sink");

    let mut runtime = Runtime::new(RuntimeConfig {
        num_workers: 1,
        enable_metrics: false,
        ..RuntimeConfig::default()
    });
    runtime.init(builder).unwrap();
    runtime.start().unwrap();
    runtime.await_completion();
    assert!(wait_for(|| counter.count() == 100, Duration::from_secs(5)));
    runtime.stop();

    assert_eq!(runtime.metrics().events_processed().value(), 0);
    assert_eq!(counter.count(), 100);
}

#[test]
fn test_unbounded_source_stops_only_externally() {
    init_tracing();

    let sink = CountingSink::new("sink");
    let counter = sink.counter();

    let builder = StreamGraphBuilder::new()
        .add_source(SequenceSource::new("infinite", SequenceConfig::default()))
        .add_sink(sink)
        .connect_with_capacity("infinite", "sink", 1024);

    let mut runtime = Runtime::new(RuntimeConfig {
        num_workers: 2,
        ..RuntimeConfig::default()
    });
    runtime.init(builder).unwrap();
    runtime.start().unwrap();

    assert!(wait_for(|| counter.count() > 10_000, Duration::from_secs(5)));
    runtime.stop();

    assert_eq!(runtime.state(), RuntimeState::Stopped);
    let count_at_stop = counter.count();
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(counter.count(), count_at_stop, "events flowed after stop");
}
