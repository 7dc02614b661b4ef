//! A backpressure-aware parallel stream-processing runtime for DAGs of operators.
//!
//! This crate executes a user-defined directed acyclic graph of sources,
//! transforms, and sinks over typed events. Edges are bounded MPMC queues,
//! so a full downstream queue stalls its producer and backpressure
//! propagates upstream with no explicit credit protocol.
//!
//! # Features
//!
//! - Bounded MPMC queues with blocking, try, and timed push/pop plus
//!   close-wakes-all semantics
//! - Sources driven by dedicated producer threads; everything else runs on
//!   a worker pool
//! - Round-robin and work-stealing scheduling policies
//! - Graceful shutdown that drains in-flight events before closing queues
//! - Per-queue, per-operator, per-worker, and runtime-wide metrics
//! - Builder pattern for graph construction
//!
//! # Example
//!
//! ```ignore
//! use streamgraph::{
//!     filters, int_map, CountingSink, FilterOperator, Runtime, RuntimeConfig,
//!     SequenceConfig, SequenceSource, StreamGraphBuilder,
//! };
//!
//! let source = SequenceSource::new("numbers", SequenceConfig {
//!     start: 1,
//!     count: 100,
//!     ..SequenceConfig::default()
//! });
//! let sink = CountingSink::new("count");
//! let counter = sink.counter();
//!
//! let builder = StreamGraphBuilder::new()
//!     .add_source(source)
//!     .add_operator(int_map("square", |x| x * x))
//!     .add_operator(FilterOperator::new("even", filters::even()))
//!     .add_sink(sink)
//!     .connect("numbers", "square")
//!     .connect("square", "even")
//!     .connect("even", "count");
//!
//! let mut runtime = Runtime::new(RuntimeConfig::default());
//! runtime.init(builder)?;
//! runtime.start()?;
//! runtime.await_completion();
//! runtime.stop();
//!
//! assert_eq!(counter.count(), 50);
//! ```

pub mod error;
pub mod event;
pub mod metrics;
pub mod operator;
pub mod operators;
pub mod queue;
pub mod runtime;
pub mod scheduler;
pub mod worker;

// Re-exports for convenience
pub use error::{Result, RuntimeError};
pub use event::{Event, EventKey, EventMetadata, Payload, PoisonPill, SequenceNumber, StreamItem};
pub use metrics::{Counter, Gauge, Histogram, MetricsCollector, RuntimeMetrics};
pub use operator::{
    EventQueue, Operator, OperatorContext, OperatorState, OperatorStats, SinkOperator,
    SourceOperator, StopFlag,
};
pub use operators::filter::{filters, int_filter, FilterOperator};
pub use operators::function::FunctionOperator;
pub use operators::map::{float_map, int_map, string_map, MapOperator};
pub use operators::sink::{
    AggregateHandle, AggregatingSink, ConsoleConfig, ConsoleSink, CountingSink, FunctionSink,
    NullSink, SinkCounter,
};
pub use operators::source::{
    FunctionSource, RandomConfig, RandomSource, SequenceConfig, SequenceSource,
};
pub use queue::{BoundedQueue, PushError, PushTimeoutError, QueueStats, TryPushError};
pub use runtime::{
    Edge, Runtime, RuntimeConfig, RuntimeState, StreamGraphBuilder, DEFAULT_QUEUE_CAPACITY,
};
pub use scheduler::{
    create_scheduler, OperatorInstance, RoundRobinScheduler, Scheduler, SchedulerStats,
    SchedulingPolicy, WorkStealingScheduler,
};
pub use worker::{WorkerPool, WorkerStatsSnapshot, DEFAULT_BATCH_SIZE};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
