use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tracing::trace;

use crate::event::Event;
use crate::queue::{BoundedQueue, TryPushError};

/// Queue type carried by every edge of the graph.
pub type EventQueue = BoundedQueue<Event>;

/// Lifecycle state of an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorState {
    Created,
    Initialized,
    Running,
    /// Execution temporarily suspended.
    Paused,
    ShuttingDown,
    Stopped,
}

/// Per-operator statistics.
///
/// Written only by the thread currently driving the operator; readers use
/// relaxed atomic loads and may observe values mid-update.
#[derive(Debug, Default)]
pub struct OperatorStats {
    events_received: AtomicU64,
    events_emitted: AtomicU64,
    events_dropped: AtomicU64,
    backpressure_events: AtomicU64,
    processing_time_ns: AtomicU64,
}

impl OperatorStats {
    pub fn record_received(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_emitted(&self) {
        self.events_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_backpressure(&self) {
        self.backpressure_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_processing_time(&self, nanos: u64) {
        self.processing_time_ns.fetch_add(nanos, Ordering::Relaxed);
    }

    pub fn events_received(&self) -> u64 {
        self.events_received.load(Ordering::Relaxed)
    }

    pub fn events_emitted(&self) -> u64 {
        self.events_emitted.load(Ordering::Relaxed)
    }

    pub fn events_dropped(&self) -> u64 {
        self.events_dropped.load(Ordering::Relaxed)
    }

    pub fn backpressure_events(&self) -> u64 {
        self.backpressure_events.load(Ordering::Relaxed)
    }

    pub fn processing_time_ns(&self) -> u64 {
        self.processing_time_ns.load(Ordering::Relaxed)
    }
}

/// Shared cooperative-stop flag for sources.
///
/// The runtime sets it during shutdown; sources check it between emissions.
#[derive(Debug, Clone, Default)]
pub struct StopFlag {
    flag: Arc<AtomicBool>,
}

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Execution context handed to an operator: its identity plus the output
/// queues it emits into.
///
/// `emit` fans out to every registered output. With more than one output
/// the event is cloned per extra edge (payload buffers are shared, so the
/// clone is a refcount bump) and moved into the last.
pub struct OperatorContext {
    name: Arc<str>,
    instance_id: u32,
    outputs: Vec<Arc<EventQueue>>,
    stats: Arc<OperatorStats>,
}

impl OperatorContext {
    pub fn new(name: impl Into<Arc<str>>, instance_id: u32) -> Self {
        Self {
            name: name.into(),
            instance_id,
            outputs: Vec::new(),
            stats: Arc::new(OperatorStats::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instance_id(&self) -> u32 {
        self.instance_id
    }

    /// Register an output queue for this operator.
    pub fn add_output(&mut self, queue: Arc<EventQueue>) {
        self.outputs.push(queue);
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    pub fn outputs(&self) -> &[Arc<EventQueue>] {
        &self.outputs
    }

    pub fn stats(&self) -> &OperatorStats {
        &self.stats
    }

    pub(crate) fn stats_handle(&self) -> Arc<OperatorStats> {
        Arc::clone(&self.stats)
    }

    /// Emit an event to all output queues, blocking on full queues so
    /// backpressure propagates upstream.
    ///
    /// Returns the number of outputs that accepted the event. Zero with
    /// registered outputs means every output is closed; callers treat that
    /// as end-of-stream.
    pub fn emit(&self, event: Event) -> usize {
        let Some((last, rest)) = self.outputs.split_last() else {
            return 0;
        };
        let mut delivered = 0;
        for output in rest {
            if self.push_blocking(output, event.clone()) {
                delivered += 1;
            }
        }
        if self.push_blocking(last, event) {
            delivered += 1;
        }
        delivered
    }

    /// Emit without blocking; full outputs are skipped.
    pub fn try_emit(&self, event: Event) -> usize {
        let Some((last, rest)) = self.outputs.split_last() else {
            return 0;
        };
        let mut delivered = 0;
        for output in rest {
            if output.try_push(event.clone()).is_ok() {
                delivered += 1;
            }
        }
        if last.try_push(event).is_ok() {
            delivered += 1;
        }
        delivered
    }

    fn push_blocking(&self, output: &EventQueue, event: Event) -> bool {
        match output.try_push(event) {
            Ok(()) => true,
            Err(TryPushError::Full(event)) => {
                self.stats.record_backpressure();
                output.push(event).is_ok()
            }
            Err(TryPushError::Closed(_)) => {
                trace!(operator = %self.name, "emit to closed queue");
                false
            }
        }
    }
}

/// A transform in the stream graph.
///
/// `init` is called once before the first `process`, `shutdown` once after
/// the last. `process` runs to completion on the worker thread that
/// selected the operator; long waits belong in timed queue operations, not
/// inside `process`.
pub trait Operator: Send {
    fn name(&self) -> &str;

    fn init(&mut self, _ctx: &mut OperatorContext) {}

    /// Process a single event, emitting any outputs through the context.
    fn process(&mut self, event: Event, ctx: &mut OperatorContext);

    fn shutdown(&mut self, _ctx: &mut OperatorContext) {}

    /// Periodic hook. The runtime defines but never schedules it.
    fn on_timer(&mut self, _ctx: &mut OperatorContext) {}
}

/// An event producer driven by a dedicated thread.
pub trait SourceOperator: Send {
    fn name(&self) -> &str;

    fn init(&mut self, _ctx: &mut OperatorContext) {}

    /// Produce events; return `false` to signal end of stream.
    ///
    /// Implementations must check [`SourceOperator::should_stop`] between
    /// emissions so shutdown stays prompt.
    fn generate(&mut self, ctx: &mut OperatorContext) -> bool;

    fn shutdown(&mut self, _ctx: &mut OperatorContext) {}

    /// The shared flag the runtime uses to request a cooperative stop.
    fn stop_flag(&self) -> &StopFlag;

    fn should_stop(&self) -> bool {
        self.stop_flag().is_set()
    }

    fn request_stop(&self) {
        self.stop_flag().request_stop();
    }
}

/// A terminal consumer of events.
pub trait SinkOperator: Send {
    fn name(&self) -> &str;

    fn init(&mut self, _ctx: &mut OperatorContext) {}

    /// Consume an event, taking ownership.
    fn consume(&mut self, event: Event);

    fn shutdown(&mut self, _ctx: &mut OperatorContext) {}
}

/// Adapts a sink to the operator contract so sinks can be scheduled like
/// any other instance.
pub(crate) struct SinkAdapter {
    sink: Box<dyn SinkOperator>,
}

impl SinkAdapter {
    pub(crate) fn new(sink: Box<dyn SinkOperator>) -> Self {
        Self { sink }
    }
}

impl Operator for SinkAdapter {
    fn name(&self) -> &str {
        self.sink.name()
    }

    fn init(&mut self, ctx: &mut OperatorContext) {
        self.sink.init(ctx);
    }

    fn process(&mut self, event: Event, ctx: &mut OperatorContext) {
        ctx.stats().record_received();
        self.sink.consume(event);
    }

    fn shutdown(&mut self, ctx: &mut OperatorContext) {
        self.sink.shutdown(ctx);
    }
}
