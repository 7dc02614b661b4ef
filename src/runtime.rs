use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam::atomic::AtomicCell;
use crossbeam::utils::Backoff;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Result, RuntimeError};
use crate::metrics::MetricsCollector;
use crate::operator::{
    EventQueue, Operator, OperatorContext, OperatorState, SinkAdapter, SinkOperator,
    SourceOperator, StopFlag,
};
use crate::queue::{BoundedQueue, QueueStats};
use crate::scheduler::{
    create_scheduler, OperatorInstance, Scheduler, SchedulerStats, SchedulingPolicy,
};
use crate::worker::{resolve_worker_count, WorkerPool, WorkerStatsSnapshot};

/// Queue capacity used by edges that do not request one.
pub const DEFAULT_QUEUE_CAPACITY: usize = 4096;

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Worker thread count; 0 auto-detects from hardware concurrency
    /// (fallback 4).
    pub num_workers: usize,
    /// Capacity for edges connected without an explicit one.
    pub default_queue_capacity: usize,
    pub scheduling_policy: SchedulingPolicy,
    /// Gate for the process-wide event counter.
    pub enable_metrics: bool,
    /// Suggested cadence for external metrics readers.
    pub metrics_interval: Duration,
    /// Bound on the shutdown drain phase; `None` drains without limit.
    /// When the deadline expires, still-queued events are abandoned.
    pub shutdown_timeout: Option<Duration>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            num_workers: 0,
            default_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            scheduling_policy: SchedulingPolicy::RoundRobin,
            enable_metrics: true,
            metrics_interval: Duration::from_secs(1),
            shutdown_timeout: None,
        }
    }
}

/// Runtime lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    Created,
    Initialized,
    Running,
    ShuttingDown,
    Stopped,
}

/// A directed connection between two named operators, realized at init as
/// one bounded queue.
#[derive(Debug, Clone)]
pub struct Edge {
    pub from: String,
    pub to: String,
    /// Explicit queue capacity; `None` uses the runtime default.
    pub capacity: Option<usize>,
}

enum GraphNode {
    Source(Box<dyn SourceOperator>),
    Transform(Box<dyn Operator>),
    Sink(Box<dyn SinkOperator>),
}

/// Accumulates operators and edges for [`Runtime::init`].
///
/// Operator names are unique within a graph; adding a second operator with
/// the same name replaces the first. Edge insertion order is preserved.
#[derive(Default)]
pub struct StreamGraphBuilder {
    nodes: Vec<(String, GraphNode)>,
    index: HashMap<String, usize>,
    edges: Vec<Edge>,
}

impl StreamGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a transform operator.
    pub fn add_operator(mut self, op: impl Operator + 'static) -> Self {
        self.insert(op.name().to_string(), GraphNode::Transform(Box::new(op)));
        self
    }

    /// Add a source operator.
    pub fn add_source(mut self, source: impl SourceOperator + 'static) -> Self {
        self.insert(source.name().to_string(), GraphNode::Source(Box::new(source)));
        self
    }

    /// Add a sink operator.
    pub fn add_sink(mut self, sink: impl SinkOperator + 'static) -> Self {
        self.insert(sink.name().to_string(), GraphNode::Sink(Box::new(sink)));
        self
    }

    fn insert(&mut self, name: String, node: GraphNode) {
        if let Some(&existing) = self.index.get(&name) {
            self.nodes[existing] = (name, node);
        } else {
            self.index.insert(name.clone(), self.nodes.len());
            self.nodes.push((name, node));
        }
    }

    /// Connect two operators with the default queue capacity.
    pub fn connect(self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.connect_edge(from.into(), to.into(), None)
    }

    /// Connect two operators with an explicit queue capacity.
    pub fn connect_with_capacity(
        self,
        from: impl Into<String>,
        to: impl Into<String>,
        capacity: usize,
    ) -> Self {
        self.connect_edge(from.into(), to.into(), Some(capacity))
    }

    fn connect_edge(mut self, from: String, to: String, capacity: Option<usize>) -> Self {
        self.edges.push(Edge { from, to, capacity });
        self
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn operator_count(&self) -> usize {
        self.nodes.len()
    }
}

struct SourceExecution {
    op: Box<dyn SourceOperator>,
    ctx: OperatorContext,
}

/// Bookkeeping for one source and the thread that drives it.
struct SourceRunner {
    name: Arc<str>,
    stop: StopFlag,
    state: AtomicCell<OperatorState>,
    execution: Arc<Mutex<SourceExecution>>,
}

enum RuntimeNode {
    Source(SourceRunner),
    Scheduled(Arc<OperatorInstance>),
}

impl RuntimeNode {
    fn set_state(&self, state: OperatorState) {
        match self {
            RuntimeNode::Source(runner) => runner.state.store(state),
            RuntimeNode::Scheduled(instance) => instance.set_state(state),
        }
    }
}

/// Owns the materialized graph and coordinates its execution.
///
/// The graph is frozen once [`Runtime::init`] succeeds: queues, instances,
/// scheduler and worker pool are fixed for the runtime's lifetime.
/// Operator panics are not caught; a panicking operator takes its worker
/// thread down with it.
pub struct Runtime {
    config: RuntimeConfig,
    state: RuntimeState,
    nodes: Vec<RuntimeNode>,
    queues: Vec<Arc<EventQueue>>,
    scheduler: Option<Arc<dyn Scheduler>>,
    worker_pool: Option<WorkerPool>,
    metrics: Arc<MetricsCollector>,
    running: Arc<AtomicBool>,
    source_threads: Vec<JoinHandle<()>>,
}

impl Runtime {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            state: RuntimeState::Created,
            nodes: Vec::new(),
            queues: Vec::new(),
            scheduler: None,
            worker_pool: None,
            metrics: Arc::new(MetricsCollector::new()),
            running: Arc::new(AtomicBool::new(false)),
            source_threads: Vec::new(),
        }
    }

    /// Materialize the graph: one queue per edge, one instance per
    /// operator, scheduler and worker pool sized to the configuration, and
    /// `init` called on every operator in insertion order.
    pub fn init(&mut self, builder: StreamGraphBuilder) -> Result<()> {
        if self.state != RuntimeState::Created {
            return Err(RuntimeError::InvalidState {
                expected: RuntimeState::Created,
                actual: self.state,
            });
        }

        let mut output_queues: HashMap<String, Vec<Arc<EventQueue>>> = HashMap::new();
        let mut input_queues: HashMap<String, Arc<EventQueue>> = HashMap::new();

        for edge in &builder.edges {
            let Some(&from_idx) = builder.index.get(&edge.from) else {
                return Err(RuntimeError::UnknownOperator(edge.from.clone()));
            };
            let Some(&to_idx) = builder.index.get(&edge.to) else {
                return Err(RuntimeError::UnknownOperator(edge.to.clone()));
            };
            if matches!(builder.nodes[to_idx].1, GraphNode::Source(_)) {
                return Err(RuntimeError::EdgeIntoSource(edge.to.clone()));
            }
            if matches!(builder.nodes[from_idx].1, GraphNode::Sink(_)) {
                return Err(RuntimeError::EdgeFromSink(edge.from.clone()));
            }

            let capacity = edge.capacity.unwrap_or(self.config.default_queue_capacity);
            let queue = Arc::new(BoundedQueue::new(capacity));
            self.queues.push(Arc::clone(&queue));
            output_queues
                .entry(edge.from.clone())
                .or_default()
                .push(Arc::clone(&queue));
            if input_queues.insert(edge.to.clone(), queue).is_some() {
                return Err(RuntimeError::FanInUnsupported(edge.to.clone()));
            }
        }

        let edge_count = builder.edges.len();
        let mut instances = Vec::new();

        for (instance_id, (name, node)) in builder.nodes.into_iter().enumerate() {
            let instance_id = instance_id as u32;
            let mut ctx = OperatorContext::new(name.as_str(), instance_id);
            for queue in output_queues.remove(&name).unwrap_or_default() {
                ctx.add_output(queue);
            }

            match node {
                GraphNode::Source(op) => {
                    self.nodes.push(RuntimeNode::Source(SourceRunner {
                        name: Arc::from(name.as_str()),
                        stop: op.stop_flag().clone(),
                        state: AtomicCell::new(OperatorState::Created),
                        execution: Arc::new(Mutex::new(SourceExecution { op, ctx })),
                    }));
                }
                GraphNode::Transform(op) => {
                    let input = input_queues.get(&name).cloned();
                    let instance =
                        Arc::new(OperatorInstance::new(op, input, ctx, instance_id));
                    instances.push(Arc::clone(&instance));
                    self.nodes.push(RuntimeNode::Scheduled(instance));
                }
                GraphNode::Sink(op) => {
                    let input = input_queues.get(&name).cloned();
                    let instance = Arc::new(OperatorInstance::new(
                        Box::new(SinkAdapter::new(op)),
                        input,
                        ctx,
                        instance_id,
                    ));
                    instances.push(Arc::clone(&instance));
                    self.nodes.push(RuntimeNode::Scheduled(instance));
                }
            }
        }

        let num_workers = resolve_worker_count(self.config.num_workers);
        let scheduler = create_scheduler(self.config.scheduling_policy, instances, num_workers);
        self.worker_pool = Some(WorkerPool::new(num_workers, Arc::clone(&scheduler)));
        self.scheduler = Some(scheduler);

        for node in &self.nodes {
            match node {
                RuntimeNode::Source(runner) => {
                    let mut exec = runner.execution.lock();
                    let SourceExecution { op, ctx } = &mut *exec;
                    op.init(ctx);
                }
                RuntimeNode::Scheduled(instance) => {
                    instance.with_execution(|op, ctx| op.init(ctx));
                }
            }
            node.set_state(OperatorState::Initialized);
        }

        self.state = RuntimeState::Initialized;
        debug!(
            operators = self.nodes.len(),
            edges = edge_count,
            workers = num_workers,
            policy = ?self.config.scheduling_policy,
            "runtime initialized"
        );
        Ok(())
    }

    /// Start the worker pool and one producer thread per source.
    pub fn start(&mut self) -> Result<()> {
        if self.state != RuntimeState::Initialized {
            return Err(RuntimeError::InvalidState {
                expected: RuntimeState::Initialized,
                actual: self.state,
            });
        }

        self.running.store(true, Ordering::Release);
        self.state = RuntimeState::Running;
        for node in &self.nodes {
            node.set_state(OperatorState::Running);
        }

        if let Some(pool) = self.worker_pool.as_mut() {
            pool.start()?;
        }

        let mut sources = 0;
        for node in &self.nodes {
            let RuntimeNode::Source(runner) = node else {
                continue;
            };
            sources += 1;

            let name = Arc::clone(&runner.name);
            let execution = Arc::clone(&runner.execution);
            let stop = runner.stop.clone();
            let running = Arc::clone(&self.running);
            let metrics = Arc::clone(&self.metrics);
            let count_events = self.config.enable_metrics;

            let handle = std::thread::Builder::new()
                .name(format!("source-{name}"))
                .spawn(move || {
                    debug!(source = %name, "source thread started");
                    while running.load(Ordering::Acquire) && !stop.is_set() {
                        let mut exec = execution.lock();
                        let SourceExecution { op, ctx } = &mut *exec;
                        let keep_going = op.generate(ctx);
                        drop(exec);
                        if !keep_going {
                            break;
                        }
                        if count_events {
                            metrics.events_processed().increment();
                        }
                    }
                    debug!(source = %name, "source thread finished");
                })
                .map_err(RuntimeError::ThreadSpawn)?;
            self.source_threads.push(handle);
        }

        info!(
            workers = self.worker_pool.as_ref().map_or(0, WorkerPool::num_workers),
            sources,
            "runtime started"
        );
        Ok(())
    }

    /// Stop gracefully: stop sources, drain queues, close queues, join
    /// workers, shut operators down. Idempotent.
    pub fn stop(&mut self) {
        if self.state != RuntimeState::Running {
            return;
        }
        self.state = RuntimeState::ShuttingDown;
        debug!("stopping runtime");

        for node in &self.nodes {
            node.set_state(OperatorState::ShuttingDown);
            if let RuntimeNode::Source(runner) = node {
                runner.stop.request_stop();
            }
        }
        for handle in self.source_threads.drain(..) {
            let _ = handle.join();
        }

        self.drain_queues();

        self.running.store(false, Ordering::Release);
        for queue in &self.queues {
            queue.close();
        }
        if let Some(pool) = self.worker_pool.as_mut() {
            pool.stop();
        }

        for node in &self.nodes {
            match node {
                RuntimeNode::Source(runner) => {
                    let mut exec = runner.execution.lock();
                    let SourceExecution { op, ctx } = &mut *exec;
                    op.shutdown(ctx);
                }
                RuntimeNode::Scheduled(instance) => {
                    instance.with_execution(|op, ctx| op.shutdown(ctx));
                }
            }
            node.set_state(OperatorState::Stopped);
        }

        self.state = RuntimeState::Stopped;
        info!("runtime stopped");
    }

    /// Sleep-poll until every queue is empty, bounded by the configured
    /// shutdown timeout. Workers keep draining in the meantime.
    fn drain_queues(&self) {
        let deadline = self.config.shutdown_timeout.map(|t| Instant::now() + t);
        let backoff = Backoff::new();
        loop {
            let pending: usize = self.queues.iter().map(|q| q.len()).sum();
            if pending == 0 {
                break;
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    warn!(pending, "shutdown deadline expired, abandoning queued events");
                    break;
                }
            }
            if backoff.is_completed() {
                std::thread::sleep(Duration::from_millis(1));
            } else {
                backoff.snooze();
            }
        }
    }

    /// Join the source threads. Useful when every source is finite; the
    /// runtime keeps running until [`Runtime::stop`].
    pub fn await_completion(&mut self) {
        for handle in self.source_threads.drain(..) {
            let _ = handle.join();
        }
    }

    pub fn state(&self) -> RuntimeState {
        self.state
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Statistics for every queue, in edge insertion order.
    pub fn queue_stats(&self) -> Vec<QueueStats> {
        self.queues.iter().map(|q| q.stats()).collect()
    }

    pub fn scheduler_stats(&self) -> Option<SchedulerStats> {
        self.scheduler.as_ref().map(|s| s.stats())
    }

    pub fn worker_stats(&self) -> Vec<WorkerStatsSnapshot> {
        self.worker_pool
            .as_ref()
            .map(WorkerPool::stats)
            .unwrap_or_default()
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.stop();
    }
}
