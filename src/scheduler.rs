use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam::atomic::AtomicCell;
use crossbeam::utils::CachePadded;
use parking_lot::Mutex;
use rand::Rng;
use tracing::debug;

use crate::operator::{EventQueue, Operator, OperatorContext, OperatorState, OperatorStats};

/// Scheduling policy selection.
///
/// Only `RoundRobin` and `WorkStealing` are implemented; the remaining
/// policies fall back to round-robin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulingPolicy {
    #[default]
    RoundRobin,
    WorkStealing,
    Priority,
    LoadAware,
}

/// Scheduler statistics snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub total_scheduled: u64,
    pub idle_cycles: u64,
    pub work_stolen: u64,
}

#[derive(Debug, Default)]
struct StatsCells {
    total_scheduled: AtomicU64,
    idle_cycles: AtomicU64,
    work_stolen: AtomicU64,
}

impl StatsCells {
    fn snapshot(&self) -> SchedulerStats {
        SchedulerStats {
            total_scheduled: self.total_scheduled.load(Ordering::Relaxed),
            idle_cycles: self.idle_cycles.load(Ordering::Relaxed),
            work_stolen: self.work_stolen.load(Ordering::Relaxed),
        }
    }
}

struct Execution {
    op: Box<dyn Operator>,
    ctx: OperatorContext,
}

/// A schedulable operator bound to its input queue and emission context.
///
/// Workers share instances through `Arc`; the operator and context sit
/// behind a mutex and `execute_*` uses `try_lock`, so a worker handed an
/// instance another worker is already driving simply reports zero progress.
pub struct OperatorInstance {
    name: Arc<str>,
    instance_id: u32,
    input: Option<Arc<EventQueue>>,
    stats: Arc<OperatorStats>,
    state: AtomicCell<OperatorState>,
    execution: Mutex<Execution>,
}

impl OperatorInstance {
    pub fn new(
        op: Box<dyn Operator>,
        input: Option<Arc<EventQueue>>,
        ctx: OperatorContext,
        instance_id: u32,
    ) -> Self {
        Self {
            name: Arc::from(op.name()),
            instance_id,
            input,
            stats: ctx.stats_handle(),
            state: AtomicCell::new(OperatorState::Created),
            execution: Mutex::new(Execution { op, ctx }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instance_id(&self) -> u32 {
        self.instance_id
    }

    pub fn input(&self) -> Option<&Arc<EventQueue>> {
        self.input.as_ref()
    }

    pub fn stats(&self) -> &OperatorStats {
        &self.stats
    }

    pub fn state(&self) -> OperatorState {
        self.state.load()
    }

    pub(crate) fn set_state(&self, state: OperatorState) {
        self.state.store(state);
    }

    /// Run a closure against the guarded operator and context, e.g. for
    /// lifecycle hooks.
    pub(crate) fn with_execution<R>(
        &self,
        f: impl FnOnce(&mut dyn Operator, &mut OperatorContext) -> R,
    ) -> R {
        let mut exec = self.execution.lock();
        let Execution { op, ctx } = &mut *exec;
        f(op.as_mut(), ctx)
    }

    /// Whether the input queue currently holds events.
    pub fn has_work(&self) -> bool {
        self.input.as_ref().is_some_and(|queue| !queue.is_empty())
    }

    /// Process at most one event. Returns whether work was done.
    pub fn execute_once(&self) -> bool {
        self.execute_batch(1) == 1
    }

    /// Process up to `max_batch` events, stopping early when the input
    /// reports empty. Returns the number processed.
    ///
    /// Bounding the batch keeps one busy instance from monopolizing a
    /// worker.
    pub fn execute_batch(&self, max_batch: usize) -> usize {
        let Some(input) = self.input.as_ref() else {
            return 0;
        };
        let Some(mut exec) = self.execution.try_lock() else {
            return 0;
        };
        let Execution { op, ctx } = &mut *exec;

        let mut processed = 0;
        while processed < max_batch {
            match input.try_pop() {
                Some(event) => {
                    op.process(event, ctx);
                    processed += 1;
                }
                None => break,
            }
        }
        processed
    }
}

/// Hands ready instances to workers.
pub trait Scheduler: Send + Sync {
    /// Select the next ready instance for `worker_id`, or `None` when
    /// nothing is ready from this worker's perspective right now.
    fn next(&self, worker_id: usize) -> Option<Arc<OperatorInstance>>;

    /// Hint that work may have appeared. Not correctness-critical; workers
    /// retry regardless.
    fn notify_work_available(&self) {}

    fn stats(&self) -> SchedulerStats;

    fn policy(&self) -> SchedulingPolicy;
}

/// Cycles each worker's own cursor over the global instance list.
pub struct RoundRobinScheduler {
    instances: Vec<Arc<OperatorInstance>>,
    positions: Vec<CachePadded<AtomicUsize>>,
    stats: StatsCells,
}

impl RoundRobinScheduler {
    pub fn new(instances: Vec<Arc<OperatorInstance>>, num_workers: usize) -> Self {
        assert!(num_workers > 0, "scheduler requires at least one worker");
        Self {
            instances,
            positions: (0..num_workers)
                .map(|_| CachePadded::new(AtomicUsize::new(0)))
                .collect(),
            stats: StatsCells::default(),
        }
    }
}

impl Scheduler for RoundRobinScheduler {
    fn next(&self, worker_id: usize) -> Option<Arc<OperatorInstance>> {
        if self.instances.is_empty() {
            return None;
        }
        self.stats.total_scheduled.fetch_add(1, Ordering::Relaxed);

        let position = &self.positions[worker_id];
        for _ in 0..self.instances.len() {
            let pos = position.fetch_add(1, Ordering::Relaxed);
            let instance = &self.instances[pos % self.instances.len()];
            if instance.has_work() {
                return Some(Arc::clone(instance));
            }
        }

        self.stats.idle_cycles.fetch_add(1, Ordering::Relaxed);
        None
    }

    fn stats(&self) -> SchedulerStats {
        self.stats.snapshot()
    }

    fn policy(&self) -> SchedulingPolicy {
        SchedulingPolicy::RoundRobin
    }
}

/// Scans the worker's own partition first, then steals from random victims.
pub struct WorkStealingScheduler {
    partitions: Vec<Vec<Arc<OperatorInstance>>>,
    stats: StatsCells,
}

impl WorkStealingScheduler {
    /// Partition instances across workers by `index mod worker_count`.
    pub fn new(instances: Vec<Arc<OperatorInstance>>, num_workers: usize) -> Self {
        assert!(num_workers > 0, "scheduler requires at least one worker");
        let mut partitions: Vec<Vec<Arc<OperatorInstance>>> = vec![Vec::new(); num_workers];
        for (i, instance) in instances.into_iter().enumerate() {
            partitions[i % num_workers].push(instance);
        }
        Self {
            partitions,
            stats: StatsCells::default(),
        }
    }
}

impl Scheduler for WorkStealingScheduler {
    fn next(&self, worker_id: usize) -> Option<Arc<OperatorInstance>> {
        self.stats.total_scheduled.fetch_add(1, Ordering::Relaxed);

        for instance in &self.partitions[worker_id] {
            if instance.has_work() {
                return Some(Arc::clone(instance));
            }
        }

        let num_workers = self.partitions.len();
        if num_workers > 1 {
            let mut rng = rand::thread_rng();
            for _ in 0..num_workers {
                let victim = rng.gen_range(0..num_workers);
                if victim == worker_id {
                    continue;
                }
                for instance in &self.partitions[victim] {
                    if instance.has_work() {
                        self.stats.work_stolen.fetch_add(1, Ordering::Relaxed);
                        return Some(Arc::clone(instance));
                    }
                }
            }
        }

        self.stats.idle_cycles.fetch_add(1, Ordering::Relaxed);
        None
    }

    fn stats(&self) -> SchedulerStats {
        self.stats.snapshot()
    }

    fn policy(&self) -> SchedulingPolicy {
        SchedulingPolicy::WorkStealing
    }
}

/// Build a scheduler for the given policy. Unimplemented policies fall
/// back to round-robin.
pub fn create_scheduler(
    policy: SchedulingPolicy,
    instances: Vec<Arc<OperatorInstance>>,
    num_workers: usize,
) -> Arc<dyn Scheduler> {
    match policy {
        SchedulingPolicy::WorkStealing => {
            Arc::new(WorkStealingScheduler::new(instances, num_workers))
        }
        SchedulingPolicy::RoundRobin => Arc::new(RoundRobinScheduler::new(instances, num_workers)),
        other => {
            debug!(?other, "scheduling policy not implemented, using round-robin");
            Arc::new(RoundRobinScheduler::new(instances, num_workers))
        }
    }
}
