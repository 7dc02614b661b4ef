use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam::utils::Backoff;
use tracing::trace;

use crate::error::{Result, RuntimeError};
use crate::scheduler::Scheduler;

/// Events handed to `execute_batch` per scheduler grant.
pub const DEFAULT_BATCH_SIZE: usize = 64;

/// Per-worker statistics snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStatsSnapshot {
    pub events_processed: u64,
    pub active_time_ns: u64,
    pub idle_time_ns: u64,
    pub iterations: u64,
}

#[derive(Debug, Default)]
struct WorkerStats {
    events_processed: AtomicU64,
    active_time_ns: AtomicU64,
    idle_time_ns: AtomicU64,
    iterations: AtomicU64,
}

impl WorkerStats {
    fn snapshot(&self) -> WorkerStatsSnapshot {
        WorkerStatsSnapshot {
            events_processed: self.events_processed.load(Ordering::Relaxed),
            active_time_ns: self.active_time_ns.load(Ordering::Relaxed),
            idle_time_ns: self.idle_time_ns.load(Ordering::Relaxed),
            iterations: self.iterations.load(Ordering::Relaxed),
        }
    }
}

struct Worker {
    id: usize,
    scheduler: Arc<dyn Scheduler>,
    running: Arc<AtomicBool>,
    stats: Arc<WorkerStats>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    fn new(id: usize, scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            id,
            scheduler,
            running: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(WorkerStats::default()),
            handle: None,
        }
    }

    fn start(&mut self) -> Result<()> {
        self.running.store(true, Ordering::Release);

        let id = self.id;
        let scheduler = Arc::clone(&self.scheduler);
        let running = Arc::clone(&self.running);
        let stats = Arc::clone(&self.stats);

        let handle = std::thread::Builder::new()
            .name(format!("worker-{id}"))
            .spawn(move || run_loop(id, scheduler, running, stats))
            .map_err(RuntimeError::ThreadSpawn)?;
        self.handle = Some(handle);
        Ok(())
    }

    fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run_loop(
    id: usize,
    scheduler: Arc<dyn Scheduler>,
    running: Arc<AtomicBool>,
    stats: Arc<WorkerStats>,
) {
    trace!(worker = id, "worker thread started");
    let backoff = Backoff::new();

    while running.load(Ordering::Acquire) {
        stats.iterations.fetch_add(1, Ordering::Relaxed);
        let start = Instant::now();

        match scheduler.next(id) {
            Some(instance) => {
                let processed = instance.execute_batch(DEFAULT_BATCH_SIZE);
                stats
                    .events_processed
                    .fetch_add(processed as u64, Ordering::Relaxed);
                stats
                    .active_time_ns
                    .fetch_add(start.elapsed().as_nanos() as u64, Ordering::Relaxed);
                if processed > 0 {
                    backoff.reset();
                } else {
                    // Another worker held the instance; back off briefly.
                    backoff.snooze();
                }
            }
            None => {
                stats
                    .idle_time_ns
                    .fetch_add(start.elapsed().as_nanos() as u64, Ordering::Relaxed);
                // Surrender the processor so producers make progress.
                backoff.snooze();
            }
        }
    }

    trace!(worker = id, "worker thread exiting");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PoolState {
    Idle,
    Running,
    Stopped,
}

/// Fixed set of worker threads draining instances under scheduler control.
///
/// Workers never own instances and never close queues; they only execute
/// what the scheduler hands them.
pub struct WorkerPool {
    workers: Vec<Worker>,
    state: PoolState,
}

impl WorkerPool {
    /// Create `num_workers` workers bound to the shared scheduler. Threads
    /// are not spawned until [`WorkerPool::start`].
    pub fn new(num_workers: usize, scheduler: Arc<dyn Scheduler>) -> Self {
        let workers = (0..num_workers)
            .map(|id| Worker::new(id, Arc::clone(&scheduler)))
            .collect();
        Self {
            workers,
            state: PoolState::Idle,
        }
    }

    /// Spawn one thread per worker. May be called at most once.
    pub fn start(&mut self) -> Result<()> {
        if self.state != PoolState::Idle {
            return Err(RuntimeError::PoolAlreadyStarted);
        }
        for worker in &mut self.workers {
            worker.start()?;
        }
        self.state = PoolState::Running;
        Ok(())
    }

    /// Clear every worker's running flag and join the threads. Idempotent.
    pub fn stop(&mut self) {
        if self.state != PoolState::Running {
            return;
        }
        for worker in &self.workers {
            worker.stop();
        }
        for worker in &mut self.workers {
            worker.join();
        }
        self.state = PoolState::Stopped;
    }

    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    pub fn is_running(&self) -> bool {
        self.state == PoolState::Running
    }

    pub fn stats(&self) -> Vec<WorkerStatsSnapshot> {
        self.workers.iter().map(|w| w.stats.snapshot()).collect()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Resolve a configured worker count: zero means auto-detect from hardware
/// concurrency, falling back to 4 when unknown.
pub(crate) fn resolve_worker_count(requested: usize) -> usize {
    if requested > 0 {
        requested
    } else {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use crate::operator::{EventQueue, OperatorContext, SinkAdapter};
    use crate::operators::sink::CountingSink;
    use crate::scheduler::{OperatorInstance, RoundRobinScheduler};
    use std::time::Duration;

    fn pool_with_counting_sink(
        num_workers: usize,
    ) -> (WorkerPool, Arc<EventQueue>, crate::operators::sink::SinkCounter) {
        let queue = Arc::new(EventQueue::new(1024));
        let sink = CountingSink::new("sink");
        let counter = sink.counter();
        let instance = Arc::new(OperatorInstance::new(
            Box::new(SinkAdapter::new(Box::new(sink))),
            Some(Arc::clone(&queue)),
            OperatorContext::new("sink", 0),
            0,
        ));
        let scheduler = Arc::new(RoundRobinScheduler::new(vec![instance], num_workers));
        (WorkerPool::new(num_workers, scheduler), queue, counter)
    }

    #[test]
    fn test_pool_processes_events() {
        let (mut pool, queue, counter) = pool_with_counting_sink(2);
        pool.start().unwrap();

        for i in 0..500 {
            queue.push(Event::new(i as i64)).unwrap();
        }

        let deadline = Instant::now() + Duration::from_secs(5);
        while counter.count() < 500 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        pool.stop();

        assert_eq!(counter.count(), 500);
        let processed: u64 = pool.stats().iter().map(|s| s.events_processed).sum();
        assert_eq!(processed, 500);
    }

    #[test]
    fn test_pool_start_twice_fails() {
        let (mut pool, _queue, _counter) = pool_with_counting_sink(1);
        pool.start().unwrap();
        assert!(matches!(
            pool.start(),
            Err(RuntimeError::PoolAlreadyStarted)
        ));
        pool.stop();
    }

    #[test]
    fn test_pool_stop_is_idempotent() {
        let (mut pool, _queue, _counter) = pool_with_counting_sink(1);
        pool.start().unwrap();
        pool.stop();
        pool.stop();
        assert!(!pool.is_running());
    }

    #[test]
    fn test_resolve_worker_count() {
        assert_eq!(resolve_worker_count(3), 3);
        assert!(resolve_worker_count(0) >= 1);
    }
}
