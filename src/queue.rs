use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

/// Queue statistics for monitoring.
///
/// All counters are monotonic except `current_size`. Push and pop counts
/// reflect successful operations only, so at any quiescent instant
/// `push_count - pop_count == current_size`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub push_count: u64,
    pub pop_count: u64,
    pub push_blocked_count: u64,
    pub pop_blocked_count: u64,
    pub current_size: usize,
    pub capacity: usize,
    pub high_watermark: usize,
}

/// Error returned by a blocking push on a closed queue. Carries the
/// rejected item back to the caller.
#[derive(Debug, PartialEq, Eq)]
pub struct PushError<T>(pub T);

impl<T> fmt::Display for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pushing into a closed queue")
    }
}

impl<T: fmt::Debug> std::error::Error for PushError<T> {}

/// Error returned by a non-blocking push.
#[derive(Debug, PartialEq, Eq)]
pub enum TryPushError<T> {
    /// The queue is at capacity.
    Full(T),
    /// The queue has been closed.
    Closed(T),
}

impl<T> TryPushError<T> {
    /// Recover the item that could not be pushed.
    pub fn into_inner(self) -> T {
        match self {
            TryPushError::Full(item) | TryPushError::Closed(item) => item,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, TryPushError::Full(_))
    }
}

impl<T> fmt::Display for TryPushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TryPushError::Full(_) => write!(f, "pushing into a full queue"),
            TryPushError::Closed(_) => write!(f, "pushing into a closed queue"),
        }
    }
}

impl<T: fmt::Debug> std::error::Error for TryPushError<T> {}

/// Error returned by a timed push.
#[derive(Debug, PartialEq, Eq)]
pub enum PushTimeoutError<T> {
    /// No space became available within the deadline.
    Timeout(T),
    /// The queue has been closed.
    Closed(T),
}

impl<T> PushTimeoutError<T> {
    pub fn into_inner(self) -> T {
        match self {
            PushTimeoutError::Timeout(item) | PushTimeoutError::Closed(item) => item,
        }
    }
}

impl<T> fmt::Display for PushTimeoutError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushTimeoutError::Timeout(_) => write!(f, "push timed out"),
            PushTimeoutError::Closed(_) => write!(f, "pushing into a closed queue"),
        }
    }
}

impl<T: fmt::Debug> std::error::Error for PushTimeoutError<T> {}

#[derive(Debug, Clone, Copy, Default)]
struct StatsInner {
    push_count: u64,
    pop_count: u64,
    push_blocked_count: u64,
    pop_blocked_count: u64,
    high_watermark: usize,
}

struct Inner<T> {
    buffer: Box<[Option<T>]>,
    head: usize,
    tail: usize,
    len: usize,
    closed: bool,
    stats: StatsInner,
}

impl<T> Inner<T> {
    fn enqueue(&mut self, item: T, mask: usize) {
        self.buffer[self.tail] = Some(item);
        self.tail = (self.tail + 1) & mask;
        self.len += 1;
        self.stats.push_count += 1;
        if self.len > self.stats.high_watermark {
            self.stats.high_watermark = self.len;
        }
    }

    fn dequeue(&mut self, mask: usize) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        let item = self.buffer[self.head].take();
        self.head = (self.head + 1) & mask;
        self.len -= 1;
        self.stats.pop_count += 1;
        item
    }
}

/// Bounded MPMC (multi-producer multi-consumer) FIFO queue.
///
/// A ring buffer guarded by a single mutex with two condition variables.
/// Blocking pushes enforce backpressure when the queue is full; `close()`
/// wakes every blocked producer and consumer, after which pushes fail and
/// pops drain the remaining items before reporting end-of-stream.
///
/// The queue is the synchronization boundary between producer and consumer
/// threads: a successful push happens-before the pop that returns the item,
/// so a popped item needs no further synchronization.
pub struct BoundedQueue<T> {
    inner: Mutex<Inner<T>>,
    not_full: Condvar,
    not_empty: Condvar,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    /// Create a queue with the given capacity, rounded up to the next power
    /// of two so positions can be masked instead of divided.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be positive");
        let capacity = capacity.next_power_of_two();
        let buffer = (0..capacity).map(|_| None).collect::<Vec<_>>().into_boxed_slice();
        Self {
            inner: Mutex::new(Inner {
                buffer,
                head: 0,
                tail: 0,
                len: 0,
                closed: false,
                stats: StatsInner::default(),
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            capacity,
        }
    }

    fn mask(&self) -> usize {
        self.capacity - 1
    }

    /// Push an item, blocking while the queue is full.
    ///
    /// Returns the item back inside [`PushError`] if the queue was closed
    /// before space became available.
    pub fn push(&self, item: T) -> Result<(), PushError<T>> {
        let mut inner = self.inner.lock();
        while inner.len == self.capacity && !inner.closed {
            inner.stats.push_blocked_count += 1;
            self.not_full.wait(&mut inner);
        }
        if inner.closed {
            return Err(PushError(item));
        }
        let mask = self.mask();
        inner.enqueue(item, mask);
        drop(inner);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Push without blocking.
    pub fn try_push(&self, item: T) -> Result<(), TryPushError<T>> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(TryPushError::Closed(item));
        }
        if inner.len == self.capacity {
            return Err(TryPushError::Full(item));
        }
        let mask = self.mask();
        inner.enqueue(item, mask);
        drop(inner);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Push, waiting at most `timeout` for space.
    pub fn push_timeout(&self, item: T, timeout: Duration) -> Result<(), PushTimeoutError<T>> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        loop {
            if inner.closed {
                return Err(PushTimeoutError::Closed(item));
            }
            if inner.len < self.capacity {
                break;
            }
            inner.stats.push_blocked_count += 1;
            if self.not_full.wait_until(&mut inner, deadline).timed_out() {
                if inner.closed {
                    return Err(PushTimeoutError::Closed(item));
                }
                if inner.len < self.capacity {
                    break;
                }
                return Err(PushTimeoutError::Timeout(item));
            }
        }
        let mask = self.mask();
        inner.enqueue(item, mask);
        drop(inner);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Pop an item, blocking while the queue is empty.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub fn pop(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        while inner.len == 0 && !inner.closed {
            inner.stats.pop_blocked_count += 1;
            self.not_empty.wait(&mut inner);
        }
        let mask = self.mask();
        let item = inner.dequeue(mask)?;
        drop(inner);
        self.not_full.notify_one();
        Some(item)
    }

    /// Pop without blocking. Returns `None` if the queue is empty.
    pub fn try_pop(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        let mask = self.mask();
        let item = inner.dequeue(mask)?;
        drop(inner);
        self.not_full.notify_one();
        Some(item)
    }

    /// Pop, waiting at most `timeout` for an item. Returns `None` on
    /// timeout or once the queue is closed and drained.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        while inner.len == 0 {
            if inner.closed {
                return None;
            }
            inner.stats.pop_blocked_count += 1;
            if self.not_empty.wait_until(&mut inner, deadline).timed_out() {
                if inner.len > 0 {
                    break;
                }
                return None;
            }
        }
        let mask = self.mask();
        let item = inner.dequeue(mask)?;
        drop(inner);
        self.not_full.notify_one();
        Some(item)
    }

    /// Close the queue. Idempotent; wakes all blocked producers and
    /// consumers.
    pub fn close(&self) {
        {
            let mut inner = self.inner.lock();
            inner.closed = true;
        }
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().len == 0
    }

    pub fn is_full(&self) -> bool {
        let inner = self.inner.lock();
        inner.len == self.capacity
    }

    /// Actual capacity, after power-of-two rounding.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> QueueStats {
        let inner: MutexGuard<'_, Inner<T>> = self.inner.lock();
        QueueStats {
            push_count: inner.stats.push_count,
            pop_count: inner.stats.pop_count,
            push_blocked_count: inner.stats.push_blocked_count,
            pop_blocked_count: inner.stats.pop_blocked_count,
            current_size: inner.len,
            capacity: self.capacity,
            high_watermark: inner.stats.high_watermark,
        }
    }
}

impl<T> fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("BoundedQueue")
            .field("capacity", &self.capacity)
            .field("len", &inner.len)
            .field("closed", &inner.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_fifo() {
        let queue = BoundedQueue::new(8);
        for i in 0..5 {
            queue.push(i).unwrap();
        }
        for i in 0..5 {
            assert_eq!(queue.pop(), Some(i));
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn test_try_push_full() {
        let queue = BoundedQueue::new(2);
        queue.try_push(1).unwrap();
        queue.try_push(2).unwrap();
        assert!(queue.is_full());

        let err = queue.try_push(3).unwrap_err();
        assert!(err.is_full());
        assert_eq!(err.into_inner(), 3);

        // A failed try_push must not touch counters or contents.
        let stats = queue.stats();
        assert_eq!(stats.push_count, 2);
        assert_eq!(stats.current_size, 2);
    }

    #[test]
    fn test_try_pop_empty() {
        let queue: BoundedQueue<i32> = BoundedQueue::new(4);
        assert_eq!(queue.try_pop(), None);
    }

    #[test]
    fn test_close_semantics() {
        let queue = BoundedQueue::new(8);
        queue.push(1).unwrap();
        queue.push(2).unwrap();
        queue.close();
        assert!(queue.is_closed());

        assert_eq!(queue.push(3), Err(PushError(3)));
        assert_eq!(queue.try_push(4), Err(TryPushError::Closed(4)));

        // Existing items drain before end-of-stream.
        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_close_is_idempotent() {
        let queue: BoundedQueue<i32> = BoundedQueue::new(4);
        queue.close();
        queue.close();
        assert!(queue.is_closed());
    }

    #[test]
    fn test_capacity_rounds_to_power_of_two() {
        let queue: BoundedQueue<i32> = BoundedQueue::new(100);
        assert_eq!(queue.capacity(), 128);
        let exact: BoundedQueue<i32> = BoundedQueue::new(64);
        assert_eq!(exact.capacity(), 64);
    }

    #[test]
    fn test_pop_timeout() {
        let queue: BoundedQueue<i32> = BoundedQueue::new(4);
        let start = Instant::now();
        assert_eq!(queue.pop_timeout(Duration::from_millis(20)), None);
        assert!(start.elapsed() >= Duration::from_millis(20));

        queue.push(9).unwrap();
        assert_eq!(queue.pop_timeout(Duration::from_millis(20)), Some(9));
    }

    #[test]
    fn test_push_timeout() {
        let queue = BoundedQueue::new(1);
        queue.push(1).unwrap();
        match queue.push_timeout(2, Duration::from_millis(20)) {
            Err(PushTimeoutError::Timeout(2)) => {}
            other => panic!("unexpected result: {other:?}"),
        }
        queue.pop();
        queue.push_timeout(2, Duration::from_millis(20)).unwrap();
    }

    #[test]
    fn test_stats_conservation() {
        let queue = BoundedQueue::new(64);
        queue.push(1).unwrap();
        queue.push(2).unwrap();
        queue.pop();

        let stats = queue.stats();
        assert_eq!(stats.push_count, 2);
        assert_eq!(stats.pop_count, 1);
        assert_eq!(stats.current_size, 1);
        assert_eq!(stats.push_count - stats.pop_count, stats.current_size as u64);
        assert_eq!(stats.capacity, 64);
        assert_eq!(stats.high_watermark, 2);
    }

    #[test]
    fn test_wraparound_preserves_order() {
        let queue = BoundedQueue::new(4);
        for round in 0..10 {
            queue.push(round * 2).unwrap();
            queue.push(round * 2 + 1).unwrap();
            assert_eq!(queue.pop(), Some(round * 2));
            assert_eq!(queue.pop(), Some(round * 2 + 1));
        }
    }
}
