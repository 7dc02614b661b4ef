use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::event::{Event, Payload};
use crate::operator::SinkOperator;

/// Cloneable view onto a sink's consumed-event counter, readable after the
/// sink itself has been handed to the runtime.
#[derive(Debug, Clone, Default)]
pub struct SinkCounter {
    count: Arc<AtomicU64>,
}

impl SinkCounter {
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    fn increment(&self) {
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    fn reset(&self) {
        self.count.store(0, Ordering::Relaxed);
    }
}

/// Configuration for [`ConsoleSink`].
#[derive(Debug, Clone, Default)]
pub struct ConsoleConfig {
    /// Printed before each event.
    pub prefix: String,
    /// Print the event's age on the monotonic clock.
    pub show_timestamp: bool,
    /// Print the partition key when present.
    pub show_key: bool,
}

/// Writes each event to stdout.
pub struct ConsoleSink {
    name: String,
    config: ConsoleConfig,
    consumed: SinkCounter,
}

impl ConsoleSink {
    pub fn new(name: impl Into<String>, config: ConsoleConfig) -> Self {
        Self {
            name: name.into(),
            config,
            consumed: SinkCounter::default(),
        }
    }

    pub fn counter(&self) -> SinkCounter {
        self.consumed.clone()
    }
}

fn format_payload(payload: &Payload) -> String {
    match payload {
        Payload::Empty => "(empty)".to_string(),
        Payload::Int(v) => v.to_string(),
        Payload::Float(v) => v.to_string(),
        Payload::Str(s) => s.to_string(),
        Payload::Bytes(b) => format!("(bytes: {} bytes)", b.len()),
    }
}

impl SinkOperator for ConsoleSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn consume(&mut self, event: Event) {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();

        if !self.config.prefix.is_empty() {
            let _ = write!(out, "{}: ", self.config.prefix);
        }
        if self.config.show_key {
            if let Some(key) = event.key() {
                let _ = write!(out, "[key={key}] ");
            }
        }
        if self.config.show_timestamp {
            let _ = write!(out, "[age={}us] ", event.timestamp().elapsed().as_micros());
        }
        let _ = writeln!(out, "{}", format_payload(event.payload()));

        self.consumed.increment();
    }
}

/// Discards every event, counting them.
pub struct NullSink {
    name: String,
    consumed: SinkCounter,
}

impl NullSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            consumed: SinkCounter::default(),
        }
    }

    pub fn counter(&self) -> SinkCounter {
        self.consumed.clone()
    }
}

impl SinkOperator for NullSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn consume(&mut self, _event: Event) {
        self.consumed.increment();
    }
}

/// Counts events.
pub struct CountingSink {
    name: String,
    count: SinkCounter,
}

impl CountingSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            count: SinkCounter::default(),
        }
    }

    pub fn counter(&self) -> SinkCounter {
        self.count.clone()
    }

    pub fn reset(&self) {
        self.count.reset();
    }
}

impl SinkOperator for CountingSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn consume(&mut self, _event: Event) {
        self.count.increment();
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Aggregates {
    sum: i64,
    count: u64,
    min: Option<i64>,
    max: Option<i64>,
}

/// Cloneable view onto an [`AggregatingSink`]'s running aggregates.
#[derive(Debug, Clone, Default)]
pub struct AggregateHandle {
    state: Arc<Mutex<Aggregates>>,
}

impl AggregateHandle {
    pub fn sum(&self) -> i64 {
        self.state.lock().sum
    }

    pub fn count(&self) -> u64 {
        self.state.lock().count
    }

    pub fn mean(&self) -> f64 {
        let state = self.state.lock();
        if state.count > 0 {
            state.sum as f64 / state.count as f64
        } else {
            0.0
        }
    }

    pub fn min(&self) -> Option<i64> {
        self.state.lock().min
    }

    pub fn max(&self) -> Option<i64> {
        self.state.lock().max
    }
}

/// Computes running sum, count, mean, min, and max over numeric payloads.
///
/// Float payloads are truncated into the integer sum; other payload types
/// are ignored.
pub struct AggregatingSink {
    name: String,
    handle: AggregateHandle,
}

impl AggregatingSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handle: AggregateHandle::default(),
        }
    }

    pub fn handle(&self) -> AggregateHandle {
        self.handle.clone()
    }
}

impl SinkOperator for AggregatingSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn consume(&mut self, event: Event) {
        match event.payload() {
            Payload::Int(v) => {
                let mut state = self.handle.state.lock();
                state.sum += v;
                state.count += 1;
                state.min = Some(state.min.map_or(*v, |m| m.min(*v)));
                state.max = Some(state.max.map_or(*v, |m| m.max(*v)));
            }
            Payload::Float(v) => {
                let mut state = self.handle.state.lock();
                state.sum += *v as i64;
                state.count += 1;
            }
            _ => {}
        }
    }
}

/// Sink driven by a caller-supplied closure.
pub struct FunctionSink<F> {
    name: String,
    func: F,
}

impl<F> FunctionSink<F>
where
    F: FnMut(Event) + Send,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> SinkOperator for FunctionSink<F>
where
    F: FnMut(Event) + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn consume(&mut self, event: Event) {
        (self.func)(event);
    }
}
