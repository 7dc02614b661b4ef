use std::thread;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::event::{Event, Payload};
use crate::operator::{OperatorContext, SourceOperator, StopFlag};

/// Configuration for [`SequenceSource`].
#[derive(Debug, Clone)]
pub struct SequenceConfig {
    pub start: i64,
    pub step: i64,
    /// Number of events to produce; `u64::MAX` means unbounded.
    pub count: u64,
    /// Pause between emissions, for rate limiting.
    pub delay: Duration,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            start: 0,
            step: 1,
            count: u64::MAX,
            delay: Duration::ZERO,
        }
    }
}

/// Produces an arithmetic sequence of integer events.
///
/// Each event is keyed with its position in the sequence.
pub struct SequenceSource {
    name: String,
    config: SequenceConfig,
    current: i64,
    generated: u64,
    stop: StopFlag,
}

impl SequenceSource {
    pub fn new(name: impl Into<String>, config: SequenceConfig) -> Self {
        Self {
            name: name.into(),
            current: config.start,
            config,
            generated: 0,
            stop: StopFlag::new(),
        }
    }
}

impl SourceOperator for SequenceSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn generate(&mut self, ctx: &mut OperatorContext) -> bool {
        if self.should_stop() || self.generated >= self.config.count {
            return false;
        }

        let event = Event::with_key(self.current, self.generated);
        if ctx.emit(event) == 0 {
            // Every output closed; nothing downstream will ever accept.
            return false;
        }
        self.current = self.current.wrapping_add(self.config.step);
        self.generated += 1;
        ctx.stats().record_emitted();

        if !self.config.delay.is_zero() {
            thread::sleep(self.config.delay);
        }
        true
    }

    fn stop_flag(&self) -> &StopFlag {
        &self.stop
    }
}

/// Configuration for [`RandomSource`].
#[derive(Debug, Clone)]
pub struct RandomConfig {
    pub min_value: i64,
    pub max_value: i64,
    pub count: u64,
    pub delay: Duration,
}

impl Default for RandomConfig {
    fn default() -> Self {
        Self {
            min_value: 0,
            max_value: 1000,
            count: u64::MAX,
            delay: Duration::ZERO,
        }
    }
}

/// Produces uniformly distributed random integer events.
pub struct RandomSource {
    name: String,
    config: RandomConfig,
    rng: StdRng,
    generated: u64,
    stop: StopFlag,
}

impl RandomSource {
    pub fn new(name: impl Into<String>, config: RandomConfig) -> Self {
        Self {
            name: name.into(),
            config,
            rng: StdRng::from_entropy(),
            generated: 0,
            stop: StopFlag::new(),
        }
    }
}

impl SourceOperator for RandomSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn generate(&mut self, ctx: &mut OperatorContext) -> bool {
        if self.should_stop() || self.generated >= self.config.count {
            return false;
        }

        let value = self
            .rng
            .gen_range(self.config.min_value..=self.config.max_value);
        let event = Event::with_key(value, self.generated);
        if ctx.emit(event) == 0 {
            return false;
        }
        self.generated += 1;
        ctx.stats().record_emitted();

        if !self.config.delay.is_zero() {
            thread::sleep(self.config.delay);
        }
        true
    }

    fn stop_flag(&self) -> &StopFlag {
        &self.stop
    }
}

/// Source driven by a caller-supplied generator closure.
pub struct FunctionSource<F> {
    name: String,
    generator: F,
    max_count: u64,
    generated: u64,
    stop: StopFlag,
}

impl<F> FunctionSource<F>
where
    F: FnMut() -> Payload + Send,
{
    pub fn new(name: impl Into<String>, generator: F) -> Self {
        Self::with_count(name, generator, u64::MAX)
    }

    pub fn with_count(name: impl Into<String>, generator: F, max_count: u64) -> Self {
        Self {
            name: name.into(),
            generator,
            max_count,
            generated: 0,
            stop: StopFlag::new(),
        }
    }
}

impl<F> SourceOperator for FunctionSource<F>
where
    F: FnMut() -> Payload + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn generate(&mut self, ctx: &mut OperatorContext) -> bool {
        if self.should_stop() || self.generated >= self.max_count {
            return false;
        }

        let event = Event::with_key((self.generator)(), self.generated);
        if ctx.emit(event) == 0 {
            return false;
        }
        self.generated += 1;
        ctx.stats().record_emitted();
        true
    }

    fn stop_flag(&self) -> &StopFlag {
        &self.stop
    }
}
