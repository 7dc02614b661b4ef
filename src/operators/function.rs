use std::time::Instant;

use crate::event::Event;
use crate::operator::{Operator, OperatorContext};

enum Body {
    /// Full control: the closure emits through the context itself.
    Emitting(Box<dyn FnMut(Event, &mut OperatorContext) + Send>),
    /// Zero-or-one output per input.
    FilterMap(Box<dyn FnMut(Event) -> Option<Event> + Send>),
    /// Exactly one output per input.
    Map(Box<dyn FnMut(Event) -> Event + Send>),
}

/// Adapts a caller-supplied closure into an operator.
///
/// The closure shape is chosen by the constructor: [`FunctionOperator::emitting`]
/// for explicit emission, [`FunctionOperator::filter_map`] for optional
/// output, [`FunctionOperator::map`] for a pure transformation.
pub struct FunctionOperator {
    name: String,
    body: Body,
}

impl FunctionOperator {
    pub fn emitting(
        name: impl Into<String>,
        func: impl FnMut(Event, &mut OperatorContext) + Send + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            body: Body::Emitting(Box::new(func)),
        }
    }

    pub fn filter_map(
        name: impl Into<String>,
        func: impl FnMut(Event) -> Option<Event> + Send + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            body: Body::FilterMap(Box::new(func)),
        }
    }

    pub fn map(
        name: impl Into<String>,
        func: impl FnMut(Event) -> Event + Send + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            body: Body::Map(Box::new(func)),
        }
    }
}

impl Operator for FunctionOperator {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&mut self, event: Event, ctx: &mut OperatorContext) {
        ctx.stats().record_received();
        let start = Instant::now();

        match &mut self.body {
            Body::Emitting(func) => func(event, ctx),
            Body::FilterMap(func) => match func(event) {
                Some(output) => {
                    if ctx.emit(output) > 0 {
                        ctx.stats().record_emitted();
                    }
                }
                None => ctx.stats().record_dropped(),
            },
            Body::Map(func) => {
                let output = func(event);
                if ctx.emit(output) > 0 {
                    ctx.stats().record_emitted();
                }
            }
        }

        ctx.stats()
            .record_processing_time(start.elapsed().as_nanos() as u64);
    }
}
