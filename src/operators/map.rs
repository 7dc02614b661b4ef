use std::time::Instant;

use crate::event::{Event, Payload};
use crate::operator::{Operator, OperatorContext};

/// Transforms each event's payload, preserving its metadata.
pub struct MapOperator<F> {
    name: String,
    func: F,
}

impl<F> MapOperator<F>
where
    F: FnMut(Payload) -> Payload + Send,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Operator for MapOperator<F>
where
    F: FnMut(Payload) -> Payload + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&mut self, event: Event, ctx: &mut OperatorContext) {
        ctx.stats().record_received();
        let start = Instant::now();

        let (payload, metadata) = event.into_parts();
        let output = Event::from_parts((self.func)(payload), metadata);
        if ctx.emit(output) > 0 {
            ctx.stats().record_emitted();
        }

        ctx.stats()
            .record_processing_time(start.elapsed().as_nanos() as u64);
    }
}

/// Map over integer payloads; any other payload passes through unchanged.
pub fn int_map(
    name: impl Into<String>,
    mut func: impl FnMut(i64) -> i64 + Send,
) -> MapOperator<impl FnMut(Payload) -> Payload + Send> {
    MapOperator::new(name, move |payload| match payload {
        Payload::Int(v) => Payload::Int(func(v)),
        other => other,
    })
}

/// Map over float payloads; any other payload passes through unchanged.
pub fn float_map(
    name: impl Into<String>,
    mut func: impl FnMut(f64) -> f64 + Send,
) -> MapOperator<impl FnMut(Payload) -> Payload + Send> {
    MapOperator::new(name, move |payload| match payload {
        Payload::Float(v) => Payload::Float(func(v)),
        other => other,
    })
}

/// Map over string payloads; any other payload passes through unchanged.
pub fn string_map(
    name: impl Into<String>,
    mut func: impl FnMut(&str) -> String + Send,
) -> MapOperator<impl FnMut(Payload) -> Payload + Send> {
    MapOperator::new(name, move |payload| match payload {
        Payload::Str(s) => Payload::from(func(&s)),
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::EventQueue;
    use std::sync::Arc;

    fn ctx_with_queue() -> (OperatorContext, Arc<EventQueue>) {
        let queue = Arc::new(EventQueue::new(8));
        let mut ctx = OperatorContext::new("test", 0);
        ctx.add_output(Arc::clone(&queue));
        (ctx, queue)
    }

    #[test]
    fn test_int_map_squares() {
        let (mut ctx, queue) = ctx_with_queue();
        let mut square = int_map("square", |x| x * x);

        square.process(Event::new(5i64), &mut ctx);

        let result = queue.try_pop().expect("output missing");
        assert_eq!(result.payload().as_int(), Some(25));
        assert_eq!(ctx.stats().events_received(), 1);
        assert_eq!(ctx.stats().events_emitted(), 1);
    }

    #[test]
    fn test_int_map_preserves_metadata() {
        let (mut ctx, queue) = ctx_with_queue();
        let mut double = int_map("double", |x| x * 2);

        double.process(Event::with_key(3i64, 77), &mut ctx);

        let result = queue.try_pop().expect("output missing");
        assert_eq!(result.payload().as_int(), Some(6));
        assert_eq!(result.key(), Some(77));
    }

    #[test]
    fn test_typed_map_passes_through_mismatched_payloads() {
        let (mut ctx, queue) = ctx_with_queue();
        let mut square = int_map("square", |x| x * x);

        square.process(Event::new("not a number"), &mut ctx);

        let result = queue.try_pop().expect("output missing");
        assert_eq!(result.payload().as_str(), Some("not a number"));
    }

    #[test]
    fn test_string_map() {
        let (mut ctx, queue) = ctx_with_queue();
        let mut upper = string_map("upper", |s| s.to_uppercase());

        upper.process(Event::new("abc"), &mut ctx);

        let result = queue.try_pop().expect("output missing");
        assert_eq!(result.payload().as_str(), Some("ABC"));
    }
}
