use std::time::Instant;

use crate::event::{Event, Payload};
use crate::operator::{Operator, OperatorContext};

/// Forwards events whose predicate holds, untouched, and drops the rest.
pub struct FilterOperator<P> {
    name: String,
    predicate: P,
}

impl<P> FilterOperator<P>
where
    P: FnMut(&Payload) -> bool + Send,
{
    pub fn new(name: impl Into<String>, predicate: P) -> Self {
        Self {
            name: name.into(),
            predicate,
        }
    }
}

impl<P> Operator for FilterOperator<P>
where
    P: FnMut(&Payload) -> bool + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&mut self, event: Event, ctx: &mut OperatorContext) {
        ctx.stats().record_received();
        let start = Instant::now();

        if (self.predicate)(event.payload()) {
            if ctx.emit(event) > 0 {
                ctx.stats().record_emitted();
            }
        } else {
            ctx.stats().record_dropped();
        }

        ctx.stats()
            .record_processing_time(start.elapsed().as_nanos() as u64);
    }
}

/// Filter on integer payloads; non-integer payloads never match.
pub fn int_filter(
    name: impl Into<String>,
    mut predicate: impl FnMut(i64) -> bool + Send,
) -> FilterOperator<impl FnMut(&Payload) -> bool + Send> {
    FilterOperator::new(name, move |payload| match payload {
        Payload::Int(v) => predicate(*v),
        _ => false,
    })
}

/// Common ready-made predicates.
pub mod filters {
    use crate::event::Payload;

    pub fn even() -> impl Fn(&Payload) -> bool {
        |payload| matches!(payload, Payload::Int(v) if v % 2 == 0)
    }

    pub fn odd() -> impl Fn(&Payload) -> bool {
        |payload| matches!(payload, Payload::Int(v) if v % 2 != 0)
    }

    pub fn positive() -> impl Fn(&Payload) -> bool {
        |payload| match payload {
            Payload::Int(v) => *v > 0,
            Payload::Float(v) => *v > 0.0,
            _ => false,
        }
    }

    pub fn negative() -> impl Fn(&Payload) -> bool {
        |payload| match payload {
            Payload::Int(v) => *v < 0,
            Payload::Float(v) => *v < 0.0,
            _ => false,
        }
    }

    pub fn in_range(min: i64, max: i64) -> impl Fn(&Payload) -> bool {
        move |payload| match payload {
            Payload::Int(v) => (min..=max).contains(v),
            Payload::Float(v) => *v >= min as f64 && *v <= max as f64,
            _ => false,
        }
    }
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
    fn test_even_filter_passes_even() {
        let (mut ctx, queue) = ctx_with_queue();
        let mut filter = FilterOperator::new("even", filters::even());

        filter.process(Event::new(4i64), &mut ctx);
        let result = queue.try_pop().expect("even value should pass");
        assert_eq!(result.payload().as_int(), Some(4));
    }

    #[test]
    fn test_even_filter_drops_odd() {
        let (mut ctx, queue) = ctx_with_queue();
        let mut filter = FilterOperator::new("even", filters::even());

        filter.process(Event::new(5i64), &mut ctx);
        assert!(queue.try_pop().is_none());
        assert_eq!(ctx.stats().events_dropped(), 1);
    }

    #[test]
    fn test_in_range_filter() {
        let (mut ctx, queue) = ctx_with_queue();
        let mut filter = FilterOperator::new("range", filters::in_range(10, 20));

        for value in [5i64, 15, 25] {
            filter.process(Event::new(value), &mut ctx);
        }

        let result = queue.try_pop().expect("15 should pass");
        assert_eq!(result.payload().as_int(), Some(15));
        assert!(queue.try_pop().is_none());
    }

    #[test]
    fn test_mismatched_payload_never_matches() {
        let (mut ctx, queue) = ctx_with_queue();
        let mut filter = int_filter("big", |v| v > 100);

        filter.process(Event::new("not a number"), &mut ctx);
        assert!(queue.try_pop().is_none());
    }

    #[test]
    fn test_positive_and_negative() {
        let positive = filters::positive();
        let negative = filters::negative();

        assert!(positive(&Payload::Int(3)));
        assert!(positive(&Payload::Float(0.5)));
        assert!(!positive(&Payload::Int(-3)));
        assert!(negative(&Payload::Int(-3)));
        assert!(!negative(&Payload::Empty));
    }
}
