use std::sync::Arc;
use std::time::Instant;

/// Event key type for partitioning and routing
pub type EventKey = u64;

/// Sequence number for ordering within a stream
pub type SequenceNumber = u64;

/// Supported payload types.
///
/// Events can carry various payload types; arbitrary binary data goes in
/// `Bytes`. String and byte payloads are reference-counted, so cloning an
/// event for fan-out bumps a refcount instead of copying the buffer.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Payload {
    /// Empty payload
    #[default]
    Empty,
    /// Signed integer
    Int(i64),
    /// Floating point
    Float(f64),
    /// UTF-8 string
    Str(Arc<str>),
    /// Binary data
    Bytes(Arc<[u8]>),
}

impl Payload {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Payload::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Payload::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Payload::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Payload::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Payload::Empty)
    }
}

impl From<i64> for Payload {
    fn from(v: i64) -> Self {
        Payload::Int(v)
    }
}

impl From<f64> for Payload {
    fn from(v: f64) -> Self {
        Payload::Float(v)
    }
}

impl From<&str> for Payload {
    fn from(v: &str) -> Self {
        Payload::Str(Arc::from(v))
    }
}

impl From<String> for Payload {
    fn from(v: String) -> Self {
        Payload::Str(Arc::from(v))
    }
}

impl From<Vec<u8>> for Payload {
    fn from(v: Vec<u8>) -> Self {
        Payload::Bytes(Arc::from(v))
    }
}

/// Metadata attached to events for routing, ordering, and tracing.
#[derive(Debug, Clone)]
pub struct EventMetadata {
    /// Partition key, if the event is keyed
    pub key: Option<EventKey>,
    /// Position within the originating stream
    pub sequence: Option<SequenceNumber>,
    /// Creation time on the monotonic clock
    pub timestamp: Instant,
    /// Name of the operator that produced the event
    pub source_operator: Option<Arc<str>>,
}

impl EventMetadata {
    pub fn new() -> Self {
        Self {
            key: None,
            sequence: None,
            timestamp: Instant::now(),
            source_operator: None,
        }
    }

    pub fn with_key(key: EventKey) -> Self {
        Self {
            key: Some(key),
            ..Self::new()
        }
    }
}

impl Default for EventMetadata {
    fn default() -> Self {
        Self::new()
    }
}

/// The fundamental unit of data in the stream graph.
///
/// Events are immutable once created; the runtime moves ownership through
/// the graph rather than sharing or copying payloads.
#[derive(Debug, Clone)]
pub struct Event {
    payload: Payload,
    metadata: EventMetadata,
}

impl Event {
    /// Construct an event with a payload and fresh metadata.
    pub fn new(payload: impl Into<Payload>) -> Self {
        Self {
            payload: payload.into(),
            metadata: EventMetadata::new(),
        }
    }

    /// Construct an event with a payload and a partition key.
    pub fn with_key(payload: impl Into<Payload>, key: EventKey) -> Self {
        Self {
            payload: payload.into(),
            metadata: EventMetadata::with_key(key),
        }
    }

    /// Construct an event with full metadata.
    pub fn with_metadata(payload: impl Into<Payload>, metadata: EventMetadata) -> Self {
        Self {
            payload: payload.into(),
            metadata,
        }
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    pub fn key(&self) -> Option<EventKey> {
        self.metadata.key
    }

    pub fn sequence(&self) -> Option<SequenceNumber> {
        self.metadata.sequence
    }

    pub fn timestamp(&self) -> Instant {
        self.metadata.timestamp
    }

    pub fn into_payload(self) -> Payload {
        self.payload
    }

    /// Split the event into payload and metadata, e.g. to rebuild a
    /// transformed event that keeps the original metadata.
    pub fn into_parts(self) -> (Payload, EventMetadata) {
        (self.payload, self.metadata)
    }

    pub fn from_parts(payload: Payload, metadata: EventMetadata) -> Self {
        Self { payload, metadata }
    }
}

impl Default for Event {
    fn default() -> Self {
        Self::new(Payload::Empty)
    }
}

/// In-band termination marker.
///
/// Defined for pipelines that want an explicit end-of-stream sentinel; the
/// runtime itself terminates streams by closing queues and never enqueues
/// pills.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoisonPill;

/// An event or an in-band termination signal.
#[derive(Debug, Clone)]
pub enum StreamItem {
    Event(Event),
    Poison(PoisonPill),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_accessors() {
        assert_eq!(Payload::Int(42).as_int(), Some(42));
        assert_eq!(Payload::Int(42).as_float(), None);
        assert_eq!(Payload::Float(1.5).as_float(), Some(1.5));
        assert_eq!(Payload::from("hello").as_str(), Some("hello"));
        assert_eq!(Payload::from(vec![1u8, 2, 3]).as_bytes(), Some(&[1u8, 2, 3][..]));
        assert!(Payload::Empty.is_empty());
    }

    #[test]
    fn test_event_with_key() {
        let event = Event::with_key(7i64, 99);
        assert_eq!(event.key(), Some(99));
        assert_eq!(event.payload().as_int(), Some(7));
        assert_eq!(event.sequence(), None);
    }

    #[test]
    fn test_fan_out_clone_shares_buffers() {
        let event = Event::new("shared payload");
        let copy = event.clone();

        let (a, b) = match (event.payload(), copy.payload()) {
            (Payload::Str(a), Payload::Str(b)) => (a, b),
            _ => panic!("expected string payloads"),
        };
        assert!(Arc::ptr_eq(a, b));
    }

    #[test]
    fn test_into_parts_round_trip() {
        let mut metadata = EventMetadata::with_key(3);
        metadata.sequence = Some(12);
        let event = Event::with_metadata(1i64, metadata);

        let (payload, metadata) = event.into_parts();
        let rebuilt = Event::from_parts(Payload::Int(payload.as_int().unwrap() * 2), metadata);
        assert_eq!(rebuilt.payload().as_int(), Some(2));
        assert_eq!(rebuilt.key(), Some(3));
        assert_eq!(rebuilt.sequence(), Some(12));
    }
}
