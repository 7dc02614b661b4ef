use thiserror::Error;

use crate::runtime::RuntimeState;

/// Result type for runtime operations
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors surfaced synchronously by the runtime API.
///
/// Backpressure and queue closure are not errors; they are reported through
/// queue results and counters.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Lifecycle method called out of order
    #[error("invalid runtime state: expected {expected:?}, found {actual:?}")]
    InvalidState {
        expected: RuntimeState,
        actual: RuntimeState,
    },

    /// An edge references an operator the builder never saw
    #[error("edge references unknown operator `{0}`")]
    UnknownOperator(String),

    /// More than one edge ends at the same operator
    #[error("operator `{0}` has more than one incoming edge (fan-in is not supported)")]
    FanInUnsupported(String),

    /// Sources have no input queue
    #[error("source `{0}` cannot have an incoming edge")]
    EdgeIntoSource(String),

    /// Sinks have no output queues
    #[error("sink `{0}` cannot have an outgoing edge")]
    EdgeFromSink(String),

    /// Worker pool started twice
    #[error("worker pool already started")]
    PoolAlreadyStarted,

    /// OS refused to spawn a thread
    #[error("failed to spawn thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),
}
