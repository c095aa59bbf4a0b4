use async_trait::async_trait;
use thiserror::Error;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Result type for sink operations
pub type SinkResult<T> = Result<T, SinkError>;

static NEXT_SINK_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of an attached output sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SinkId(u64);

impl SinkId {
    /// Allocate a fresh, process-unique id
    pub fn next() -> Self {
        Self(NEXT_SINK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sink#{}", self.0)
    }
}

/// Status of a sink
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SinkStatus {
    /// Sink accepts payloads
    Open,
    /// Sink was closed by us or by the peer
    Closed,
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("{0} is closed")]
    Closed(SinkId),
}

/// Trait for anything that can receive broadcast payloads
///
/// Implementations:
/// - WebSocket connections (through a channel to the socket writer)
/// - Mock sinks for testing
#[async_trait]
pub trait Sink: Send {
    /// Identity used to detach the sink later
    fn id(&self) -> SinkId;

    /// Human readable peer description for logs
    fn peer(&self) -> &str;

    /// Get the current status of the sink; closed sinks are dropped from the registry
    fn status(&self) -> SinkStatus;

    /// Deliver one payload
    async fn send(&mut self, payload: &str) -> SinkResult<()>;

    /// Close the sink; the peer sees the connection end
    async fn close(&mut self);
}
