use async_trait::async_trait;
use tokio::sync::mpsc;
use crate::sink::interface::{Sink, SinkError, SinkId, SinkResult, SinkStatus};

/// A frame queued for a connection's socket writer
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Text(String),
    Close,
}

/// Sink backed by the outbound queue of one connection
///
/// Control responses go through the same queue, so broadcasts and replies
/// reach the client in the order they were produced.
pub struct ChannelSink {
    id: SinkId,
    peer: String,
    tx: mpsc::UnboundedSender<Outbound>,
    status: SinkStatus,
}

impl ChannelSink {
    pub fn new(id: SinkId, peer: impl Into<String>, tx: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            id,
            peer: peer.into(),
            tx,
            status: SinkStatus::Open,
        }
    }
}

#[async_trait]
impl Sink for ChannelSink {
    fn id(&self) -> SinkId {
        self.id
    }

    fn peer(&self) -> &str {
        &self.peer
    }

    fn status(&self) -> SinkStatus {
        if self.tx.is_closed() {
            SinkStatus::Closed
        } else {
            self.status
        }
    }

    async fn send(&mut self, payload: &str) -> SinkResult<()> {
        if self.status == SinkStatus::Closed {
            return Err(SinkError::Closed(self.id));
        }
        self.tx
            .send(Outbound::Text(payload.to_string()))
            .map_err(|_| SinkError::Closed(self.id))
    }

    async fn close(&mut self) {
        if self.status == SinkStatus::Open {
            // The writer may already be gone
            let _ = self.tx.send(Outbound::Close);
            self.status = SinkStatus::Closed;
        }
    }
}
