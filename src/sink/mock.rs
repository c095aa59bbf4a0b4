use async_trait::async_trait;
use tokio::time::Instant;
use std::sync::{Arc, Mutex};
use crate::sink::interface::{Sink, SinkError, SinkId, SinkResult, SinkStatus};

/// Everything a [`MockSink`] has seen, shared with the test that created it
#[derive(Debug, Default)]
pub struct MockRecord {
    /// Payloads with the (tokio) instant they arrived
    pub received: Vec<(Instant, String)>,
    pub closed: bool,
    pub fail_sends: bool,
    pub failed_sends: usize,
}

/// Test-side view of a mock sink's record
#[derive(Clone, Default)]
pub struct MockProbe {
    record: Arc<Mutex<MockRecord>>,
}

impl MockProbe {
    /// Payloads received so far
    pub fn payloads(&self) -> Vec<String> {
        self.record
            .lock()
            .unwrap()
            .received
            .iter()
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    /// Arrival instants of the payloads received so far
    pub fn arrivals(&self) -> Vec<Instant> {
        self.record
            .lock()
            .unwrap()
            .received
            .iter()
            .map(|(at, _)| *at)
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.record.lock().unwrap().closed
    }

    pub fn failed_sends(&self) -> usize {
        self.record.lock().unwrap().failed_sends
    }

    /// Make every following send fail
    pub fn set_fail_sends(&self, fail: bool) {
        self.record.lock().unwrap().fail_sends = fail;
    }
}

/// Mock sink for testing without a network connection
///
/// Records every payload it is sent and can be told to fail sends.
pub struct MockSink {
    id: SinkId,
    peer: String,
    status: SinkStatus,
    record: Arc<Mutex<MockRecord>>,
}

impl MockSink {
    /// Create a new mock sink and the probe that observes it
    pub fn new(peer: &str) -> (Self, MockProbe) {
        let probe = MockProbe::default();
        let sink = Self {
            id: SinkId::next(),
            peer: peer.to_string(),
            status: SinkStatus::Open,
            record: probe.record.clone(),
        };
        (sink, probe)
    }
}

#[async_trait]
impl Sink for MockSink {
    fn id(&self) -> SinkId {
        self.id
    }

    fn peer(&self) -> &str {
        &self.peer
    }

    fn status(&self) -> SinkStatus {
        self.status
    }

    async fn send(&mut self, payload: &str) -> SinkResult<()> {
        let mut record = self.record.lock().unwrap();
        if self.status != SinkStatus::Open {
            return Err(SinkError::Closed(self.id));
        }
        if record.fail_sends {
            record.failed_sends += 1;
            return Err(SinkError::Closed(self.id));
        }
        record.received.push((Instant::now(), payload.to_string()));
        Ok(())
    }

    async fn close(&mut self) {
        self.status = SinkStatus::Closed;
        self.record.lock().unwrap().closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_sink_send_and_close() {
        let (mut sink, probe) = MockSink::new("test");
        assert_eq!(sink.status(), SinkStatus::Open);

        sink.send("a").await.unwrap();
        sink.send("b").await.unwrap();
        assert_eq!(probe.payloads(), vec!["a", "b"]);

        sink.close().await;
        assert!(probe.is_closed());
        assert!(sink.send("c").await.is_err());
        assert_eq!(probe.payloads().len(), 2);
    }

    #[tokio::test]
    async fn test_mock_sink_injected_failure() {
        let (mut sink, probe) = MockSink::new("test");
        probe.set_fail_sends(true);

        assert!(matches!(sink.send("a").await, Err(SinkError::Closed(_))));
        assert_eq!(sink.status(), SinkStatus::Open);
        assert_eq!(probe.failed_sends(), 1);
        assert!(probe.payloads().is_empty());
    }
}
