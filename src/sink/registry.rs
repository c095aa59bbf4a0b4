//! Registry of the output sinks currently attached to the journey
//!
//! Under the default policy a new connection evicts every earlier one, so the
//! journey is only ever broadcast to the most recent client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use crate::sink::interface::{Sink, SinkId, SinkStatus};

/// What happens to existing sinks when a new one attaches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionPolicy {
    /// Close and drop every other sink
    #[default]
    EvictPrevious,
    /// Keep all sinks and broadcast to each of them
    FanOut,
}

/// Delivery counts for one broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Debug, Default, Clone)]
pub struct RegistryStats {
    pub connections_accepted: u64,
    pub connections_evicted: u64,
    pub payloads_delivered: u64,
    pub send_failures: u64,
    /// When the most recent sink attached
    pub last_attached: Option<DateTime<Utc>>,
}

/// Set of attached sinks, in attach order
pub struct ConnectionRegistry {
    policy: ConnectionPolicy,
    sinks: Vec<Box<dyn Sink>>,
    stats: RegistryStats,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new(ConnectionPolicy::default())
    }
}

impl ConnectionRegistry {
    pub fn new(policy: ConnectionPolicy) -> Self {
        Self {
            policy,
            sinks: Vec::new(),
            stats: RegistryStats::default(),
        }
    }

    pub fn policy(&self) -> ConnectionPolicy {
        self.policy
    }

    /// Number of attached sinks
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn stats(&self) -> &RegistryStats {
        &self.stats
    }

    /// Register a new sink, applying the connection policy to existing ones
    pub async fn attach(&mut self, sink: Box<dyn Sink>) {
        if self.policy == ConnectionPolicy::EvictPrevious {
            for mut previous in self.sinks.drain(..) {
                info!("Closing previous connection {} ({})", previous.id(), previous.peer());
                previous.close().await;
                self.stats.connections_evicted += 1;
            }
        }

        info!("Client connected: {} ({})", sink.id(), sink.peer());
        self.stats.connections_accepted += 1;
        self.stats.last_attached = Some(Utc::now());
        self.sinks.push(sink);
    }

    /// Remove a sink; unknown ids are ignored
    pub fn detach(&mut self, id: SinkId) -> bool {
        let before = self.sinks.len();
        self.sinks.retain(|sink| sink.id() != id);
        let removed = self.sinks.len() != before;
        if removed {
            info!("Client disconnected: {}", id);
        } else {
            debug!("Detach for unknown {}", id);
        }
        removed
    }

    /// Send a payload to every open sink
    ///
    /// Sinks that report themselves closed are dropped first. A failing sink is
    /// logged and counted; it never stops delivery to the rest.
    pub async fn broadcast(&mut self, payload: &str) -> BroadcastReport {
        self.prune_closed();
        let mut report = BroadcastReport::default();

        for sink in self.sinks.iter_mut() {
            match sink.send(payload).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!("Broadcast to {} failed: {}", sink.peer(), e);
                    report.failed += 1;
                }
            }
        }

        self.stats.payloads_delivered += report.delivered as u64;
        self.stats.send_failures += report.failed as u64;
        report
    }

    fn prune_closed(&mut self) {
        self.sinks.retain(|sink| {
            let open = sink.status() == SinkStatus::Open;
            if !open {
                info!("Dropping closed connection {} ({})", sink.id(), sink.peer());
            }
            open
        });
    }

    /// Close and drop every sink
    pub async fn close_all(&mut self) {
        for mut sink in self.sinks.drain(..) {
            sink.close().await;
        }
        let stats = &self.stats;
        info!(
            "Connections: {} accepted, {} evicted; payloads: {} delivered, {} failed",
            stats.connections_accepted,
            stats.connections_evicted,
            stats.payloads_delivered,
            stats.send_failures
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::mock::MockSink;

    fn ids(registry: &ConnectionRegistry) -> Vec<SinkId> {
        registry.sinks.iter().map(|sink| sink.id()).collect()
    }

    #[tokio::test]
    async fn test_new_connection_evicts_previous() {
        let mut registry = ConnectionRegistry::default();
        let (a, probe_a) = MockSink::new("a");
        let (b, probe_b) = MockSink::new("b");
        let b_id = b.id();

        registry.attach(Box::new(a)).await;
        registry.broadcast("first").await;
        registry.attach(Box::new(b)).await;
        registry.broadcast("second").await;

        assert!(probe_a.is_closed());
        assert_eq!(probe_a.payloads(), vec!["first"]);
        assert_eq!(probe_b.payloads(), vec!["second"]);
        assert_eq!(ids(&registry), vec![b_id]);
        assert_eq!(registry.stats().connections_evicted, 1);
    }

    #[tokio::test]
    async fn test_fan_out_keeps_everyone() {
        let mut registry = ConnectionRegistry::new(ConnectionPolicy::FanOut);
        let (a, probe_a) = MockSink::new("a");
        let (b, probe_b) = MockSink::new("b");

        registry.attach(Box::new(a)).await;
        registry.attach(Box::new(b)).await;
        let report = registry.broadcast("hello").await;

        assert_eq!(report, BroadcastReport { delivered: 2, failed: 0 });
        assert!(!probe_a.is_closed());
        assert_eq!(probe_a.payloads(), vec!["hello"]);
        assert_eq!(probe_b.payloads(), vec!["hello"]);
    }

    #[tokio::test]
    async fn test_send_failure_is_isolated() {
        let mut registry = ConnectionRegistry::new(ConnectionPolicy::FanOut);
        let (a, probe_a) = MockSink::new("a");
        let (b, probe_b) = MockSink::new("b");
        probe_a.set_fail_sends(true);

        registry.attach(Box::new(a)).await;
        registry.attach(Box::new(b)).await;
        let report = registry.broadcast("payload").await;

        assert_eq!(report, BroadcastReport { delivered: 1, failed: 1 });
        assert_eq!(probe_b.payloads(), vec!["payload"]);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.stats().send_failures, 1);
    }

    #[tokio::test]
    async fn test_detach() {
        let mut registry = ConnectionRegistry::default();
        let (a, _probe) = MockSink::new("a");
        let id = a.id();

        registry.attach(Box::new(a)).await;
        assert_eq!(ids(&registry), vec![id]);
        assert!(registry.detach(id));
        assert!(!registry.detach(id));
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test]
    async fn test_closed_sink_is_pruned_on_broadcast() {
        let mut registry = ConnectionRegistry::new(ConnectionPolicy::FanOut);
        let (mut a, probe_a) = MockSink::new("a");
        let (b, probe_b) = MockSink::new("b");
        let b_id = b.id();
        a.close().await;

        registry.attach(Box::new(a)).await;
        registry.attach(Box::new(b)).await;
        let report = registry.broadcast("payload").await;

        assert_eq!(report, BroadcastReport { delivered: 1, failed: 0 });
        assert!(probe_a.payloads().is_empty());
        assert_eq!(probe_b.payloads(), vec!["payload"]);
        assert_eq!(ids(&registry), vec![b_id]);
    }
}
