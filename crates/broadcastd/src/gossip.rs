//! Flood gossip over the configured topology

use crate::topology::Topology;
use crate::value_store::{AcceptResult, ValueStore};
use broadcast_core::{value_id, NodeId, Origin, Payload, Value};
use broadcast_net::Outbox;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Re-send policy for acknowledged gossip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// How long to wait for `broadcast_ok` before re-sending
    pub timeout: Duration,
    /// Give up after this many sends (0 = never, and pending forwards to a
    /// dead neighbor are then kept and re-sent forever)
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(timeout: Duration, max_attempts: u32) -> Self {
        Self {
            timeout,
            max_attempts,
        }
    }

    /// Deadline for a send made at `now`, with up to 25% jitter
    pub fn deadline_from(&self, now: Instant) -> Instant {
        let max_jitter = self.timeout.as_millis() as u64 / 4;
        let jitter = rand::thread_rng().gen_range(0..=max_jitter);
        now + self.timeout + Duration::from_millis(jitter)
    }

    /// How often pending forwards are checked
    pub fn tick(&self) -> Duration {
        (self.timeout / 2).max(Duration::from_millis(1))
    }

    fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts != 0 && attempts >= self.max_attempts
    }
}

/// A forward waiting for its acknowledgment
#[derive(Debug, Clone)]
struct PendingForward {
    dest: NodeId,
    value: Value,
    attempts: u32,
    deadline: Instant,
}

#[derive(Debug, Default)]
struct Counters {
    forwarded: AtomicU64,
    retried: AtomicU64,
    abandoned: AtomicU64,
}

/// Accepts values into the store and floods new ones to our neighbors
pub struct GossipPropagator {
    store: Arc<ValueStore>,
    topology: Arc<Topology>,
    /// `None` means fire-and-forget
    retry: Option<RetryPolicy>,
    /// Unacknowledged forwards keyed by outbound msg_id
    pending: Mutex<HashMap<u64, PendingForward>>,
    counters: Counters,
}

impl GossipPropagator {
    pub fn new(
        store: Arc<ValueStore>,
        topology: Arc<Topology>,
        retry: Option<RetryPolicy>,
    ) -> Self {
        Self {
            store,
            topology,
            retry,
            pending: Mutex::new(HashMap::new()),
            counters: Counters::default(),
        }
    }

    /// Accept a value and, if it is new, forward it to every neighbor
    ///
    /// Values already in the store are never forwarded again, which is what
    /// terminates the flood.
    pub fn ingest(&self, out: &dyn Outbox, value: Value, origin: &Origin) -> AcceptResult {
        let id = value_id(&value);
        if self.store.accept_with_id(id, value.clone()) == AcceptResult::AlreadyPresent {
            debug!("Duplicate value {} from {}", id, origin);
            return AcceptResult::AlreadyPresent;
        }

        let neighbors = self.topology.neighbors();
        debug!(
            "New value {} from {}, forwarding to {} neighbors",
            id,
            origin,
            neighbors.len()
        );
        for dest in &neighbors {
            self.forward(out, dest, value.clone(), 1);
        }

        AcceptResult::Added
    }

    fn forward(&self, out: &dyn Outbox, dest: &NodeId, value: Value, attempts: u32) {
        self.counters.forwarded.fetch_add(1, Ordering::Relaxed);

        let Some(policy) = self.retry else {
            if let Err(e) = out.send(dest, Payload::Broadcast { message: value }) {
                debug!("Gossip to {} failed: {}", dest, e);
            }
            return;
        };

        let payload = Payload::Broadcast {
            message: value.clone(),
        };
        match out.send_tracked(dest, payload) {
            // An ack racing ahead of this insert costs one redundant re-send
            Ok(msg_id) => {
                self.pending.lock().insert(
                    msg_id,
                    PendingForward {
                        dest: dest.clone(),
                        value,
                        attempts,
                        deadline: policy.deadline_from(Instant::now()),
                    },
                );
            }
            Err(e) => debug!("Gossip to {} failed: {}", dest, e),
        }
    }

    /// Handle a `broadcast_ok` for a forward we sent
    ///
    /// Returns true if it settled a pending forward. In fire-and-forget mode
    /// acknowledgments are discarded.
    pub fn on_ack(&self, in_reply_to: Option<u64>) -> bool {
        if self.retry.is_none() {
            return false;
        }
        match in_reply_to {
            Some(msg_id) => self.pending.lock().remove(&msg_id).is_some(),
            None => false,
        }
    }

    /// Re-send every forward whose deadline has passed; returns how many were re-sent
    pub fn retry_due(&self, out: &dyn Outbox, now: Instant) -> usize {
        let Some(policy) = self.retry else {
            return 0;
        };

        let due: Vec<PendingForward> = {
            let mut pending = self.pending.lock();
            let expired: Vec<u64> = pending
                .iter()
                .filter(|(_, p)| p.deadline <= now)
                .map(|(msg_id, _)| *msg_id)
                .collect();
            expired
                .into_iter()
                .filter_map(|msg_id| pending.remove(&msg_id))
                .collect()
        };

        let mut resent = 0;
        for forward in due {
            if policy.exhausted(forward.attempts) {
                warn!(
                    "Giving up on gossip to {} after {} attempts",
                    forward.dest, forward.attempts
                );
                self.counters.abandoned.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            self.counters.retried.fetch_add(1, Ordering::Relaxed);
            self.forward(out, &forward.dest, forward.value, forward.attempts + 1);
            resent += 1;
        }
        resent
    }

    /// Count unacknowledged forwards
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Get gossip statistics
    pub fn stats(&self) -> GossipStats {
        GossipStats {
            forwarded: self.counters.forwarded.load(Ordering::Relaxed),
            retried: self.counters.retried.load(Ordering::Relaxed),
            abandoned: self.counters.abandoned.load(Ordering::Relaxed),
            pending: self.pending_count(),
        }
    }
}

/// Gossip statistics
#[derive(Debug, Clone, Copy, Default)]
pub struct GossipStats {
    pub forwarded: u64,
    pub retried: u64,
    pub abandoned: u64,
    pub pending: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingOutbox;
    use broadcast_core::Adjacency;
    use serde_json::json;

    fn propagator(neighbors: &[&str], retry: Option<RetryPolicy>) -> GossipPropagator {
        let topology = Arc::new(Topology::new());
        let adjacency: Adjacency = [(
            NodeId::from("n1"),
            neighbors.iter().map(|n| NodeId::from(*n)).collect(),
        )]
        .into_iter()
        .collect();
        topology.set_neighbors(&NodeId::from("n1"), &adjacency);
        GossipPropagator::new(Arc::new(ValueStore::new()), topology, retry)
    }

    fn acked() -> Option<RetryPolicy> {
        Some(RetryPolicy::new(Duration::from_millis(100), 3))
    }

    #[test]
    fn test_new_value_forwarded_to_every_neighbor() {
        let gossip = propagator(&["n2", "n3"], None);
        let out = RecordingOutbox::new("n1");

        let result = gossip.ingest(&out, json!(5), &Origin::Client);
        assert_eq!(result, AcceptResult::Added);

        let sent = out.take();
        let dests: Vec<_> = sent.iter().map(|e| e.dest.as_str()).collect();
        assert_eq!(dests, vec!["n2", "n3"]);
        for envelope in &sent {
            assert_eq!(envelope.body.payload, Payload::Broadcast { message: json!(5) });
            assert_eq!(envelope.body.msg_id, None);
        }
    }

    #[test]
    fn test_seen_value_not_forwarded() {
        let gossip = propagator(&["n2", "n3"], None);
        let out = RecordingOutbox::new("n1");

        gossip.ingest(&out, json!(5), &Origin::Client);
        out.take();

        let result = gossip.ingest(&out, json!(5), &Origin::Node("n2".into()));
        assert_eq!(result, AcceptResult::AlreadyPresent);
        assert_eq!(out.sent_count(), 0);
    }

    #[test]
    fn test_forward_includes_origin_neighbor() {
        let gossip = propagator(&["n2", "n3"], None);
        let out = RecordingOutbox::new("n1");

        gossip.ingest(&out, json!("v"), &Origin::Node("n2".into()));
        assert_eq!(out.sent_to("n2").len(), 1);
        assert_eq!(out.sent_to("n3").len(), 1);
    }

    #[test]
    fn test_no_neighbors_no_forwards() {
        let gossip = propagator(&[], None);
        let out = RecordingOutbox::new("n1");

        assert_eq!(gossip.ingest(&out, json!(1), &Origin::Client), AcceptResult::Added);
        assert_eq!(out.sent_count(), 0);
    }

    #[test]
    fn test_acks_discarded_when_fire_and_forget() {
        let gossip = propagator(&["n2"], None);
        let out = RecordingOutbox::new("n1");

        gossip.ingest(&out, json!(1), &Origin::Client);
        assert!(!gossip.on_ack(Some(1)));
        assert_eq!(gossip.pending_count(), 0);
        assert_eq!(gossip.retry_due(&out, Instant::now() + Duration::from_secs(60)), 0);
    }

    #[test]
    fn test_acked_forward_settles_pending() {
        let gossip = propagator(&["n2", "n3"], acked());
        let out = RecordingOutbox::new("n1");

        gossip.ingest(&out, json!(5), &Origin::Client);
        assert_eq!(gossip.pending_count(), 2);

        let sent = out.take();
        let to_n2 = sent.iter().find(|e| e.dest.as_str() == "n2").unwrap();
        assert!(gossip.on_ack(to_n2.body.msg_id));
        assert!(!gossip.on_ack(to_n2.body.msg_id));
        assert_eq!(gossip.pending_count(), 1);

        // Only n3 is re-sent
        let later = Instant::now() + Duration::from_secs(1);
        assert_eq!(gossip.retry_due(&out, later), 1);
        let resent = out.take();
        assert_eq!(resent.len(), 1);
        assert_eq!(resent[0].dest.as_str(), "n3");
        assert_eq!(resent[0].body.payload, Payload::Broadcast { message: json!(5) });
    }

    #[test]
    fn test_retry_waits_for_deadline() {
        let gossip = propagator(&["n2"], acked());
        let out = RecordingOutbox::new("n1");

        gossip.ingest(&out, json!(5), &Origin::Client);
        out.take();

        assert_eq!(gossip.retry_due(&out, Instant::now()), 0);
        assert_eq!(gossip.pending_count(), 1);
    }

    #[test]
    fn test_retry_gives_up_after_max_attempts() {
        let gossip = propagator(&["n2"], acked());
        let out = RecordingOutbox::new("n1");

        gossip.ingest(&out, json!(5), &Origin::Client);
        let mut now = Instant::now();
        for _ in 0..2 {
            now += Duration::from_secs(1);
            assert_eq!(gossip.retry_due(&out, now), 1);
        }

        now += Duration::from_secs(1);
        assert_eq!(gossip.retry_due(&out, now), 0);
        assert_eq!(gossip.pending_count(), 0);
        assert_eq!(out.take().len(), 3);

        let stats = gossip.stats();
        assert_eq!(stats.forwarded, 3);
        assert_eq!(stats.retried, 2);
        assert_eq!(stats.abandoned, 1);
    }

    #[test]
    fn test_deadline_jitter_bounded() {
        let policy = RetryPolicy::new(Duration::from_millis(400), 0);
        let now = Instant::now();
        for _ in 0..50 {
            let deadline = policy.deadline_from(now);
            assert!(deadline >= now + Duration::from_millis(400));
            assert!(deadline <= now + Duration::from_millis(500));
        }
        assert_eq!(policy.tick(), Duration::from_millis(200));
    }
}
