//! In-memory substrate for unit tests

use broadcast_core::{Body, Envelope, NodeId, Payload};
use broadcast_net::{Outbox, TransportError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Records every outbound envelope instead of writing it anywhere
pub struct RecordingOutbox {
    local: NodeId,
    next_msg_id: AtomicU64,
    sent: Mutex<Vec<Envelope>>,
}

impl RecordingOutbox {
    pub fn new(local: impl Into<NodeId>) -> Self {
        Self {
            local: local.into(),
            next_msg_id: AtomicU64::new(1),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Remove and return everything sent so far
    pub fn take(&self) -> Vec<Envelope> {
        std::mem::take(&mut *self.sent.lock())
    }

    /// Envelopes addressed to `dest`, without draining
    pub fn sent_to(&self, dest: &str) -> Vec<Envelope> {
        self.sent
            .lock()
            .iter()
            .filter(|e| e.dest.as_str() == dest)
            .cloned()
            .collect()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

impl Outbox for RecordingOutbox {
    fn reply(&self, request: &Envelope, payload: Payload) -> Result<(), TransportError> {
        self.sent.lock().push(request.reply(payload));
        Ok(())
    }

    fn send(&self, dest: &NodeId, payload: Payload) -> Result<(), TransportError> {
        let envelope = Envelope::new(self.local.clone(), dest.clone(), Body::new(payload));
        self.sent.lock().push(envelope);
        Ok(())
    }

    fn send_tracked(&self, dest: &NodeId, payload: Payload) -> Result<u64, TransportError> {
        let msg_id = self.next_msg_id.fetch_add(1, Ordering::Relaxed);
        let envelope = Envelope::new(
            self.local.clone(),
            dest.clone(),
            Body::new(payload).with_msg_id(msg_id),
        );
        self.sent.lock().push(envelope);
        Ok(msg_id)
    }
}
