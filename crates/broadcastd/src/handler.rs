//! Inbound message dispatch

use crate::gossip::GossipPropagator;
use crate::topology::Topology;
use crate::value_store::ValueStore;
use broadcast_core::{Envelope, Payload};
use broadcast_net::{ClusterInfo, Handler, HandlerError, Outbox};
use std::sync::Arc;
use tracing::debug;

/// Routes each envelope by message kind to the store, topology, or gossip
pub struct BroadcastHandler {
    store: Arc<ValueStore>,
    topology: Arc<Topology>,
    gossip: Arc<GossipPropagator>,
}

impl BroadcastHandler {
    pub fn new(
        store: Arc<ValueStore>,
        topology: Arc<Topology>,
        gossip: Arc<GossipPropagator>,
    ) -> Self {
        Self {
            store,
            topology,
            gossip,
        }
    }
}

impl Handler for BroadcastHandler {
    fn handle(
        &self,
        out: &dyn Outbox,
        cluster: &ClusterInfo,
        envelope: &Envelope,
    ) -> Result<(), HandlerError> {
        match &envelope.body.payload {
            Payload::Broadcast { message } => {
                let origin = cluster.origin_of(&envelope.src);
                self.gossip.ingest(out, message.clone(), &origin);

                // Plain forwards carry no msg_id and expect no answer
                if origin.is_client() || envelope.body.msg_id.is_some() {
                    out.reply(envelope, Payload::BroadcastOk)?;
                }
            }
            Payload::Read => {
                let messages = self.store.snapshot();
                out.reply(envelope, Payload::ReadOk { messages })?;
            }
            Payload::Topology { topology } => {
                self.topology.set_neighbors(&cluster.id, topology);
                out.reply(envelope, Payload::TopologyOk)?;
            }
            Payload::BroadcastOk => {
                if !self.gossip.on_ack(envelope.body.in_reply_to) {
                    debug!(
                        "Ignoring broadcast_ok from {} (in_reply_to {:?})",
                        envelope.src, envelope.body.in_reply_to
                    );
                }
            }
            other => return Err(HandlerError::NotSupported(other.kind().to_string())),
        }
        Ok(())
    }
}
