//! Line-oriented messaging substrate
//!
//! Reads envelopes from an input stream, answers the `init` handshake
//! itself, and hands every other envelope to a [`Handler`] on its own task.
//! Outbound envelopes are queued on a channel drained by a single writer.

use crate::framing::{EnvelopeCodec, FrameError};
use crate::peer::ClusterInfo;
use broadcast_core::{Body, Envelope, ErrorCode, NodeId, Payload};
use bytes::BytesMut;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, info, warn};

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Node not initialized")]
    NotInitialized,
}

/// Errors a handler reports back to the substrate
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Not supported: {0}")]
    NotSupported(String),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl HandlerError {
    /// Error code sent to the requester
    pub fn code(&self) -> ErrorCode {
        match self {
            HandlerError::NotSupported(_) => ErrorCode::NotSupported,
            HandlerError::Transport(_) => ErrorCode::TemporarilyUnavailable,
        }
    }
}

/// Outbound side of the substrate as seen by handlers
pub trait Outbox: Send + Sync {
    /// Reply to a request, correlated to its `msg_id`
    fn reply(&self, request: &Envelope, payload: Payload) -> Result<(), TransportError>;

    /// Fire-and-forget unicast without a `msg_id`
    fn send(&self, dest: &NodeId, payload: Payload) -> Result<(), TransportError>;

    /// Unicast with a fresh `msg_id`, returned so the caller can match the reply
    fn send_tracked(&self, dest: &NodeId, payload: Payload) -> Result<u64, TransportError>;
}

/// Inbound message handler
pub trait Handler: Send + Sync + 'static {
    fn handle(
        &self,
        out: &dyn Outbox,
        cluster: &ClusterInfo,
        envelope: &Envelope,
    ) -> Result<(), HandlerError>;
}

#[derive(Debug, Default)]
struct Counters {
    received: AtomicU64,
    sent: AtomicU64,
    malformed: AtomicU64,
}

/// Transport statistics
#[derive(Debug, Clone, Copy, Default)]
pub struct TransportStats {
    pub received: u64,
    pub sent: u64,
    pub malformed: u64,
}

/// Messaging substrate for one node
pub struct Transport {
    /// Queue drained by the writer task
    outbound: mpsc::UnboundedSender<Envelope>,
    /// Next outbound msg_id
    next_msg_id: AtomicU64,
    /// Set by the `init` handshake
    cluster: RwLock<Option<Arc<ClusterInfo>>>,
    counters: Counters,
}

impl Transport {
    /// Create a new transport and the receiving end of its outbound queue
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Envelope>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        let transport = Self {
            outbound,
            next_msg_id: AtomicU64::new(1),
            cluster: RwLock::new(None),
            counters: Counters::default(),
        };
        (transport, rx)
    }

    /// Cluster membership, once initialized
    pub fn cluster(&self) -> Option<Arc<ClusterInfo>> {
        self.cluster.read().clone()
    }

    /// Our node ID
    pub fn local_id(&self) -> Result<NodeId, TransportError> {
        self.cluster
            .read()
            .as_ref()
            .map(|c| c.id.clone())
            .ok_or(TransportError::NotInitialized)
    }

    /// Get transport statistics
    pub fn stats(&self) -> TransportStats {
        TransportStats {
            received: self.counters.received.load(Ordering::Relaxed),
            sent: self.counters.sent.load(Ordering::Relaxed),
            malformed: self.counters.malformed.load(Ordering::Relaxed),
        }
    }

    fn allocate_msg_id(&self) -> u64 {
        self.next_msg_id.fetch_add(1, Ordering::Relaxed)
    }

    fn enqueue(&self, envelope: Envelope) -> Result<(), TransportError> {
        self.outbound
            .send(envelope)
            .map_err(|_| TransportError::ConnectionClosed)?;
        self.counters.sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn initialize(&self, request: &Envelope, node_id: &NodeId, node_ids: &[NodeId]) {
        let cluster = ClusterInfo::new(node_id.clone(), node_ids.to_vec());
        info!(
            "Initialized as {} ({} peers)",
            cluster.id,
            cluster.peers().count()
        );

        if let Some(previous) = self.cluster.write().replace(Arc::new(cluster)) {
            warn!("Re-initialized, previous identity was {}", previous.id);
        }

        let reply = Envelope::new(
            node_id.clone(),
            request.src.clone(),
            Body::new(Payload::InitOk).in_reply_to(request.body.msg_id),
        );
        if let Err(e) = self.enqueue(reply) {
            warn!("Failed to acknowledge init: {}", e);
        }
    }

    /// Dispatch one inbound envelope
    fn dispatch<H: Handler>(self: &Arc<Self>, envelope: Envelope, handler: &Arc<H>) {
        self.counters.received.fetch_add(1, Ordering::Relaxed);

        if let Payload::Init { node_id, node_ids } = &envelope.body.payload {
            self.initialize(&envelope, node_id, node_ids);
            return;
        }

        let Some(cluster) = self.cluster() else {
            warn!(
                "Dropping {} from {} received before init",
                envelope.body.payload.kind(),
                envelope.src
            );
            return;
        };

        let transport = Arc::clone(self);
        let handler = Arc::clone(handler);
        tokio::spawn(async move {
            let Err(e) = handler.handle(&*transport, &cluster, &envelope) else {
                return;
            };

            warn!(
                "Handler failed for {} from {}: {}",
                envelope.body.payload.kind(),
                envelope.src,
                e
            );
            if envelope.body.msg_id.is_some() {
                let error = Payload::Error {
                    code: e.code(),
                    text: e.to_string(),
                };
                if let Err(e) = transport.reply(&envelope, error) {
                    debug!("Failed to send error reply: {}", e);
                }
            }
        });
    }

    fn record_bad_frame(&self, error: &FrameError) {
        self.counters.malformed.fetch_add(1, Ordering::Relaxed);
        warn!("Dropping inbound frame: {}", error);
    }

    /// Serve inbound envelopes until the reader reaches EOF
    pub async fn serve<R, H>(
        self: Arc<Self>,
        mut reader: R,
        handler: Arc<H>,
    ) -> Result<(), TransportError>
    where
        R: AsyncRead + Unpin,
        H: Handler,
    {
        let mut codec = EnvelopeCodec::new();
        let mut buf = BytesMut::with_capacity(8 * 1024);

        loop {
            loop {
                match codec.decode(&mut buf) {
                    Ok(Some(envelope)) => self.dispatch(envelope, &handler),
                    Ok(None) => break,
                    Err(e) => self.record_bad_frame(&e),
                }
            }

            if reader.read_buf(&mut buf).await? == 0 {
                break;
            }
        }

        loop {
            match codec.decode_eof(&mut buf) {
                Ok(Some(envelope)) => self.dispatch(envelope, &handler),
                Ok(None) => break,
                Err(e) => self.record_bad_frame(&e),
            }
        }

        info!("Inbound stream closed");
        Ok(())
    }

    /// Drain the outbound queue into a writer until every sender is dropped
    pub async fn write_loop<W>(
        mut outbound: mpsc::UnboundedReceiver<Envelope>,
        mut writer: W,
    ) -> Result<(), TransportError>
    where
        W: AsyncWrite + Unpin,
    {
        let mut codec = EnvelopeCodec::new();
        let mut buf = BytesMut::with_capacity(8 * 1024);

        while let Some(envelope) = outbound.recv().await {
            let mut next = Some(envelope);
            // Batch whatever is already queued into one write
            while let Some(envelope) = next.take() {
                if let Err(e) = codec.encode(envelope, &mut buf) {
                    warn!("Dropping outbound envelope: {}", e);
                }
                next = outbound.try_recv().ok();
            }

            writer.write_all(&buf).await?;
            writer.flush().await?;
            buf.clear();
        }

        debug!("Outbound queue closed");
        Ok(())
    }
}

impl Outbox for Transport {
    fn reply(&self, request: &Envelope, payload: Payload) -> Result<(), TransportError> {
        let mut reply = request.reply(payload);
        reply.body.msg_id = Some(self.allocate_msg_id());
        self.enqueue(reply)
    }

    fn send(&self, dest: &NodeId, payload: Payload) -> Result<(), TransportError> {
        let envelope = Envelope::new(self.local_id()?, dest.clone(), Body::new(payload));
        self.enqueue(envelope)
    }

    fn send_tracked(&self, dest: &NodeId, payload: Payload) -> Result<u64, TransportError> {
        let msg_id = self.allocate_msg_id();
        let envelope = Envelope::new(
            self.local_id()?,
            dest.clone(),
            Body::new(payload).with_msg_id(msg_id),
        );
        self.enqueue(envelope)?;
        Ok(msg_id)
    }
}
