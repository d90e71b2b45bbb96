//! broadcastd server - main service loop

use crate::config::Config;
use crate::gossip::{GossipPropagator, GossipStats};
use crate::handler::BroadcastHandler;
use crate::topology::Topology;
use crate::value_store::ValueStore;
use broadcast_net::{Transport, TransportError};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, info, warn};

/// Server errors
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Server state
pub struct Server {
    config: Config,
    store: Arc<ValueStore>,
    topology: Arc<Topology>,
    gossip: Arc<GossipPropagator>,
    handler: Arc<BroadcastHandler>,
    /// Shutdown signal
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: Config) -> Result<Self, ServerError> {
        config
            .validate()
            .map_err(|e| ServerError::Config(e.to_string()))?;

        let store = Arc::new(ValueStore::new());
        let topology = Arc::new(Topology::new());
        let gossip = Arc::new(GossipPropagator::new(
            store.clone(),
            topology.clone(),
            config.retry_policy(),
        ));
        let handler = Arc::new(BroadcastHandler::new(
            store.clone(),
            topology.clone(),
            gossip.clone(),
        ));

        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            config,
            store,
            topology,
            gossip,
            handler,
            shutdown_tx,
        })
    }

    /// Run the server on stdin/stdout
    pub async fn run(&self) -> Result<(), ServerError> {
        self.run_with(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Run the server on arbitrary streams until input ends or shutdown
    pub async fn run_with<R, W>(&self, reader: R, writer: W) -> Result<(), ServerError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        match self.config.retry_policy() {
            Some(policy) => info!(
                "Starting broadcastd (acknowledged gossip, timeout {:?}, max attempts {})",
                policy.timeout, policy.max_attempts
            ),
            None => info!("Starting broadcastd (fire-and-forget gossip)"),
        }

        let (transport, outbound) = Transport::new();
        let transport = Arc::new(transport);
        let writer_handle = tokio::spawn(Transport::write_loop(outbound, writer));
        let retry_handle = self.spawn_retry_task(transport.clone());

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let served = tokio::select! {
            result = transport.clone().serve(reader, self.handler.clone()) => result,
            _ = shutdown_rx.recv() => {
                info!("Shutting down...");
                Ok(())
            }
        };
        if let Err(e) = &served {
            warn!("Inbound stream failed: {}", e);
        }

        // Stop the retry task, then let the writer drain once every sender is gone
        self.shutdown();
        if let Some(handle) = retry_handle {
            if let Err(e) = handle.await {
                warn!("Retry task failed: {}", e);
            }
        }
        let transport_stats = transport.stats();
        drop(transport);
        let written = match writer_handle.await {
            Ok(result) => result,
            Err(e) => {
                warn!("Writer task failed: {}", e);
                Ok(())
            }
        };

        let stats = self.stats();
        info!(
            "Final stats: {} values, {} neighbors, {} received, {} sent, {} malformed, {} forwarded, {} retried, {} pending",
            stats.value_count,
            stats.neighbor_count,
            transport_stats.received,
            transport_stats.sent,
            transport_stats.malformed,
            stats.gossip.forwarded,
            stats.gossip.retried,
            stats.gossip.pending
        );

        served?;
        written?;
        Ok(())
    }

    /// Spawn background retry task for acknowledged gossip
    fn spawn_retry_task(&self, transport: Arc<Transport>) -> Option<tokio::task::JoinHandle<()>> {
        let policy = self.config.retry_policy()?;
        let gossip = self.gossip.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        Some(tokio::spawn(async move {
            let mut ticker = interval(policy.tick());

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let resent = gossip.retry_due(&*transport, Instant::now());
                        if resent > 0 {
                            debug!("Re-sent {} unacknowledged forwards", resent);
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        }))
    }

    /// Shutdown the server
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get server statistics
    pub fn stats(&self) -> ServerStats {
        ServerStats {
            value_count: self.store.len(),
            neighbor_count: self.topology.len(),
            gossip: self.gossip.stats(),
        }
    }
}

/// Server statistics
#[derive(Debug, Clone)]
pub struct ServerStats {
    pub value_count: usize,
    pub neighbor_count: usize,
    pub gossip: GossipStats,
}
