//! broadcastd - Broadcast Gossip Node
//!
//! This node provides:
//! - Deduplicated, ordered storage of broadcast values
//! - Neighbor assignment from the cluster controller
//! - Flood gossip of new values, optionally acknowledged with retry
//! - Read-back of every value the node has seen

pub mod config;
pub mod gossip;
pub mod handler;
pub mod server;
pub mod topology;
pub mod value_store;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use gossip::{GossipPropagator, RetryPolicy};
pub use handler::BroadcastHandler;
pub use server::Server;
pub use topology::Topology;
pub use value_store::{AcceptResult, ValueStore};
