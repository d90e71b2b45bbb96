//! Messaging substrate for the broadcast gossip protocol
//!
//! This crate provides:
//! - Newline-delimited JSON envelope framing
//! - The `init` handshake and cluster membership
//! - Concurrent dispatch of inbound envelopes to a handler
//! - Reply correlation and outbound `msg_id` allocation

pub mod framing;
pub mod peer;
pub mod transport;

pub use framing::{EnvelopeCodec, FrameError};
pub use peer::ClusterInfo;
pub use transport::{Handler, HandlerError, Outbox, Transport, TransportError, TransportStats};
