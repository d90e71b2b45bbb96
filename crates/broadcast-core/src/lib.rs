//! Broadcast Core Library
//!
//! This crate provides the message types, canonical value encoding, and
//! error types shared by the broadcast gossip substrate and node.
//!
//! # Modules
//!
//! - [`types`]: Protocol types (NodeId, ValueId, Envelope, Payload, etc.)
//! - [`canonical`]: Deterministic value encoding and value digests
//! - [`error`]: Error types

pub mod canonical;
pub mod error;
pub mod types;

pub use canonical::value_id;
pub use error::{Error, Result};
pub use types::*;
