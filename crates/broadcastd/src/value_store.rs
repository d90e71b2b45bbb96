//! Deduplicating value log

use broadcast_core::{value_id, Value, ValueId};
use parking_lot::Mutex;
use std::collections::HashSet;

/// Outcome of offering a value to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptResult {
    /// First time this value was seen
    Added,
    /// Value was already known; nothing changed
    AlreadyPresent,
}

#[derive(Default)]
struct StoreInner {
    /// Digests of every value in `log`
    seen: HashSet<ValueId>,
    /// Accepted values in first-acceptance order
    log: Vec<Value>,
}

/// In-memory set of accepted values with insertion order
///
/// `accept` and `snapshot` serialize on one lock, so a snapshot never
/// observes a half-applied accept.
#[derive(Default)]
pub struct ValueStore {
    inner: Mutex<StoreInner>,
}

impl ValueStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a value; only the first offer of each distinct value mutates the store
    pub fn accept(&self, value: Value) -> AcceptResult {
        self.accept_with_id(value_id(&value), value)
    }

    /// Offer a value whose id the caller already computed
    pub fn accept_with_id(&self, id: ValueId, value: Value) -> AcceptResult {
        let mut inner = self.inner.lock();
        if !inner.seen.insert(id) {
            return AcceptResult::AlreadyPresent;
        }
        inner.log.push(value);
        AcceptResult::Added
    }

    /// Copy of all accepted values in acceptance order
    pub fn snapshot(&self) -> Vec<Value> {
        self.inner.lock().log.clone()
    }

    /// Check if a value has been accepted
    pub fn contains(&self, value: &Value) -> bool {
        self.inner.lock().seen.contains(&value_id(value))
    }

    /// Count accepted values
    pub fn len(&self) -> usize {
        self.inner.lock().log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
