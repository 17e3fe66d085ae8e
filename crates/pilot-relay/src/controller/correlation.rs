//! Pending request table keyed by correlation id.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use parking_lot::Mutex;
use pilot_core::{RelayError, RequestId, ResponseEnvelope};
use tokio::sync::oneshot;

/// Maps request ids to the one-shot sender of the waiting caller.
///
/// Each entry is removed by exactly one of [`resolve`](Self::resolve) or
/// [`remove`](Self::remove), so a request settles once.
#[derive(Debug, Default)]
pub struct CorrelationTable {
    pending: Mutex<HashMap<RequestId, oneshot::Sender<ResponseEnvelope>>>,
}

impl CorrelationTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pending request and return the receiver its response will
    /// arrive on.
    pub fn register(
        &self,
        id: RequestId,
    ) -> Result<oneshot::Receiver<ResponseEnvelope>, RelayError> {
        match self.pending.lock().entry(id) {
            Entry::Occupied(entry) => Err(RelayError::DuplicateRequestId(entry.key().clone())),
            Entry::Vacant(entry) => {
                let (tx, rx) = oneshot::channel();
                let _ = entry.insert(tx);
                Ok(rx)
            }
        }
    }

    /// Hand a response to its waiter. Returns `false` when no request with
    /// that id is pending.
    pub fn resolve(&self, response: ResponseEnvelope) -> bool {
        let Some(tx) = self.pending.lock().remove(&response.id) else {
            return false;
        };
        tx.send(response).is_ok()
    }

    /// Drop a pending request. Returns `false` if it already settled.
    pub fn remove(&self, id: &RequestId) -> bool {
        self.pending.lock().remove(id).is_some()
    }

    /// Whether `id` is pending.
    pub fn contains(&self, id: &RequestId) -> bool {
        self.pending.lock().contains_key(id)
    }

    /// Number of pending requests.
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Drop every pending request; their waiters observe a closed channel.
    pub fn clear(&self) -> usize {
        let mut pending = self.pending.lock();
        let n = pending.len();
        pending.clear();
        n
    }
}
