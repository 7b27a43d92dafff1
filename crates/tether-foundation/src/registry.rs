//! Worker registry: which peers serve which models.
//!
//! Workers register themselves at startup (and may re-register at any
//! time); dispatch selects from the registry continuously. Both operations
//! are individually atomic behind one lock, and the lock is never held
//! across I/O.
//!
//! Selection is deliberately simple and deterministic: first registered
//! worker with an exact model match, else the first-ever-registered worker.
//! It is not load-aware and callers must not assume balancing.
//!
//! Records are never expired. A worker that crashes without deregistering
//! stays selectable; the per-peer circuit breaker limits the damage but the
//! record remains until restart (known gap, see DESIGN.md).

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::error::{DispatchError, DispatchResult};
use crate::peer::PeerId;

/// One registered worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub peer: PeerId,
    pub model: String,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub capabilities: BTreeSet<String>,
    /// Optional HTTP address announced by the worker, used by the
    /// address-based fallback transport.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_addr: Option<String>,
}

#[derive(Default)]
struct RegistryInner {
    workers: HashMap<PeerId, WorkerRecord>,
    /// First-registration order; re-registration keeps the original slot.
    order: Vec<PeerId>,
}

/// Concurrent-safe store of worker identities and the models they serve.
#[derive(Default)]
pub struct WorkerRegistry {
    inner: RwLock<RegistryInner>,
}

impl WorkerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or update a worker. Idempotent upsert keyed by identity:
    /// re-registering the same peer with a different model overwrites the
    /// record in place.
    pub fn register(&self, record: WorkerRecord) -> DispatchResult<()> {
        if record.model.trim().is_empty() {
            return Err(DispatchError::InvalidRegistration(
                "model must be non-empty".to_string(),
            ));
        }

        let mut inner = self.inner.write();
        if !inner.workers.contains_key(&record.peer) {
            inner.order.push(record.peer);
        }
        tracing::info!(
            peer = %record.peer.short(),
            model = %record.model,
            "worker registered"
        );
        inner.workers.insert(record.peer, record);
        Ok(())
    }

    /// Select a worker for dispatch.
    ///
    /// With a model preference: the first registered worker whose model
    /// exactly equals it, scanning in insertion order; when none matches
    /// (or no preference is given), the first-ever-registered worker.
    /// `None` only when the registry is empty.
    pub fn select(&self, model: Option<&str>) -> Option<WorkerRecord> {
        let inner = self.inner.read();
        if let Some(wanted) = model {
            for peer in &inner.order {
                if let Some(record) = inner.workers.get(peer) {
                    if record.model == wanted {
                        return Some(record.clone());
                    }
                }
            }
        }
        inner
            .order
            .first()
            .and_then(|peer| inner.workers.get(peer))
            .cloned()
    }

    /// Snapshot of all registered workers, in insertion order.
    pub fn list(&self) -> Vec<WorkerRecord> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|peer| inner.workers.get(peer))
            .cloned()
            .collect()
    }

    /// Number of registered workers.
    pub fn len(&self) -> usize {
        self.inner.read().workers.len()
    }

    /// Whether the registry has no workers.
    pub fn is_empty(&self) -> bool {
        self.inner.read().workers.is_empty()
    }
}
