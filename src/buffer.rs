//! Local mutation buffer: in-flight optimistic edits and their
//! reconciliation against incoming remote state.
//!
//! Staged elements are already applied to the store for immediate
//! rendering; the buffer holds the pending markers that make them
//! eligible for the next flush. Flushing clears markers once emission is
//! scheduled, not once confirmed — delivery is fire-and-forget
//! at-least-once, and the pending marker is exactly the retry queue: a
//! failed publish re-pends the element for the next cycle.

#[cfg(test)]
#[path = "buffer_test.rs"]
mod buffer_test;

use std::collections::HashMap;

use crate::element::{CanvasElement, ElementId};
use crate::resolve::{self, Winner};
use crate::store::ElementStore;

/// Outcome of reconciling one incoming remote element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// The remote state won and was adopted into the store.
    Adopted,
    /// The remote state was stale or lost resolution; nothing changed.
    Discarded,
    /// A pending local edit won; it stays staged and will be re-emitted,
    /// because the peer may not have seen it.
    KeptLocal,
}

/// Pending-edit tracking for one peer.
pub struct MutationBuffer {
    pending: HashMap<ElementId, CanvasElement>,
}

impl MutationBuffer {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self { pending: HashMap::new() }
    }

    /// Record a locally-applied element as pending emission. The caller has
    /// already swapped the value into the store; the snapshot taken here is
    /// what a later flush will emit.
    pub fn stage(&mut self, element: CanvasElement) {
        self.pending.insert(element.id, element);
    }

    /// Reconcile one incoming remote element against held and pending state.
    ///
    /// Stale versions are discarded silently — an expected steady-state
    /// occurrence under at-least-once delivery, not an error. Version ties
    /// are settled by the resolver so every peer converges on the same
    /// winner regardless of arrival order.
    pub fn reconcile(&mut self, store: &mut ElementStore, remote: CanvasElement) -> Reconciliation {
        let id = remote.id;

        // Deletion is terminal: live state for a tombstoned id is dropped
        // no matter what version it claims.
        if store.is_deleted(&id) && !remote.deleted {
            tracing::debug!(%id, "discarding live update for deleted element");
            return Reconciliation::Discarded;
        }

        let Some(held_version) = store.held_version(&id) else {
            // First sight of this id.
            self.pending.remove(&id);
            store.adopt(remote);
            return Reconciliation::Adopted;
        };

        if remote.version < held_version {
            tracing::debug!(
                %id,
                remote_version = remote.version,
                held_version,
                "discarding stale update"
            );
            return Reconciliation::Discarded;
        }

        if remote.version == held_version {
            let keep_local = {
                let held = store
                    .get(&id)
                    .or_else(|| store.tombstone(&id));
                held.is_none_or(|held| resolve::winner(held, &remote) == Winner::Local)
            };
            if keep_local {
                if self.pending.contains_key(&id) {
                    tracing::debug!(%id, "pending local edit wins tie; will re-emit");
                    return Reconciliation::KeptLocal;
                }
                return Reconciliation::Discarded;
            }
            self.pending.remove(&id);
            store.adopt(remote);
            return Reconciliation::Adopted;
        }

        // Strictly newer remote: the pending local edit, if any, lost.
        if self.pending.remove(&id).is_some() {
            tracing::debug!(%id, "pending local edit superseded by remote");
        }
        store.adopt(remote);
        Reconciliation::Adopted
    }

    /// Drain all pending elements for network emission, clearing their
    /// markers. Emission is scheduled, not confirmed; failures come back
    /// through [`MutationBuffer::stage`].
    pub fn flush(&mut self) -> Vec<CanvasElement> {
        if self.pending.is_empty() {
            return Vec::new();
        }
        let mut batch: Vec<CanvasElement> = self.pending.drain().map(|(_, e)| e).collect();
        // Stable emission order keeps logs and tests deterministic.
        batch.sort_by(|a, b| a.id.cmp(&b.id));
        tracing::debug!(count = batch.len(), "flushing staged mutations");
        batch
    }

    /// Whether an element has a pending, unflushed local edit.
    #[must_use]
    pub fn is_pending(&self, id: &ElementId) -> bool {
        self.pending.contains_key(id)
    }

    /// Number of pending elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns `true` when nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl Default for MutationBuffer {
    fn default() -> Self {
        Self::new()
    }
}
