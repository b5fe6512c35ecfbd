//! Element store: the flat arena of live elements, the tombstone set, and
//! the derived frame-membership index.
//!
//! The store is the single authoritative mapping from `id` to element on
//! this peer. The mutation buffer is the only writer during an active local
//! gesture and the reconciliation path is the only writer when applying a
//! remote update; both run on the same event loop, so no locking exists
//! here. "Frame contains children" is an index derived from the children's
//! `frame_id` pointers, never an embedded reference.

#[cfg(test)]
#[path = "store_test.rs"]
mod store_test;

use std::collections::{BTreeSet, HashMap};

use uuid::Uuid;

use crate::element::{CanvasElement, ElementId, ElementPatch, MutationError, Payload, UserId};
use crate::geom::Geometry;

/// In-memory store of canvas elements.
pub struct ElementStore {
    live: HashMap<ElementId, CanvasElement>,
    /// Terminal records for deleted ids. An id present here never
    /// re-enters `live`, regardless of what arrives over the transport.
    tombstones: HashMap<ElementId, CanvasElement>,
    frame_children: HashMap<ElementId, BTreeSet<ElementId>>,
}

impl ElementStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            live: HashMap::new(),
            tombstones: HashMap::new(),
            frame_children: HashMap::new(),
        }
    }

    /// Create a new element owned by `owner`, with a fresh id, `version 1`,
    /// and the next-on-top stacking position.
    pub fn create(
        &mut self,
        owner: UserId,
        geometry: Geometry,
        payload: Payload,
        props: serde_json::Value,
        now: i64,
    ) -> CanvasElement {
        self.create_with_id(Uuid::new_v4(), owner, geometry, payload, props, now)
    }

    /// Create a new element under a caller-chosen id. Used when the id was
    /// already announced (a committed stroke reuses its provisional id so
    /// peers can replace the live preview).
    pub fn create_with_id(
        &mut self,
        id: ElementId,
        owner: UserId,
        geometry: Geometry,
        payload: Payload,
        props: serde_json::Value,
        now: i64,
    ) -> CanvasElement {
        let element = CanvasElement {
            id,
            owner_id: owner,
            version: 1,
            updated_at: now,
            z_index: self.next_z_index(),
            frame_id: None,
            deleted: false,
            geometry,
            payload,
            props,
        };
        self.live.insert(element.id, element.clone());
        element
    }

    /// Apply a local patch, producing the element with `version + 1`,
    /// `updated_at = now`, and `owner_id = editor`, and swapping it into
    /// the arena.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError::UnknownElement`] / [`MutationError::Deleted`]
    /// for missing targets and propagates patch validation failures.
    pub fn apply_local(
        &mut self,
        id: ElementId,
        patch: &ElementPatch,
        now: i64,
        editor: UserId,
    ) -> Result<CanvasElement, MutationError> {
        if self.tombstones.contains_key(&id) {
            return Err(MutationError::Deleted(id));
        }
        let current = self.live.get(&id).ok_or(MutationError::UnknownElement(id))?;
        let previous_frame = current.frame_id;
        let next = current.with_patch(patch, now, editor)?;
        self.index_frame_membership(previous_frame, next.frame_id, id);
        self.live.insert(id, next.clone());
        Ok(next)
    }

    /// Delete an element, producing its tombstone mutation for broadcast.
    ///
    /// The tombstone carries `version + 1` and the deletion flag so remote
    /// peers can distinguish "never existed" from "deleted". Children of a
    /// deleted frame are detached locally; every peer derives the same
    /// detachment from the same tombstone, so no extra mutation is emitted.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError::UnknownElement`] if `id` is not live and
    /// [`MutationError::Deleted`] if it was already removed.
    pub fn delete(
        &mut self,
        id: ElementId,
        now: i64,
        editor: UserId,
    ) -> Result<CanvasElement, MutationError> {
        if self.tombstones.contains_key(&id) {
            return Err(MutationError::Deleted(id));
        }
        let Some(mut element) = self.live.remove(&id) else {
            return Err(MutationError::UnknownElement(id));
        };
        self.index_frame_membership(element.frame_id, None, id);
        self.detach_children_of(id);
        element.deleted = true;
        element.version += 1;
        element.updated_at = now;
        element.owner_id = editor;
        self.tombstones.insert(id, element.clone());
        Ok(element)
    }

    /// Insert or replace an element exactly as received, bypassing version
    /// computation. This is the adoption path used after conflict
    /// resolution; it still refuses to resurrect a tombstoned id.
    pub fn adopt(&mut self, element: CanvasElement) {
        let id = element.id;
        if element.deleted {
            if let Some(previous) = self.live.remove(&id) {
                self.index_frame_membership(previous.frame_id, None, id);
            }
            self.detach_children_of(id);
            self.tombstones.insert(id, element);
            return;
        }
        if self.tombstones.contains_key(&id) {
            tracing::debug!(%id, "ignoring live state for tombstoned element");
            return;
        }
        let previous_frame = self.live.get(&id).and_then(|e| e.frame_id);
        self.index_frame_membership(previous_frame, element.frame_id, id);
        self.live.insert(id, element);
    }

    /// Seed the live set from an external snapshot.
    ///
    /// Existing live elements are replaced. Tombstones survive a reload:
    /// snapshot entries for an id deleted locally are skipped, and snapshot
    /// entries that are themselves tombstones are recorded as such.
    pub fn load_snapshot(&mut self, elements: Vec<CanvasElement>) {
        self.live.clear();
        self.frame_children.clear();
        for element in elements {
            if self.tombstones.contains_key(&element.id) {
                continue;
            }
            self.adopt(element);
        }
    }

    /// Return a live element by id.
    #[must_use]
    pub fn get(&self, id: &ElementId) -> Option<&CanvasElement> {
        self.live.get(id)
    }

    /// Whether `id` has been deleted.
    #[must_use]
    pub fn is_deleted(&self, id: &ElementId) -> bool {
        self.tombstones.contains_key(id)
    }

    /// The tombstone record for a deleted id, if any.
    #[must_use]
    pub fn tombstone(&self, id: &ElementId) -> Option<&CanvasElement> {
        self.tombstones.get(id)
    }

    /// The version held for `id`, live or tombstoned.
    #[must_use]
    pub fn held_version(&self, id: &ElementId) -> Option<u64> {
        self.live
            .get(id)
            .or_else(|| self.tombstones.get(id))
            .map(|e| e.version)
    }

    /// Iterate over live elements in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = &CanvasElement> {
        self.live.values()
    }

    /// All live elements sorted by `(z_index, id)` for draw order.
    #[must_use]
    pub fn sorted_elements(&self) -> Vec<&CanvasElement> {
        let mut elements: Vec<&CanvasElement> = self.live.values().collect();
        elements.sort_by(|a, b| a.z_index.cmp(&b.z_index).then_with(|| a.id.cmp(&b.id)));
        elements
    }

    /// Children of a frame, in id order.
    #[must_use]
    pub fn children_of(&self, frame_id: &ElementId) -> Vec<ElementId> {
        self.frame_children
            .get(frame_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of live elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// Returns `true` if no live elements exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    fn next_z_index(&self) -> i64 {
        self.live
            .values()
            .map(|e| e.z_index)
            .max()
            .map_or(0, |z| z + 1)
    }

    fn index_frame_membership(
        &mut self,
        previous: Option<ElementId>,
        next: Option<ElementId>,
        child: ElementId,
    ) {
        if previous == next {
            return;
        }
        if let Some(frame) = previous {
            if let Some(children) = self.frame_children.get_mut(&frame) {
                children.remove(&child);
                if children.is_empty() {
                    self.frame_children.remove(&frame);
                }
            }
        }
        if let Some(frame) = next {
            self.frame_children.entry(frame).or_default().insert(child);
        }
    }

    /// Clear `frame_id` on live children of a deleted frame. Derived state
    /// only: versions are untouched, and every peer applies the same rule
    /// when it adopts the frame's tombstone.
    fn detach_children_of(&mut self, frame_id: ElementId) {
        let Some(children) = self.frame_children.remove(&frame_id) else {
            return;
        };
        for child in children {
            if let Some(element) = self.live.get_mut(&child) {
                element.frame_id = None;
            }
        }
    }
}

impl Default for ElementStore {
    fn default() -> Self {
        Self::new()
    }
}
