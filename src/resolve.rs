//! Conflict resolver: last-writer-wins over whole elements.
//!
//! Policy is version-then-timestamp-then-owner: the strictly higher
//! `version` wins outright; on tied versions the later `updated_at` wins;
//! on a full timestamp tie the lexicographically larger `owner_id` wins.
//! The owner comparison exists purely so every peer picks the same winner;
//! it carries no fairness meaning.
//!
//! Resolution replaces the whole element. Canvas elements are small,
//! frequently-replaced aggregates, and the common conflict is two users
//! dragging the same note; one intent should simply dominate. Field-level
//! merge would need per-field clocks for no practical gain here.

#[cfg(test)]
#[path = "resolve_test.rs"]
mod resolve_test;

use std::cmp::Ordering;

use crate::element::CanvasElement;

/// Which side of a resolution won.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    Local,
    Remote,
}

/// Decide whether the local or the remote state of one element wins.
///
/// Both arguments must refer to the same `id`. On a full tie the local
/// side is kept; a full tie between honestly produced values implies the
/// values are identical, so the choice is unobservable.
#[must_use]
pub fn winner(local: &CanvasElement, remote: &CanvasElement) -> Winner {
    debug_assert_eq!(local.id, remote.id, "resolver compares states of one element");

    match ordering(local, remote) {
        Ordering::Less => Winner::Remote,
        Ordering::Greater | Ordering::Equal => Winner::Local,
    }
}

/// Resolve two states of one element to the surviving value.
#[must_use]
pub fn resolve<'a>(local: &'a CanvasElement, remote: &'a CanvasElement) -> &'a CanvasElement {
    match winner(local, remote) {
        Winner::Local => local,
        Winner::Remote => remote,
    }
}

fn ordering(a: &CanvasElement, b: &CanvasElement) -> Ordering {
    a.version
        .cmp(&b.version)
        .then_with(|| a.updated_at.cmp(&b.updated_at))
        .then_with(|| a.owner_id.cmp(&b.owner_id))
}
