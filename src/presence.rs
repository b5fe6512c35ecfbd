//! Presence: ephemeral cursor and activity state.
//!
//! Cursor records are broadcast to peers and immediately forgotten —
//! never persisted, never versioned, never run through the conflict
//! resolver. The newest write for a user always wins, and a peer silent
//! past the timeout is inferred to have disconnected; there is no
//! explicit disconnect signal.

#[cfg(test)]
#[path = "presence_test.rs"]
mod presence_test;

use std::collections::HashMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::consts::{CURSOR_TRAIL_LEN, PRESENCE_TIMEOUT_MS};
use crate::element::UserId;
use crate::geom::Point;

/// Display colors assigned to users without an explicit choice.
pub const PRESENCE_PALETTE: [&str; 8] = [
    "#D94B4B", "#3A7BD5", "#2E9E6B", "#F2994A", "#9B51E0", "#16A5A5", "#D35FB7", "#8A8178",
];

/// One user's ephemeral cursor and activity state.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    /// User this cursor belongs to.
    pub user_id: UserId,
    /// Name shown beside the cursor.
    pub display_name: String,
    /// Cursor color as a CSS color string.
    pub color: String,
    /// Current position in canvas coordinates.
    pub position: Point,
    /// The user has an active freehand stroke.
    pub is_drawing: bool,
    /// The user is editing text.
    pub is_typing: bool,
    /// The user is dragging a marquee.
    pub is_selecting: bool,
    /// Recent positions, oldest first, bounded by [`CURSOR_TRAIL_LEN`].
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trail: Vec<Point>,
    /// Milliseconds since the epoch of the last activity.
    pub last_activity: i64,
}

impl Cursor {
    /// A fresh cursor at the origin with no activity.
    #[must_use]
    pub fn new(user_id: UserId, display_name: String, color: String) -> Self {
        Self {
            user_id,
            display_name,
            color,
            position: Point::new(0.0, 0.0),
            is_drawing: false,
            is_typing: false,
            is_selecting: false,
            trail: Vec::new(),
            last_activity: 0,
        }
    }
}

/// Tracks the local cursor and every known peer cursor.
pub struct PresenceTracker {
    local: Cursor,
    peers: HashMap<UserId, Cursor>,
    /// Local state changed since the last emission.
    dirty: bool,
}

impl PresenceTracker {
    /// Create a tracker for the local user, picking a palette color when
    /// none is supplied.
    #[must_use]
    pub fn new(user_id: UserId, display_name: String, color: Option<String>) -> Self {
        let color = color.unwrap_or_else(|| {
            let index = rand::rng().random_range(0..PRESENCE_PALETTE.len());
            PRESENCE_PALETTE[index].to_owned()
        });
        Self {
            local: Cursor::new(user_id, display_name, color),
            peers: HashMap::new(),
            dirty: false,
        }
    }

    /// The local cursor as it would be broadcast.
    #[must_use]
    pub fn local(&self) -> &Cursor {
        &self.local
    }

    /// Record local pointer motion.
    pub fn record_position(&mut self, position: Point, now: i64) {
        self.local.trail.push(self.local.position);
        if self.local.trail.len() > CURSOR_TRAIL_LEN {
            let excess = self.local.trail.len() - CURSOR_TRAIL_LEN;
            self.local.trail.drain(..excess);
        }
        self.local.position = position;
        self.local.last_activity = now;
        self.dirty = true;
    }

    /// Update local activity flags; unchanged flags do not mark dirty.
    pub fn set_activity(&mut self, drawing: bool, typing: bool, selecting: bool, now: i64) {
        if self.local.is_drawing == drawing
            && self.local.is_typing == typing
            && self.local.is_selecting == selecting
        {
            return;
        }
        self.local.is_drawing = drawing;
        self.local.is_typing = typing;
        self.local.is_selecting = selecting;
        self.local.last_activity = now;
        self.dirty = true;
    }

    /// Take the local cursor for emission if anything changed since the
    /// last take. Dropped emissions are acceptable; there is no retry.
    pub fn take_due(&mut self) -> Option<Cursor> {
        if !self.dirty {
            return None;
        }
        self.dirty = false;
        Some(self.local.clone())
    }

    /// Upsert a peer cursor, newest write wins. Our own echoes are
    /// ignored: at-least-once transports may loop broadcasts back.
    pub fn apply_remote(&mut self, cursor: Cursor) {
        if cursor.user_id == self.local.user_id {
            return;
        }
        match self.peers.get(&cursor.user_id) {
            Some(existing) if existing.last_activity > cursor.last_activity => {
                tracing::trace!(user = %cursor.user_id, "ignoring out-of-date cursor");
            }
            _ => {
                self.peers.insert(cursor.user_id, cursor);
            }
        }
    }

    /// Remove peers silent past the timeout, returning who disappeared.
    pub fn sweep(&mut self, now: i64) -> Vec<UserId> {
        let expired: Vec<UserId> = self
            .peers
            .values()
            .filter(|c| now - c.last_activity > PRESENCE_TIMEOUT_MS)
            .map(|c| c.user_id)
            .collect();
        for user in &expired {
            self.peers.remove(user);
            tracing::debug!(%user, "peer presence timed out");
        }
        expired
    }

    /// Known peer cursors in arbitrary order.
    pub fn peers(&self) -> impl Iterator<Item = &Cursor> {
        self.peers.values()
    }

    /// Number of known peers.
    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }
}
