//! Interaction pipeline: frame-aligned sampling, edit debouncing, and
//! incremental stroke building.
//!
//! Continuous pointer motion must not translate into a mutation per
//! event — that would flood the transport and thrash the mutation
//! buffer. Three cadence mechanisms exist, chosen per interaction kind:
//!
//! - [`FrameSampler`]: drag/resize geometry is recorded eagerly but only
//!   staged on the host's frame tick, with a hard floor between accepted
//!   samples. The gesture-ending event stages the precise final geometry
//!   directly, bypassing the sampler.
//! - [`TextDebounce`]: keystroke bursts collapse into one staged
//!   mutation after a quiet period. Discrete formatting toggles skip
//!   this path entirely.
//! - [`StrokeBuilder`]: freehand points accumulate locally with a
//!   minimum-travel gate; peers see lightweight [`StrokeExtension`]
//!   broadcasts for live preview, and the stroke is versioned once on
//!   completion.
//!
//! All timing flows through `now` arguments supplied by the host clock;
//! the pipeline owns no timers, which is what makes it deterministic
//! under test.

#[cfg(test)]
#[path = "pipeline_test.rs"]
mod pipeline_test;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::consts::{MIN_SAMPLE_INTERVAL_MS, MIN_STROKE_TRAVEL, TEXT_DEBOUNCE_MS};
use crate::element::{ElementId, ElementPatch, StrokeKind, UserId};
use crate::geom::{Geometry, Point, Rect, Size};

/// Lightweight broadcast for one appended point of an in-progress stroke.
///
/// Extensions are preview-only: peers render them live but never fold
/// them into version history. The completed stroke arrives later as an
/// ordinary element with `version = 1` under the same id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrokeExtension {
    /// User drawing the stroke.
    pub user_id: UserId,
    /// Provisional id; the committed element reuses it.
    pub stroke_id: ElementId,
    /// Pen or highlighter.
    pub stroke: StrokeKind,
    /// The appended point, in absolute canvas coordinates.
    pub point: Point,
    /// Preview color.
    pub color: String,
}

// ── Frame sampler ───────────────────────────────────────────────

/// Frame-aligned sampling of continuous geometry changes.
///
/// Pointer moves overwrite the latest proposal; the host's frame tick
/// accepts at most one sample per [`MIN_SAMPLE_INTERVAL_MS`]. During a
/// drag lasting T milliseconds the number of staged mutations is bounded
/// by roughly T/16 regardless of pointer-event frequency.
#[derive(Debug, Default)]
pub struct FrameSampler {
    latest: Option<Vec<(ElementId, ElementPatch)>>,
    last_sample_ms: Option<i64>,
}

impl FrameSampler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the most recent geometry proposal, replacing any unsampled
    /// predecessor. Intermediate proposals between ticks are dropped by
    /// design; only the newest matters.
    pub fn record(&mut self, updates: Vec<(ElementId, ElementPatch)>) {
        self.latest = Some(updates);
    }

    /// Take the pending proposal if the sampling floor has elapsed.
    pub fn take_due(&mut self, now: i64) -> Option<Vec<(ElementId, ElementPatch)>> {
        if self.latest.is_none() {
            return None;
        }
        if let Some(last) = self.last_sample_ms {
            if now - last < MIN_SAMPLE_INTERVAL_MS {
                return None;
            }
        }
        self.last_sample_ms = Some(now);
        tracing::trace!(at = now, "accepting drag sample");
        self.latest.take()
    }

    /// Drop any unsampled proposal and reset the floor. Called when a
    /// gesture ends (the final stage is authoritative and bypasses the
    /// sampler) or is canceled.
    pub fn cancel(&mut self) {
        self.latest = None;
        self.last_sample_ms = None;
    }

    /// Whether an unsampled proposal is waiting for the next tick.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.latest.is_some()
    }
}

// ── Text debounce ───────────────────────────────────────────────

/// A text edit waiting out its debounce window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEdit {
    pub id: ElementId,
    pub content: String,
}

/// Debounced staging for text content edits.
///
/// Every keystroke resets the timer; the edit stages only after
/// [`TEXT_DEBOUNCE_MS`] of inactivity. One element is tracked at a time:
/// switching to a different element displaces the previous edit, which
/// the caller must stage immediately so nothing is lost.
#[derive(Debug, Default)]
pub struct TextDebounce {
    pending: Option<PendingEdit>,
    deadline_ms: i64,
}

impl TextDebounce {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a keystroke's resulting content and reset the timer.
    ///
    /// Returns the displaced edit when the keystroke targets a different
    /// element than the one currently pending.
    pub fn record(&mut self, id: ElementId, content: String, now: i64) -> Option<PendingEdit> {
        let displaced = if self.pending.as_ref().is_some_and(|edit| edit.id != id) {
            self.pending.take()
        } else {
            None
        };
        self.pending = Some(PendingEdit { id, content });
        self.deadline_ms = now + TEXT_DEBOUNCE_MS;
        displaced
    }

    /// Take the pending edit if its quiet period has elapsed.
    pub fn take_due(&mut self, now: i64) -> Option<PendingEdit> {
        if self.pending.is_some() && now >= self.deadline_ms {
            return self.pending.take();
        }
        None
    }

    /// Take the pending edit immediately, regardless of the deadline.
    pub fn take_now(&mut self) -> Option<PendingEdit> {
        self.pending.take()
    }

    /// Drop a pending edit for a specific element (e.g. it was deleted).
    pub fn cancel_for(&mut self, id: &ElementId) {
        if self.pending.as_ref().is_some_and(|edit| edit.id == *id) {
            self.pending = None;
        }
    }

    /// Whether an edit is waiting out its window.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

// ── Stroke builder ──────────────────────────────────────────────

/// Accumulates an in-progress freehand stroke.
///
/// Points are held in absolute canvas coordinates while drawing; on
/// completion they are rebased onto the stroke's bounding-box origin so
/// that later translation moves only the origin.
#[derive(Debug)]
pub struct StrokeBuilder {
    id: ElementId,
    kind: StrokeKind,
    points: Vec<Point>,
}

impl StrokeBuilder {
    /// Start a stroke at the pointer-down position.
    #[must_use]
    pub fn new(kind: StrokeKind, start: Point) -> Self {
        Self { id: Uuid::new_v4(), kind, points: vec![start] }
    }

    /// Append a point if it traveled at least [`MIN_STROKE_TRAVEL`] from
    /// the previous one. Returns whether the point was accepted; jittery
    /// sub-threshold motion is dropped to avoid degenerate segments.
    pub fn append(&mut self, point: Point) -> bool {
        let Some(last) = self.points.last() else {
            self.points.push(point);
            return true;
        };
        if last.distance_to(point) < MIN_STROKE_TRAVEL {
            return false;
        }
        self.points.push(point);
        true
    }

    /// Provisional id, reused by the committed element.
    #[must_use]
    pub fn id(&self) -> ElementId {
        self.id
    }

    #[must_use]
    pub fn kind(&self) -> StrokeKind {
        self.kind
    }

    /// Points accepted so far, in absolute coordinates.
    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Finish the stroke, producing its placement and origin-relative
    /// points. Returns `None` for degenerate strokes (fewer than two
    /// accepted points), which are discarded rather than committed.
    #[must_use]
    pub fn finish(self) -> Option<(Geometry, Vec<Point>)> {
        if self.points.len() < 2 {
            return None;
        }
        let bounds = point_bounds(&self.points);
        let origin = Point::new(bounds.x, bounds.y);
        let relative = self
            .points
            .iter()
            .map(|p| Point::new(p.x - origin.x, p.y - origin.y))
            .collect();
        let geometry = Geometry::new(origin, Size::new(bounds.width, bounds.height));
        Some((geometry, relative))
    }
}

/// Axis-aligned bounding box of a non-empty point list.
fn point_bounds(points: &[Point]) -> Rect {
    let mut min_x = f64::INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    Rect::new(min_x, min_y, max_x - min_x, max_y - min_y)
}
