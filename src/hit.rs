//! Hit-testing and the spatial selection index.
//!
//! The marquee contract is rectangle-overlap against element bounding
//! boxes. The scan is linear; at whiteboard scale that is plenty, and the
//! contract is narrow enough that an R-tree or quadtree could replace it
//! without touching callers.

#[cfg(test)]
#[path = "hit_test.rs"]
mod hit_test;

use std::collections::HashSet;

use crate::consts::{HANDLE_RADIUS, STROKE_HIT_RADIUS};
use crate::element::{CanvasElement, ElementId, Payload};
use crate::geom::{Point, Rect, point_segment_distance};
use crate::input::SelectMode;
use crate::store::ElementStore;

/// Anchor position for the eight resize handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeAnchor {
    N,
    Ne,
    E,
    Se,
    S,
    Sw,
    W,
    Nw,
}

impl ResizeAnchor {
    /// Position of this handle on a bounding box.
    #[must_use]
    pub fn position_on(self, bounds: &Rect) -> Point {
        let cx = bounds.x + bounds.width / 2.0;
        let cy = bounds.y + bounds.height / 2.0;
        match self {
            Self::N => Point::new(cx, bounds.y),
            Self::Ne => Point::new(bounds.right(), bounds.y),
            Self::E => Point::new(bounds.right(), cy),
            Self::Se => Point::new(bounds.right(), bounds.bottom()),
            Self::S => Point::new(cx, bounds.bottom()),
            Self::Sw => Point::new(bounds.x, bounds.bottom()),
            Self::W => Point::new(bounds.x, cy),
            Self::Nw => Point::new(bounds.x, bounds.y),
        }
    }

    const ALL: [ResizeAnchor; 8] = [
        Self::N,
        Self::Ne,
        Self::E,
        Self::Se,
        Self::S,
        Self::Sw,
        Self::W,
        Self::Nw,
    ];
}

/// Every element whose bounding box intersects `rect`, in draw order.
#[must_use]
pub fn query(store: &ElementStore, rect: Rect) -> Vec<ElementId> {
    store
        .sorted_elements()
        .into_iter()
        .filter(|e| e.bounds().intersects(&rect))
        .map(|e| e.id)
        .collect()
}

/// The topmost element under `point`, if any.
///
/// Strokes hit within [`STROKE_HIT_RADIUS`] of their polyline; all other
/// variants hit anywhere inside their bounding box.
#[must_use]
pub fn hit_test(store: &ElementStore, point: Point) -> Option<ElementId> {
    store
        .sorted_elements()
        .into_iter()
        .rev()
        .find(|e| hits_element(e, point, STROKE_HIT_RADIUS))
        .map(|e| e.id)
}

/// The topmost stroke whose polyline passes within `radius` of `point`.
/// Non-stroke elements are invisible to this query; it drives the eraser.
#[must_use]
pub fn hit_stroke(store: &ElementStore, point: Point, radius: f64) -> Option<ElementId> {
    store
        .sorted_elements()
        .into_iter()
        .rev()
        .filter(|e| matches!(e.payload, Payload::Stroke { .. }))
        .find(|e| stroke_hit(e, point, radius))
        .map(|e| e.id)
}

/// The resize handle of `bounds` under `point`, if any.
#[must_use]
pub fn handle_at(bounds: &Rect, point: Point) -> Option<ResizeAnchor> {
    ResizeAnchor::ALL
        .into_iter()
        .find(|anchor| anchor.position_on(bounds).distance_to(point) <= HANDLE_RADIUS)
}

/// The box proposed by dragging `anchor` to `pointer`, with the opposite
/// edges held fixed. The proposal is raw: callers enforce minimum sizes
/// by falling back to the last valid box.
#[must_use]
pub fn resize_box(start: &Rect, anchor: ResizeAnchor, pointer: Point) -> Rect {
    let (mut left, mut right) = (start.x, start.right());
    let (mut top, mut bottom) = (start.y, start.bottom());

    match anchor {
        ResizeAnchor::Nw | ResizeAnchor::W | ResizeAnchor::Sw => left = pointer.x,
        ResizeAnchor::Ne | ResizeAnchor::E | ResizeAnchor::Se => right = pointer.x,
        ResizeAnchor::N | ResizeAnchor::S => {}
    }
    match anchor {
        ResizeAnchor::Nw | ResizeAnchor::N | ResizeAnchor::Ne => top = pointer.y,
        ResizeAnchor::Sw | ResizeAnchor::S | ResizeAnchor::Se => bottom = pointer.y,
        ResizeAnchor::W | ResizeAnchor::E => {}
    }

    Rect::from_points(Point::new(left, top), Point::new(right, bottom))
}

/// Combine marquee hits with the existing selection per the mode.
#[must_use]
pub fn apply_selection(
    current: &HashSet<ElementId>,
    hits: &[ElementId],
    mode: SelectMode,
) -> HashSet<ElementId> {
    match mode {
        SelectMode::New => hits.iter().copied().collect(),
        SelectMode::Add => {
            let mut next = current.clone();
            next.extend(hits.iter().copied());
            next
        }
        SelectMode::Remove => {
            let mut next = current.clone();
            for id in hits {
                next.remove(id);
            }
            next
        }
    }
}

fn hits_element(element: &CanvasElement, point: Point, stroke_radius: f64) -> bool {
    match element.payload {
        Payload::Stroke { .. } => stroke_hit(element, point, stroke_radius),
        _ => element.bounds().contains_point(point),
    }
}

fn stroke_hit(element: &CanvasElement, point: Point, radius: f64) -> bool {
    let points = element.absolute_points();
    match points.len() {
        0 => false,
        1 => point.distance_to(points[0]) <= radius,
        _ => points
            .windows(2)
            .any(|pair| point_segment_distance(point, pair[0], pair[1]) <= radius),
    }
}
