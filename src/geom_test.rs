#![allow(clippy::float_cmp)]

use super::*;

fn pt(x: f64, y: f64) -> Point {
    Point::new(x, y)
}

// =============================================================
// Point
// =============================================================

#[test]
fn point_distance() {
    assert_eq!(pt(0.0, 0.0).distance_to(pt(3.0, 4.0)), 5.0);
}

#[test]
fn point_distance_to_self_is_zero() {
    assert_eq!(pt(7.0, -2.0).distance_to(pt(7.0, -2.0)), 0.0);
}

#[test]
fn point_translated() {
    let p = pt(1.0, 2.0).translated(10.0, -5.0);
    assert_eq!(p, pt(11.0, -3.0));
}

#[test]
fn point_nan_is_not_finite() {
    assert!(!pt(f64::NAN, 0.0).is_finite());
    assert!(!pt(0.0, f64::INFINITY).is_finite());
    assert!(pt(0.0, 0.0).is_finite());
}

// =============================================================
// Rect
// =============================================================

#[test]
fn rect_from_points_normalizes() {
    let r = Rect::from_points(pt(10.0, 20.0), pt(-5.0, 5.0));
    assert_eq!(r.x, -5.0);
    assert_eq!(r.y, 5.0);
    assert_eq!(r.width, 15.0);
    assert_eq!(r.height, 15.0);
}

#[test]
fn rect_intersects_overlapping() {
    let a = Rect::new(0.0, 0.0, 10.0, 10.0);
    let b = Rect::new(5.0, 5.0, 10.0, 10.0);
    assert!(a.intersects(&b));
    assert!(b.intersects(&a));
}

#[test]
fn rect_intersects_touching_edge() {
    let a = Rect::new(0.0, 0.0, 10.0, 10.0);
    let b = Rect::new(10.0, 0.0, 10.0, 10.0);
    assert!(a.intersects(&b));
}

#[test]
fn rect_disjoint_does_not_intersect() {
    let a = Rect::new(0.0, 0.0, 10.0, 10.0);
    let b = Rect::new(20.0, 20.0, 5.0, 5.0);
    assert!(!a.intersects(&b));
}

#[test]
fn rect_contains_point_inclusive() {
    let r = Rect::new(0.0, 0.0, 10.0, 10.0);
    assert!(r.contains_point(pt(0.0, 0.0)));
    assert!(r.contains_point(pt(10.0, 10.0)));
    assert!(r.contains_point(pt(5.0, 5.0)));
    assert!(!r.contains_point(pt(10.1, 5.0)));
}

#[test]
fn rect_contains_rect() {
    let outer = Rect::new(0.0, 0.0, 100.0, 100.0);
    let inner = Rect::new(10.0, 10.0, 20.0, 20.0);
    let straddling = Rect::new(90.0, 90.0, 20.0, 20.0);
    assert!(outer.contains_rect(&inner));
    assert!(!outer.contains_rect(&straddling));
    assert!(!inner.contains_rect(&outer));
}

#[test]
fn rect_center() {
    let r = Rect::new(0.0, 0.0, 10.0, 20.0);
    assert_eq!(r.center(), pt(5.0, 10.0));
}

// =============================================================
// Geometry
// =============================================================

#[test]
fn geometry_bounds_match_origin_and_size() {
    let g = Geometry::new(pt(3.0, 4.0), Size::new(10.0, 20.0));
    let b = g.bounds();
    assert_eq!(b, Rect::new(3.0, 4.0, 10.0, 20.0));
}

#[test]
fn geometry_translated_moves_origin_only() {
    let g = Geometry::new(pt(0.0, 0.0), Size::new(10.0, 10.0));
    let moved = g.translated(5.0, -2.0);
    assert_eq!(moved.origin, pt(5.0, -2.0));
    assert_eq!(moved.size, g.size);
    assert_eq!(moved.rotation, g.rotation);
}

#[test]
fn geometry_serde_roundtrip() {
    let g = Geometry { origin: pt(1.0, 2.0), size: Size::new(3.0, 4.0), rotation: 45.0 };
    let json = serde_json::to_string(&g).unwrap();
    let back: Geometry = serde_json::from_str(&json).unwrap();
    assert_eq!(back, g);
}

// =============================================================
// Segment distance
// =============================================================

#[test]
fn segment_distance_perpendicular() {
    let d = point_segment_distance(pt(5.0, 5.0), pt(0.0, 0.0), pt(10.0, 0.0));
    assert_eq!(d, 5.0);
}

#[test]
fn segment_distance_clamps_to_endpoints() {
    let d = point_segment_distance(pt(-3.0, 4.0), pt(0.0, 0.0), pt(10.0, 0.0));
    assert_eq!(d, 5.0);
}

#[test]
fn segment_distance_degenerate_segment() {
    let d = point_segment_distance(pt(3.0, 4.0), pt(0.0, 0.0), pt(0.0, 0.0));
    assert_eq!(d, 5.0);
}
