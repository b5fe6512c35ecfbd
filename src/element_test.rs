#![allow(clippy::float_cmp)]

use serde_json::json;
use uuid::Uuid;

use super::*;
use crate::geom::Size;

fn editor() -> UserId {
    Uuid::from_u128(0xED17)
}

fn sticky() -> CanvasElement {
    CanvasElement {
        id: Uuid::new_v4(),
        owner_id: Uuid::new_v4(),
        version: 1,
        updated_at: 100,
        z_index: 0,
        frame_id: None,
        deleted: false,
        geometry: Geometry::new(Point::new(10.0, 20.0), Size::new(160.0, 120.0)),
        payload: Payload::Sticky { text: "hello".to_owned() },
        props: json!({}),
    }
}

fn stroke(points: Vec<Point>) -> CanvasElement {
    CanvasElement {
        id: Uuid::new_v4(),
        owner_id: Uuid::new_v4(),
        version: 1,
        updated_at: 100,
        z_index: 0,
        frame_id: None,
        deleted: false,
        geometry: Geometry::new(Point::new(5.0, 5.0), Size::new(10.0, 10.0)),
        payload: Payload::Stroke { stroke: StrokeKind::Pen, points },
        props: json!({}),
    }
}

// =============================================================
// Serde
// =============================================================

#[test]
fn payload_tag_is_lowercase_kind() {
    let el = sticky();
    let value = serde_json::to_value(&el).unwrap();
    assert_eq!(value.get("kind").unwrap(), "sticky");
    assert_eq!(value.get("text").unwrap(), "hello");
}

#[test]
fn element_serde_roundtrip() {
    let el = CanvasElement {
        frame_id: Some(Uuid::nil()),
        props: json!({"fill": "#FF0000"}),
        ..sticky()
    };
    let json = serde_json::to_string(&el).unwrap();
    let back: CanvasElement = serde_json::from_str(&json).unwrap();
    assert_eq!(back, el);
}

#[test]
fn stroke_serde_roundtrip() {
    let el = stroke(vec![Point::new(0.0, 0.0), Point::new(3.0, 4.0)]);
    let json = serde_json::to_string(&el).unwrap();
    let back: CanvasElement = serde_json::from_str(&json).unwrap();
    assert_eq!(back, el);
}

#[test]
fn unrecognized_variant_tag_fails_loudly() {
    let raw = json!({
        "id": Uuid::nil(),
        "owner_id": Uuid::nil(),
        "version": 1,
        "updated_at": 0,
        "z_index": 0,
        "geometry": {"origin": {"x": 0.0, "y": 0.0}, "size": {"width": 1.0, "height": 1.0}, "rotation": 0.0},
        "kind": "hologram",
    });
    let result = serde_json::from_value::<CanvasElement>(raw);
    assert!(result.is_err());
}

#[test]
fn deleted_defaults_to_false_on_deserialize() {
    let mut value = serde_json::to_value(sticky()).unwrap();
    value.as_object_mut().unwrap().remove("deleted");
    let back: CanvasElement = serde_json::from_value(value).unwrap();
    assert!(!back.deleted);
}

// =============================================================
// Patching
// =============================================================

#[test]
fn with_patch_increments_version_and_stamps_time() {
    let el = sticky();
    let next = el.with_patch(&ElementPatch::move_to(50.0, 60.0), 999, editor()).unwrap();
    assert_eq!(next.version, 2);
    assert_eq!(next.updated_at, 999);
    assert_eq!(next.geometry.origin, Point::new(50.0, 60.0));
    // Source value is untouched.
    assert_eq!(el.version, 1);
    assert_eq!(el.geometry.origin, Point::new(10.0, 20.0));
}

#[test]
fn with_patch_applies_only_present_fields() {
    let el = sticky();
    let patch = ElementPatch { width: Some(300.0), ..ElementPatch::default() };
    let next = el.with_patch(&patch, 200, editor()).unwrap();
    assert_eq!(next.geometry.size.width, 300.0);
    assert_eq!(next.geometry.size.height, 120.0);
    assert_eq!(next.geometry.origin, el.geometry.origin);
}

#[test]
fn with_patch_sets_and_clears_frame_membership() {
    let el = sticky();
    let frame = Uuid::new_v4();

    let assigned = el
        .with_patch(&ElementPatch { frame_id: Some(Some(frame)), ..ElementPatch::default() }, 1, editor())
        .unwrap();
    assert_eq!(assigned.frame_id, Some(frame));

    let detached = assigned
        .with_patch(&ElementPatch { frame_id: Some(None), ..ElementPatch::default() }, 2, editor())
        .unwrap();
    assert_eq!(detached.frame_id, None);
}

#[test]
fn with_patch_updates_sticky_text() {
    let el = sticky();
    let patch = ElementPatch { content: Some("revised".to_owned()), ..ElementPatch::default() };
    let next = el.with_patch(&patch, 1, editor()).unwrap();
    assert_eq!(next.payload, Payload::Sticky { text: "revised".to_owned() });
}

#[test]
fn with_patch_formatting_applies_to_text_only() {
    let text = CanvasElement {
        payload: Payload::Text { content: "t".to_owned(), bold: false, italic: false },
        ..sticky()
    };
    let patch = ElementPatch { bold: Some(true), ..ElementPatch::default() };
    let next = text.with_patch(&patch, 1, editor()).unwrap();
    assert!(matches!(next.payload, Payload::Text { bold: true, .. }));

    let result = sticky().with_patch(&patch, 1, editor());
    assert!(matches!(result, Err(MutationError::FieldMismatch { field: "bold", .. })));
}

#[test]
fn with_patch_title_on_non_frame_is_rejected() {
    let patch = ElementPatch { title: Some("x".to_owned()), ..ElementPatch::default() };
    let result = sticky().with_patch(&patch, 1, editor());
    assert!(matches!(result, Err(MutationError::FieldMismatch { field: "title", .. })));
}

#[test]
fn with_patch_points_on_non_stroke_is_rejected() {
    let patch = ElementPatch { points: Some(vec![Point::new(0.0, 0.0)]), ..ElementPatch::default() };
    let result = sticky().with_patch(&patch, 1, editor());
    assert!(matches!(result, Err(MutationError::FieldMismatch { field: "points", .. })));
}

#[test]
fn with_patch_merges_props_and_null_removes() {
    let el = CanvasElement { props: json!({"fill": "#111111", "stroke": "#222222"}), ..sticky() };
    let patch = ElementPatch {
        props: Some(json!({"fill": "#333333", "stroke": null})),
        ..ElementPatch::default()
    };
    let next = el.with_patch(&patch, 1, editor()).unwrap();
    assert_eq!(next.props, json!({"fill": "#333333"}));
}

// =============================================================
// Validation
// =============================================================

#[test]
fn validate_rejects_non_finite_position() {
    let patch = ElementPatch { x: Some(f64::NAN), ..ElementPatch::default() };
    assert!(matches!(patch.validate(), Err(MutationError::NonFinite { field: "x" })));
}

#[test]
fn validate_rejects_non_positive_size() {
    let patch = ElementPatch { height: Some(0.0), ..ElementPatch::default() };
    assert!(matches!(patch.validate(), Err(MutationError::NonPositiveSize { field: "height" })));

    let patch = ElementPatch { width: Some(-4.0), ..ElementPatch::default() };
    assert!(matches!(patch.validate(), Err(MutationError::NonPositiveSize { field: "width" })));
}

#[test]
fn validate_rejects_non_finite_stroke_points() {
    let patch = ElementPatch {
        points: Some(vec![Point::new(0.0, f64::NAN)]),
        ..ElementPatch::default()
    };
    assert!(matches!(patch.validate(), Err(MutationError::NonFinite { field: "points" })));
}

#[test]
fn validate_accepts_empty_patch() {
    assert!(ElementPatch::default().validate().is_ok());
}

// =============================================================
// Geometry helpers
// =============================================================

#[test]
fn absolute_points_offset_by_origin() {
    let el = stroke(vec![Point::new(0.0, 0.0), Point::new(2.0, 3.0)]);
    let abs = el.absolute_points();
    assert_eq!(abs, vec![Point::new(5.0, 5.0), Point::new(7.0, 8.0)]);
}

#[test]
fn absolute_points_empty_for_non_stroke() {
    assert!(sticky().absolute_points().is_empty());
}

// =============================================================
// Props
// =============================================================

#[test]
fn props_defaults_when_absent() {
    let bag = json!({});
    let props = Props::new(&bag);
    assert_eq!(props.fill(), "#F2C94C");
    assert_eq!(props.stroke(), "#1F1A17");
    assert_eq!(props.stroke_width(), 2.0);
}

#[test]
fn props_reads_present_values() {
    let bag = json!({"fill": "#ABCDEF", "stroke_width": 5.5});
    let props = Props::new(&bag);
    assert_eq!(props.fill(), "#ABCDEF");
    assert_eq!(props.stroke_width(), 5.5);
}
