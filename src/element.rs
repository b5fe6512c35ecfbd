//! Element model: canvas element types, sparse patches, and validation.
//!
//! This module defines the synchronized entity types (`CanvasElement` and
//! its per-variant `Payload`), the sparse update type used by local
//! mutations (`ElementPatch`), and a typed accessor for the open-ended
//! `props` JSON bag (`Props`).
//!
//! Every element carries the shared versioning contract: `version` starts
//! at 1 on creation and is incremented by exactly 1 on every accepted
//! mutation, and `updated_at` is stamped by the mutator. Elements travel
//! whole over the transport boundary; patches are a local-only input shape.

#[cfg(test)]
#[path = "element_test.rs"]
mod element_test;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geom::{Geometry, Point, Rect};

/// Unique identifier for a canvas element.
pub type ElementId = Uuid;

/// Identifier for a connected user.
pub type UserId = Uuid;

/// Error for malformed mutations rejected at the API boundary.
///
/// These signal a programming error in the caller, never a runtime
/// condition: stale updates and constraint clamps are handled internally
/// and do not produce errors.
#[derive(Debug, thiserror::Error)]
pub enum MutationError {
    /// The target element does not exist in the live set.
    #[error("unknown element: {0}")]
    UnknownElement(ElementId),
    /// The target element has been deleted; deletion is terminal.
    #[error("element is deleted: {0}")]
    Deleted(ElementId),
    /// A numeric field is NaN or infinite.
    #[error("non-finite value for {field}")]
    NonFinite { field: &'static str },
    /// A size field is zero or negative.
    #[error("non-positive size for {field}")]
    NonPositiveSize { field: &'static str },
    /// A payload field does not apply to the target element's variant.
    #[error("field {field} does not apply to a {variant} element")]
    FieldMismatch { field: &'static str, variant: &'static str },
}

/// How a freehand stroke was drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrokeKind {
    Pen,
    Highlighter,
}

/// Geometric shape of a [`Payload::Shape`] element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    Rect,
    Ellipse,
    Diamond,
    Star,
}

/// Per-variant payload of a canvas element.
///
/// Stroke points are stored relative to the element's geometry origin, so
/// translating a stroke moves only its origin, never the point list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Payload {
    /// Freehand polyline drawn with the pen or highlighter.
    Stroke { stroke: StrokeKind, points: Vec<Point> },
    /// Sticky note with freeform text.
    Sticky { text: String },
    /// Container frame; children reference it via `frame_id`.
    Frame { title: String },
    /// Standalone text with formatting flags.
    Text { content: String, bold: bool, italic: bool },
    /// Filled geometric shape.
    Shape { shape: ShapeKind },
    /// Placed image with its natural dimensions.
    Image { src: String, natural_width: f64, natural_height: f64 },
}

impl Payload {
    /// Variant name for diagnostics and mismatch errors.
    #[must_use]
    pub fn variant_name(&self) -> &'static str {
        match self {
            Self::Stroke { .. } => "stroke",
            Self::Sticky { .. } => "sticky",
            Self::Frame { .. } => "frame",
            Self::Text { .. } => "text",
            Self::Shape { .. } => "shape",
            Self::Image { .. } => "image",
        }
    }

    /// Whether this is a pen-drawn stroke (not a highlighter one).
    #[must_use]
    pub fn is_pen_stroke(&self) -> bool {
        matches!(self, Self::Stroke { stroke: StrokeKind::Pen, .. })
    }
}

/// A canvas element as held in the store and sent over the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasElement {
    /// Unique identifier, immutable for the element's lifetime.
    pub id: ElementId,
    /// User who last wrote this element state: the creator at version 1,
    /// then whoever produced each accepted mutation. Informational, not
    /// access control; doubles as the final conflict tie-break.
    pub owner_id: UserId,
    /// Monotonically increasing edit counter; the primary conflict signal.
    pub version: u64,
    /// Milliseconds since the epoch, stamped by the mutator.
    pub updated_at: i64,
    /// Stacking order; higher values draw on top.
    pub z_index: i64,
    /// Frame this element belongs to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_id: Option<ElementId>,
    /// Tombstone flag. A deleted element never returns to the live set.
    #[serde(default)]
    pub deleted: bool,
    /// Position, size, and rotation.
    pub geometry: Geometry,
    /// Variant-specific payload, tagged by `kind` on the wire.
    #[serde(flatten)]
    pub payload: Payload,
    /// Open-ended style properties (fill, stroke color, stroke width, ...).
    #[serde(default)]
    pub props: serde_json::Value,
}

impl CanvasElement {
    /// Axis-aligned bounding box of the element.
    #[must_use]
    pub fn bounds(&self) -> Rect {
        self.geometry.bounds()
    }

    /// Stroke points in absolute canvas coordinates.
    ///
    /// Empty for non-stroke elements.
    #[must_use]
    pub fn absolute_points(&self) -> Vec<Point> {
        match &self.payload {
            Payload::Stroke { points, .. } => points
                .iter()
                .map(|p| p.translated(self.geometry.origin.x, self.geometry.origin.y))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Compute the element that results from applying `patch`.
    ///
    /// The returned value carries `version + 1`, `updated_at = now`, and
    /// `owner_id = editor`; the receiver never mutates in place. The caller
    /// is responsible for swapping the result into the authoritative set.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError`] when the patch is malformed or names a
    /// payload field that does not apply to this element's variant.
    pub fn with_patch(
        &self,
        patch: &ElementPatch,
        now: i64,
        editor: UserId,
    ) -> Result<CanvasElement, MutationError> {
        patch.validate()?;

        let mut next = self.clone();
        next.version = self.version + 1;
        next.updated_at = now;
        next.owner_id = editor;

        if let Some(x) = patch.x {
            next.geometry.origin.x = x;
        }
        if let Some(y) = patch.y {
            next.geometry.origin.y = y;
        }
        if let Some(w) = patch.width {
            next.geometry.size.width = w;
        }
        if let Some(h) = patch.height {
            next.geometry.size.height = h;
        }
        if let Some(r) = patch.rotation {
            next.geometry.rotation = r;
        }
        if let Some(z) = patch.z_index {
            next.z_index = z;
        }
        if let Some(frame) = patch.frame_id {
            next.frame_id = frame;
        }

        apply_payload_fields(&mut next.payload, patch)?;

        if let Some(ref incoming) = patch.props {
            merge_props(&mut next.props, incoming);
        }

        Ok(next)
    }
}

/// Merge a props object into an existing bag; `null` values remove keys.
fn merge_props(target: &mut serde_json::Value, incoming: &serde_json::Value) {
    let Some(incoming) = incoming.as_object() else {
        return;
    };
    if !target.is_object() {
        *target = serde_json::json!({});
    }
    if let Some(existing) = target.as_object_mut() {
        for (k, v) in incoming {
            if v.is_null() {
                existing.remove(k);
            } else {
                existing.insert(k.clone(), v.clone());
            }
        }
    }
}

fn apply_payload_fields(payload: &mut Payload, patch: &ElementPatch) -> Result<(), MutationError> {
    let variant = payload.variant_name();

    if let Some(ref new_points) = patch.points {
        match payload {
            Payload::Stroke { points, .. } => *points = new_points.clone(),
            _ => return Err(MutationError::FieldMismatch { field: "points", variant }),
        }
    }
    if let Some(ref new_content) = patch.content {
        match payload {
            Payload::Sticky { text } => *text = new_content.clone(),
            Payload::Text { content, .. } => *content = new_content.clone(),
            _ => return Err(MutationError::FieldMismatch { field: "content", variant }),
        }
    }
    if let Some(new_bold) = patch.bold {
        match payload {
            Payload::Text { bold, .. } => *bold = new_bold,
            _ => return Err(MutationError::FieldMismatch { field: "bold", variant }),
        }
    }
    if let Some(new_italic) = patch.italic {
        match payload {
            Payload::Text { italic, .. } => *italic = new_italic,
            _ => return Err(MutationError::FieldMismatch { field: "italic", variant }),
        }
    }
    if let Some(ref new_title) = patch.title {
        match payload {
            Payload::Frame { title } => *title = new_title.clone(),
            _ => return Err(MutationError::FieldMismatch { field: "title", variant }),
        }
    }
    Ok(())
}

/// Sparse local update for a canvas element. Only present fields apply.
///
/// `frame_id` distinguishes "leave alone" (`None`) from "assign"
/// (`Some(Some(id))`) and "detach" (`Some(None)`). Patches never cross the
/// transport boundary; peers receive whole-element snapshots.
#[derive(Debug, Clone, Default)]
pub struct ElementPatch {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub rotation: Option<f64>,
    pub z_index: Option<i64>,
    pub frame_id: Option<Option<ElementId>>,
    /// Replacement stroke points, relative to the element origin.
    pub points: Option<Vec<Point>>,
    /// Replacement text for sticky notes and text elements.
    pub content: Option<String>,
    pub bold: Option<bool>,
    pub italic: Option<bool>,
    /// Replacement frame title.
    pub title: Option<String>,
    /// Props keys to merge or remove (null values delete keys).
    pub props: Option<serde_json::Value>,
}

impl ElementPatch {
    /// A patch that moves the element origin.
    #[must_use]
    pub fn move_to(x: f64, y: f64) -> Self {
        Self { x: Some(x), y: Some(y), ..Self::default() }
    }

    /// A patch that sets the full bounding box.
    #[must_use]
    pub fn resize_to(rect: Rect) -> Self {
        Self {
            x: Some(rect.x),
            y: Some(rect.y),
            width: Some(rect.width),
            height: Some(rect.height),
            ..Self::default()
        }
    }

    /// Reject malformed numeric content before it can be staged.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError::NonFinite`] for NaN/infinite fields and
    /// [`MutationError::NonPositiveSize`] for zero or negative sizes.
    pub fn validate(&self) -> Result<(), MutationError> {
        let finite = [
            ("x", self.x),
            ("y", self.y),
            ("width", self.width),
            ("height", self.height),
            ("rotation", self.rotation),
        ];
        for (field, value) in finite {
            if let Some(v) = value {
                if !v.is_finite() {
                    return Err(MutationError::NonFinite { field });
                }
            }
        }
        for (field, value) in [("width", self.width), ("height", self.height)] {
            if let Some(v) = value {
                if v <= 0.0 {
                    return Err(MutationError::NonPositiveSize { field });
                }
            }
        }
        if let Some(ref points) = self.points {
            if points.iter().any(|p| !p.is_finite()) {
                return Err(MutationError::NonFinite { field: "points" });
            }
        }
        Ok(())
    }
}

/// Typed access to common props fields from an element's `props` bag.
pub struct Props<'a> {
    value: &'a serde_json::Value,
}

impl<'a> Props<'a> {
    /// Wrap a reference to a `props` JSON value for typed access.
    #[must_use]
    pub fn new(value: &'a serde_json::Value) -> Self {
        Self { value }
    }

    /// Fill color as a CSS color string. Defaults to `"#F2C94C"` when absent.
    #[must_use]
    pub fn fill(&self) -> &str {
        self.value
            .get("fill")
            .and_then(|v| v.as_str())
            .unwrap_or("#F2C94C")
    }

    /// Stroke color as a CSS color string. Defaults to `"#1F1A17"` when absent.
    #[must_use]
    pub fn stroke(&self) -> &str {
        self.value
            .get("stroke")
            .and_then(|v| v.as_str())
            .unwrap_or("#1F1A17")
    }

    /// Stroke width in canvas units. Defaults to `2.0` when absent.
    #[must_use]
    pub fn stroke_width(&self) -> f64 {
        self.value
            .get("stroke_width")
            .and_then(serde_json::Value::as_f64)
            .unwrap_or(2.0)
    }
}
