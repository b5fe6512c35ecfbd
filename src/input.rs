//! Input model: tools, modifier keys, and the gesture state machine.
//!
//! `Tool` and `Modifiers` capture the user's intent at the time of a
//! pointer event. `Gesture` is the active gesture being tracked between
//! pointer-down and pointer-up; each variant carries the full context
//! needed to compute deltas, emit the final authoritative mutation on
//! release, and revert cleanly on cancellation. Nothing about a gesture
//! is captured implicitly.

#[cfg(test)]
#[path = "input_test.rs"]
mod input_test;

use crate::element::ElementId;
use crate::geom::{Point, Rect};
use crate::hit::ResizeAnchor;
use crate::pipeline::StrokeBuilder;

/// Which tool is currently active. Exactly one tool is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tool {
    /// Pointer / selection tool (default).
    #[default]
    Select,
    /// Freehand pen stroke.
    Pen,
    /// Freehand highlighter stroke.
    Highlighter,
    /// Delete strokes under the pointer.
    Eraser,
    /// Create a sticky note.
    Sticky,
    /// Create a container frame (drag-to-size before commit).
    Frame,
    /// Create a text element.
    Text,
}

impl Tool {
    /// The stroke kind this tool draws, if it is a drawing tool.
    #[must_use]
    pub fn stroke_kind(self) -> Option<crate::element::StrokeKind> {
        match self {
            Self::Pen => Some(crate::element::StrokeKind::Pen),
            Self::Highlighter => Some(crate::element::StrokeKind::Highlighter),
            _ => None,
        }
    }
}

/// Keyboard/mouse modifier keys held during an event.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, Default)]
pub struct Modifiers {
    /// Shift key is held.
    pub shift: bool,
    /// Ctrl key is held.
    pub ctrl: bool,
    /// Alt / Option key is held.
    pub alt: bool,
    /// Meta / Command key is held.
    pub meta: bool,
}

/// Mouse button identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    /// Left mouse button (or single-finger tap).
    Primary,
    /// Middle mouse button.
    Middle,
    /// Right mouse button.
    Secondary,
}

/// A keyboard key, by the name the host reports (e.g. `"Escape"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key(pub String);

impl Key {
    #[must_use]
    pub fn named(name: &str) -> Self {
        Self(name.to_owned())
    }
}

/// How a marquee result combines with the existing selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectMode {
    /// Replace the selection.
    New,
    /// Union with the selection (Shift).
    Add,
    /// Subtract from the selection (Alt).
    Remove,
}

impl SelectMode {
    /// Derive the mode from the modifiers held at pointer-down.
    #[must_use]
    pub fn from_modifiers(modifiers: Modifiers) -> Self {
        if modifiers.alt {
            Self::Remove
        } else if modifiers.shift {
            Self::Add
        } else {
            Self::New
        }
    }
}

/// One element being moved by an active drag.
#[derive(Debug, Clone, Copy)]
pub struct DragTarget {
    /// Id of the dragged element.
    pub id: ElementId,
    /// Element origin at the start of the drag, used to compute absolute
    /// positions and to revert on cancel.
    pub start_origin: Point,
}

/// The gesture in progress between pointer-down and pointer-up.
#[derive(Debug)]
pub enum Gesture {
    /// No gesture; waiting for the next pointer-down.
    Idle,
    /// Moving every member of the current selection rigidly.
    DraggingSelection {
        /// All moved elements with their start origins.
        targets: Vec<DragTarget>,
        /// World position of the initiating pointer-down.
        start_world: Point,
        /// World position of the most recent pointer event.
        last_world: Point,
        /// Whether the pointer traveled at all; a false value means the
        /// gesture was a click, not a drag.
        moved: bool,
    },
    /// Rubber-band selection from an empty-canvas pointer-down.
    Marquee {
        /// Fixed corner where the drag started.
        anchor: Point,
        /// Opposite corner tracking the pointer.
        current: Point,
        /// Combination mode captured from modifiers at pointer-down.
        mode: SelectMode,
    },
    /// An in-progress freehand stroke.
    Drawing {
        /// Accumulates points until pointer-up commits the stroke.
        builder: StrokeBuilder,
    },
    /// Eraser drag; strokes under the pointer are deleted as it moves.
    Erasing,
    /// Frame creation drag-to-size. Nothing is committed until release.
    SizingFrame {
        /// Fixed corner where the drag started.
        anchor: Point,
        /// Opposite corner tracking the pointer.
        current: Point,
    },
    /// Resizing one element by a handle.
    Resizing {
        /// Id of the element being resized.
        id: ElementId,
        /// Which handle is being dragged.
        anchor: ResizeAnchor,
        /// Bounding box at the start of the resize, for reverting.
        start_box: Rect,
        /// Most recent box that satisfied the minimum-size constraint.
        /// Proposals below the minimum clamp back to this.
        last_valid: Rect,
    },
}

impl Default for Gesture {
    fn default() -> Self {
        Self::Idle
    }
}

impl Gesture {
    /// Whether any gesture is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Idle)
    }
}
