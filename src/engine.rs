//! Sync engine: the composition root tying the store, mutation buffer,
//! interaction pipeline, tool state machine, and presence together.
//!
//! The engine is sans-io. Every entry point takes the host clock as a
//! `now` argument and returns a list of [`Action`]s for the host to
//! execute; the engine never calls outward and never awaits. The host is
//! expected to run three loops over one engine: raw input events
//! (pointer/keyboard), a rendering-clock tick calling
//! [`Engine::on_frame`], and transport callbacks feeding
//! [`Engine::apply_remote`] and friends. All three run on one event loop,
//! which is what serializes the two write paths (local gestures, remote
//! reconciliation) without a lock.

#[cfg(test)]
#[path = "engine_test.rs"]
mod engine_test;

use std::collections::{HashMap, HashSet};

use crate::buffer::{MutationBuffer, Reconciliation};
use crate::consts::{
    DOUBLE_ACTIVATE_MS, ERASER_RADIUS, FLUSH_INTERVAL_MS, MIN_ELEMENT_SIZE, MIN_FRAME_SIZE,
    STICKY_DEFAULT_HEIGHT, STICKY_DEFAULT_WIDTH, TEXT_DEFAULT_HEIGHT, TEXT_DEFAULT_WIDTH,
};
use crate::element::{
    CanvasElement, ElementId, ElementPatch, Payload, StrokeKind, UserId,
};
use crate::geom::{Geometry, Point, Rect, Size};
use crate::hit;
use crate::input::{Button, DragTarget, Gesture, Key, Modifiers, SelectMode, Tool};
use crate::pipeline::{FrameSampler, StrokeBuilder, StrokeExtension, TextDebounce};
use crate::presence::{Cursor, PresenceTracker};
use crate::store::ElementStore;

/// Effects returned from engine entry points for the host to process.
#[derive(Debug, Clone)]
pub enum Action {
    /// Broadcast an element mutation (including tombstones) to all peers.
    Publish(CanvasElement),
    /// Broadcast the local cursor on the presence channel.
    PublishPresence(Cursor),
    /// Broadcast an in-progress stroke extension for live preview.
    PublishStroke(StrokeExtension),
    /// The host should open its text editor for this element.
    EditTextRequested { id: ElementId },
    /// The selection set changed.
    SelectionChanged,
    /// Visible state changed; the host should redraw.
    RenderNeeded,
}

/// A peer's in-progress stroke, rendered as live preview only.
#[derive(Debug, Clone)]
pub struct PreviewStroke {
    pub user_id: UserId,
    pub stroke_id: ElementId,
    pub stroke: StrokeKind,
    pub color: String,
    /// Absolute canvas coordinates, in arrival order.
    pub points: Vec<Point>,
}

/// The element synchronization engine for one connected user.
pub struct Engine {
    store: ElementStore,
    buffer: MutationBuffer,
    presence: PresenceTracker,
    sampler: FrameSampler,
    debounce: TextDebounce,
    tool: Tool,
    gesture: Gesture,
    selection: HashSet<ElementId>,
    user_id: UserId,
    /// Pointer-down time of the last click that landed on empty canvas.
    last_background_down_ms: Option<i64>,
    /// Peer strokes in progress, keyed by provisional stroke id.
    previews: HashMap<ElementId, PreviewStroke>,
    last_flush_ms: i64,
}

impl Engine {
    /// Create an engine for `user_id`, picking a presence color.
    #[must_use]
    pub fn new(user_id: UserId, display_name: &str) -> Self {
        Self::with_color(user_id, display_name, None)
    }

    /// Create an engine with an explicit presence color.
    #[must_use]
    pub fn with_color(user_id: UserId, display_name: &str, color: Option<String>) -> Self {
        Self {
            store: ElementStore::new(),
            buffer: MutationBuffer::new(),
            presence: PresenceTracker::new(user_id, display_name.to_owned(), color),
            sampler: FrameSampler::new(),
            debounce: TextDebounce::new(),
            tool: Tool::default(),
            gesture: Gesture::Idle,
            selection: HashSet::new(),
            user_id,
            last_background_down_ms: None,
            previews: HashMap::new(),
            last_flush_ms: 0,
        }
    }

    // --- Queries ---

    /// The authoritative element set, for the host's renderer.
    #[must_use]
    pub fn store(&self) -> &ElementStore {
        &self.store
    }

    /// Currently selected element ids.
    #[must_use]
    pub fn selection(&self) -> &HashSet<ElementId> {
        &self.selection
    }

    /// The active tool.
    #[must_use]
    pub fn tool(&self) -> Tool {
        self.tool
    }

    /// The gesture in progress, if any.
    #[must_use]
    pub fn gesture(&self) -> &Gesture {
        &self.gesture
    }

    /// The local user id.
    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// The local cursor as last recorded.
    #[must_use]
    pub fn local_cursor(&self) -> &Cursor {
        self.presence.local()
    }

    /// Known peer cursors.
    pub fn peer_cursors(&self) -> impl Iterator<Item = &Cursor> {
        self.presence.peers()
    }

    /// Peer strokes in progress, for live preview rendering.
    pub fn preview_strokes(&self) -> impl Iterator<Item = &PreviewStroke> {
        self.previews.values()
    }

    /// The marquee rectangle while a marquee gesture is active.
    #[must_use]
    pub fn marquee_box(&self) -> Option<Rect> {
        match &self.gesture {
            Gesture::Marquee { anchor, current, .. } => Some(Rect::from_points(*anchor, *current)),
            _ => None,
        }
    }

    /// The provisional frame rectangle while a frame drag-to-size is
    /// active. Nothing exists in the store until the gesture commits.
    #[must_use]
    pub fn pending_frame_box(&self) -> Option<Rect> {
        match &self.gesture {
            Gesture::SizingFrame { anchor, current } => Some(Rect::from_points(*anchor, *current)),
            _ => None,
        }
    }

    // --- Lifecycle ---

    /// Seed the element set from the external store's snapshot.
    pub fn load_snapshot(&mut self, elements: Vec<CanvasElement>) -> Vec<Action> {
        self.store.load_snapshot(elements);
        self.selection.retain(|id| self.store.get(id).is_some());
        vec![Action::RenderNeeded]
    }

    /// Switch the active tool. An in-progress gesture is canceled first;
    /// switching tools mid-gesture must not commit a partial element.
    pub fn set_tool(&mut self, tool: Tool, now: i64) -> Vec<Action> {
        let mut actions = Vec::new();
        if self.gesture.is_active() {
            self.cancel_gesture(now, &mut actions);
        }
        self.tool = tool;
        actions.push(Action::RenderNeeded);
        actions
    }

    /// Host-driven creation for variants without a dedicated tool —
    /// images dropped onto the canvas, shapes placed from a palette. The
    /// element is staged, selected, and published like any tool-created
    /// element.
    pub fn insert_element(
        &mut self,
        now: i64,
        geometry: Geometry,
        payload: Payload,
        props: serde_json::Value,
    ) -> Vec<Action> {
        let mut actions = Vec::new();
        if !geometry.is_finite() {
            tracing::warn!("rejecting element insertion with non-finite geometry");
            return actions;
        }
        self.create_and_commit(geometry, payload, props, now, &mut actions);
        actions
    }

    /// Re-pend elements whose publish failed, so the next flush retries.
    /// The freshest held state is re-staged, not the failed snapshot.
    pub fn republish(&mut self, failed: Vec<CanvasElement>) {
        for element in failed {
            let current = self
                .store
                .get(&element.id)
                .or_else(|| self.store.tombstone(&element.id));
            if let Some(current) = current {
                self.buffer.stage(current.clone());
            }
        }
    }

    // --- Pointer input ---

    /// Handle pointer-down. Only the primary button starts gestures.
    pub fn pointer_down(
        &mut self,
        now: i64,
        world: Point,
        button: Button,
        modifiers: Modifiers,
    ) -> Vec<Action> {
        let mut actions = Vec::new();
        self.presence.record_position(world, now);
        if button != Button::Primary {
            return actions;
        }

        match self.tool {
            Tool::Select => self.select_down(now, world, modifiers, &mut actions),
            Tool::Pen | Tool::Highlighter => {
                if let Some(kind) = self.tool.stroke_kind() {
                    self.begin_stroke(kind, world, now, &mut actions);
                }
            }
            Tool::Eraser => {
                self.gesture = Gesture::Erasing;
                self.erase_at(world, now, &mut actions);
            }
            Tool::Sticky => {
                let geometry = Geometry::new(
                    world,
                    Size::new(STICKY_DEFAULT_WIDTH, STICKY_DEFAULT_HEIGHT),
                );
                let payload = Payload::Sticky { text: String::new() };
                self.create_and_commit(geometry, payload, serde_json::json!({}), now, &mut actions);
            }
            Tool::Text => {
                let geometry =
                    Geometry::new(world, Size::new(TEXT_DEFAULT_WIDTH, TEXT_DEFAULT_HEIGHT));
                let payload = Payload::Text {
                    content: String::new(),
                    bold: false,
                    italic: false,
                };
                self.create_and_commit(geometry, payload, serde_json::json!({}), now, &mut actions);
            }
            Tool::Frame => {
                self.gesture = Gesture::SizingFrame { anchor: world, current: world };
                actions.push(Action::RenderNeeded);
            }
        }
        actions
    }

    /// Handle pointer motion. Continuous geometry changes are recorded for
    /// the frame sampler rather than staged here.
    pub fn pointer_move(&mut self, now: i64, world: Point, _modifiers: Modifiers) -> Vec<Action> {
        let mut actions = Vec::new();
        self.presence.record_position(world, now);

        if matches!(self.gesture, Gesture::Erasing) {
            self.erase_at(world, now, &mut actions);
            return actions;
        }

        match &mut self.gesture {
            Gesture::Idle | Gesture::Erasing => {}
            Gesture::DraggingSelection { targets, start_world, last_world, moved } => {
                *last_world = world;
                *moved = true;
                let dx = world.x - start_world.x;
                let dy = world.y - start_world.y;
                let updates = targets
                    .iter()
                    .map(|t| {
                        (
                            t.id,
                            ElementPatch::move_to(t.start_origin.x + dx, t.start_origin.y + dy),
                        )
                    })
                    .collect();
                self.sampler.record(updates);
                actions.push(Action::RenderNeeded);
            }
            Gesture::Marquee { current, .. } => {
                *current = world;
                actions.push(Action::RenderNeeded);
            }
            Gesture::Drawing { builder } => {
                if builder.append(world) {
                    actions.push(Action::PublishStroke(StrokeExtension {
                        user_id: self.user_id,
                        stroke_id: builder.id(),
                        stroke: builder.kind(),
                        point: world,
                        color: self.presence.local().color.clone(),
                    }));
                    actions.push(Action::RenderNeeded);
                }
            }
            Gesture::SizingFrame { current, .. } => {
                *current = world;
                actions.push(Action::RenderNeeded);
            }
            Gesture::Resizing { id, anchor, start_box, last_valid } => {
                let proposed = hit::resize_box(start_box, *anchor, world);
                let min = self
                    .store
                    .get(id)
                    .map_or(MIN_ELEMENT_SIZE, |e| min_size_for(&e.payload));
                if proposed.width >= min && proposed.height >= min {
                    *last_valid = proposed;
                }
                let update = vec![(*id, ElementPatch::resize_to(*last_valid))];
                self.sampler.record(update);
                actions.push(Action::RenderNeeded);
            }
        }
        actions
    }

    /// Handle pointer-up: commit the gesture with its precise end state
    /// and flush immediately rather than waiting for the periodic cycle.
    pub fn pointer_up(
        &mut self,
        now: i64,
        world: Point,
        button: Button,
        _modifiers: Modifiers,
    ) -> Vec<Action> {
        let mut actions = Vec::new();
        if button != Button::Primary {
            return actions;
        }
        self.presence.record_position(world, now);

        match std::mem::take(&mut self.gesture) {
            Gesture::Idle => {}
            Gesture::DraggingSelection { targets, start_world, moved, .. } => {
                self.sampler.cancel();
                if moved {
                    let dx = world.x - start_world.x;
                    let dy = world.y - start_world.y;
                    for target in &targets {
                        let origin = target.start_origin.translated(dx, dy);
                        let mut patch = ElementPatch::move_to(origin.x, origin.y);
                        patch.frame_id = self.frame_assignment(target.id, origin);
                        self.stage_patch(target.id, &patch, now);
                    }
                    self.flush_now(now, &mut actions);
                    actions.push(Action::RenderNeeded);
                }
            }
            Gesture::Marquee { anchor, current, mode } => {
                let hits = hit::query(&self.store, Rect::from_points(anchor, current));
                self.selection = hit::apply_selection(&self.selection, &hits, mode);
                self.presence.set_activity(false, false, false, now);
                actions.push(Action::SelectionChanged);
                actions.push(Action::RenderNeeded);
            }
            Gesture::Drawing { builder } => {
                self.presence.set_activity(false, false, false, now);
                let id = builder.id();
                let kind = builder.kind();
                if let Some((geometry, points)) = builder.finish() {
                    let element = self.store.create_with_id(
                        id,
                        self.user_id,
                        geometry,
                        Payload::Stroke { stroke: kind, points },
                        serde_json::json!({ "stroke": self.presence.local().color.clone() }),
                        now,
                    );
                    self.buffer.stage(element);
                    self.flush_now(now, &mut actions);
                    actions.push(Action::RenderNeeded);
                }
            }
            Gesture::Erasing => {}
            Gesture::SizingFrame { anchor, current } => {
                let dragged = Rect::from_points(anchor, current);
                let rect = Rect::new(
                    dragged.x,
                    dragged.y,
                    dragged.width.max(MIN_FRAME_SIZE),
                    dragged.height.max(MIN_FRAME_SIZE),
                );
                let geometry = Geometry::new(
                    Point::new(rect.x, rect.y),
                    Size::new(rect.width, rect.height),
                );
                self.create_and_commit(
                    geometry,
                    Payload::Frame { title: String::new() },
                    serde_json::json!({}),
                    now,
                    &mut actions,
                );
            }
            Gesture::Resizing { id, anchor, start_box, last_valid } => {
                self.sampler.cancel();
                // The precise end geometry overrides any sampled rounding,
                // still subject to the minimum-size clamp.
                let proposed = hit::resize_box(&start_box, anchor, world);
                let min = self
                    .store
                    .get(&id)
                    .map_or(MIN_ELEMENT_SIZE, |e| min_size_for(&e.payload));
                let final_box = if proposed.width >= min && proposed.height >= min {
                    proposed
                } else {
                    last_valid
                };
                self.stage_patch(id, &ElementPatch::resize_to(final_box), now);
                self.flush_now(now, &mut actions);
                actions.push(Action::RenderNeeded);
            }
        }
        actions
    }

    // --- Keyboard input ---

    /// Handle a key press: Escape cancels the active gesture (or clears
    /// the selection), Delete/Backspace removes the selection.
    pub fn key_down(&mut self, now: i64, key: &Key, _modifiers: Modifiers) -> Vec<Action> {
        let mut actions = Vec::new();
        match key.0.as_str() {
            "Escape" => {
                if self.gesture.is_active() {
                    self.cancel_gesture(now, &mut actions);
                } else if !self.selection.is_empty() {
                    self.selection.clear();
                    actions.push(Action::SelectionChanged);
                    actions.push(Action::RenderNeeded);
                }
            }
            "Delete" | "Backspace" => {
                if !self.selection.is_empty() {
                    let targets: Vec<ElementId> = self.selection.iter().copied().collect();
                    for id in targets {
                        self.delete_element(id, now);
                    }
                    self.selection.clear();
                    self.flush_now(now, &mut actions);
                    actions.push(Action::SelectionChanged);
                    actions.push(Action::RenderNeeded);
                }
            }
            _ => {}
        }
        actions
    }

    // --- Text editing ---

    /// Record a keystroke's resulting content for a sticky note or text
    /// element. Staging is debounced; a displaced edit for a different
    /// element stages immediately so nothing is lost.
    pub fn text_input(&mut self, now: i64, id: ElementId, content: String) -> Vec<Action> {
        if self.store.get(&id).is_none() {
            tracing::warn!(%id, "text input for unknown element");
            return Vec::new();
        }
        self.presence.set_activity(false, true, false, now);
        if let Some(displaced) = self.debounce.record(id, content, now) {
            let patch = ElementPatch { content: Some(displaced.content), ..ElementPatch::default() };
            self.stage_patch(displaced.id, &patch, now);
        }
        Vec::new()
    }

    /// Apply a discrete formatting or style change immediately, without
    /// debounce.
    pub fn set_formatting(&mut self, now: i64, id: ElementId, patch: &ElementPatch) -> Vec<Action> {
        let mut actions = Vec::new();
        if self.stage_patch(id, patch, now) {
            actions.push(Action::RenderNeeded);
        }
        actions
    }

    // --- Frame tick ---

    /// The rendering-clock callback. Drives drag/resize sampling, debounce
    /// expiry, presence emission, peer timeout inference, and the periodic
    /// flush of staged mutations.
    pub fn on_frame(&mut self, now: i64) -> Vec<Action> {
        let mut actions = Vec::new();

        if let Some(updates) = self.sampler.take_due(now) {
            let mut staged_any = false;
            for (id, patch) in updates {
                staged_any |= self.stage_patch(id, &patch, now);
            }
            if staged_any {
                actions.push(Action::RenderNeeded);
            }
        }

        if let Some(edit) = self.debounce.take_due(now) {
            let patch = ElementPatch { content: Some(edit.content), ..ElementPatch::default() };
            self.stage_patch(edit.id, &patch, now);
            self.presence.set_activity(false, false, false, now);
            actions.push(Action::RenderNeeded);
        }

        if let Some(cursor) = self.presence.take_due() {
            actions.push(Action::PublishPresence(cursor));
        }

        let expired = self.presence.sweep(now);
        if !expired.is_empty() {
            self.previews.retain(|_, preview| !expired.contains(&preview.user_id));
            actions.push(Action::RenderNeeded);
        }

        if now - self.last_flush_ms >= FLUSH_INTERVAL_MS && !self.buffer.is_empty() {
            self.flush_now(now, &mut actions);
        }

        actions
    }

    // --- Network in ---

    /// Reconcile one remote element update. Stale and losing updates are
    /// discarded internally; nothing here is an error.
    pub fn apply_remote(&mut self, remote: CanvasElement) -> Vec<Action> {
        let mut actions = Vec::new();
        if !remote.geometry.is_finite() {
            tracing::warn!(id = %remote.id, "discarding remote element with non-finite geometry");
            return actions;
        }
        let id = remote.id;
        match self.buffer.reconcile(&mut self.store, remote) {
            Reconciliation::Adopted => {
                // A committed stroke replaces its live preview.
                self.previews.remove(&id);
                if self.store.is_deleted(&id) {
                    self.debounce.cancel_for(&id);
                    if self.selection.remove(&id) {
                        actions.push(Action::SelectionChanged);
                    }
                }
                actions.push(Action::RenderNeeded);
            }
            Reconciliation::Discarded | Reconciliation::KeptLocal => {}
        }
        actions
    }

    /// Fold a peer's stroke extension into its live preview.
    pub fn apply_stroke_extension(&mut self, ext: StrokeExtension) -> Vec<Action> {
        if ext.user_id == self.user_id {
            return Vec::new();
        }
        // Extensions arriving after the stroke committed (or died) are
        // duplicates from the at-least-once channel.
        if self.store.get(&ext.stroke_id).is_some() || self.store.is_deleted(&ext.stroke_id) {
            return Vec::new();
        }
        let preview = self
            .previews
            .entry(ext.stroke_id)
            .or_insert_with(|| PreviewStroke {
                user_id: ext.user_id,
                stroke_id: ext.stroke_id,
                stroke: ext.stroke,
                color: ext.color.clone(),
                points: Vec::new(),
            });
        preview.points.push(ext.point);
        vec![Action::RenderNeeded]
    }

    /// Update a peer's cursor. A peer that stopped drawing has abandoned
    /// or committed any stroke preview it had.
    pub fn apply_presence(&mut self, cursor: Cursor) -> Vec<Action> {
        if cursor.user_id == self.user_id {
            return Vec::new();
        }
        if !cursor.is_drawing {
            let user = cursor.user_id;
            let store = &self.store;
            self.previews
                .retain(|id, preview| preview.user_id != user || store.get(id).is_some());
        }
        self.presence.apply_remote(cursor);
        vec![Action::RenderNeeded]
    }

    // --- Internal: select tool ---

    fn select_down(&mut self, now: i64, world: Point, modifiers: Modifiers, actions: &mut Vec<Action>) {
        // Resize handles of a single-element selection take priority over
        // the element body.
        if self.selection.len() == 1 {
            let selected = self.selection.iter().next().copied();
            if let Some(id) = selected {
                if let Some(element) = self.store.get(&id) {
                    if !matches!(element.payload, Payload::Stroke { .. }) {
                        let bounds = element.bounds();
                        if let Some(anchor) = hit::handle_at(&bounds, world) {
                            self.gesture = Gesture::Resizing {
                                id,
                                anchor,
                                start_box: bounds,
                                last_valid: bounds,
                            };
                            actions.push(Action::RenderNeeded);
                            return;
                        }
                    }
                }
            }
        }

        match hit::hit_test(&self.store, world) {
            Some(id) => {
                self.last_background_down_ms = None;

                // Clicking a pen-drawn stroke outside pen mode switches to
                // the pen, a designed convenience transition.
                let is_pen_stroke = self
                    .store
                    .get(&id)
                    .is_some_and(|e| e.payload.is_pen_stroke());
                if is_pen_stroke {
                    self.tool = Tool::Pen;
                    self.selection.clear();
                    self.selection.insert(id);
                    actions.push(Action::SelectionChanged);
                    actions.push(Action::RenderNeeded);
                    return;
                }

                match SelectMode::from_modifiers(modifiers) {
                    SelectMode::Remove => {
                        if self.selection.remove(&id) {
                            actions.push(Action::SelectionChanged);
                            actions.push(Action::RenderNeeded);
                        }
                        return;
                    }
                    SelectMode::Add => {
                        if self.selection.insert(id) {
                            actions.push(Action::SelectionChanged);
                        }
                    }
                    SelectMode::New => {
                        if !self.selection.contains(&id) {
                            self.selection.clear();
                            self.selection.insert(id);
                            actions.push(Action::SelectionChanged);
                        }
                    }
                }

                let targets: Vec<DragTarget> = self
                    .selection
                    .iter()
                    .filter_map(|sel| {
                        self.store
                            .get(sel)
                            .map(|e| DragTarget { id: *sel, start_origin: e.geometry.origin })
                    })
                    .collect();
                self.gesture = Gesture::DraggingSelection {
                    targets,
                    start_world: world,
                    last_world: world,
                    moved: false,
                };
                actions.push(Action::RenderNeeded);
            }
            None => {
                // Double-activation on the background selects all.
                let double = self
                    .last_background_down_ms
                    .is_some_and(|last| now - last <= DOUBLE_ACTIVATE_MS);
                if double {
                    self.last_background_down_ms = None;
                    self.selection = self.store.iter().map(|e| e.id).collect();
                    actions.push(Action::SelectionChanged);
                    actions.push(Action::RenderNeeded);
                    return;
                }
                self.last_background_down_ms = Some(now);
                self.gesture = Gesture::Marquee {
                    anchor: world,
                    current: world,
                    mode: SelectMode::from_modifiers(modifiers),
                };
                self.presence.set_activity(false, false, true, now);
                actions.push(Action::RenderNeeded);
            }
        }
    }

    // --- Internal: drawing and erasing ---

    fn begin_stroke(&mut self, kind: StrokeKind, world: Point, now: i64, actions: &mut Vec<Action>) {
        let builder = StrokeBuilder::new(kind, world);
        actions.push(Action::PublishStroke(StrokeExtension {
            user_id: self.user_id,
            stroke_id: builder.id(),
            stroke: kind,
            point: world,
            color: self.presence.local().color.clone(),
        }));
        self.gesture = Gesture::Drawing { builder };
        self.presence.set_activity(true, false, false, now);
        actions.push(Action::RenderNeeded);
    }

    fn erase_at(&mut self, world: Point, now: i64, actions: &mut Vec<Action>) {
        if let Some(id) = hit::hit_stroke(&self.store, world, ERASER_RADIUS) {
            self.delete_element(id, now);
            if self.selection.remove(&id) {
                actions.push(Action::SelectionChanged);
            }
            self.flush_now(now, actions);
            actions.push(Action::RenderNeeded);
        }
    }

    // --- Internal: creation ---

    /// Commit a freshly created element: stage it, select it, and flush
    /// immediately. Text-bearing variants also ask the host for an editor.
    fn create_and_commit(
        &mut self,
        geometry: Geometry,
        payload: Payload,
        props: serde_json::Value,
        now: i64,
        actions: &mut Vec<Action>,
    ) {
        let editable = matches!(payload, Payload::Sticky { .. } | Payload::Text { .. });
        let element = self.store.create(self.user_id, geometry, payload, props, now);
        let id = element.id;
        self.buffer.stage(element);
        self.selection.clear();
        self.selection.insert(id);
        self.flush_now(now, actions);
        if editable {
            actions.push(Action::EditTextRequested { id });
        }
        actions.push(Action::SelectionChanged);
        actions.push(Action::RenderNeeded);
    }

    // --- Internal: staging plumbing ---

    /// Apply a patch locally and mark the result pending. Malformed
    /// patches are rejected before staging and never broadcast.
    fn stage_patch(&mut self, id: ElementId, patch: &ElementPatch, now: i64) -> bool {
        match self.store.apply_local(id, patch, now, self.user_id) {
            Ok(next) => {
                self.buffer.stage(next);
                true
            }
            Err(err) => {
                tracing::warn!(%id, error = %err, "rejected local mutation");
                false
            }
        }
    }

    fn delete_element(&mut self, id: ElementId, now: i64) {
        match self.store.delete(id, now, self.user_id) {
            Ok(tombstone) => {
                self.debounce.cancel_for(&id);
                self.buffer.stage(tombstone);
            }
            Err(err) => {
                tracing::warn!(%id, error = %err, "rejected delete");
            }
        }
    }

    fn flush_now(&mut self, now: i64, actions: &mut Vec<Action>) {
        for element in self.buffer.flush() {
            actions.push(Action::Publish(element));
        }
        self.last_flush_ms = now;
    }

    /// The frame, if any, that should own an element dropped with its
    /// origin at `origin`. Returns a patch value only when membership
    /// actually changes; frames themselves never nest.
    fn frame_assignment(&self, id: ElementId, origin: Point) -> Option<Option<ElementId>> {
        let element = self.store.get(&id)?;
        if matches!(element.payload, Payload::Frame { .. }) {
            return None;
        }
        let dropped = Rect::new(
            origin.x,
            origin.y,
            element.geometry.size.width,
            element.geometry.size.height,
        );
        let target = self
            .store
            .sorted_elements()
            .into_iter()
            .rev()
            .filter(|e| matches!(e.payload, Payload::Frame { .. }) && e.id != id)
            .find(|frame| frame.bounds().contains_rect(&dropped))
            .map(|frame| frame.id);
        if target == element.frame_id {
            None
        } else {
            Some(target)
        }
    }

    // --- Internal: cancellation ---

    /// Cancel the active gesture without committing a partial element.
    /// Geometry already staged by sampled ticks is reverted.
    fn cancel_gesture(&mut self, now: i64, actions: &mut Vec<Action>) {
        self.sampler.cancel();
        match std::mem::take(&mut self.gesture) {
            Gesture::Idle => {}
            Gesture::DraggingSelection { targets, .. } => {
                let mut reverted = false;
                for target in &targets {
                    let drifted = self
                        .store
                        .get(&target.id)
                        .is_some_and(|e| e.geometry.origin != target.start_origin);
                    if drifted {
                        let patch =
                            ElementPatch::move_to(target.start_origin.x, target.start_origin.y);
                        reverted |= self.stage_patch(target.id, &patch, now);
                    }
                }
                if reverted {
                    self.flush_now(now, actions);
                }
                actions.push(Action::RenderNeeded);
            }
            Gesture::Marquee { .. } => {
                self.presence.set_activity(false, false, false, now);
                actions.push(Action::RenderNeeded);
            }
            Gesture::Drawing { .. } => {
                // Nothing was committed; peers drop the preview when the
                // next presence update shows drawing stopped.
                self.presence.set_activity(false, false, false, now);
                actions.push(Action::RenderNeeded);
            }
            Gesture::Erasing => {}
            Gesture::SizingFrame { .. } => {
                actions.push(Action::RenderNeeded);
            }
            Gesture::Resizing { id, start_box, .. } => {
                let drifted = self
                    .store
                    .get(&id)
                    .is_some_and(|e| e.bounds() != start_box);
                if drifted {
                    self.stage_patch(id, &ElementPatch::resize_to(start_box), now);
                    self.flush_now(now, actions);
                }
                actions.push(Action::RenderNeeded);
            }
        }
    }
}

/// Minimum width/height for a variant during resize.
fn min_size_for(payload: &Payload) -> f64 {
    match payload {
        Payload::Frame { .. } => MIN_FRAME_SIZE,
        _ => MIN_ELEMENT_SIZE,
    }
}
