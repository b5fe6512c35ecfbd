//! Two-peer convergence over the in-memory hub.
//!
//! Each test runs two full engines wired through `LocalHub`, drives them
//! with pointer/keyboard events and frame ticks, and asserts that both
//! peers converge to identical authoritative element sets once all
//! updates have been exchanged — regardless of delivery order or
//! duplication.

use boardsync::element::CanvasElement;
use boardsync::engine::{Action, Engine};
use boardsync::geom::Point;
use boardsync::input::{Button, Key, Modifiers, Tool};
use boardsync::transport::{dispatch, HubPeer, LocalHub, Transport, TransportError};
use uuid::Uuid;

fn pt(x: f64, y: f64) -> Point {
    Point::new(x, y)
}

fn none() -> Modifiers {
    Modifiers::default()
}

struct Peer {
    engine: Engine,
    handle: HubPeer,
}

impl Peer {
    fn new(hub: &LocalHub, seed: u128, name: &str) -> Self {
        Self {
            engine: Engine::with_color(Uuid::from_u128(seed), name, Some("#112233".to_owned())),
            handle: hub.register(),
        }
    }

    /// Send a batch of actions out through this peer's hub handle.
    fn send(&mut self, actions: &[Action]) {
        let failed = dispatch(actions, &mut self.handle);
        assert!(failed.is_empty(), "hub publishes never fail");
    }

    /// Deliver everything queued for this peer into its engine.
    fn receive(&mut self) {
        for element in self.handle.drain_elements() {
            self.engine.apply_remote(element);
        }
        for cursor in self.handle.drain_cursors() {
            self.engine.apply_presence(cursor);
        }
        for ext in self.handle.drain_strokes() {
            self.engine.apply_stroke_extension(ext);
        }
    }

    /// Authoritative elements in draw order, for convergence comparison.
    fn elements(&self) -> Vec<CanvasElement> {
        self.engine
            .store()
            .sorted_elements()
            .into_iter()
            .cloned()
            .collect()
    }
}

fn assert_converged(a: &Peer, b: &Peer) {
    assert_eq!(a.elements(), b.elements(), "peers diverged");
}

/// Create a sticky note on `peer` and broadcast it.
fn create_sticky(peer: &mut Peer, at: Point, now: i64) -> CanvasElement {
    peer.engine.set_tool(Tool::Sticky, now);
    let actions = peer.engine.pointer_down(now, at, Button::Primary, none());
    peer.send(&actions);
    let up = peer.engine.pointer_up(now + 1, at, Button::Primary, none());
    peer.send(&up);
    peer.engine.set_tool(Tool::Select, now + 2);
    let sorted = peer.engine.store().sorted_elements();
    sorted.last().copied().cloned().expect("sticky created")
}

/// Drag whatever element is at `from` over to `to` on `peer`.
fn drag(peer: &mut Peer, from: Point, to: Point, start: i64) {
    let down = peer.engine.pointer_down(start, from, Button::Primary, none());
    peer.send(&down);
    let moved = peer.engine.pointer_move(start + 5, to, none());
    peer.send(&moved);
    let up = peer.engine.pointer_up(start + 10, to, Button::Primary, none());
    peer.send(&up);
}

// =============================================================
// Basic propagation
// =============================================================

#[test]
fn created_element_reaches_the_other_peer() {
    let hub = LocalHub::new();
    let mut alice = Peer::new(&hub, 0xA, "alice");
    let mut bob = Peer::new(&hub, 0xB, "bob");

    let sticky = create_sticky(&mut alice, pt(100.0, 100.0), 0);
    bob.receive();

    assert_eq!(bob.engine.store().get(&sticky.id), Some(&sticky));
    assert_converged(&alice, &bob);
}

#[test]
fn edits_flow_both_ways() {
    let hub = LocalHub::new();
    let mut alice = Peer::new(&hub, 0xA, "alice");
    let mut bob = Peer::new(&hub, 0xB, "bob");

    let sticky = create_sticky(&mut alice, pt(100.0, 100.0), 0);
    bob.receive();

    // Bob drags the note; Alice reconciles his mutation.
    let center = pt(180.0, 160.0);
    drag(&mut bob, center, pt(400.0, 400.0), 1000);
    alice.receive();

    let on_alice = alice.engine.store().get(&sticky.id).expect("still live");
    assert_eq!(on_alice.version, 2);
    assert_eq!(on_alice.geometry.origin, pt(320.0, 340.0));
    assert_converged(&alice, &bob);
}

#[test]
fn duplicate_delivery_does_not_diverge() {
    let hub = LocalHub::new();
    let mut alice = Peer::new(&hub, 0xA, "alice");
    let mut bob = Peer::new(&hub, 0xB, "bob");

    alice.engine.set_tool(Tool::Sticky, 0);
    let actions = alice.engine.pointer_down(0, pt(10.0, 10.0), Button::Primary, none());

    // The at-least-once channel delivers the same batch twice.
    alice.send(&actions);
    alice.send(&actions);
    bob.receive();

    assert_eq!(bob.engine.store().len(), 1);
    assert_converged(&alice, &bob);
}

// =============================================================
// Conflicts
// =============================================================

#[test]
fn concurrent_drag_converges_to_one_winner() {
    let hub = LocalHub::new();
    let mut alice = Peer::new(&hub, 0xA, "alice");
    let mut bob = Peer::new(&hub, 0xB, "bob");

    let sticky = create_sticky(&mut alice, pt(100.0, 100.0), 0);
    bob.receive();

    // Both peers drag the same note at the same time, before either sees
    // the other's result. Bob's edit carries the later timestamp.
    let center = pt(180.0, 160.0);
    drag(&mut alice, center, pt(0.0, 0.0), 1000);
    drag(&mut bob, center, pt(500.0, 500.0), 2000);

    alice.receive();
    bob.receive();

    assert_converged(&alice, &bob);
    let winner = alice.engine.store().get(&sticky.id).expect("still live");
    assert_eq!(winner.owner_id, bob.engine.user_id(), "later write wins");
}

#[test]
fn delete_beats_concurrent_edit_in_any_order() {
    let hub = LocalHub::new();
    let mut alice = Peer::new(&hub, 0xA, "alice");
    let mut bob = Peer::new(&hub, 0xB, "bob");

    let sticky = create_sticky(&mut alice, pt(100.0, 100.0), 0);
    bob.receive();

    // Concurrently: Bob edits (version 2), Alice deletes (version 2, later
    // stamp), with each result crossing on the wire.
    let center = pt(180.0, 160.0);
    drag(&mut bob, center, pt(400.0, 400.0), 1000);

    let down = alice.engine.pointer_down(2000, center, Button::Primary, none());
    alice.send(&down);
    let up = alice.engine.pointer_up(2001, center, Button::Primary, none());
    alice.send(&up);
    let del = alice.engine.key_down(2002, &Key::named("Delete"), none());
    alice.send(&del);

    alice.receive();
    bob.receive();

    assert!(alice.engine.store().is_deleted(&sticky.id));
    assert!(bob.engine.store().is_deleted(&sticky.id));
    assert_converged(&alice, &bob);
    assert!(alice.elements().is_empty(), "deletion is terminal on both peers");
}

// =============================================================
// Presence and stroke preview
// =============================================================

#[test]
fn cursor_motion_reaches_peers_on_the_frame_tick() {
    let hub = LocalHub::new();
    let mut alice = Peer::new(&hub, 0xA, "alice");
    let mut bob = Peer::new(&hub, 0xB, "bob");

    let moved = alice.engine.pointer_move(10, pt(42.0, 24.0), none());
    alice.send(&moved);
    let tick = alice.engine.on_frame(16);
    alice.send(&tick);
    bob.receive();

    let cursors: Vec<_> = bob.engine.peer_cursors().collect();
    assert_eq!(cursors.len(), 1);
    assert_eq!(cursors[0].position, pt(42.0, 24.0));
    assert_eq!(cursors[0].display_name, "alice");
}

#[test]
fn live_stroke_preview_then_committed_element() {
    let hub = LocalHub::new();
    let mut alice = Peer::new(&hub, 0xA, "alice");
    let mut bob = Peer::new(&hub, 0xB, "bob");

    alice.engine.set_tool(Tool::Pen, 0);
    let down = alice.engine.pointer_down(10, pt(10.0, 10.0), Button::Primary, none());
    alice.send(&down);
    let m1 = alice.engine.pointer_move(11, pt(20.0, 20.0), none());
    alice.send(&m1);
    bob.receive();

    // Bob renders the in-progress stroke as preview, not as an element.
    assert_eq!(bob.engine.preview_strokes().count(), 1);
    assert!(bob.engine.store().is_empty());

    let up = alice.engine.pointer_up(12, pt(20.0, 20.0), Button::Primary, none());
    alice.send(&up);
    bob.receive();

    assert_eq!(bob.engine.preview_strokes().count(), 0, "preview replaced by the element");
    assert_eq!(bob.engine.store().len(), 1);
    assert_converged(&alice, &bob);
}

// =============================================================
// Delivery failure and retry
// =============================================================

/// Fails every element publish until `healthy` is flipped.
struct FlakyTransport<'a> {
    inner: &'a mut HubPeer,
    healthy: bool,
}

impl Transport for FlakyTransport<'_> {
    fn publish(&mut self, element: &CanvasElement) -> Result<(), TransportError> {
        if self.healthy {
            self.inner.publish(element)
        } else {
            Err(TransportError::Closed)
        }
    }

    fn publish_presence(
        &mut self,
        cursor: &boardsync::presence::Cursor,
    ) -> Result<(), TransportError> {
        self.inner.publish_presence(cursor)
    }

    fn publish_stroke(
        &mut self,
        ext: &boardsync::pipeline::StrokeExtension,
    ) -> Result<(), TransportError> {
        self.inner.publish_stroke(ext)
    }
}

#[test]
fn failed_publish_retries_on_the_next_flush() {
    let hub = LocalHub::new();
    let mut alice = Peer::new(&hub, 0xA, "alice");
    let mut bob = Peer::new(&hub, 0xB, "bob");

    // Creation happens while the transport is down.
    alice.engine.set_tool(Tool::Sticky, 0);
    let actions = alice.engine.pointer_down(10, pt(10.0, 10.0), Button::Primary, none());

    let mut flaky = FlakyTransport { inner: &mut alice.handle, healthy: false };
    let failed = dispatch(&actions, &mut flaky);
    assert_eq!(failed.len(), 1, "the publish failed");
    alice.engine.republish(failed);

    bob.receive();
    assert!(bob.engine.store().is_empty(), "nothing arrived yet");

    // The transport recovers; the next flush cycle re-emits the pending
    // element without any new user input.
    let retried = alice.engine.on_frame(100);
    let mut healthy = FlakyTransport { inner: &mut alice.handle, healthy: true };
    let failed_again = dispatch(&retried, &mut healthy);
    assert!(failed_again.is_empty());

    bob.receive();
    assert_eq!(bob.engine.store().len(), 1);
    assert_converged(&alice, &bob);
}
