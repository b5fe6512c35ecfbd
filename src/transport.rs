//! Transport boundary: the abstract publish side of the sync protocol.
//!
//! The engine never talks to a socket. It returns [`Action`]s; the host
//! feeds the publish-shaped ones through a [`Transport`] with
//! [`dispatch`]. Element publishes are fire-and-forget at-least-once:
//! a failed publish is reported back so the engine can re-pend the
//! element for the next flush cycle. Presence and stroke-preview
//! publishes have lower durability expectations — failures are logged
//! and dropped.
//!
//! [`LocalHub`] is an in-memory loopback broker wiring several engines
//! together in one process. The integration tests drive whole peer
//! sessions through it; it is also a reference for what a real transport
//! must provide (per-peer delivery of everything the other peers
//! publish, duplicates allowed, ordering not guaranteed across
//! elements).

#[cfg(test)]
#[path = "transport_test.rs"]
mod transport_test;

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::element::CanvasElement;
use crate::engine::Action;
use crate::pipeline::StrokeExtension;
use crate::presence::Cursor;

/// Error publishing to the transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The channel is gone; nothing will be delivered until reconnect.
    #[error("transport closed")]
    Closed,
    /// The publish failed for a transport-specific reason.
    #[error("publish failed: {0}")]
    Publish(String),
}

/// Abstract broadcast channel to all peers on the same board.
pub trait Transport {
    /// Broadcast an element mutation. At-least-once; receivers tolerate
    /// duplicates by version.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when delivery could not be scheduled;
    /// the caller re-pends the element and retries on the next flush.
    fn publish(&mut self, element: &CanvasElement) -> Result<(), TransportError>;

    /// Broadcast the local cursor. Dropped updates are acceptable.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when delivery could not be scheduled.
    fn publish_presence(&mut self, cursor: &Cursor) -> Result<(), TransportError>;

    /// Broadcast an in-progress stroke extension. Dropped updates are
    /// acceptable; the committed stroke supersedes the preview anyway.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when delivery could not be scheduled.
    fn publish_stroke(&mut self, ext: &StrokeExtension) -> Result<(), TransportError>;
}

/// Feed a batch of engine actions to a transport.
///
/// Returns the elements whose publish failed; hand them to
/// `Engine::republish` so the pending markers act as the retry queue.
/// Non-publish actions (render, selection, editor requests) are the
/// host's business and pass through untouched here.
pub fn dispatch(actions: &[Action], transport: &mut dyn Transport) -> Vec<CanvasElement> {
    let mut failed = Vec::new();
    for action in actions {
        match action {
            Action::Publish(element) => {
                if let Err(err) = transport.publish(element) {
                    tracing::warn!(id = %element.id, error = %err, "element publish failed; will retry");
                    failed.push(element.clone());
                }
            }
            Action::PublishPresence(cursor) => {
                if let Err(err) = transport.publish_presence(cursor) {
                    tracing::debug!(error = %err, "presence publish dropped");
                }
            }
            Action::PublishStroke(ext) => {
                if let Err(err) = transport.publish_stroke(ext) {
                    tracing::debug!(error = %err, "stroke extension dropped");
                }
            }
            Action::EditTextRequested { .. }
            | Action::SelectionChanged
            | Action::RenderNeeded => {}
        }
    }
    failed
}

#[derive(Default)]
struct PeerQueue {
    elements: VecDeque<CanvasElement>,
    cursors: VecDeque<Cursor>,
    strokes: VecDeque<StrokeExtension>,
}

#[derive(Default)]
struct HubInner {
    peers: Vec<PeerQueue>,
}

/// In-memory loopback broker connecting engines in one process.
///
/// Each registered peer gets a [`HubPeer`] handle that publishes to every
/// *other* peer's queues and drains its own. Single-threaded by design,
/// matching the engine's cooperative scheduling model.
#[derive(Default)]
pub struct LocalHub {
    inner: Rc<RefCell<HubInner>>,
}

impl LocalHub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new peer and return its transport handle.
    #[must_use]
    pub fn register(&self) -> HubPeer {
        let mut inner = self.inner.borrow_mut();
        inner.peers.push(PeerQueue::default());
        HubPeer {
            inner: Rc::clone(&self.inner),
            index: inner.peers.len() - 1,
        }
    }
}

/// One peer's handle onto a [`LocalHub`].
pub struct HubPeer {
    inner: Rc<RefCell<HubInner>>,
    index: usize,
}

impl HubPeer {
    /// Take every element update delivered to this peer so far.
    #[must_use]
    pub fn drain_elements(&self) -> Vec<CanvasElement> {
        let mut inner = self.inner.borrow_mut();
        inner.peers[self.index].elements.drain(..).collect()
    }

    /// Take every cursor update delivered to this peer so far.
    #[must_use]
    pub fn drain_cursors(&self) -> Vec<Cursor> {
        let mut inner = self.inner.borrow_mut();
        inner.peers[self.index].cursors.drain(..).collect()
    }

    /// Take every stroke extension delivered to this peer so far.
    #[must_use]
    pub fn drain_strokes(&self) -> Vec<StrokeExtension> {
        let mut inner = self.inner.borrow_mut();
        inner.peers[self.index].strokes.drain(..).collect()
    }
}

impl Transport for HubPeer {
    fn publish(&mut self, element: &CanvasElement) -> Result<(), TransportError> {
        let mut inner = self.inner.borrow_mut();
        for (index, peer) in inner.peers.iter_mut().enumerate() {
            if index != self.index {
                peer.elements.push_back(element.clone());
            }
        }
        Ok(())
    }

    fn publish_presence(&mut self, cursor: &Cursor) -> Result<(), TransportError> {
        let mut inner = self.inner.borrow_mut();
        for (index, peer) in inner.peers.iter_mut().enumerate() {
            if index != self.index {
                peer.cursors.push_back(cursor.clone());
            }
        }
        Ok(())
    }

    fn publish_stroke(&mut self, ext: &StrokeExtension) -> Result<(), TransportError> {
        let mut inner = self.inner.borrow_mut();
        for (index, peer) in inner.peers.iter_mut().enumerate() {
            if index != self.index {
                peer.strokes.push_back(ext.clone());
            }
        }
        Ok(())
    }
}
