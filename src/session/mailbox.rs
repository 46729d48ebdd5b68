//! Interaction mailboxes, one per gadget-local node id.
//!
//! Two storage shapes back the four mailbox kinds:
//!
//! - [`Fifo`]: discrete events (panel mouse events, grab events). Every push
//!   is kept; each pull removes the oldest.
//! - [`Latest`]: per-frame sets (poker proximity, grabber intersections).
//!   A push replaces the stored set; pulls read it without clearing.

#[cfg(test)]
#[path = "mailbox_test.rs"]
mod mailbox_test;

use std::collections::VecDeque;

use wire::GlobalId;
use wire::events::{GrabEvent, GrabberIntersections, PanelMouseEvent, PokerProximity};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MailboxError {
    #[error("no events")]
    NoEvents,
    #[error("buffer holds {capacity} but {needed} are pending")]
    InsufficientBufferSize { needed: usize, capacity: usize },
}

#[derive(Debug, Clone)]
pub struct Fifo<E> {
    events: VecDeque<E>,
}

impl<E> Default for Fifo<E> {
    fn default() -> Self {
        Self { events: VecDeque::new() }
    }
}

impl<E> Fifo<E> {
    pub fn push(&mut self, event: E) {
        self.events.push_back(event);
    }

    /// # Errors
    ///
    /// [`MailboxError::NoEvents`] when the queue is empty.
    pub fn pull(&mut self) -> Result<E, MailboxError> {
        self.events.pop_front().ok_or(MailboxError::NoEvents)
    }

    #[cfg(test)]
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[cfg(test)]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Latest<T> {
    value: Option<T>,
}

impl<T> Default for Latest<T> {
    fn default() -> Self {
        Self { value: None }
    }
}

impl<T: Clone> Latest<T> {
    pub fn replace(&mut self, value: T) {
        self.value = Some(value);
    }

    /// # Errors
    ///
    /// [`MailboxError::NoEvents`] if nothing was ever pushed.
    pub fn peek(&self) -> Result<&T, MailboxError> {
        self.value.as_ref().ok_or(MailboxError::NoEvents)
    }
}

fn check_capacity(needed: usize, capacity: Option<usize>) -> Result<(), MailboxError> {
    match capacity {
        Some(capacity) if capacity < needed => Err(MailboxError::InsufficientBufferSize { needed, capacity }),
        _ => Ok(()),
    }
}

// =============================================================================
// POKER
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct PokerMailbox {
    proximity: Latest<Vec<PokerProximity>>,
}

impl PokerMailbox {
    pub fn push_proximity(&mut self, proximity: Vec<PokerProximity>) {
        self.proximity.replace(proximity);
    }

    /// Current proximity set. `capacity` is the caller's buffer size, if bounded.
    ///
    /// # Errors
    ///
    /// [`MailboxError::NoEvents`] before the first push;
    /// [`MailboxError::InsufficientBufferSize`] if the set does not fit.
    pub fn pull(&self, capacity: Option<usize>) -> Result<Vec<PokerProximity>, MailboxError> {
        let set = self.proximity.peek()?;
        check_capacity(set.len(), capacity)?;
        Ok(set.clone())
    }
}

// =============================================================================
// PANEL
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct PanelMailbox {
    events: Fifo<PanelMouseEvent>,
}

impl PanelMailbox {
    pub fn push(&mut self, event: PanelMouseEvent) {
        self.events.push(event);
    }

    /// # Errors
    ///
    /// [`MailboxError::NoEvents`] when the queue is empty.
    pub fn pull(&mut self) -> Result<PanelMouseEvent, MailboxError> {
        self.events.pull()
    }
}

// =============================================================================
// GRABBER
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct GrabberMailbox {
    intersections: Latest<GrabberIntersections>,
    events: Fifo<GrabEvent>,
    last_grabbable: Option<GlobalId>,
}

impl GrabberMailbox {
    pub fn push_intersections(&mut self, intersections: GrabberIntersections) {
        if let Some(first) = intersections.grabbables.first() {
            self.last_grabbable = Some(first.grabbable_id);
        }
        self.intersections.replace(intersections);
    }

    /// # Errors
    ///
    /// [`MailboxError::NoEvents`] before the first push;
    /// [`MailboxError::InsufficientBufferSize`] if the grabbable list does not fit.
    pub fn pull_intersections(&self, capacity: Option<usize>) -> Result<GrabberIntersections, MailboxError> {
        let set = self.intersections.peek()?;
        check_capacity(set.grabbables.len(), capacity)?;
        Ok(set.clone())
    }

    pub fn push_event(&mut self, event: GrabEvent) {
        if event.grabbable_id != 0 {
            self.last_grabbable = Some(event.grabbable_id);
        }
        self.events.push(event);
    }

    /// # Errors
    ///
    /// [`MailboxError::NoEvents`] when the queue is empty.
    pub fn pull_event(&mut self) -> Result<GrabEvent, MailboxError> {
        self.events.pull()
    }

    #[must_use]
    pub fn last_grabbable(&self) -> Option<GlobalId> {
        self.last_grabbable
    }
}

// =============================================================================
// GRABBABLE
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct GrabbableMailbox {
    events: Fifo<GrabEvent>,
    last_grabber: Option<GlobalId>,
}

impl GrabbableMailbox {
    pub fn push_event(&mut self, event: GrabEvent) {
        if event.grabber_id != 0 {
            self.last_grabber = Some(event.grabber_id);
        }
        self.events.push(event);
    }

    /// # Errors
    ///
    /// [`MailboxError::NoEvents`] when the queue is empty.
    pub fn pull_event(&mut self) -> Result<GrabEvent, MailboxError> {
        self.events.pull()
    }

    #[must_use]
    pub fn last_grabber(&self) -> Option<GlobalId> {
        self.last_grabber
    }
}
