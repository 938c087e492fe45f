//! Intra-Manager messages.
//!
//! Messages are value records delivered synchronously within a single
//! [`crate::manager::Manager::update`] call; they never cross peers and never
//! appear on the wire. A system's `update` may push messages (e.g. a
//! despawn system reacting to `EntityRemoved`) but delivery always completes
//! before `update()` returns -- there is no cross-frame message queue.

use crate::component::ComponentId;
use crate::entity::EntityId;

/// A single intra-Manager event.
///
/// Entity destruction broadcasts `EntityRemoved` *before* the structural
/// removal of its components, so handlers can still read the doomed
/// entity's state; component add/remove broadcast after the fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    EntityRemoved(EntityId),
    ComponentAdded(ComponentId),
    ComponentRemoved(ComponentId),
}

/// FIFO queue of messages raised during the current `update()` call.
///
/// The Manager drains this queue after running every system for the frame:
/// systems run first, then queued deliveries flush. Systems observe
/// messages by calling [`Outbox::drain`] themselves during their own
/// `update`, or the Manager flushes remaining messages to a caller-supplied
/// sink once all systems have run.
#[derive(Debug, Default)]
pub struct Outbox {
    queue: Vec<Message>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.queue.push(message);
    }

    /// Remove and return every message queued so far, in FIFO order.
    pub fn drain(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.queue)
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.queue.iter()
    }
}
