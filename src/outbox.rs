//! Bounded FIFO of envelopes produced while the session is not logged in.
//!
//! DESIGN
//! ======
//! Messages are never lost silently: when the buffer is full the overflow
//! policy either evicts the oldest entry or refuses the newest, and the
//! caller gets the affected envelope back so it can settle the matching
//! pending request.

use std::collections::VecDeque;

use frames::Rpc;

/// What happens when a message arrives at a full buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Evict the oldest buffered message to make room.
    #[default]
    DropOldest,
    /// Keep the buffer as is and refuse the new message.
    RejectNew,
}

/// A buffered envelope plus the pending-request ticket it belongs to.
#[derive(Debug)]
pub struct Queued {
    pub rpc: Rpc,
    /// Sequence number of the pending entry waiting on this envelope.
    pub ticket: Option<u64>,
}

/// Result of [`Outbox::push`].
#[derive(Debug)]
pub enum Pushed {
    Accepted,
    /// Accepted after evicting this entry.
    Evicted(Queued),
    /// Not accepted; the entry is handed back.
    Rejected(Queued),
}

#[derive(Debug)]
pub struct Outbox {
    queue: VecDeque<Queued>,
    capacity: usize,
    policy: OverflowPolicy,
}

impl Outbox {
    #[must_use]
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self { queue: VecDeque::new(), capacity, policy }
    }

    /// Append an envelope, applying the overflow policy when full.
    pub fn push(&mut self, entry: Queued) -> Pushed {
        if self.queue.len() < self.capacity {
            self.queue.push_back(entry);
            return Pushed::Accepted;
        }
        match self.policy {
            OverflowPolicy::RejectNew => Pushed::Rejected(entry),
            OverflowPolicy::DropOldest => {
                let Some(evicted) = self.queue.pop_front() else {
                    // Zero capacity: nothing to evict, nothing to keep.
                    return Pushed::Rejected(entry);
                };
                self.queue.push_back(entry);
                Pushed::Evicted(evicted)
            }
        }
    }

    /// Put an entry back at the head, e.g. when a flush write fails.
    pub fn restore(&mut self, entry: Queued) {
        self.queue.push_front(entry);
    }

    pub fn pop(&mut self) -> Option<Queued> {
        self.queue.pop_front()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
#[path = "outbox_test.rs"]
mod tests;
