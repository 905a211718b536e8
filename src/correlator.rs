//! Request correlation: bounded identifiers, pending waiters, deadlines.
//!
//! DESIGN
//! ======
//! Identifiers live in `0..=65535` and are handed out by scanning forward
//! from the last one used, skipping identifiers that are still pending.
//! Every pending entry also carries a sequence number that is never reused.
//! Deadlines are kept in a min-heap keyed by `(instant, seq)`; a deadline
//! only fires if the entry under its identifier still has the same sequence
//! number, so a timer left over from a settled request can never reject a
//! newer request that reused the identifier.
//!
//! Settling an entry leaves its deadlines in the heap. Once the heap grows
//! past twice what the pending table can account for (plus
//! [`DEADLINE_SLACK`]), the stale ones are swept out and the heap shrinks
//! back, so its size follows the pending table rather than the request rate.
//!
//! The correlator owns no clock and no tasks. The session asks for the
//! earliest deadline, sleeps until then, and calls [`Correlator::expire`].

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::ClientError;

/// Number of distinct correlation identifiers.
pub const ID_SPACE: usize = 1 << 16;

/// Each pending entry arms at most this many deadlines.
const DEADLINES_PER_ENTRY: usize = 2;

/// Headroom on top of the live deadlines before the heap is swept.
pub const DEADLINE_SLACK: usize = 64;

/// Reply channel for a caller awaiting a response.
pub type ReplyTx = oneshot::Sender<Result<Value, ClientError>>;

/// Who is waiting on a pending request.
#[derive(Debug)]
pub enum Waiter {
    /// A client handle awaiting the outcome.
    Caller(ReplyTx),
    /// The login handshake.
    Login,
    /// A best-effort request whose outcome nobody reads.
    Ignore,
}

#[derive(Debug)]
struct Pending {
    seq: u64,
    waiter: Waiter,
}

/// A pending entry removed from the table, with the outcome to deliver.
#[derive(Debug)]
pub struct Settled {
    pub id: u16,
    pub waiter: Waiter,
    pub outcome: Result<Value, ClientError>,
}

impl Settled {
    /// Deliver the outcome to a caller. Returns `self` back for other waiters.
    pub fn deliver(self) -> Option<Self> {
        match self.waiter {
            Waiter::Caller(tx) => {
                // The caller may have given up on the future; nothing to do then.
                let _ = tx.send(self.outcome);
                None
            }
            Waiter::Ignore => None,
            Waiter::Login => Some(self),
        }
    }
}

#[derive(Debug, Default)]
pub struct Correlator {
    pending: HashMap<u16, Pending>,
    deadlines: BinaryHeap<Reverse<(Instant, u64, u16)>>,
    cursor: u16,
    next_seq: u64,
}

impl Correlator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick the first identifier at or after the last one used that is not pending.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::MaxRequest`] when every identifier is pending.
    pub fn allocate(&mut self) -> Result<u16, ClientError> {
        if self.pending.len() >= ID_SPACE {
            return Err(ClientError::MaxRequest);
        }
        while self.pending.contains_key(&self.cursor) {
            self.cursor = self.cursor.wrapping_add(1);
        }
        Ok(self.cursor)
    }

    /// Register a waiter for `id` and return the entry's sequence number.
    pub fn insert(&mut self, id: u16, waiter: Waiter) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.insert(id, Pending { seq, waiter });
        seq
    }

    /// Arm a deadline for the entry `(id, seq)`.
    pub fn arm(&mut self, id: u16, seq: u64, at: Instant) {
        self.deadlines.push(Reverse((at, seq, id)));
    }

    /// Settle `id` from an inbound response. Late duplicates yield `None`.
    pub fn resolve(&mut self, id: u16, status: bool, data: Value) -> Option<Settled> {
        let pending = self.pending.remove(&id)?;
        self.sweep();
        let outcome = if status { Ok(data) } else { Err(ClientError::Rejected(data)) };
        Some(Settled { id, waiter: pending.waiter, outcome })
    }

    /// Settle `(id, seq)` with an error, if that exact entry is still pending.
    pub fn fail(&mut self, id: u16, seq: u64, error: ClientError) -> Option<Settled> {
        if self.pending.get(&id)?.seq != seq {
            return None;
        }
        let pending = self.pending.remove(&id)?;
        self.sweep();
        Some(Settled { id, waiter: pending.waiter, outcome: Err(error) })
    }

    /// Drop deadlines whose entry is gone once they outnumber the live ones.
    fn sweep(&mut self) {
        let limit = DEADLINE_SLACK + DEADLINES_PER_ENTRY * self.pending.len();
        if self.deadlines.len() <= 2 * limit {
            return;
        }
        let pending = &self.pending;
        self.deadlines
            .retain(|Reverse((_, seq, id))| pending.get(id).is_some_and(|p| p.seq == *seq));
        self.deadlines.shrink_to(limit);
    }

    /// Earliest armed deadline, stale ones included.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.peek().map(|Reverse((at, _, _))| *at)
    }

    /// Pop every deadline due at `now` and time out the entries still pending.
    pub fn expire(&mut self, now: Instant) -> Vec<Settled> {
        let mut expired = Vec::new();
        while let Some(Reverse((at, seq, id))) = self.deadlines.peek().copied() {
            if at > now {
                break;
            }
            self.deadlines.pop();
            if let Some(settled) = self.fail(id, seq, ClientError::Timeout) {
                expired.push(settled);
            }
        }
        expired
    }

    /// Drop every pending login waiter, e.g. when the transport goes away.
    pub fn forget_login(&mut self) -> usize {
        let before = self.pending.len();
        self.pending
            .retain(|_, pending| !matches!(pending.waiter, Waiter::Login));
        let forgotten = before - self.pending.len();
        if forgotten > 0 {
            self.sweep();
        }
        forgotten
    }

    #[must_use]
    pub fn is_pending(&self, id: u16) -> bool {
        self.pending.contains_key(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
#[path = "correlator_test.rs"]
mod tests;
