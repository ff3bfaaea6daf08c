use crate::runtime::clock::Clock;
use crate::runtime::op::Operation;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Identifies a single scheduled timer operation so it can later be
/// [`cancel`]ed.
///
/// [`cancel`]: TimerQueue::cancel
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) struct TimerId {
    deadline: Clock,
    seq: u64,
}

/// Deadline-ordered set of pending timer operations.
///
/// Backed by a `BTreeMap` keyed on `(deadline, sequence)`: the minimum
/// entry (the soonest deadline, ties broken by submission order) is always
/// the first key, giving the reactor an O(log n) read of its wait bound and
/// O(log n) insertion/removal.
#[derive(Default)]
pub(crate) struct TimerQueue {
    nodes: Mutex<BTreeMap<(Clock, u64), Operation>>,
    next_seq: AtomicU64,
}

impl TimerQueue {
    pub(crate) fn new() -> TimerQueue {
        TimerQueue {
            nodes: Mutex::new(BTreeMap::new()),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Inserts `op`, due at `deadline`. Returns an id for later
    /// cancellation and whether this deadline is now the queue's minimum
    /// (the caller should interrupt the wake-up primitive so the reactor's
    /// wait bound is recomputed).
    pub(crate) fn schedule(&self, deadline: Clock, op: Operation) -> (TimerId, bool) {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let mut nodes = self.nodes.lock().unwrap();
        let is_new_minimum = nodes
            .keys()
            .next()
            .map(|&(d, _)| deadline < d)
            .unwrap_or(true);
        nodes.insert((deadline, seq), op);
        (TimerId { deadline, seq }, is_new_minimum)
    }

    /// Removes the operation identified by `id`, if it is still pending.
    /// Returns it so the caller can complete it with "aborted"; idempotent
    /// if the timer already expired or was already canceled.
    pub(crate) fn cancel(&self, id: TimerId) -> Option<Operation> {
        self.nodes.lock().unwrap().remove(&(id.deadline, id.seq))
    }

    /// Pops every node whose deadline is `<= now`, returning them in
    /// deadline order (ties broken by submission order) for completion with
    /// success. Returns the count removed.
    pub(crate) fn expire_due(&self, now: Clock) -> Vec<Operation> {
        let mut nodes = self.nodes.lock().unwrap();
        let due_keys: Vec<(Clock, u64)> = nodes
            .range(..=(now, u64::MAX))
            .map(|(&k, _)| k)
            .collect();
        due_keys
            .into_iter()
            .filter_map(|k| nodes.remove(&k))
            .collect()
    }

    /// The minimum deadline still pending, or `None` if the queue is empty.
    pub(crate) fn next_deadline(&self) -> Option<Clock> {
        self.nodes.lock().unwrap().keys().next().map(|&(d, _)| d)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.nodes.lock().unwrap().is_empty()
    }

    /// Removes every pending timer, for context teardown.
    pub(crate) fn cancel_all(&self) -> Vec<Operation> {
        let mut nodes = self.nodes.lock().unwrap();
        std::mem::take(&mut *nodes).into_values().collect()
    }
}
